//! HTTP client for the Stowage resource store.

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{RequestBuilder, Response, StatusCode};
use stowage_api_types::params::{
    AuthResponse, ChannelQuery, ErrorCode, PublishRequest, Resource, UploadQuery, UploadedResource,
};
use stowage_api_types::resource::{Fingerprint, PackageDeclaration, PackageId, Revision};
use thiserror::Error;

pub const CONTENT_SHA384: &str = "content-sha384";

pub struct Client {
    http: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Received error from stowage server: {0}")]
    ServerError(#[source] anyhow::Error),
    #[error("Conflict due to resource already being present")]
    Conflict,
    #[error("Permission denied to perform operation")]
    Unauthorized,
    #[error("Requested object was not found")]
    NotFound,
    /// The server explained what went wrong.
    #[error("{message} ({code:?})")]
    Api { code: ErrorCode, message: String },
    #[error("Downloaded content does not match the server's fingerprint")]
    IntegrityMismatch,
    #[error("Failed to deserialize stuff")]
    Deserialization(#[from] serde_json::Error),
    #[error("Received unknown error")]
    Other(#[from] anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if let Some(status) = value.status() {
            match status {
                StatusCode::INTERNAL_SERVER_ERROR => Self::ServerError(anyhow::anyhow!(value)),
                StatusCode::CONFLICT => Self::Conflict,
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Self::Unauthorized,
                StatusCode::NOT_FOUND => Self::NotFound,
                _ => Self::Other(anyhow::anyhow!(value)),
            }
        } else {
            Self::Other(anyhow::anyhow!(value))
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Client {
    #[must_use]
    pub fn new(endpoint: &str, token: Option<String>) -> Self {
        Self::from_reqwest(endpoint, token, reqwest::Client::new())
    }

    #[must_use]
    pub fn from_reqwest(endpoint: &str, token: Option<String>, client: reqwest::Client) -> Self {
        Self {
            http: client,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            token,
        }
    }

    pub async fn register(&mut self, username: &str) -> Result<()> {
        let req = self
            .http
            .post(format!("{}/account", self.endpoint))
            .form(&[("username", username)]);

        let resp = send(req).await?;
        let AuthResponse { token } = resp.json().await?;
        self.token = Some(token);

        Ok(())
    }

    pub async fn declare(&self, package: &PackageId, declaration: &PackageDeclaration) -> Result<()> {
        let req = self
            .http
            .put(format!("{}/{package}", self.endpoint))
            .json(declaration);

        send(self.attach_auth(req)?).await?;
        Ok(())
    }

    /// Uploads a new revision, returning the revision the server assigned to it.
    pub async fn upload(&self, package: &PackageId, name: &str, content: Vec<u8>) -> Result<Revision> {
        let query = UploadQuery {
            hash: Fingerprint::of(&content).to_string(),
        };
        let req = self
            .http
            .post(format!("{}/{package}/resources/{name}", self.endpoint))
            .query(&query)
            .body(content);

        let resp = send(self.attach_auth(req)?).await?;
        let UploadedResource { revision } = resp.json().await?;
        Ok(revision)
    }

    /// Downloads a specific revision, or whatever `channel` shows when there's none.
    ///
    /// The content is checked against the fingerprint the server sends along.
    pub async fn download(
        &self,
        package: &PackageId,
        name: &str,
        revision: Option<Revision>,
        channel: Option<&str>,
    ) -> Result<Vec<u8>> {
        let url = match revision {
            Some(revision) => format!("{}/{package}/resources/{name}/{revision}", self.endpoint),
            None => format!("{}/{package}/resources/{name}", self.endpoint),
        };
        let req = self.http.get(url).query(&channel_query(channel));

        let resp = send(self.attach_auth(req)?).await?;
        let expected: Option<Fingerprint> = resp
            .headers()
            .get(CONTENT_SHA384)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let bytes = resp.bytes().await?;

        if expected.is_some_and(|expected| expected != Fingerprint::of(&bytes)) {
            return Err(Error::IntegrityMismatch);
        }
        Ok(bytes.to_vec())
    }

    pub async fn resource(
        &self,
        package: &PackageId,
        name: &str,
        revision: Option<Revision>,
    ) -> Result<Resource> {
        let url = match revision {
            Some(revision) => format!("{}/{package}/meta/resource/{name}/{revision}", self.endpoint),
            None => format!("{}/{package}/meta/resource/{name}", self.endpoint),
        };

        let resp = send(self.attach_auth(self.http.get(url))?).await?;
        Ok(resp.json().await?)
    }

    pub async fn list(&self, package: &PackageId, channel: Option<&str>) -> Result<Vec<Resource>> {
        let req = self
            .http
            .get(format!("{}/{package}/meta/resources", self.endpoint))
            .query(&channel_query(channel));

        let resp = send(self.attach_auth(req)?).await?;
        Ok(resp.json().await?)
    }

    pub async fn publish(&self, package: &PackageId, request: &PublishRequest) -> Result<()> {
        let req = self
            .http
            .put(format!("{}/{package}/publish", self.endpoint))
            .json(request);

        send(self.attach_auth(req)?).await?;
        Ok(())
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn attach_auth(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match self.token.as_deref() {
            Some(token) => {
                let value = HeaderValue::from_str(token)
                    .map_err(|_| anyhow::anyhow!("token is not a valid header value"))?;
                req.header(AUTHORIZATION, value)
            }
            None => req,
        })
    }
}

fn channel_query(channel: Option<&str>) -> ChannelQuery {
    ChannelQuery {
        channel: channel.map(str::to_owned),
    }
}

/// Turns error responses into [`Error::Api`] when the body says what went wrong.
async fn send(req: RequestBuilder) -> Result<Response> {
    let resp = req.send().await?;
    if let Some(e) = resp.error_for_status_ref().err() {
        let body = resp.bytes().await?;
        return Err(
            match serde_json::from_slice::<stowage_api_types::params::Error>(&body) {
                Ok(error) => Error::Api {
                    code: error.code,
                    message: error.message,
                },
                Err(_) => e.into(),
            },
        );
    }
    Ok(resp)
}
