//! Request and response bodies of the HTTP API.

use crate::resource::{Channel, Fingerprint, ResourceType, ResourceView, Revision};
use std::collections::BTreeMap;

/// The `code` field of error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Deserialize))]
#[cfg_attr(feature = "server", derive(serde::Serialize))]
pub enum ErrorCode {
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "bad request"))]
    BadRequest,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "unauthorized"))]
    Unauthorized,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "forbidden"))]
    Forbidden,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "not found"))]
    NotFound,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "metadata not found"))]
    MetadataNotFound,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "method not allowed"))]
    MethodNotAllowed,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "duplicate upload"))]
    DuplicateUpload,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "allocation conflict"))]
    AllocationConflict,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "integrity mismatch"))]
    IntegrityMismatch,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "payload too large"))]
    PayloadTooLarge,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "storage unavailable"))]
    StorageUnavailable,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "not implemented"))]
    NotImplemented,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "internal error"))]
    InternalError,
}

#[derive(Debug, Clone)]
#[cfg_attr(feature = "client", derive(serde::Deserialize))]
#[cfg_attr(feature = "server", derive(serde::Serialize))]
pub struct Error {
    pub message: String,
    pub code: ErrorCode,
}

/// Where a listed resource comes from: `store` once uploaded, `upload` while it's only declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Deserialize))]
#[cfg_attr(feature = "server", derive(serde::Serialize))]
#[cfg_attr(any(feature = "client", feature = "server"), serde(rename_all = "lowercase"))]
pub enum Origin {
    Store,
    Upload,
}

/// A resource as returned by the `meta/` endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Deserialize))]
#[cfg_attr(feature = "server", derive(serde::Serialize))]
pub struct Resource {
    pub name: String,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(rename = "type"))]
    pub kind: ResourceType,
    pub path: String,
    pub description: String,
    pub origin: Origin,
    #[cfg_attr(
        any(feature = "client", feature = "server"),
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub revision: Option<Revision>,
    #[cfg_attr(
        any(feature = "client", feature = "server"),
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub fingerprint: Option<Fingerprint>,
    #[cfg_attr(
        any(feature = "client", feature = "server"),
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub size: Option<u64>,
}

impl From<&ResourceView> for Resource {
    fn from(view: &ResourceView) -> Self {
        let slot = view.slot();
        let record = view.record();
        Self {
            name: slot.name.clone(),
            kind: slot.kind,
            path: slot.path.clone(),
            description: slot.description.clone(),
            origin: if record.is_some() { Origin::Store } else { Origin::Upload },
            revision: record.map(|r| r.revision),
            fingerprint: record.map(|r| r.fingerprint),
            size: record.map(|r| r.size),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "client", derive(serde::Deserialize))]
#[cfg_attr(feature = "server", derive(serde::Serialize))]
pub struct UploadedResource {
    pub revision: Revision,
}

/// Body of `PUT /{package}/publish`.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize))]
#[cfg_attr(feature = "server", derive(serde::Deserialize))]
pub struct PublishRequest {
    pub channels: Vec<Channel>,
    #[cfg_attr(any(feature = "client", feature = "server"), serde(default))]
    pub resources: BTreeMap<String, Revision>,
}

#[cfg_attr(feature = "client", derive(serde::Serialize))]
#[cfg_attr(feature = "server", derive(serde::Deserialize))]
pub struct AuthForm {
    pub username: String,
}

#[cfg_attr(feature = "client", derive(serde::Deserialize))]
#[cfg_attr(feature = "server", derive(serde::Serialize))]
pub struct AuthResponse {
    pub token: String,
}

/// Query parameters of `POST resources/{name}`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "client", derive(serde::Serialize))]
#[cfg_attr(feature = "server", derive(serde::Deserialize))]
pub struct UploadQuery {
    pub hash: String,
}

/// Query parameters of the read endpoints.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "client", derive(serde::Serialize))]
#[cfg_attr(feature = "server", derive(serde::Deserialize))]
pub struct ChannelQuery {
    #[cfg_attr(
        any(feature = "client", feature = "server"),
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub channel: Option<String>,
}
