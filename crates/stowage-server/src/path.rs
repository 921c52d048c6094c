//! Parsing of the `name[/revision]` tail of resource URLs.

use crate::{ApiError, ApiResult};
use stowage_api_types::resource::{is_valid_resource_name, Channel, PackageId, Revision};

#[derive(Debug, PartialEq, Eq)]
pub struct ResourcePath {
    pub name: String,
    pub revision: Option<Revision>,
}

impl ResourcePath {
    pub fn parse(path: &str) -> ApiResult<Self> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let mut segments = path.split('/');
        let name = segments.next().unwrap_or_default();
        if !is_valid_resource_name(name) {
            return Err(ApiError::BadRequest(format!("invalid resource name {name:?}")));
        }

        let revision = segments.next().map(parse_revision).transpose()?;
        if segments.next().is_some() {
            return Err(ApiError::BadRequest(format!("too many segments in {path:?}")));
        }

        Ok(Self {
            name: name.to_owned(),
            revision,
        })
    }
}

/// Only plain ASCII digits. `u64::from_str` would also take a leading `+`.
fn parse_revision(segment: &str) -> ApiResult<Revision> {
    if segment.is_empty() || !segment.bytes().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::BadRequest(format!("invalid revision {segment:?}")));
    }
    segment
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("revision {segment} is out of range")))
}

pub fn package_id(raw: &str) -> ApiResult<PackageId> {
    raw.parse().map_err(|e| ApiError::BadRequest(format!("{e}")))
}

/// The `channel` query parameter, `unpublished` when absent.
pub fn channel(raw: Option<&str>) -> ApiResult<Channel> {
    raw.map_or(Ok(Channel::Unpublished), |c| {
        c.parse().map_err(|e| ApiError::BadRequest(format!("{e}")))
    })
}
