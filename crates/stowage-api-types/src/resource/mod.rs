//! Domain model shared by the catalog, the metadata backends and the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub use error::{InvalidIdentifier, ResourceError, ResourceResult};
pub use fingerprint::{Fingerprint, FingerprintHasher, FINGERPRINT_LEN};

mod error;
mod fingerprint;

/// Revisions start at zero and are never reused for the same resource name.
pub type Revision = u64;

/// Identity of a resolved package, usable as a single URL path segment.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    pub const MAX_LEN: usize = 128;

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(id: &str) -> bool {
        id.len() <= Self::MAX_LEN
            && id
                .bytes()
                .next()
                .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            && id.bytes().all(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, b'.' | b'_' | b'+' | b'~' | b'-')
            })
    }
}

impl FromStr for PackageId {
    type Err = InvalidIdentifier;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(id) {
            Ok(Self(id.to_owned()))
        } else {
            Err(InvalidIdentifier::new("package id", id))
        }
    }
}

impl TryFrom<String> for PackageId {
    type Error = InvalidIdentifier;

    fn try_from(id: String) -> Result<Self, Self::Error> {
        if Self::is_valid(&id) {
            Ok(Self(id))
        } else {
            Err(InvalidIdentifier::new("package id", &id))
        }
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource names are chosen by charm authors, so they allow mixed case.
#[must_use]
pub fn is_valid_resource_name(name: &str) -> bool {
    name.len() <= 64
        && name.bytes().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .bytes()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'.' | b'_' | b'-'))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    File,
    OciImage,
}

impl ResourceType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::OciImage => "oci-image",
        }
    }
}

/// A named resource declared by the package metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSlot {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ResourceType,
    /// Where the charm expects to find the resource once it is deployed.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(postgres_types::ToSql, postgres_types::FromSql))]
#[cfg_attr(feature = "postgres", postgres(name = "package_kind"))]
#[serde(rename_all = "lowercase")]
pub enum PackageKind {
    #[cfg_attr(feature = "postgres", postgres(name = "charm"))]
    Charm,
    /// Bundles never have resources.
    #[cfg_attr(feature = "postgres", postgres(name = "bundle"))]
    Bundle,
}

/// What a client sends to make a package known to the resource store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageDeclaration {
    pub kind: PackageKind,
    #[serde(default)]
    pub public: bool,
    #[serde(default)]
    pub resources: Vec<ResourceSlot>,
}

/// The package's own document in the metadata store.
///
/// Publication pointers and revision counters live here, so that both can be changed with
/// single-document atomic updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDocument {
    pub id: PackageId,
    pub kind: PackageKind,
    pub public: bool,
    pub resources: BTreeMap<String, ResourceSlot>,
    /// channel -> resource name -> revision visible on that channel
    #[serde(default)]
    pub published: BTreeMap<String, BTreeMap<String, Revision>>,
    /// resource name -> next revision the allocator hands out
    #[serde(default)]
    pub revision_counters: BTreeMap<String, Revision>,
    pub created_at: DateTime<Utc>,
}

impl PackageDocument {
    pub fn from_declaration(
        id: PackageId,
        declaration: PackageDeclaration,
        created_at: DateTime<Utc>,
    ) -> ResourceResult<Self> {
        if declaration.kind == PackageKind::Bundle && !declaration.resources.is_empty() {
            return Err(ResourceError::InvalidDeclaration(
                "bundles cannot declare resources".into(),
            ));
        }

        let mut resources = BTreeMap::new();
        for slot in declaration.resources {
            if !is_valid_resource_name(&slot.name) {
                return Err(ResourceError::InvalidDeclaration(format!(
                    "invalid resource name {:?}",
                    slot.name
                )));
            }
            if let Some(dup) = resources.insert(slot.name.clone(), slot) {
                return Err(ResourceError::InvalidDeclaration(format!(
                    "resource {:?} declared more than once",
                    dup.name
                )));
            }
        }

        Ok(Self {
            id,
            kind: declaration.kind,
            public: declaration.public,
            resources,
            published: BTreeMap::new(),
            revision_counters: BTreeMap::new(),
            created_at,
        })
    }

    #[must_use]
    pub fn supports_resources(&self) -> bool {
        self.kind == PackageKind::Charm
    }

    pub fn slot(&self, name: &str) -> ResourceResult<&ResourceSlot> {
        self.resources
            .get(name)
            .ok_or_else(|| ResourceError::UnknownResource {
                package: self.id.clone(),
                name: name.to_owned(),
            })
    }

    #[must_use]
    pub fn published_revision(&self, channel: &str, name: &str) -> Option<Revision> {
        self.published.get(channel)?.get(name).copied()
    }

    /// Current value of the allocation counter. Absent counters read as zero.
    #[must_use]
    pub fn revision_counter(&self, name: &str) -> Revision {
        self.revision_counters.get(name).copied().unwrap_or(0)
    }

    /// Bumps the counter of `name` and returns the value it had before.
    ///
    /// `None` if the counter is exhausted, in which case it is left unchanged.
    pub fn take_revision(&mut self, name: &str) -> Option<Revision> {
        let current = self.revision_counter(name);
        self.revision_counters
            .insert(name.to_owned(), current.checked_add(1)?);
        Some(current)
    }
}

/// A release track, or the `unpublished` pseudo-channel meaning "latest upload".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Channel {
    #[default]
    Unpublished,
    Named(String),
}

impl Channel {
    pub const UNPUBLISHED: &'static str = "unpublished";

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Unpublished => Self::UNPUBLISHED,
            Self::Named(name) => name,
        }
    }

    #[must_use]
    pub fn is_unpublished(&self) -> bool {
        matches!(self, Self::Unpublished)
    }
}

impl FromStr for Channel {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::UNPUBLISHED {
            return Ok(Self::Unpublished);
        }
        let valid = s.len() <= 32
            && s.bytes().next().is_some_and(|c| c.is_ascii_lowercase())
            && s
                .bytes()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == b'-');
        if valid {
            Ok(Self::Named(s.to_owned()))
        } else {
            Err(InvalidIdentifier::new("channel", s))
        }
    }
}

impl TryFrom<String> for Channel {
    type Error = InvalidIdentifier;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Unpublished => Channel::UNPUBLISHED.to_owned(),
            Channel::Named(name) => name,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque locator of a blob in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobName(String);

impl BlobName {
    /// 128 random bits, hex encoded.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    #[must_use]
    pub fn new(name: String) -> Self {
        Self(name)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An uploaded, verified and immutable revision of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub package: PackageId,
    pub name: String,
    pub revision: Revision,
    pub fingerprint: Fingerprint,
    pub size: u64,
    pub blob_name: BlobName,
    pub uploaded_at: DateTime<Utc>,
}

/// What readers see for a declared resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceView {
    Uploaded {
        slot: ResourceSlot,
        record: ResourceRecord,
    },
    /// Declared by the package but never uploaded. Not persisted anywhere.
    Placeholder { slot: ResourceSlot },
}

impl ResourceView {
    #[must_use]
    pub fn slot(&self) -> &ResourceSlot {
        match self {
            Self::Uploaded { slot, .. } | Self::Placeholder { slot } => slot,
        }
    }

    #[must_use]
    pub fn record(&self) -> Option<&ResourceRecord> {
        match self {
            Self::Uploaded { record, .. } => Some(record),
            Self::Placeholder { .. } => None,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.slot().name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(name: &str) -> ResourceSlot {
        ResourceSlot {
            name: name.into(),
            kind: ResourceType::File,
            path: format!("{name}.tgz"),
            description: String::new(),
        }
    }

    #[test]
    fn package_ids() {
        assert!("starsay-17".parse::<PackageId>().is_ok());
        assert!("a".parse::<PackageId>().is_ok());
        assert!("".parse::<PackageId>().is_err());
        assert!("..".parse::<PackageId>().is_err());
        assert!(".hidden".parse::<PackageId>().is_err());
        assert!("with/slash".parse::<PackageId>().is_err());
        assert!("Upper".parse::<PackageId>().is_err());
        assert!("x".repeat(129).parse::<PackageId>().is_err());
    }

    #[test]
    fn channels() {
        assert_eq!("unpublished".parse::<Channel>().unwrap(), Channel::Unpublished);
        assert_eq!(
            "stable".parse::<Channel>().unwrap(),
            Channel::Named("stable".into())
        );
        assert!("".parse::<Channel>().is_err());
        assert!("9lives".parse::<Channel>().is_err());
        assert!("Stable".parse::<Channel>().is_err());
        assert_eq!(Channel::default().to_string(), "unpublished");
    }

    #[test]
    fn declaration_validation() {
        let id: PackageId = "pkg".parse().unwrap();
        let now = Utc::now();

        let bundle = PackageDeclaration {
            kind: PackageKind::Bundle,
            public: true,
            resources: vec![slot("data")],
        };
        assert!(matches!(
            PackageDocument::from_declaration(id.clone(), bundle, now),
            Err(ResourceError::InvalidDeclaration(_))
        ));

        let dup = PackageDeclaration {
            kind: PackageKind::Charm,
            public: false,
            resources: vec![slot("data"), slot("data")],
        };
        assert!(matches!(
            PackageDocument::from_declaration(id.clone(), dup, now),
            Err(ResourceError::InvalidDeclaration(_))
        ));

        let bad_name = PackageDeclaration {
            kind: PackageKind::Charm,
            public: false,
            resources: vec![slot("../etc")],
        };
        assert!(PackageDocument::from_declaration(id.clone(), bad_name, now).is_err());

        let ok = PackageDeclaration {
            kind: PackageKind::Charm,
            public: false,
            resources: vec![slot("zeta"), slot("alpha")],
        };
        let mut doc = PackageDocument::from_declaration(id, ok, now).unwrap();
        assert!(doc.supports_resources());
        assert_eq!(doc.resources.keys().collect::<Vec<_>>(), ["alpha", "zeta"]);
        assert_eq!(doc.revision_counter("alpha"), 0);

        assert_eq!(doc.take_revision("alpha"), Some(0));
        assert_eq!(doc.take_revision("alpha"), Some(1));
        assert_eq!(doc.revision_counter("alpha"), 2);
        assert_eq!(doc.revision_counter("zeta"), 0);
        doc.revision_counters.insert("zeta".into(), Revision::MAX);
        assert_eq!(doc.take_revision("zeta"), None);
        assert_eq!(doc.revision_counter("zeta"), Revision::MAX);
        assert!(matches!(
            doc.slot("missing"),
            Err(ResourceError::UnknownResource { .. })
        ));
    }

    #[test]
    fn blob_names_are_unique_hex() {
        let a = BlobName::generate();
        let b = BlobName::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
        assert!(a.as_str().bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn document_json_shape() {
        let json = r#"{
            "id": "pkg",
            "kind": "charm",
            "public": true,
            "resources": {"data": {"name": "data", "type": "oci-image"}},
            "created_at": "2026-01-01T00:00:00Z"
        }"#;
        let doc: PackageDocument = serde_json::from_str(json).unwrap();
        assert_eq!(doc.slot("data").unwrap().kind, ResourceType::OciImage);
        assert!(doc.published.is_empty());
        assert_eq!(doc.published_revision("stable", "data"), None);
    }
}
