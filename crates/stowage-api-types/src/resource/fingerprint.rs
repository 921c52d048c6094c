use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha384};
use std::fmt;
use std::str::FromStr;

use super::InvalidIdentifier;

pub const FINGERPRINT_LEN: usize = 48;

/// SHA-384 of a resource's content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    #[must_use]
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Hashes an in-memory buffer in one go.
    #[must_use]
    pub fn of(data: &[u8]) -> Self {
        let mut hasher = FingerprintHasher::new();
        hasher.observe(data);
        hasher.finalize()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = [0u8; FINGERPRINT_LEN * 2];
        // can't fail, the buffer is exactly twice the input
        let _ = hex::encode_to_slice(self.0, &mut buf);
        f.write_str(std::str::from_utf8(&buf).map_err(|_| fmt::Error)?)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

impl FromStr for Fingerprint {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; FINGERPRINT_LEN];
        hex::decode_to_slice(s, &mut bytes).map_err(|_| InvalidIdentifier::new("fingerprint", s))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct HexVisitor;

        impl Visitor<'_> for HexVisitor {
            type Value = Fingerprint;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{} hex chars", FINGERPRINT_LEN * 2)
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<Self::Value, E> {
                s.parse()
                    .map_err(|_| E::invalid_value(de::Unexpected::Str(s), &self))
            }
        }

        deserializer.deserialize_str(HexVisitor)
    }
}

/// Computes a [`Fingerprint`] over chunks as they stream past, without keeping them.
#[derive(Clone, Default)]
pub struct FingerprintHasher {
    hasher: Sha384,
    observed: u64,
}

impl FingerprintHasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.observed += chunk.len() as u64;
    }

    /// Number of bytes seen so far.
    #[must_use]
    pub fn observed_len(&self) -> u64 {
        self.observed
    }

    #[must_use]
    pub fn finalize(self) -> Fingerprint {
        let mut bytes = [0u8; FINGERPRINT_LEN];
        bytes.copy_from_slice(&self.hasher.finalize());
        Fingerprint(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // sha384("hello")
    const HELLO: &str = "59e1748777448c69de6b800d7a33bbfb9ff1b463e44354c3553bcdb9c666fa90125a3c79f90397bdf5f6a13de828684f";

    #[test]
    fn chunked_matches_one_shot() {
        let mut hasher = FingerprintHasher::new();
        hasher.observe(b"he");
        hasher.observe(b"");
        hasher.observe(b"llo");
        assert_eq!(hasher.observed_len(), 5);
        let fp = hasher.finalize();
        assert_eq!(fp, Fingerprint::of(b"hello"));
        assert_eq!(fp.to_string(), HELLO);
    }

    #[test]
    fn parse_and_serde() {
        let fp: Fingerprint = HELLO.parse().unwrap();
        assert_eq!(fp, Fingerprint::of(b"hello"));
        assert!("abcd".parse::<Fingerprint>().is_err());
        assert!(HELLO.replace('5', "x").parse::<Fingerprint>().is_err());

        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{HELLO}\""));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
