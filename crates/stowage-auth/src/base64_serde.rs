//! Fixed-size byte arrays as unpadded URL-safe base64 strings.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::{Error, Unexpected};
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer, const N: usize>(binary: &[u8; N], serializer: S) -> Result<S::Ok, S::Error> {
    let mut tmp = String::with_capacity(encoded_len(N));
    encode(binary, &mut tmp);
    serializer.serialize_str(&tmp)
}

pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error> {
    let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
    decode(&s).ok_or_else(|| {
        D::Error::invalid_value(
            Unexpected::Str(&s),
            &format!("{} base64 chars for {N} bytes", encoded_len(N)).as_str(),
        )
    })
}

pub fn encode<const N: usize>(binary: &[u8; N], out: &mut String) {
    URL_SAFE_NO_PAD.encode_string(binary, out);
}

/// Only accepts exactly the length that `N` bytes encode to.
pub fn decode<const N: usize>(base64: &str) -> Option<[u8; N]> {
    if base64.len() != encoded_len(N) {
        return None;
    }
    let mut buf = [0u8; N];
    // the checked variant compares against a pessimistic estimate that no exact length passes
    let written = URL_SAFE_NO_PAD.decode_slice_unchecked(base64, &mut buf).ok()?;
    (written == N).then_some(buf)
}

fn encoded_len(bytes: usize) -> usize {
    base64::encoded_len(bytes, false).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn check<const N: usize>() {
        let input = [0xa5; N];
        let mut out = String::new();
        encode(&input, &mut out);
        assert_eq!(out.len(), encoded_len(N));
        assert_eq!(decode::<N>(&out), Some(input));

        out.push('A');
        assert!(decode::<N>(&out).is_none());
        out.truncate(out.len() - 2);
        assert!(decode::<N>(&out).is_none());
    }

    #[test]
    fn fixed_lengths() {
        check::<18>();
        check::<21>();
        check::<28>();
        check::<32>();
    }

    #[test]
    fn pepper_from_json() {
        #[derive(serde::Deserialize)]
        struct Wrapper(#[serde(with = "super")] [u8; 18]);

        let Wrapper(pepper) = serde_json::from_str("\"AAAAAAAAAAAAAAAAAAAAAAAA\"").unwrap();
        assert_eq!(pepper, [0; 18]);
        assert!(serde_json::from_str::<Wrapper>("\"AAAA\"").is_err());
    }
}
