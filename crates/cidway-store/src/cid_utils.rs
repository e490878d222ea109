//! CID (Content Identifier) utilities
//!
//! CIDs travel through cidway as opaque strings. Parsing is only used to
//! report validity and to mint identifiers in the memory store.

use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw binary multicodec (0x55)
const RAW_CODEC: u64 = 0x55;

/// An opaque content identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wrap a CID string without interpreting it
    pub fn new(cid: impl Into<String>) -> Self {
        Self(cid.into())
    }

    /// Borrow the CID string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Consume into the inner string
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<Cid> for ContentId {
    fn from(cid: Cid) -> Self {
        Self(cid.to_string())
    }
}

/// Create a CIDv1 (raw, SHA2-256) for data
pub fn create_cid(data: &[u8]) -> ContentId {
    let multihash = Code::Sha2_256.digest(data);
    Cid::new_v1(RAW_CODEC, multihash).into()
}

/// Whether the string parses as a CIDv0 or CIDv1
pub fn is_valid_cid(s: &str) -> bool {
    s.parse::<Cid>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_create_cid_is_stable() {
        let cid1 = create_cid(b"test data");
        let cid2 = create_cid(b"test data");

        assert_eq!(cid1, cid2);
        assert!(is_valid_cid(cid1.as_str()));
    }

    #[test]
    fn test_different_data_different_cid() {
        assert_ne!(create_cid(b"data1"), create_cid(b"data2"));
    }

    #[rstest]
    #[case("QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG", true)]
    #[case("bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi", true)]
    #[case("Qm123", false)]
    #[case("", false)]
    fn test_is_valid_cid(#[case] input: &str, #[case] valid: bool) {
        assert_eq!(is_valid_cid(input), valid);
    }

    #[test]
    fn test_content_id_is_transparent_in_json() {
        let cid = ContentId::new("bafyabc");
        assert_eq!(serde_json::to_string(&cid).unwrap(), "\"bafyabc\"");
        assert!(ContentId::new("  ").is_empty());
    }
}
