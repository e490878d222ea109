//! CID extraction from the URL shapes content is referenced by
//!
//! Supported inputs:
//! - bare CIDs: `bafy...`, `Qm...`
//! - scheme form: `ipfs://<cid>`
//! - path gateways: `https://<host>/ipfs/<cid>[?query]`
//! - subdomain gateways: `https://<cid>.ipfs.<host>/`
//!
//! Anything else is returned as-is after cleaning; extraction never fails
//! on malformed input.

use cidway_store::ContentId;

const IPFS_SCHEME: &str = "ipfs://";
const PATH_MARKER: &str = "/ipfs/";
const SUBDOMAIN_MARKER: &str = ".ipfs.";

/// Extract the CID referenced by `url`; empty input yields `None`
pub fn extract_cid(url: &str) -> Option<ContentId> {
    let cleaned = url.trim();
    if cleaned.is_empty() {
        return None;
    }
    let cleaned = cleaned.strip_prefix(IPFS_SCHEME).unwrap_or(cleaned);

    let candidate = match cleaned.find(PATH_MARKER) {
        Some(at) => strip_query(&cleaned[at + PATH_MARKER.len()..]),
        None => cleaned,
    };
    let candidate = subdomain_label(candidate).unwrap_or(candidate);
    let candidate = candidate.trim_end_matches('/');

    if candidate.is_empty() {
        None
    } else {
        Some(ContentId::new(candidate))
    }
}

/// [`extract_cid`] for optional input
pub fn extract_cid_opt(url: Option<&str>) -> Option<ContentId> {
    url.and_then(extract_cid)
}

/// Gateway path for a CID: `/ipfs/<cid>`
pub fn ipfs_path(cid: &ContentId) -> String {
    format!("{}{}", PATH_MARKER, cid)
}

fn strip_query(s: &str) -> &str {
    s.split(['?', '#']).next().unwrap_or(s)
}

/// `https://<label>.ipfs.<host>/...` -> `<label>`
fn subdomain_label(candidate: &str) -> Option<&str> {
    let without_scheme = candidate
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(candidate);
    let host = without_scheme.split(['/', '?', '#']).next()?;
    let (label, _) = host.split_once(SUBDOMAIN_MARKER)?;
    (!label.is_empty()).then_some(label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const CID: &str = "bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

    #[rstest]
    #[case::scheme("ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi")]
    #[case::path_gateway_with_query(
        "https://gw.example/ipfs/bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi?q=1"
    )]
    #[case::path_gateway(
        "https://ipfs.io/ipfs/bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi"
    )]
    #[case::subdomain_gateway(
        "https://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi.ipfs.dweb.link/"
    )]
    #[case::bare("bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi")]
    #[case::padded("  bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi\n")]
    #[case::scheme_trailing_slash("ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi/")]
    fn test_supported_shapes(#[case] input: &str) {
        assert_eq!(extract_cid(input), Some(ContentId::new(CID)));
    }

    #[test]
    fn test_bare_cid_is_unchanged() {
        let bare = "QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG";
        assert_eq!(extract_cid(bare).unwrap().as_str(), bare);
    }

    #[test]
    fn test_empty_behaves_like_none() {
        assert_eq!(extract_cid(""), None);
        assert_eq!(extract_cid("   "), None);
        assert_eq!(extract_cid_opt(None), None);
        assert_eq!(extract_cid_opt(Some("")), extract_cid_opt(None));
    }

    #[test]
    fn test_path_gateway_keeps_inner_path() {
        let cid = extract_cid("https://gw.example/ipfs/bafyroot/images/1.png?download=true");
        assert_eq!(cid.unwrap().as_str(), "bafyroot/images/1.png");
    }

    #[test]
    fn test_fragment_is_dropped() {
        let cid = extract_cid("https://gw.example/ipfs/bafyroot#section");
        assert_eq!(cid.unwrap().as_str(), "bafyroot");
    }

    #[test]
    fn test_unmatched_input_falls_back_to_cleaned_string() {
        assert_eq!(
            extract_cid("https://example.com/not-ipfs").unwrap().as_str(),
            "https://example.com/not-ipfs"
        );
        assert_eq!(extract_cid("ipfs://"), None);
        assert_eq!(extract_cid("https://gw.example/ipfs/"), None);
    }

    #[test]
    fn test_ipfs_path() {
        assert_eq!(ipfs_path(&ContentId::new("bafyx")), "/ipfs/bafyx");
    }
}
