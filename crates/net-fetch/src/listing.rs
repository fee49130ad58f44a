//! S3 `ListObjectsV2` XML traversal, used by the timestep catalog to
//! enumerate months, days, and runs under a model prefix.

use reqwest::Client;
use serde::Deserialize;
use tile_common::EngineError;
use tracing::instrument;

/// One page of a delimited listing: directory-like prefixes (when a
/// `delimiter` was given) and leaf object keys.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ListResult {
    pub common_prefixes: Vec<String>,
    pub contents: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default, rename = "CommonPrefixes")]
    common_prefixes: Vec<CommonPrefixEntry>,
    #[serde(default, rename = "Contents")]
    contents: Vec<ContentEntry>,
}

#[derive(Debug, Deserialize)]
struct CommonPrefixEntry {
    #[serde(rename = "Prefix")]
    prefix: String,
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    #[serde(rename = "Key")]
    key: String,
}

/// `GET <bucket_url>/?list-type=2&prefix=P&delimiter=/`, returning the
/// `CommonPrefixes/Prefix` and `Contents/Key` entries of one page.
///
/// Pagination (`IsTruncated`/`NextContinuationToken`) is not implemented:
/// the catalog only ever lists within a bounded two-month window, which a
/// single page comfortably covers for the run cadences this engine targets.
#[instrument(skip(client), fields(prefix = %prefix))]
pub async fn list_prefix(client: &Client, bucket_url: &str, prefix: &str) -> Result<ListResult, EngineError> {
    let resp = client
        .get(bucket_url)
        .query(&[("list-type", "2"), ("prefix", prefix), ("delimiter", "/")])
        .send()
        .await
        .map_err(|e| EngineError::Network {
            url: bucket_url.to_string(),
            status: e.status().map(|s| s.as_u16()),
            detail: e.to_string(),
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(EngineError::Network {
            url: bucket_url.to_string(),
            status: Some(status.as_u16()),
            detail: format!("LIST returned {status}"),
        });
    }

    let body = resp.text().await.map_err(|e| EngineError::Network {
        url: bucket_url.to_string(),
        status: None,
        detail: format!("reading LIST body failed: {e}"),
    })?;

    let parsed: ListBucketResult = quick_xml::de::from_str(&body)
        .map_err(|e| EngineError::Internal(format!("malformed LIST XML: {e}")))?;

    Ok(ListResult {
        common_prefixes: parsed.common_prefixes.into_iter().map(|p| p.prefix).collect(),
        contents: parsed.contents.into_iter().map(|c| c.key).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_prefixes_and_contents() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>weather-data</Name>
  <Prefix>gfs/</Prefix>
  <CommonPrefixes><Prefix>gfs/2026/</Prefix></CommonPrefixes>
  <CommonPrefixes><Prefix>gfs/2025/</Prefix></CommonPrefixes>
  <Contents><Key>gfs/latest.json</Key></Contents>
</ListBucketResult>"#;

        let parsed: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert_eq!(parsed.common_prefixes.len(), 2);
        assert_eq!(parsed.common_prefixes[0].prefix, "gfs/2026/");
        assert_eq!(parsed.contents.len(), 1);
        assert_eq!(parsed.contents[0].key, "gfs/latest.json");
    }

    #[test]
    fn tolerates_an_empty_page() {
        let xml = r#"<ListBucketResult><Name>b</Name></ListBucketResult>"#;
        let parsed: ListBucketResult = quick_xml::de::from_str(xml).unwrap();
        assert!(parsed.common_prefixes.is_empty());
        assert!(parsed.contents.is_empty());
    }
}
