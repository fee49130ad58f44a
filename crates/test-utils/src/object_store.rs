//! A `wiremock`-backed fake object store: manifest JSON, S3-style
//! delimited listings, and byte-range reads over a flat in-memory key
//! space, so `net-fetch`/`timestep-catalog`/`engine` tests exercise the
//! real HTTP code paths without a network.

use bytes::Bytes;
use std::collections::BTreeSet;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// A running fake bucket plus manifest endpoint. Register keys and a
/// manifest body, then read `manifest_url()`/`bucket_url()`/`om_url()` to
/// wire a `ModelConfig` at it.
pub struct ObjectStoreFixture {
    server: MockServer,
}

impl ObjectStoreFixture {
    /// Start the fixture server and mount a listing responder over
    /// `keys` (full object paths, e.g. `"gfs/2026080112/2026-08-01T1200.om"`)
    /// and a `HEAD`/`GET Range` responder for each `(path, bytes)` pair.
    pub async fn start(keys: Vec<String>, om_files: Vec<(String, Bytes)>) -> Self {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ListingResponder { keys })
            .mount(&server)
            .await;

        for (path, body) in om_files {
            let route = format!("/{}", path.trim_start_matches('/'));
            Mock::given(method("GET"))
                .and(wiremock::matchers::path(route.clone()))
                .respond_with(RangeResponder { body: body.clone() })
                .mount(&server)
                .await;
            Mock::given(method("HEAD"))
                .and(wiremock::matchers::path(route))
                .respond_with(RangeResponder { body })
                .mount(&server)
                .await;
        }

        Self { server }
    }

    /// Mount a manifest body at `/latest.json`. Call before reading
    /// [`Self::manifest_url`] if the test needs manifest discovery.
    pub async fn register_manifest(&self, json: String) {
        Mock::given(method("GET"))
            .and(wiremock::matchers::path("/latest.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string(json))
            .mount(&self.server)
            .await;
    }

    pub fn manifest_url(&self) -> String {
        format!("{}/latest.json", self.server.uri())
    }

    pub fn bucket_url(&self) -> String {
        self.server.uri()
    }

    pub fn om_url(&self, path: &str) -> String {
        format!("{}/{}", self.server.uri(), path.trim_start_matches('/'))
    }
}

/// Serves the `ListObjectsV2`-style XML [`net_fetch::list_prefix`] parses,
/// grouping `keys` by the request's `prefix`/`delimiter` query params the
/// way a real bucket listing does.
struct ListingResponder {
    keys: Vec<String>,
}

impl Respond for ListingResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let query: std::collections::HashMap<String, String> =
            request.url.query_pairs().into_owned().collect();
        // Only the listing endpoint carries `list-type`; other GETs (the
        // manifest, `.om` range reads) are handled by their own mounts,
        // which wiremock tries first by registration order for matching
        // routes, so this responder only ever sees bare listing requests.
        if !query.contains_key("list-type") {
            return ResponseTemplate::new(404);
        }

        let prefix = query.get("prefix").cloned().unwrap_or_default();
        let delimiter = query.get("delimiter").cloned();

        let mut common_prefixes = BTreeSet::new();
        let mut contents = Vec::new();
        for key in &self.keys {
            let Some(rest) = key.strip_prefix(prefix.as_str()) else { continue };
            if let Some(delim) = &delimiter {
                if let Some(idx) = rest.find(delim.as_str()) {
                    common_prefixes.insert(format!("{prefix}{}", &rest[..=idx]));
                    continue;
                }
            }
            contents.push(key.clone());
        }

        ResponseTemplate::new(200).set_body_string(render_list_bucket_xml(&common_prefixes, &contents))
    }
}

fn render_list_bucket_xml(common_prefixes: &BTreeSet<String>, contents: &[String]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult>"#);
    for prefix in common_prefixes {
        xml.push_str(&format!("<CommonPrefixes><Prefix>{prefix}</Prefix></CommonPrefixes>"));
    }
    for key in contents {
        xml.push_str(&format!("<Contents><Key>{key}</Key></Contents>"));
    }
    xml.push_str("</ListBucketResult>");
    xml
}

/// Serves `Content-Length` on `HEAD` and a `206 Partial Content` slice of
/// `body` on a ranged `GET`, the way `net_fetch::HttpRangeSource` expects.
struct RangeResponder {
    body: Bytes,
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        if request.method.as_str().eq_ignore_ascii_case("head") {
            return ResponseTemplate::new(200).append_header("Content-Length", self.body.len().to_string());
        }

        match request.headers.get("Range").and_then(|v| v.to_str().ok()) {
            Some(range) => match parse_range(range, self.body.len()) {
                Some((start, end)) => ResponseTemplate::new(206)
                    .set_body_bytes(self.body[start..=end].to_vec())
                    .append_header("Content-Range", format!("bytes {start}-{end}/{}", self.body.len())),
                None => ResponseTemplate::new(416),
            },
            None => ResponseTemplate::new(200).set_body_bytes(self.body.to_vec()),
        }
    }
}

fn parse_range(header: &str, body_len: usize) -> Option<(usize, usize)> {
    let spec = header.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    let start: usize = start.parse().ok()?;
    let end: usize = end.parse().ok()?;
    if end >= body_len || start > end {
        return None;
    }
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_range_rejects_out_of_bounds() {
        assert!(parse_range("bytes=0-9", 5).is_none());
        assert_eq!(parse_range("bytes=1-3", 10), Some((1, 3)));
    }
}
