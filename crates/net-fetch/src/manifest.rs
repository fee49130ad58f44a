//! `latest.json` manifest fetch.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tile_common::EngineError;
use tracing::instrument;

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub reference_time: DateTime<Utc>,
    pub valid_times: Vec<DateTime<Utc>>,
    pub variables: Vec<String>,
}

#[instrument(skip(client))]
pub async fn fetch_manifest(client: &Client, manifest_url: &str) -> Result<Manifest, EngineError> {
    let resp = client.get(manifest_url).send().await.map_err(|e| EngineError::Network {
        url: manifest_url.to_string(),
        status: e.status().map(|s| s.as_u16()),
        detail: e.to_string(),
    })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(EngineError::Network {
            url: manifest_url.to_string(),
            status: Some(status.as_u16()),
            detail: format!("manifest GET returned {status}"),
        });
    }

    resp.json::<Manifest>().await.map_err(|e| EngineError::Network {
        url: manifest_url.to_string(),
        status: None,
        detail: format!("malformed manifest JSON: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_a_manifest() {
        let json = r#"{
            "reference_time": "2026-08-01T12:00:00Z",
            "valid_times": ["2026-08-01T12:00:00Z", "2026-08-01T13:00:00Z"],
            "variables": ["t2m", "u10", "v10"]
        }"#;
        let manifest: Manifest = serde_json::from_str(json).unwrap();
        assert_eq!(manifest.valid_times.len(), 2);
        assert_eq!(manifest.variables, vec!["t2m", "u10", "v10"]);
    }
}
