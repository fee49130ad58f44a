//! Ranged HTTP reads against a single `.om` file.

use bytes::Bytes;
use om_format::{OmError, RangeSource};
use reqwest::Client;
use std::sync::Arc;
use tile_common::EngineError;
use tracing::{debug, instrument};

/// Invoked with the number of bytes a successful range fetch returned, so
/// the scheduler's bandwidth tracker can append a sample without this
/// crate knowing anything about scheduling.
pub type ProgressSink = Arc<dyn Fn(u64) + Send + Sync>;

/// A [`RangeSource`] backed by a single HTTP object. One instance is
/// created per in-flight task so the worker pool can drive the chunk
/// decoder without any shared mutable state.
pub struct HttpRangeSource {
    client: Client,
    url: String,
    progress: Option<ProgressSink>,
}

impl HttpRangeSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self { client, url: url.into(), progress: None }
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// `HEAD` the object; the engine trusts `Content-Length` as stable for
    /// the file's lifetime.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_head(&self) -> Result<u64, EngineError> {
        let resp = self.client.head(&self.url).send().await.map_err(|e| EngineError::Network {
            url: self.url.clone(),
            status: e.status().map(|s| s.as_u16()),
            detail: e.to_string(),
        })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EngineError::Network {
                url: self.url.clone(),
                status: Some(status.as_u16()),
                detail: format!("HEAD returned {status}"),
            });
        }
        resp.content_length().ok_or_else(|| EngineError::Network {
            url: self.url.clone(),
            status: Some(status.as_u16()),
            detail: "response carried no Content-Length".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl RangeSource for HttpRangeSource {
    #[instrument(skip(self), fields(url = %self.url, offset, len))]
    async fn fetch_range(&self, offset: u64, len: u64) -> Result<Bytes, OmError> {
        let last = offset + len - 1;
        let range_header = format!("bytes={offset}-{last}");

        let resp = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, &range_header)
            .send()
            .await
            .map_err(|e| OmError::Source(format!("GET {} failed: {e}", self.url)))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::PARTIAL_CONTENT {
            return Err(OmError::Source(format!(
                "GET {} ({range_header}) returned {status}",
                self.url
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| OmError::Source(format!("reading body of {} failed: {e}", self.url)))?;

        if bytes.len() as u64 != len {
            return Err(OmError::Source(format!(
                "short read from {}: expected {len} bytes, got {}",
                self.url,
                bytes.len()
            )));
        }

        debug!(bytes = bytes.len(), "range fetch complete");
        if let Some(sink) = &self.progress {
            sink(bytes.len() as u64);
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn progress_sink_is_additive() {
        let total = Arc::new(AtomicU64::new(0));
        let total2 = total.clone();
        let sink: ProgressSink = Arc::new(move |n| {
            total2.fetch_add(n, Ordering::SeqCst);
        });
        sink(10);
        sink(20);
        assert_eq!(total.load(Ordering::SeqCst), 30);
    }
}
