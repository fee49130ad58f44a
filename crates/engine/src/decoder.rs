//! Wires a worker onto a real `.om` file over HTTP: trailer fetch,
//! variable resolution, and streaming chunk decode, reporting every byte
//! and the job's single slice-completion event through the pool's
//! [`DecodeEvents`] so the scheduler's bandwidth tracker sees it.

use net_fetch::HttpRangeSource;
use om_format::{ChunkDecoder, ChunkDecoderConfig, DeflateCodec, OmError, Trailer, RangeSource, TRAILER_SIZE};
use reqwest::Client;
use std::sync::Arc;
use tile_common::EngineError;
use worker_pool::{CancelToken, DecodeEvents, Decoder, FetchJob, SliceEvent};

/// One worker's decode capability: a fresh [`ChunkDecoder`] per worker
/// slot, the way `worker-pool`'s factory model expects, sharing one
/// [`reqwest::Client`] (connection pooling) across every instance.
pub struct OmHttpDecoder {
    client: Client,
    chunk_decoder: ChunkDecoder<DeflateCodec>,
}

impl OmHttpDecoder {
    pub fn new(client: Client, slice_count: usize) -> Self {
        Self {
            client,
            chunk_decoder: ChunkDecoder::new(DeflateCodec, ChunkDecoderConfig { slices: slice_count.max(1) }),
        }
    }
}

#[async_trait::async_trait]
impl Decoder for OmHttpDecoder {
    async fn decode(
        &mut self,
        job: &FetchJob,
        events: &DecodeEvents,
        cancel: &CancelToken,
    ) -> Result<Vec<f32>, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Aborted);
        }

        let on_bytes = events.on_bytes.clone();
        let source =
            HttpRangeSource::new(self.client.clone(), job.url.clone()).with_progress(Arc::new(move |n| on_bytes(n)));

        let content_len = source.fetch_head().await?;
        if content_len < TRAILER_SIZE {
            return Err(EngineError::Decode { code: -1, offset: 0 });
        }
        let trailer_bytes = source
            .fetch_range(content_len - TRAILER_SIZE, TRAILER_SIZE)
            .await
            .map_err(to_engine_error)?;
        let trailer = Trailer::parse(&trailer_bytes).map_err(to_engine_error)?;

        if cancel.is_cancelled() {
            return Err(EngineError::Aborted);
        }

        let variable = om_format::variable::resolve_variable(&source, trailer, &job.param_id)
            .await
            .map_err(to_engine_error)?;

        if cancel.is_cancelled() {
            return Err(EngineError::Aborted);
        }

        let decoded = self.chunk_decoder.decode_all(&source, &variable).await.map_err(to_engine_error)?;

        (events.on_slice)(SliceEvent { slice_index: 0, total_slices: 1, done: true });
        Ok(decoded)
    }
}

fn to_engine_error(err: OmError) -> EngineError {
    match err {
        OmError::VariableNotFound { name, available } => EngineError::VariableNotFound { name, available },
        OmError::Decode { code, offset } => EngineError::Decode { code, offset },
        OmError::Source(detail) => EngineError::Network { url: String::new(), status: None, detail },
        other => EngineError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_engine_error_preserves_variable_not_found() {
        let err = OmError::VariableNotFound { name: "t2m".into(), available: vec!["u10".into()] };
        match to_engine_error(err) {
            EngineError::VariableNotFound { name, available } => {
                assert_eq!(name, "t2m");
                assert_eq!(available, vec!["u10".to_string()]);
            }
            other => panic!("unexpected conversion: {other:?}"),
        }
    }
}
