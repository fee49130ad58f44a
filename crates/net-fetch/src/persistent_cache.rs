//! Client for the host's persistent-cache endpoint.
//!
//! The endpoint is a message-passing sink in the host environment (the
//! service-worker byte-range cache), not a server this crate owns. It is
//! soft-optional: [`TimeoutCache`] turns any transport failure or timeout
//! into the "no cache" default rather than propagating an error, so the
//! catalog never has to special-case its absence.

use std::time::Duration;
use tile_common::EngineError;
use tracing::warn;

pub const PERSISTENT_CACHE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatItem {
    pub url: String,
    pub size_mb: f64,
}

/// Message-passing transport to the host cache, one method per message
/// `type`. Implementations talk to the real endpoint and may fail or hang.
#[async_trait::async_trait]
pub trait RawPersistentCache: Send + Sync {
    async fn ping(&self) -> Result<(), EngineError>;
    async fn get_param_stats(&self, param: &str) -> Result<Vec<CacheStatItem>, EngineError>;
    async fn count_before_timestep(&self, cutoff_iso: &str) -> Result<u64, EngineError>;
    async fn clear_before_timestep(&self, cutoff_iso: &str) -> Result<u64, EngineError>;
    async fn clear_cache(&self) -> Result<bool, EngineError>;
    async fn clear_param_cache(&self, param: &str) -> Result<bool, EngineError>;
}

/// The effective, always-succeeds interface the catalog and scheduler use.
/// Every method degrades to its "absent" default on failure.
#[async_trait::async_trait]
pub trait PersistentCache: Send + Sync {
    async fn ping(&self) -> bool;
    async fn get_param_stats(&self, param: &str) -> Vec<CacheStatItem>;
    async fn count_before_timestep(&self, cutoff_iso: &str) -> u64;
    async fn clear_before_timestep(&self, cutoff_iso: &str) -> u64;
    async fn clear_cache(&self) -> bool;
    async fn clear_param_cache(&self, param: &str) -> bool;
}

/// Wraps a [`RawPersistentCache`] transport with the 5 s timeout and
/// failure-to-default mapping the endpoint's soft-optional contract calls
/// for.
pub struct TimeoutCache<T> {
    inner: T,
}

impl<T: RawPersistentCache> TimeoutCache<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

macro_rules! soft_call {
    ($self:expr, $method:ident $(, $arg:expr)*) => {{
        match tokio::time::timeout(PERSISTENT_CACHE_TIMEOUT, $self.inner.$method($($arg),*)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(error = %e, "persistent cache call failed, treating as absent");
                Default::default()
            }
            Err(_) => {
                warn!("persistent cache call timed out, treating as absent");
                Default::default()
            }
        }
    }};
}

#[async_trait::async_trait]
impl<T: RawPersistentCache> PersistentCache for TimeoutCache<T> {
    async fn ping(&self) -> bool {
        matches!(
            tokio::time::timeout(PERSISTENT_CACHE_TIMEOUT, self.inner.ping()).await,
            Ok(Ok(()))
        )
    }

    async fn get_param_stats(&self, param: &str) -> Vec<CacheStatItem> {
        soft_call!(self, get_param_stats, param)
    }

    async fn count_before_timestep(&self, cutoff_iso: &str) -> u64 {
        soft_call!(self, count_before_timestep, cutoff_iso)
    }

    async fn clear_before_timestep(&self, cutoff_iso: &str) -> u64 {
        soft_call!(self, clear_before_timestep, cutoff_iso)
    }

    async fn clear_cache(&self) -> bool {
        soft_call!(self, clear_cache)
    }

    async fn clear_param_cache(&self, param: &str) -> bool {
        soft_call!(self, clear_param_cache, param)
    }
}

/// A [`PersistentCache`] for hosts that expose no endpoint at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCache;

#[async_trait::async_trait]
impl PersistentCache for NullCache {
    async fn ping(&self) -> bool {
        false
    }

    async fn get_param_stats(&self, _param: &str) -> Vec<CacheStatItem> {
        Vec::new()
    }

    async fn count_before_timestep(&self, _cutoff_iso: &str) -> u64 {
        0
    }

    async fn clear_before_timestep(&self, _cutoff_iso: &str) -> u64 {
        0
    }

    async fn clear_cache(&self) -> bool {
        false
    }

    async fn clear_param_cache(&self, _param: &str) -> bool {
        false
    }
}
