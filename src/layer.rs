use crate::cache::FingerprintCache;
use crate::config::SqueezeConfig;
use crate::pipeline::Squeeze;
use crate::service::SqueezeService;
use std::sync::Arc;
use tower::Layer;

/// A Tower layer that minifies and compresses HTTP response bodies.
///
/// Every service produced by one layer shares the same pipeline and therefore
/// the same static resource cache.
#[derive(Debug, Clone)]
pub struct SqueezeLayer {
    squeeze: Arc<Squeeze>,
}

impl SqueezeLayer {
    /// Creates a new layer with its own cache.
    ///
    /// If `config.cache_dir` is set, the cache is loaded from and persisted
    /// to that directory.
    pub fn new(config: SqueezeConfig) -> Self {
        Self {
            squeeze: Arc::new(Squeeze::new(config)),
        }
    }

    /// Creates a new layer that stores static resources in `cache`.
    ///
    /// `config.cache_dir` is ignored; persistence is a property of `cache`.
    pub fn with_cache(config: SqueezeConfig, cache: Arc<FingerprintCache>) -> Self {
        Self {
            squeeze: Arc::new(Squeeze::with_cache(config, cache)),
        }
    }

    /// Returns the pipeline shared by services built from this layer.
    pub fn squeeze(&self) -> &Arc<Squeeze> {
        &self.squeeze
    }
}

impl Default for SqueezeLayer {
    fn default() -> Self {
        Self::new(SqueezeConfig::default())
    }
}

impl<S> Layer<S> for SqueezeLayer {
    type Service = SqueezeService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SqueezeService::new(inner, Arc::clone(&self.squeeze))
    }
}
