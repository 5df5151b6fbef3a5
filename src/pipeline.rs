//! The per-response decision pipeline.
//!
//! [`Squeeze::process`] takes a finished response, decides whether it should be
//! minified and/or compressed, serves static resources from the
//! [`FingerprintCache`] when their content is unchanged and rewrites the
//! response headers to match the new body.

use crate::cache::{self, CacheKey, FingerprintCache};
use crate::codec::{self, Codec};
use crate::config::{ResourceClass, SqueezeConfig};
use crate::error::Result;
use crate::headers::{self, CacheStatus, Rewrite};
use crate::minify::{self, Minification};
use bytes::Bytes;
use http::response::Parts;
use http::{Request, header};
use std::sync::Arc;
use std::time::Instant;

/// The parts of the request that influence how its response is processed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestInfo {
    /// Request path, without query string.
    pub path: String,
    /// Raw `Accept-Encoding` header value.
    pub accept_encoding: Option<String>,
}

impl RequestInfo {
    /// Creates request info from a path and an `Accept-Encoding` value.
    pub fn new(path: impl Into<String>, accept_encoding: Option<&str>) -> Self {
        Self {
            path: path.into(),
            accept_encoding: accept_encoding.map(str::to_string),
        }
    }

    /// Captures the path and `Accept-Encoding` header of `request`.
    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::new(
            request.uri().path(),
            request
                .headers()
                .get(header::ACCEPT_ENCODING)
                .and_then(|v| v.to_str().ok()),
        )
    }
}

/// Why a response was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Compression and every minifier are switched off.
    Disabled,
    /// Status code outside 2xx.
    Status,
    /// Body shorter than the configured minimum size.
    BelowMinSize,
    /// Response already carries a `Content-Encoding`.
    AlreadyEncoded,
    /// Response is a byte range (`Content-Range` is set).
    PartialContent,
    /// Neither a codec nor a minifier applies.
    NothingToDo,
}

/// What the pipeline did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Left unmodified.
    Skipped(SkipReason),
    /// Processed without caching.
    Dynamic,
    /// Served from the fingerprint cache.
    StaticHit,
    /// Processed and stored in the fingerprint cache.
    StaticMiss,
}

/// Decisions made before the body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Plan {
    pub(crate) codec: Option<Codec>,
    pub(crate) minification: Option<Minification>,
}

/// Minify and compress pipeline with its static resource cache.
#[derive(Debug)]
pub struct Squeeze {
    config: SqueezeConfig,
    cache: Arc<FingerprintCache>,
}

impl Squeeze {
    /// Creates a pipeline with its own cache.
    ///
    /// With `cache_dir` set, previously persisted entries are loaded. A cache
    /// directory that cannot be opened is logged and the cache stays in memory.
    pub fn new(config: SqueezeConfig) -> Self {
        let cache = match &config.cache_dir {
            Some(dir) => FingerprintCache::open(dir).unwrap_or_else(|err| {
                tracing::warn!(dir = %dir.display(), error = %err, "cannot open cache directory, caching in memory only");
                FingerprintCache::new()
            }),
            None => FingerprintCache::new(),
        };
        Self::with_cache(config, Arc::new(cache))
    }

    /// Creates a pipeline that shares `cache` with others.
    pub fn with_cache(config: SqueezeConfig, cache: Arc<FingerprintCache>) -> Self {
        Self { config, cache }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SqueezeConfig {
        &self.config
    }

    /// Returns the static resource cache.
    pub fn cache(&self) -> &Arc<FingerprintCache> {
        &self.cache
    }

    /// Processes one response and returns the body to send.
    ///
    /// `parts` is rewritten in place. On error `parts` is untouched and the
    /// caller should send the original body.
    pub fn process(&self, request: &RequestInfo, parts: &mut Parts, body: Bytes) -> Result<Bytes> {
        let (_, body) = self.run(request, parts, body)?;
        Ok(body)
    }

    /// Runs the guard checks that do not need the body.
    ///
    /// `len` is the body length when known; an unknown length is checked again
    /// once the body has been read.
    pub(crate) fn plan(
        &self,
        request: &RequestInfo,
        parts: &Parts,
        len: Option<usize>,
    ) -> std::result::Result<Plan, SkipReason> {
        if !self.config.is_active() {
            return Err(SkipReason::Disabled);
        }
        if !parts.status.is_success() {
            return Err(SkipReason::Status);
        }
        if len.is_some_and(|len| len < self.config.min_size) {
            return Err(SkipReason::BelowMinSize);
        }
        if headers::has_content_encoding(&parts.headers) {
            return Err(SkipReason::AlreadyEncoded);
        }
        if headers::has_content_range(&parts.headers) {
            return Err(SkipReason::PartialContent);
        }

        let plan = Plan {
            codec: Codec::select(request.accept_encoding.as_deref(), self.config.compress),
            minification: Minification::from_content_type(
                headers::content_type(&parts.headers),
                &self.config,
            ),
        };
        if plan.codec.is_none() && plan.minification.is_none() {
            return Err(SkipReason::NothingToDo);
        }
        Ok(plan)
    }

    pub(crate) fn run(
        &self,
        request: &RequestInfo,
        parts: &mut Parts,
        body: Bytes,
    ) -> Result<(Outcome, Bytes)> {
        let started = Instant::now();

        let plan = match self.plan(request, parts, Some(body.len())) {
            Ok(plan) => plan,
            Err(reason) => {
                let outcome = Outcome::Skipped(reason);
                self.log_outcome(request, parts, outcome, None);
                return Ok((outcome, body));
            }
        };

        let class = self.config.classify_path(&request.path);
        let mut rewrite = Rewrite::new(body.len());
        rewrite.encoding = plan.codec;

        let (outcome, output) = match class {
            ResourceClass::Dynamic => {
                let output = self.squeeze(&body, class, plan, &mut rewrite)?;
                if let Some(codec) = plan.codec {
                    rewrite.breach_padding =
                        Some(headers::breach_padding(codec, &mut rand::thread_rng()));
                }
                (Outcome::Dynamic, output)
            }
            ResourceClass::Static => self.run_static(request, &body, plan, &mut rewrite)?,
        };

        rewrite.final_len = output.len();
        if self.config.debug_headers {
            rewrite.duration = Some(started.elapsed());
        }
        rewrite.apply(&mut parts.headers);
        self.log_outcome(request, parts, outcome, Some(plan));

        Ok((outcome, output))
    }

    fn run_static(
        &self,
        request: &RequestInfo,
        body: &Bytes,
        plan: Plan,
        rewrite: &mut Rewrite,
    ) -> Result<(Outcome, Bytes)> {
        let path = request
            .path
            .strip_prefix(&self.config.static_prefix)
            .unwrap_or(&request.path);
        let key = CacheKey::new(path, plan.codec, plan.minification.is_some());
        let fingerprint = cache::fingerprint(body);

        if let Some(entry) = self.cache.get(&key).filter(|entry| entry.matches(&fingerprint)) {
            rewrite.cache = Some(CacheStatus::Hit);
            return Ok((Outcome::StaticHit, entry.payload.clone()));
        }

        let output = self.squeeze(body, ResourceClass::Static, plan, rewrite)?;
        self.cache.put(&key, fingerprint, output.clone());
        rewrite.cache = Some(CacheStatus::Miss);
        Ok((Outcome::StaticMiss, output))
    }

    /// Minifies then compresses, recording what happened in `rewrite`.
    fn squeeze(
        &self,
        body: &Bytes,
        class: ResourceClass,
        plan: Plan,
        rewrite: &mut Rewrite,
    ) -> Result<Bytes> {
        let mut data = body.clone();

        if let Some(minification) = plan.minification {
            let (minified, info) = minify::minify(&data, minification);
            rewrite.minify = Some(info);
            data = minified;
        }

        if let Some(codec) = plan.codec {
            let quality = self.config.quality.level(codec, class);
            let (compressed, info) = codec::compress(&data, codec, quality)?;
            rewrite.compress = Some(info);
            data = compressed;
        }

        Ok(data)
    }

    fn log_outcome(
        &self,
        request: &RequestInfo,
        parts: &Parts,
        outcome: Outcome,
        plan: Option<Plan>,
    ) {
        let codec = plan.and_then(|plan| plan.codec).map(|codec| codec.content_encoding());
        let minification = plan
            .and_then(|plan| plan.minification)
            .map(|minification| minification.name());
        if self.config.verbose_logging {
            tracing::debug!(path = %request.path, ?outcome, codec, minification, status = %parts.status, "squeeze");
        } else {
            tracing::trace!(path = %request.path, ?outcome, codec, minification, status = %parts.status, "squeeze");
        }
    }
}
