//! HTTP response minification and compression middleware for Tower.
//!
//! This crate provides a Tower layer that minifies JavaScript, JSON, CSS and
//! HTML responses and compresses them with Brotli, Deflate or Gzip based on
//! the client's `Accept-Encoding` header. Responses under the static prefix
//! (`/static/` by default) are processed once and served from a
//! fingerprint cache afterwards, optionally persisted to disk.
//!
//! # Example
//!
//! ```ignore
//! use http_response_squeeze::{SqueezeConfig, SqueezeLayer};
//! use tower::ServiceBuilder;
//!
//! let config = SqueezeConfig::from_env()?.cache_dir("/var/cache/squeeze");
//! let service = ServiceBuilder::new()
//!     .layer(SqueezeLayer::new(config))
//!     .service(my_service);
//! ```
//!
//! # Processing Rules
//!
//! The middleware will **not** touch responses when:
//! - The status code is outside 2xx
//! - The body is smaller than the minimum size (default: 500 bytes)
//! - `Content-Encoding` header is already set
//! - `Content-Range` header is set (partial responses)
//! - No supported `Accept-Encoding` is present and the `Content-Type` has no
//!   enabled minifier
//!
//! Codecs are picked in the fixed order Brotli, Deflate, Gzip. Client quality
//! values only matter when they are zero.
//!
//! # Static Resources
//!
//! For a path under the static prefix, the processed body is stored under
//! (path, codec, minified) together with the SHA-256 of the raw body. A later
//! request is served from the cache only if the raw body still hashes the same.
//!
//! # Response Modifications
//!
//! When a response is processed:
//! - `Content-Encoding` is set to the codec used, if any
//! - `Content-Length` is set to the new body length
//! - `Accept-Ranges` is removed when compressing
//! - `Vary` includes `Accept-Encoding` when compressing
//! - `x-squeeze-*` headers describe what was done, and compressed dynamic
//!   responses get a random-length `x-squeeze-breach-protection` header

#![deny(missing_docs)]

mod body;
mod cache;
mod codec;
mod config;
mod error;
mod future;
mod headers;
mod layer;
mod minify;
mod pipeline;
mod service;
mod timing;

pub use body::SqueezeBody;
pub use cache::{CacheEntry, CacheKey, FingerprintCache, fingerprint};
pub use codec::{Codec, CompressInfo, compress};
pub use config::{
    DEFAULT_MIN_SIZE, DEFAULT_STATIC_PREFIX, Quality, ResourceClass, SqueezeConfig,
};
pub use error::{BoxError, Error, Result};
pub use future::ResponseFuture;
pub use headers::{
    CacheStatus, X_SQUEEZE_BREACH_PROTECTION, X_SQUEEZE_CACHE, X_SQUEEZE_COMPRESS,
    X_SQUEEZE_DURATION, X_SQUEEZE_MINIFY, X_SQUEEZE_ORIGINAL_CONTENT_LENGTH,
};
pub use layer::SqueezeLayer;
pub use minify::{Minification, MinifyInfo, minify};
pub use pipeline::{Outcome, RequestInfo, SkipReason, Squeeze};
pub use service::SqueezeService;
