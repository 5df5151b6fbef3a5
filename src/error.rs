use crate::codec::Codec;
use std::io;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by [`SqueezeService`](crate::SqueezeService).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the squeeze pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An encoding name that does not map to a [`Codec`].
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// A minification name that does not map to a [`Minification`](crate::Minification).
    #[error("Unsupported minification: {0}")]
    UnsupportedMinification(String),

    /// The codec was compiled out of this build.
    #[error("codec `{}` is not enabled in this build", .0.content_encoding())]
    CodecUnavailable(Codec),

    /// The compressor failed while encoding.
    #[error("{} compression failed: {source}", codec.content_encoding())]
    Compress {
        /// Codec that failed.
        codec: Codec,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Filesystem error from the persistent cache.
    #[error("cache I/O error: {0}")]
    Io(#[from] io::Error),

    /// Cache metadata could not be encoded or decoded.
    #[error("cache metadata error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
