//! Response header rewriting.
//!
//! The pipeline records what it did in a [`Rewrite`] and applies it in one go
//! once every fallible step has succeeded, so a failed request leaves the
//! headers exactly as the inner service produced them.

use crate::codec::{Codec, CompressInfo};
use crate::minify::MinifyInfo;
use crate::timing;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use rand::Rng;
use rand::distributions::Alphanumeric;
use std::time::Duration;

/// `HIT` or `MISS` for static resources.
pub const X_SQUEEZE_CACHE: HeaderName = HeaderName::from_static("x-squeeze-cache");
/// Minification ratio and duration.
pub const X_SQUEEZE_MINIFY: HeaderName = HeaderName::from_static("x-squeeze-minify");
/// Compression ratio, quality and duration.
pub const X_SQUEEZE_COMPRESS: HeaderName = HeaderName::from_static("x-squeeze-compress");
/// Body length before processing.
pub const X_SQUEEZE_ORIGINAL_CONTENT_LENGTH: HeaderName =
    HeaderName::from_static("x-squeeze-original-content-length");
/// Random padding on compressed dynamic responses.
pub const X_SQUEEZE_BREACH_PROTECTION: HeaderName =
    HeaderName::from_static("x-squeeze-breach-protection");
/// Whole-pipeline wall time, only with debug headers enabled.
pub const X_SQUEEZE_DURATION: HeaderName = HeaderName::from_static("x-squeeze-duration");

const BREACH_PADDING_MIN: usize = 16;

/// Cache status of a static response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from the fingerprint cache.
    Hit,
    /// Processed and stored in the fingerprint cache.
    Miss,
}

impl CacheStatus {
    fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Header changes pending for one response.
#[derive(Debug, Clone, Default)]
pub(crate) struct Rewrite {
    pub(crate) encoding: Option<Codec>,
    pub(crate) original_len: usize,
    pub(crate) final_len: usize,
    pub(crate) cache: Option<CacheStatus>,
    pub(crate) minify: Option<MinifyInfo>,
    pub(crate) compress: Option<CompressInfo>,
    pub(crate) breach_padding: Option<String>,
    pub(crate) duration: Option<Duration>,
}

impl Rewrite {
    pub(crate) fn new(original_len: usize) -> Self {
        Self {
            original_len,
            final_len: original_len,
            ..Default::default()
        }
    }

    /// Applies the recorded changes to `headers`.
    pub(crate) fn apply(self, headers: &mut HeaderMap) {
        if let Some(codec) = self.encoding {
            headers.insert(
                header::CONTENT_ENCODING,
                HeaderValue::from_static(codec.content_encoding()),
            );
            // Byte ranges would refer to the encoded representation
            headers.remove(header::ACCEPT_RANGES);
            add_vary_accept_encoding(headers);
        }

        if self.final_len != self.original_len {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(self.final_len));
            headers.insert(
                X_SQUEEZE_ORIGINAL_CONTENT_LENGTH,
                HeaderValue::from(self.original_len),
            );
        }

        if let Some(status) = self.cache {
            headers.insert(X_SQUEEZE_CACHE, HeaderValue::from_static(status.as_str()));
        }
        if let Some(info) = self.minify {
            insert_string(headers, X_SQUEEZE_MINIFY, info.header_value());
        }
        if let Some(info) = self.compress {
            insert_string(headers, X_SQUEEZE_COMPRESS, info.header_value());
        }
        if let Some(padding) = self.breach_padding {
            insert_string(headers, X_SQUEEZE_BREACH_PROTECTION, padding);
        }
        if let Some(duration) = self.duration {
            insert_string(headers, X_SQUEEZE_DURATION, timing::format_millis(duration));
        }
    }
}

/// Random alphanumeric filler whose length varies per response, masking the
/// compressed size of reflected secrets.
pub(crate) fn breach_padding<R: Rng + ?Sized>(codec: Codec, rng: &mut R) -> String {
    let max = match codec {
        Codec::Brotli => 128,
        Codec::Deflate | Codec::Gzip => 64,
    };
    let len = rng.gen_range(BREACH_PADDING_MIN..=max);
    (0..len).map(|_| char::from(rng.sample(Alphanumeric))).collect()
}

/// Checks if Content-Encoding header is already present.
pub(crate) fn has_content_encoding(headers: &HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_ENCODING)
}

/// Returns true if the response describes a byte range of the resource.
pub(crate) fn has_content_range(headers: &HeaderMap) -> bool {
    headers.contains_key(header::CONTENT_RANGE)
}

/// Returns the Content-Type header as a string, if valid.
pub(crate) fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}

/// Returns the declared Content-Length, if present and valid.
pub(crate) fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
}

/// Adds Accept-Encoding to the Vary header if not already present.
fn add_vary_accept_encoding(headers: &mut HeaderMap) {
    let covered = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|vary| vary.to_str().ok())
        .flat_map(|vary| vary.split(','))
        .map(str::trim)
        .any(|v| v == "*" || v.eq_ignore_ascii_case("accept-encoding"));

    if !covered {
        headers.append(header::VARY, HeaderValue::from_static("accept-encoding"));
    }
}

fn insert_string(headers: &mut HeaderMap, name: HeaderName, value: String) {
    match HeaderValue::try_from(value) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(err) => tracing::debug!(header = %name, error = %err, "skipping invalid header value"),
    }
}
