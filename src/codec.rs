use crate::error::{Error, Result};
use crate::timing::{self, Timed};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Supported compression codecs, highest preference first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    /// Brotli compression.
    Brotli,
    /// Deflate (zlib-wrapped) compression.
    Deflate,
    /// Gzip compression.
    Gzip,
}

impl Codec {
    /// Codecs in server preference order.
    pub const PREFERENCE: [Codec; 3] = [Codec::Brotli, Codec::Deflate, Codec::Gzip];

    /// Returns the Content-Encoding header value for this codec.
    pub fn content_encoding(&self) -> &'static str {
        match self {
            Codec::Brotli => "br",
            Codec::Deflate => "deflate",
            Codec::Gzip => "gzip",
        }
    }

    /// Returns true if this codec was compiled into the crate.
    pub fn is_enabled(&self) -> bool {
        match self {
            Codec::Brotli => cfg!(feature = "brotli"),
            Codec::Deflate => cfg!(feature = "deflate"),
            Codec::Gzip => cfg!(feature = "gzip"),
        }
    }

    /// Highest quality level this codec understands.
    pub fn max_quality(&self) -> u32 {
        match self {
            Codec::Brotli => 11,
            Codec::Deflate | Codec::Gzip => 9,
        }
    }

    /// Picks the codec for a response.
    ///
    /// Returns `None` when compression is disabled, the header is missing, or
    /// the client accepts none of the enabled codecs.
    pub fn select(accept_encoding: Option<&str>, compression_enabled: bool) -> Option<Codec> {
        if !compression_enabled {
            return None;
        }
        accept_encoding.and_then(Codec::from_accept_encoding)
    }

    /// Parses the Accept-Encoding header and returns the best supported codec.
    ///
    /// The header value is expected to be comma-separated encodings with optional
    /// quality values (e.g., "gzip, br;q=1.0, deflate;q=0.8"). Client quality
    /// values only matter when they are zero; otherwise the server preference
    /// order decides.
    pub fn from_accept_encoding(header: &str) -> Option<Codec> {
        let mut accepted = Vec::with_capacity(3);
        let mut refused = Vec::new();
        let mut wildcard = false;

        for part in header.split(',') {
            let (encoding, quality) = parse_encoding_with_quality(part.trim());
            let encoding = encoding.to_ascii_lowercase();

            let codec = match encoding.as_str() {
                "br" | "brotli" => Codec::Brotli,
                "deflate" => Codec::Deflate,
                "gzip" | "x-gzip" => Codec::Gzip,
                "*" => {
                    wildcard = quality > 0.0;
                    continue;
                }
                _ => continue,
            };

            // Skip if quality is 0
            if quality == 0.0 {
                refused.push(codec);
            } else {
                accepted.push(codec);
            }
        }

        Codec::PREFERENCE.into_iter().find(|codec| {
            codec.is_enabled()
                && !refused.contains(codec)
                && (wildcard || accepted.contains(codec))
        })
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "br" => Ok(Codec::Brotli),
            "deflate" => Ok(Codec::Deflate),
            "gzip" => Ok(Codec::Gzip),
            other => Err(Error::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// Parses an encoding entry like "gzip" or "br;q=0.8" into (encoding, quality).
fn parse_encoding_with_quality(s: &str) -> (&str, f32) {
    let mut parts = s.splitn(2, ';');
    let encoding = parts.next().unwrap_or("").trim();

    let quality = parts
        .next()
        .and_then(|q| {
            let q = q.trim();
            q.strip_prefix("q=")
                .or_else(|| q.strip_prefix("Q="))
                .and_then(|v| v.trim().parse::<f32>().ok())
        })
        .unwrap_or(1.0);

    (encoding, quality)
}

/// What the compressor did to a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressInfo {
    /// Codec used.
    pub codec: Codec,
    /// Effective quality after clamping.
    pub quality: u32,
    /// Time spent compressing.
    pub duration: Duration,
    /// Input length divided by output length.
    pub ratio: f64,
}

impl CompressInfo {
    /// Value of the `x-squeeze-compress` observability header.
    pub fn header_value(&self) -> String {
        format!(
            "ratio={:.1}x; quality={}; duration={}",
            self.ratio,
            self.quality,
            timing::format_millis(self.duration)
        )
    }
}

/// Compresses `data` with `codec` at `quality`.
///
/// Quality is clamped to the codec's range. Asking for a codec that was compiled
/// out is a contract violation and returns [`Error::CodecUnavailable`].
pub fn compress(data: &[u8], codec: Codec, quality: u32) -> Result<(Bytes, CompressInfo)> {
    if !codec.is_enabled() {
        return Err(Error::CodecUnavailable(codec));
    }
    let quality = quality.min(codec.max_quality());

    let Timed { value, elapsed } = timing::timed(|| match codec {
        #[cfg(feature = "brotli")]
        Codec::Brotli => encoders::brotli(data, quality),
        #[cfg(feature = "deflate")]
        Codec::Deflate => encoders::deflate(data, quality),
        #[cfg(feature = "gzip")]
        Codec::Gzip => encoders::gzip(data, quality),
        #[allow(unreachable_patterns)]
        _ => Err(std::io::Error::from(std::io::ErrorKind::Unsupported)),
    });
    let compressed = value.map_err(|source| Error::Compress { codec, source })?;

    let info = CompressInfo {
        codec,
        quality,
        duration: elapsed,
        ratio: timing::ratio(data.len(), compressed.len()),
    };
    Ok((Bytes::from(compressed), info))
}

mod encoders {
    #[cfg(any(feature = "gzip", feature = "deflate"))]
    use std::io::Write;
    #[allow(unused_imports)]
    use std::io;

    #[cfg(feature = "brotli")]
    const BROTLI_WINDOW: i32 = 22;

    #[cfg(feature = "brotli")]
    pub(super) fn brotli(data: &[u8], quality: u32) -> io::Result<Vec<u8>> {
        let params = brotli::enc::BrotliEncoderParams {
            quality: quality as i32,
            lgwin: BROTLI_WINDOW,
            ..Default::default()
        };
        let mut output = Vec::with_capacity(data.len() / 2);
        let mut input = data;
        brotli::BrotliCompress(&mut input, &mut output, &params)?;
        Ok(output)
    }

    #[cfg(feature = "deflate")]
    pub(super) fn deflate(data: &[u8], quality: u32) -> io::Result<Vec<u8>> {
        let mut encoder = flate2::write::ZlibEncoder::new(
            Vec::with_capacity(data.len() / 2),
            flate2::Compression::new(quality),
        );
        encoder.write_all(data)?;
        encoder.finish()
    }

    #[cfg(feature = "gzip")]
    pub(super) fn gzip(data: &[u8], quality: u32) -> io::Result<Vec<u8>> {
        let mut encoder = flate2::write::GzEncoder::new(
            Vec::with_capacity(data.len() / 2),
            flate2::Compression::new(quality),
        );
        encoder.write_all(data)?;
        encoder.finish()
    }
}
