//! Resource classification and minification of text payloads.
//!
//! Each minifier works on raw bytes and reports failure with `None`. [`minify`]
//! turns that into the original payload, so a response is never served
//! half-processed.

mod css;
mod html;
mod js;

use crate::config::SqueezeConfig;
use crate::error::{Error, Result};
use crate::timing::{self, Timed};
use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Kind of minification applied to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Minification {
    /// JavaScript, also used for JSON.
    Js,
    /// Cascading style sheets.
    Css,
    /// HTML, including embedded `<style>` and `<script>` blocks.
    Html,
}

impl Minification {
    /// Short name used in logs and parsing.
    pub fn name(&self) -> &'static str {
        match self {
            Minification::Js => "js",
            Minification::Css => "css",
            Minification::Html => "html",
        }
    }

    /// Picks the minifier for a response from its `Content-Type`.
    ///
    /// Returns `None` when the type is unknown, missing, or its minifier is
    /// switched off in `config`.
    pub fn from_content_type(content_type: Option<&str>, config: &SqueezeConfig) -> Option<Self> {
        let mime = content_type?
            .split(';')
            .next()
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase();

        let (minification, enabled) = if mime.ends_with("javascript") || mime.ends_with("json") {
            (Minification::Js, config.minify_js)
        } else if mime.ends_with("css") {
            (Minification::Css, config.minify_css)
        } else if mime.ends_with("html") {
            (Minification::Html, config.minify_html)
        } else {
            return None;
        };

        enabled.then_some(minification)
    }
}

impl fmt::Display for Minification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Minification {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "js" | "json" => Ok(Minification::Js),
            "css" => Ok(Minification::Css),
            "html" => Ok(Minification::Html),
            other => Err(Error::UnsupportedMinification(other.to_string())),
        }
    }
}

/// What the minifier did to a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinifyInfo {
    /// Minifier used.
    pub minification: Minification,
    /// Time spent minifying.
    pub duration: Duration,
    /// Input length divided by output length.
    pub ratio: f64,
}

impl MinifyInfo {
    /// Value of the `x-squeeze-minify` observability header.
    pub fn header_value(&self) -> String {
        format!(
            "ratio={:.1}x; duration={}",
            self.ratio,
            timing::format_millis(self.duration)
        )
    }
}

/// Minifies `data` with the given minifier.
///
/// Input the minifier cannot handle safely is returned unchanged, with a ratio
/// of 1.0.
pub fn minify(data: &Bytes, minification: Minification) -> (Bytes, MinifyInfo) {
    let Timed { value, elapsed } = timing::timed(|| match minification {
        Minification::Js => js::minify(data),
        Minification::Css => css::minify(data),
        Minification::Html => html::minify(data),
    });

    let output = match value {
        Some(minified) => Bytes::from(minified),
        None => {
            tracing::trace!(%minification, "minifier gave up, keeping original bytes");
            data.clone()
        }
    };

    let info = MinifyInfo {
        minification,
        duration: elapsed,
        ratio: timing::ratio(data.len(), output.len()),
    };
    (output, info)
}
