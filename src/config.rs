use crate::codec::Codec;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Default minimum body size, in bytes, for a response to be squeezed.
pub const DEFAULT_MIN_SIZE: usize = 500;

/// Default URL prefix under which responses are treated as static files.
pub const DEFAULT_STATIC_PREFIX: &str = "/static/";

/// Whether a response comes from the static file mount or from application code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    /// Served from the static mount; processed output is cached.
    Static,
    /// Anything else; processed on every request.
    Dynamic,
}

/// Compression quality per codec and resource class.
///
/// Static resources default to the best settings since the cost is paid once
/// per distinct asset. Dynamic resources default to the fastest settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Quality {
    /// Brotli quality for static resources (0-11).
    pub brotli_static: u32,
    /// Brotli quality for dynamic resources (0-11).
    pub brotli_dynamic: u32,
    /// Deflate level for static resources (0-9).
    pub deflate_static: u32,
    /// Deflate level for dynamic resources (0-9).
    pub deflate_dynamic: u32,
    /// Gzip level for static resources (0-9).
    pub gzip_static: u32,
    /// Gzip level for dynamic resources (0-9).
    pub gzip_dynamic: u32,
}

impl Default for Quality {
    fn default() -> Self {
        Self {
            brotli_static: 11,
            brotli_dynamic: 1,
            deflate_static: 9,
            deflate_dynamic: 1,
            gzip_static: 9,
            gzip_dynamic: 1,
        }
    }
}

impl Quality {
    /// Returns the configured quality for `codec` on a resource of the given class.
    pub fn level(&self, codec: Codec, class: ResourceClass) -> u32 {
        match (codec, class) {
            (Codec::Brotli, ResourceClass::Static) => self.brotli_static,
            (Codec::Brotli, ResourceClass::Dynamic) => self.brotli_dynamic,
            (Codec::Deflate, ResourceClass::Static) => self.deflate_static,
            (Codec::Deflate, ResourceClass::Dynamic) => self.deflate_dynamic,
            (Codec::Gzip, ResourceClass::Static) => self.gzip_static,
            (Codec::Gzip, ResourceClass::Dynamic) => self.gzip_dynamic,
        }
    }
}

/// Configuration for the squeeze pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqueezeConfig {
    /// Master switch for compression.
    pub compress: bool,
    /// Responses smaller than this many bytes are left alone.
    pub min_size: usize,
    /// Compression quality table.
    pub quality: Quality,
    /// Minify JavaScript and JSON responses.
    pub minify_js: bool,
    /// Minify CSS responses.
    pub minify_css: bool,
    /// Minify HTML responses.
    pub minify_html: bool,
    /// Request path prefix of the static file mount.
    pub static_prefix: String,
    /// Directory for the persistent static cache. `None` keeps the cache in memory only.
    pub cache_dir: Option<PathBuf>,
    /// Log pipeline decisions at `debug` instead of `trace`.
    pub verbose_logging: bool,
    /// Attach the `x-squeeze-duration` header.
    pub debug_headers: bool,
}

impl Default for SqueezeConfig {
    fn default() -> Self {
        Self {
            compress: true,
            min_size: DEFAULT_MIN_SIZE,
            quality: Quality::default(),
            minify_js: true,
            minify_css: true,
            minify_html: true,
            static_prefix: DEFAULT_STATIC_PREFIX.to_string(),
            cache_dir: None,
            verbose_logging: false,
            debug_headers: false,
        }
    }
}

impl SqueezeConfig {
    /// Creates a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables compression.
    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = enabled;
        self
    }

    /// Sets the minimum body size required for processing.
    pub fn min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Replaces the quality table.
    pub fn quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Enables or disables JavaScript/JSON minification.
    pub fn minify_js(mut self, enabled: bool) -> Self {
        self.minify_js = enabled;
        self
    }

    /// Enables or disables CSS minification.
    pub fn minify_css(mut self, enabled: bool) -> Self {
        self.minify_css = enabled;
        self
    }

    /// Enables or disables HTML minification.
    pub fn minify_html(mut self, enabled: bool) -> Self {
        self.minify_html = enabled;
        self
    }

    /// Sets the static mount prefix.
    pub fn static_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.static_prefix = prefix.into();
        self
    }

    /// Persists the static cache under `dir`.
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Enables or disables verbose decision logging.
    pub fn verbose_logging(mut self, enabled: bool) -> Self {
        self.verbose_logging = enabled;
        self
    }

    /// Enables or disables debug timing headers.
    pub fn debug_headers(mut self, enabled: bool) -> Self {
        self.debug_headers = enabled;
        self
    }

    /// Returns true if the pipeline has anything to do at all.
    pub fn is_active(&self) -> bool {
        self.compress || self.minify_js || self.minify_css || self.minify_html
    }

    /// Classifies a request path as static or dynamic.
    pub fn classify_path(&self, path: &str) -> ResourceClass {
        if path.starts_with(&self.static_prefix) {
            ResourceClass::Static
        } else {
            ResourceClass::Dynamic
        }
    }

    /// Checks the configuration for values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !self.static_prefix.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "static prefix must start with '/', got {:?}",
                self.static_prefix
            )));
        }
        Ok(())
    }

    /// Builds a configuration from `SQUEEZE_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        set_parsed(&lookup, "SQUEEZE_COMPRESS", &mut config.compress, parse_bool)?;
        set_parsed(&lookup, "SQUEEZE_MIN_SIZE", &mut config.min_size, parse_from_str)?;
        set_parsed(&lookup, "SQUEEZE_MINIFY_JS", &mut config.minify_js, parse_bool)?;
        set_parsed(&lookup, "SQUEEZE_MINIFY_CSS", &mut config.minify_css, parse_bool)?;
        set_parsed(&lookup, "SQUEEZE_MINIFY_HTML", &mut config.minify_html, parse_bool)?;
        set_parsed(&lookup, "SQUEEZE_VERBOSE_LOGGING", &mut config.verbose_logging, parse_bool)?;
        set_parsed(&lookup, "SQUEEZE_ADD_DEBUG_HEADERS", &mut config.debug_headers, parse_bool)?;

        let quality = &mut config.quality;
        set_parsed(&lookup, "SQUEEZE_LEVEL_BROTLI_STATIC", &mut quality.brotli_static, parse_from_str)?;
        set_parsed(&lookup, "SQUEEZE_LEVEL_BROTLI_DYNAMIC", &mut quality.brotli_dynamic, parse_from_str)?;
        set_parsed(&lookup, "SQUEEZE_LEVEL_DEFLATE_STATIC", &mut quality.deflate_static, parse_from_str)?;
        set_parsed(&lookup, "SQUEEZE_LEVEL_DEFLATE_DYNAMIC", &mut quality.deflate_dynamic, parse_from_str)?;
        set_parsed(&lookup, "SQUEEZE_LEVEL_GZIP_STATIC", &mut quality.gzip_static, parse_from_str)?;
        set_parsed(&lookup, "SQUEEZE_LEVEL_GZIP_DYNAMIC", &mut quality.gzip_dynamic, parse_from_str)?;

        if let Some(prefix) = lookup("SQUEEZE_STATIC_PREFIX") {
            config.static_prefix = prefix;
        }
        if let Some(dir) = lookup("SQUEEZE_CACHE_DIR").filter(|dir| !dir.is_empty()) {
            config.cache_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }
}

fn set_parsed<F, T>(
    lookup: &F,
    key: &str,
    target: &mut T,
    parse: fn(&str) -> Option<T>,
) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *target = parse(raw.trim())
        .ok_or_else(|| Error::InvalidConfig(format!("{key}: cannot parse {raw:?}")))?;
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_from_str<T: FromStr>(value: &str) -> Option<T> {
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SqueezeConfig::default();
        assert!(config.compress);
        assert_eq!(config.min_size, 500);
        assert_eq!(config.quality.level(Codec::Brotli, ResourceClass::Static), 11);
        assert_eq!(config.quality.level(Codec::Brotli, ResourceClass::Dynamic), 1);
        assert_eq!(config.quality.level(Codec::Gzip, ResourceClass::Static), 9);
        assert_eq!(config.quality.level(Codec::Deflate, ResourceClass::Dynamic), 1);
        assert_eq!(config.static_prefix, "/static/");
        assert!(config.cache_dir.is_none());
        assert!(config.is_active());
    }

    #[test]
    fn test_inactive_when_everything_disabled() {
        let config = SqueezeConfig::new()
            .compress(false)
            .minify_js(false)
            .minify_css(false)
            .minify_html(false);
        assert!(!config.is_active());
    }

    #[test]
    fn test_classify_path() {
        let config = SqueezeConfig::default();
        assert_eq!(config.classify_path("/static/app.js"), ResourceClass::Static);
        assert_eq!(config.classify_path("/"), ResourceClass::Dynamic);
        assert_eq!(config.classify_path("/api/static/x"), ResourceClass::Dynamic);

        let config = SqueezeConfig::new().static_prefix("/assets/");
        assert_eq!(config.classify_path("/assets/site.css"), ResourceClass::Static);
        assert_eq!(config.classify_path("/static/site.css"), ResourceClass::Dynamic);
    }

    #[test]
    fn test_validate_rejects_relative_prefix() {
        let config = SqueezeConfig::new().static_prefix("static/");
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_from_lookup() {
        let config = SqueezeConfig::from_lookup(lookup_from(&[
            ("SQUEEZE_COMPRESS", "false"),
            ("SQUEEZE_MIN_SIZE", "1000"),
            ("SQUEEZE_LEVEL_GZIP_STATIC", "6"),
            ("SQUEEZE_MINIFY_HTML", "0"),
            ("SQUEEZE_CACHE_DIR", "/tmp/squeeze"),
            ("SQUEEZE_ADD_DEBUG_HEADERS", "yes"),
        ]))
        .unwrap();

        assert!(!config.compress);
        assert_eq!(config.min_size, 1000);
        assert_eq!(config.quality.gzip_static, 6);
        assert_eq!(config.quality.brotli_static, 11);
        assert!(!config.minify_html);
        assert!(config.minify_js);
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/squeeze")));
        assert!(config.debug_headers);
    }

    #[test]
    fn test_from_lookup_invalid_value() {
        let err = SqueezeConfig::from_lookup(lookup_from(&[("SQUEEZE_MIN_SIZE", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("SQUEEZE_MIN_SIZE"));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SqueezeConfig =
            serde_json::from_str(r#"{"min_size": 0, "quality": {"gzip_dynamic": 4}}"#).unwrap();
        assert_eq!(config.min_size, 0);
        assert_eq!(config.quality.gzip_dynamic, 4);
        assert_eq!(config.quality.gzip_static, 9);
        assert!(config.minify_css);
    }
}
