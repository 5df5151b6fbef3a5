//! Markup minification.
//!
//! Drops comments and layout whitespace, minifies `<style>` and `<script>`
//! bodies with the CSS and JS minifiers, and copies `<pre>`, `<code>` and
//! `<textarea>` contents byte for byte.

use super::{css, js};

/// Elements whose surrounding whitespace never renders.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "base", "blockquote", "body", "br", "caption", "col",
    "colgroup", "dd", "details", "dialog", "div", "dl", "dt", "fieldset", "figcaption", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "head", "header", "hgroup", "hr",
    "html", "li", "link", "main", "meta", "nav", "noscript", "ol", "option", "p", "pre", "script",
    "section", "style", "summary", "table", "tbody", "td", "tfoot", "th", "thead", "title", "tr",
    "ul",
];

/// Script types whose body is JavaScript or JSON.
const SCRIPT_TYPES: &[&str] = &[
    "",
    "text/javascript",
    "application/javascript",
    "text/ecmascript",
    "application/ecmascript",
    "module",
    "application/json",
    "application/ld+json",
    "importmap",
];

/// Minifies an HTML document. Returns `None` when the input is not UTF-8 or a
/// tag, comment or raw-text element is left unterminated.
pub(crate) fn minify(src: &[u8]) -> Option<Vec<u8>> {
    let src = std::str::from_utf8(src).ok()?;
    let mut minifier = Minifier {
        src,
        lower: src.to_ascii_lowercase(),
        pos: 0,
        out: String::with_capacity(src.len()),
        text: String::new(),
        after_block: true,
    };
    minifier.run()?;
    Some(minifier.out.into_bytes())
}

struct Minifier<'a> {
    src: &'a str,
    /// ASCII-lowercased copy of `src` with identical byte offsets.
    lower: String,
    pos: usize,
    out: String,
    /// Text seen since the last tag, comments already removed.
    text: String,
    /// Whether the last emitted tag was a block-level boundary.
    after_block: bool,
}

impl<'a> Minifier<'a> {
    fn run(&mut self) -> Option<()> {
        while let Some(offset) = self.src[self.pos..].find('<') {
            let lt = self.pos + offset;
            self.text.push_str(&self.src[self.pos..lt]);
            self.pos = lt;
            let rest = &self.lower[lt..];

            if rest.starts_with("<!--") {
                self.comment()?;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                let end = if rest.starts_with("<![cdata[") {
                    self.find_from(lt, "]]>")? + 2
                } else {
                    self.find_from(lt, ">")?
                };
                self.flush_text(true);
                self.out.push_str(&self.src[lt..=end]);
                self.after_block = true;
                self.pos = end + 1;
            } else if rest.starts_with("</") && starts_name(&rest[2..]) {
                self.end_tag()?;
            } else if starts_name(&rest[1..]) {
                self.start_tag()?;
            } else {
                self.text.push('<');
                self.pos += 1;
            }
        }
        self.text.push_str(&self.src[self.pos..]);
        self.pos = self.src.len();
        self.flush_text(true);
        Some(())
    }

    fn comment(&mut self) -> Option<()> {
        let start = self.pos;
        let end = self.find_from(start + 4, "-->")? + 3;
        let rest = &self.lower[start..];
        if rest.starts_with("<!--[if") || rest.starts_with("<!--<![endif]") {
            self.flush_text(false);
            self.out.push_str(&self.src[start..end]);
            self.after_block = false;
        }
        self.pos = end;
        Some(())
    }

    fn start_tag(&mut self) -> Option<()> {
        let src = self.src;
        let start = self.pos;
        let end = tag_end(src, start)?;
        let raw = &src[start..end];
        let name = tag_name(&self.lower[start + 1..end]);
        let block = is_block(&name);

        self.flush_text(block);
        self.out.push_str(&normalize_tag(raw));
        self.after_block = block;
        self.pos = end;

        if raw.ends_with("/>") && !matches!(name.as_str(), "script" | "style" | "textarea") {
            return Some(());
        }

        match name.as_str() {
            "style" => {
                let body = self.raw_text(&name)?;
                let minified = minify_fragment(body, css::minify);
                self.out.push_str(minified.trim());
            }
            "script" => {
                let body = self.raw_text(&name)?;
                let kind = attribute(raw, "type").unwrap_or_default().to_ascii_lowercase();
                if SCRIPT_TYPES.contains(&kind.trim()) {
                    let minified = minify_fragment(body, js::minify);
                    self.out.push_str(minified.trim());
                } else {
                    self.out.push_str(body);
                }
            }
            "textarea" => {
                let body = self.raw_text(&name)?;
                self.out.push_str(body);
            }
            "pre" | "code" => {
                let close = self.matching_close(&name)?;
                self.out.push_str(&self.src[self.pos..close]);
                self.pos = close;
            }
            _ => {}
        }
        Some(())
    }

    fn end_tag(&mut self) -> Option<()> {
        let start = self.pos;
        let end = self.find_from(start, ">")? + 1;
        let name = tag_name(&self.lower[start + 2..end]);
        let block = is_block(&name);

        self.flush_text(block);
        self.out.push_str("</");
        self.out.push_str(&self.src[start + 2..start + 2 + name.len()]);
        self.out.push('>');
        self.after_block = block;
        self.pos = end;
        Some(())
    }

    /// Returns the body of a raw-text element and leaves `pos` at its end tag.
    fn raw_text(&mut self, name: &str) -> Option<&'a str> {
        let src = self.src;
        let close = self.find_tag(self.pos, &format!("</{name}"))?;
        let body = &src[self.pos..close];
        self.pos = close;
        Some(body)
    }

    /// Finds the end tag closing the element just opened, skipping nested
    /// elements of the same name.
    fn matching_close(&self, name: &str) -> Option<usize> {
        let open = format!("<{name}");
        let close = format!("</{name}");
        let mut depth = 1usize;
        let mut at = self.pos;
        loop {
            let next_close = self.find_tag(at, &close)?;
            let next_open = self.find_tag(at, &open).filter(|&p| p < next_close);
            match next_open {
                Some(p) => {
                    depth += 1;
                    at = p + open.len();
                }
                None => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(next_close);
                    }
                    at = next_close + close.len();
                }
            }
        }
    }

    fn find_from(&self, from: usize, needle: &str) -> Option<usize> {
        self.lower.get(from..)?.find(needle).map(|p| p + from)
    }

    /// Finds `prefix` (`<name` or `</name`) where the element name ends right
    /// after it, so `</pre` does not match `</prefix>`.
    fn find_tag(&self, from: usize, prefix: &str) -> Option<usize> {
        let mut at = from;
        loop {
            let found = self.find_from(at, prefix)?;
            if is_name_boundary(&self.lower[found + prefix.len()..]) {
                return Some(found);
            }
            at = found + prefix.len();
        }
    }

    fn flush_text(&mut self, next_is_block: bool) {
        if self.text.is_empty() {
            return;
        }
        let mut collapsed = collapse_whitespace(&self.text);
        if self.after_block {
            collapsed = collapsed.trim_start().to_string();
        }
        if next_is_block {
            collapsed.truncate(collapsed.trim_end().len());
        }
        self.out.push_str(&collapsed);
        self.text.clear();
    }
}

fn minify_fragment(body: &str, minify: fn(&[u8]) -> Option<Vec<u8>>) -> String {
    minify(body.as_bytes())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| body.to_string())
}

fn starts_name(s: &str) -> bool {
    s.bytes().next().is_some_and(|b| b.is_ascii_alphabetic())
}

fn is_name_boundary(s: &str) -> bool {
    s.bytes()
        .next()
        .is_some_and(|b| b.is_ascii_whitespace() || b == b'>' || b == b'/')
}

fn is_block(name: &str) -> bool {
    BLOCK_ELEMENTS.contains(&name)
}

/// Reads the element name at the start of `s` (which follows `<` or `</`).
fn tag_name(s: &str) -> String {
    s.bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b':' | b'_'))
        .map(char::from)
        .collect()
}

/// Finds the byte index just past the `>` closing the start tag at `start`,
/// honouring quoted attribute values.
fn tag_end(src: &str, start: usize) -> Option<usize> {
    let mut quote = None;
    for (offset, b) in src.as_bytes()[start..].iter().copied().enumerate() {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(start + offset + 1),
            None => {}
        }
    }
    None
}

/// Collapses whitespace between attributes and around `=`.
fn normalize_tag(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut quote = None;
    let mut pending_space = false;

    for c in raw.chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if std::mem::take(&mut pending_space) && c != '>' && c != '=' && !out.ends_with('=') {
            out.push(' ');
        }
        if c == '"' || c == '\'' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}

/// Extracts an attribute value from a raw start tag.
fn attribute(raw: &str, wanted: &str) -> Option<String> {
    let normalized = normalize_tag(raw);
    let inner = normalized
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_end_matches('/');
    let mut rest = inner.split_once(' ')?.1;

    while !rest.is_empty() {
        let name_end = rest.find(['=', ' ']).unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = &rest[name_end..];

        let value = if let Some(after_eq) = rest.strip_prefix('=') {
            let (value, remainder) = match after_eq.chars().next() {
                Some(q @ ('"' | '\'')) => {
                    let body = &after_eq[1..];
                    let close = body.find(q).unwrap_or(body.len());
                    (&body[..close], body.get(close + 1..).unwrap_or(""))
                }
                _ => {
                    let close = after_eq.find(' ').unwrap_or(after_eq.len());
                    (&after_eq[..close], &after_eq[close..])
                }
            };
            rest = remainder;
            value
        } else {
            ""
        };

        if name.eq_ignore_ascii_case(wanted) {
            return Some(value.to_string());
        }
        rest = rest.trim_start();
    }
    None
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min(s: &str) -> String {
        String::from_utf8(minify(s.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_strips_layout_whitespace_and_comments() {
        let html = "<!DOCTYPE html>\n<html>\n  <head>\n    <title> Hello </title>\n  </head>\n  <body>\n    <!-- note -->\n    <p>\n      Hello   <b>big</b>  world\n    </p>\n  </body>\n</html>\n";
        assert_eq!(
            min(html),
            "<!DOCTYPE html><html><head><title>Hello</title></head><body><p>Hello <b>big</b> world</p></body></html>"
        );
    }

    #[test]
    fn test_inline_whitespace_kept_as_single_space() {
        assert_eq!(min("<span>a</span>   <em>b</em>"), "<span>a</span> <em>b</em>");
    }

    #[test]
    fn test_comment_inside_text_does_not_double_space() {
        assert_eq!(min("<p>a <!-- x --> b</p>"), "<p>a b</p>");
    }

    #[test]
    fn test_conditional_comment_kept() {
        let html = "<div><!--[if IE]><p>old</p><![endif]--></div>";
        assert_eq!(min(html), html);
    }

    #[test]
    fn test_tag_attribute_whitespace() {
        assert_eq!(
            min("<a  href = \"x  y\"   class='c' >link</a >"),
            "<a href=\"x  y\" class='c'>link</a>"
        );
    }

    #[test]
    fn test_whitespace_sensitive_elements_preserved() {
        let html = "<div>\n<pre>  line one\n    <b>line  two</b>\n</pre>\n<textarea>  keep\n  me </textarea>\n<p>x <code>a   =   b</code> y</p>\n</div>";
        assert_eq!(
            min(html),
            "<div><pre>  line one\n    <b>line  two</b>\n</pre><textarea>  keep\n  me </textarea><p>x <code>a   =   b</code> y</p></div>"
        );
    }

    #[test]
    fn test_nested_pre_preserved() {
        let html = "<pre> a <pre> b </pre> c </pre>";
        assert_eq!(min(html), html);
    }

    #[test]
    fn test_style_and_script_minified() {
        let html = "<style>\n  body {  color : red ; }\n</style>\n<script>\n  var a = 1 ;  // c\n</script>";
        let out = min(html);
        assert!(out.starts_with("<style>body{color:red}</style><script>var a=1"));
        assert!(out.ends_with("</script>"));
        assert!(!out.contains("// c"));
    }

    #[test]
    fn test_close_tag_needs_full_name() {
        let html = "<pre> x <prefix-y>  y  </prefix-y> z </pre>";
        assert_eq!(min(html), html);
        let html = "<p><code>a  <codemirror>  b</codemirror>  c</code></p>";
        assert_eq!(min(html), html);
        assert_eq!(
            min("<textarea> a </textareas> b </textarea>"),
            "<textarea> a </textareas> b </textarea>"
        );
    }

    #[test]
    fn test_cdata_copied_whole() {
        let html = "<svg><![CDATA[ a > b  &&  c ]]></svg>";
        assert_eq!(min(html), html);
    }

    #[test]
    fn test_non_js_script_untouched() {
        let html = "<script type=\"text/template\">  <p>  {{ x }}  </p>  </script>";
        assert_eq!(min(html), html);
    }

    #[test]
    fn test_literal_less_than_in_text() {
        assert_eq!(min("<p>1 < 2</p>"), "<p>1 < 2</p>");
    }

    #[test]
    fn test_malformed_returns_none() {
        assert!(minify(b"<div><p class=\"x>unterminated").is_none());
        assert!(minify(b"<div><!-- never closed").is_none());
        assert!(minify(b"<script>var a = 1;").is_none());
        assert!(minify(b"<pre>open forever").is_none());
        assert!(minify(&[0xff, 0xfe, b'<']).is_none());
    }

    #[test]
    fn test_attribute() {
        let raw = "<script  type = \"Module\" defer src=x.js>";
        assert_eq!(attribute(raw, "type").as_deref(), Some("Module"));
        assert_eq!(attribute(raw, "defer").as_deref(), Some(""));
        assert_eq!(attribute(raw, "src").as_deref(), Some("x.js"));
        assert_eq!(attribute(raw, "async"), None);
    }

    #[test]
    fn test_idempotent() {
        let html = "<html><body>\n<h1> Title </h1>\n<p>Some <i>inline</i> text <!-- c --> here</p>\n<pre>  x  </pre>\n<style> a { b : c } </style>\n<script> if (a) { b() } </script>\n</body></html>";
        let once = minify(html.as_bytes()).unwrap();
        let twice = minify(&once).unwrap();
        assert_eq!(String::from_utf8(once).unwrap(), String::from_utf8(twice).unwrap());
    }
}
