//! Whitespace and comment stripping for stylesheets.

/// Minifies a stylesheet. Returns `None` when the input has an unterminated
/// comment or string, in which case the caller keeps the original bytes.
pub(crate) fn minify(src: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(src.len());
    let mut pending_space = false;
    let mut depth = 0usize;
    let mut i = 0;

    while i < src.len() {
        let c = src[i];

        if c.is_ascii_whitespace() {
            pending_space = true;
            i += 1;
            continue;
        }

        if c == b'/' && src.get(i + 1) == Some(&b'*') {
            let end = find(src, i + 2, b"*/")?;
            pending_space = true;
            i = end + 2;
            continue;
        }

        if pending_space {
            pending_space = false;
            if let Some(&last) = out.last() {
                let declaration_colon = c == b':' && is_declaration_colon(src, i);
                if !drops_space_after(last, depth)
                    && !drops_space_before(c, depth)
                    && !declaration_colon
                {
                    out.push(b' ');
                }
            }
        }

        match c {
            b'"' | b'\'' => {
                i = copy_string(src, i, &mut out)?;
                continue;
            }
            b'\\' => {
                out.push(c);
                if let Some(&next) = src.get(i + 1) {
                    out.push(next);
                }
                i += 2;
                continue;
            }
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b'}' => {
                while out.last() == Some(&b';') {
                    out.pop();
                }
            }
            _ => {}
        }

        out.push(c);
        i += 1;
    }

    Some(out)
}

fn drops_space_after(c: u8, depth: usize) -> bool {
    matches!(c, b'{' | b'}' | b';' | b':' | b',' | b'(')
        || (depth == 0 && matches!(c, b'>' | b'~' | b'+'))
}

fn drops_space_before(c: u8, depth: usize) -> bool {
    matches!(c, b'{' | b'}' | b';' | b',' | b')')
        || (depth == 0 && matches!(c, b'>' | b'~' | b'+'))
}

/// A `:` followed by `;` or `}` before any `{` separates a property from its
/// value. Otherwise it belongs to a selector, where a leading space matters.
fn is_declaration_colon(src: &[u8], colon: usize) -> bool {
    src[colon..]
        .iter()
        .find(|&&b| matches!(b, b'{' | b';' | b'}'))
        .is_none_or(|&b| b != b'{')
}

/// Copies a quoted string starting at `start` and returns the index after it.
fn copy_string(src: &[u8], start: usize, out: &mut Vec<u8>) -> Option<usize> {
    let quote = src[start];
    out.push(quote);
    let mut i = start + 1;
    while i < src.len() {
        let c = src[i];
        out.push(c);
        match c {
            b'\\' => {
                out.push(*src.get(i + 1)?);
                i += 2;
                continue;
            }
            b'\n' | b'\r' => return None,
            _ if c == quote => return Some(i + 1),
            _ => {}
        }
        i += 1;
    }
    None
}

fn find(haystack: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min(s: &str) -> String {
        String::from_utf8(minify(s.as_bytes()).unwrap()).unwrap()
    }

    #[test]
    fn test_strips_whitespace_and_comments() {
        let css = "/* header */\nbody {\n    color: #000;\n    margin : 0 auto;\n}\n";
        assert_eq!(min(css), "body{color:#000;margin:0 auto}");
    }

    #[test]
    fn test_bang_comments_removed() {
        assert_eq!(min("/*! license */ a { b: c }"), "a{b:c}");
    }

    #[test]
    fn test_selectors_keep_meaningful_spaces() {
        assert_eq!(min("div  p , a > b ~ c + d { x: y }"), "div p,a>b~c+d{x:y}");
        // Descendant pseudo-class selector differs from a compound one
        assert_eq!(min("div :first-child { x: y }"), "div :first-child{x:y}");
    }

    #[test]
    fn test_calc_operators_preserved() {
        assert_eq!(
            min("a { width: calc( 100% - 2px + 1em ); }"),
            "a{width:calc(100% - 2px + 1em)}"
        );
    }

    #[test]
    fn test_media_query_and_paren() {
        assert_eq!(
            min("@media screen and (max-width: 100px) { a { b: c } }"),
            "@media screen and (max-width:100px){a{b:c}}"
        );
    }

    #[test]
    fn test_strings_preserved() {
        assert_eq!(
            min("a:after { content: \"  /* x */  \"; }"),
            "a:after{content:\"  /* x */  \"}"
        );
    }

    #[test]
    fn test_repeated_semicolons_before_brace() {
        assert_eq!(min("a { b: c; ; }"), "a{b:c}");
    }

    #[test]
    fn test_unterminated_comment_fails() {
        assert!(minify(b"body { color: #000; /* unclosed comment").is_none());
    }

    #[test]
    fn test_unterminated_string_fails() {
        assert!(minify(b"a { content: \"oops\n }").is_none());
    }

    #[test]
    fn test_idempotent() {
        let css = "@media (min-width: 10px) {\n  .a  >  .b , .c:hover::after {\n    content: ' x ';\n    width: calc(1px + 2px);\n  }\n}\n";
        let once = minify(css.as_bytes()).unwrap();
        let twice = minify(&once).unwrap();
        assert_eq!(once, twice);
    }
}
