//! JavaScript and JSON minification.
//!
//! JSON documents only lose insignificant whitespace. Everything else is
//! parsed with oxc and printed back in minified form, without renaming or
//! rewriting any expression.

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions, CommentOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::de::IgnoredAny;

/// Minifies a script or JSON document. Returns `None` when the input is not
/// UTF-8 or does not parse, in which case the caller keeps the original bytes.
pub(crate) fn minify(src: &[u8]) -> Option<Vec<u8>> {
    let source = std::str::from_utf8(src).ok()?;
    if serde_json::from_str::<IgnoredAny>(source).is_ok() {
        return Some(strip_json(source));
    }

    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::default()).parse();
    if parsed.panicked || !parsed.errors.is_empty() {
        return None;
    }

    let options = CodegenOptions {
        minify: true,
        comments: CommentOptions::disabled(),
        ..CodegenOptions::default()
    };
    let printed = Codegen::new().with_options(options).build(&parsed.program);
    Some(printed.code.trim_end().as_bytes().to_vec())
}

/// Drops whitespace outside string literals. Only sound for valid JSON.
fn strip_json(source: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(source.len());
    let mut in_string = false;
    let mut escaped = false;
    for b in source.bytes() {
        if in_string {
            out.push(b);
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
        } else if !b.is_ascii_whitespace() {
            in_string = b == b'"';
            out.push(b);
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
    fn test_strips_comments_and_whitespace() {
        let out = min("// leading\nfunction add ( a, b ) {\n    /* sum */\n    return a + b;\n}\n");
        assert!(out.starts_with("function add(a,b){return a+b"));
        assert!(!out.contains("leading"));
        assert!(!out.contains("sum"));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn test_division_after_postfix_increment() {
        let out = min("x = i++ / 2; // half.\ny = 1;\n");
        assert!(out.starts_with("x=i++/2;"));
        assert!(out.contains("y=1"));
        assert!(!out.contains("half"));
        assert!(!out.contains("//"));
    }

    #[test]
    fn test_statements_split_by_newlines_stay_separate() {
        let out = min("let a = 1\nlet b = 2\nfoo()\n");
        assert!(out.starts_with("let a=1;let b=2;foo()"));
    }

    #[test]
    fn test_keeps_required_spaces() {
        assert!(min("a + +b").starts_with("a+ +b"));
        assert!(min("a - -b").starts_with("a- -b"));
        assert!(min("typeof x === 'y'").starts_with("typeof x==="));
    }

    #[test]
    fn test_string_contents_untouched() {
        let out = min("var s = \"  // not a comment  \" + '/* nor */';");
        assert!(out.contains("  // not a comment  "));
        assert!(out.contains("/* nor */"));
    }

    #[test]
    fn test_template_literal_untouched() {
        let out = min("const t = `a  ${ x + `  y  ` }  b`;");
        assert!(out.contains("`a  ${"));
        assert!(out.contains("`  y  `"));
        assert!(out.contains("}  b`"));
    }

    #[test]
    fn test_regex_literal_untouched() {
        assert!(min("var r = / +\\/[/ ]/g;").contains("/ +\\/[/ ]/g"));
        assert!(min("x = a / b / c").starts_with("x=a/b/c"));
    }

    #[test]
    fn test_json() {
        let json = "{\n  \"name\": \"squeeze  me\",\n  \"list\": [1, 2, 3],\n  \"nested\": { \"a\": null, \"q\": \"say \\\"hi\\\" \" }\n}\n";
        assert_eq!(
            min(json),
            "{\"name\":\"squeeze  me\",\"list\":[1,2,3],\"nested\":{\"a\":null,\"q\":\"say \\\"hi\\\" \"}}"
        );
        assert_eq!(min("[ 1, 2 ]\n"), "[1,2]");
    }

    #[test]
    fn test_parse_errors_fail() {
        assert!(minify(b"var s = 'oops").is_none());
        assert!(minify(b"var s = 1; /* never closed").is_none());
        assert!(minify(b"var t = `open").is_none());
        assert!(minify(b"var r = /abc\n").is_none());
        assert!(minify(&[0xff, 0xfe]).is_none());
    }

    #[test]
    fn test_idempotent() {
        let js = "(function () {\n  'use strict';\n  var x = 1, y = x + +2;\n  if (x) { y = /[a-z]+/i.exec(`t ${x}`) }\n  return y\n})()\n";
        let once = minify(js.as_bytes()).unwrap();
        let twice = minify(&once).unwrap();
        assert_eq!(once, twice);
    }
}
