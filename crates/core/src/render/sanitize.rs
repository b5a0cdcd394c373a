//! Terminal-safe strings
//!
//! Command lines and names come from other users' processes; printing them
//! raw would let an escape sequence in argv drive the operator's terminal.

use std::borrow::Cow;
use std::fmt::Write;

/// Replace control characters with visible escapes, keeping `\n` and `\t`
pub fn sanitize_terminal(s: &str) -> Cow<'_, str> {
    if !s.chars().any(needs_escape) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        if !needs_escape(c) {
            out.push(c);
        } else if (c as u32) < 0x100 {
            let _ = write!(out, "\\x{:02x}", c as u32);
        } else {
            let _ = write!(out, "\\u{{{:04x}}}", c as u32);
        }
    }
    Cow::Owned(out)
}

fn needs_escape(c: char) -> bool {
    c != '\n' && c != '\t' && c.is_control()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_borrowed() {
        assert!(matches!(sanitize_terminal("nginx -g 'daemon off;'"), Cow::Borrowed(_)));
        assert_eq!(sanitize_terminal("a\tb\nc"), "a\tb\nc");
    }

    #[test]
    fn test_control_characters_escaped() {
        assert_eq!(sanitize_terminal("hi\x1b[31mred"), "hi\\x1b[31mred");
        assert_eq!(sanitize_terminal("nul:\0"), "nul:\\x00");
        assert_eq!(sanitize_terminal("c1:\u{9b}"), "c1:\\x9b");
        assert_eq!(sanitize_terminal("del\x7f"), "del\\x7f");
    }
}
