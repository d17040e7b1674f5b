/// Escapes a user-supplied value for interpolation into an HTML document. Covers the same
/// characters as the common `validator.escape`: `& < > " ' / \` and the backtick.
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len() + value.len() / 8);

    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            '/' => escaped.push_str("&#x2F;"),
            '\\' => escaped.push_str("&#x5C;"),
            '`' => escaped.push_str("&#96;"),
            c => escaped.push(c),
        }
    }

    escaped
}

/// Escapes free text and turns its line breaks into `<br/>` tags.
pub fn escape_multiline(value: &str) -> String {
    escape(value)
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\n', "<br/>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(
            escape("<script>alert(1)</script>"),
            "&lt;script&gt;alert(1)&lt;&#x2F;script&gt;"
        );
        assert_eq!(escape("Tom & \"Jerry\""), "Tom &amp; &quot;Jerry&quot;");
        assert_eq!(escape("it's `x` \\ y"), "it&#x27;s &#96;x&#96; &#x5C; y");
        assert_eq!(escape("plain text 123"), "plain text 123");
        assert_eq!(escape(""), "");
    }

    #[test]
    fn test_escape_multiline() {
        assert_eq!(escape_multiline("line one\nline <two>"), "line one<br/>line &lt;two&gt;");
        assert_eq!(escape_multiline("a\r\nb\rc"), "a<br/>b<br/>c");
        assert_eq!(escape_multiline("no breaks"), "no breaks");
    }
}
