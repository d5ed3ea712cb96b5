//! XML escaping for rendered feeds and HTML entity decoding for titles.

use std::borrow::Cow;

/// Escape text for use in XML element content or attribute values.
pub fn escape_xml(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Decode HTML character references in a title, named (HTML5 set) and numeric.
pub fn unescape_html(s: &str) -> Cow<'_, str> {
    html_escape::decode_html_entities(s)
}
