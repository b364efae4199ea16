//! Markup sanitizer for the restricted inline-HTML subset.
//!
//! Recognized tags: `b`, `strong`, `i`, `em`, `code`, `s`, `strike`, `del`,
//! `pre`. Everything else that looks like markup is escaped, never dropped.
//! The output is always balanced and correctly nested, and sanitizing it a
//! second time returns it unchanged.

/// Tags passed through to the display surface.
pub const RECOGNIZED_TAGS: [&str; 9] = ["b", "strong", "i", "em", "code", "s", "strike", "del", "pre"];

/// Named entities the display surface understands.
const NAMED_ENTITIES: [&str; 4] = ["lt", "gt", "amp", "quot"];

/// Result of sanitizing one piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    /// Well-formed output, with every open tag closed.
    pub text: String,
    /// Tags that were still open at end of input, outermost first.
    pub open_tags: Vec<&'static str>,
}

impl Sanitized {
    /// Opening tags that re-establish `open_tags` at the start of a new page.
    pub fn reopen_prefix(&self) -> String {
        self.open_tags.iter().map(|t| format!("<{t}>")).collect()
    }
}

/// Sanitize `text` for display.
pub fn sanitize(text: &str) -> String {
    sanitize_detailed(text).text
}

/// Sanitize `text` and report which tags had to be closed at the end.
pub fn sanitize_detailed(text: &str) -> Sanitized {
    let mut out = String::with_capacity(text.len() + 16);
    let mut stack: Vec<&'static str> = Vec::new();
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        let Some(c) = rest.chars().next() else { break };
        match c {
            '<' => match parse_tag(rest) {
                Some(tag) => {
                    match recognize(tag.name) {
                        Some(name) if tag.closing => {
                            if stack.last() == Some(&name) {
                                stack.pop();
                                out.push_str("</");
                                out.push_str(name);
                                out.push('>');
                            } else {
                                escape_into(&mut out, &rest[..tag.len]);
                            }
                        }
                        Some(name) => {
                            out.push('<');
                            out.push_str(name);
                            out.push('>');
                            if tag.self_closing {
                                out.push_str("</");
                                out.push_str(name);
                                out.push('>');
                            } else {
                                stack.push(name);
                            }
                        }
                        None => escape_into(&mut out, &rest[..tag.len]),
                    }
                    i += tag.len;
                }
                None => {
                    out.push_str("&lt;");
                    i += 1;
                }
            },
            '>' => {
                out.push_str("&gt;");
                i += 1;
            }
            '&' => {
                let len = entity_len(rest);
                if len > 0 {
                    out.push_str(&rest[..len]);
                    i += len;
                } else {
                    out.push_str("&amp;");
                    i += 1;
                }
            }
            _ => {
                out.push(c);
                i += c.len_utf8();
            }
        }
    }

    let open_tags = stack.clone();
    while let Some(name) = stack.pop() {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }

    Sanitized { text: out, open_tags }
}

struct TagToken<'a> {
    name: &'a str,
    closing: bool,
    self_closing: bool,
    /// Byte length of the whole `<...>` token.
    len: usize,
}

/// Parse a tag at the start of `s` (which begins with `<`).
fn parse_tag(s: &str) -> Option<TagToken<'_>> {
    let bytes = s.as_bytes();
    let mut pos = 1;
    let closing = bytes.get(pos) == Some(&b'/');
    if closing {
        pos += 1;
    }

    let name_start = pos;
    if !bytes.get(pos).is_some_and(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    while bytes.get(pos).is_some_and(|b| b.is_ascii_alphanumeric() || *b == b'-') {
        pos += 1;
    }
    let name = &s[name_start..pos];

    // Attributes (ignored) run up to the closing '>'.
    match bytes.get(pos) {
        Some(b'>') => {}
        Some(b'/') => {}
        Some(b) if b.is_ascii_whitespace() => {}
        _ => return None,
    }
    let end = pos + s[pos..].find(['>', '<'])?;
    if bytes[end] == b'<' {
        return None;
    }
    let self_closing = !closing && end > pos && bytes[end - 1] == b'/';

    Some(TagToken {
        name,
        closing,
        self_closing,
        len: end + 1,
    })
}

fn recognize(name: &str) -> Option<&'static str> {
    RECOGNIZED_TAGS
        .iter()
        .copied()
        .find(|t| t.eq_ignore_ascii_case(name))
}

/// Byte length of a valid entity reference at the start of `s`, or 0.
fn entity_len(s: &str) -> usize {
    // Longest accepted reference is "&#1114111;"
    let Some(semi) = s.bytes().skip(1).take(9).position(|b| b == b';').map(|p| p + 1) else {
        return 0;
    };
    let body = &s[1..semi];
    let valid = if let Some(num) = body.strip_prefix('#') {
        match num.strip_prefix(['x', 'X']) {
            Some(hex) => !hex.is_empty() && hex.len() <= 6 && hex.bytes().all(|b| b.is_ascii_hexdigit()),
            None => !num.is_empty() && num.len() <= 7 && num.bytes().all(|b| b.is_ascii_digit()),
        }
    } else {
        NAMED_ENTITIES.contains(&body)
    };
    if valid { semi + 1 } else { 0 }
}

/// Append `raw` with every markup-significant character escaped.
fn escape_into(out: &mut String, raw: &str) {
    let mut i = 0;
    while i < raw.len() {
        let rest = &raw[i..];
        let Some(c) = rest.chars().next() else { break };
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => {
                let len = entity_len(rest);
                if len > 0 {
                    out.push_str(&rest[..len]);
                    i += len;
                    continue;
                }
                out.push_str("&amp;");
            }
            _ => out.push(c),
        }
        i += c.len_utf8();
    }
}
