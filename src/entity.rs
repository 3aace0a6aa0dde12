//! Escaping of structural characters and decoding of numeric character references

use std::borrow::Cow;

/// Appends `c` to `out`, escaping `<` and `>`.
#[inline]
pub fn push_escaped(out: &mut String, c: char) {
    match c {
        '<' => out.push_str("&lt;"),
        '>' => out.push_str("&gt;"),
        _ => out.push(c),
    }
}

pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(['<', '>']) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        push_escaped(&mut out, c);
    }
    Cow::Owned(out)
}

/// Decodes `&#DDD;`, `&#xHH;` and `&#XHH;` references up to U+FFFF.
///
/// A reference counts only when a `;` follows the `&` with no other `&` in
/// between. Anything else, including named entities, malformed numbers and
/// code points outside the basic plane, is copied through untouched.
pub fn unescape(text: &str) -> Cow<'_, str> {
    let Some(first_amp) = text.find('&') else {
        return Cow::Borrowed(text);
    };

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..first_amp]);
    let mut rest = &text[first_amp..];

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];

        let Some(semi) = after.find(';') else {
            // no terminator anywhere ahead, so nothing left can decode
            out.push_str(&rest[amp..]);
            return Cow::Owned(out);
        };

        let content = &after[..semi];
        if content.contains('&') {
            out.push('&');
            rest = after;
            continue;
        }

        match decode_numeric(content) {
            Some(c) => out.push(c),
            None => {
                out.push('&');
                out.push_str(content);
                out.push(';');
            }
        }
        rest = &after[semi + 1..];
    }

    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_numeric(content: &str) -> Option<char> {
    let body = content.strip_prefix('#')?;
    let (digits, radix) = match body.as_bytes().first()? {
        b'x' | b'X' => (&body[1..], 16),
        _ => (body, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    let value = u32::from_str_radix(digits, radix).ok()?;
    if value > 0xFFFF {
        return None;
    }
    char::from_u32(value)
}
