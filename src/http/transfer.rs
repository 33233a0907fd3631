//! Comma-separated list handling for `Transfer-Encoding` and `Content-Length`.

use crate::http::grammar::{self, is_folded_ows};
use crate::http::parser::{ParseError, Span, Status};

/// Transfer codings registered with IANA that we recognise by name.
const KNOWN_CODINGS: &[&[u8]] = &[
    b"chunked",
    b"compress",
    b"deflate",
    b"gzip",
    b"identity",
    b"x-compress",
    b"x-gzip",
];

pub fn is_known_coding(name: &[u8]) -> bool {
    KNOWN_CODINGS.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Splits a `#element` list on commas outside quoted-strings and trims each element.
///
/// Empty elements (leading, trailing or doubled commas) and an empty list are errors.
pub fn split_list(input: &[u8]) -> Result<Vec<Span>, ParseError> {
    let mut items = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;

    for (i, &b) in input.iter().enumerate() {
        if quoted {
            match (escaped, b) {
                (true, _) => escaped = false,
                (false, b'\\') => escaped = true,
                (false, b'"') => quoted = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => quoted = true,
            b',' => {
                items.push(trimmed(input, start, i)?);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quoted {
        return Err(ParseError::InvalidHeader);
    }
    items.push(trimmed(input, start, input.len())?);
    Ok(items)
}

fn trimmed(input: &[u8], mut start: usize, mut end: usize) -> Result<Span, ParseError> {
    while start < end && is_folded_ows(input[start]) {
        start += 1;
    }
    while end > start && is_folded_ows(input[end - 1]) {
        end -= 1;
    }
    if start == end {
        return Err(ParseError::EmptyListItem);
    }
    Ok(Span::new(start, end - start))
}

/// Checks one list element: a known coding, or `token *( OWS ";" OWS token "=" ( token / quoted-string ) )`.
pub fn validate_transfer_encoding_grammar(item: &[u8]) -> bool {
    if is_known_coding(item) {
        return true;
    }
    let name_len = grammar::token_len(item);
    if name_len == 0 {
        return false;
    }
    let mut pos = name_len;
    while pos < item.len() {
        pos = grammar::skip_folded_ows(item, pos);
        if item.get(pos) != Some(&b';') {
            return false;
        }
        pos = grammar::skip_folded_ows(item, pos + 1);
        let key_len = grammar::token_len(&item[pos..]);
        if key_len == 0 {
            return false;
        }
        pos += key_len;
        if item.get(pos) != Some(&b'=') {
            return false;
        }
        pos += 1;
        if item.get(pos) == Some(&b'"') {
            let rest = &item[pos..];
            let Some(close) = quoted_end(rest) else {
                return false;
            };
            pos += close;
        } else {
            let value_len = grammar::token_len(&item[pos..]);
            if value_len == 0 {
                return false;
            }
            pos += value_len;
        }
    }
    true
}

fn quoted_end(input: &[u8]) -> Option<usize> {
    match grammar::quoted_string(input, 0, ParseError::InvalidTransferEncoding) {
        Ok(Status::Complete((), next)) => Some(next),
        _ => None,
    }
}

/// Parses a `Transfer-Encoding` value into the coding-name span of each element.
pub fn parse_transfer_encodings(value: &[u8]) -> Result<Vec<Span>, ParseError> {
    let items = split_list(value).map_err(|_| ParseError::InvalidTransferEncoding)?;
    items
        .into_iter()
        .map(|item| {
            if !validate_transfer_encoding_grammar(item.slice(value)) {
                return Err(ParseError::InvalidTransferEncoding);
            }
            let name_len = grammar::token_len(item.slice(value));
            Ok(Span::new(item.start, name_len))
        })
        .collect()
}

/// Parses a `Content-Length` element: `1*DIGIT`, no sign, no overflow.
pub fn parse_content_length(value: &[u8]) -> Result<usize, ParseError> {
    if value.is_empty() || !value.iter().all(u8::is_ascii_digit) {
        return Err(ParseError::InvalidContentLength);
    }
    value.iter().try_fold(0usize, |acc, b| {
        acc.checked_mul(10)
            .and_then(|acc| acc.checked_add(usize::from(b - b'0')))
            .ok_or(ParseError::InvalidContentLength)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(value: &[u8]) -> Vec<&[u8]> {
        parse_transfer_encodings(value)
            .unwrap()
            .into_iter()
            .map(|s| s.slice(value))
            .collect()
    }

    #[test]
    fn splits_with_whitespace() {
        assert_eq!(names(b"gzip ,\tchunked"), vec![&b"gzip"[..], &b"chunked"[..]]);
    }

    #[test]
    fn rejects_empty_items() {
        assert_eq!(split_list(b",gzip"), Err(ParseError::EmptyListItem));
        assert_eq!(split_list(b"gzip,"), Err(ParseError::EmptyListItem));
        assert_eq!(split_list(b"gzip,,chunked"), Err(ParseError::EmptyListItem));
        assert_eq!(split_list(b""), Err(ParseError::EmptyListItem));
    }

    #[test]
    fn extension_parameters() {
        assert!(validate_transfer_encoding_grammar(b"x-custom;level=9"));
        assert!(validate_transfer_encoding_grammar(b"x-custom ; note=\"a,b\""));
        assert!(!validate_transfer_encoding_grammar(b"x-custom;level"));
        assert!(!validate_transfer_encoding_grammar(b"bad coding"));
        assert_eq!(names(b"x-custom;note=\"a,b\", chunked").len(), 2);
    }

    #[test]
    fn content_length_digits_only() {
        assert_eq!(parse_content_length(b"42"), Ok(42));
        assert!(parse_content_length(b"+4").is_err());
        assert!(parse_content_length(b"99999999999999999999999").is_err());
    }
}
