//! Character classes and small sub-grammars shared by the HTTP parsers (RFC 9110 §5.6).

use crate::http::parser::{ParseError, ParseResult, Status};

/// `tchar` from RFC 9110: visible ASCII except separators.
pub fn is_tchar(b: u8) -> bool {
    matches!(b,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.'
        | b'^' | b'_' | b'`' | b'|' | b'~')
        || b.is_ascii_alphanumeric()
}

/// Optional whitespace: SP or HTAB.
pub fn is_ows(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

/// OWS plus the CR and LF of an obs-fold. Parsed field values keep their fold bytes,
/// so list elements are trimmed with this.
pub fn is_folded_ows(b: u8) -> bool {
    is_ows(b) || b == b'\r' || b == b'\n'
}

pub fn is_vchar(b: u8) -> bool {
    (0x21..=0x7e).contains(&b)
}

pub fn is_obs_text(b: u8) -> bool {
    b >= 0x80
}

pub fn is_ctl(b: u8) -> bool {
    b < 0x20 || b == 0x7f
}

/// Characters allowed inside a quoted-string without escaping.
fn is_qdtext(b: u8) -> bool {
    matches!(b, b'\t' | b' ' | 0x21 | 0x23..=0x5b | 0x5d..=0x7e) || is_obs_text(b)
}

/// Length of the token starting at `input[0]`.
pub fn token_len(input: &[u8]) -> usize {
    input.iter().take_while(|b| is_tchar(**b)).count()
}

pub fn is_token(input: &[u8]) -> bool {
    !input.is_empty() && token_len(input) == input.len()
}

/// Index of the first non-OWS byte at or after `pos`.
pub fn skip_ows(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && is_ows(input[pos]) {
        pos += 1;
    }
    pos
}

/// Strips leading and trailing OWS.
pub fn trim_ows(input: &[u8]) -> &[u8] {
    let start = skip_ows(input, 0);
    let end = input
        .iter()
        .rposition(|b| !is_ows(*b))
        .map_or(start, |i| i + 1);
    &input[start..end.max(start)]
}

/// Index of the first byte at or after `pos` that is neither OWS nor fold CR/LF.
pub fn skip_folded_ows(input: &[u8], mut pos: usize) -> usize {
    while pos < input.len() && is_folded_ows(input[pos]) {
        pos += 1;
    }
    pos
}

/// Strips leading and trailing OWS, obs-fold line breaks included.
pub fn trim_folded_ows(input: &[u8]) -> &[u8] {
    let start = skip_folded_ows(input, 0);
    let end = input
        .iter()
        .rposition(|b| !is_folded_ows(*b))
        .map_or(start, |i| i + 1);
    &input[start..end.max(start)]
}

/// Scans a quoted-string whose opening quote sits at `input[pos]`.
///
/// Completes with the index just past the closing quote.
pub fn quoted_string(input: &[u8], pos: usize, err: ParseError) -> ParseResult<()> {
    if input.get(pos) != Some(&b'"') {
        return Err(err);
    }
    let mut pos = pos + 1;
    loop {
        match input.get(pos) {
            None => return Ok(Status::Partial),
            Some(b'"') => return Ok(Status::Complete((), pos + 1)),
            Some(b'\\') => match input.get(pos + 1) {
                None => return Ok(Status::Partial),
                Some(&b) if b == b'\t' || b == b' ' || is_vchar(b) || is_obs_text(b) => pos += 2,
                Some(_) => return Err(err),
            },
            Some(&b) if is_qdtext(b) => pos += 1,
            Some(_) => return Err(err),
        }
    }
}

/// Complete-only variant of [`quoted_string`]: true when `input` is exactly one quoted-string.
pub fn is_quoted_string(input: &[u8]) -> bool {
    matches!(
        quoted_string(input, 0, ParseError::InvalidHeader),
        Ok(Status::Complete((), n)) if n == input.len()
    )
}
