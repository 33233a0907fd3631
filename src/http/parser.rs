//! Incremental HTTP/1.1 parsing.
//!
//! Every function here is pure: it looks at the bytes it is given and reports one of
//! three outcomes.
//!
//! * `Ok(Status::Complete(value, next))`: a full unit was parsed; `next` is the index
//!   just past it.
//! * `Ok(Status::Partial)`: the bytes so far are a valid prefix, more are needed.
//! * `Err(ParseError)`: the bytes can never become valid. The connection must close.
//!
//! Nothing is copied: parsed names, values and bodies are [`Span`]s into the input.

use thiserror::Error;

use crate::http::grammar::{self, is_ctl, is_ows, is_tchar};
use crate::http::transfer;
use crate::http::uri;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid HTTP version")]
    InvalidVersion,
    #[error("invalid status line")]
    InvalidStatusLine,
    #[error("invalid request line")]
    InvalidRequestLine,
    #[error("request method exceeds {0} bytes")]
    MethodTooLong(usize),
    #[error("invalid request target")]
    InvalidUri,
    #[error("invalid header line")]
    InvalidHeader,
    #[error("more than {0} header fields")]
    TooManyHeaders(usize),
    #[error("invalid Content-Length")]
    InvalidContentLength,
    #[error("both Content-Length and Transfer-Encoding present")]
    ConflictingFraming,
    #[error("invalid Transfer-Encoding")]
    InvalidTransferEncoding,
    #[error("empty element in comma separated list")]
    EmptyListItem,
    #[error("invalid chunked body")]
    InvalidChunk,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status<T> {
    Complete(T, usize),
    Partial,
}

impl<T> Status<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, Status::Complete(..))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Status<U> {
        match self {
            Status::Complete(value, next) => Status::Complete(f(value), next),
            Status::Partial => Status::Partial,
        }
    }
}

pub type ParseResult<T> = Result<Status<T>, ParseError>;

/// Unwraps a complete status or returns `Partial` from the enclosing function.
macro_rules! complete {
    ($e:expr) => {
        match $e? {
            Status::Complete(value, next) => (value, next),
            Status::Partial => return Ok(Status::Partial),
        }
    };
}
pub(crate) use complete;

/// A byte range inside the buffer the span was parsed from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub len: usize,
}

impl Span {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    pub fn offset(self, by: usize) -> Self {
        Self::new(self.start + by, self.len)
    }

    pub fn slice<'a>(&self, input: &'a [u8]) -> &'a [u8] {
        &input[self.start..self.end()]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
}

impl Version {
    pub const HTTP_11: Version = Version { major: 1, minor: 1 };

    pub fn at_least(&self, major: u8, minor: u8) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Span,
    pub uri: Span,
    pub version: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub version: Version,
    pub code: u16,
    pub phrase: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartLine {
    Request { method: Span, uri: Span },
    Status { code: u16, phrase: Span },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub name: Span,
    pub value: Span,
}

impl Header {
    fn offset(self, by: usize) -> Self {
        Self {
            name: self.name.offset(by),
            value: self.value.offset(by),
        }
    }
}

/// How the message body is delimited, decided once the header section is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Empty,
    Length(usize),
    Chunked,
}

/// Output of [`parse_message`]: everything except the bytes themselves.
#[derive(Debug, Clone, Default)]
pub struct Parts {
    pub version: Version,
    pub start: Option<StartLine>,
    pub headers: Vec<Header>,
    pub body: Span,
    pub chunks: Vec<Span>,
    pub framing: Option<Framing>,
}

impl Parts {
    pub fn with_header_capacity(capacity: usize) -> Self {
        Self {
            headers: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn reset(&mut self) {
        self.version = Version::default();
        self.start = None;
        self.headers.clear();
        self.body = Span::default();
        self.chunks.clear();
        self.framing = None;
    }

    /// Values of every header named `name` (case-insensitive), in arrival order.
    pub fn values<'a>(&'a self, input: &'a [u8], name: &str) -> impl Iterator<Item = &'a [u8]> {
        self.headers
            .iter()
            .filter(move |h| h.name.slice(input).eq_ignore_ascii_case(name.as_bytes()))
            .map(move |h| h.value.slice(input))
    }
}

/// Limits applied while parsing a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Limits {
    pub header_capacity: usize,
    pub max_method_length: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            header_capacity: 64,
            max_method_length: 16,
        }
    }
}

/// Expects CRLF at `pos`. A bare LF or any other byte is `err`.
pub(crate) fn line_end(input: &[u8], pos: usize, err: ParseError) -> ParseResult<()> {
    match input.get(pos) {
        None => Ok(Status::Partial),
        Some(b'\r') => match input.get(pos + 1) {
            None => Ok(Status::Partial),
            Some(b'\n') => Ok(Status::Complete((), pos + 2)),
            Some(_) => Err(err),
        },
        Some(_) => Err(err),
    }
}

/// Parses `HTTP/DIGIT.DIGIT`, case-insensitively, after optional SP/HTAB.
pub fn parse_version(input: &[u8]) -> ParseResult<Version> {
    const PREFIX: &[u8] = b"http/";
    const LEN: usize = 8;

    let pos = grammar::skip_ows(input, 0);
    let rest = &input[pos..];

    let seen = rest.len().min(PREFIX.len());
    if !rest[..seen].eq_ignore_ascii_case(&PREFIX[..seen]) {
        return Err(ParseError::InvalidVersion);
    }
    // Reject as soon as the available bytes prove the shape wrong.
    let shape_ok = rest
        .iter()
        .enumerate()
        .skip(PREFIX.len())
        .take(LEN - PREFIX.len())
        .all(|(i, b)| match i {
            6 => *b == b'.',
            _ => b.is_ascii_digit(),
        });
    if !shape_ok {
        return Err(ParseError::InvalidVersion);
    }
    if rest.len() < LEN {
        return Ok(Status::Partial);
    }
    if rest.get(LEN).is_some_and(u8::is_ascii_digit) {
        return Err(ParseError::InvalidVersion);
    }

    let version = Version {
        major: rest[5] - b'0',
        minor: rest[7] - b'0',
    };
    Ok(Status::Complete(version, pos + LEN))
}

/// Parses `HTTP-version SP 3DIGIT SP reason-phrase CRLF`.
pub fn parse_status_line(input: &[u8]) -> ParseResult<StatusLine> {
    const ERR: ParseError = ParseError::InvalidStatusLine;

    let (version, mut pos) = complete!(parse_version(input));
    match input.get(pos) {
        None => return Ok(Status::Partial),
        Some(b' ') => pos += 1,
        Some(_) => return Err(ERR),
    }

    let mut code: u16 = 0;
    for _ in 0..3 {
        match input.get(pos) {
            None => return Ok(Status::Partial),
            Some(b) if b.is_ascii_digit() => code = code * 10 + u16::from(b - b'0'),
            Some(_) => return Err(ERR),
        }
        pos += 1;
    }
    match input.get(pos) {
        None => return Ok(Status::Partial),
        Some(b' ') => pos += 1,
        Some(_) => return Err(ERR),
    }

    let phrase_start = pos;
    while let Some(&b) = input.get(pos) {
        if b == b'\r' {
            break;
        }
        if is_ctl(b) && b != b'\t' {
            return Err(ERR);
        }
        pos += 1;
    }
    let phrase = Span::new(phrase_start, pos - phrase_start);
    let ((), next) = complete!(line_end(input, pos, ERR));

    Ok(Status::Complete(StatusLine { version, code, phrase }, next))
}

/// Parses `method SP request-target SP HTTP-version CRLF`.
pub fn parse_request_line(input: &[u8], max_method_length: usize) -> ParseResult<RequestLine> {
    const ERR: ParseError = ParseError::InvalidRequestLine;

    let mut pos = 0;
    while pos < input.len() && is_tchar(input[pos]) {
        pos += 1;
        if pos > max_method_length {
            return Err(ParseError::MethodTooLong(max_method_length));
        }
    }
    match input.get(pos) {
        None => return Ok(Status::Partial),
        Some(b' ') if pos > 0 => {}
        Some(_) => return Err(ERR),
    }
    let method = Span::new(0, pos);
    pos += 1;

    let uri_start = pos;
    while let Some(&b) = input.get(pos) {
        if b == b' ' {
            break;
        }
        if is_ctl(b) || b >= 0x80 {
            return Err(ParseError::InvalidUri);
        }
        pos += 1;
    }
    if pos == input.len() {
        return Ok(Status::Partial);
    }
    if pos == uri_start {
        return Err(ERR);
    }
    let uri = Span::new(uri_start, pos - uri_start);
    if !uri::is_valid_request_target(uri.slice(input)) {
        return Err(ParseError::InvalidUri);
    }
    pos += 1;

    if input.get(pos).is_some_and(|b| is_ows(*b)) {
        return Err(ERR);
    }
    let (version, n) = complete!(parse_version(&input[pos..]));
    pos += n;
    let ((), next) = complete!(line_end(input, pos, ERR));

    Ok(Status::Complete(RequestLine { method, uri, version }, next))
}

/// Parses one `field-name ":" OWS field-value OWS CRLF` line, including obs-fold
/// continuations. The value span covers the fold bytes.
pub fn parse_header_line(input: &[u8]) -> ParseResult<Header> {
    const ERR: ParseError = ParseError::InvalidHeader;

    let name_start = grammar::skip_ows(input, 0);
    let mut pos = name_start;
    while pos < input.len() && is_tchar(input[pos]) {
        pos += 1;
    }
    let name_end = pos;
    pos = grammar::skip_ows(input, pos);
    match input.get(pos) {
        None => return Ok(Status::Partial),
        Some(b':') if name_end > name_start => pos += 1,
        Some(_) => return Err(ERR),
    }
    let name = Span::new(name_start, name_end - name_start);

    let mut value_start = None;
    let mut value_end = pos;
    loop {
        let Some(&b) = input.get(pos) else {
            return Ok(Status::Partial);
        };
        match b {
            b'\r' => match (input.get(pos + 1), input.get(pos + 2)) {
                (None, _) | (Some(b'\n'), None) => return Ok(Status::Partial),
                (Some(b'\n'), Some(&next)) if is_ows(next) => pos += 3,
                (Some(b'\n'), Some(_)) => {
                    let start = value_start.unwrap_or(value_end);
                    let value = Span::new(start, value_end - start);
                    return Ok(Status::Complete(Header { name, value }, pos + 2));
                }
                (Some(_), _) => return Err(ERR),
            },
            b'"' => {
                value_start.get_or_insert(pos);
                // An unterminated quote is a plain field-vchar.
                pos = match grammar::quoted_string(input, pos, ERR) {
                    Ok(Status::Complete((), next)) => next,
                    Ok(Status::Partial) => return Ok(Status::Partial),
                    Err(_) => pos + 1,
                };
                value_end = pos;
            }
            b if is_ows(b) => pos += 1,
            b if is_ctl(b) => return Err(ERR),
            _ => {
                value_start.get_or_insert(pos);
                pos += 1;
                value_end = pos;
            }
        }
    }
}

/// Parses a chunked body: `chunk-size [chunk-ext] CRLF chunk-data CRLF`, repeated until
/// the zero-size chunk line. Completes with the data spans in order.
pub fn parse_chunked(input: &[u8]) -> ParseResult<Vec<Span>> {
    const ERR: ParseError = ParseError::InvalidChunk;

    let mut chunks = Vec::new();
    let mut pos = 0;
    loop {
        let size_start = pos;
        let mut size: usize = 0;
        while let Some(digit) = input.get(pos).and_then(|b| (*b as char).to_digit(16)) {
            size = size
                .checked_mul(16)
                .and_then(|s| s.checked_add(digit as usize))
                .ok_or(ERR)?;
            pos += 1;
        }
        if pos == input.len() {
            return Ok(Status::Partial);
        }
        if pos == size_start {
            return Err(ERR);
        }

        let ((), ext_end) = complete!(parse_chunk_extensions(input, pos));
        let ((), next) = complete!(line_end(input, ext_end, ERR));
        pos = next;

        if size == 0 {
            return Ok(Status::Complete(chunks, pos));
        }
        let data_end = pos.checked_add(size).ok_or(ERR)?;
        if data_end > input.len() {
            return Ok(Status::Partial);
        }
        chunks.push(Span::new(pos, size));
        let ((), next) = complete!(line_end(input, data_end, ERR));
        pos = next;
    }
}

/// Scans `*( BWS ";" BWS ext-name [ BWS "=" BWS ext-val ] )` starting at `pos`.
/// Completes at the CR that ends the chunk line (not consumed).
fn parse_chunk_extensions(input: &[u8], mut pos: usize) -> ParseResult<()> {
    const ERR: ParseError = ParseError::InvalidChunk;

    loop {
        pos = grammar::skip_ows(input, pos);
        match input.get(pos) {
            None => return Ok(Status::Partial),
            Some(b'\r') => return Ok(Status::Complete((), pos)),
            Some(b';') => pos += 1,
            Some(_) => return Err(ERR),
        }
        pos = grammar::skip_ows(input, pos);
        let name_len = grammar::token_len(&input[pos..]);
        pos += name_len;
        if pos == input.len() {
            return Ok(Status::Partial);
        }
        if name_len == 0 {
            return Err(ERR);
        }
        let after_name = grammar::skip_ows(input, pos);
        match input.get(after_name) {
            None => return Ok(Status::Partial),
            Some(b'=') => {
                pos = grammar::skip_ows(input, after_name + 1);
                match input.get(pos) {
                    None => return Ok(Status::Partial),
                    Some(b'"') => {
                        let ((), next) = complete!(grammar::quoted_string(input, pos, ERR));
                        pos = next;
                    }
                    Some(_) => {
                        let value_len = grammar::token_len(&input[pos..]);
                        pos += value_len;
                        if pos == input.len() {
                            return Ok(Status::Partial);
                        }
                        if value_len == 0 {
                            return Err(ERR);
                        }
                    }
                }
            }
            Some(_) => pos = after_name,
        }
    }
}

/// Parses header lines until the empty line. Returns the index after it.
fn parse_field_section(
    input: &[u8],
    mut pos: usize,
    mut on_field: impl FnMut(Header) -> Result<(), ParseError>,
) -> ParseResult<()> {
    loop {
        match input.get(pos) {
            None => return Ok(Status::Partial),
            Some(b'\r') => {
                let ((), next) = complete!(line_end(input, pos, ParseError::InvalidHeader));
                return Ok(Status::Complete((), next));
            }
            Some(_) => {
                let (field, n) = complete!(parse_header_line(&input[pos..]));
                on_field(field.offset(pos))?;
                pos += n;
            }
        }
    }
}

/// Decides body framing from the parsed header section.
pub fn body_framing(input: &[u8], parts: &Parts) -> Result<Framing, ParseError> {
    let mut codings = Vec::new();
    for value in parts.values(input, "transfer-encoding") {
        for span in transfer::parse_transfer_encodings(value)? {
            codings.push(span.slice(value));
        }
    }

    let mut length: Option<usize> = None;
    for value in parts.values(input, "content-length") {
        for item in transfer::split_list(value).map_err(|_| ParseError::InvalidContentLength)? {
            let parsed = transfer::parse_content_length(item.slice(value))?;
            if length.is_some_and(|l| l != parsed) {
                return Err(ParseError::InvalidContentLength);
            }
            length = Some(parsed);
        }
    }

    if codings.is_empty() {
        return Ok(length.map_or(Framing::Empty, Framing::Length));
    }
    if length.is_some() {
        return Err(ParseError::ConflictingFraming);
    }
    let (last, rest) = codings.split_last().ok_or(ParseError::InvalidTransferEncoding)?;
    let chunked_elsewhere = rest.iter().any(|c| c.eq_ignore_ascii_case(b"chunked"));
    if chunked_elsewhere || !last.eq_ignore_ascii_case(b"chunked") {
        return Err(ParseError::InvalidTransferEncoding);
    }
    Ok(Framing::Chunked)
}

/// Parses a whole message: start line, header section and body.
///
/// `parts` is reset first. A response is recognised by its `HTTP/` prefix; anything
/// else is parsed as a request.
pub fn parse_message(input: &[u8], limits: &Limits, parts: &mut Parts) -> ParseResult<()> {
    parts.reset();

    const STATUS_PREFIX: &[u8] = b"http/";
    let seen = input.len().min(STATUS_PREFIX.len());
    let is_response = input[..seen].eq_ignore_ascii_case(&STATUS_PREFIX[..seen]);
    if is_response && seen < STATUS_PREFIX.len() {
        return Ok(Status::Partial);
    }

    let mut pos = if is_response {
        let (line, next) = complete!(parse_status_line(input));
        parts.version = line.version;
        parts.start = Some(StartLine::Status {
            code: line.code,
            phrase: line.phrase,
        });
        next
    } else {
        let (line, next) = complete!(parse_request_line(input, limits.max_method_length));
        parts.version = line.version;
        parts.start = Some(StartLine::Request {
            method: line.method,
            uri: line.uri,
        });
        next
    };

    let capacity = limits.header_capacity;
    let headers = &mut parts.headers;
    let ((), next) = complete!(parse_field_section(input, pos, |field| {
        if headers.len() >= capacity {
            return Err(ParseError::TooManyHeaders(capacity));
        }
        headers.push(field);
        Ok(())
    }));
    pos = next;

    let framing = body_framing(input, parts)?;
    parts.framing = Some(framing);
    match framing {
        Framing::Empty => {
            parts.body = Span::new(pos, 0);
            Ok(Status::Complete((), pos))
        }
        Framing::Length(len) => {
            let end = pos.checked_add(len).ok_or(ParseError::InvalidContentLength)?;
            if end > input.len() {
                return Ok(Status::Partial);
            }
            parts.body = Span::new(pos, len);
            Ok(Status::Complete((), end))
        }
        Framing::Chunked => {
            let (chunks, n) = complete!(parse_chunked(&input[pos..]));
            parts.body = Span::new(pos, n);
            parts.chunks = chunks.into_iter().map(|c| c.offset(pos)).collect();
            pos += n;
            // Trailer fields are validated and dropped.
            let ((), next) = complete!(parse_field_section(input, pos, |_| Ok(())));
            Ok(Status::Complete((), next))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_rejects_early() {
        assert_eq!(parse_version(b"HT"), Ok(Status::Partial));
        assert_eq!(parse_version(b"XT"), Err(ParseError::InvalidVersion));
        assert_eq!(parse_version(b"HTTP1"), Err(ParseError::InvalidVersion));
        assert_eq!(parse_version(b"HTTP/11"), Err(ParseError::InvalidVersion));
        assert_eq!(parse_version(b"HTTP/1.12"), Err(ParseError::InvalidVersion));
        assert_eq!(parse_version(b"\nHTTP/1.1"), Err(ParseError::InvalidVersion));
    }

    #[test]
    fn version_skips_leading_whitespace() {
        let (version, next) = match parse_version(b" \thttp/1.0 ").unwrap() {
            Status::Complete(v, n) => (v, n),
            Status::Partial => panic!("expected complete"),
        };
        assert_eq!(version, Version { major: 1, minor: 0 });
        assert_eq!(next, 10);
    }

    #[test]
    fn header_line_folds() {
        let input = b"X-Long: one\r\n two\r\n\r\n";
        match parse_header_line(input).unwrap() {
            Status::Complete(h, next) => {
                assert_eq!(h.name.slice(input), b"X-Long");
                assert_eq!(h.value.slice(input), b"one\r\n two");
                assert_eq!(next, 19);
            }
            Status::Partial => panic!("expected complete"),
        }
    }

    #[test]
    fn header_line_needs_lookahead_for_fold() {
        assert_eq!(parse_header_line(b"A: b\r\n"), Ok(Status::Partial));
    }

    #[test]
    fn chunk_extensions() {
        let input = b"4;name=value;q=\"a b\"\r\nbody\r\n0;last\r\n";
        let (chunks, next) = match parse_chunked(input).unwrap() {
            Status::Complete(c, n) => (c, n),
            Status::Partial => panic!("expected complete"),
        };
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].slice(input), b"body");
        assert_eq!(next, input.len());
        assert_eq!(parse_chunked(b"4;=x\r\n"), Err(ParseError::InvalidChunk));
        assert_eq!(parse_chunked(b"zz\r\n"), Err(ParseError::InvalidChunk));
    }
}
