//! Reusable HTTP message object.
//!
//! An [`HttpMessage`] owns the buffer it was parsed from. Header names and values, the
//! body and the decoded chunk are spans into that buffer, so accessors borrow from
//! the message and nothing is copied during parsing.

use crate::buffer::{Buffer, BufferError};
use crate::http::grammar;
use crate::http::parser::{self, Framing, Limits, ParseResult, Parts, Span, StartLine, Status, Version};
use crate::pool::Poolable;

/// Capacities an [`HttpMessage`] is created with. Messages with equal configs are
/// interchangeable in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageConfig {
    pub limits: Limits,
    pub buffer_size: usize,
    pub recache_threshold: usize,
}

impl Default for MessageConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            buffer_size: 4096,
            recache_threshold: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Request,
    Response,
}

/// Result of a multi-value header lookup into a caller-provided array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// `n` values were written.
    Found(usize),
    /// No header with that name.
    Absent,
    /// The output array holds fewer slots than the `n` values present.
    OutOfBounds(usize),
}

#[derive(Debug)]
pub struct HttpMessage {
    config: MessageConfig,
    buffer: Buffer,
    parts: Parts,
    chunk: Span,
}

impl HttpMessage {
    pub fn new(config: MessageConfig) -> Result<Self, BufferError> {
        let buffer = Buffer::with_capacity(config.buffer_size)?
            .with_recache_threshold(config.recache_threshold.max(config.buffer_size));
        Ok(Self {
            config,
            buffer,
            parts: Parts::with_header_capacity(config.limits.header_capacity),
            chunk: Span::default(),
        })
    }

    pub fn config(&self) -> &MessageConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    /// Installs `buffer` as the message input and returns the previous buffer.
    pub fn replace_buffer(&mut self, buffer: Buffer) -> Buffer {
        self.parts.reset();
        self.chunk = Span::default();
        std::mem::replace(&mut self.buffer, buffer)
    }

    /// Parses the buffered bytes.
    ///
    /// On completion the chunked body, if any, is compacted in place so that
    /// [`HttpMessage::chunk`] is one contiguous slice. Bytes after `next` are untouched.
    pub fn parse(&mut self) -> ParseResult<()> {
        self.chunk = Span::default();
        let status = parser::parse_message(self.buffer.as_slice(), &self.config.limits, &mut self.parts)?;
        if let Status::Complete((), _) = status {
            if self.parts.framing == Some(Framing::Chunked) {
                self.compact_chunks();
            }
        }
        Ok(status)
    }

    fn compact_chunks(&mut self) {
        let start = self.parts.body.start;
        let data = self.buffer.as_mut_slice();
        let mut write = start;
        for chunk in &self.parts.chunks {
            data.copy_within(chunk.start..chunk.end(), write);
            write += chunk.len;
        }
        self.chunk = Span::new(start, write - start);
        self.parts.body = self.chunk;
    }

    /// Resets the parse state and empties the buffer.
    pub fn clear(&mut self) {
        self.parts.reset();
        self.chunk = Span::default();
        self.buffer.clear();
    }

    fn bytes(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    pub fn kind(&self) -> Option<MessageKind> {
        match self.parts.start? {
            StartLine::Request { .. } => Some(MessageKind::Request),
            StartLine::Status { .. } => Some(MessageKind::Response),
        }
    }

    pub fn version(&self) -> Version {
        self.parts.version
    }

    pub fn method(&self) -> Option<&[u8]> {
        match self.parts.start? {
            StartLine::Request { method, .. } => Some(method.slice(self.bytes())),
            StartLine::Status { .. } => None,
        }
    }

    pub fn uri(&self) -> Option<&[u8]> {
        match self.parts.start? {
            StartLine::Request { uri, .. } => Some(uri.slice(self.bytes())),
            StartLine::Status { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.parts.start? {
            StartLine::Status { code, .. } => Some(code),
            StartLine::Request { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&[u8]> {
        match self.parts.start? {
            StartLine::Status { phrase, .. } => Some(phrase.slice(self.bytes())),
            StartLine::Request { .. } => None,
        }
    }

    /// Header fields in arrival order.
    pub fn headers(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        let bytes = self.bytes();
        self.parts
            .headers
            .iter()
            .map(move |h| (h.name.slice(bytes), h.value.slice(bytes)))
    }

    /// First value of the header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.parts.values(self.bytes(), name).next()
    }

    /// Like [`HttpMessage::header`], for values that are valid UTF-8.
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header(name).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Writes every value of `name` into `out`, in arrival order.
    pub fn header_values<'a>(&'a self, name: &str, out: &mut [&'a [u8]]) -> Lookup {
        let bytes = self.bytes();
        let count = self.parts.values(bytes, name).count();
        if count == 0 {
            return Lookup::Absent;
        }
        if count > out.len() {
            return Lookup::OutOfBounds(count);
        }
        for (slot, value) in out.iter_mut().zip(self.parts.values(bytes, name)) {
            *slot = value;
        }
        Lookup::Found(count)
    }

    /// All values of `name` joined into one comma-separated list.
    pub fn header_list(&self, name: &str) -> Option<Vec<u8>> {
        let mut values = self.parts.values(self.bytes(), name);
        let mut list = values.next()?.to_vec();
        for value in values {
            list.extend_from_slice(b", ");
            list.extend_from_slice(value);
        }
        Some(list)
    }

    /// True when the comma-separated values of `name` contain `token` (case-insensitive).
    pub fn header_has_token(&self, name: &str, token: &str) -> bool {
        self.parts.values(self.bytes(), name).any(|value| {
            value
                .split(|b| *b == b',')
                .any(|item| grammar::trim_folded_ows(item).eq_ignore_ascii_case(token.as_bytes()))
        })
    }

    /// The message body. For chunked messages this is the decoded payload.
    pub fn body(&self) -> &[u8] {
        self.parts.body.slice(self.bytes())
    }

    /// The decoded chunked payload; empty for other framings.
    pub fn chunk(&self) -> &[u8] {
        self.chunk.slice(self.bytes())
    }

    pub fn is_chunked(&self) -> bool {
        self.parts.framing == Some(Framing::Chunked)
    }
}

impl Poolable for HttpMessage {
    type Key = MessageConfig;

    fn key(&self) -> MessageConfig {
        self.config
    }

    fn create(key: &MessageConfig) -> Option<Self> {
        HttpMessage::new(*key).ok()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(input: &[u8]) -> HttpMessage {
        let mut msg = HttpMessage::new(MessageConfig::default()).unwrap();
        msg.buffer_mut().set(input).unwrap();
        assert!(msg.parse().unwrap().is_complete());
        msg
    }

    #[test]
    fn multi_chunk_body_is_compacted() {
        let msg = parsed(b"POST /u HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n");
        assert!(msg.is_chunked());
        assert_eq!(msg.chunk(), b"abcde");
        assert_eq!(msg.body(), b"abcde");
    }

    #[test]
    fn header_lookup_reports_absent_and_oob() {
        let msg = parsed(b"GET / HTTP/1.1\r\nAccept: a\r\nAccept: b\r\n\r\n");
        let mut one: [&[u8]; 1] = [b""];
        assert_eq!(msg.header_values("Accept", &mut one), Lookup::OutOfBounds(2));
        let mut two: [&[u8]; 2] = [&b""[..]; 2];
        assert_eq!(msg.header_values("accept", &mut two), Lookup::Found(2));
        assert_eq!(two, [&b"a"[..], &b"b"[..]]);
        assert_eq!(msg.header_values("Host", &mut two), Lookup::Absent);
        assert_eq!(msg.header_list("Accept").as_deref(), Some(&b"a, b"[..]));
    }
}
