//! HTTP/1.1 message layer.
//!
//! Parsing is incremental and allocation-free: every parser takes the bytes received
//! so far and either completes a unit (returning the index just past it) or reports
//! that more bytes are needed. Parsed fields are spans into the message buffer.
//!
//! # Architecture
//!
//! - **`grammar`**: RFC 9110 character classes and token/quoted-string helpers
//! - **`parser`**: Version, start line, header line, chunked body and whole-message parsers
//! - **`transfer`**: `Transfer-Encoding` / `Content-Length` field grammar
//! - **`uri`**: Request-target validation and path normalisation
//! - **`message`**: The reusable [`message::HttpMessage`] object
//! - **`request`**: Method, byte-range and Host helpers
//! - **`response`**: HTTP response representation with builder pattern
//! - **`writer`**: Serializes responses for the wire
//! - **`mime`**: MIME type detection based on file extensions
//!
//! # Parse flow
//!
//! ```text
//!   bytes ──► parse_message ──► Partial ─────────► wait for more bytes
//!                 │
//!                 ├─► Err(ParseError) ──────────► close the connection
//!                 │
//!                 └─► Complete(next) ──► handle ──► shift bytes after `next`
//!                                                    and parse again
//! ```

pub mod grammar;
pub mod message;
pub mod mime;
pub mod parser;
pub mod request;
pub mod response;
pub mod transfer;
pub mod uri;
pub mod writer;
