//! Per-socket protocol state machine.
//!
//! A [`Connection`] does no I/O. The driver hands it the bytes read from the socket
//! together with the TLS domain they arrived on; the connection appends them to its
//! buffer, pops as many complete units as it can, and queues the bytes to write back.
//!
//! ```text
//!   Http ──(101 Switching Protocols)──► WebSocket
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use crate::buffer::{Buffer, BufferError};
use crate::event::Event;
use crate::http::message::{HttpMessage, MessageKind};
use crate::http::parser::{ParseError, Status};
use crate::http::request::{Method, host_matches};
use crate::http::response::Response;
use crate::http::uri::request_path;
use crate::http::writer::{encode_head, encode_response};
use crate::server::files::{self, FileBody};
use crate::server::{ServerContext, SocketId};
use crate::websocket::fragment::{FragmentError, FragmentQueue};
use crate::websocket::frame::{Frame, FrameError, Opcode, close_code, encode_frame};
use crate::websocket::handshake::{Handshake, HandshakeError, is_upgrade_request, process_handshake_request};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("data for domain {got} on a connection bound to {bound}")]
    DomainMismatch { bound: String, got: String },
    #[error("Host header does not name {0}")]
    HostMismatch(String),
    #[error("incomplete request exceeds {0} bytes")]
    RequestTooLarge(usize),
    #[error("client sent an HTTP response")]
    UnexpectedResponse,
    #[error("failed to allocate a message object")]
    Alloc,
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Handshake(#[from] HandshakeError),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Http,
    WebSocket,
}

/// What the driver should do after an I/O call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Write the queued output, then close the socket.
    Close,
}

/// Bytes queued for the socket, in order.
#[derive(Debug)]
pub enum Output {
    Bytes(Vec<u8>),
    File(FileBody),
}

enum Step {
    Wait,
    Next,
    Close,
}

/// What a socket driver needs from the protocol side of one socket.
pub trait SocketIo {
    fn socket(&self) -> SocketId;

    /// Feeds bytes read for `domain`, queueing replies in `out`.
    fn io(&mut self, domain: &str, data: &[u8], out: &mut Vec<Output>) -> Result<Flow, ConnectionError>;
}

pub struct Connection {
    socket: SocketId,
    remote: SocketAddr,
    domain: Option<String>,
    kind: Kind,
    buffer: Buffer,
    fragments: FragmentQueue,
    ctx: Arc<ServerContext>,
    upgraded: Arc<AtomicBool>,
}

impl Connection {
    pub fn new(
        socket: SocketId,
        remote: SocketAddr,
        ctx: Arc<ServerContext>,
        upgraded: Arc<AtomicBool>,
    ) -> Result<Self, BufferError> {
        let limits = &ctx.config.limits;
        let buffer = Buffer::with_capacity(limits.buffer_size)?
            .with_recache_threshold(limits.recache_threshold.max(limits.buffer_size));
        Ok(Self {
            socket,
            remote,
            domain: None,
            kind: Kind::Http,
            buffer,
            fragments: FragmentQueue::new(limits.max_message_size),
            ctx,
            upgraded,
        })
    }

    pub fn socket(&self) -> SocketId {
        self.socket
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Bytes received but not yet forming a complete unit.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Feeds bytes received for `domain` and queues the replies in `out`.
    ///
    /// Any error means the stream can no longer be interpreted and the socket must be
    /// closed; output queued before the error may still be flushed.
    pub fn io(&mut self, domain: &str, data: &[u8], out: &mut Vec<Output>) -> Result<Flow, ConnectionError> {
        self.bind(domain)?;
        self.buffer.push(data)?;

        loop {
            let step = match self.kind {
                Kind::Http => self.pop_request(out)?,
                Kind::WebSocket => self.pop_frame(out)?,
            };
            match step {
                Step::Next => continue,
                Step::Wait => break,
                Step::Close => return Ok(Flow::Close),
            }
        }

        let max = self.ctx.config.limits.max_request_size;
        if self.kind == Kind::Http && self.buffer.len() > max {
            return Err(ConnectionError::RequestTooLarge(max));
        }
        Ok(Flow::Continue)
    }

    fn bind(&mut self, domain: &str) -> Result<(), ConnectionError> {
        match &self.domain {
            None => {
                tracing::debug!(socket = %self.socket, domain, "connection bound");
                self.domain = Some(domain.to_string());
                Ok(())
            }
            Some(bound) if bound.eq_ignore_ascii_case(domain) => Ok(()),
            Some(bound) => Err(ConnectionError::DomainMismatch {
                bound: bound.clone(),
                got: domain.to_string(),
            }),
        }
    }

    fn bound_domain(&self) -> &str {
        self.domain.as_deref().unwrap_or_default()
    }

    fn pop_request(&mut self, out: &mut Vec<Output>) -> Result<Step, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(Step::Wait);
        }
        let key = self.ctx.config.limits.message_config();
        let mut msg = self.ctx.messages.get(&key).ok_or(ConnectionError::Alloc)?;
        let spare = msg.replace_buffer(std::mem::take(&mut self.buffer));

        let outcome = match msg.parse() {
            Ok(Status::Complete((), next)) => self.handle_request(&msg, out).map(|step| Some((step, next))),
            Ok(Status::Partial) => Ok(None),
            Err(e) => Err(ConnectionError::from(e)),
        };

        let mut input = msg.replace_buffer(spare);
        self.ctx.messages.put(msg);
        match outcome {
            Ok(Some((step, next))) => {
                self.buffer = input.shift_trailing(next)?;
                Ok(step)
            }
            Ok(None) => {
                self.buffer = input;
                Ok(Step::Wait)
            }
            Err(e) => Err(e),
        }
    }

    fn handle_request(&mut self, msg: &HttpMessage, out: &mut Vec<Output>) -> Result<Step, ConnectionError> {
        if msg.kind() != Some(MessageKind::Request) {
            return Err(ConnectionError::UnexpectedResponse);
        }
        let domain = self.bound_domain().to_string();
        if !msg.header("Host").is_some_and(|host| host_matches(host, &domain)) {
            return Err(ConnectionError::HostMismatch(domain));
        }

        if is_upgrade_request(msg) {
            match process_handshake_request(msg)? {
                Handshake::Accepted(response) => {
                    out.push(Output::Bytes(encode_response(&response)));
                    self.kind = Kind::WebSocket;
                    self.upgraded.store(true, Ordering::Release);
                    tracing::info!(socket = %self.socket, domain = %domain, "websocket opened");
                    self.ctx.handler.on_open(self.socket, &domain);
                }
                Handshake::UpgradeRequired(response) => {
                    out.push(Output::Bytes(encode_response(&response)));
                }
            }
            return Ok(Step::Next);
        }

        let response = match msg.method().and_then(Method::from_bytes) {
            Some(Method::GET) => None,
            _ => Some(Response::method_not_allowed()),
        };
        if let Some(response) = response {
            out.push(Output::Bytes(encode_response(&response)));
            return Ok(Step::Next);
        }

        let path = msg
            .uri()
            .and_then(|uri| std::str::from_utf8(uri).ok())
            .and_then(request_path);
        let Some(path) = path else {
            out.push(Output::Bytes(encode_response(&Response::bad_request())));
            return Ok(Step::Next);
        };
        let Some(site) = self.ctx.config.domain(&domain) else {
            out.push(Output::Bytes(encode_response(&Response::not_found())));
            return Ok(Step::Next);
        };

        let served = files::serve(
            &site.root,
            &path,
            msg.header("Range"),
            self.ctx.config.limits.file_chunk_size,
        );
        tracing::debug!(
            socket = %self.socket,
            path = %path,
            status = served.head.status.as_u16(),
            "GET"
        );
        match served.body {
            Some(body) => {
                out.push(Output::Bytes(encode_head(&served.head)));
                out.push(Output::File(body));
            }
            None => out.push(Output::Bytes(encode_response(&served.head))),
        }
        Ok(Step::Next)
    }

    fn pop_frame(&mut self, out: &mut Vec<Output>) -> Result<Step, ConnectionError> {
        if self.buffer.is_empty() {
            return Ok(Step::Wait);
        }
        let key = self.ctx.config.limits.frame_config();
        let mut frame = self.ctx.frames.get(&key).ok_or(ConnectionError::Alloc)?;
        let spare = frame.replace_buffer(std::mem::take(&mut self.buffer));

        match frame.parse() {
            Ok(Status::Complete((), next)) => {
                self.buffer = frame.buffer_mut().shift_trailing(next)?;
                if frame.mask().is_none() {
                    tracing::debug!(socket = %self.socket, "unmasked client frame");
                }
                frame.unmask();
                self.handle_frame(frame, out)
            }
            Ok(Status::Partial) => {
                self.buffer = frame.replace_buffer(spare);
                self.ctx.frames.put(frame);
                Ok(Step::Wait)
            }
            Err(e) => {
                self.buffer = frame.replace_buffer(spare);
                self.ctx.frames.put(frame);
                Err(e.into())
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame, out: &mut Vec<Output>) -> Result<Step, ConnectionError> {
        match frame.opcode() {
            Opcode::Ping => {
                out.push(Output::Bytes(encode_frame(Opcode::Pong, true, frame.content(), None)));
                self.ctx.frames.put(frame);
                Ok(Step::Next)
            }
            Opcode::Pong => {
                self.ctx.frames.put(frame);
                Ok(Step::Next)
            }
            Opcode::Close => {
                let content = frame.content();
                let code = &content[..content.len().min(2)];
                out.push(Output::Bytes(encode_frame(Opcode::Close, true, code, None)));
                tracing::info!(
                    socket = %self.socket,
                    code = ?close_code(content),
                    "websocket closed by peer"
                );
                self.ctx.frames.put(frame);
                Ok(Step::Close)
            }
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                if let Some(message) = self.fragments.push(frame)? {
                    for spent in message.spent {
                        self.ctx.frames.put(spent);
                    }
                    self.deliver(&message.payload);
                }
                Ok(Step::Next)
            }
        }
    }

    fn deliver(&self, payload: &[u8]) {
        match Event::from_slice(payload) {
            Ok(event) => self.ctx.handler.on_event(self.socket, event),
            Err(e) => {
                tracing::warn!(socket = %self.socket, error = %e, "dropping undecodable event");
            }
        }
    }
}

impl SocketIo for Connection {
    fn socket(&self) -> SocketId {
        self.socket
    }

    fn io(&mut self, domain: &str, data: &[u8], out: &mut Vec<Output>) -> Result<Flow, ConnectionError> {
        Connection::io(self, domain, data, out)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        for frame in self.fragments.reset() {
            self.ctx.frames.put(frame);
        }
        if self.kind == Kind::WebSocket {
            self.ctx.handler.on_close(self.socket);
        }
    }
}
