//! dtnweb - incremental HTTP/1.1 and WebSocket webserver core
//!
//! Parsers for HTTP messages and WebSocket frames that work on partially received
//! input, and a connection state machine that serves static files and bridges
//! WebSocket messages to JSON events.

pub mod buffer;
pub mod config;
pub mod event;
pub mod http;
pub mod pool;
pub mod server;
pub mod websocket;
