//! WebSocket protocol (RFC 6455).
//!
//! - **`frame`**: Frame parser, encoder and the pooled [`frame::Frame`] object
//! - **`handshake`**: Upgrade detection and the 101 / 426 answers
//! - **`fragment`**: Transition rules and message reassembly

pub mod fragment;
pub mod frame;
pub mod handshake;
