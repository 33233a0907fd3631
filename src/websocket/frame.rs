//! RFC 6455 §5.2 frame parsing and encoding.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use thiserror::Error;

use crate::buffer::{Buffer, BufferError};
use crate::http::parser::{complete, Span, Status};
use crate::pool::Poolable;

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("unknown opcode {0:#x}")]
    InvalidOpcode(u8),
    #[error("reserved bits set without a negotiated extension")]
    ReservedBits,
    #[error("payload length not in its shortest encoding")]
    NonCanonicalLength,
    #[error("payload length has the most significant bit set")]
    LengthOverflow,
    #[error("fragmented control frame")]
    FragmentedControl,
    #[error("control frame payload of {0} bytes")]
    ControlTooLarge(usize),
    #[error("frame payload of {len} bytes exceeds {max}")]
    TooLarge { len: u64, max: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl Opcode {
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    pub fn is_control(self) -> bool {
        (self as u8) >= 0x8
    }
}

/// Position of a frame within a (possibly fragmented) message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fragmentation {
    /// A complete message in one frame.
    #[default]
    None,
    Start,
    Continue,
    Last,
}

impl Fragmentation {
    pub fn from_header(fin: bool, opcode: Opcode) -> Self {
        match (fin, opcode) {
            (true, Opcode::Continuation) => Fragmentation::Last,
            (true, _) => Fragmentation::None,
            (false, Opcode::Continuation) => Fragmentation::Continue,
            (false, _) => Fragmentation::Start,
        }
    }
}

/// Decoded length section of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLength {
    pub mask: Option<[u8; 4]>,
    pub content: Span,
}

/// A parsed frame header with the payload location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub fin: bool,
    pub opcode: Opcode,
    pub fragmentation: Fragmentation,
    pub mask: Option<[u8; 4]>,
    pub content: Span,
}

/// Decodes the 7, 16 or 64 bit payload length, the mask key, and locates the payload.
///
/// Completes only once the whole payload is available.
pub fn parse_payload_length(input: &[u8], max_frame_size: usize) -> Result<Status<PayloadLength>, FrameError> {
    if input.len() < 2 {
        return Ok(Status::Partial);
    }
    let masked = input[1] & 0x80 != 0;
    let (len, mut pos) = match input[1] & 0x7f {
        126 => {
            if input.len() < 4 {
                return Ok(Status::Partial);
            }
            let len = u64::from(u16::from_be_bytes([input[2], input[3]]));
            if len < 126 {
                return Err(FrameError::NonCanonicalLength);
            }
            (len, 4)
        }
        127 => {
            if input.len() < 10 {
                return Ok(Status::Partial);
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&input[2..10]);
            let len = u64::from_be_bytes(raw);
            if len & (1 << 63) != 0 {
                return Err(FrameError::LengthOverflow);
            }
            if len < 0x10000 {
                return Err(FrameError::NonCanonicalLength);
            }
            (len, 10)
        }
        short => (u64::from(short), 2),
    };
    if len > max_frame_size as u64 {
        return Err(FrameError::TooLarge { len, max: max_frame_size });
    }
    let len = usize::try_from(len).map_err(|_| FrameError::LengthOverflow)?;

    let mask = if masked {
        if input.len() < pos + 4 {
            return Ok(Status::Partial);
        }
        let key = [input[pos], input[pos + 1], input[pos + 2], input[pos + 3]];
        pos += 4;
        Some(key)
    } else {
        None
    };

    if input.len() - pos < len {
        return Ok(Status::Partial);
    }
    let content = Span::new(pos, len);
    Ok(Status::Complete(PayloadLength { mask, content }, pos + len))
}

/// Parses one complete frame from the start of `input`.
pub fn parse_frame(input: &[u8], max_frame_size: usize) -> Result<Status<FrameHeader>, FrameError> {
    let Some(&b0) = input.first() else {
        return Ok(Status::Partial);
    };
    if b0 & 0x70 != 0 {
        return Err(FrameError::ReservedBits);
    }
    let fin = b0 & 0x80 != 0;
    let opcode = Opcode::from_u8(b0 & 0x0f).ok_or(FrameError::InvalidOpcode(b0 & 0x0f))?;
    if opcode.is_control() {
        if !fin {
            return Err(FrameError::FragmentedControl);
        }
        if let Some(&b1) = input.get(1) {
            let short = usize::from(b1 & 0x7f);
            if short > MAX_CONTROL_PAYLOAD {
                return Err(FrameError::ControlTooLarge(short));
            }
        }
    }

    let (payload, next) = complete!(parse_payload_length(input, max_frame_size));
    Ok(Status::Complete(
        FrameHeader {
            fin,
            opcode,
            fragmentation: Fragmentation::from_header(fin, opcode),
            mask: payload.mask,
            content: payload.content,
        },
        next,
    ))
}

/// XORs `data` with `key`, cycling through the key bytes. Applying it twice is a no-op.
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i & 3];
    }
}

/// Appends a frame header using the shortest length encoding.
pub fn encode_header(opcode: Opcode, fin: bool, len: usize, mask: Option<[u8; 4]>, out: &mut Vec<u8>) {
    let b0 = if fin { 0x80 } else { 0x00 } | opcode as u8;
    let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
    out.push(b0);
    if len <= MAX_CONTROL_PAYLOAD {
        out.push(mask_bit | len as u8);
    } else if len <= usize::from(u16::MAX) {
        out.push(mask_bit | 126);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(mask_bit | 127);
        out.extend_from_slice(&(len as u64).to_be_bytes());
    }
    if let Some(key) = mask {
        out.extend_from_slice(&key);
    }
}

/// Encodes a single frame. The payload is masked when a key is given.
pub fn encode_frame(opcode: Opcode, fin: bool, payload: &[u8], mask: Option<[u8; 4]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 14);
    encode_header(opcode, fin, payload.len(), mask, &mut out);
    let start = out.len();
    out.extend_from_slice(payload);
    if let Some(key) = mask {
        apply_mask(&mut out[start..], key);
    }
    out
}

/// Encodes an outbound (server → client, unmasked) message.
///
/// Payloads shorter than `chunk_size` go out as one frame. Longer ones are split into
/// a non-final first frame, non-final continuations, and a final continuation that
/// carries the remainder, which may be empty.
pub fn encode_message(opcode: Opcode, payload: &[u8], chunk_size: usize) -> Vec<u8> {
    if chunk_size == 0 || payload.len() < chunk_size {
        return encode_frame(opcode, true, payload, None);
    }
    let frames = payload.len() / chunk_size + 1;
    let mut out = Vec::with_capacity(payload.len() + frames * 10);
    let (first, mut rest) = payload.split_at(chunk_size);
    encode_header(opcode, false, first.len(), None, &mut out);
    out.extend_from_slice(first);
    while rest.len() > chunk_size {
        let (piece, tail) = rest.split_at(chunk_size);
        encode_header(Opcode::Continuation, false, piece.len(), None, &mut out);
        out.extend_from_slice(piece);
        rest = tail;
    }
    encode_header(Opcode::Continuation, true, rest.len(), None, &mut out);
    out.extend_from_slice(rest);
    out
}

/// Status code carried by a close frame payload, if any.
pub fn close_code(payload: &[u8]) -> Option<u16> {
    match payload {
        [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameConfig {
    pub max_frame_size: usize,
    pub buffer_size: usize,
    pub recache_threshold: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,
            buffer_size: 4096,
            recache_threshold: 64 * 1024,
        }
    }
}

/// One wire frame together with the buffer holding it.
#[derive(Debug)]
pub struct Frame {
    config: FrameConfig,
    buffer: Buffer,
    opcode: Opcode,
    fin: bool,
    fragmentation: Fragmentation,
    mask: Option<[u8; 4]>,
    content_masked: bool,
    content: Span,
}

impl Frame {
    pub fn new(config: FrameConfig) -> Result<Self, BufferError> {
        let buffer = Buffer::with_capacity(config.buffer_size)?
            .with_recache_threshold(config.recache_threshold.max(config.buffer_size));
        Ok(Self {
            config,
            buffer,
            opcode: Opcode::Continuation,
            fin: false,
            fragmentation: Fragmentation::None,
            mask: None,
            content_masked: false,
            content: Span::default(),
        })
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut Buffer {
        &mut self.buffer
    }

    /// Installs `buffer` as the frame input and returns the previous buffer.
    pub fn replace_buffer(&mut self, buffer: Buffer) -> Buffer {
        self.reset_header();
        std::mem::replace(&mut self.buffer, buffer)
    }

    fn reset_header(&mut self) {
        self.opcode = Opcode::Continuation;
        self.fin = false;
        self.fragmentation = Fragmentation::None;
        self.mask = None;
        self.content_masked = false;
        self.content = Span::default();
    }

    /// Parses the frame at the start of the buffer. Payload bytes stay masked until
    /// [`Frame::unmask`] is called.
    pub fn parse(&mut self) -> Result<Status<()>, FrameError> {
        self.reset_header();
        let (header, next) = complete!(parse_frame(self.buffer.as_slice(), self.config.max_frame_size));
        self.opcode = header.opcode;
        self.fin = header.fin;
        self.fragmentation = header.fragmentation;
        self.mask = header.mask;
        self.content_masked = header.mask.is_some();
        self.content = header.content;
        Ok(Status::Complete((), next))
    }

    /// Builds a frame from `payload`, optionally masking it with a fresh random key.
    pub fn set_data(&mut self, opcode: Opcode, fin: bool, payload: &[u8], mask: bool) -> Result<(), BufferError> {
        let key = mask.then(rand::random::<[u8; 4]>);
        let mut head = Vec::with_capacity(14);
        encode_header(opcode, fin, payload.len(), key, &mut head);

        self.buffer.set(&head)?;
        let start = self.buffer.len();
        self.buffer.push(payload)?;
        if let Some(key) = key {
            apply_mask(&mut self.buffer.as_mut_slice()[start..], key);
        }

        self.opcode = opcode;
        self.fin = fin;
        self.fragmentation = Fragmentation::from_header(fin, opcode);
        self.mask = key;
        self.content_masked = key.is_some();
        self.content = Span::new(start, payload.len());
        Ok(())
    }

    /// Reverts the payload masking. Does nothing for unmasked or already unmasked frames.
    pub fn unmask(&mut self) {
        if let (Some(key), true) = (self.mask, self.content_masked) {
            let range = self.content.start..self.content.end();
            apply_mask(&mut self.buffer.as_mut_slice()[range], key);
            self.content_masked = false;
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn fin(&self) -> bool {
        self.fin
    }

    pub fn fragmentation(&self) -> Fragmentation {
        self.fragmentation
    }

    pub fn mask(&self) -> Option<[u8; 4]> {
        self.mask
    }

    pub fn content(&self) -> &[u8] {
        self.content.slice(self.buffer.as_slice())
    }

    /// The frame as it appears on the wire.
    pub fn wire(&self) -> &[u8] {
        &self.buffer.as_slice()[..self.content.end()]
    }

    pub fn clear(&mut self) {
        self.reset_header();
        self.buffer.clear();
    }
}

impl Poolable for Frame {
    type Key = FrameConfig;

    fn key(&self) -> FrameConfig {
        self.config
    }

    fn create(key: &FrameConfig) -> Option<Self> {
        Frame::new(*key).ok()
    }

    fn reset(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragmentation_from_fin_and_opcode() {
        assert_eq!(Fragmentation::from_header(true, Opcode::Text), Fragmentation::None);
        assert_eq!(Fragmentation::from_header(true, Opcode::Continuation), Fragmentation::Last);
        assert_eq!(Fragmentation::from_header(false, Opcode::Binary), Fragmentation::Start);
        assert_eq!(Fragmentation::from_header(false, Opcode::Continuation), Fragmentation::Continue);
    }

    #[test]
    fn length_forms_are_canonical() {
        let mut short_as_16 = vec![0x81, 126, 0x00, 0x05];
        short_as_16.extend_from_slice(b"hello");
        assert_eq!(parse_payload_length(&short_as_16, 1 << 20), Err(FrameError::NonCanonicalLength));

        let mut as_64 = vec![0x82, 127];
        as_64.extend_from_slice(&0xFFFFu64.to_be_bytes());
        assert_eq!(parse_payload_length(&as_64, 1 << 20), Err(FrameError::NonCanonicalLength));

        let mut top_bit = vec![0x82, 127];
        top_bit.extend_from_slice(&(1u64 << 63).to_be_bytes());
        assert_eq!(parse_payload_length(&top_bit, usize::MAX), Err(FrameError::LengthOverflow));
    }

    #[test]
    fn header_uses_shortest_form() {
        let mut out = Vec::new();
        encode_header(Opcode::Binary, true, 300, None, &mut out);
        assert_eq!(out, vec![0x82, 126, 0x01, 0x2c]);
        out.clear();
        encode_header(Opcode::Binary, true, 70_000, Some([1, 2, 3, 4]), &mut out);
        assert_eq!(out.len(), 14);
        assert_eq!(out[1], 0x80 | 127);
    }

    #[test]
    fn unmask_is_idempotent() {
        let mut frame = Frame::new(FrameConfig::default()).unwrap();
        frame.set_data(Opcode::Text, true, b"payload", true).unwrap();
        frame.unmask();
        frame.unmask();
        assert_eq!(frame.content(), b"payload");
    }
}
