//! Reassembly of fragmented data messages (RFC 6455 §5.4).

use thiserror::Error;

use crate::websocket::frame::{Fragmentation, Frame, Opcode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FragmentError {
    #[error("{found:?} frame cannot follow {last:?}")]
    UnexpectedFragment { last: Fragmentation, found: Fragmentation },
    #[error("message exceeds {0} bytes")]
    TooLarge(usize),
}

/// Checks that `next` may follow `last` in a frame sequence.
///
/// A new message (None/Start) may only begin after a finished one (None/Last);
/// Continue/Last only extend an open one (Start/Continue).
pub fn check_transition(last: Fragmentation, next: Fragmentation) -> Result<(), FragmentError> {
    use Fragmentation::*;
    let open = matches!(last, Start | Continue);
    let allowed = match next {
        None | Start => !open,
        Continue | Last => open,
    };
    if allowed {
        Ok(())
    } else {
        Err(FragmentError::UnexpectedFragment { last, found: next })
    }
}

/// A complete data message.
#[derive(Debug)]
pub struct Reassembled {
    pub opcode: Opcode,
    pub payload: Vec<u8>,
    /// The frames the message was built from, for return to the pool.
    pub spent: Vec<Frame>,
}

#[derive(Debug)]
pub struct FragmentQueue {
    frames: Vec<Frame>,
    count: usize,
    size: usize,
    last: Fragmentation,
    max_message_size: usize,
}

impl FragmentQueue {
    pub fn new(max_message_size: usize) -> Self {
        Self {
            frames: Vec::new(),
            count: 0,
            size: 0,
            last: Fragmentation::None,
            max_message_size,
        }
    }

    /// Frames queued for the open message.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn last(&self) -> Fragmentation {
        self.last
    }

    /// Queues an unmasked data frame. Returns the message once its final frame arrives.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Reassembled>, FragmentError> {
        let next = frame.fragmentation();
        check_transition(self.last, next)?;

        self.size += frame.content().len();
        if self.size > self.max_message_size {
            return Err(FragmentError::TooLarge(self.max_message_size));
        }
        self.last = next;
        self.count += 1;
        self.frames.push(frame);

        if matches!(next, Fragmentation::Start | Fragmentation::Continue) {
            return Ok(None);
        }

        let opcode = self.frames.first().map_or(Opcode::Binary, Frame::opcode);
        let mut payload = Vec::with_capacity(self.size);
        for frame in &self.frames {
            payload.extend_from_slice(frame.content());
        }
        self.count = 0;
        self.size = 0;
        Ok(Some(Reassembled {
            opcode,
            payload,
            spent: std::mem::take(&mut self.frames),
        }))
    }

    /// Drops the open message, returning its frames.
    pub fn reset(&mut self) -> Vec<Frame> {
        self.count = 0;
        self.size = 0;
        self.last = Fragmentation::None;
        std::mem::take(&mut self.frames)
    }
}
