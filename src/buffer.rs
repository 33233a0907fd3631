//! Growable, exclusively owned byte buffer.
//!
//! A [`Buffer`] tracks how many bytes are in use separately from how many are
//! allocated. Everything past `len()` is kept zeroed, so shrinking a buffer never
//! leaves stale request bytes behind for the next owner.
//!
//! Buffers are moved between owners (connection → message → connection) and never
//! shared. [`Buffer::shift_trailing`] is how unparsed tail bytes change hands.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("failed to grow buffer by {0} bytes")]
    Alloc(usize),
    #[error("position {at} is past the buffer length {len}")]
    OutOfRange { at: usize, len: usize },
}

#[derive(Debug, Default)]
pub struct Buffer {
    start: Vec<u8>,
    length: usize,
    recache: Option<usize>,
}

impl Buffer {
    /// Creates a zero-filled buffer with `capacity` bytes allocated.
    pub fn with_capacity(capacity: usize) -> Result<Self, BufferError> {
        let mut buffer = Self::default();
        buffer.extend(capacity)?;
        Ok(buffer)
    }

    /// Capacity above `threshold` is released again on [`Buffer::clear`].
    pub fn with_recache_threshold(mut self, threshold: usize) -> Self {
        self.recache = Some(threshold);
        self
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn capacity(&self) -> usize {
        self.start.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.start[..self.length]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.start[..self.length]
    }

    /// Grows the allocation by `n` zeroed bytes. The used prefix is untouched.
    pub fn extend(&mut self, n: usize) -> Result<(), BufferError> {
        if n == 0 {
            return Ok(());
        }
        self.start
            .try_reserve_exact(n)
            .map_err(|_| BufferError::Alloc(n))?;
        let capacity = self.start.len() + n;
        self.start.resize(capacity, 0);
        Ok(())
    }

    /// Replaces the content with `bytes`.
    pub fn set(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        self.truncate(0);
        self.push(bytes)
    }

    /// Appends `bytes`, growing the allocation when needed.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let needed = self.length + bytes.len();
        if needed > self.capacity() {
            self.extend(needed - self.capacity())?;
        }
        self.start[self.length..needed].copy_from_slice(bytes);
        self.length = needed;
        Ok(())
    }

    /// Shrinks the used length to `len`, zeroing the dropped bytes.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.length {
            return;
        }
        self.start[len..self.length].fill(0);
        self.length = len;
    }

    /// Zeroes the content and resets the length.
    pub fn clear(&mut self) {
        self.truncate(0);
        if let Some(threshold) = self.recache {
            if self.start.len() > threshold {
                self.start.truncate(threshold);
                self.start.shrink_to(threshold);
            }
        }
    }

    /// Moves the bytes from `at` to the end into a freshly allocated buffer.
    ///
    /// The moved bytes are zeroed here and the length drops to `at`, so the tail
    /// has exactly one owner afterwards.
    pub fn shift_trailing(&mut self, at: usize) -> Result<Buffer, BufferError> {
        if at > self.length {
            return Err(BufferError::OutOfRange {
                at,
                len: self.length,
            });
        }
        let mut tail = Buffer {
            start: Vec::new(),
            length: 0,
            recache: self.recache,
        };
        tail.push(&self.start[at..self.length])?;
        self.truncate(at);
        Ok(tail)
    }
}
