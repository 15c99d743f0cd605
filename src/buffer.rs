use std::cmp;
use std::io;

/// The outcome of one refill.
#[derive(Debug)]
pub(crate) struct Refill {
    /// How far buffered data moved toward offset zero during compaction.
    /// Every offset the caller holds into the buffer must be reduced by
    /// this amount.
    pub shift: usize,
    /// Whether the source reported end of stream.
    pub eof: bool,
}

/// A contiguous, growable byte buffer that always holds at least the
/// record currently being parsed.
///
/// The buffer never discards bytes at or after the caller's record start:
/// a refill compacts that tail to offset zero and reads new data into the
/// space freed. When the record itself fills the whole buffer, capacity
/// doubles instead. Capacity never shrinks.
#[derive(Debug)]
pub(crate) struct Buffer {
    /// The backing storage; its full length is the capacity.
    data: Vec<u8>,
    /// Bytes of `data` holding source data.
    filled: usize,
    /// The read cursor. Invariant: `pos <= filled`.
    pos: usize,
}

impl Buffer {
    pub fn with_capacity(capacity: usize) -> Buffer {
        Buffer { data: vec![0; cmp::max(1, capacity)], filled: 0, pos: 0 }
    }

    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn has_unread(&self) -> bool {
        self.pos < self.filled
    }

    /// The byte under the cursor. Callable only after `has_unread`
    /// returned true or a refill reported more data.
    #[inline]
    pub fn peek(&self) -> u8 {
        self.data[self.pos]
    }

    /// Consume and return the byte under the cursor.
    #[inline]
    pub fn advance(&mut self) -> u8 {
        let unit = self.data[self.pos];
        self.pos += 1;
        unit
    }

    /// Consume `n` buffered bytes without looking at them.
    #[inline]
    pub fn advance_by(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.filled);
        self.pos += n;
    }

    /// The buffered bytes not yet consumed.
    #[inline]
    pub fn unread(&self) -> &[u8] {
        &self.data[self.pos..self.filled]
    }

    #[inline]
    pub fn slice(&self, start: usize, end: usize) -> &[u8] {
        &self.data[start..end]
    }

    /// Move `data[keep_from..filled]` to offset zero, grow if the kept
    /// region already occupies the whole buffer, then read once from
    /// `rdr` into the free tail.
    ///
    /// Interrupted reads are retried; a read of zero bytes reports end of
    /// stream. Callable only when the cursor has reached `filled`.
    pub fn refill<R: io::Read>(
        &mut self,
        rdr: &mut R,
        keep_from: usize,
    ) -> io::Result<Refill> {
        debug_assert!(self.pos == self.filled);
        debug_assert!(keep_from <= self.pos);
        let shift = keep_from;
        if shift > 0 {
            self.data.copy_within(shift..self.filled, 0);
            self.filled -= shift;
            self.pos -= shift;
        } else if self.filled == self.data.len() {
            let doubled = self.data.len().checked_mul(2).unwrap();
            self.data.resize(doubled, 0);
        }
        loop {
            match rdr.read(&mut self.data[self.filled..]) {
                Ok(0) => return Ok(Refill { shift, eof: true }),
                Ok(n) => {
                    self.filled += n;
                    return Ok(Refill { shift, eof: false });
                }
                Err(ref err)
                    if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}
