//! The in-band control block at the start of every ring.
//!
//! The fixed prefix `{count, head, tail}` is the cross-process contract;
//! whatever the caller puts after it (`H`) is opaque payload. `count` is the
//! total number of elements ever pushed and never decreases. `head` and
//! `tail` live in 2L-modular arithmetic, where L is the actual element
//! count: `head = count mod 2L`, and once the ring has wrapped,
//! `head - tail = L (mod 2L)`.

/// A point-in-time copy of the fixed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StateSnapshot {
    pub count: u64,
    pub head: u64,
    pub tail: u64,
}

/// Size in bytes of the fixed `{count, head, tail}` prefix.
pub const STATE_PREFIX_SIZE: usize = 24;

/// The state header as it lives in the mapped header block: the fixed
/// prefix followed directly by the caller's extension fields.
///
/// `H`'s own layout is implementation-defined; only the prefix offsets are
/// part of the wire contract.
#[repr(C)]
pub struct RingState<H> {
    pub count: u64,
    pub head: u64,
    pub tail: u64,
    pub user: H,
}

impl<H> RingState<H> {
    /// Copies out the fixed prefix.
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            count: self.count,
            head: self.head,
            tail: self.tail,
        }
    }

    /// Resets the prefix to the empty state. Extension fields are left
    /// untouched.
    pub fn reset(&mut self) {
        self.count = 0;
        self.head = 0;
        self.tail = 0;
    }

    /// Logical index of the oldest element still in the ring.
    #[inline]
    pub fn logical_tail(&self, capacity: u64) -> u64 {
        self.count.saturating_sub(capacity)
    }

    /// Advances the prefix after `n` elements were written into the buffer.
    ///
    /// Field update order is fixed: count, then head, then tail. The buffer
    /// body must already have been written when this is called.
    pub fn advance(&mut self, n: u64, capacity: u64) {
        let wrap = 2 * capacity;
        self.count += n;
        self.head = self.count % wrap;
        self.tail = if self.count > capacity {
            // Keeps head - tail = capacity in 2L arithmetic.
            (self.head + capacity) % wrap
        } else {
            0
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> RingState<()> {
        RingState {
            count: 0,
            head: 0,
            tail: 0,
            user: (),
        }
    }

    #[test]
    fn test_fill_to_capacity() {
        let mut s = state();
        for _ in 0..512 {
            s.advance(1, 512);
        }
        assert_eq!(s.snapshot(), StateSnapshot { count: 512, head: 512, tail: 0 });
    }

    #[test]
    fn test_overwrite_moves_tail() {
        let mut s = state();
        s.advance(512, 512);
        s.advance(1, 512);
        assert_eq!(s.snapshot(), StateSnapshot { count: 513, head: 513, tail: 1 });

        s.advance(5, 512);
        assert_eq!(s.snapshot(), StateSnapshot { count: 518, head: 518, tail: 6 });
    }

    #[test]
    fn test_head_wraps_modulo_2l() {
        let mut s = state();
        s.advance(1024, 512);
        assert_eq!(s.head, 0);
        assert_eq!(s.tail, 512);

        s.advance(1, 512);
        assert_eq!(s.head, 1);
        assert_eq!(s.tail, 513);
    }

    #[test]
    fn test_head_tail_relation_holds_across_wraps() {
        let mut s = state();
        let l = 128;
        for i in 0..5000u64 {
            s.advance(1, l);
            assert_eq!(s.count, i + 1);
            assert_eq!(s.head, s.count % (2 * l));
            if s.count <= l {
                assert_eq!(s.tail, 0);
            } else {
                assert_eq!((s.head + 2 * l - s.tail) % (2 * l), l);
            }
        }
    }

    #[test]
    fn test_reset_preserves_user_fields() {
        let mut s = RingState {
            count: 10,
            head: 10,
            tail: 0,
            user: 44100.0f64,
        };
        s.reset();
        assert_eq!(s.snapshot(), StateSnapshot::default());
        assert_eq!(s.user, 44100.0);
    }

    #[test]
    fn test_logical_tail() {
        let mut s = state();
        s.advance(100, 512);
        assert_eq!(s.logical_tail(512), 0);
        s.advance(500, 512);
        assert_eq!(s.logical_tail(512), 88);
    }
}
