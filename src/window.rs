//! Sliding replay window for DTLS record sequence numbers.
//!
//! Maintains the highest accepted sequence number and a 64-bit bitmap of the
//! last 64 seen sequence numbers to reject duplicates and records that fall
//! below the window's lower edge.
//!
//! Each epoch's read state owns its own `ReplayWindow`; a rejected sequence
//! number is merely discarded and never invalidates the session.

#[derive(Debug, Default)]
pub struct ReplayWindow {
    max_seq: u64,
    window: u64,
    primed: bool,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the given sequence number is acceptable and update the
    /// window state. Returns true if fresh, false if duplicate or too old.
    pub fn check_and_update(&mut self, seqno: u64) -> bool {
        if !self.primed {
            // First record of the epoch establishes the window.
            self.primed = true;
            self.max_seq = seqno;
            self.window = 1;
            return true;
        }

        if seqno > self.max_seq {
            let delta = seqno - self.max_seq;
            let shift = core::cmp::min(delta, 63);
            self.window <<= shift;
            self.window |= 1; // mark newest as seen
            self.max_seq = seqno;
            true
        } else {
            let offset = self.max_seq - seqno;
            if offset >= 64 {
                return false; // below the lower edge
            }
            let mask = 1u64 << offset;
            if (self.window & mask) != 0 {
                return false; // duplicate
            }
            self.window |= mask;
            true
        }
    }
}
