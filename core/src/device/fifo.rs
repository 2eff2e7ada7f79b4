//! Power-of-two ring FIFO used for cross-board command mailboxes.
//!
//! The hardware boards have no such buffer; it exists because a sound CPU
//! is not synced against the main CPU and must process, in one batch, all
//! commands it received over the course of a frame.

use crate::save::{BlockReader, BlockWriter};

pub struct Fifo {
    buf: Vec<u8>,
    mask: usize,
    read_idx: usize,
    write_idx: usize,
}

impl Fifo {
    /// `capacity` must be a power of two.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity.is_power_of_two());
        Fifo {
            buf: vec![0; capacity],
            mask: capacity - 1,
            read_idx: 0,
            write_idx: 0,
        }
    }

    pub fn clear(&mut self) {
        self.buf.fill(0);
        self.read_idx = 0;
        self.write_idx = 0;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_idx == self.write_idx
    }

    pub fn push(&mut self, data: u8) {
        self.buf[self.write_idx] = data;
        self.write_idx = (self.write_idx + 1) & self.mask;
        if self.write_idx == self.read_idx {
            log::warn!("command FIFO overflow, oldest byte lost");
        }
    }

    /// Pop the next byte. An empty FIFO returns the byte under the read
    /// index without advancing, which is what the port read latches on
    /// real reads-past-empty.
    pub fn pop(&mut self) -> u8 {
        let data = self.buf[self.read_idx];
        if self.read_idx != self.write_idx {
            self.read_idx = (self.read_idx + 1) & self.mask;
        }
        data
    }

    pub fn save(&self, w: &mut BlockWriter) {
        w.put_bytes(&self.buf);
        w.put_u32(self.read_idx as u32);
        w.put_u32(self.write_idx as u32);
    }

    pub fn load(&mut self, r: &mut BlockReader) {
        r.get_bytes(&mut self.buf);
        self.read_idx = r.get_u32() as usize & self.mask;
        self.write_idx = r.get_u32() as usize & self.mask;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_and_empty_semantics() {
        let mut fifo = Fifo::new(32);
        assert!(fifo.is_empty());
        fifo.push(0x14);
        fifo.push(0x12);
        assert!(!fifo.is_empty());
        assert_eq!(fifo.pop(), 0x14);
        assert_eq!(fifo.pop(), 0x12);
        assert!(fifo.is_empty());
        // Reading past empty re-reads the tail byte without advancing.
        assert_eq!(fifo.pop(), 0x12);
        assert_eq!(fifo.pop(), 0x12);
    }

    #[test]
    fn fifo_wraps_at_capacity() {
        let mut fifo = Fifo::new(4);
        for i in 0..3 {
            fifo.push(i);
        }
        assert_eq!(fifo.pop(), 0);
        fifo.push(3);
        fifo.push(4);
        for expected in 1..=4 {
            assert_eq!(fifo.pop(), expected);
        }
        assert!(fifo.is_empty());
    }
}
