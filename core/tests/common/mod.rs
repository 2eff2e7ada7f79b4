use m3_core::core::bus::{Bus, IntAck};

/// Minimal bus for CPU testing: flat big-endian memory plus a 256-entry
/// Z80-style I/O port space, no device models.
pub struct TestBus {
    pub mem: Vec<u8>,
    pub io: [u8; 256],
    pub io_writes: Vec<(u8, u8)>,
    pub ack: IntAck,
}

impl TestBus {
    pub fn new() -> Self {
        Self::with_size(1 << 20)
    }

    pub fn with_size(size: usize) -> Self {
        assert!(size.is_power_of_two());
        TestBus {
            mem: vec![0; size],
            io: [0; 256],
            io_writes: Vec::new(),
            ack: IntAck::Autovector,
        }
    }

    #[inline]
    fn index(&self, addr: u32) -> usize {
        addr as usize & (self.mem.len() - 1)
    }

    pub fn load(&mut self, addr: u32, data: &[u8]) {
        let start = self.index(addr);
        self.mem[start..start + data.len()].copy_from_slice(data);
    }

    /// Load 32-bit words (big-endian) starting at `addr`.
    pub fn load_words(&mut self, addr: u32, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            let bytes = word.to_be_bytes();
            self.load(addr + (i as u32) * 4, &bytes);
        }
    }
}

impl Default for TestBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for TestBus {
    fn read8(&mut self, addr: u32) -> u8 {
        self.mem[self.index(addr)]
    }

    fn read16(&mut self, addr: u32) -> u16 {
        let hi = self.read8(addr) as u16;
        let lo = self.read8(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn read32(&mut self, addr: u32) -> u32 {
        let hi = self.read16(addr) as u32;
        let lo = self.read16(addr.wrapping_add(2)) as u32;
        (hi << 16) | lo
    }

    fn write8(&mut self, addr: u32, data: u8) {
        let idx = self.index(addr);
        self.mem[idx] = data;
    }

    fn write16(&mut self, addr: u32, data: u16) {
        self.write8(addr, (data >> 8) as u8);
        self.write8(addr.wrapping_add(1), data as u8);
    }

    fn write32(&mut self, addr: u32, data: u32) {
        self.write16(addr, (data >> 16) as u16);
        self.write16(addr.wrapping_add(2), data as u16);
    }

    fn io_read8(&mut self, port: u32) -> u8 {
        self.io[(port & 0xFF) as usize]
    }

    fn io_write8(&mut self, port: u32, data: u8) {
        self.io[(port & 0xFF) as usize] = data;
        self.io_writes.push(((port & 0xFF) as u8, data));
    }

    fn ack_interrupt(&mut self, _level: u8) -> IntAck {
        self.ack
    }
}
