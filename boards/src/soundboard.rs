//! Sound board: the 68000 that drives the two SCSPs.
//!
//! The SCSPs themselves are outside this core; their register files are
//! kept as plain state so the 68K program runs and the context survives
//! save states. Commands from the main CPU arrive through a latch with a
//! level-2 interrupt.

use std::sync::Arc;

use m3_core::core::bus::Bus;
use m3_core::core::sched::{StopFlag, cycles_per_frame};
use m3_core::cpu::{Cpu, M68K};
use m3_core::save::BlockFile;

const RAM1_SIZE: usize = 0x10_0000;
const RAM2_SIZE: usize = 0x10_0000;
const SCSP_REG_SIZE: usize = 0x1000;

pub struct SoundIo {
    prog_rom: Arc<Vec<u8>>,
    sample_rom: Arc<Vec<u8>>,
    ram1: Vec<u8>,
    ram2: Vec<u8>,
    scsp1_regs: Vec<u8>,
    scsp2_regs: Vec<u8>,
    cmd_latch: u8,
}

impl SoundIo {
    fn ram_read8(&self, addr: u32) -> u8 {
        let addr = addr & 0x00FF_FFFF;
        match addr {
            0x00_0000..=0x0F_FFFF => self.ram1[addr as usize],
            0x10_0000..=0x10_0FFF => self.scsp1_regs[(addr & 0xFFF) as usize],
            0x20_0000..=0x2F_FFFF => self.ram2[(addr & 0xF_FFFF) as usize],
            0x30_0000..=0x30_0FFF => self.scsp2_regs[(addr & 0xFFF) as usize],
            0x60_0000..=0x67_FFFF => self
                .prog_rom
                .get((addr & 0x7_FFFF) as usize)
                .copied()
                .unwrap_or(0),
            0x70_0000..=0x70_000F => self.cmd_latch,
            0x80_0000..=0xFF_FFFF => self
                .sample_rom
                .get((addr - 0x80_0000) as usize)
                .copied()
                .unwrap_or(0),
            _ => 0,
        }
    }
}

impl Bus for SoundIo {
    fn read8(&mut self, addr: u32) -> u8 {
        self.ram_read8(addr)
    }

    fn read16(&mut self, addr: u32) -> u16 {
        let hi = self.ram_read8(addr) as u16;
        let lo = self.ram_read8(addr | 1) as u16;
        (hi << 8) | lo
    }

    fn read32(&mut self, addr: u32) -> u32 {
        let hi = self.read16(addr) as u32;
        let lo = self.read16(addr.wrapping_add(2)) as u32;
        (hi << 16) | lo
    }

    fn write8(&mut self, addr: u32, data: u8) {
        let addr = addr & 0x00FF_FFFF;
        match addr {
            0x00_0000..=0x0F_FFFF => self.ram1[addr as usize] = data,
            0x10_0000..=0x10_0FFF => self.scsp1_regs[(addr & 0xFFF) as usize] = data,
            0x20_0000..=0x2F_FFFF => self.ram2[(addr & 0xF_FFFF) as usize] = data,
            0x30_0000..=0x30_0FFF => self.scsp2_regs[(addr & 0xFFF) as usize] = data,
            _ => {}
        }
    }

    fn write16(&mut self, addr: u32, data: u16) {
        self.write8(addr, (data >> 8) as u8);
        self.write8(addr | 1, data as u8);
    }

    fn write32(&mut self, addr: u32, data: u32) {
        self.write16(addr, (data >> 16) as u16);
        self.write16(addr.wrapping_add(2), data as u16);
    }
}

pub struct SoundBoard {
    m68k: M68K,
    io: SoundIo,
}

impl SoundBoard {
    pub const CLOCK_HZ: u64 = 11_289_600;

    pub fn new(prog_rom: Arc<Vec<u8>>, sample_rom: Arc<Vec<u8>>) -> Self {
        SoundBoard {
            m68k: M68K::new(),
            io: SoundIo {
                prog_rom,
                sample_rom,
                ram1: vec![0; RAM1_SIZE],
                ram2: vec![0; RAM2_SIZE],
                scsp1_regs: vec![0; SCSP_REG_SIZE],
                scsp2_regs: vec![0; SCSP_REG_SIZE],
                cmd_latch: 0,
            },
        }
    }

    pub fn attach_stop_flag(&mut self, stop: StopFlag) {
        self.m68k.attach_stop_flag(stop);
    }

    pub fn reset(&mut self) {
        self.io.cmd_latch = 0;
        // The 68K program is copied into RAM by the main CPU before the
        // reset line is released, so vectors come from RAM.
        self.m68k.reset(&mut self.io);
    }

    /// Command byte latched from the main CPU; raises a level-2 interrupt.
    pub fn write_command(&mut self, data: u8) {
        self.io.cmd_latch = data;
        self.m68k.set_irq(2);
    }

    /// Load a program image at the bottom of 68K RAM (vectors included).
    pub fn load_program(&mut self, image: &[u8]) {
        let len = image.len().min(self.io.ram1.len());
        self.io.ram1[..len].copy_from_slice(&image[..len]);
    }

    pub fn run_frame(&mut self) {
        self.m68k.run(&mut self.io, cycles_per_frame(Self::CLOCK_HZ));
    }

    pub fn get_pc(&self) -> u32 {
        self.m68k.get_pc()
    }

    pub fn save_state(&self, file: &mut BlockFile) {
        let mut w = file.new_block(b"M68K");
        self.m68k.save(&mut w);
        w.put_bytes(&self.io.ram1);
        w.put_bytes(&self.io.ram2);
        w.put_bytes(&self.io.scsp1_regs);
        w.put_bytes(&self.io.scsp2_regs);
        w.put_u8(self.io.cmd_latch);
    }

    pub fn load_state(&mut self, file: &BlockFile) {
        let Some(mut r) = file.find(b"M68K") else {
            log::warn!("save state has no M68K block; resetting the sound board");
            self.reset();
            return;
        };
        self.m68k.load(&mut r);
        r.get_bytes(&mut self.io.ram1);
        r.get_bytes(&mut self.io.ram2);
        r.get_bytes(&mut self.io.scsp1_regs);
        r.get_bytes(&mut self.io.scsp2_regs);
        self.io.cmd_latch = r.get_u8();
    }
}
