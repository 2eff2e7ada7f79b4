//! Sega Digital Sound Boards: DSB1 (Z80) and DSB2 (68000).
//!
//! Both boards receive command bytes from the main CPU through a FIFO
//! (the real boards have no such buffer; the sound CPU is not synced
//! against the main CPU, so it drains a frame's worth of commands in one
//! batch) and drive the MPEG engine from them, then mix one frame of
//! resampled audio into the host accumulators.

use std::collections::HashMap;
use std::sync::Arc;

use m3_core::core::bus::{Bus, IntAck};
use m3_core::core::sched::{FrameTimer, StopFlag, TimerEvent, cycles_per_frame};
use m3_core::cpu::{Cpu, M68K, Z80};
use m3_core::device::fifo::Fifo;
use m3_core::device::mpeg::{CustomTrack, MpegEngine, Resampler};
use m3_core::save::{BlockFile, BlockReader, BlockWriter};

/// MPEG streams on these boards are always 32 kHz.
const MPEG_RATE: u32 = 32_000;
const HOST_RATE: u32 = 44_100;
/// Input samples per video frame, plus two of interpolation slack.
const MPEG_BUFFER: usize = (MPEG_RATE / 60) as usize + 2;
pub const HOST_SAMPLES_PER_FRAME: usize = (HOST_RATE / 60) as usize;

const FIFO_DEPTH: usize = 32;

/// Common interface both DSB types expose to the main board.
pub trait DigitalSoundBoard {
    fn reset(&mut self);
    /// Latch one command byte from the main CPU.
    fn send_command(&mut self, data: u8);
    /// Run the sound CPU for one frame and mix this frame's music into
    /// the host accumulators.
    fn run_frame(&mut self, out_l: &mut [f32], out_r: &mut [f32]);
    /// Register external audio substituted for MPEG ROM regions.
    fn set_custom_tracks(&mut self, tracks: HashMap<u32, CustomTrack>);
    fn save_state(&self, file: &mut BlockFile);
    fn load_state(&mut self, file: &BlockFile);
    fn get_pc(&self) -> u32;
}

// ---------------------------------------------------------------------------
// DSB1 (Z80)
// ---------------------------------------------------------------------------

/// Everything the DSB1's Z80 can reach over its bus; split from the CPU so
/// `run()` can borrow both halves.
pub struct Dsb1Io {
    rom: Arc<Vec<u8>>,
    mpeg_rom: Arc<Vec<u8>>,
    ram: Vec<u8>,
    fifo: Fifo,
    /// Interrupt line to the Z80: raised while commands are pending,
    /// latched low by a FIFO read.
    int_line: bool,
    mpeg_state: u8,
    start_latch: u32,
    end_latch: u32,
    mpeg_start: u32,
    mpeg_end: u32,
    loop_start: u32,
    loop_end: u32,
    using_mpeg_start: u32,
    using_mpeg_end: u32,
    using_loop_start: u32,
    using_loop_end: u32,
    volume: u8,
    stereo: u8,
    engine: MpegEngine,
}

impl Dsb1Io {
    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn stereo(&self) -> u8 {
        self.stereo
    }

    pub fn mpeg_start(&self) -> u32 {
        self.mpeg_start
    }

    pub fn mpeg_end(&self) -> u32 {
        self.mpeg_end
    }

    pub fn loop_window(&self) -> (u32, u32) {
        (self.using_loop_start, self.using_loop_end)
    }

    pub fn engine(&self) -> &MpegEngine {
        &self.engine
    }

    /// Program the engine's loop window from the current loop markers.
    fn apply_loop(&mut self) {
        self.using_loop_start = self.loop_start;
        self.using_loop_end = if self.loop_end == 0 {
            // Loop end of zero means "keep the previous end marker".
            self.mpeg_end.wrapping_sub(self.loop_start)
        } else {
            self.loop_end.wrapping_sub(self.loop_start)
        };
        let rom = Arc::clone(&self.mpeg_rom);
        self.engine.update_memory(
            &rom,
            self.using_loop_start,
            self.using_loop_end as usize,
            true,
        );
    }
}

impl Bus for Dsb1Io {
    fn read8(&mut self, addr: u32) -> u8 {
        let addr = addr as usize & 0xFFFF;
        if addr < 0x8000 {
            self.rom.get(addr).copied().unwrap_or(0)
        } else {
            self.ram[addr & 0x7FFF]
        }
    }

    fn read16(&mut self, addr: u32) -> u16 {
        let lo = self.read8(addr) as u16;
        let hi = self.read8(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn read32(&mut self, addr: u32) -> u32 {
        let lo = self.read16(addr) as u32;
        let hi = self.read16(addr.wrapping_add(2)) as u32;
        (hi << 16) | lo
    }

    fn write8(&mut self, addr: u32, data: u8) {
        let addr = addr as usize & 0xFFFF;
        if addr >= 0x8000 {
            self.ram[addr & 0x7FFF] = data;
        }
    }

    fn write16(&mut self, addr: u32, data: u16) {
        self.write8(addr, data as u8);
        self.write8(addr.wrapping_add(1), (data >> 8) as u8);
    }

    fn write32(&mut self, addr: u32, data: u32) {
        self.write16(addr, data as u16);
        self.write16(addr.wrapping_add(2), (data >> 16) as u16);
    }

    fn io_read8(&mut self, port: u32) -> u8 {
        match port & 0xFF {
            // Current play position as a 24-bit big-endian window over
            // mpeg-start + byte offset.
            0xE2 => (((self.engine.position() + self.mpeg_start as i64) >> 16) & 0xFF) as u8,
            0xE3 => (((self.engine.position() + self.mpeg_start as i64) >> 8) & 0xFF) as u8,
            0xE4 => ((self.engine.position() + self.mpeg_start as i64) & 0xFF) as u8,
            0xF0 => {
                let data = self.fifo.pop();
                self.int_line = false;
                data
            }
            0xF1 => {
                // Bit 0 always set; bit 1 = command pending; the rest must
                // read clear (games poll (status & 0x38) == 0).
                1 | if self.fifo.is_empty() { 0 } else { 2 }
            }
            _ => 0,
        }
    }

    fn io_write8(&mut self, port: u32, data: u8) {
        match port & 0xFF {
            0xE0 => {
                // MPEG trigger: 0 = stop, 1 = play, 2 = play-with-loop
                // (the loop markers arrive afterwards via 0xE2-0xE4).
                self.mpeg_state = data;
                match data {
                    0 => self.engine.stop(),
                    1 | 2 => {
                        self.using_loop_start = 0;
                        self.using_loop_end = 0;
                        self.using_mpeg_start = self.mpeg_start;
                        self.using_mpeg_end = self.mpeg_end;
                        let rom = Arc::clone(&self.mpeg_rom);
                        let len = self.mpeg_end.wrapping_sub(self.mpeg_start) as usize;
                        self.engine.set_memory(&rom, self.mpeg_start, len, false);
                    }
                    _ => {}
                }
            }
            0xE2 => self.start_latch = (self.start_latch & 0x00_FFFF) | ((data as u32) << 16),
            0xE3 => self.start_latch = (self.start_latch & 0xFF_00FF) | ((data as u32) << 8),
            0xE4 => {
                self.start_latch = (self.start_latch & 0xFF_FF00) | data as u32;
                if self.mpeg_state == 0 {
                    self.mpeg_start = self.start_latch;
                } else {
                    self.loop_start = self.start_latch;
                    self.apply_loop();
                }
            }
            0xE5 => self.end_latch = (self.end_latch & 0x00_FFFF) | ((data as u32) << 16),
            0xE6 => self.end_latch = (self.end_latch & 0xFF_00FF) | ((data as u32) << 8),
            0xE7 => {
                self.end_latch = (self.end_latch & 0xFF_FF00) | data as u32;
                if self.mpeg_state == 0 {
                    self.mpeg_end = self.end_latch;
                } else {
                    self.loop_end = self.end_latch;
                    self.using_loop_start = self.loop_start;
                    self.using_loop_end = self.loop_end.wrapping_sub(self.loop_start);
                    let rom = Arc::clone(&self.mpeg_rom);
                    self.engine.update_memory(
                        &rom,
                        self.using_loop_start,
                        self.using_loop_end as usize,
                        true,
                    );
                }
            }
            // Inverted on the hardware; preserved bit-exact.
            0xE8 => self.volume = 0x7F_u8.wrapping_sub(data),
            0xE9 => self.stereo = data,
            _ => {}
        }
    }

    fn ack_interrupt(&mut self, _level: u8) -> IntAck {
        IntAck::Vector(0x38)
    }
}

pub struct Dsb1 {
    z80: Z80,
    io: Dsb1Io,
    resampler: Resampler,
    mpeg_l: Vec<i16>,
    mpeg_r: Vec<i16>,
    retained: usize,
    emulate: bool,
    music_volume: u32,
}

impl Dsb1 {
    /// 4 MHz Z80 with 32 KB program ROM and 32 KB RAM.
    pub const CLOCK_HZ: u64 = 4_000_000;

    pub fn new(prog_rom: Arc<Vec<u8>>, mpeg_rom: Arc<Vec<u8>>, emulate: bool) -> Self {
        Dsb1 {
            z80: Z80::new(),
            io: Dsb1Io {
                rom: prog_rom,
                mpeg_rom,
                ram: vec![0; 0x8000],
                fifo: Fifo::new(FIFO_DEPTH),
                int_line: false,
                mpeg_state: 0,
                start_latch: 0,
                end_latch: 0,
                mpeg_start: 0,
                mpeg_end: 0,
                loop_start: 0,
                loop_end: 0,
                using_mpeg_start: 0,
                using_mpeg_end: 0,
                using_loop_start: 0,
                using_loop_end: 0,
                volume: 0x7F,
                stereo: 0,
                engine: MpegEngine::new(),
            },
            resampler: Resampler::new(),
            mpeg_l: vec![0; MPEG_BUFFER],
            mpeg_r: vec![0; MPEG_BUFFER],
            retained: 0,
            emulate,
            music_volume: 100,
        }
    }

    pub fn set_music_volume(&mut self, percent: u32) {
        self.music_volume = percent.min(200);
    }

    pub fn attach_stop_flag(&mut self, stop: StopFlag) {
        self.z80.attach_stop_flag(stop);
    }

    pub fn engine_mut(&mut self) -> &mut MpegEngine {
        &mut self.io.engine
    }

    pub fn io(&self) -> &Dsb1Io {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut Dsb1Io {
        &mut self.io
    }

    pub fn z80_mut(&mut self) -> &mut Z80 {
        &mut self.z80
    }
}

impl DigitalSoundBoard for Dsb1 {
    fn reset(&mut self) {
        self.io.engine.stop();
        self.resampler.reset();
        self.retained = 0;
        self.io.fifo.clear();
        self.io.int_line = false;
        self.io.mpeg_state = 0;
        self.io.volume = 0x7F;
        self.io.using_loop_start = 0;
        // Even with emulation disabled the Z80 must hold a valid state.
        self.z80.reset(&mut self.io);
    }

    fn send_command(&mut self, data: u8) {
        self.io.fifo.push(data);
        self.io.int_line = true;
    }

    fn set_custom_tracks(&mut self, tracks: HashMap<u32, CustomTrack>) {
        self.io.engine.set_custom_tracks(tracks);
    }

    fn run_frame(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        if !self.emulate {
            // The mixer still runs so SCSP-side volume state and the
            // resampler phase stay consistent.
            self.mpeg_l.fill(0);
            self.mpeg_r.fill(0);
            self.retained = self.resampler.up_sample_and_mix(
                out_l,
                out_r,
                &mut self.mpeg_l,
                &mut self.mpeg_r,
                0,
                0,
                self.music_volume,
                HOST_RATE,
                MPEG_RATE,
            );
            return;
        }

        // Drain pending commands with the interrupt line held, in short
        // slices so the line tracks FIFO state closely.
        let mut cycles = cycles_per_frame(Self::CLOCK_HZ) as i64;
        while cycles > 0 && !self.io.fifo.is_empty() {
            self.io.int_line = true;
            self.z80.set_int(true);
            cycles -= self.z80.run(&mut self.io, 500) as i64;
            self.z80.set_int(self.io.int_line);
        }
        if cycles > 0 {
            self.z80.set_int(self.io.int_line);
            self.z80.run(&mut self.io, cycles as u64);
        }

        // Volume 0x00-0x7F widened to 0x00-0xFF.
        let volume = ((self.io.volume as u32 * 255) / 127).min(255) as u8;

        let fresh = MPEG_BUFFER - self.retained;
        let retained = self.retained;
        self.io.engine.decode_audio(
            &mut self.mpeg_l[retained..],
            &mut self.mpeg_r[retained..],
            fresh,
        );
        self.retained = self.resampler.up_sample_and_mix(
            out_l,
            out_r,
            &mut self.mpeg_l,
            &mut self.mpeg_r,
            volume,
            volume,
            self.music_volume,
            HOST_RATE,
            MPEG_RATE,
        );
    }

    fn save_state(&self, file: &mut BlockFile) {
        let mut w = file.new_block(b"DSB1");
        let io = &self.io;
        w.put_bool(io.engine.is_playing());
        w.put_u64(io.engine.position() as u64);
        w.put_u32(io.using_mpeg_start);
        w.put_u32(io.using_mpeg_end);
        w.put_u32(io.using_loop_start);
        w.put_u32(io.using_loop_end);
        w.put_bytes(&io.ram);
        io.fifo.save(&mut w);
        w.put_bool(io.int_line);
        w.put_u32(io.mpeg_start);
        w.put_u32(io.mpeg_end);
        w.put_u8(io.mpeg_state);
        w.put_u32(io.loop_start);
        w.put_u32(io.loop_end);
        w.put_u32(io.start_latch);
        w.put_u32(io.end_latch);
        w.put_u8(io.volume);
        w.put_u8(io.stereo);
        self.z80.save(&mut w);
    }

    fn load_state(&mut self, file: &BlockFile) {
        let Some(mut r) = file.find(b"DSB1") else {
            log::warn!("save state has no DSB1 block; resetting the sound board");
            self.reset();
            return;
        };
        let playing = r.get_bool();
        let play_offset = r.get_u64() as i64;
        let io = &mut self.io;
        io.using_mpeg_start = r.get_u32();
        io.using_mpeg_end = r.get_u32();
        io.using_loop_start = r.get_u32();
        io.using_loop_end = r.get_u32();
        r.get_bytes(&mut io.ram);
        io.fifo.load(&mut r);
        io.int_line = r.get_bool();
        io.mpeg_start = r.get_u32();
        io.mpeg_end = r.get_u32();
        io.mpeg_state = r.get_u8();
        io.loop_start = r.get_u32();
        io.loop_end = r.get_u32();
        io.start_latch = r.get_u32();
        io.end_latch = r.get_u32();
        io.volume = r.get_u8();
        io.stereo = r.get_u8();
        self.z80.load(&mut r);

        // Re-seat the MPEG stream at the saved position.
        if playing {
            let rom = Arc::clone(&io.mpeg_rom);
            let len = io.using_mpeg_end.wrapping_sub(io.using_mpeg_start) as usize;
            io.engine.set_memory(&rom, io.using_mpeg_start, len, false);
            if io.using_loop_end != 0 {
                io.engine.update_memory(
                    &rom,
                    io.using_loop_start,
                    io.using_loop_end as usize,
                    true,
                );
            }
            io.engine.set_position(play_offset);
        } else {
            io.engine.stop();
        }
    }

    fn get_pc(&self) -> u32 {
        self.z80.get_pc()
    }
}

// ---------------------------------------------------------------------------
// DSB2 (68000)
// ---------------------------------------------------------------------------

/// Output channel routing selected by the command stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StereoMode {
    Stereo,
    MonoLeft,
    MonoRight,
}

impl StereoMode {
    fn to_u8(self) -> u8 {
        match self {
            StereoMode::Stereo => 0,
            StereoMode::MonoLeft => 1,
            StereoMode::MonoRight => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => StereoMode::MonoLeft,
            2 => StereoMode::MonoRight,
            _ => StereoMode::Stereo,
        }
    }
}

/// Byte-decoder states for the MPEG command port.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CmdState {
    Idle,
    Got14,
    Got14Mid,
    Got14Low,
    Got24,
    Got24Mid,
    Got24Low,
    GotA0,
    GotA1,
    GotA3,
    GotA4,
    GotA5,
    GotA7,
    GotB0,
    GotB1,
    GotB2,
    GotB4,
    GotB5,
    GotB6,
}

impl CmdState {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(v: u8) -> Self {
        use CmdState::*;
        match v {
            1 => Got14,
            2 => Got14Mid,
            3 => Got14Low,
            4 => Got24,
            5 => Got24Mid,
            6 => Got24Low,
            7 => GotA0,
            8 => GotA1,
            9 => GotA3,
            10 => GotA4,
            11 => GotA5,
            12 => GotA7,
            13 => GotB0,
            14 => GotB1,
            15 => GotB2,
            16 => GotB4,
            17 => GotB5,
            18 => GotB6,
            _ => Idle,
        }
    }
}

pub struct Dsb2Io {
    rom: Arc<Vec<u8>>,
    mpeg_rom: Arc<Vec<u8>>,
    ram: Vec<u8>,
    fifo: Fifo,
    cmd_latch: u8,
    state: CmdState,
    mpeg_start: u32,
    mpeg_end: u32,
    playing: bool,
    using_mpeg_start: u32,
    using_mpeg_end: u32,
    using_loop_start: u32,
    using_loop_end: u32,
    volume: [u8; 2],
    stereo: StereoMode,
    engine: MpegEngine,
}

impl Dsb2Io {
    fn start_playback(&mut self) {
        self.using_loop_start = 0;
        self.using_loop_end = 0;
        self.using_mpeg_start = self.mpeg_start;
        self.using_mpeg_end = self.mpeg_end;
        self.playing = true;
        let rom = Arc::clone(&self.mpeg_rom);
        let len = self.mpeg_end.wrapping_sub(self.mpeg_start) as usize;
        self.engine.set_memory(&rom, self.mpeg_start, len, false);
    }

    fn stop_playback(&mut self) {
        self.engine.stop();
        self.playing = false;
    }

    /// The twenty-state MPEG command decoder.
    pub fn write_mpeg_port(&mut self, byte: u8) {
        use CmdState::*;
        match self.state {
            Idle => match byte {
                0x14 | 0x15 => self.state = Got14,
                0x24 | 0x25 => self.state = Got24,
                0x74 | 0x75 => self.start_playback(),
                0x84 | 0x85 => self.stop_playback(),
                0xA0 => self.state = GotA0,
                0xA1 => self.state = GotA1,
                0xA3 => self.state = GotA3,
                0xA4 => self.state = GotA4,
                0xA5 => self.state = GotA5,
                0xA7 => self.state = GotA7,
                0xB0 => self.state = GotB0,
                0xB1 => self.state = GotB1,
                0xB2 => self.state = GotB2,
                0xB4 => self.state = GotB4,
                0xB5 => self.state = GotB5,
                0xB6 => self.state = GotB6,
                _ => {}
            },
            Got14 => {
                self.mpeg_start = (self.mpeg_start & 0x00_FFFF) | ((byte as u32) << 16);
                self.state = Got14Mid;
            }
            Got14Mid => {
                self.mpeg_start = (self.mpeg_start & 0xFF_00FF) | ((byte as u32) << 8);
                self.state = Got14Low;
            }
            Got14Low => {
                self.mpeg_start = (self.mpeg_start & 0xFF_FF00) | byte as u32;
                self.state = Idle;
                if self.playing {
                    // Mid-play start writes retarget the loop region, with
                    // the end pinned to the current end marker.
                    self.using_loop_start = self.mpeg_start;
                    self.using_loop_end = self.mpeg_end.wrapping_sub(self.mpeg_start);
                    let rom = Arc::clone(&self.mpeg_rom);
                    self.engine.update_memory(
                        &rom,
                        self.using_loop_start,
                        self.using_loop_end as usize,
                        true,
                    );
                }
            }
            Got24 => {
                self.mpeg_end = (self.mpeg_end & 0x00_FFFF) | ((byte as u32) << 16);
                self.state = Got24Mid;
            }
            Got24Mid => {
                self.mpeg_end = (self.mpeg_end & 0xFF_00FF) | ((byte as u32) << 8);
                self.state = Got24Low;
            }
            Got24Low => {
                self.mpeg_end = (self.mpeg_end & 0xFF_FF00) | byte as u32;
                self.stereo = StereoMode::Stereo;
                self.state = Idle;
            }
            GotA0 => {
                self.stereo = if byte != 0 { StereoMode::MonoLeft } else { StereoMode::Stereo };
                self.state = Idle;
            }
            GotA4 => {
                // Some titles start the attract tune from here.
                self.state = Idle;
                if byte == 0x75 {
                    self.start_playback();
                }
            }
            GotB1 => {
                self.stereo = if byte != 0 { StereoMode::MonoRight } else { StereoMode::Stereo };
                self.state = Idle;
            }
            GotB4 => {
                self.state = Idle;
                if byte == 0x96 {
                    self.stop_playback();
                }
            }
            GotB6 | GotB0 => {
                self.volume[0] = byte;
                self.state = Idle;
            }
            GotA7 | GotA1 => {
                self.volume[1] = byte;
                self.state = Idle;
            }
            GotA3 | GotA5 | GotB2 | GotB5 => self.state = Idle,
        }
    }
}

impl Bus for Dsb2Io {
    fn read8(&mut self, addr: u32) -> u8 {
        let addr = addr & 0x00FF_FFFF;
        match addr {
            0x00_0000..=0x01_FFFF => self.rom.get(addr as usize).copied().unwrap_or(0),
            0xC0_0001 => self.cmd_latch,
            0xC0_0003 => 1, // command valid
            0xE8_0001 => 0x01,
            0xF0_0000..=0xF1_FFFF => self.ram[(addr & 0x1_FFFF) as usize],
            _ => 0,
        }
    }

    fn read16(&mut self, addr: u32) -> u16 {
        let hi = self.read8(addr) as u16;
        let lo = self.read8(addr | 1) as u16;
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
            0xE0_0003 => self.write_mpeg_port(data),
            0xF0_0000..=0xF1_FFFF => self.ram[(addr & 0x1_FFFF) as usize] = data,
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

pub struct Dsb2 {
    m68k: M68K,
    io: Dsb2Io,
    timer: FrameTimer,
    stop: StopFlag,
    resampler: Resampler,
    mpeg_l: Vec<i16>,
    mpeg_r: Vec<i16>,
    retained: usize,
    emulate: bool,
    music_volume: u32,
}

impl Dsb2 {
    /// 68000 clock; the board's timer interrupt runs at 1 kHz.
    pub const CLOCK_HZ: u64 = 11_289_600;
    pub const TIMER_HZ: u64 = 1_000;

    pub fn new(prog_rom: Arc<Vec<u8>>, mpeg_rom: Arc<Vec<u8>>, emulate: bool) -> Self {
        Dsb2 {
            m68k: M68K::new(),
            io: Dsb2Io {
                rom: prog_rom,
                mpeg_rom,
                ram: vec![0; 0x2_0000],
                fifo: Fifo::new(FIFO_DEPTH),
                cmd_latch: 0,
                state: CmdState::Idle,
                mpeg_start: 0,
                mpeg_end: 0,
                playing: false,
                using_mpeg_start: 0,
                using_mpeg_end: 0,
                using_loop_start: 0,
                using_loop_end: 0,
                volume: [0xFF, 0xFF],
                stereo: StereoMode::Stereo,
                engine: MpegEngine::new(),
            },
            timer: FrameTimer::new(
                cycles_per_frame(Self::CLOCK_HZ),
                Self::CLOCK_HZ / Self::TIMER_HZ,
            ),
            stop: StopFlag::new(),
            resampler: Resampler::new(),
            mpeg_l: vec![0; MPEG_BUFFER],
            mpeg_r: vec![0; MPEG_BUFFER],
            retained: 0,
            emulate,
            music_volume: 100,
        }
    }

    pub fn set_music_volume(&mut self, percent: u32) {
        self.music_volume = percent.min(200);
    }

    pub fn attach_stop_flag(&mut self, stop: StopFlag) {
        self.stop = stop.clone();
        self.m68k.attach_stop_flag(stop);
    }

    pub fn engine_mut(&mut self) -> &mut MpegEngine {
        &mut self.io.engine
    }

    pub fn io(&self) -> &Dsb2Io {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut Dsb2Io {
        &mut self.io
    }

    pub fn mpeg_start(&self) -> u32 {
        self.io.mpeg_start
    }

    pub fn mpeg_end(&self) -> u32 {
        self.io.mpeg_end
    }

    pub fn stereo_mode(&self) -> StereoMode {
        self.io.stereo
    }

    pub fn is_playing(&self) -> bool {
        self.io.playing
    }
}

impl DigitalSoundBoard for Dsb2 {
    fn reset(&mut self) {
        self.io.engine.stop();
        self.resampler.reset();
        self.retained = 0;
        self.io.fifo.clear();
        self.io.state = CmdState::Idle;
        self.io.mpeg_start = 0;
        self.io.mpeg_end = 0;
        self.io.playing = false;
        // Maximum volume, in case the volume commands are never seen.
        self.io.volume = [0xFF, 0xFF];
        self.io.stereo = StereoMode::Stereo;
        self.m68k.reset(&mut self.io);
        self.timer.reset();
    }

    fn send_command(&mut self, data: u8) {
        self.io.fifo.push(data);
    }

    fn set_custom_tracks(&mut self, tracks: HashMap<u32, CustomTrack>) {
        self.io.engine.set_custom_tracks(tracks);
    }

    fn run_frame(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        if !self.emulate {
            self.mpeg_l.fill(0);
            self.mpeg_r.fill(0);
            self.retained = self.resampler.up_sample_and_mix(
                out_l,
                out_r,
                &mut self.mpeg_l,
                &mut self.mpeg_r,
                0,
                0,
                self.music_volume,
                HOST_RATE,
                MPEG_RATE,
            );
            return;
        }

        // Deliver each pending command with a level-1 interrupt.
        while !self.io.fifo.is_empty() {
            self.io.cmd_latch = self.io.fifo.pop();
            self.m68k.set_irq(1);
            let consumed = self.m68k.run(&mut self.io, 500);
            self.timer.consume(consumed);
            if self.stop.is_raised() {
                return;
            }
        }

        // The level-2 interrupt is a 1 kHz timer, not a per-frame pulse;
        // music fades depend on its rate.
        let m68k = &mut self.m68k;
        let io = &mut self.io;
        self.timer.run_frame(&self.stop, |event| match event {
            TimerEvent::Run(quota) => m68k.run(io, quota),
            TimerEvent::Fire => {
                m68k.set_irq(2);
                0
            }
        });

        // Decode this frame's PCM and route channels by stereo mode.
        let fresh = MPEG_BUFFER - self.retained;
        let retained = self.retained;
        self.io.engine.decode_audio(
            &mut self.mpeg_l[retained..],
            &mut self.mpeg_r[retained..],
            fresh,
        );

        let (vol_l, vol_r) = match self.io.stereo {
            StereoMode::Stereo => (self.io.volume[0], self.io.volume[1]),
            StereoMode::MonoLeft => {
                self.mpeg_r.copy_from_slice(&self.mpeg_l);
                (self.io.volume[0], self.io.volume[0])
            }
            StereoMode::MonoRight => {
                self.mpeg_l.copy_from_slice(&self.mpeg_r);
                (self.io.volume[1], self.io.volume[1])
            }
        };
        self.retained = self.resampler.up_sample_and_mix(
            out_l,
            out_r,
            &mut self.mpeg_l,
            &mut self.mpeg_r,
            vol_l,
            vol_r,
            self.music_volume,
            HOST_RATE,
            MPEG_RATE,
        );
    }

    fn save_state(&self, file: &mut BlockFile) {
        let mut w = file.new_block(b"DSB2");
        let io = &self.io;
        w.put_bool(io.engine.is_playing());
        w.put_u64(io.engine.position() as u64);
        w.put_u32(io.using_mpeg_start);
        w.put_u32(io.using_mpeg_end);
        w.put_u32(io.using_loop_start);
        w.put_u32(io.using_loop_end);
        w.put_bytes(&io.ram);
        io.fifo.save(&mut w);
        w.put_u8(io.cmd_latch);
        w.put_u8(io.state.to_u8());
        w.put_u32(io.mpeg_start);
        w.put_u32(io.mpeg_end);
        w.put_bool(io.playing);
        w.put_u8(io.volume[0]);
        w.put_u8(io.volume[1]);
        w.put_u8(io.stereo.to_u8());
        w.put_u64(self.timer.cycle_carry());
        self.m68k.save(&mut w);
    }

    fn load_state(&mut self, file: &BlockFile) {
        let Some(mut r) = file.find(b"DSB2") else {
            log::warn!("save state has no DSB2 block; resetting the sound board");
            self.reset();
            return;
        };
        let playing = r.get_bool();
        let play_offset = r.get_u64() as i64;
        let io = &mut self.io;
        io.using_mpeg_start = r.get_u32();
        io.using_mpeg_end = r.get_u32();
        io.using_loop_start = r.get_u32();
        io.using_loop_end = r.get_u32();
        r.get_bytes(&mut io.ram);
        io.fifo.load(&mut r);
        io.cmd_latch = r.get_u8();
        io.state = CmdState::from_u8(r.get_u8());
        io.mpeg_start = r.get_u32();
        io.mpeg_end = r.get_u32();
        io.playing = r.get_bool();
        io.volume[0] = r.get_u8();
        io.volume[1] = r.get_u8();
        io.stereo = StereoMode::from_u8(r.get_u8());
        let carry = r.get_u64();
        self.m68k.load(&mut r);
        self.timer.reset();
        self.timer.set_cycle_carry(carry);

        if playing {
            let rom = Arc::clone(&io.mpeg_rom);
            let len = io.using_mpeg_end.wrapping_sub(io.using_mpeg_start) as usize;
            io.engine.set_memory(&rom, io.using_mpeg_start, len, false);
            if io.using_loop_end != 0 {
                io.engine.update_memory(
                    &rom,
                    io.using_loop_start,
                    io.using_loop_end as usize,
                    true,
                );
            }
            io.engine.set_position(play_offset);
        } else {
            io.engine.stop();
        }
    }

    fn get_pc(&self) -> u32 {
        self.m68k.get_pc()
    }
}
