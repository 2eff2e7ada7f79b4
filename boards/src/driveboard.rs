//! Force-feedback drive board.
//!
//! Two interchangeable paths behind one observable contract: the emulated
//! path runs the board's 4 MHz Z80 against its 32 KB ROM and 8 KB RAM,
//! the simulated path is a high-level state machine used when the ROM is
//! unavailable or determinism is preferred. Both exchange bytes with the
//! main CPU through the same pair of latches and must produce the same
//! status-byte sequence.
//!
//! Command protocol observed on the main-CPU latch (both paths):
//! - `0x00`      ping; the board echoes its status byte
//! - `0xCB`      re-initialize; status returns to `STATUS_READY`
//! - `0x1X`      self-center strength X*0x11
//! - `0x2X`      friction strength X*0x11
//! - `0x3X`      vibrate strength X*0x11
//! - `0x4X/0x5X` constant force right/left, strength X
//! - `0x60`      stop all force output
//! - other       echoed back (diagnostics)

use m3_core::core::bus::Bus;
use m3_core::core::sched::cycles_per_frame;
use m3_core::cpu::{Cpu, Z80};
use m3_core::save::{BlockFile, BlockReader, BlockWriter};

/// Force-feedback output hooks, implemented by the platform layer.
pub trait ForceFeedback {
    fn stop_all(&mut self);
    fn constant_force(&mut self, force: i8);
    fn self_center(&mut self, strength: u8);
    fn friction(&mut self, strength: u8);
    fn vibrate(&mut self, strength: u8);
}

/// Discards all effects (no force-feedback hardware attached).
#[derive(Default)]
pub struct NullForceFeedback;

impl ForceFeedback for NullForceFeedback {
    fn stop_all(&mut self) {}
    fn constant_force(&mut self, _force: i8) {}
    fn self_center(&mut self, _strength: u8) {}
    fn friction(&mut self, _strength: u8) {}
    fn vibrate(&mut self, _strength: u8) {}
}

const STATUS_READY: u8 = 0x80;
const STATUS_BUSY: u8 = 0x81;

/// Z80-visible I/O ports (emulated path).
mod port {
    pub const DATA_IN: u32 = 0x20; // command latched from the main CPU
    pub const ADC_SELECT: u32 = 0x22;
    pub const DIP1: u32 = 0x24;
    pub const DIP2: u32 = 0x25;
    pub const ADC_DATA: u32 = 0x26; // serial, MSB first
    pub const DATA_OUT: u32 = 0x30; // response latch to the main CPU
    pub const SEG1_LEFT: u32 = 0x10;
    pub const SEG1_RIGHT: u32 = 0x11;
    pub const SEG2_LEFT: u32 = 0x12;
    pub const SEG2_RIGHT: u32 = 0x13;
    pub const ENCODER_DATA: u32 = 0x42;
    pub const UNCENTER_LO: u32 = 0x43;
    pub const UNCENTER_HI: u32 = 0x44;
    pub const ENCODER_CONTROL: u32 = 0x46;
}

/// Bus-visible state of the emulated board, split from the Z80.
pub struct DriveIo {
    rom: Vec<u8>,
    ram: Vec<u8>,
    data_sent: u8,
    data_received: u8,
    seg_digits: [u8; 4],
    dip1: u8,
    dip2: u8,
    port42: u8,
    port46: u8,
    prev42: u8,
    prev46: u8,
    /// ADC channel being shifted out (0 = steering wheel) and the bit
    /// position within it.
    adc_port: u8,
    adc_bit: u8,
    /// Analog channel values latched from the host inputs.
    adc_channels: [u8; 4],
    /// Two-part pending uncenter command latched by the Z80.
    uncenter_val1: u8,
    uncenter_val2: u8,
    /// Encoder command decoded from a (port42, port46) pair, drained by
    /// the board each frame.
    pending_cmd: Option<FeedbackCmd>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum FeedbackCmd {
    StopAll,
    Constant(i8),
    SelfCenter(u8),
    Friction(u8),
    Vibrate(u8),
}

impl DriveIo {
    /// Translate the latest encoder port pair into a feedback command.
    /// Control selects the effect; data carries its magnitude.
    fn process_encoder_cmd(&mut self) {
        if self.port46 == self.prev46 && self.port42 == self.prev42 {
            return;
        }
        self.pending_cmd = Some(match self.port46 {
            0x00 => FeedbackCmd::StopAll,
            0x01 => FeedbackCmd::Constant(self.port42.wrapping_sub(0x80) as i8),
            0x02 => FeedbackCmd::SelfCenter(self.port42),
            0x03 => FeedbackCmd::Friction(self.port42),
            _ => FeedbackCmd::Vibrate(self.port42),
        });
        self.prev42 = self.port42;
        self.prev46 = self.port46;
    }
}

impl Bus for DriveIo {
    fn read8(&mut self, addr: u32) -> u8 {
        let addr = addr as usize & 0xFFFF;
        match addr {
            0x0000..=0x7FFF => self.rom.get(addr).copied().unwrap_or(0),
            0x8000..=0x9FFF => self.ram[addr & 0x1FFF],
            _ => 0,
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
        if (0x8000..=0x9FFF).contains(&addr) {
            self.ram[addr & 0x1FFF] = data;
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

    fn io_read8(&mut self, p: u32) -> u8 {
        match p & 0xFF {
            port::DATA_IN => self.data_sent,
            port::DIP1 => self.dip1,
            port::DIP2 => self.dip2,
            port::ADC_DATA => {
                // One bit per read, MSB first, of the selected channel.
                let value = self.adc_channels[(self.adc_port & 3) as usize];
                let bit = (value >> (7 - (self.adc_bit & 7))) & 1;
                self.adc_bit = (self.adc_bit + 1) & 7;
                bit
            }
            _ => 0,
        }
    }

    fn io_write8(&mut self, p: u32, data: u8) {
        match p & 0xFF {
            port::DATA_OUT => self.data_received = data,
            port::SEG1_LEFT => self.seg_digits[0] = data,
            port::SEG1_RIGHT => self.seg_digits[1] = data,
            port::SEG2_LEFT => self.seg_digits[2] = data,
            port::SEG2_RIGHT => self.seg_digits[3] = data,
            port::ADC_SELECT => {
                self.adc_port = data;
                self.adc_bit = 0;
            }
            port::ENCODER_DATA => self.port42 = data,
            port::UNCENTER_LO => self.uncenter_val1 = data,
            port::UNCENTER_HI => self.uncenter_val2 = data,
            port::ENCODER_CONTROL => {
                self.port46 = data;
                self.process_encoder_cmd();
            }
            _ => {}
        }
    }
}

pub struct DriveBoard {
    attached: bool,
    simulated: bool,
    /// Set when an incompatible save state was loaded; cleared by reset.
    tmp_disabled: bool,
    z80: Z80,
    io: DriveIo,
    steering_strength: u8,
    allow_interrupts: bool,
    // Simulation-path state.
    init_state: u8,
    status: u8,
    echo_val: u8,
    // Last effect values, for diagnostics and state saves.
    last_const_force: i8,
    last_self_center: u8,
    last_friction: u8,
    last_vibrate: u8,
}

impl DriveBoard {
    pub const CLOCK_HZ: u64 = 4_000_000;

    /// Emulated board around a 32 KB program ROM.
    pub fn new_emulated(rom: Vec<u8>) -> Self {
        Self::build(Some(rom), false)
    }

    /// High-level simulation (no Z80 executed).
    pub fn new_simulated() -> Self {
        Self::build(None, true)
    }

    fn build(rom: Option<Vec<u8>>, simulated: bool) -> Self {
        DriveBoard {
            attached: true,
            simulated,
            tmp_disabled: false,
            z80: Z80::new(),
            io: DriveIo {
                rom: rom.unwrap_or_default(),
                ram: vec![0; 0x2000],
                data_sent: 0,
                data_received: 0,
                seg_digits: [0; 4],
                dip1: 0xCE,
                dip2: 0xFF,
                port42: 0,
                port46: 0,
                prev42: 0,
                prev46: 0,
                adc_port: 0,
                adc_bit: 0,
                adc_channels: [0x80, 0x80, 0x80, 0x80],
                uncenter_val1: 0,
                uncenter_val2: 0,
                pending_cmd: None,
            },
            steering_strength: 5,
            allow_interrupts: false,
            init_state: 0,
            status: STATUS_BUSY,
            echo_val: 0,
            last_const_force: 0,
            last_self_center: 0,
            last_friction: 0,
            last_vibrate: 0,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached && !self.tmp_disabled
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    pub fn dip_switches(&self) -> (u8, u8) {
        (self.io.dip1, self.io.dip2)
    }

    pub fn set_dip_switches(&mut self, dip1: u8, dip2: u8) {
        self.io.dip1 = dip1;
        self.io.dip2 = dip2;
    }

    pub fn steering_strength(&self) -> u8 {
        self.steering_strength
    }

    /// 1-10, mapped onto the drive board's DIP switches.
    pub fn set_steering_strength(&mut self, strength: u8) {
        self.steering_strength = strength.clamp(1, 10);
        self.io.dip1 = (self.io.dip1 & 0xF0) | (self.steering_strength & 0x0F);
    }

    /// The two 7-segment displays: (display 1 left/right, display 2
    /// left/right) digit latches.
    pub fn seg_displays(&self) -> (u8, u8, u8, u8) {
        let d = &self.io.seg_digits;
        (d[0], d[1], d[2], d[3])
    }

    /// Latch an analog channel value (0 = steering wheel) for the board's
    /// serial ADC.
    pub fn set_adc_channel(&mut self, channel: usize, value: u8) {
        if let Some(slot) = self.io.adc_channels.get_mut(channel) {
            *slot = value;
        }
    }

    pub fn reset(&mut self) {
        self.tmp_disabled = false;
        self.allow_interrupts = false;
        self.init_state = 0;
        self.status = STATUS_BUSY;
        self.echo_val = 0;
        self.io.data_sent = 0;
        self.io.data_received = 0;
        self.io.port42 = 0;
        self.io.port46 = 0;
        self.io.prev42 = 0;
        self.io.prev46 = 0;
        self.io.adc_port = 0;
        self.io.adc_bit = 0;
        self.io.uncenter_val1 = 0;
        self.io.uncenter_val2 = 0;
        self.io.pending_cmd = None;
        self.io.ram.fill(0);
        self.z80.reset(&mut self.io);
    }

    /// Status/response byte read by the main CPU.
    pub fn read(&mut self) -> u8 {
        if !self.is_attached() {
            return 0xFF;
        }
        if self.simulated {
            self.simulate_read()
        } else {
            self.io.data_received
        }
    }

    /// Command byte written by the main CPU.
    pub fn write(&mut self, data: u8) {
        if !self.is_attached() {
            return;
        }
        if self.simulated {
            self.simulate_write(data);
        } else {
            self.io.data_sent = data;
            // Each command edge interrupts the Z80.
            if self.allow_interrupts {
                self.z80.set_int(true);
            } else {
                self.z80.trigger_nmi();
            }
        }
    }

    pub fn enable_interrupts(&mut self, enabled: bool) {
        self.allow_interrupts = enabled;
    }

    fn simulate_read(&mut self) -> u8 {
        match self.init_state {
            // Power-on handshake: two busy polls, then ready.
            0 | 1 => {
                self.init_state += 1;
                STATUS_BUSY
            }
            2 => {
                self.init_state = 3;
                self.status = STATUS_READY;
                STATUS_READY
            }
            _ => {
                if self.echo_val != 0 {
                    let v = self.echo_val;
                    self.echo_val = 0;
                    v
                } else {
                    self.status
                }
            }
        }
    }

    fn simulate_write(&mut self, data: u8) {
        match data {
            0x00 => self.echo_val = self.status,
            0xCB => {
                self.init_state = 0;
                self.status = STATUS_BUSY;
            }
            _ => match data >> 4 {
                0x1 => {
                    self.last_self_center = (data & 0xF) * 0x11;
                    self.io.pending_cmd = Some(FeedbackCmd::SelfCenter(self.last_self_center));
                }
                0x2 => {
                    self.last_friction = (data & 0xF) * 0x11;
                    self.io.pending_cmd = Some(FeedbackCmd::Friction(self.last_friction));
                }
                0x3 => {
                    self.last_vibrate = (data & 0xF) * 0x11;
                    self.io.pending_cmd = Some(FeedbackCmd::Vibrate(self.last_vibrate));
                }
                0x4 => {
                    self.last_const_force = (data & 0xF) as i8;
                    self.io.pending_cmd = Some(FeedbackCmd::Constant(self.last_const_force));
                }
                0x5 => {
                    self.last_const_force = -((data & 0xF) as i8);
                    self.io.pending_cmd = Some(FeedbackCmd::Constant(self.last_const_force));
                }
                0x6 => {
                    self.io.pending_cmd = Some(FeedbackCmd::StopAll);
                }
                _ => self.echo_val = data,
            },
        }
    }

    /// Run one frame and emit any decoded force-feedback effect.
    pub fn run_frame(&mut self, ffb: &mut dyn ForceFeedback) {
        if !self.is_attached() {
            return;
        }
        if !self.simulated {
            self.z80.run(&mut self.io, cycles_per_frame(Self::CLOCK_HZ));
            self.z80.set_int(false);
        }
        if let Some(cmd) = self.io.pending_cmd.take() {
            match cmd {
                FeedbackCmd::StopAll => ffb.stop_all(),
                FeedbackCmd::Constant(v) => {
                    self.last_const_force = v;
                    ffb.constant_force(v);
                }
                FeedbackCmd::SelfCenter(v) => {
                    self.last_self_center = v;
                    ffb.self_center(v);
                }
                FeedbackCmd::Friction(v) => {
                    self.last_friction = v;
                    ffb.friction(v);
                }
                FeedbackCmd::Vibrate(v) => {
                    self.last_vibrate = v;
                    ffb.vibrate(v);
                }
            }
        }
    }

    pub fn save_state(&self, file: &mut BlockFile) {
        let mut w = file.new_block(b"DRVB");
        w.put_bool(self.simulated);
        w.put_bool(self.tmp_disabled);
        w.put_u8(self.io.dip1);
        w.put_u8(self.io.dip2);
        w.put_u8(self.steering_strength);
        w.put_bool(self.allow_interrupts);
        w.put_u8(self.init_state);
        w.put_u8(self.status);
        w.put_u8(self.echo_val);
        w.put_u8(self.io.data_sent);
        w.put_u8(self.io.data_received);
        for d in self.io.seg_digits {
            w.put_u8(d);
        }
        w.put_u8(self.io.port42);
        w.put_u8(self.io.port46);
        w.put_u8(self.io.prev42);
        w.put_u8(self.io.prev46);
        w.put_u8(self.io.adc_port);
        w.put_u8(self.io.adc_bit);
        for v in self.io.adc_channels {
            w.put_u8(v);
        }
        w.put_u8(self.io.uncenter_val1);
        w.put_u8(self.io.uncenter_val2);
        w.put_u8(self.last_const_force as u8);
        w.put_u8(self.last_self_center);
        w.put_u8(self.last_friction);
        w.put_u8(self.last_vibrate);
        w.put_bytes(&self.io.ram);
        self.z80.save(&mut w);
    }

    pub fn load_state(&mut self, file: &BlockFile) {
        let Some(mut r) = file.find(b"DRVB") else {
            log::warn!("save state has no drive-board block; resetting the board");
            self.reset();
            return;
        };
        let saved_simulated = r.get_bool();
        if saved_simulated != self.simulated {
            // A state saved with the opposite emulation mode cannot be
            // restored meaningfully; disable until the next reset.
            log::warn!("drive-board state was saved in a different mode; board disabled");
            self.tmp_disabled = true;
            return;
        }
        self.tmp_disabled = r.get_bool();
        self.io.dip1 = r.get_u8();
        self.io.dip2 = r.get_u8();
        self.steering_strength = r.get_u8();
        self.allow_interrupts = r.get_bool();
        self.init_state = r.get_u8();
        self.status = r.get_u8();
        self.echo_val = r.get_u8();
        self.io.data_sent = r.get_u8();
        self.io.data_received = r.get_u8();
        for d in &mut self.io.seg_digits {
            *d = r.get_u8();
        }
        self.io.port42 = r.get_u8();
        self.io.port46 = r.get_u8();
        self.io.prev42 = r.get_u8();
        self.io.prev46 = r.get_u8();
        self.io.adc_port = r.get_u8();
        self.io.adc_bit = r.get_u8();
        for v in &mut self.io.adc_channels {
            *v = r.get_u8();
        }
        self.io.uncenter_val1 = r.get_u8();
        self.io.uncenter_val2 = r.get_u8();
        self.last_const_force = r.get_u8() as i8;
        self.last_self_center = r.get_u8();
        self.last_friction = r.get_u8();
        self.last_vibrate = r.get_u8();
        r.get_bytes(&mut self.io.ram);
        self.z80.load(&mut r);
    }

    pub fn z80_mut(&mut self) -> &mut Z80 {
        &mut self.z80
    }

    pub fn io_mut(&mut self) -> &mut DriveIo {
        &mut self.io
    }
}
