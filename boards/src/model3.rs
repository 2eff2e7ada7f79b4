//! The Model 3 board: PowerPC main CPU, bus fabric, Real3D subsystem,
//! tile generator, sound board, and the optional DSB and drive boards.
//!
//! Per-frame control flow: the PowerPC runs its cycle quota while bus
//! dispatch feeds the device models (FIFO bytes to the DSB, Real3D DMA,
//! drive-board latches). At end of frame the display-list walker runs once
//! over the programmed scene, the MPEG engine produces one frame of PCM,
//! the sound CPUs run, and the drive board steps. Output buffers are then
//! handed to the presentation layer; nothing touches them again until the
//! next `run_frame`.

use std::collections::HashMap;
use std::sync::Arc;

use m3_core::core::bus::{self, Access, Bus, MemoryMap, Region};
use m3_core::core::machine::{InputButton, Machine};
use m3_core::core::sched::{StopFlag, cycles_per_frame};
use m3_core::cpu::{Cpu, Ppc};
use m3_core::device::real3d::{
    DecodedModel, DrawState, GeometrySink, HardwareStep, Light, Real3d, SceneMemory,
    TextureCache, Viewport, decode_model,
};
use m3_core::device::tilegen::TileGen;
use m3_core::save::BlockFile;

use crate::driveboard::{DriveBoard, ForceFeedback, NullForceFeedback};
use crate::dsb::{DigitalSoundBoard, Dsb1, Dsb2, HOST_SAMPLES_PER_FRAME};
use crate::soundboard::SoundBoard;

pub const PPC_CLOCK_HZ: u64 = 66_000_000;
const PPC_SLICE: u64 = 2_000;

const DISPLAY_WIDTH: u32 = 496;
const DISPLAY_HEIGHT: u32 = 384;

const RAM_SIZE: usize = 0x80_0000;
const CROM_SIZE: usize = 0x80_0000;
const BANK_SIZE: usize = 0x80_0000;
const POLY_RAM_WORDS: usize = 0x10_0000;
const CULLING_WORDS: usize = 0x10_0000;
const TEXTURE_TEXELS: usize = 2048 * 2048;

// IRQ controller bits.
pub const IRQ_VBLANK: u8 = 0x02;
pub const IRQ_SCSI: u8 = 0x04;
pub const IRQ_SOUND: u8 = 0x40;

/// Backing buffers addressed through the memory map.
#[derive(Clone, Copy, Debug, PartialEq)]
enum MemId {
    Ram,
    CromFixed,
    CromBanked,
}

/// Devices addressed through the memory map.
#[derive(Clone, Copy, Debug, PartialEq)]
enum DevId {
    Real3dRegs,
    PolygonRam,
    CullingA,
    CullingB,
    TextureRam,
    Inputs,
    SysRegs,
    TileRegs,
    TileVram,
}

/// Which digital sound board (and its ROMs) a game carries.
pub enum DsbKind {
    None,
    Dsb1 { prog: Vec<u8>, mpeg: Vec<u8> },
    Dsb2 { prog: Vec<u8>, mpeg: Vec<u8> },
}

/// Assembled ROM images for one game.
pub struct RomBundle {
    pub crom_fixed: Vec<u8>,
    pub crom_banked: Vec<u8>,
    pub vrom: Vec<u8>,
    pub sound_prog: Vec<u8>,
    pub sound_samples: Vec<u8>,
    pub dsb: DsbKind,
    pub drive_rom: Option<Vec<u8>>,
}

impl Default for RomBundle {
    fn default() -> Self {
        RomBundle {
            crom_fixed: Vec::new(),
            crom_banked: Vec::new(),
            vrom: Vec::new(),
            sound_prog: Vec::new(),
            sound_samples: Vec::new(),
            dsb: DsbKind::None,
            drive_rom: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Model3Config {
    /// Hardware revision id (0x10, 0x15, 0x20, 0x21).
    pub step_id: u8,
    pub emulate_dsb: bool,
    pub force_feedback: bool,
    pub simulate_drive_board: bool,
    pub steering_strength: u8,
    pub music_volume: u32,
}

impl Default for Model3Config {
    fn default() -> Self {
        Model3Config {
            step_id: 0x20,
            emulate_dsb: true,
            force_feedback: false,
            simulate_drive_board: false,
            steering_strength: 5,
            music_volume: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Renderer-side geometry buffer
// ---------------------------------------------------------------------------

/// One emitted model instance.
pub struct ModelDraw {
    pub addr: u32,
    pub model: Arc<DecodedModel>,
    pub state: DrawState,
}

/// Collects the frame's draw list, caching decoded models by guest
/// address. VROM models are immutable; polygon-RAM models are dropped
/// whenever their address range is written.
pub struct GeometryBuffer {
    step: HardwareStep,
    cache: HashMap<u32, Arc<DecodedModel>>,
    pub draws: Vec<ModelDraw>,
    pub viewport: Viewport,
}

impl GeometryBuffer {
    fn new(step: HardwareStep) -> Self {
        GeometryBuffer {
            step,
            cache: HashMap::new(),
            draws: Vec::new(),
            viewport: Viewport::default(),
        }
    }

    /// Drop cached polygon-RAM models overlapping the written word range.
    fn invalidate_words(&mut self, lo: u32, hi: u32) {
        self.cache.retain(|&addr, model| {
            if addr & 0x8000_0000 != 0 {
                return true; // VROM
            }
            let start = addr & 0x00FF_FFFF;
            let end = start + model.words_consumed as u32;
            end <= lo || start >= hi
        });
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    pub fn cached_models(&self) -> usize {
        self.cache.len()
    }
}

impl GeometrySink for GeometryBuffer {
    fn begin_frame(&mut self, viewport: &Viewport) {
        self.draws.clear();
        self.viewport = *viewport;
    }

    fn draw_model(&mut self, addr: u32, words: &[u32], big_endian: bool, state: &DrawState) {
        let step = self.step;
        let model = Arc::clone(
            self.cache
                .entry(addr)
                .or_insert_with(|| Arc::new(decode_model(words, step, big_endian))),
        );
        self.draws.push(ModelDraw {
            addr,
            model,
            state: *state,
        });
    }
}

// ---------------------------------------------------------------------------
// Bus-visible board state
// ---------------------------------------------------------------------------

struct Model3Io {
    map: MemoryMap<MemId, DevId>,
    ram: Vec<u8>,
    crom_fixed: Vec<u8>,
    crom_banked: Vec<u8>,
    bank_base: usize,
    polygon_ram: Vec<u32>,
    culling_a: Vec<u32>,
    culling_b: Vec<u32>,
    texture_ram: Vec<u16>,
    texture_cache: TextureCache,
    vrom: Vec<u32>,
    real3d: Real3d,
    real3d_regs: [u32; 32],
    tilegen: TileGen,
    irq_enable: u8,
    irq_pending: u8,
    /// Level-sensitive line into the PowerPC, synced at slice boundaries.
    irq_line: bool,
    inputs: [u8; 16],
    sound: SoundBoard,
    dsb: Option<Box<dyn DigitalSoundBoard>>,
    drive: Option<DriveBoard>,
    /// Written polygon-RAM word range this frame (model-cache flush).
    poly_dirty: Option<(u32, u32)>,
}

impl Model3Io {
    fn memory_map() -> MemoryMap<MemId, DevId> {
        MemoryMap::new(vec![
            Region::mem(0x0000_0000, RAM_SIZE as u32, MemId::Ram, true, true),
            Region::device(0x8400_0000, 0x1_0000, DevId::Real3dRegs),
            Region::device(0x8800_0000, 0x40_0000, DevId::PolygonRam),
            Region::device(0x8C00_0000, 0x40_0000, DevId::CullingA),
            Region::device(0x8E00_0000, 0x40_0000, DevId::CullingB),
            Region::device(0x9800_0000, 0x100_0000, DevId::TextureRam),
            Region::device(0xF004_0000, 0x40, DevId::Inputs),
            Region::device(0xF010_0000, 0x100, DevId::SysRegs),
            Region::device(0xF100_0000, 0x12_0000, DevId::TileVram),
            Region::device(0xF118_0000, 0x100, DevId::TileRegs),
            Region::mem(0xFF00_0000, BANK_SIZE as u32, MemId::CromBanked, true, false),
            Region::mem(0xFF80_0000, CROM_SIZE as u32, MemId::CromFixed, true, false),
        ])
    }

    fn buffer(&self, id: MemId) -> &[u8] {
        match id {
            MemId::Ram => &self.ram,
            MemId::CromFixed => &self.crom_fixed,
            MemId::CromBanked => {
                let base = self.bank_base.min(self.crom_banked.len());
                &self.crom_banked[base..]
            }
        }
    }

    fn buffer_mut(&mut self, id: MemId) -> &mut [u8] {
        match id {
            MemId::Ram => &mut self.ram,
            MemId::CromFixed => &mut self.crom_fixed,
            MemId::CromBanked => &mut self.crom_banked,
        }
    }

    fn update_irq_line(&mut self) {
        self.irq_line = self.irq_pending & self.irq_enable != 0;
    }

    fn raise_irq(&mut self, bits: u8) {
        self.irq_pending |= bits;
        self.update_irq_line();
    }

    // ----- device dispatch --------------------------------------------------

    fn dev_read32(&mut self, id: DevId, addr: u32) -> u32 {
        match id {
            DevId::Real3dRegs => match addr & 0xFFFF {
                // Status: DMA and geometry engine always ready.
                0x00 => 0,
                offset => self.real3d_regs[((offset as usize) / 4) & 31],
            },
            DevId::PolygonRam => {
                let idx = ((addr - 0x8800_0000) / 4) as usize;
                self.polygon_ram.get(idx).copied().unwrap_or(0)
            }
            DevId::CullingA => {
                let idx = ((addr - 0x8C00_0000) / 4) as usize;
                self.culling_a.get(idx).copied().unwrap_or(0)
            }
            DevId::CullingB => {
                let idx = ((addr - 0x8E00_0000) / 4) as usize;
                self.culling_b.get(idx).copied().unwrap_or(0)
            }
            DevId::TextureRam => {
                let idx = (((addr - 0x9800_0000) / 2) as usize) % TEXTURE_TEXELS;
                let hi = self.texture_ram[idx] as u32;
                let lo = self.texture_ram[(idx + 1) % TEXTURE_TEXELS] as u32;
                (hi << 16) | lo
            }
            DevId::Inputs => {
                let port = ((addr & 0x3F) / 4) as usize;
                self.inputs[port & 15] as u32
            }
            DevId::SysRegs => match addr & 0xFF {
                0x10 => self.irq_enable as u32,
                0x18 => self.irq_pending as u32,
                0x1C => (self.bank_base / BANK_SIZE) as u32,
                0x20 => match &mut self.drive {
                    Some(drive) => drive.read() as u32,
                    None => 0xFF,
                },
                _ => 0,
            },
            DevId::TileRegs => self.tilegen.read_reg(addr & 0xFF),
            DevId::TileVram => self.tilegen.read_vram32(addr & 0x1F_FFFF),
        }
    }

    fn dev_write32(&mut self, id: DevId, addr: u32, data: u32) {
        match id {
            DevId::Real3dRegs => self.real3d_reg_write(addr & 0xFFFF, data),
            DevId::PolygonRam => {
                let word = (addr - 0x8800_0000) / 4;
                if let Some(slot) = self.polygon_ram.get_mut(word as usize) {
                    *slot = data;
                    self.note_poly_write(word);
                }
            }
            DevId::CullingA => {
                let idx = ((addr - 0x8C00_0000) / 4) as usize;
                if let Some(slot) = self.culling_a.get_mut(idx) {
                    *slot = data;
                }
            }
            DevId::CullingB => {
                let idx = ((addr - 0x8E00_0000) / 4) as usize;
                if let Some(slot) = self.culling_b.get_mut(idx) {
                    *slot = data;
                }
            }
            DevId::TextureRam => {
                let idx = (((addr - 0x9800_0000) / 2) as usize) % TEXTURE_TEXELS;
                self.write_texels(idx, data);
            }
            DevId::Inputs => {
                // Output latches (lamps, coin counters) are not modeled.
            }
            DevId::SysRegs => match addr & 0xFF {
                0x08 => {
                    self.sound.write_command(data as u8);
                    self.raise_irq(IRQ_SOUND);
                }
                0x0C => {
                    if let Some(dsb) = &mut self.dsb {
                        dsb.send_command(data as u8);
                    }
                }
                0x10 => {
                    self.irq_enable = data as u8;
                    self.update_irq_line();
                }
                0x18 => {
                    // Acknowledge: writing a bit clears it.
                    self.irq_pending &= !(data as u8);
                    self.update_irq_line();
                }
                0x1C => {
                    let bank = (data as usize & 0xF) * BANK_SIZE;
                    self.bank_base = bank.min(self.crom_banked.len().saturating_sub(1));
                }
                0x20 => {
                    if let Some(drive) = &mut self.drive {
                        drive.write(data as u8);
                    }
                }
                _ => {}
            },
            DevId::TileRegs => self.tilegen.write_reg(addr & 0xFF, data),
            DevId::TileVram => self.tilegen.write_vram32(addr & 0x1F_FFFF, data),
        }
    }

    /// Two big-endian texels per 32-bit write, with cache invalidation of
    /// the covered sheet rectangle.
    fn write_texels(&mut self, idx: usize, data: u32) {
        self.texture_ram[idx] = (data >> 16) as u16;
        self.texture_ram[(idx + 1) % TEXTURE_TEXELS] = data as u16;
        let x = (idx % 2048) as u32;
        let y = (idx / 2048) as u32;
        self.texture_cache.invalidate_textures(x, y, 2, 1);
    }

    fn note_poly_write(&mut self, word: u32) {
        self.poly_dirty = Some(match self.poly_dirty {
            None => (word, word + 1),
            Some((lo, hi)) => (lo.min(word), hi.max(word + 1)),
        });
    }

    fn real3d_reg_write(&mut self, offset: u32, data: u32) {
        self.real3d_regs[((offset as usize) / 4) & 31] = data;
        match offset {
            0x08 => self.real3d.display_list_base = data,
            0x0C => self.real3d.matrix_base = data,
            0x10 => {
                self.real3d.set_viewport(Viewport {
                    x: data & 0xFFFF,
                    y: data >> 16,
                    width: self.real3d_regs[5] & 0xFFFF,
                    height: self.real3d_regs[5] >> 16,
                });
            }
            0x14 => {
                let pos = self.real3d_regs[4];
                self.real3d.set_viewport(Viewport {
                    x: pos & 0xFFFF,
                    y: pos >> 16,
                    width: data & 0xFFFF,
                    height: data >> 16,
                });
            }
            0x20..=0x30 => {
                let light = Light {
                    direction: glam::Vec3::new(
                        f32::from_bits(self.real3d_regs[8]),
                        f32::from_bits(self.real3d_regs[9]),
                        f32::from_bits(self.real3d_regs[10]),
                    ),
                    diffuse: f32::from_bits(self.real3d_regs[11]),
                    ambient: f32::from_bits(self.real3d_regs[12]),
                };
                self.real3d.set_light(0, light);
            }
            0x4C => self.do_real3d_dma(),
            _ => {}
        }
    }

    /// Register-programmed DMA from main RAM into a Real3D memory space.
    /// Word-atomic relative to the CPU: it runs between instructions.
    fn do_real3d_dma(&mut self) {
        let src = self.real3d_regs[16];
        let dst = self.real3d_regs[17];
        let words = self.real3d_regs[18];
        for i in 0..words {
            let s = (src + i * 4) as usize;
            if s + 4 > self.ram.len() {
                break;
            }
            let value = bus::mem_read32(&self.ram, s, true);
            let daddr = dst.wrapping_add(i * 4);
            match daddr >> 24 {
                0x88 => {
                    let word = (daddr - 0x8800_0000) / 4;
                    if let Some(slot) = self.polygon_ram.get_mut(word as usize) {
                        *slot = value;
                        self.note_poly_write(word);
                    }
                }
                0x8C => {
                    let idx = ((daddr - 0x8C00_0000) / 4) as usize;
                    if let Some(slot) = self.culling_a.get_mut(idx) {
                        *slot = value;
                    }
                }
                0x8E => {
                    let idx = ((daddr - 0x8E00_0000) / 4) as usize;
                    if let Some(slot) = self.culling_b.get_mut(idx) {
                        *slot = value;
                    }
                }
                0x98 => {
                    let idx = (((daddr - 0x9800_0000) / 2) as usize) % TEXTURE_TEXELS;
                    self.write_texels(idx, value);
                }
                _ => {
                    log::debug!("real3d dma to unhandled space {daddr:08X}");
                    break;
                }
            }
        }
    }
}

impl Bus for Model3Io {
    fn read8(&mut self, addr: u32) -> u8 {
        match self.map.resolve(addr) {
            Access::Mem { id, offset, .. } => {
                let buf = self.buffer(id);
                buf.get(offset).copied().unwrap_or(0)
            }
            Access::Device { id, addr } => {
                let word = self.dev_read32(id, addr & !3);
                (word >> (8 * (3 - (addr & 3)))) as u8
            }
            Access::Unmapped => self.map.note_unmapped_read(addr) as u8,
        }
    }

    fn read16(&mut self, addr: u32) -> u16 {
        match self.map.resolve(addr) {
            Access::Mem {
                id,
                offset,
                big_endian,
                strict_align,
                ..
            } => {
                if strict_align && addr & 1 != 0 {
                    let hi = self.read8(addr) as u16;
                    let lo = self.read8(addr.wrapping_add(1)) as u16;
                    return (hi << 8) | lo;
                }
                let buf = self.buffer(id);
                if offset + 2 > buf.len() {
                    return 0;
                }
                bus::mem_read16(buf, offset, big_endian)
            }
            Access::Device { id, addr } => {
                let word = self.dev_read32(id, addr & !3);
                if addr & 2 == 0 { (word >> 16) as u16 } else { word as u16 }
            }
            Access::Unmapped => self.map.note_unmapped_read(addr) as u16,
        }
    }

    fn read32(&mut self, addr: u32) -> u32 {
        match self.map.resolve(addr) {
            Access::Mem {
                id,
                offset,
                big_endian,
                strict_align,
                ..
            } => {
                if strict_align && addr & 3 != 0 {
                    return ((self.read16(addr) as u32) << 16)
                        | self.read16(addr.wrapping_add(2)) as u32;
                }
                let buf = self.buffer(id);
                if offset + 4 > buf.len() {
                    return 0;
                }
                bus::mem_read32(buf, offset, big_endian)
            }
            Access::Device { id, addr } => self.dev_read32(id, addr),
            Access::Unmapped => self.map.note_unmapped_read(addr),
        }
    }

    fn write8(&mut self, addr: u32, data: u8) {
        match self.map.resolve(addr) {
            Access::Mem {
                id,
                offset,
                writable,
                ..
            } => {
                if !writable {
                    self.map.note_rom_write(addr);
                    return;
                }
                let buf = self.buffer_mut(id);
                if offset < buf.len() {
                    buf[offset] = data;
                }
            }
            Access::Device { id, addr } => {
                let word = self.dev_read32(id, addr & !3);
                let shift = 8 * (3 - (addr & 3));
                let word = (word & !(0xFF << shift)) | ((data as u32) << shift);
                self.dev_write32(id, addr & !3, word);
            }
            Access::Unmapped => self.map.note_unmapped_write(addr, data as u32),
        }
    }

    fn write16(&mut self, addr: u32, data: u16) {
        match self.map.resolve(addr) {
            Access::Mem {
                id,
                offset,
                big_endian,
                writable,
                strict_align,
            } => {
                if !writable {
                    self.map.note_rom_write(addr);
                    return;
                }
                if strict_align && addr & 1 != 0 {
                    self.write8(addr, (data >> 8) as u8);
                    self.write8(addr.wrapping_add(1), data as u8);
                    return;
                }
                let buf = self.buffer_mut(id);
                if offset + 2 <= buf.len() {
                    bus::mem_write16(buf, offset, data, big_endian);
                }
            }
            Access::Device { id, addr } => {
                let word = self.dev_read32(id, addr & !3);
                let word = if addr & 2 == 0 {
                    (word & 0x0000_FFFF) | ((data as u32) << 16)
                } else {
                    (word & 0xFFFF_0000) | data as u32
                };
                self.dev_write32(id, addr & !3, word);
            }
            Access::Unmapped => self.map.note_unmapped_write(addr, data as u32),
        }
    }

    fn write32(&mut self, addr: u32, data: u32) {
        match self.map.resolve(addr) {
            Access::Mem {
                id,
                offset,
                big_endian,
                writable,
                strict_align,
            } => {
                if !writable {
                    self.map.note_rom_write(addr);
                    return;
                }
                if strict_align && addr & 3 != 0 {
                    self.write16(addr, (data >> 16) as u16);
                    self.write16(addr.wrapping_add(2), data as u16);
                    return;
                }
                let buf = self.buffer_mut(id);
                if offset + 4 <= buf.len() {
                    bus::mem_write32(buf, offset, data, big_endian);
                }
            }
            Access::Device { id, addr } => self.dev_write32(id, addr, data),
            Access::Unmapped => self.map.note_unmapped_write(addr, data),
        }
    }
}

// ---------------------------------------------------------------------------
// The machine
// ---------------------------------------------------------------------------

// Input button ids encode (port << 3) | bit.
pub const INPUT_SERVICE: u8 = 0x08 | 0;
pub const INPUT_TEST: u8 = 0x08 | 1;
pub const INPUT_START1: u8 = 0x10 | 0;
pub const INPUT_START2: u8 = 0x10 | 1;
pub const INPUT_COIN1: u8 = 0x10 | 2;
pub const INPUT_COIN2: u8 = 0x10 | 3;
pub const INPUT_UP: u8 = 0x18 | 0;
pub const INPUT_DOWN: u8 = 0x18 | 1;
pub const INPUT_LEFT: u8 = 0x18 | 2;
pub const INPUT_RIGHT: u8 = 0x18 | 3;
pub const INPUT_BUTTON1: u8 = 0x18 | 4;
pub const INPUT_BUTTON2: u8 = 0x18 | 5;
pub const INPUT_BUTTON3: u8 = 0x18 | 6;
pub const INPUT_BUTTON4: u8 = 0x18 | 7;

const MODEL3_INPUT_MAP: &[InputButton] = &[
    InputButton { id: INPUT_SERVICE, name: "Service" },
    InputButton { id: INPUT_TEST, name: "Test" },
    InputButton { id: INPUT_START1, name: "P1 Start" },
    InputButton { id: INPUT_START2, name: "P2 Start" },
    InputButton { id: INPUT_COIN1, name: "Coin 1" },
    InputButton { id: INPUT_COIN2, name: "Coin 2" },
    InputButton { id: INPUT_UP, name: "Up" },
    InputButton { id: INPUT_DOWN, name: "Down" },
    InputButton { id: INPUT_LEFT, name: "Left" },
    InputButton { id: INPUT_RIGHT, name: "Right" },
    InputButton { id: INPUT_BUTTON1, name: "Button 1" },
    InputButton { id: INPUT_BUTTON2, name: "Button 2" },
    InputButton { id: INPUT_BUTTON3, name: "Button 3" },
    InputButton { id: INPUT_BUTTON4, name: "Button 4" },
];

pub struct Model3 {
    ppc: Ppc,
    io: Model3Io,
    geometry: GeometryBuffer,
    ffb: Box<dyn ForceFeedback>,
    audio_l: Vec<f32>,
    audio_r: Vec<f32>,
    stop: StopFlag,
    config: Model3Config,
}

impl Model3 {
    pub fn new(config: Model3Config, roms: RomBundle) -> Self {
        let step = HardwareStep::from_id(config.step_id);
        let stop = StopFlag::new();

        let mut crom_fixed = roms.crom_fixed;
        crom_fixed.resize(CROM_SIZE, 0);
        let mut crom_banked = roms.crom_banked;
        if crom_banked.is_empty() {
            crom_banked.resize(BANK_SIZE, 0);
        }

        // VROM words assembled from the big-endian image; the walker
        // byte-swaps on read.
        let vrom: Vec<u32> = roms
            .vrom
            .chunks(4)
            .map(|c| {
                let mut b = [0u8; 4];
                b[..c.len()].copy_from_slice(c);
                u32::from_le_bytes(b)
            })
            .collect();

        let mut sound = SoundBoard::new(
            Arc::new(roms.sound_prog),
            Arc::new(roms.sound_samples),
        );
        sound.attach_stop_flag(stop.clone());

        let dsb: Option<Box<dyn DigitalSoundBoard>> = match roms.dsb {
            DsbKind::None => None,
            DsbKind::Dsb1 { prog, mpeg } => {
                let mut board = Dsb1::new(Arc::new(prog), Arc::new(mpeg), config.emulate_dsb);
                board.set_music_volume(config.music_volume);
                board.attach_stop_flag(stop.clone());
                Some(Box::new(board))
            }
            DsbKind::Dsb2 { prog, mpeg } => {
                let mut board = Dsb2::new(Arc::new(prog), Arc::new(mpeg), config.emulate_dsb);
                board.set_music_volume(config.music_volume);
                board.attach_stop_flag(stop.clone());
                Some(Box::new(board))
            }
        };

        let drive = if config.force_feedback {
            let mut board = match (config.simulate_drive_board, roms.drive_rom) {
                (false, Some(rom)) => DriveBoard::new_emulated(rom),
                _ => DriveBoard::new_simulated(),
            };
            board.set_steering_strength(config.steering_strength);
            Some(board)
        } else {
            None
        };

        let mut ppc = Ppc::new();
        ppc.attach_stop_flag(stop.clone());

        Model3 {
            ppc,
            io: Model3Io {
                map: Model3Io::memory_map(),
                ram: vec![0; RAM_SIZE],
                crom_fixed,
                crom_banked,
                bank_base: 0,
                polygon_ram: vec![0; POLY_RAM_WORDS],
                culling_a: vec![0; CULLING_WORDS],
                culling_b: vec![0; CULLING_WORDS],
                texture_ram: vec![0; TEXTURE_TEXELS],
                texture_cache: TextureCache::new(),
                vrom,
                real3d: Real3d::new(step),
                real3d_regs: [0; 32],
                tilegen: TileGen::new(),
                irq_enable: 0,
                irq_pending: 0,
                irq_line: false,
                inputs: [0xFF; 16],
                sound,
                dsb,
                drive,
                poly_dirty: None,
            },
            geometry: GeometryBuffer::new(step),
            ffb: Box::new(NullForceFeedback),
            audio_l: vec![0.0; HOST_SAMPLES_PER_FRAME],
            audio_r: vec![0.0; HOST_SAMPLES_PER_FRAME],
            stop,
            config,
        }
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn config(&self) -> &Model3Config {
        &self.config
    }

    pub fn set_force_feedback(&mut self, ffb: Box<dyn ForceFeedback>) {
        self.ffb = ffb;
    }

    /// Register custom music tracks with the DSB's MPEG engine.
    pub fn set_custom_tracks(
        &mut self,
        tracks: std::collections::HashMap<u32, m3_core::device::mpeg::CustomTrack>,
    ) {
        if let Some(dsb) = &mut self.io.dsb {
            dsb.set_custom_tracks(tracks);
        }
    }

    /// The frame's draw list, for the 3D back-end.
    pub fn geometry(&self) -> &GeometryBuffer {
        &self.geometry
    }

    pub fn ppc(&self) -> &Ppc {
        &self.ppc
    }

    pub fn ppc_mut(&mut self) -> &mut Ppc {
        &mut self.ppc
    }

    pub fn drive_board(&self) -> Option<&DriveBoard> {
        self.io.drive.as_ref()
    }

    pub fn unmapped_reads(&self) -> u64 {
        self.io.map.unmapped_reads()
    }

    /// Flush render-side caches that mirror guest memory.
    fn flush_caches(&mut self) {
        if let Some((lo, hi)) = self.io.poly_dirty.take() {
            self.geometry.invalidate_words(lo, hi);
        }
    }
}

impl Machine for Model3 {
    fn display_size(&self) -> (u32, u32) {
        (DISPLAY_WIDTH, DISPLAY_HEIGHT)
    }

    fn run_frame(&mut self) {
        self.io.map.begin_frame();

        // Frame-start vertical blank.
        self.io.raise_irq(IRQ_VBLANK);

        // Main CPU quota, in slices so the external-interrupt line tracks
        // the IRQ controller closely.
        let mut remaining = cycles_per_frame(PPC_CLOCK_HZ);
        while remaining > 0 && !self.stop.is_raised() {
            self.ppc.set_external_irq(self.io.irq_line);
            let slice = remaining.min(PPC_SLICE);
            let consumed = self.ppc.run(&mut self.io, slice);
            remaining = remaining.saturating_sub(consumed.max(1));
        }

        // End of frame: walk the scene into the render batch.
        self.flush_caches();
        let io = &mut self.io;
        io.real3d.render_frame(
            &SceneMemory {
                culling_a: &io.culling_a,
                culling_b: &io.culling_b,
                polygon_ram: &io.polygon_ram,
                vrom: &io.vrom,
            },
            &mut self.geometry,
        );
        io.tilegen.update_layers();

        // Audio: sound CPUs run after the main CPU; the DSB mixes its
        // resampled MPEG frame into the accumulators.
        self.audio_l.fill(0.0);
        self.audio_r.fill(0.0);
        io.sound.run_frame();
        if let Some(dsb) = &mut io.dsb {
            dsb.run_frame(&mut self.audio_l, &mut self.audio_r);
        }
        if let Some(drive) = &mut io.drive {
            drive.run_frame(self.ffb.as_mut());
        }
    }

    fn render_frame(&self, buffer: &mut [u8]) {
        // Compose the tile layers front-to-back; the 3D batch goes to the
        // GPU back-end separately.
        let width = DISPLAY_WIDTH as usize;
        for y in 0..DISPLAY_HEIGHT as usize {
            for x in 0..width {
                let mut rgb = [0u8; 3];
                for layer in 0..4 {
                    let px = self.io.tilegen.layer(layer)
                        [y * m3_core::device::tilegen::LAYER_WIDTH + x];
                    let bytes = px.to_le_bytes();
                    if bytes[3] != 0 {
                        rgb = [bytes[0], bytes[1], bytes[2]];
                        break;
                    }
                }
                let off = (y * width + x) * 3;
                buffer[off..off + 3].copy_from_slice(&rgb);
            }
        }
    }

    fn audio_frame(&self) -> (&[f32], &[f32]) {
        (&self.audio_l, &self.audio_r)
    }

    fn set_input(&mut self, button: u8, pressed: bool) {
        let port = ((button >> 3) & 15) as usize;
        let bit = button & 7;
        // Active low: pressed clears the bit.
        if pressed {
            self.io.inputs[port] &= !(1 << bit);
        } else {
            self.io.inputs[port] |= 1 << bit;
        }
    }

    fn input_map(&self) -> &[InputButton] {
        MODEL3_INPUT_MAP
    }

    fn reset(&mut self) {
        self.ppc.reset(&mut self.io);
        self.io.bank_base = 0;
        self.io.irq_enable = 0;
        self.io.irq_pending = 0;
        self.io.irq_line = false;
        self.io.ram.fill(0);
        self.io.polygon_ram.fill(0);
        self.io.culling_a.fill(0);
        self.io.culling_b.fill(0);
        self.io.texture_ram.fill(0);
        self.io.texture_cache.clear();
        self.io.real3d.reset();
        self.io.tilegen.reset();
        self.io.inputs = [0xFF; 16];
        self.io.sound.reset();
        if let Some(dsb) = &mut self.io.dsb {
            dsb.reset();
        }
        if let Some(drive) = &mut self.io.drive {
            drive.reset();
        }
        self.geometry.clear_cache();
    }

    fn save_state(&self, file: &mut BlockFile) {
        {
            let mut w = file.new_block(b"PPC ");
            self.ppc.save(&mut w);
        }
        {
            let mut w = file.new_block(b"RAM ");
            w.put_bytes(&self.io.ram);
            w.put_u32((self.io.bank_base / BANK_SIZE) as u32);
            w.put_u8(self.io.irq_enable);
            w.put_u8(self.io.irq_pending);
            for port in self.io.inputs {
                w.put_u8(port);
            }
        }
        {
            let mut w = file.new_block(b"R3D ");
            self.io.real3d.save(&mut w);
            for reg in self.io.real3d_regs {
                w.put_u32(reg);
            }
            for word in &self.io.polygon_ram {
                w.put_u32(*word);
            }
            for word in &self.io.culling_a {
                w.put_u32(*word);
            }
            for word in &self.io.culling_b {
                w.put_u32(*word);
            }
            for texel in &self.io.texture_ram {
                w.put_u16(*texel);
            }
        }
        {
            let mut w = file.new_block(b"TILE");
            self.io.tilegen.save(&mut w);
        }
        self.io.sound.save_state(file);
        if let Some(dsb) = &self.io.dsb {
            dsb.save_state(file);
        }
        if let Some(drive) = &self.io.drive {
            drive.save_state(file);
        }
    }

    fn load_state(&mut self, file: &BlockFile) {
        match file.find(b"PPC ") {
            Some(mut r) => self.ppc.load(&mut r),
            None => {
                log::warn!("save state has no PPC block; resetting the main CPU");
                self.ppc = Ppc::new();
                self.ppc.attach_stop_flag(self.stop.clone());
            }
        }
        match file.find(b"RAM ") {
            Some(mut r) => {
                r.get_bytes(&mut self.io.ram);
                self.io.bank_base =
                    ((r.get_u32() as usize) * BANK_SIZE).min(self.io.crom_banked.len());
                self.io.irq_enable = r.get_u8();
                self.io.irq_pending = r.get_u8();
                for port in &mut self.io.inputs {
                    *port = r.get_u8();
                }
                self.io.update_irq_line();
            }
            None => {
                log::warn!("save state has no RAM block; clearing main memory");
                self.io.ram.fill(0);
            }
        }
        match file.find(b"R3D ") {
            Some(mut r) => {
                self.io.real3d.load(&mut r);
                for reg in &mut self.io.real3d_regs {
                    *reg = r.get_u32();
                }
                for word in &mut self.io.polygon_ram {
                    *word = r.get_u32();
                }
                for word in &mut self.io.culling_a {
                    *word = r.get_u32();
                }
                for word in &mut self.io.culling_b {
                    *word = r.get_u32();
                }
                for texel in &mut self.io.texture_ram {
                    *texel = r.get_u16();
                }
            }
            None => {
                log::warn!("save state has no R3D block; resetting the Real3D subsystem");
                self.io.real3d.reset();
                self.io.polygon_ram.fill(0);
                self.io.culling_a.fill(0);
                self.io.culling_b.fill(0);
                self.io.texture_ram.fill(0);
            }
        }
        match file.find(b"TILE") {
            Some(mut r) => self.io.tilegen.load(&mut r),
            None => {
                log::warn!("save state has no TILE block; resetting the tile generator");
                self.io.tilegen.reset();
            }
        }
        self.io.sound.load_state(file);
        if let Some(dsb) = &mut self.io.dsb {
            dsb.load_state(file);
        }
        if let Some(drive) = &mut self.io.drive {
            drive.load_state(file);
        }
        // Derived caches mirror guest memory and must rebuild.
        self.io.texture_cache.clear();
        self.geometry.clear_cache();
    }
}
