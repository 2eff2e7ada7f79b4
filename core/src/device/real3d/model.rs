//! Model decoding: 7-word polygon headers followed by 1-4 vertices of
//! 4 words each, with link bits selecting vertices reused from the
//! previous polygon.

use glam::Vec3;

/// Hardware revision; selects the vertex fixed-point scale.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HardwareStep {
    Step10,
    Step15,
    Step20,
    Step21,
}

impl HardwareStep {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x10 => HardwareStep::Step10,
            0x15 => HardwareStep::Step15,
            0x20 => HardwareStep::Step20,
            _ => HardwareStep::Step21,
        }
    }

    /// Vertex coordinates are 17.15 fixed point on Step 1.0 and 13.19 on
    /// every later revision.
    fn vertex_scale(self) -> f32 {
        match self {
            HardwareStep::Step10 => 1.0 / (1 << 15) as f32,
            _ => 1.0 / (1 << 19) as f32,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub uv: [f32; 2],
}

/// Per-polygon texture selection.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TextureRef {
    pub enabled: bool,
    /// Texel origin on the 2048x2048 sheet.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Format code 0..7.
    pub format: u8,
    /// Contour texture with A4R4G4B4 alpha.
    pub translucent: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Polygon {
    pub verts: Vec<Vertex>,
    pub normal: Vec3,
    /// Packed RGB from header word 4.
    pub color: [u8; 3],
    pub specular_exponent: u8,
    pub polygon_id: u8,
    pub texture: TextureRef,
    pub lighting_disabled: bool,
    pub opaque: bool,
    /// 0-248, header translucency scaled by 8.
    pub translucency: u8,
    /// Header word 6 bit 0: acts as transparent-via-alpha in some titles
    /// and as a Z-write disable in others; both attributes are raised.
    pub alpha_test: bool,
    pub z_write_disable: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DecodedModel {
    pub polygons: Vec<Polygon>,
    /// Guest words consumed; bounds the address range a cached copy of
    /// this model must be invalidated for.
    pub words_consumed: usize,
}

/// Decode a model starting at `words[0]`. `swap` byte-swaps each word as
/// it is read (VROM models are big-endian; polygon RAM models are not).
/// Decoding stops at the end-of-model bit, on malformed data, or after
/// `words` runs out.
pub fn decode_model(words: &[u32], step: HardwareStep, swap: bool) -> DecodedModel {
    let rd = |i: usize| -> u32 {
        let w = words.get(i).copied().unwrap_or(0);
        if swap { w.swap_bytes() } else { w }
    };
    let scale = step.vertex_scale();
    let mut model = DecodedModel::default();
    let mut prev = [Vertex::default(); 4];
    let mut offset = 0usize;

    loop {
        if offset + 7 > words.len() {
            break;
        }
        let header: [u32; 7] = std::array::from_fn(|i| rd(offset + i));

        // A zeroed word 6 marks malformed or truncated data.
        if header[6] == 0 {
            break;
        }
        offset += 7;

        let num_verts = if header[0] & 0x40 != 0 { 4 } else { 3 };
        let links = header[0] & 0xF;
        let num_reused = links.count_ones() as usize;
        let uv_16 = header[1] & 0x40 != 0;
        let uv_scale = if uv_16 { 1.0 } else { 1.0 / 8.0 };

        let mut verts = Vec::with_capacity(num_verts);
        for i in 0..4 {
            if links & (1 << i) != 0 {
                verts.push(prev[i]);
            }
        }
        for _ in num_reused..num_verts {
            if offset + 4 > words.len() {
                model.words_consumed = offset;
                return model;
            }
            let x = (rd(offset) as i32) as f32 * scale;
            let y = (rd(offset + 1) as i32) as f32 * scale;
            let z = (rd(offset + 2) as i32) as f32 * scale;
            let uv = rd(offset + 3);
            let u = ((uv >> 16) as i16) as f32 * uv_scale;
            let v = (uv as i16) as f32 * uv_scale;
            offset += 4;
            verts.push(Vertex {
                pos: [x, y, z],
                uv: [u, v],
            });
        }

        // 2.22 fixed-point normal from words 1-3.
        let normal = Vec3::new(
            ((header[1] as i32) >> 8) as f32 / (1 << 22) as f32,
            ((header[2] as i32) >> 8) as f32 / (1 << 22) as f32,
            ((header[3] as i32) >> 8) as f32 / (1 << 22) as f32,
        );

        let tex_x = ((header[5] >> 7) & 1) << 6 | (header[4] & 0x3F);
        let tex_y = ((header[4] >> 6) & 1) << 5 | (header[5] & 0x1F);

        let polygon = Polygon {
            verts: verts.clone(),
            normal,
            color: [
                (header[4] >> 24) as u8,
                (header[4] >> 16) as u8,
                (header[4] >> 8) as u8,
            ],
            specular_exponent: (header[0] >> 26) as u8,
            polygon_id: ((header[0] >> 10) & 0x3F) as u8,
            texture: TextureRef {
                enabled: header[6] & 0x04 != 0,
                x: tex_x * 32,
                y: tex_y * 32,
                width: 32 << ((header[3] >> 3) & 7),
                height: 32 << (header[3] & 7),
                format: ((header[6] >> 7) & 7) as u8,
                translucent: header[6] & 0x8000_0000 != 0,
            },
            lighting_disabled: header[6] & 0x0001_0000 != 0,
            opaque: header[6] & 0x0080_0000 != 0,
            translucency: (((header[6] >> 18) & 0x1F) * 8) as u8,
            alpha_test: header[6] & 1 != 0,
            z_write_disable: header[6] & 1 != 0,
        };

        // The current polygon's vertices become the reuse pool.
        for (slot, v) in prev.iter_mut().zip(verts.iter()) {
            *slot = *v;
        }
        model.polygons.push(polygon);

        if header[1] & 0x04 != 0 {
            break;
        }
    }
    model.words_consumed = offset;
    model
}
