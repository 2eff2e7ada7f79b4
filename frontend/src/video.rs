//! Presentation handoff.
//!
//! The platform window/GL glue lives outside this repository; this
//! presenter owns the host-side framebuffer, receives the machine's
//! output at each frame boundary (the single-producer/single-consumer
//! handoff point), and forwards it to whatever backend is linked in.

use m3_core::core::machine::Machine;

pub struct Presenter {
    width: u32,
    height: u32,
    framebuffer: Vec<u8>,
    frames: u64,
}

impl Presenter {
    pub fn new(width: u32, height: u32) -> Result<Self, String> {
        if width == 0 || height == 0 {
            return Err(format!("bad display size {width}x{height}"));
        }
        Ok(Presenter {
            width,
            height,
            framebuffer: Vec::new(),
            frames: 0,
        })
    }

    /// Take this frame's video and audio from the machine. The machine
    /// will not touch these buffers again until its next `run_frame`.
    pub fn present(&mut self, machine: &impl Machine) {
        let (native_w, native_h) = machine.display_size();
        let needed = (native_w * native_h * 3) as usize;
        if self.framebuffer.len() != needed {
            self.framebuffer.resize(needed, 0);
        }
        machine.render_frame(&mut self.framebuffer);
        let (_audio_l, _audio_r) = machine.audio_frame();
        self.frames += 1;
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames
    }

    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
