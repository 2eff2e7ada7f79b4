//! MPEG audio streaming engine.
//!
//! Decodes Layer-2 frames on demand from a window of the MPEG ROM (or a
//! substituted custom track) and hands PCM to the resampler. The playback
//! window can be relocated mid-stream (`update_memory`), which is how the
//! sound boards rewrite loop points while a track is playing: the byte
//! position is shifted by the window displacement so the same audio sample
//! keeps playing.

mod layer2;
mod resampler;

pub use layer2::{DecodedFrame, Layer2Decoder, MAX_SAMPLES_PER_FRAME};
pub use resampler::Resampler;

use std::collections::HashMap;
use std::sync::Arc;

const HDR_SIZE: i64 = 4;

/// An external audio file substituted for a region of the MPEG ROM.
#[derive(Clone)]
pub struct CustomTrack {
    pub data: Arc<Vec<u8>>,
    pub file_start_offset: usize,
}

pub struct MpegEngine {
    decoder: Layer2Decoder,
    /// Current source buffer (ROM or custom track).
    source: Option<Arc<Vec<u8>>>,
    /// Playback window within `source`.
    base: usize,
    size: usize,
    /// Byte position relative to `base`. Signed: a window relocation past
    /// the current position leaves it negative until playback catches up.
    pos: i64,
    looping: bool,
    stopped: bool,
    /// Interleaved stereo PCM of the most recently decoded frame.
    pcm: Vec<i16>,
    pcm_len: usize,
    pcm_pos: usize,
    custom_tracks: HashMap<u32, CustomTrack>,
    /// Which custom file is currently playing, if any. Window updates for
    /// a ROM key apply only when its track is this same file.
    current_custom: Option<Arc<Vec<u8>>>,
}

impl Default for MpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MpegEngine {
    pub fn new() -> Self {
        MpegEngine {
            decoder: Layer2Decoder::new(),
            source: None,
            base: 0,
            size: 0,
            pos: 0,
            looping: false,
            stopped: false,
            pcm: vec![0; MAX_SAMPLES_PER_FRAME],
            pcm_len: 0,
            pcm_pos: 0,
            custom_tracks: HashMap::new(),
            current_custom: None,
        }
    }

    /// Register external files keyed by MPEG ROM offset. Duplicates were
    /// already filtered by the configuration layer (first wins).
    pub fn set_custom_tracks(&mut self, tracks: HashMap<u32, CustomTrack>) {
        self.custom_tracks = tracks;
    }

    /// Begin playback of `rom[offset .. offset+length]`, or of a custom
    /// track registered for `offset`.
    pub fn set_memory(&mut self, rom: &Arc<Vec<u8>>, offset: u32, length: usize, looping: bool) {
        self.decoder.reset();
        match self.custom_tracks.get(&offset) {
            None => {
                self.source = Some(Arc::clone(rom));
                self.base = offset as usize;
                self.size = length;
                self.current_custom = None;
            }
            Some(track) => {
                let mut start = track.file_start_offset;
                if start >= track.data.len() {
                    start = 0;
                }
                self.source = Some(Arc::clone(&track.data));
                self.base = start;
                self.size = track.data.len() - start;
                self.current_custom = Some(Arc::clone(&track.data));
            }
        }
        self.pos = 0;
        self.pcm_len = 0;
        self.pcm_pos = 0;
        self.looping = looping;
        self.stopped = false;
    }

    /// Relocate the playback window without restarting the stream. The
    /// play position is shifted by the window displacement so playback
    /// continues at the same audio sample.
    pub fn update_memory(&mut self, rom: &Arc<Vec<u8>>, offset: u32, length: usize, looping: bool) {
        match self.custom_tracks.get(&offset) {
            None => {
                if self.current_custom.is_none() {
                    if let Some(source) = &self.source {
                        if Arc::ptr_eq(source, rom) {
                            let diff = offset as i64 - self.base as i64;
                            self.pos -= diff;
                        } else {
                            self.pos = 0;
                        }
                    }
                    self.source = Some(Arc::clone(rom));
                    self.base = offset as usize;
                    self.size = length;
                } else {
                    // A custom track is playing and this window update is
                    // for plain ROM; applying it would glue ROM data onto
                    // a foreign stream, so it is dropped.
                    log::debug!("mpeg: window update for ROM ignored while custom track plays");
                }
            }
            Some(track) => {
                let same_file = self
                    .current_custom
                    .as_ref()
                    .is_some_and(|cur| Arc::ptr_eq(cur, &track.data));
                if same_file {
                    let mut start = track.file_start_offset;
                    if start >= track.data.len() {
                        start = 0;
                    }
                    let diff = start as i64 - self.base as i64;
                    self.pos -= diff;
                    self.base = start;
                    // ROM end offsets never line up with the file, so the
                    // window always extends to EOF.
                    self.size = track.data.len() - start;
                } else {
                    log::debug!("mpeg: window update ignored, different custom track active");
                }
            }
        }
        self.looping = looping;
    }

    /// Byte offset of the play cursor relative to the current window base.
    /// Negative right after a relocation past the cursor.
    pub fn position(&self) -> i64 {
        self.pos
    }

    pub fn set_position(&mut self, pos: i64) {
        self.pos = pos;
    }

    pub fn stop(&mut self) {
        self.stopped = true;
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_playing(&self) -> bool {
        self.source.is_some() && !self.stopped
    }

    /// Pull one stereo sample; refills the internal frame buffer as needed.
    /// Returns silence at end-of-stream (non-looping) or while stopped.
    pub fn next_sample(&mut self) -> (i16, i16) {
        if self.stopped || self.source.is_none() {
            return (0, 0);
        }
        if self.pcm_pos >= self.pcm_len && !self.refill() {
            return (0, 0);
        }
        let l = self.pcm[self.pcm_pos];
        let r = self.pcm[self.pcm_pos + 1];
        self.pcm_pos += 2;
        (l, r)
    }

    /// Fill `left`/`right` with decoded PCM at the stream's native rate.
    pub fn decode_audio(&mut self, left: &mut [i16], right: &mut [i16], samples: usize) {
        for i in 0..samples {
            let (l, r) = self.next_sample();
            left[i] = l;
            right[i] = r;
        }
    }

    fn end_of_buffer(&self) -> bool {
        self.pos >= self.size as i64 - HDR_SIZE
    }

    /// Decode the next frame into the PCM buffer. Returns false when no
    /// more data can be produced.
    fn refill(&mut self) -> bool {
        loop {
            if self.end_of_buffer() {
                if self.looping {
                    self.pos = 0;
                } else {
                    return false;
                }
            }
            let source = match &self.source {
                Some(s) => Arc::clone(s),
                None => return false,
            };
            // Guests can program windows past the end of the ROM; clamp
            // rather than trusting the markers.
            let lo = self.base.min(source.len());
            let hi = (self.base + self.size).min(source.len());
            let window = &source[lo..hi];
            if window.is_empty() {
                return false;
            }
            let start = self.pos.max(0) as usize;
            if start >= window.len() {
                if self.looping {
                    self.pos = 0;
                    continue;
                }
                return false;
            }
            let frame = self.decoder.decode_frame(&window[start..], &mut self.pcm);
            if frame.frame_bytes == 0 {
                // No sync found; give up on this stream until re-seated.
                self.stopped = true;
                return false;
            }
            self.pos = self.pos.max(0) + frame.frame_bytes as i64;
            if frame.samples > 0 {
                self.pcm_len = frame.samples * 2;
                self.pcm_pos = 0;
                return true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mpeg::layer2::test_stream;

    #[test]
    fn update_memory_preserves_play_cursor() {
        // Per the window-relocation contract: moving the window base
        // forward by N bytes moves the relative position back by N.
        let rom = Arc::new(test_stream(0x8000));
        let mut engine = MpegEngine::new();
        engine.set_memory(&rom, 0, 0x8000, false);
        let mut left = [0i16; 100];
        let mut right = [0i16; 100];
        engine.decode_audio(&mut left, &mut right, 100);
        let before = engine.position();
        assert!(before > 0);

        engine.update_memory(&rom, 0x2000, 0x6000, true);
        assert_eq!(engine.position(), before - 0x2000);
    }

    #[test]
    fn stop_produces_silence() {
        let rom = Arc::new(test_stream(0x4000));
        let mut engine = MpegEngine::new();
        engine.set_memory(&rom, 0, 0x4000, false);
        engine.stop();
        let mut left = [1i16; 16];
        let mut right = [1i16; 16];
        engine.decode_audio(&mut left, &mut right, 16);
        assert!(left.iter().all(|&s| s == 0));
        assert!(right.iter().all(|&s| s == 0));
    }

    #[test]
    fn empty_stream_is_silent() {
        let mut engine = MpegEngine::new();
        let mut left = [1i16; 4];
        let mut right = [1i16; 4];
        engine.decode_audio(&mut left, &mut right, 4);
        assert_eq!(left, [0; 4]);
    }
}
