//! Linear-interpolation up-sampler and mixer (32 kHz MPEG PCM into the
//! 44.1 kHz host mix bus).
//!
//! Fractions are 24.8 fixed point: `p_frac` runs 1.0 -> 0.0 and `n_frac`
//! 0.0 -> 1.0 as the output time advances between two input samples, with
//! `delta = (in_rate << 8) / out_rate` per output sample. Because the input
//! rate is below the output rate, the fractions never exceed 1.0 and the
//! input index advances by at most one per output sample.
//!
//! Continuity across video frames: the final output sample usually lands
//! between two input samples, so the unconsumed tail of the input buffer is
//! copied to its start and the retained count returned; the caller decodes
//! the next frame's samples after them. `p_frac`/`n_frac` persist for the
//! same reason.

pub struct Resampler {
    p_frac: i32,
    n_frac: i32,
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler {
    pub fn new() -> Self {
        Resampler {
            p_frac: 1 << 8,
            n_frac: 0,
        }
    }

    pub fn reset(&mut self) {
        self.p_frac = 1 << 8;
        self.n_frac = 0;
    }

    /// Up-sample `in_l`/`in_r` into the `out_l`/`out_r` accumulators,
    /// applying the per-channel volumes (0-255) and the music-volume
    /// percentage (0-200). Returns how many unconsumed input samples were
    /// copied back to the start of the input buffers.
    #[allow(clippy::too_many_arguments)]
    pub fn up_sample_and_mix(
        &mut self,
        out_l: &mut [f32],
        out_r: &mut [f32],
        in_l: &mut [i16],
        in_r: &mut [i16],
        volume_l: u8,
        volume_r: u8,
        music_volume: u32,
        out_rate: u32,
        in_rate: u32,
    ) -> usize {
        let delta = ((in_rate << 8) / out_rate) as i32;
        let music = music_volume.min(200) as f32 / 100.0;
        // The extra 1/256 corrects for the fixed-point interpolation below.
        let v_l = music * volume_l as f32 / (255.0 * 256.0);
        let v_r = music * volume_r as f32 / (255.0 * 256.0);

        let mut in_idx = 0usize;
        for out_idx in 0..out_l.len() {
            let left =
                in_l[in_idx] as i32 * self.p_frac + in_l[in_idx + 1] as i32 * self.n_frac;
            let right =
                in_r[in_idx] as i32 * self.p_frac + in_r[in_idx + 1] as i32 * self.n_frac;
            out_l[out_idx] += left as f32 * v_l;
            out_r[out_idx] += right as f32 * v_r;

            self.p_frac -= delta;
            self.n_frac += delta;
            if self.p_frac <= 0 {
                self.p_frac += 1 << 8;
                self.n_frac -= 1 << 8;
                in_idx += 1;
            }
        }

        // Retain unconsumed input for the next frame.
        let size_in = in_l.len();
        let mut retained = 0;
        for j in in_idx..size_in {
            in_l[retained] = in_l[j];
            in_r[retained] = in_r[j];
            retained += 1;
        }
        retained
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUT: usize = 44100 / 60;
    const IN: usize = 32000 / 60 + 2;

    #[test]
    fn consumes_input_at_rate_ratio() {
        let mut rs = Resampler::new();
        let mut in_l = [1000i16; IN];
        let mut in_r = [1000i16; IN];
        let mut out_l = [0f32; OUT];
        let mut out_r = [0f32; OUT];
        let retained =
            rs.up_sample_and_mix(&mut out_l, &mut out_r, &mut in_l, &mut in_r, 255, 255, 100, 44100, 32000);
        // 735 output samples consume ~533 input samples.
        let consumed = IN - retained;
        assert!((532..=534).contains(&consumed), "consumed {consumed}");
    }

    #[test]
    fn constant_input_mixes_to_constant_output() {
        let mut rs = Resampler::new();
        let mut in_l = [16384i16; IN];
        let mut in_r = [16384i16; IN];
        let mut out_l = [0f32; OUT];
        let mut out_r = [0f32; OUT];
        rs.up_sample_and_mix(&mut out_l, &mut out_r, &mut in_l, &mut in_r, 255, 255, 100, 44100, 32000);
        // Interpolating a constant yields the constant (scaled by volume).
        let expected = 16384.0 * 256.0 / (255.0 * 256.0);
        for &s in &out_l {
            assert!((s - expected).abs() < 1.0, "sample {s} vs {expected}");
        }
    }

    #[test]
    fn zero_volume_is_silent() {
        let mut rs = Resampler::new();
        let mut in_l = [12345i16; IN];
        let mut in_r = [12345i16; IN];
        let mut out_l = [0f32; OUT];
        let mut out_r = [0f32; OUT];
        rs.up_sample_and_mix(&mut out_l, &mut out_r, &mut in_l, &mut in_r, 0, 0, 200, 44100, 32000);
        assert!(out_l.iter().all(|&s| s == 0.0));
        assert!(out_r.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn phase_persists_across_calls() {
        // Producing two half-frames must consume the same total input as
        // producing one whole frame (within one sample of drift).
        let mut rs_whole = Resampler::new();
        let mut in_l = [500i16; IN];
        let mut in_r = [500i16; IN];
        let mut out_l = [0f32; OUT];
        let mut out_r = [0f32; OUT];
        let retained = rs_whole
            .up_sample_and_mix(&mut out_l, &mut out_r, &mut in_l, &mut in_r, 255, 255, 100, 44100, 32000);
        let consumed_whole = IN - retained;

        let mut rs_split = Resampler::new();
        let mut in_l = [500i16; IN];
        let mut in_r = [500i16; IN];
        let mut half_l = [0f32; OUT / 2];
        let mut half_r = [0f32; OUT / 2];
        let r1 = rs_split
            .up_sample_and_mix(&mut half_l, &mut half_r, &mut in_l, &mut in_r, 255, 255, 100, 44100, 32000);
        let consumed1 = IN - r1;

        let mut in_l = [500i16; IN];
        let mut in_r = [500i16; IN];
        let mut half_l = [0f32; OUT - OUT / 2];
        let mut half_r = [0f32; OUT - OUT / 2];
        let r2 = rs_split
            .up_sample_and_mix(&mut half_l, &mut half_r, &mut in_l, &mut in_r, 255, 255, 100, 44100, 32000);
        let consumed2 = IN - r2;

        let split_total = consumed1 + consumed2;
        assert!(
            split_total.abs_diff(consumed_whole) <= 1,
            "split {split_total} vs whole {consumed_whole}"
        );
    }
}
