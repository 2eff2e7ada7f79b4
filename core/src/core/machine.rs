use crate::save::BlockFile;

/// Describes a single input button that a machine accepts.
pub struct InputButton {
    /// Machine-defined button identifier, passed to `set_input()`.
    pub id: u8,
    /// Human-readable name for display/configuration (e.g., "Start", "Coin").
    pub name: &'static str,
}

/// Machine-agnostic interface for emulated systems.
///
/// The frontend is a pure presentation shell that does not know about
/// specific hardware (tile generators, sound boards, drive boards). At each
/// frame boundary it hands the machine's output buffers to the platform
/// layer; until the next `run_frame()` call the machine will not touch them,
/// which is the whole single-producer/single-consumer handoff contract.
pub trait Machine {
    /// Native display resolution as (width, height) in pixels.
    fn display_size(&self) -> (u32, u32);

    /// Run one frame of emulation (1/60 s of guest time).
    fn run_frame(&mut self);

    /// Render the current video state into an RGB24 pixel buffer of at
    /// least `width * height * 3` bytes.
    fn render_frame(&self, buffer: &mut [u8]);

    /// Borrow the left/right 44.1 kHz audio accumulators produced by the
    /// last `run_frame()`.
    fn audio_frame(&self) -> (&[f32], &[f32]);

    /// Handle an input event. `button` is a machine-defined ID from
    /// `input_map()`; `pressed` is true for key-down. Called per-event;
    /// each call latches state that `run_frame()` observes.
    fn set_input(&mut self, button: u8, pressed: bool);

    /// Get the list of input buttons this machine accepts.
    fn input_map(&self) -> &[InputButton];

    /// Reset the machine to its initial power-on state.
    fn reset(&mut self);

    /// Append this machine's per-component state blocks to a save file.
    fn save_state(&self, file: &mut BlockFile);

    /// Restore state from a save file. Subsystems whose block is missing
    /// log a warning and reset to power-on; the rest proceed.
    fn load_state(&mut self, file: &BlockFile);
}
