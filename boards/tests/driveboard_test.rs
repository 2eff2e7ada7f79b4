//! Drive-board tests: the simulated protocol, the encoder-port
//! translation used by the emulated path, and the save-state mode guard.

use m3_boards::driveboard::{DriveBoard, ForceFeedback};
use m3_core::core::bus::Bus;
use m3_core::save::BlockFile;

#[derive(Default)]
struct RecordingFfb {
    calls: Vec<String>,
}

impl ForceFeedback for RecordingFfb {
    fn stop_all(&mut self) {
        self.calls.push("stop".into());
    }
    fn constant_force(&mut self, force: i8) {
        self.calls.push(format!("const {force}"));
    }
    fn self_center(&mut self, strength: u8) {
        self.calls.push(format!("center {strength}"));
    }
    fn friction(&mut self, strength: u8) {
        self.calls.push(format!("friction {strength}"));
    }
    fn vibrate(&mut self, strength: u8) {
        self.calls.push(format!("vibrate {strength}"));
    }
}

#[test]
fn simulated_power_on_handshake() {
    let mut board = DriveBoard::new_simulated();
    board.reset();
    // Two busy polls, then ready; stays ready afterwards.
    assert_eq!(board.read(), 0x81);
    assert_eq!(board.read(), 0x81);
    assert_eq!(board.read(), 0x80);
    assert_eq!(board.read(), 0x80);
}

#[test]
fn simulated_commands_emit_effects() {
    let mut board = DriveBoard::new_simulated();
    let mut ffb = RecordingFfb::default();
    board.reset();

    board.write(0x15); // self-center 5
    board.run_frame(&mut ffb);
    board.write(0x23); // friction 3
    board.run_frame(&mut ffb);
    board.write(0x42); // constant force right 2
    board.run_frame(&mut ffb);
    board.write(0x53); // constant force left 3
    board.run_frame(&mut ffb);
    board.write(0x60); // stop all
    board.run_frame(&mut ffb);

    assert_eq!(
        ffb.calls,
        vec![
            format!("center {}", 5 * 0x11),
            format!("friction {}", 3 * 0x11),
            "const 2".to_string(),
            "const -3".to_string(),
            "stop".to_string(),
        ]
    );
}

#[test]
fn encoder_port_pairs_translate_to_effects() {
    // The emulated path's Z80 writes effect select to port 0x46 and the
    // magnitude to port 0x42; the host decodes the pair.
    let mut board = DriveBoard::new_emulated(vec![0; 0x8000]);
    let mut ffb = RecordingFfb::default();
    board.reset();

    board.io_mut().io_write8(0x42, 0x90);
    board.io_mut().io_write8(0x46, 0x01); // constant force
    board.run_frame(&mut ffb);
    board.io_mut().io_write8(0x42, 0x30);
    board.io_mut().io_write8(0x46, 0x02); // self-center
    board.run_frame(&mut ffb);
    board.io_mut().io_write8(0x42, 0x00);
    board.io_mut().io_write8(0x46, 0x00); // stop
    board.run_frame(&mut ffb);

    assert_eq!(
        ffb.calls,
        vec![
            format!("const {}", 0x90u8.wrapping_sub(0x80) as i8),
            "center 48".to_string(),
            "stop".to_string(),
        ]
    );
}

#[test]
fn seven_segment_latches_are_exposed() {
    let mut board = DriveBoard::new_emulated(vec![0; 0x8000]);
    board.reset();
    board.io_mut().io_write8(0x10, 3);
    board.io_mut().io_write8(0x11, 7);
    board.io_mut().io_write8(0x12, 1);
    board.io_mut().io_write8(0x13, 9);
    assert_eq!(board.seg_displays(), (3, 7, 1, 9));
}

#[test]
fn dip_switches_carry_steering_strength() {
    let mut board = DriveBoard::new_simulated();
    board.set_steering_strength(7);
    assert_eq!(board.steering_strength(), 7);
    let (dip1, _) = board.dip_switches();
    assert_eq!(dip1 & 0x0F, 7);
    // Out-of-range values clamp.
    board.set_steering_strength(0);
    assert_eq!(board.steering_strength(), 1);
    board.set_steering_strength(99);
    assert_eq!(board.steering_strength(), 10);
}

#[test]
fn save_state_in_other_mode_disables_board() {
    let mut simulated = DriveBoard::new_simulated();
    simulated.reset();
    let mut file = BlockFile::new();
    simulated.save_state(&mut file);

    let mut emulated = DriveBoard::new_emulated(vec![0; 0x8000]);
    emulated.reset();
    assert!(emulated.is_attached());
    emulated.load_state(&file);
    // Incompatible mode: temporarily disabled until reset.
    assert!(!emulated.is_attached());
    assert_eq!(emulated.read(), 0xFF);
    emulated.reset();
    assert!(emulated.is_attached());
}

#[test]
fn same_mode_save_restores_observable_state() {
    let mut board = DriveBoard::new_simulated();
    board.reset();
    let _ = board.read(); // advance the handshake
    let mut file = BlockFile::new();
    board.save_state(&mut file);

    let mut restored = DriveBoard::new_simulated();
    restored.reset();
    restored.load_state(&file);
    // Both continue the handshake identically.
    assert_eq!(restored.read(), board.read());
    assert_eq!(restored.read(), board.read());
}

#[test]
fn z80_program_drives_the_response_latch() {
    // A two-instruction program: the Z80 reads the command latch and
    // echoes it back out the response port, proving the latch plumbing.
    //   IN A,(0x20) ; OUT (0x30),A ; JR -6
    // The same loop sits at the NMI vector, which is where each command
    // write lands the Z80.
    let mut rom = vec![0u8; 0x8000];
    let echo = [0xDB, 0x20, 0xD3, 0x30, 0x18, 0xFA];
    rom[..6].copy_from_slice(&echo);
    rom[0x66..0x6C].copy_from_slice(&echo);
    let mut board = DriveBoard::new_emulated(rom);
    let mut ffb = RecordingFfb::default();
    board.reset();
    board.write(0x5A);
    board.run_frame(&mut ffb);
    assert_eq!(board.read(), 0x5A);
}
