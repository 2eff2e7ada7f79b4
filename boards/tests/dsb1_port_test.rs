//! DSB1 port-map tests, driven through the Z80's I/O bus view.

use std::sync::Arc;

use m3_boards::dsb::{DigitalSoundBoard, Dsb1};
use m3_core::core::bus::{Bus, IntAck};

fn board() -> Dsb1 {
    let prog = Arc::new(vec![0u8; 0x8000]);
    let mpeg = Arc::new(vec![0u8; 0x10_0000]);
    Dsb1::new(prog, mpeg, true)
}

fn set_start(dsb: &mut Dsb1, addr: u32) {
    dsb.io_mut().io_write8(0xE2, (addr >> 16) as u8);
    dsb.io_mut().io_write8(0xE3, (addr >> 8) as u8);
    dsb.io_mut().io_write8(0xE4, addr as u8);
}

fn set_end(dsb: &mut Dsb1, addr: u32) {
    dsb.io_mut().io_write8(0xE5, (addr >> 16) as u8);
    dsb.io_mut().io_write8(0xE6, (addr >> 8) as u8);
    dsb.io_mut().io_write8(0xE7, addr as u8);
}

#[test]
fn start_and_end_latches_assemble_24_bits() {
    let mut dsb = board();
    set_start(&mut dsb, 0x12_3456);
    set_end(&mut dsb, 0x65_4321);
    assert_eq!(dsb.io().mpeg_start(), 0x12_3456);
    assert_eq!(dsb.io().mpeg_end(), 0x65_4321);
}

#[test]
fn trigger_one_plays_from_markers() {
    let mut dsb = board();
    set_start(&mut dsb, 0x1000);
    set_end(&mut dsb, 0x5000);
    dsb.io_mut().io_write8(0xE0, 1);
    assert!(dsb.io().engine().is_playing());
    dsb.io_mut().io_write8(0xE0, 0);
    assert!(!dsb.io().engine().is_playing());
}

#[test]
fn latches_retarget_loop_while_playing() {
    let mut dsb = board();
    set_start(&mut dsb, 0x1000);
    set_end(&mut dsb, 0x5000);
    // Trigger 2: play-with-loop; the loop markers come afterwards.
    dsb.io_mut().io_write8(0xE0, 2);
    assert!(dsb.io().engine().is_playing());

    // While trigger state is non-zero the start latch programs loopStart;
    // loopEnd still zero means "extend to the previous end marker".
    set_start(&mut dsb, 0x2000);
    assert_eq!(dsb.io().loop_window(), (0x2000, 0x5000 - 0x2000));

    // An end write while playing programs loopEnd directly.
    set_end(&mut dsb, 0x4000);
    assert_eq!(dsb.io().loop_window(), (0x2000, 0x4000 - 0x2000));
}

#[test]
fn volume_is_inverted_from_data() {
    let mut dsb = board();
    dsb.io_mut().io_write8(0xE8, 0x00);
    assert_eq!(dsb.io().volume(), 0x7F);
    dsb.io_mut().io_write8(0xE8, 0x7F);
    assert_eq!(dsb.io().volume(), 0x00);
    dsb.io_mut().io_write8(0xE9, 0x01);
    assert_eq!(dsb.io().stereo(), 0x01);
}

#[test]
fn fifo_pop_and_status_bits() {
    let mut dsb = board();
    // Status: bit 0 always, bit 1 only while a command is pending.
    assert_eq!(dsb.io_mut().io_read8(0xF1), 0x01);

    dsb.send_command(0xA5);
    dsb.send_command(0x5A);
    assert_eq!(dsb.io_mut().io_read8(0xF1), 0x03);

    assert_eq!(dsb.io_mut().io_read8(0xF0), 0xA5);
    assert_eq!(dsb.io_mut().io_read8(0xF1), 0x03);
    assert_eq!(dsb.io_mut().io_read8(0xF0), 0x5A);
    assert_eq!(dsb.io_mut().io_read8(0xF1), 0x01);

    // Empty FIFO re-reads the tail without advancing.
    assert_eq!(dsb.io_mut().io_read8(0xF0), 0x5A);
}

#[test]
fn position_reads_add_mpeg_start() {
    let mut dsb = board();
    set_start(&mut dsb, 0x12_3456);
    // Nothing decoded yet: position 0, so the window reads back the
    // start marker.
    assert_eq!(dsb.io_mut().io_read8(0xE2), 0x12);
    assert_eq!(dsb.io_mut().io_read8(0xE3), 0x34);
    assert_eq!(dsb.io_mut().io_read8(0xE4), 0x56);
}

#[test]
fn memory_map_rom_and_ram_split() {
    let mut dsb = board();
    // Writes below 0x8000 (ROM) are discarded; RAM above echoes.
    dsb.io_mut().write8(0x4000, 0xAA);
    assert_eq!(dsb.io_mut().read8(0x4000), 0x00);
    dsb.io_mut().write8(0x8000, 0xBB);
    assert_eq!(dsb.io_mut().read8(0x8000), 0xBB);
    assert_eq!(dsb.io_mut().read8(0xFFFF), 0x00);
    dsb.io_mut().write8(0xFFFF, 0xCC);
    assert_eq!(dsb.io_mut().read8(0xFFFF), 0xCC);
}

#[test]
fn irq_acknowledge_supplies_vector_0x38() {
    let mut dsb = board();
    assert_eq!(dsb.io_mut().ack_interrupt(0), IntAck::Vector(0x38));
}

#[test]
fn disabled_board_still_mixes_silence() {
    let prog = Arc::new(vec![0u8; 0x8000]);
    let mpeg = Arc::new(vec![0u8; 0x10_0000]);
    let mut dsb = Dsb1::new(prog, mpeg, false);
    let mut out_l = vec![0.5f32; 44_100 / 60];
    let mut out_r = vec![0.5f32; 44_100 / 60];
    dsb.run_frame(&mut out_l, &mut out_r);
    // Accumulators are added to, not overwritten: silence leaves them.
    assert!(out_l.iter().all(|&s| s == 0.5));
}

#[test]
fn save_restore_round_trips_the_port_state() {
    use m3_core::save::BlockFile;
    let mut dsb = board();
    set_start(&mut dsb, 0x1000);
    set_end(&mut dsb, 0x3000);
    dsb.io_mut().io_write8(0xE8, 0x20);
    dsb.io_mut().io_write8(0xE0, 1);
    dsb.send_command(0x77);

    let mut file = BlockFile::new();
    dsb.save_state(&mut file);

    let mut restored = board();
    restored.load_state(&file);
    assert_eq!(restored.io().mpeg_start(), 0x1000);
    assert_eq!(restored.io().mpeg_end(), 0x3000);
    assert_eq!(restored.io().volume(), 0x7F - 0x20);
    assert!(restored.io().engine().is_playing());
    assert_eq!(restored.io_mut().io_read8(0xF0), 0x77);
}

#[test]
fn missing_block_resets_the_board() {
    use m3_core::save::BlockFile;
    let mut dsb = board();
    set_start(&mut dsb, 0x1000);
    dsb.io_mut().io_write8(0xE0, 1);
    let empty = BlockFile::new();
    dsb.load_state(&empty);
    assert!(!dsb.io().engine().is_playing());
    assert_eq!(dsb.io().volume(), 0x7F);
}
