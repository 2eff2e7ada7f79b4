use m3_core::core::bus::IntAck;
use m3_core::cpu::m68k::{M68K, SR_SUPERVISOR};
use m3_core::cpu::Cpu;
mod common;
use common::TestBus;

fn m68k_at(pc: u32) -> M68K {
    let mut cpu = M68K::new();
    cpu.pc = pc;
    cpu.a[7] = 0x9000;
    cpu
}

fn load_ops(bus: &mut TestBus, addr: u32, ops: &[u16]) {
    for (i, op) in ops.iter().enumerate() {
        bus.load(addr + (i as u32) * 2, &op.to_be_bytes());
    }
}

#[test]
fn reset_fetches_vectors() {
    let mut cpu = M68K::new();
    let mut bus = TestBus::new();
    bus.load(0, &0x0000_9000u32.to_be_bytes()); // SSP
    bus.load(4, &0x0000_0400u32.to_be_bytes()); // PC
    cpu.reset(&mut bus);
    assert_eq!(cpu.a[7], 0x9000);
    assert_eq!(cpu.pc, 0x400);
    assert!(cpu.sr & SR_SUPERVISOR != 0);
}

#[test]
fn autovectored_interrupt_enters_handler() {
    let mut cpu = m68k_at(0x400);
    let mut bus = TestBus::new();
    cpu.sr = 0x2000; // supervisor, mask 0
    // Autovector for level 2 = vector 26.
    bus.load(26 * 4, &0x0000_0800u32.to_be_bytes());
    load_ops(&mut bus, 0x400, &[0x4E71]);
    load_ops(&mut bus, 0x800, &[0x4E73]); // rte

    cpu.set_irq(2);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x800);
    // Mask raised to the taken level.
    assert_eq!((cpu.sr >> 8) & 7, 2);

    // RTE returns to the interrupted instruction.
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x400);
    assert_eq!((cpu.sr >> 8) & 7, 0);
}

#[test]
fn masked_interrupt_waits_for_lower_mask() {
    let mut cpu = m68k_at(0x400);
    let mut bus = TestBus::new();
    cpu.sr = 0x2700; // mask 7
    load_ops(&mut bus, 0x400, &[0x4E71, 0x4E71]);
    cpu.set_irq(3);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x402); // still executing normally
}

#[test]
fn level_seven_is_non_maskable() {
    let mut cpu = m68k_at(0x400);
    let mut bus = TestBus::new();
    cpu.sr = 0x2700;
    bus.load(31 * 4, &0x0000_0900u32.to_be_bytes());
    load_ops(&mut bus, 0x400, &[0x4E71]);
    cpu.set_irq(7);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x900);
}

#[test]
fn explicit_vector_from_device() {
    let mut cpu = m68k_at(0x400);
    let mut bus = TestBus::new();
    cpu.sr = 0x2000;
    bus.ack = IntAck::Vector(0x40);
    bus.load(0x40 * 4, &0x0000_0A00u32.to_be_bytes());
    load_ops(&mut bus, 0x400, &[0x4E71]);
    cpu.set_irq(1);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0xA00);
}

#[test]
fn spurious_interrupt_vector() {
    let mut cpu = m68k_at(0x400);
    let mut bus = TestBus::new();
    cpu.sr = 0x2000;
    bus.ack = IntAck::Spurious;
    bus.load(24 * 4, &0x0000_0B00u32.to_be_bytes());
    load_ops(&mut bus, 0x400, &[0x4E71]);
    cpu.set_irq(1);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0xB00);
}

#[test]
fn stop_sleeps_until_interrupt() {
    let mut cpu = m68k_at(0x400);
    let mut bus = TestBus::new();
    cpu.sr = 0x2000;
    bus.load(25 * 4, &0x0000_0800u32.to_be_bytes()); // level 1 autovector
    // stop #0x2000
    load_ops(&mut bus, 0x400, &[0x4E72, 0x2000]);
    load_ops(&mut bus, 0x800, &[0x4E71]);
    cpu.step(&mut bus);
    assert!(cpu.stopped);

    // With nothing pending the core just burns its budget.
    let consumed = cpu.run(&mut bus, 100);
    assert_eq!(consumed, 100);
    assert!(cpu.stopped);

    cpu.set_irq(1);
    cpu.step(&mut bus);
    assert!(!cpu.stopped);
    assert_eq!(cpu.pc, 0x800);
}

#[test]
fn trap_instruction_vectors() {
    let mut cpu = m68k_at(0x400);
    let mut bus = TestBus::new();
    bus.load((32 + 5) * 4, &0x0000_0C00u32.to_be_bytes());
    load_ops(&mut bus, 0x400, &[0x4E45]); // trap #5
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0xC00);
    // Pushed return address is the instruction after the trap.
    assert_eq!(&bus.mem[0x8FFC..0x9000], &[0x00, 0x00, 0x04, 0x02]);
}

#[test]
fn user_mode_privilege_violation() {
    let mut cpu = m68k_at(0x400);
    let mut bus = TestBus::new();
    // Drop to user mode first; SSP must be preserved for the exception.
    cpu.sp_other = 0x9000; // becomes SSP after write_sr
    cpu.write_sr(0x0000);
    cpu.a[7] = 0x7000; // USP
    bus.load(8 * 4, &0x0000_0D00u32.to_be_bytes());
    load_ops(&mut bus, 0x400, &[0x46FC, 0x2700]); // move #0x2700,sr
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0xD00);
    assert!(cpu.sr & SR_SUPERVISOR != 0);
}
