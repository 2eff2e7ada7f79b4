use m3_core::core::bus::IntAck;
use m3_core::cpu::z80::Z80;
use m3_core::cpu::Cpu;
mod common;
use common::TestBus;

#[test]
fn int_ignored_until_ei() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    bus.load(0, &[0x00, 0x00, 0x00]); // NOPs
    cpu.set_int(true);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 1); // not taken, IFF1 clear
}

#[test]
fn im1_vectors_to_0x38() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    cpu.sp = 0x9000;
    // ED 56 (IM 1) ; FB (EI) ; 00 (NOP)
    bus.load(0, &[0xED, 0x56, 0xFB, 0x00, 0x00]);
    cpu.step(&mut bus); // IM 1
    cpu.step(&mut bus); // EI
    cpu.set_int(true);
    // EI delays acceptance by one instruction.
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 4);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0038);
    assert!(!cpu.iff1);
    // Return address pushed.
    assert_eq!(&bus.mem[0x8FFE..0x9000], &[0x04, 0x00]);
}

#[test]
fn im2_fetches_vector_from_table() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    cpu.sp = 0x9000;
    cpu.i = 0x80;
    bus.ack = IntAck::Vector(0x10);
    // Vector table entry at 0x8010 -> 0x1234 (little endian).
    bus.load(0x8010, &[0x34, 0x12]);
    // ED 5E (IM 2) ; FB (EI) ; 00 ; 00
    bus.load(0, &[0xED, 0x5E, 0xFB, 0x00, 0x00]);
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    cpu.set_int(true);
    cpu.step(&mut bus); // EI shadow instruction
    cpu.step(&mut bus); // interrupt accepted
    assert_eq!(cpu.pc, 0x1234);
}

#[test]
fn nmi_vectors_to_0x66_and_preserves_iff2() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    cpu.sp = 0x9000;
    bus.load(0, &[0xFB, 0x00, 0x00]); // EI ; NOPs
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    cpu.trigger_nmi();
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x0066);
    assert!(!cpu.iff1);
    assert!(cpu.iff2); // saved enable state

    // RETN restores IFF1 from IFF2.
    bus.load(0x66, &[0xED, 0x45]);
    cpu.step(&mut bus);
    assert!(cpu.iff1);
}

#[test]
fn halt_waits_for_interrupt() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    cpu.sp = 0x9000;
    bus.load(0, &[0xFB, 0x76]); // EI ; HALT
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    assert!(cpu.halted);

    // With no interrupt pending, run() burns the whole budget.
    let consumed = cpu.run(&mut bus, 200);
    assert_eq!(consumed, 200);
    assert!(cpu.halted);

    cpu.set_int(true);
    cpu.step(&mut bus);
    assert!(!cpu.halted);
    assert_eq!(cpu.pc, 0x0038);
}

#[test]
fn io_ports_reach_the_bus() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    bus.io[0x34] = 0x99;
    cpu.a = 0x12;
    // IN A,(0x34) ; OUT (0x56),A
    bus.load(0, &[0xDB, 0x34, 0xD3, 0x56]);
    cpu.step(&mut bus);
    assert_eq!(cpu.a, 0x99);
    cpu.step(&mut bus);
    assert_eq!(bus.io[0x56], 0x99);
    assert_eq!(bus.io_writes, vec![(0x56, 0x99)]);
}

#[test]
fn run_consumes_at_least_requested_cycles() {
    let mut cpu = Z80::new();
    let mut bus = TestBus::new();
    bus.load(0, &[0x00; 64]);
    let consumed = cpu.run(&mut bus, 17);
    // NOPs are 4 T-states; the core overshoots to the boundary.
    assert_eq!(consumed, 20);
}
