use m3_core::cpu::ppc::Ppc;
mod common;
use common::TestBus;

fn ppc_at(pc: u32) -> Ppc {
    let mut cpu = Ppc::new();
    cpu.pc = pc;
    cpu.msr = 0;
    cpu
}

#[test]
fn word_store_load_round_trip() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[1] = 0x8000;
    cpu.gpr[3] = 0xDEAD_BEEF;
    // stw r3,0x10(r1) ; lwz r4,0x10(r1)
    bus.load_words(0, &[0x9061_0010, 0x8081_0010]);
    cpu.step(&mut bus);
    assert_eq!(&bus.mem[0x8010..0x8014], &[0xDE, 0xAD, 0xBE, 0xEF]);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[4], 0xDEAD_BEEF);
}

#[test]
fn halfword_sign_and_zero_extension() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[1] = 0x8000;
    bus.load(0x8000, &[0xFF, 0xFE]);
    // lhz r3,0(r1) ; lha r4,0(r1)
    bus.load_words(0, &[0xA061_0000, 0xA881_0000]);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[3], 0x0000_FFFE);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[4], 0xFFFF_FFFE);
}

#[test]
fn byte_loads_and_stores() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[1] = 0x8000;
    cpu.gpr[3] = 0x1234_56AB;
    // stb r3,0(r1) ; lbz r4,0(r1)
    bus.load_words(0, &[0x9861_0000, 0x8881_0000]);
    cpu.step(&mut bus);
    assert_eq!(bus.mem[0x8000], 0xAB);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[4], 0xAB);
}

#[test]
fn update_forms_write_back_effective_address() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[1] = 0x8000;
    cpu.gpr[3] = 0x55;
    // stwu r3,-16(r1)  (the classic stack push)
    bus.load_words(0, &[0x9461_FFF0]);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[1], 0x7FF0);
    assert_eq!(&bus.mem[0x7FF0..0x7FF4], &[0, 0, 0, 0x55]);

    // lwzu r4,8(r1)
    bus.load_words(4, &[0x8481_0008]);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[1], 0x7FF8);
}

#[test]
fn indexed_forms_add_registers() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[3] = 0x8000;
    cpu.gpr[4] = 0x20;
    bus.load(0x8020, &[0x12, 0x34, 0x56, 0x78]);
    // lwzx r5,r3,r4
    bus.load_words(0, &[0x7CA3_202E]);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[5], 0x1234_5678);
}

#[test]
fn byte_reversed_access() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[4] = 0x8000;
    bus.load(0x8000, &[0x12, 0x34, 0x56, 0x78]);
    // lwbrx r3,0,r4 ; lhbrx r5,0,r4
    bus.load_words(0, &[0x7C60_242C, 0x7CA0_262C]);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[3], 0x7856_3412);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[5], 0x3412);

    // sthbrx r3,0,r4
    cpu.gpr[3] = 0xABCD;
    bus.load_words(8, &[0x7C60_272C]);
    cpu.step(&mut bus);
    assert_eq!(&bus.mem[0x8000..0x8002], &[0xCD, 0xAB]);
}

#[test]
fn load_store_multiple() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[1] = 0x8000;
    cpu.gpr[29] = 0x1111_1111;
    cpu.gpr[30] = 0x2222_2222;
    cpu.gpr[31] = 0x3333_3333;
    // stmw r29,0(r1)
    bus.load_words(0, &[0xBFA1_0000]);
    let cycles = cpu.step(&mut bus);
    assert_eq!(cycles, 2 + 3);
    assert_eq!(&bus.mem[0x8000..0x8004], &[0x11, 0x11, 0x11, 0x11]);
    assert_eq!(&bus.mem[0x8008..0x800C], &[0x33, 0x33, 0x33, 0x33]);

    cpu.gpr[29] = 0;
    cpu.gpr[30] = 0;
    cpu.gpr[31] = 0;
    // lmw r29,0(r1)
    bus.load_words(4, &[0xBBA1_0000]);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[29], 0x1111_1111);
    assert_eq!(cpu.gpr[31], 0x3333_3333);
}

#[test]
fn reservation_pairs_succeed_when_undisturbed() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[4] = 0x8000;
    cpu.gpr[5] = 77;
    bus.load(0x8000, &[0, 0, 0, 9]);
    // lwarx r3,0,r4 ; stwcx. r5,0,r4
    bus.load_words(0, &[0x7C60_2028, 0x7CA0_212D]);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[3], 9);
    cpu.step(&mut bus);
    // CR0[EQ] reports the successful store.
    assert_eq!(cpu.cr_field(0) & 0b0010, 0b0010);
    assert_eq!(&bus.mem[0x8000..0x8004], &[0, 0, 0, 77]);
}

#[test]
fn intervening_store_to_line_clears_reservation() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[4] = 0x8000;
    cpu.gpr[5] = 77;
    cpu.gpr[6] = 1;
    // lwarx r3,0,r4 ; stb r6,4(r4) (same 8-byte granule) ; stwcx. r5,0,r4
    bus.load_words(0, &[0x7C60_2028, 0x98C4_0004, 0x7CA0_212D]);
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    cpu.step(&mut bus);
    // Store-conditional fails: EQ clear, memory untouched.
    assert_eq!(cpu.cr_field(0) & 0b0010, 0);
    assert_eq!(&bus.mem[0x8000..0x8004], &[0, 0, 0, 0]);
}

#[test]
fn stwcx_without_reservation_fails() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[4] = 0x8000;
    cpu.gpr[5] = 77;
    bus.load_words(0, &[0x7CA0_212D]);
    cpu.step(&mut bus);
    assert_eq!(cpu.cr_field(0) & 0b0010, 0);
}

#[test]
fn string_word_loads_pack_big_endian() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[4] = 0x8000;
    bus.load(0x8000, &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
    // lswi r5,r4,5 : 5 bytes into r5 and the top byte of r6
    bus.load_words(0, &[0x7CA4_2CAA]);
    cpu.step(&mut bus);
    assert_eq!(cpu.gpr[5], 0xAABB_CCDD);
    assert_eq!(cpu.gpr[6], 0xEE00_0000);
}

#[test]
fn dcbz_zeroes_the_cache_block() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.gpr[4] = 0x8010; // inside a 32-byte block
    bus.load(0x8000, &[0xFF; 0x40]);
    // dcbz 0,r4
    bus.load_words(0, &[0x7C00_27EC]);
    cpu.step(&mut bus);
    assert_eq!(&bus.mem[0x8000..0x8020], &[0u8; 32]);
    assert_eq!(bus.mem[0x8020], 0xFF);
}
