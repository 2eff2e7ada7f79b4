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
fn unconditional_branch_relative_and_link() {
    let mut cpu = ppc_at(0x1000);
    let mut bus = TestBus::new();
    // b +0x100
    bus.load_words(0x1000, &[0x4800_0100]);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x1100);

    // bl +0x20 at 0x1100
    bus.load_words(0x1100, &[0x4800_0021]);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x1120);
    assert_eq!(cpu.lr, 0x1104);
}

#[test]
fn branch_absolute_and_backward() {
    let mut cpu = ppc_at(0x2000);
    let mut bus = TestBus::new();
    // ba 0x500 (AA set)
    bus.load_words(0x2000, &[0x4800_0502]);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x500);

    // b -8 at 0x500
    bus.load_words(0x500, &[0x4BFF_FFF8]);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x4F8);
}

#[test]
fn bc_decrement_ctr_one_does_not_branch() {
    // BO = 16 (decrement CTR, branch if CTR != 0), CTR = 1:
    // decrements to 0 and falls through.
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.ctr = 1;
    bus.load_words(0, &[0x4200_0010]); // bdnz +0x10
    cpu.step(&mut bus);
    assert_eq!(cpu.ctr, 0);
    assert_eq!(cpu.pc, 4);
}

#[test]
fn bc_decrement_ctr_two_branches() {
    // Same encoding with CTR = 2: decrements to 1 and branches.
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.ctr = 2;
    bus.load_words(0, &[0x4200_0010]);
    cpu.step(&mut bus);
    assert_eq!(cpu.ctr, 1);
    assert_eq!(cpu.pc, 0x10);
}

#[test]
fn bc_true_and_false_cr_conditions() {
    // beq (BO=12, BI=2) taken when CR0[EQ] set.
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.set_cr_field(0, 0b0010);
    bus.load_words(0, &[0x4182_0020]); // beq +0x20
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x20);

    // bne (BO=4, BI=2) not taken when EQ set.
    let mut cpu = ppc_at(0);
    cpu.set_cr_field(0, 0b0010);
    bus.load_words(0, &[0x4082_0020]);
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 4);
}

#[test]
fn bclr_returns_through_lr() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.lr = 0x3000;
    bus.load_words(0, &[0x4E80_0020]); // blr
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x3000);
}

#[test]
fn bcctr_jumps_through_ctr() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.ctr = 0x4000;
    bus.load_words(0, &[0x4E80_0420]); // bctr
    cpu.step(&mut bus);
    assert_eq!(cpu.pc, 0x4000);
}

#[test]
fn bdnz_loop_counts_down() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.ctr = 5;
    cpu.gpr[3] = 0;
    // addi r3,r3,1 ; bdnz -4
    bus.load_words(0, &[0x3863_0001, 0x4200_FFFC]);
    let mut guard = 0;
    while cpu.pc < 8 && guard < 100 {
        cpu.step(&mut bus);
        guard += 1;
    }
    // Loop body runs five times.
    assert_eq!(cpu.gpr[3], 5);
    assert_eq!(cpu.ctr, 0);
}

#[test]
fn cr_logic_ops_combine_bits() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    // CR0 = LT, CR1 = GT.
    cpu.set_cr_field(0, 0b1000);
    cpu.set_cr_field(1, 0b0100);
    // cror 8, 0, 5  (CR2[LT] = CR0[LT] | CR1[GT])
    bus.load_words(0, &[0x4D00_2B82]);
    cpu.step(&mut bus);
    assert!(cpu.cr_bit(8));

    // crand 9, 0, 2 (CR2[GT] = CR0[LT] & CR0[EQ]) -> false
    bus.load_words(4, &[0x4D20_1202]);
    cpu.step(&mut bus);
    assert!(!cpu.cr_bit(9));
}

#[test]
fn mcrf_copies_fields() {
    let mut cpu = ppc_at(0);
    let mut bus = TestBus::new();
    cpu.set_cr_field(3, 0b1010);
    // mcrf cr5,cr3
    bus.load_words(0, &[0x4E8C_0000]);
    cpu.step(&mut bus);
    assert_eq!(cpu.cr_field(5), 0b1010);
}
