//! PowerPC integer, branch, load/store, and system instruction execution.
//! FP arithmetic lives in `fpu.rs`, translation in `mmu.rs`.

use super::decode;
use super::mmu::DSISR_STORE;
use super::{
    Fault, MSR_FP, MSR_POW, MSR_PR, Ppc, SPR_CTR, SPR_DAR, SPR_DBAT0U, SPR_DCMP,
    SPR_DEC, SPR_DMISS, SPR_DSISR, SPR_EAR, SPR_HASH1, SPR_HASH2, SPR_HID0, SPR_HID1,
    SPR_IABR, SPR_IBAT0U, SPR_ICMP, SPR_IMISS, SPR_LR, SPR_PVR, SPR_RPA, SPR_SDR1,
    SPR_SPRG0, SPR_SRR0, SPR_SRR1, SPR_TBL_READ, SPR_TBL_WRITE, SPR_TBU_READ,
    SPR_TBU_WRITE, SPR_XER, VEC_DSI, VEC_FP_UNAVAILABLE, VEC_PROGRAM, VEC_SYSCALL, XER_CA,
    XER_SO,
};
use crate::core::bus::Bus;

// SRR1 program-exception reason bits.
const SRR1_ILLEGAL: u32 = 0x0008_0000;
const SRR1_TRAP: u32 = 0x0002_0000;
const SRR1_PRIVILEGED: u32 = 0x0004_0000;

#[inline]
fn rt(op: u32) -> usize {
    ((op >> 21) & 31) as usize
}
#[inline]
fn ra(op: u32) -> usize {
    ((op >> 16) & 31) as usize
}
#[inline]
fn rb(op: u32) -> usize {
    ((op >> 11) & 31) as usize
}
#[inline]
fn simm(op: u32) -> u32 {
    op as i16 as i32 as u32
}
#[inline]
fn uimm(op: u32) -> u32 {
    op & 0xFFFF
}
#[inline]
fn rc(op: u32) -> bool {
    op & 1 != 0
}
#[inline]
fn oe(op: u32) -> bool {
    op & 0x400 != 0
}

/// Generate the rotate mask for MB..ME in big-endian bit numbering.
#[inline]
fn mask32(mb: u32, me: u32) -> u32 {
    let x = 0xFFFF_FFFFu32 >> mb;
    let y = 0xFFFF_FFFFu32 << (31 - me);
    if mb <= me { x & y } else { x | y }
}

impl Ppc {
    // ----- data access with translation ------------------------------------

    fn dsi(&mut self, ea: u32, pc: u32, fault: Fault, write: bool) {
        self.dar = ea;
        self.dsisr = fault.dsisr | if write { DSISR_STORE } else { 0 };
        self.log_guest_fault("data access fault", pc, ea);
        self.exception(VEC_DSI, pc, 0);
    }

    pub(super) fn load8<B: Bus>(&mut self, bus: &mut B, ea: u32, pc: u32) -> Option<u32> {
        match self.translate_data(ea, false) {
            Ok(pa) => Some(bus.read8(pa) as u32),
            Err(f) => {
                self.dsi(ea, pc, f, false);
                None
            }
        }
    }

    pub(super) fn load16<B: Bus>(&mut self, bus: &mut B, ea: u32, pc: u32) -> Option<u32> {
        match self.translate_data(ea, false) {
            Ok(pa) => Some(bus.read16(pa) as u32),
            Err(f) => {
                self.dsi(ea, pc, f, false);
                None
            }
        }
    }

    pub(super) fn load32<B: Bus>(&mut self, bus: &mut B, ea: u32, pc: u32) -> Option<u32> {
        match self.translate_data(ea, false) {
            Ok(pa) => Some(bus.read32(pa)),
            Err(f) => {
                self.dsi(ea, pc, f, false);
                None
            }
        }
    }

    pub(super) fn load64<B: Bus>(&mut self, bus: &mut B, ea: u32, pc: u32) -> Option<u64> {
        match self.translate_data(ea, false) {
            Ok(pa) => Some(bus.read64(pa)),
            Err(f) => {
                self.dsi(ea, pc, f, false);
                None
            }
        }
    }

    pub(super) fn store8<B: Bus>(&mut self, bus: &mut B, ea: u32, v: u32, pc: u32) -> bool {
        match self.translate_data(ea, true) {
            Ok(pa) => {
                self.clear_reservation_on_store(ea);
                bus.write8(pa, v as u8);
                true
            }
            Err(f) => {
                self.dsi(ea, pc, f, true);
                false
            }
        }
    }

    pub(super) fn store16<B: Bus>(&mut self, bus: &mut B, ea: u32, v: u32, pc: u32) -> bool {
        match self.translate_data(ea, true) {
            Ok(pa) => {
                self.clear_reservation_on_store(ea);
                bus.write16(pa, v as u16);
                true
            }
            Err(f) => {
                self.dsi(ea, pc, f, true);
                false
            }
        }
    }

    pub(super) fn store32<B: Bus>(&mut self, bus: &mut B, ea: u32, v: u32, pc: u32) -> bool {
        match self.translate_data(ea, true) {
            Ok(pa) => {
                self.clear_reservation_on_store(ea);
                bus.write32(pa, v);
                true
            }
            Err(f) => {
                self.dsi(ea, pc, f, true);
                false
            }
        }
    }

    pub(super) fn store64<B: Bus>(&mut self, bus: &mut B, ea: u32, v: u64, pc: u32) -> bool {
        match self.translate_data(ea, true) {
            Ok(pa) => {
                self.clear_reservation_on_store(ea);
                bus.write64(pa, v);
                true
            }
            Err(f) => {
                self.dsi(ea, pc, f, true);
                false
            }
        }
    }

    /// A store into the reserved 8-byte granule kills the reservation.
    fn clear_reservation_on_store(&mut self, ea: u32) {
        if self.reservation == Some(ea & !7) {
            self.reservation = None;
        }
    }

    #[inline]
    fn ea_index(&self, op: u32) -> u32 {
        let base = if ra(op) == 0 { 0 } else { self.gpr[ra(op)] };
        base.wrapping_add(self.gpr[rb(op)])
    }

    #[inline]
    fn ea_disp(&self, op: u32) -> u32 {
        let base = if ra(op) == 0 { 0 } else { self.gpr[ra(op)] };
        base.wrapping_add(simm(op))
    }

    // ----- arithmetic helpers ----------------------------------------------

    /// Shared add path: result, optional CA, optional OV, optional CR0.
    fn do_add(&mut self, op: u32, a: u32, b: u32, carry_in: u32, set_ca: bool) -> u32 {
        let wide = a as u64 + b as u64 + carry_in as u64;
        let result = wide as u32;
        if set_ca {
            self.set_carry(wide > 0xFFFF_FFFF);
        }
        if oe(op) {
            let ov = (!(a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
            self.set_overflow(ov);
        }
        if rc(op) {
            self.record_cr0(result);
        }
        result
    }

    fn compare_signed(&mut self, field: u32, a: i32, b: i32) {
        let mut bits = match a.cmp(&b) {
            std::cmp::Ordering::Less => 0b1000,
            std::cmp::Ordering::Greater => 0b0100,
            std::cmp::Ordering::Equal => 0b0010,
        };
        if self.xer & XER_SO != 0 {
            bits |= 1;
        }
        self.set_cr_field(field, bits);
    }

    fn compare_unsigned(&mut self, field: u32, a: u32, b: u32) {
        let mut bits = match a.cmp(&b) {
            std::cmp::Ordering::Less => 0b1000,
            std::cmp::Ordering::Greater => 0b0100,
            std::cmp::Ordering::Equal => 0b0010,
        };
        if self.xer & XER_SO != 0 {
            bits |= 1;
        }
        self.set_cr_field(field, bits);
    }

    /// Conditional-branch BO/BI evaluation, including CTR decrement.
    fn branch_condition(&mut self, bo: u32, bi: u32) -> bool {
        let ctr_ok = if bo & 4 != 0 {
            true
        } else {
            self.ctr = self.ctr.wrapping_sub(1);
            if bo & 2 != 0 { self.ctr == 0 } else { self.ctr != 0 }
        };
        let cond_ok = bo & 16 != 0 || self.cr_bit(bi) == (bo & 8 != 0);
        ctr_ok && cond_ok
    }

    fn trap_condition(&self, to: u32, a: u32, b: u32) -> bool {
        let (sa, sb) = (a as i32, b as i32);
        (to & 16 != 0 && sa < sb)
            || (to & 8 != 0 && sa > sb)
            || (to & 4 != 0 && a == b)
            || (to & 2 != 0 && a < b)
            || (to & 1 != 0 && a > b)
    }

    fn program_exception(&mut self, op: u32, pc: u32, reason: u32) -> u64 {
        let what = match decode::lookup(op) {
            Some(desc) => desc.mnemonic,
            None => "undefined opcode",
        };
        self.log_guest_fault(what, pc, op);
        self.exception(VEC_PROGRAM, pc, reason);
        1
    }

    // ----- dispatch ---------------------------------------------------------

    pub(crate) fn execute<B: Bus>(&mut self, bus: &mut B, op: u32, pc: u32) -> u64 {
        match op >> 26 {
            3 => {
                // twi
                if self.trap_condition((op >> 21) & 31, self.gpr[ra(op)], simm(op)) {
                    self.exception(VEC_PROGRAM, pc, SRR1_TRAP);
                }
                1
            }
            7 => {
                // mulli
                self.gpr[rt(op)] =
                    (self.gpr[ra(op)] as i32).wrapping_mul(simm(op) as i32) as u32;
                3
            }
            8 => {
                // subfic
                let a = self.gpr[ra(op)];
                let wide = (!a) as u64 + simm(op) as u64 + 1;
                self.gpr[rt(op)] = wide as u32;
                self.set_carry(wide > 0xFFFF_FFFF);
                1
            }
            10 => {
                // cmpli
                self.compare_unsigned((op >> 23) & 7, self.gpr[ra(op)], uimm(op));
                1
            }
            11 => {
                // cmpi
                self.compare_signed((op >> 23) & 7, self.gpr[ra(op)] as i32, simm(op) as i32);
                1
            }
            12 | 13 => {
                // addic / addic.
                let a = self.gpr[ra(op)];
                let wide = a as u64 + simm(op) as u64;
                let result = wide as u32;
                self.gpr[rt(op)] = result;
                self.set_carry(wide > 0xFFFF_FFFF);
                if op >> 26 == 13 {
                    self.record_cr0(result);
                }
                1
            }
            14 => {
                // addi
                let base = if ra(op) == 0 { 0 } else { self.gpr[ra(op)] };
                self.gpr[rt(op)] = base.wrapping_add(simm(op));
                1
            }
            15 => {
                // addis
                let base = if ra(op) == 0 { 0 } else { self.gpr[ra(op)] };
                self.gpr[rt(op)] = base.wrapping_add(simm(op) << 16);
                1
            }
            16 => {
                // bc
                let bo = (op >> 21) & 31;
                let bi = (op >> 16) & 31;
                let taken = self.branch_condition(bo, bi);
                if op & 1 != 0 {
                    self.lr = pc.wrapping_add(4);
                }
                if taken {
                    let bd = (op & 0xFFFC) as i16 as i32 as u32;
                    self.pc = if op & 2 != 0 { bd } else { pc.wrapping_add(bd) };
                }
                1
            }
            17 => {
                // sc
                self.exception(VEC_SYSCALL, pc.wrapping_add(4), 0);
                1
            }
            18 => {
                // b
                let li = ((op & 0x03FF_FFFC) as i32) << 6 >> 6;
                if op & 1 != 0 {
                    self.lr = pc.wrapping_add(4);
                }
                self.pc = if op & 2 != 0 { li as u32 } else { pc.wrapping_add(li as u32) };
                1
            }
            19 => self.execute_op19(op, pc),
            20 => {
                // rlwimi
                let sh = (op >> 11) & 31;
                let m = mask32((op >> 6) & 31, (op >> 1) & 31);
                let r = self.gpr[rt(op)].rotate_left(sh);
                let result = (r & m) | (self.gpr[ra(op)] & !m);
                self.gpr[ra(op)] = result;
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }
            21 => {
                // rlwinm
                let sh = (op >> 11) & 31;
                let m = mask32((op >> 6) & 31, (op >> 1) & 31);
                let result = self.gpr[rt(op)].rotate_left(sh) & m;
                self.gpr[ra(op)] = result;
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }
            23 => {
                // rlwnm
                let sh = self.gpr[rb(op)] & 31;
                let m = mask32((op >> 6) & 31, (op >> 1) & 31);
                let result = self.gpr[rt(op)].rotate_left(sh) & m;
                self.gpr[ra(op)] = result;
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }
            24 => {
                self.gpr[ra(op)] = self.gpr[rt(op)] | uimm(op);
                1
            }
            25 => {
                self.gpr[ra(op)] = self.gpr[rt(op)] | (uimm(op) << 16);
                1
            }
            26 => {
                self.gpr[ra(op)] = self.gpr[rt(op)] ^ uimm(op);
                1
            }
            27 => {
                self.gpr[ra(op)] = self.gpr[rt(op)] ^ (uimm(op) << 16);
                1
            }
            28 => {
                let result = self.gpr[rt(op)] & uimm(op);
                self.gpr[ra(op)] = result;
                self.record_cr0(result);
                1
            }
            29 => {
                let result = self.gpr[rt(op)] & (uimm(op) << 16);
                self.gpr[ra(op)] = result;
                self.record_cr0(result);
                1
            }
            31 => self.execute_op31(bus, op, pc),
            32 | 33 => {
                // lwz / lwzu
                let ea = self.ea_disp(op);
                if let Some(v) = self.load32(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                    if op >> 26 == 33 {
                        self.gpr[ra(op)] = ea;
                    }
                }
                1
            }
            34 | 35 => {
                // lbz / lbzu
                let ea = self.ea_disp(op);
                if let Some(v) = self.load8(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                    if op >> 26 == 35 {
                        self.gpr[ra(op)] = ea;
                    }
                }
                1
            }
            36 | 37 => {
                // stw / stwu
                let ea = self.ea_disp(op);
                if self.store32(bus, ea, self.gpr[rt(op)], pc) && op >> 26 == 37 {
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            38 | 39 => {
                // stb / stbu
                let ea = self.ea_disp(op);
                if self.store8(bus, ea, self.gpr[rt(op)], pc) && op >> 26 == 39 {
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            40 | 41 => {
                // lhz / lhzu
                let ea = self.ea_disp(op);
                if let Some(v) = self.load16(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                    if op >> 26 == 41 {
                        self.gpr[ra(op)] = ea;
                    }
                }
                1
            }
            42 | 43 => {
                // lha / lhau
                let ea = self.ea_disp(op);
                if let Some(v) = self.load16(bus, ea, pc) {
                    self.gpr[rt(op)] = v as u16 as i16 as u32;
                    if op >> 26 == 43 {
                        self.gpr[ra(op)] = ea;
                    }
                }
                1
            }
            44 | 45 => {
                // sth / sthu
                let ea = self.ea_disp(op);
                if self.store16(bus, ea, self.gpr[rt(op)], pc) && op >> 26 == 45 {
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            46 => {
                // lmw
                let mut ea = self.ea_disp(op);
                let first = rt(op);
                for r in first..32 {
                    match self.load32(bus, ea, pc) {
                        Some(v) => self.gpr[r] = v,
                        None => return 1,
                    }
                    ea = ea.wrapping_add(4);
                }
                2 + (32 - first) as u64
            }
            47 => {
                // stmw
                let mut ea = self.ea_disp(op);
                let first = rt(op);
                for r in first..32 {
                    if !self.store32(bus, ea, self.gpr[r], pc) {
                        return 1;
                    }
                    ea = ea.wrapping_add(4);
                }
                2 + (32 - first) as u64
            }
            48..=55 => self.execute_fp_load_store(bus, op, pc),
            59 => {
                if self.msr & MSR_FP == 0 {
                    self.exception(VEC_FP_UNAVAILABLE, pc, 0);
                    return 1;
                }
                self.execute_fp_single(op, pc)
            }
            63 => {
                if self.msr & MSR_FP == 0 {
                    self.exception(VEC_FP_UNAVAILABLE, pc, 0);
                    return 1;
                }
                self.execute_fp_double(op, pc)
            }
            _ => self.program_exception(op, pc, SRR1_ILLEGAL),
        }
    }

    fn execute_op19(&mut self, op: u32, pc: u32) -> u64 {
        match (op >> 1) & 0x3FF {
            0 => {
                // mcrf
                let src = (op >> 18) & 7;
                let v = self.cr_field(src);
                self.set_cr_field((op >> 23) & 7, v);
                1
            }
            16 => {
                // bclr
                let taken = self.branch_condition((op >> 21) & 31, (op >> 16) & 31);
                let target = self.lr & !3;
                if op & 1 != 0 {
                    self.lr = pc.wrapping_add(4);
                }
                if taken {
                    self.pc = target;
                }
                1
            }
            528 => {
                // bcctr
                let taken = self.branch_condition((op >> 21) & 31, (op >> 16) & 31);
                if op & 1 != 0 {
                    self.lr = pc.wrapping_add(4);
                }
                if taken {
                    self.pc = self.ctr & !3;
                }
                1
            }
            50 => {
                // rfi
                if self.msr & MSR_PR != 0 {
                    return self.program_exception(op, pc, SRR1_PRIVILEGED);
                }
                self.msr = (self.msr & 0xFFFF_0000) | (self.srr1 & 0x0000_FFFF);
                self.msr &= !MSR_POW;
                self.pc = self.srr0 & !3;
                1
            }
            150 => 1, // isync
            33 | 129 | 193 | 225 | 257 | 289 | 417 | 449 => {
                // CR-bit logic ops
                let ba = self.cr_bit((op >> 16) & 31);
                let bb = self.cr_bit((op >> 11) & 31);
                let result = match (op >> 1) & 0x3FF {
                    33 => !(ba | bb),  // crnor
                    129 => ba & !bb,   // crandc
                    193 => ba ^ bb,    // crxor
                    225 => !(ba & bb), // crnand
                    257 => ba & bb,    // crand
                    289 => ba == bb,   // creqv
                    417 => ba | !bb,   // crorc
                    _ => ba | bb,      // cror
                };
                self.set_cr_bit((op >> 21) & 31, result);
                1
            }
            _ => self.program_exception(op, pc, SRR1_ILLEGAL),
        }
    }

    fn execute_op31<B: Bus>(&mut self, bus: &mut B, op: u32, pc: u32) -> u64 {
        let xo = (op >> 1) & 0x3FF;
        match xo {
            0 => {
                // cmp
                self.compare_signed(
                    (op >> 23) & 7,
                    self.gpr[ra(op)] as i32,
                    self.gpr[rb(op)] as i32,
                );
                1
            }
            32 => {
                self.compare_unsigned((op >> 23) & 7, self.gpr[ra(op)], self.gpr[rb(op)]);
                1
            }
            4 => {
                // tw
                if self.trap_condition((op >> 21) & 31, self.gpr[ra(op)], self.gpr[rb(op)]) {
                    self.exception(VEC_PROGRAM, pc, SRR1_TRAP);
                }
                1
            }

            // Adds and subtracts (the +512 twins are the OE forms).
            266 | 778 => {
                let r = self.do_add(op, self.gpr[ra(op)], self.gpr[rb(op)], 0, false);
                self.gpr[rt(op)] = r;
                1
            }
            10 | 522 => {
                let r = self.do_add(op, self.gpr[ra(op)], self.gpr[rb(op)], 0, true);
                self.gpr[rt(op)] = r;
                1
            }
            138 | 650 => {
                let c = (self.xer & XER_CA != 0) as u32;
                let r = self.do_add(op, self.gpr[ra(op)], self.gpr[rb(op)], c, true);
                self.gpr[rt(op)] = r;
                1
            }
            234 | 746 => {
                // addme
                let c = (self.xer & XER_CA != 0) as u32;
                let r = self.do_add(op, self.gpr[ra(op)], 0xFFFF_FFFF, c, true);
                self.gpr[rt(op)] = r;
                1
            }
            202 | 714 => {
                // addze
                let c = (self.xer & XER_CA != 0) as u32;
                let r = self.do_add(op, self.gpr[ra(op)], 0, c, true);
                self.gpr[rt(op)] = r;
                1
            }
            40 | 552 => {
                // subf
                let r = self.do_add(op, !self.gpr[ra(op)], self.gpr[rb(op)], 1, false);
                self.gpr[rt(op)] = r;
                1
            }
            8 | 520 => {
                // subfc
                let r = self.do_add(op, !self.gpr[ra(op)], self.gpr[rb(op)], 1, true);
                self.gpr[rt(op)] = r;
                1
            }
            136 | 648 => {
                // subfe
                let c = (self.xer & XER_CA != 0) as u32;
                let r = self.do_add(op, !self.gpr[ra(op)], self.gpr[rb(op)], c, true);
                self.gpr[rt(op)] = r;
                1
            }
            232 | 744 => {
                // subfme
                let c = (self.xer & XER_CA != 0) as u32;
                let r = self.do_add(op, !self.gpr[ra(op)], 0xFFFF_FFFF, c, true);
                self.gpr[rt(op)] = r;
                1
            }
            200 | 712 => {
                // subfze
                let c = (self.xer & XER_CA != 0) as u32;
                let r = self.do_add(op, !self.gpr[ra(op)], 0, c, true);
                self.gpr[rt(op)] = r;
                1
            }
            104 | 616 => {
                // neg
                let a = self.gpr[ra(op)];
                let result = (!a).wrapping_add(1);
                self.gpr[rt(op)] = result;
                if oe(op) {
                    self.set_overflow(a == 0x8000_0000);
                }
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }

            // Multiplies and divides.
            235 | 747 => {
                let a = self.gpr[ra(op)];
                let b = self.gpr[rb(op)];
                let wide = (a as i32 as i64).wrapping_mul(b as i32 as i64);
                let result = wide as u32;
                self.gpr[rt(op)] = result;
                if oe(op) {
                    self.set_overflow(wide != result as i32 as i64);
                }
                if rc(op) {
                    self.record_cr0(result);
                }
                5
            }
            75 => {
                let r = ((self.gpr[ra(op)] as i32 as i64 * self.gpr[rb(op)] as i32 as i64)
                    >> 32) as u32;
                self.gpr[rt(op)] = r;
                if rc(op) {
                    self.record_cr0(r);
                }
                5
            }
            11 => {
                let r = ((self.gpr[ra(op)] as u64 * self.gpr[rb(op)] as u64) >> 32) as u32;
                self.gpr[rt(op)] = r;
                if rc(op) {
                    self.record_cr0(r);
                }
                5
            }
            491 | 1003 => {
                // divw
                let a = self.gpr[ra(op)] as i32;
                let b = self.gpr[rb(op)] as i32;
                let invalid = b == 0 || (a == i32::MIN && b == -1);
                let result = if invalid { 0 } else { (a / b) as u32 };
                self.gpr[rt(op)] = result;
                if oe(op) {
                    self.set_overflow(invalid);
                }
                if rc(op) {
                    self.record_cr0(result);
                }
                37
            }
            459 | 971 => {
                // divwu
                let a = self.gpr[ra(op)];
                let b = self.gpr[rb(op)];
                let result = if b == 0 { 0 } else { a / b };
                self.gpr[rt(op)] = result;
                if oe(op) {
                    self.set_overflow(b == 0);
                }
                if rc(op) {
                    self.record_cr0(result);
                }
                37
            }

            // Logical ops (rS is the rt field, destination is rA).
            28 | 60 | 284 | 124 | 444 | 412 | 316 | 476 => {
                let s = self.gpr[rt(op)];
                let b = self.gpr[rb(op)];
                let result = match xo {
                    28 => s & b,
                    60 => s & !b,
                    284 => !(s ^ b),
                    124 => !(s | b),
                    444 => s | b,
                    412 => s | !b,
                    316 => s ^ b,
                    _ => !(s & b),
                };
                self.gpr[ra(op)] = result;
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }
            26 => {
                let result = self.gpr[rt(op)].leading_zeros();
                self.gpr[ra(op)] = result;
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }
            954 => {
                let result = self.gpr[rt(op)] as u8 as i8 as u32;
                self.gpr[ra(op)] = result;
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }
            922 => {
                let result = self.gpr[rt(op)] as u16 as i16 as u32;
                self.gpr[ra(op)] = result;
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }

            // Shifts.
            24 => {
                let sh = self.gpr[rb(op)] & 63;
                let result = if sh > 31 { 0 } else { self.gpr[rt(op)] << sh };
                self.gpr[ra(op)] = result;
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }
            536 => {
                let sh = self.gpr[rb(op)] & 63;
                let result = if sh > 31 { 0 } else { self.gpr[rt(op)] >> sh };
                self.gpr[ra(op)] = result;
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }
            792 => {
                // sraw
                let sh = self.gpr[rb(op)] & 63;
                let s = self.gpr[rt(op)] as i32;
                let (result, carry) = if sh > 31 {
                    ((s >> 31) as u32, s < 0)
                } else {
                    let r = (s >> sh) as u32;
                    let lost = sh != 0 && s < 0 && (s as u32) << (32 - sh) != 0;
                    (r, lost)
                };
                self.gpr[ra(op)] = result;
                self.set_carry(carry);
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }
            824 => {
                // srawi
                let sh = (op >> 11) & 31;
                let s = self.gpr[rt(op)] as i32;
                let result = (s >> sh) as u32;
                let carry = sh != 0 && s < 0 && (s as u32) << (32 - sh) != 0;
                self.gpr[ra(op)] = result;
                self.set_carry(carry);
                if rc(op) {
                    self.record_cr0(result);
                }
                1
            }

            // Condition/system register moves.
            19 => {
                self.gpr[rt(op)] = self.cr;
                1
            }
            144 => {
                // mtcrf
                let crm = (op >> 12) & 0xFF;
                let mut mask = 0u32;
                for i in 0..8 {
                    if crm & (0x80 >> i) != 0 {
                        mask |= 0xF000_0000 >> (4 * i);
                    }
                }
                self.cr = (self.cr & !mask) | (self.gpr[rt(op)] & mask);
                1
            }
            512 => {
                // mcrxr
                self.set_cr_field((op >> 23) & 7, self.xer >> 28);
                self.xer &= 0x0FFF_FFFF;
                1
            }
            83 => {
                self.gpr[rt(op)] = self.msr;
                1
            }
            146 => {
                if self.msr & MSR_PR != 0 {
                    return self.program_exception(op, pc, SRR1_PRIVILEGED);
                }
                self.msr = self.gpr[rt(op)];
                1
            }
            339 => self.mfspr(op, pc),
            467 => self.mtspr(op, pc),
            371 => {
                // mftb
                let spr = ((op >> 16) & 0x1F) | (((op >> 11) & 0x1F) << 5);
                self.gpr[rt(op)] = match spr {
                    SPR_TBU_READ => (self.tb >> 32) as u32,
                    _ => self.tb as u32,
                };
                1
            }
            595 => {
                self.gpr[rt(op)] = self.sr[((op >> 16) & 0xF) as usize];
                1
            }
            659 => {
                self.gpr[rt(op)] = self.sr[(self.gpr[rb(op)] >> 28) as usize];
                1
            }
            210 => {
                self.sr[((op >> 16) & 0xF) as usize] = self.gpr[rt(op)];
                1
            }
            242 => {
                self.sr[(self.gpr[rb(op)] >> 28) as usize] = self.gpr[rt(op)];
                1
            }

            // Loads.
            23 => {
                let ea = self.ea_index(op);
                if let Some(v) = self.load32(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                }
                1
            }
            55 => {
                let ea = self.ea_index(op);
                if let Some(v) = self.load32(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            87 => {
                let ea = self.ea_index(op);
                if let Some(v) = self.load8(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                }
                1
            }
            119 => {
                let ea = self.ea_index(op);
                if let Some(v) = self.load8(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            279 => {
                let ea = self.ea_index(op);
                if let Some(v) = self.load16(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                }
                1
            }
            311 => {
                let ea = self.ea_index(op);
                if let Some(v) = self.load16(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            343 => {
                let ea = self.ea_index(op);
                if let Some(v) = self.load16(bus, ea, pc) {
                    self.gpr[rt(op)] = v as u16 as i16 as u32;
                }
                1
            }
            375 => {
                let ea = self.ea_index(op);
                if let Some(v) = self.load16(bus, ea, pc) {
                    self.gpr[rt(op)] = v as u16 as i16 as u32;
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            790 => {
                // lhbrx
                let ea = self.ea_index(op);
                if let Some(v) = self.load16(bus, ea, pc) {
                    self.gpr[rt(op)] = (v as u16).swap_bytes() as u32;
                }
                1
            }
            534 => {
                // lwbrx
                let ea = self.ea_index(op);
                if let Some(v) = self.load32(bus, ea, pc) {
                    self.gpr[rt(op)] = v.swap_bytes();
                }
                1
            }
            20 => {
                // lwarx
                let ea = self.ea_index(op);
                if let Some(v) = self.load32(bus, ea, pc) {
                    self.gpr[rt(op)] = v;
                    self.reservation = Some(ea & !7);
                }
                1
            }
            533 | 597 => {
                // lswx / lswi
                let (ea, count) = if xo == 533 {
                    (self.ea_index(op), self.xer & 0x7F)
                } else {
                    let base = if ra(op) == 0 { 0 } else { self.gpr[ra(op)] };
                    let nb = (op >> 11) & 31;
                    (base, if nb == 0 { 32 } else { nb })
                };
                let mut reg = rt(op);
                let mut shift = 24;
                let mut addr = ea;
                for _ in 0..count {
                    let Some(byte) = self.load8(bus, addr, pc) else {
                        return 1;
                    };
                    if shift == 24 {
                        self.gpr[reg] = 0;
                    }
                    self.gpr[reg] |= byte << shift;
                    if shift == 0 {
                        shift = 24;
                        reg = (reg + 1) & 31;
                    } else {
                        shift -= 8;
                    }
                    addr = addr.wrapping_add(1);
                }
                2 + count as u64 / 4
            }

            // Stores.
            151 => {
                let ea = self.ea_index(op);
                self.store32(bus, ea, self.gpr[rt(op)], pc);
                1
            }
            183 => {
                let ea = self.ea_index(op);
                if self.store32(bus, ea, self.gpr[rt(op)], pc) {
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            215 => {
                let ea = self.ea_index(op);
                self.store8(bus, ea, self.gpr[rt(op)], pc);
                1
            }
            247 => {
                let ea = self.ea_index(op);
                if self.store8(bus, ea, self.gpr[rt(op)], pc) {
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            407 => {
                let ea = self.ea_index(op);
                self.store16(bus, ea, self.gpr[rt(op)], pc);
                1
            }
            439 => {
                let ea = self.ea_index(op);
                if self.store16(bus, ea, self.gpr[rt(op)], pc) {
                    self.gpr[ra(op)] = ea;
                }
                1
            }
            918 => {
                let ea = self.ea_index(op);
                self.store16(bus, ea, (self.gpr[rt(op)] as u16).swap_bytes() as u32, pc);
                1
            }
            662 => {
                let ea = self.ea_index(op);
                self.store32(bus, ea, self.gpr[rt(op)].swap_bytes(), pc);
                1
            }
            150 => {
                // stwcx.
                let ea = self.ea_index(op);
                let reserved = self.reservation == Some(ea & !7);
                let mut bits = if self.xer & XER_SO != 0 { 1 } else { 0 };
                if reserved {
                    if self.store32(bus, ea, self.gpr[rt(op)], pc) {
                        bits |= 0b0010;
                    }
                }
                self.reservation = None;
                self.set_cr_field(0, bits);
                1
            }
            661 | 725 => {
                // stswx / stswi
                let (ea, count) = if xo == 661 {
                    (self.ea_index(op), self.xer & 0x7F)
                } else {
                    let base = if ra(op) == 0 { 0 } else { self.gpr[ra(op)] };
                    let nb = (op >> 11) & 31;
                    (base, if nb == 0 { 32 } else { nb })
                };
                let mut reg = rt(op);
                let mut shift = 24;
                let mut addr = ea;
                for _ in 0..count {
                    let byte = (self.gpr[reg] >> shift) & 0xFF;
                    if !self.store8(bus, addr, byte, pc) {
                        return 1;
                    }
                    if shift == 0 {
                        shift = 24;
                        reg = (reg + 1) & 31;
                    } else {
                        shift -= 8;
                    }
                    addr = addr.wrapping_add(1);
                }
                2 + count as u64 / 4
            }

            // FP indexed loads/stores.
            535 | 567 | 599 | 631 | 663 | 695 | 727 | 759 | 983 => {
                self.execute_fp_indexed(bus, op, xo, pc)
            }

            // Cache and synchronization: no-ops at this level, except dcbz
            // which architecturally zeroes the 32-byte block.
            1014 => {
                let ea = self.ea_index(op) & !31;
                for i in 0..8 {
                    if !self.store32(bus, ea.wrapping_add(i * 4), 0, pc) {
                        return 1;
                    }
                }
                1
            }
            54 | 86 | 246 | 278 | 470 | 758 | 982 | 598 | 854 => 1,

            // TLB management.
            306 => {
                self.tlb.invalidate(self.gpr[rb(op)] >> 12);
                1
            }
            370 => {
                self.tlb.invalidate_all();
                1
            }
            566 => 1, // tlbsync
            978 => {
                // tlbld: install data translation from the miss SPRs.
                let ea = self.gpr[rb(op)];
                self.tlb.install(ea >> 12, self.rpa >> 12, true);
                1
            }
            1010 => {
                // tlbli
                let ea = self.gpr[rb(op)];
                self.tlb.install(ea >> 12, self.rpa >> 12, true);
                1
            }

            310 | 438 => {
                // eciwx/ecowx: external control is not wired on this
                // hardware; treated as illegal.
                self.program_exception(op, pc, SRR1_ILLEGAL)
            }
            _ => self.program_exception(op, pc, SRR1_ILLEGAL),
        }
    }

    fn mfspr(&mut self, op: u32, pc: u32) -> u64 {
        let spr = ((op >> 16) & 0x1F) | (((op >> 11) & 0x1F) << 5);
        let value = match spr {
            SPR_XER => self.xer,
            SPR_LR => self.lr,
            SPR_CTR => self.ctr,
            SPR_DSISR => self.dsisr,
            SPR_DAR => self.dar,
            SPR_DEC => self.dec,
            SPR_SDR1 => self.sdr1,
            SPR_SRR0 => self.srr0,
            SPR_SRR1 => self.srr1,
            SPR_EAR => self.ear,
            SPR_PVR => super::PVR_603E,
            SPR_TBL_READ => self.tb as u32,
            SPR_TBU_READ => (self.tb >> 32) as u32,
            SPR_HID0 => self.hid0,
            SPR_HID1 => self.hid1,
            SPR_IABR => self.iabr,
            SPR_DMISS => self.dmiss,
            SPR_DCMP => self.dcmp,
            SPR_HASH1 => 0,
            SPR_HASH2 => 0,
            SPR_IMISS => self.imiss,
            SPR_ICMP => self.icmp,
            SPR_RPA => self.rpa,
            s if (SPR_SPRG0..SPR_SPRG0 + 4).contains(&s) => {
                self.sprg[(s - SPR_SPRG0) as usize]
            }
            s if (SPR_IBAT0U..SPR_IBAT0U + 8).contains(&s) => {
                let pair = &self.ibat[((s - SPR_IBAT0U) / 2) as usize];
                if s & 1 == 0 { pair.0 } else { pair.1 }
            }
            s if (SPR_DBAT0U..SPR_DBAT0U + 8).contains(&s) => {
                let pair = &self.dbat[((s - SPR_DBAT0U) / 2) as usize];
                if s & 1 == 0 { pair.0 } else { pair.1 }
            }
            _ => {
                self.log_guest_fault("mfspr from unknown SPR", pc, spr);
                0
            }
        };
        self.gpr[rt(op)] = value;
        1
    }

    fn mtspr(&mut self, op: u32, pc: u32) -> u64 {
        let spr = ((op >> 16) & 0x1F) | (((op >> 11) & 0x1F) << 5);
        let value = self.gpr[rt(op)];
        match spr {
            SPR_XER => self.xer = value,
            SPR_LR => self.lr = value,
            SPR_CTR => self.ctr = value,
            SPR_DSISR => self.dsisr = value,
            SPR_DAR => self.dar = value,
            SPR_DEC => self.dec = value,
            SPR_SDR1 => self.sdr1 = value,
            SPR_SRR0 => self.srr0 = value,
            SPR_SRR1 => self.srr1 = value,
            SPR_EAR => self.ear = value,
            SPR_TBL_WRITE => self.tb = (self.tb & 0xFFFF_FFFF_0000_0000) | value as u64,
            SPR_TBU_WRITE => {
                self.tb = (self.tb & 0x0000_0000_FFFF_FFFF) | ((value as u64) << 32)
            }
            SPR_HID0 => self.hid0 = value,
            SPR_HID1 => self.hid1 = value,
            SPR_IABR => self.iabr = value,
            SPR_RPA => self.rpa = value,
            s if (SPR_SPRG0..SPR_SPRG0 + 4).contains(&s) => {
                self.sprg[(s - SPR_SPRG0) as usize] = value;
            }
            s if (SPR_IBAT0U..SPR_IBAT0U + 8).contains(&s) => {
                let pair = &mut self.ibat[((s - SPR_IBAT0U) / 2) as usize];
                if s & 1 == 0 {
                    pair.0 = value;
                } else {
                    pair.1 = value;
                }
            }
            s if (SPR_DBAT0U..SPR_DBAT0U + 8).contains(&s) => {
                let pair = &mut self.dbat[((s - SPR_DBAT0U) / 2) as usize];
                if s & 1 == 0 {
                    pair.0 = value;
                } else {
                    pair.1 = value;
                }
            }
            _ => self.log_guest_fault("mtspr to unknown SPR", pc, spr),
        }
        1
    }
}
