//! PowerPC instruction descriptors: an immutable match/mask table carrying
//! mnemonic, operand format, side-effect flags, and register read/write
//! sets. The interpreter consults it on its undefined-opcode path and the
//! register-usage analyzer walks it for whole basic blocks.

use bitflags::bitflags;

bitflags! {
    /// Instruction side-effect flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpFlags: u16 {
        const OE          = 1 << 0;
        const RC          = 1 << 1;
        const LK          = 1 << 2;
        const AA          = 1 << 3;
        const CHECK_RA_RT = 1 << 4;
        const CHECK_RA    = 1 << 5;
        const CHECK_LSWI  = 1 << 6;
        const CHECK_LSWX  = 1 << 7;
        const COND_BRANCH = 1 << 8;
    }
}

bitflags! {
    /// Register-usage sets: which fields or named registers an instruction
    /// reads or writes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct RegSet: u16 {
        const RT    = 1 << 0;
        const RA    = 1 << 1;
        /// rA field, or nothing when the field is 0.
        const RA_0  = 1 << 2;
        const RB    = 1 << 3;
        const FRT   = 1 << 4;
        const FRA   = 1 << 5;
        const FRB   = 1 << 6;
        const FRC   = 1 << 7;
        const LR    = 1 << 8;
        const CTR   = 1 << 9;
        const CR    = 1 << 10;
        const MSR   = 1 << 11;
        const XER   = 1 << 12;
        const FPSCR = 1 << 13;
        /// SPR/TBR field; needs further decoding.
        const SPR   = 1 << 14;
    }
}

/// Operand layout tags, used by the disassembly path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    None,
    Li,
    BcTarget,
    BoBi,
    RtRaRb,
    RtRa0Simm,
    RtRaSimm,
    Addis,
    RaRtRb,
    RaRtUimm,
    RtRa,
    RaRt,
    Cmp,
    CmpSimm,
    CmpUimm,
    CrbdCrbaCrbb,
    CrfdCrfs,
    Ra0Rb,
    RtDRa0,
    RtDRa,
    RtRa0Rb,
    RtRa0Nb,
    FrtDRa0,
    FrtDRa,
    FrtRaRb,
    FrtRa0Rb,
    FrtFrb,
    FrtFraFrb,
    FrtFraFrc,
    FrtFraFrcFrb,
    Fcmp,
    FpCrbd,
    Mffs,
    Mtfsf,
    Mtfsfi,
    RtSpr,
    MtSpr,
    Mtcrf,
    Mcrxr,
    Mfsr,
    Mtsr,
    Rt,
    Rb,
    RtRb,
    RaRtShMbMe,
    Rlwnm,
    Srawi,
    Tw,
    Twi,
}

// Field masks.
const M_LI: u32 = 0x03FF_FFFC;
const M_AA: u32 = 0x0000_0002;
const M_LK: u32 = 0x0000_0001;
const M_BO: u32 = 0x03E0_0000;
const M_BI: u32 = 0x001F_0000;
const M_BD: u32 = 0x0000_FFFC;
const M_RT: u32 = 0x03E0_0000;
const M_RA: u32 = 0x001F_0000;
const M_RB: u32 = 0x0000_F800;
const M_CRFD: u32 = 0x0380_0000;
const M_L: u32 = 0x0020_0000;
const M_TO: u32 = 0x03E0_0000;
const M_D: u32 = 0x0000_FFFF;
const M_SIMM: u32 = 0x0000_FFFF;
const M_UIMM: u32 = 0x0000_FFFF;
const M_NB: u32 = 0x0000_F800;
const M_SR: u32 = 0x000F_0000;
const M_SH: u32 = 0x0000_F800;
const M_CRFS: u32 = 0x001C_0000;
const M_IMM: u32 = 0x0000_F000;
const M_CRBD: u32 = 0x03E0_0000;
const M_RC: u32 = 0x0000_0001;
const M_CRBA: u32 = 0x001F_0000;
const M_CRBB: u32 = 0x0000_F800;
const M_SPR: u32 = 0x001F_F800;
const M_TBR: u32 = 0x001F_F800;
const M_CRM: u32 = 0x000F_F000;
const M_FM: u32 = 0x01FE_0000;
const M_OE: u32 = 0x0000_0400;
const M_REGC: u32 = 0x0000_07C0;
const M_MB: u32 = 0x0000_07C0;
const M_ME: u32 = 0x0000_003E;

const fn d_op(op: u32) -> u32 {
    (op & 0x3F) << 26
}

const fn d_xo(xo: u32) -> u32 {
    (xo & 0x3FF) << 1
}

/// One instruction descriptor. `mask` covers the variable fields; an
/// instruction word matches when `op & !mask == match_bits`.
pub struct InsnDesc {
    pub mnemonic: &'static str,
    pub match_bits: u32,
    pub mask: u32,
    pub format: Format,
    pub flags: OpFlags,
    pub written: RegSet,
    pub read: RegSet,
}

macro_rules! insn {
    ($mnem:literal, $match_:expr, $mask:expr, $fmt:expr, $flags:expr, $wr:expr, $rd:expr) => {
        InsnDesc {
            mnemonic: $mnem,
            match_bits: $match_,
            mask: $mask,
            format: $fmt,
            flags: $flags,
            written: $wr,
            read: $rd,
        }
    };
}

use Format as F;

#[rustfmt::skip]
pub static INSN_TABLE: &[InsnDesc] = &[
    insn!("add",    d_op(31) | d_xo(266), M_RT|M_RA|M_RB|M_OE|M_RC, F::RtRaRb,    OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("addc",   d_op(31) | d_xo(10),  M_RT|M_RA|M_RB|M_OE|M_RC, F::RtRaRb,    OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("adde",   d_op(31) | d_xo(138), M_RT|M_RA|M_RB|M_OE|M_RC, F::RtRaRb,    OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("addi",   d_op(14),             M_RT|M_RA|M_SIMM,         F::RtRa0Simm, OpFlags::empty(),               RegSet::RT, RegSet::RA),
    insn!("addic",  d_op(12),             M_RT|M_RA|M_SIMM,         F::RtRaSimm,  OpFlags::empty(),               RegSet::RT, RegSet::RA),
    insn!("addic.", d_op(13),             M_RT|M_RA|M_SIMM,         F::RtRaSimm,  OpFlags::empty(),               RegSet::RT, RegSet::RA),
    insn!("addis",  d_op(15),             M_RT|M_RA|M_SIMM,         F::Addis,     OpFlags::empty(),               RegSet::RT, RegSet::RA_0),
    insn!("addme",  d_op(31) | d_xo(234), M_RT|M_RA|M_OE|M_RC,      F::RtRa,      OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::XER)),
    insn!("addze",  d_op(31) | d_xo(202), M_RT|M_RA|M_OE|M_RC,      F::RtRa,      OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::XER)),
    insn!("and",    d_op(31) | d_xo(28),  M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("andc",   d_op(31) | d_xo(60),  M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("andi.",  d_op(28),             M_RT|M_RA|M_UIMM,         F::RaRtUimm,  OpFlags::empty(),               RegSet::RA, RegSet::RT),
    insn!("andis.", d_op(29),             M_RT|M_RA|M_UIMM,         F::RaRtUimm,  OpFlags::empty(),               RegSet::RA, RegSet::RT),
    insn!("b",      d_op(18),             M_LI|M_AA|M_LK,           F::Li,        OpFlags::AA.union(OpFlags::LK), RegSet::empty(), RegSet::empty()),
    insn!("bc",     d_op(16),             M_BO|M_BI|M_BD|M_AA|M_LK, F::BcTarget,  OpFlags::AA.union(OpFlags::LK).union(OpFlags::COND_BRANCH), RegSet::empty(), RegSet::empty()),
    insn!("bcctr",  d_op(19) | d_xo(528), M_BO|M_BI|M_LK,           F::BoBi,      OpFlags::LK.union(OpFlags::COND_BRANCH), RegSet::empty(), RegSet::CTR),
    insn!("bclr",   d_op(19) | d_xo(16),  M_BO|M_BI|M_LK,           F::BoBi,      OpFlags::LK.union(OpFlags::COND_BRANCH), RegSet::empty(), RegSet::LR),
    insn!("cmp",    d_op(31) | d_xo(0),   M_CRFD|M_L|M_RA|M_RB,     F::Cmp,       OpFlags::empty(),               RegSet::CR, RegSet::RA.union(RegSet::RB)),
    insn!("cmpi",   d_op(11),             M_CRFD|M_L|M_RA|M_SIMM,   F::CmpSimm,   OpFlags::empty(),               RegSet::CR, RegSet::RA),
    insn!("cmpl",   d_op(31) | d_xo(32),  M_CRFD|M_L|M_RA|M_RB,     F::Cmp,       OpFlags::empty(),               RegSet::CR, RegSet::RA.union(RegSet::RB)),
    insn!("cmpli",  d_op(10),             M_CRFD|M_L|M_RA|M_UIMM,   F::CmpUimm,   OpFlags::empty(),               RegSet::CR, RegSet::RA),
    insn!("cntlzw", d_op(31) | d_xo(26),  M_RT|M_RA|M_RC,           F::RaRt,      OpFlags::RC,                    RegSet::RA, RegSet::RT),
    insn!("crand",  d_op(19) | d_xo(257), M_CRBD|M_CRBA|M_CRBB,     F::CrbdCrbaCrbb, OpFlags::empty(),            RegSet::CR, RegSet::CR),
    insn!("crandc", d_op(19) | d_xo(129), M_CRBD|M_CRBA|M_CRBB,     F::CrbdCrbaCrbb, OpFlags::empty(),            RegSet::CR, RegSet::CR),
    insn!("creqv",  d_op(19) | d_xo(289), M_CRBD|M_CRBA|M_CRBB,     F::CrbdCrbaCrbb, OpFlags::empty(),            RegSet::CR, RegSet::CR),
    insn!("crnand", d_op(19) | d_xo(225), M_CRBD|M_CRBA|M_CRBB,     F::CrbdCrbaCrbb, OpFlags::empty(),            RegSet::CR, RegSet::CR),
    insn!("crnor",  d_op(19) | d_xo(33),  M_CRBD|M_CRBA|M_CRBB,     F::CrbdCrbaCrbb, OpFlags::empty(),            RegSet::CR, RegSet::CR),
    insn!("cror",   d_op(19) | d_xo(449), M_CRBD|M_CRBA|M_CRBB,     F::CrbdCrbaCrbb, OpFlags::empty(),            RegSet::CR, RegSet::CR),
    insn!("crorc",  d_op(19) | d_xo(417), M_CRBD|M_CRBA|M_CRBB,     F::CrbdCrbaCrbb, OpFlags::empty(),            RegSet::CR, RegSet::CR),
    insn!("crxor",  d_op(19) | d_xo(193), M_CRBD|M_CRBA|M_CRBB,     F::CrbdCrbaCrbb, OpFlags::empty(),            RegSet::CR, RegSet::CR),
    insn!("dcba",   d_op(31) | d_xo(758), M_RA|M_RB,                F::Ra0Rb,     OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("dcbf",   d_op(31) | d_xo(86),  M_RA|M_RB,                F::Ra0Rb,     OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("dcbi",   d_op(31) | d_xo(470), M_RA|M_RB,                F::Ra0Rb,     OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("dcbst",  d_op(31) | d_xo(54),  M_RA|M_RB,                F::Ra0Rb,     OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("dcbt",   d_op(31) | d_xo(278), M_RA|M_RB,                F::Ra0Rb,     OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("dcbtst", d_op(31) | d_xo(246), M_RA|M_RB,                F::Ra0Rb,     OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("dcbz",   d_op(31) | d_xo(1014),M_RA|M_RB,                F::Ra0Rb,     OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("divw",   d_op(31) | d_xo(491), M_RT|M_RA|M_RB|M_OE|M_RC, F::RtRaRb,    OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("divwu",  d_op(31) | d_xo(459), M_RT|M_RA|M_RB|M_OE|M_RC, F::RtRaRb,    OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("eciwx",  d_op(31) | d_xo(310), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::RT, RegSet::RA_0.union(RegSet::RB)),
    insn!("ecowx",  d_op(31) | d_xo(438), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::empty(), RegSet::RT.union(RegSet::RA_0).union(RegSet::RB)),
    insn!("eieio",  d_op(31) | d_xo(854), 0,                        F::None,      OpFlags::empty(),               RegSet::empty(), RegSet::empty()),
    insn!("eqv",    d_op(31) | d_xo(284), M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("extsb",  d_op(31) | d_xo(954), M_RT|M_RA|M_RC,           F::RaRt,      OpFlags::RC,                    RegSet::RA, RegSet::RT),
    insn!("extsh",  d_op(31) | d_xo(922), M_RT|M_RA|M_RC,           F::RaRt,      OpFlags::RC,                    RegSet::RA, RegSet::RT),
    insn!("fabs",   d_op(63) | d_xo(264), M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("fadd",   d_op(63) | d_xo(21),  M_RT|M_RA|M_RB|M_RC,      F::FrtFraFrb, OpFlags::RC,                    RegSet::FRT, RegSet::FRA.union(RegSet::FRB)),
    insn!("fadds",  d_op(59) | d_xo(21),  M_RT|M_RA|M_RB|M_RC,      F::FrtFraFrb, OpFlags::RC,                    RegSet::FRT, RegSet::FRA.union(RegSet::FRB)),
    insn!("fcmpo",  d_op(63) | d_xo(32),  M_CRFD|M_RA|M_RB,         F::Fcmp,      OpFlags::empty(),               RegSet::CR, RegSet::FRA.union(RegSet::FRB)),
    insn!("fcmpu",  d_op(63) | d_xo(0),   M_CRFD|M_RA|M_RB,         F::Fcmp,      OpFlags::empty(),               RegSet::CR, RegSet::FRA.union(RegSet::FRB)),
    insn!("fctiw",  d_op(63) | d_xo(14),  M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("fctiwz", d_op(63) | d_xo(15),  M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("fdiv",   d_op(63) | d_xo(18),  M_RT|M_RA|M_RB|M_RC,      F::FrtFraFrb, OpFlags::RC,                    RegSet::FRT, RegSet::FRA.union(RegSet::FRB)),
    insn!("fdivs",  d_op(59) | d_xo(18),  M_RT|M_RA|M_RB|M_RC,      F::FrtFraFrb, OpFlags::RC,                    RegSet::FRT, RegSet::FRA.union(RegSet::FRB)),
    insn!("fmadd",  d_op(63) | d_xo(29),  M_RT|M_RA|M_RB|M_REGC|M_RC, F::FrtFraFrcFrb, OpFlags::RC,               RegSet::FRT, RegSet::FRA.union(RegSet::FRC).union(RegSet::FRB)),
    insn!("fmadds", d_op(59) | d_xo(29),  M_RT|M_RA|M_RB|M_REGC|M_RC, F::FrtFraFrcFrb, OpFlags::RC,               RegSet::FRT, RegSet::FRA.union(RegSet::FRC).union(RegSet::FRB)),
    insn!("fmr",    d_op(63) | d_xo(72),  M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("fmsub",  d_op(63) | d_xo(28),  M_RT|M_RA|M_RB|M_REGC|M_RC, F::FrtFraFrcFrb, OpFlags::RC,               RegSet::FRT, RegSet::FRA.union(RegSet::FRC).union(RegSet::FRB)),
    insn!("fmsubs", d_op(59) | d_xo(28),  M_RT|M_RA|M_RB|M_REGC|M_RC, F::FrtFraFrcFrb, OpFlags::RC,               RegSet::FRT, RegSet::FRA.union(RegSet::FRC).union(RegSet::FRB)),
    insn!("fmul",   d_op(63) | d_xo(25),  M_RT|M_RA|M_REGC|M_RC,    F::FrtFraFrc, OpFlags::RC,                    RegSet::FRT, RegSet::FRA.union(RegSet::FRC)),
    insn!("fmuls",  d_op(59) | d_xo(25),  M_RT|M_RA|M_REGC|M_RC,    F::FrtFraFrc, OpFlags::RC,                    RegSet::FRT, RegSet::FRA.union(RegSet::FRC)),
    insn!("fnabs",  d_op(63) | d_xo(136), M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("fneg",   d_op(63) | d_xo(40),  M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("fnmadd", d_op(63) | d_xo(31),  M_RT|M_RA|M_RB|M_REGC|M_RC, F::FrtFraFrcFrb, OpFlags::RC,               RegSet::FRT, RegSet::FRA.union(RegSet::FRC).union(RegSet::FRB)),
    insn!("fnmadds",d_op(59) | d_xo(31),  M_RT|M_RA|M_RB|M_REGC|M_RC, F::FrtFraFrcFrb, OpFlags::RC,               RegSet::FRT, RegSet::FRA.union(RegSet::FRC).union(RegSet::FRB)),
    insn!("fnmsub", d_op(63) | d_xo(30),  M_RT|M_RA|M_RB|M_REGC|M_RC, F::FrtFraFrcFrb, OpFlags::RC,               RegSet::FRT, RegSet::FRA.union(RegSet::FRC).union(RegSet::FRB)),
    insn!("fnmsubs",d_op(59) | d_xo(30),  M_RT|M_RA|M_RB|M_REGC|M_RC, F::FrtFraFrcFrb, OpFlags::RC,               RegSet::FRT, RegSet::FRA.union(RegSet::FRC).union(RegSet::FRB)),
    insn!("fres",   d_op(59) | d_xo(24),  M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("frsp",   d_op(63) | d_xo(12),  M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("frsqrte",d_op(63) | d_xo(26),  M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("fsel",   d_op(63) | d_xo(23),  M_RT|M_RA|M_RB|M_REGC|M_RC, F::FrtFraFrcFrb, OpFlags::RC,               RegSet::FRT, RegSet::FRA.union(RegSet::FRC).union(RegSet::FRB)),
    insn!("fsqrt",  d_op(63) | d_xo(22),  M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("fsqrts", d_op(59) | d_xo(22),  M_RT|M_RB|M_RC,           F::FrtFrb,    OpFlags::RC,                    RegSet::FRT, RegSet::FRB),
    insn!("fsub",   d_op(63) | d_xo(20),  M_RT|M_RA|M_RB|M_RC,      F::FrtFraFrb, OpFlags::RC,                    RegSet::FRT, RegSet::FRA.union(RegSet::FRB)),
    insn!("fsubs",  d_op(59) | d_xo(20),  M_RT|M_RA|M_RB|M_RC,      F::FrtFraFrb, OpFlags::RC,                    RegSet::FRT, RegSet::FRA.union(RegSet::FRB)),
    insn!("icbi",   d_op(31) | d_xo(982), M_RA|M_RB,                F::Ra0Rb,     OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("isync",  d_op(19) | d_xo(150), 0,                        F::None,      OpFlags::empty(),               RegSet::empty(), RegSet::empty()),
    insn!("lbz",    d_op(34),             M_RT|M_RA|M_D,            F::RtDRa0,    OpFlags::empty(),               RegSet::RT, RegSet::RA_0),
    insn!("lbzu",   d_op(35),             M_RT|M_RA|M_D,            F::RtDRa,     OpFlags::CHECK_RA_RT,           RegSet::RT.union(RegSet::RA), RegSet::RA),
    insn!("lbzux",  d_op(31) | d_xo(119), M_RT|M_RA|M_RB,           F::RtRaRb,    OpFlags::CHECK_RA_RT,           RegSet::RT.union(RegSet::RA), RegSet::RA.union(RegSet::RB)),
    insn!("lbzx",   d_op(31) | d_xo(87),  M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::RT, RegSet::RA_0.union(RegSet::RB)),
    insn!("lfd",    d_op(50),             M_RT|M_RA|M_D,            F::FrtDRa0,   OpFlags::empty(),               RegSet::FRT, RegSet::RA_0),
    insn!("lfdu",   d_op(51),             M_RT|M_RA|M_D,            F::FrtDRa,    OpFlags::CHECK_RA,              RegSet::FRT.union(RegSet::RA), RegSet::RA),
    insn!("lfdux",  d_op(31) | d_xo(631), M_RT|M_RA|M_RB,           F::FrtRaRb,   OpFlags::CHECK_RA,              RegSet::FRT.union(RegSet::RA), RegSet::RA.union(RegSet::RB)),
    insn!("lfdx",   d_op(31) | d_xo(599), M_RT|M_RA|M_RB,           F::FrtRa0Rb,  OpFlags::empty(),               RegSet::FRT, RegSet::RA_0.union(RegSet::RB)),
    insn!("lfs",    d_op(48),             M_RT|M_RA|M_D,            F::FrtDRa0,   OpFlags::empty(),               RegSet::FRT, RegSet::RA_0),
    insn!("lfsu",   d_op(49),             M_RT|M_RA|M_D,            F::FrtDRa,    OpFlags::CHECK_RA,              RegSet::FRT.union(RegSet::RA), RegSet::RA),
    insn!("lfsux",  d_op(31) | d_xo(567), M_RT|M_RA|M_RB,           F::FrtRaRb,   OpFlags::CHECK_RA,              RegSet::FRT.union(RegSet::RA), RegSet::RA.union(RegSet::RB)),
    insn!("lfsx",   d_op(31) | d_xo(535), M_RT|M_RA|M_RB,           F::FrtRa0Rb,  OpFlags::empty(),               RegSet::FRT, RegSet::RA_0.union(RegSet::RB)),
    insn!("lha",    d_op(42),             M_RT|M_RA|M_D,            F::RtDRa0,    OpFlags::empty(),               RegSet::RT, RegSet::RA_0),
    insn!("lhau",   d_op(43),             M_RT|M_RA|M_D,            F::RtDRa,     OpFlags::CHECK_RA_RT,           RegSet::RT.union(RegSet::RA), RegSet::RA),
    insn!("lhaux",  d_op(31) | d_xo(375), M_RT|M_RA|M_RB,           F::RtRaRb,    OpFlags::CHECK_RA_RT,           RegSet::RT.union(RegSet::RA), RegSet::RA.union(RegSet::RB)),
    insn!("lhax",   d_op(31) | d_xo(343), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::RT, RegSet::RA_0.union(RegSet::RB)),
    insn!("lhbrx",  d_op(31) | d_xo(790), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::RT, RegSet::RA_0.union(RegSet::RB)),
    insn!("lhz",    d_op(40),             M_RT|M_RA|M_D,            F::RtDRa0,    OpFlags::empty(),               RegSet::RT, RegSet::RA_0),
    insn!("lhzu",   d_op(41),             M_RT|M_RA|M_D,            F::RtDRa,     OpFlags::CHECK_RA_RT,           RegSet::RT.union(RegSet::RA), RegSet::RA),
    insn!("lhzux",  d_op(31) | d_xo(311), M_RT|M_RA|M_RB,           F::RtRaRb,    OpFlags::CHECK_RA_RT,           RegSet::RT.union(RegSet::RA), RegSet::RA.union(RegSet::RB)),
    insn!("lhzx",   d_op(31) | d_xo(279), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::RT, RegSet::RA_0.union(RegSet::RB)),
    insn!("lmw",    d_op(46),             M_RT|M_RA|M_D,            F::RtDRa0,    OpFlags::empty(),               RegSet::RT, RegSet::RA_0),
    insn!("lswi",   d_op(31) | d_xo(597), M_RT|M_RA|M_NB,           F::RtRa0Nb,   OpFlags::CHECK_LSWI,            RegSet::RT, RegSet::RA_0),
    insn!("lswx",   d_op(31) | d_xo(533), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::CHECK_LSWX,            RegSet::RT, RegSet::RA_0.union(RegSet::RB)),
    insn!("lwarx",  d_op(31) | d_xo(20),  M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::RT, RegSet::RA_0.union(RegSet::RB)),
    insn!("lwbrx",  d_op(31) | d_xo(534), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::RT, RegSet::RA_0.union(RegSet::RB)),
    insn!("lwz",    d_op(32),             M_RT|M_RA|M_D,            F::RtDRa0,    OpFlags::empty(),               RegSet::RT, RegSet::RA_0),
    insn!("lwzu",   d_op(33),             M_RT|M_RA|M_D,            F::RtDRa,     OpFlags::CHECK_RA_RT,           RegSet::RT.union(RegSet::RA), RegSet::RA),
    insn!("lwzux",  d_op(31) | d_xo(55),  M_RT|M_RA|M_RB,           F::RtRaRb,    OpFlags::CHECK_RA_RT,           RegSet::RT.union(RegSet::RA), RegSet::RA.union(RegSet::RB)),
    insn!("lwzx",   d_op(31) | d_xo(23),  M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::RT, RegSet::RA_0.union(RegSet::RB)),
    insn!("mcrf",   d_op(19) | d_xo(0),   M_CRFD|M_CRFS,            F::CrfdCrfs,  OpFlags::empty(),               RegSet::CR, RegSet::CR),
    insn!("mcrfs",  d_op(63) | d_xo(64),  M_CRFD|M_CRFS,            F::CrfdCrfs,  OpFlags::empty(),               RegSet::CR, RegSet::CR),
    insn!("mcrxr",  d_op(31) | d_xo(512), M_CRFD,                   F::Mcrxr,     OpFlags::empty(),               RegSet::CR, RegSet::XER),
    insn!("mfcr",   d_op(31) | d_xo(19),  M_RT,                     F::Rt,        OpFlags::empty(),               RegSet::RT, RegSet::CR),
    insn!("mffs",   d_op(63) | d_xo(583), M_RT|M_RC,                F::Mffs,      OpFlags::RC,                    RegSet::FRT, RegSet::FPSCR),
    insn!("mfmsr",  d_op(31) | d_xo(83),  M_RT,                     F::Rt,        OpFlags::empty(),               RegSet::RT, RegSet::MSR),
    insn!("mfspr",  d_op(31) | d_xo(339), M_RT|M_SPR,               F::RtSpr,     OpFlags::empty(),               RegSet::RT, RegSet::SPR),
    insn!("mfsr",   d_op(31) | d_xo(595), M_RT|M_SR,                F::Mfsr,      OpFlags::empty(),               RegSet::RT, RegSet::empty()),
    insn!("mfsrin", d_op(31) | d_xo(659), M_RT|M_RB,                F::RtRb,      OpFlags::empty(),               RegSet::RT, RegSet::RB),
    insn!("mftb",   d_op(31) | d_xo(371), M_RT|M_TBR,               F::RtSpr,     OpFlags::empty(),               RegSet::RT, RegSet::SPR),
    insn!("mtcrf",  d_op(31) | d_xo(144), M_RT|M_CRM,               F::Mtcrf,     OpFlags::empty(),               RegSet::CR, RegSet::RT),
    insn!("mtfsb0", d_op(63) | d_xo(70),  M_CRBD|M_RC,              F::FpCrbd,    OpFlags::RC,                    RegSet::FPSCR, RegSet::empty()),
    insn!("mtfsb1", d_op(63) | d_xo(38),  M_CRBD|M_RC,              F::FpCrbd,    OpFlags::RC,                    RegSet::FPSCR, RegSet::empty()),
    insn!("mtfsf",  d_op(63) | d_xo(711), M_FM|M_RB|M_RC,           F::Mtfsf,     OpFlags::RC,                    RegSet::FPSCR, RegSet::FRB),
    insn!("mtfsfi", d_op(63) | d_xo(134), M_CRFD|M_IMM|M_RC,        F::Mtfsfi,    OpFlags::RC,                    RegSet::FPSCR, RegSet::empty()),
    insn!("mtmsr",  d_op(31) | d_xo(146), M_RT,                     F::Rt,        OpFlags::empty(),               RegSet::MSR, RegSet::RT),
    insn!("mtspr",  d_op(31) | d_xo(467), M_RT|M_SPR,               F::MtSpr,     OpFlags::empty(),               RegSet::SPR, RegSet::RT),
    insn!("mtsr",   d_op(31) | d_xo(210), M_RT|M_SR,                F::Mtsr,      OpFlags::empty(),               RegSet::empty(), RegSet::RT),
    insn!("mtsrin", d_op(31) | d_xo(242), M_RT|M_RB,                F::RtRb,      OpFlags::empty(),               RegSet::empty(), RegSet::RT.union(RegSet::RB)),
    insn!("mulhw",  d_op(31) | d_xo(75),  M_RT|M_RA|M_RB|M_RC,      F::RtRaRb,    OpFlags::RC,                    RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("mulhwu", d_op(31) | d_xo(11),  M_RT|M_RA|M_RB|M_RC,      F::RtRaRb,    OpFlags::RC,                    RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("mulli",  d_op(7),              M_RT|M_RA|M_SIMM,         F::RtRaSimm,  OpFlags::empty(),               RegSet::RT, RegSet::RA),
    insn!("mullw",  d_op(31) | d_xo(235), M_RT|M_RA|M_RB|M_OE|M_RC, F::RtRaRb,    OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("nand",   d_op(31) | d_xo(476), M_RA|M_RT|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("neg",    d_op(31) | d_xo(104), M_RT|M_RA|M_OE|M_RC,      F::RtRa,      OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA),
    insn!("nor",    d_op(31) | d_xo(124), M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("or",     d_op(31) | d_xo(444), M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("orc",    d_op(31) | d_xo(412), M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("ori",    d_op(24),             M_RT|M_RA|M_UIMM,         F::RaRtUimm,  OpFlags::empty(),               RegSet::RA, RegSet::RT),
    insn!("oris",   d_op(25),             M_RT|M_RA|M_UIMM,         F::RaRtUimm,  OpFlags::empty(),               RegSet::RA, RegSet::RT),
    insn!("rfi",    d_op(19) | d_xo(50),  0,                        F::None,      OpFlags::empty(),               RegSet::MSR, RegSet::empty()),
    insn!("rlwimi", d_op(20),             M_RT|M_RA|M_SH|M_MB|M_ME|M_RC, F::RaRtShMbMe, OpFlags::RC,              RegSet::RA, RegSet::RT),
    insn!("rlwinm", d_op(21),             M_RT|M_RA|M_SH|M_MB|M_ME|M_RC, F::RaRtShMbMe, OpFlags::RC,              RegSet::RA, RegSet::RT),
    insn!("rlwnm",  d_op(23),             M_RT|M_RA|M_RB|M_MB|M_ME|M_RC, F::Rlwnm, OpFlags::RC,                   RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("sc",     d_op(17) | 2,         0,                        F::None,      OpFlags::empty(),               RegSet::MSR, RegSet::empty()),
    insn!("slw",    d_op(31) | d_xo(24),  M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("sraw",   d_op(31) | d_xo(792), M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("srawi",  d_op(31) | d_xo(824), M_RT|M_RA|M_SH|M_RC,      F::Srawi,     OpFlags::RC,                    RegSet::RA, RegSet::RT),
    insn!("srw",    d_op(31) | d_xo(536), M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("stb",    d_op(38),             M_RT|M_RA|M_D,            F::RtDRa0,    OpFlags::empty(),               RegSet::empty(), RegSet::RA_0),
    insn!("stbu",   d_op(39),             M_RT|M_RA|M_D,            F::RtDRa,     OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA),
    insn!("stbux",  d_op(31) | d_xo(247), M_RT|M_RA|M_RB,           F::RtRaRb,    OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA.union(RegSet::RB)),
    insn!("stbx",   d_op(31) | d_xo(215), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("stfd",   d_op(54),             M_RT|M_RA|M_D,            F::FrtDRa0,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0),
    insn!("stfdu",  d_op(55),             M_RT|M_RA|M_D,            F::FrtDRa,    OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA.union(RegSet::RB)),
    insn!("stfdux", d_op(31) | d_xo(759), M_RT|M_RA|M_RB,           F::FrtRaRb,   OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA.union(RegSet::RB)),
    insn!("stfdx",  d_op(31) | d_xo(727), M_RT|M_RA|M_RB,           F::FrtRa0Rb,  OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("stfiwx", d_op(31) | d_xo(983), M_RT|M_RA|M_RB,           F::FrtRa0Rb,  OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("stfs",   d_op(52),             M_RT|M_RA|M_D,            F::FrtDRa0,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0),
    insn!("stfsu",  d_op(53),             M_RT|M_RA|M_D,            F::FrtDRa,    OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA),
    insn!("stfsux", d_op(31) | d_xo(695), M_RT|M_RA|M_RB,           F::FrtRaRb,   OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA.union(RegSet::RB)),
    insn!("stfsx",  d_op(31) | d_xo(663), M_RT|M_RA|M_RB,           F::FrtRa0Rb,  OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("sth",    d_op(44),             M_RT|M_RA|M_D,            F::RtDRa0,    OpFlags::empty(),               RegSet::empty(), RegSet::RA_0),
    insn!("sthbrx", d_op(31) | d_xo(918), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("sthu",   d_op(45),             M_RT|M_RA|M_D,            F::RtDRa,     OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA),
    insn!("sthux",  d_op(31) | d_xo(439), M_RT|M_RA|M_RB,           F::RtRaRb,    OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA.union(RegSet::RB)),
    insn!("sthx",   d_op(31) | d_xo(407), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("stmw",   d_op(47),             M_RT|M_RA|M_D,            F::RtDRa0,    OpFlags::empty(),               RegSet::empty(), RegSet::RA_0),
    insn!("stswi",  d_op(31) | d_xo(725), M_RT|M_RA|M_NB,           F::RtRa0Nb,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0),
    insn!("stswx",  d_op(31) | d_xo(661), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("stw",    d_op(36),             M_RT|M_RA|M_D,            F::RtDRa0,    OpFlags::empty(),               RegSet::empty(), RegSet::RA_0),
    insn!("stwbrx", d_op(31) | d_xo(662), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("stwcx.", d_op(31) | d_xo(150) | 1, M_RT|M_RA|M_RB,       F::RtRa0Rb,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("stwu",   d_op(37),             M_RT|M_RA|M_D,            F::RtDRa,     OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA),
    insn!("stwux",  d_op(31) | d_xo(183), M_RT|M_RA|M_RB,           F::RtRaRb,    OpFlags::CHECK_RA,              RegSet::RA, RegSet::RA.union(RegSet::RB)),
    insn!("stwx",   d_op(31) | d_xo(151), M_RT|M_RA|M_RB,           F::RtRa0Rb,   OpFlags::empty(),               RegSet::empty(), RegSet::RA_0.union(RegSet::RB)),
    insn!("subf",   d_op(31) | d_xo(40),  M_RT|M_RA|M_RB|M_OE|M_RC, F::RtRaRb,    OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("subfc",  d_op(31) | d_xo(8),   M_RT|M_RA|M_RB|M_OE|M_RC, F::RtRaRb,    OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("subfe",  d_op(31) | d_xo(136), M_RT|M_RA|M_RB|M_OE|M_RC, F::RtRaRb,    OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA.union(RegSet::RB)),
    insn!("subfic", d_op(8),              M_RT|M_RA|M_SIMM,         F::RtRaSimm,  OpFlags::empty(),               RegSet::RT, RegSet::RA),
    insn!("subfme", d_op(31) | d_xo(232), M_RT|M_RA|M_OE|M_RC,      F::RtRa,      OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA),
    insn!("subfze", d_op(31) | d_xo(200), M_RT|M_RA|M_OE|M_RC,      F::RtRa,      OpFlags::OE.union(OpFlags::RC), RegSet::RT, RegSet::RA),
    insn!("sync",   d_op(31) | d_xo(598), 0,                        F::None,      OpFlags::empty(),               RegSet::empty(), RegSet::empty()),
    insn!("tlbia",  d_op(31) | d_xo(370), 0,                        F::None,      OpFlags::empty(),               RegSet::empty(), RegSet::empty()),
    insn!("tlbie",  d_op(31) | d_xo(306), M_RB,                     F::Rb,        OpFlags::empty(),               RegSet::empty(), RegSet::RB),
    insn!("tlbsync",d_op(31) | d_xo(566), 0,                        F::None,      OpFlags::empty(),               RegSet::empty(), RegSet::empty()),
    insn!("tw",     d_op(31) | d_xo(4),   M_TO|M_RA|M_RB,           F::Tw,        OpFlags::empty(),               RegSet::empty(), RegSet::RA.union(RegSet::RB)),
    insn!("twi",    d_op(3),              M_TO|M_RA|M_SIMM,         F::Twi,       OpFlags::empty(),               RegSet::empty(), RegSet::RA),
    insn!("xor",    d_op(31) | d_xo(316), M_RT|M_RA|M_RB|M_RC,      F::RaRtRb,    OpFlags::RC,                    RegSet::RA, RegSet::RT.union(RegSet::RB)),
    insn!("xori",   d_op(26),             M_RT|M_RA|M_UIMM,         F::RaRtUimm,  OpFlags::empty(),               RegSet::RA, RegSet::RT),
    insn!("xoris",  d_op(27),             M_RT|M_RA|M_UIMM,         F::RaRtUimm,  OpFlags::empty(),               RegSet::RA, RegSet::RT),
    // 603e/EC603e-specific.
    insn!("tlbld",  d_op(31) | d_xo(978), M_RB,                     F::Rb,        OpFlags::empty(),               RegSet::empty(), RegSet::RB),
    insn!("tlbli",  d_op(31) | d_xo(1010),M_RB,                     F::Rb,        OpFlags::empty(),               RegSet::empty(), RegSet::RB),
];

/// Find the descriptor matching an instruction word.
pub fn lookup(op: u32) -> Option<&'static InsnDesc> {
    INSN_TABLE.iter().find(|d| op & !d.mask == d.match_bits)
}

/// Per-register access counters accumulated over a range of instructions.
#[derive(Clone, Default)]
pub struct RegUsage {
    pub gpr: [u32; 32],
    pub fpr: [u32; 32],
    pub lr: u32,
    pub ctr: u32,
    pub cr: u32,
    pub xer: u32,
    pub msr: u32,
    pub fpscr: u32,
    pub tbu: u32,
    pub tbl: u32,
    pub dec: u32,
}

impl RegUsage {
    /// How many distinct registers were accessed at least once.
    pub fn distinct_regs(&self) -> u32 {
        let mut n = 0;
        n += self.gpr.iter().filter(|&&c| c != 0).count() as u32;
        n += self.fpr.iter().filter(|&&c| c != 0).count() as u32;
        for c in [
            self.lr, self.ctr, self.cr, self.xer, self.msr, self.fpscr, self.tbu, self.tbl,
            self.dec,
        ] {
            if c != 0 {
                n += 1;
            }
        }
        n
    }

    pub fn merge(&mut self, other: &RegUsage) {
        for (d, s) in self.gpr.iter_mut().zip(other.gpr.iter()) {
            *d += s;
        }
        for (d, s) in self.fpr.iter_mut().zip(other.fpr.iter()) {
            *d += s;
        }
        self.lr += other.lr;
        self.ctr += other.ctr;
        self.cr += other.cr;
        self.xer += other.xer;
        self.msr += other.msr;
        self.fpscr += other.fpscr;
        self.tbu += other.tbu;
        self.tbl += other.tbl;
        self.dec += other.dec;
    }

    fn count(&mut self, regs: RegSet, op: u32) {
        let rt = ((op >> 21) & 31) as usize;
        let ra = ((op >> 16) & 31) as usize;
        let rb = ((op >> 11) & 31) as usize;
        let regc = ((op >> 6) & 31) as usize;
        if regs.contains(RegSet::RT) {
            self.gpr[rt] += 1;
        }
        if regs.contains(RegSet::RA) {
            self.gpr[ra] += 1;
        }
        if regs.contains(RegSet::RA_0) && ra != 0 {
            self.gpr[ra] += 1;
        }
        if regs.contains(RegSet::RB) {
            self.gpr[rb] += 1;
        }
        if regs.contains(RegSet::FRT) {
            self.fpr[rt] += 1;
        }
        if regs.contains(RegSet::FRA) {
            self.fpr[ra] += 1;
        }
        if regs.contains(RegSet::FRB) {
            self.fpr[rb] += 1;
        }
        if regs.contains(RegSet::FRC) {
            self.fpr[regc] += 1;
        }
        if regs.contains(RegSet::LR) {
            self.lr += 1;
        }
        if regs.contains(RegSet::CTR) {
            self.ctr += 1;
        }
        if regs.contains(RegSet::CR) {
            self.cr += 1;
        }
        if regs.contains(RegSet::MSR) {
            self.msr += 1;
        }
        if regs.contains(RegSet::XER) {
            self.xer += 1;
        }
        if regs.contains(RegSet::FPSCR) {
            self.fpscr += 1;
        }
        if regs.contains(RegSet::SPR) {
            // The SPR field is two reversed 5-bit halves.
            let field = (op >> 11) & 0x3FF;
            let spr = ((field >> 5) & 0x1F) | ((field & 0x1F) << 5);
            match spr {
                1 => self.xer += 1,
                8 => self.lr += 1,
                9 => self.ctr += 1,
                22 => self.dec += 1,
                268 | 284 => self.tbl += 1,
                269 | 285 => self.tbu += 1,
                _ => {}
            }
        }
    }
}

/// Analyze one instruction's register usage, incrementing the counters in
/// `written` and `read`. Conditional branches with a CTR-decrement BO field
/// read (and write) CTR; LK forms write LR.
pub fn analyze_regusage(written: &mut RegUsage, read: &mut RegUsage, op: u32) {
    let Some(desc) = lookup(op) else {
        return;
    };
    if desc.flags.contains(OpFlags::LK) && op & M_LK != 0 {
        written.lr += 1;
    }
    if desc.flags.contains(OpFlags::COND_BRANCH) {
        let bo = (op >> 21) & 31;
        // BO fields that decrement CTR (bit 2 of BO clear).
        if bo & 4 == 0 {
            read.ctr += 1;
        }
    }
    written.count(desc.written, op);
    read.count(desc.read, op);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_add_and_rc_forms() {
        // add r3,r4,r5 = 0x7C642A14
        let desc = lookup(0x7C64_2A14).unwrap();
        assert_eq!(desc.mnemonic, "add");
        // add. (RC set) matches the same row.
        let desc = lookup(0x7C64_2A15).unwrap();
        assert_eq!(desc.mnemonic, "add");
    }

    #[test]
    fn regusage_counts_fields() {
        let mut written = RegUsage::default();
        let mut read = RegUsage::default();
        // add r3,r4,r5
        analyze_regusage(&mut written, &mut read, 0x7C64_2A14);
        assert_eq!(written.gpr[3], 1);
        assert_eq!(read.gpr[4], 1);
        assert_eq!(read.gpr[5], 1);
    }

    #[test]
    fn bl_counts_lr_write() {
        let mut written = RegUsage::default();
        let mut read = RegUsage::default();
        // bl +8 = 0x48000009
        analyze_regusage(&mut written, &mut read, 0x4800_0009);
        assert_eq!(written.lr, 1);
    }

    #[test]
    fn bdnz_reads_ctr() {
        let mut written = RegUsage::default();
        let mut read = RegUsage::default();
        // bdnz -4 (bc 16,0,-4) = 0x4200FFFC
        analyze_regusage(&mut written, &mut read, 0x4200_FFFC);
        assert_eq!(read.ctr, 1);
    }
}
