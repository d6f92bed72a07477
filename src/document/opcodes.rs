//! CIL opcode tables (ECMA-335 III).
//!
//! [`INSTRUCTIONS`] is indexed by the first opcode byte, [`INSTRUCTIONS_FE`] by the second byte
//! of a `0xFE`-prefixed opcode. Unassigned slots hold a reserved entry with an empty name; the
//! decoder rejects them as malformed.

use strum::Display;

/// Prefix byte of all two-byte opcodes
pub const FE_PREFIX: u8 = 0xFE;

/// How the bytes following an opcode are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OperandKind {
    /// No operand
    InlineNone,
    /// Signed 8-bit immediate
    ShortInlineI,
    /// Signed 32-bit immediate
    InlineI,
    /// Signed 64-bit immediate
    InlineI8,
    /// 32-bit float immediate
    ShortInlineR,
    /// 64-bit float immediate
    InlineR,
    /// User string token
    InlineString,
    /// Type, method or field token (`ldtoken`)
    InlineTok,
    /// Type token
    InlineType,
    /// Method token
    InlineMethod,
    /// Field token
    InlineField,
    /// Stand-alone signature token (`calli`)
    InlineSig,
    /// 8-bit local variable index
    ShortInlineVar,
    /// 16-bit local variable index
    InlineVar,
    /// 8-bit argument index
    ShortInlineArg,
    /// 16-bit argument index
    InlineArg,
    /// 8-bit branch offset relative to the next instruction
    ShortInlineBrTarget,
    /// 32-bit branch offset relative to the next instruction
    InlineBrTarget,
    /// Count followed by that many 32-bit branch offsets
    InlineSwitch,
}

impl OperandKind {
    /// Encoded operand size, `None` for the variable length switch table.
    #[must_use]
    pub fn fixed_size(self) -> Option<u32> {
        match self {
            OperandKind::InlineNone => Some(0),
            OperandKind::ShortInlineI
            | OperandKind::ShortInlineVar
            | OperandKind::ShortInlineArg
            | OperandKind::ShortInlineBrTarget => Some(1),
            OperandKind::InlineVar | OperandKind::InlineArg => Some(2),
            OperandKind::InlineI
            | OperandKind::ShortInlineR
            | OperandKind::InlineString
            | OperandKind::InlineTok
            | OperandKind::InlineType
            | OperandKind::InlineMethod
            | OperandKind::InlineField
            | OperandKind::InlineSig
            | OperandKind::InlineBrTarget => Some(4),
            OperandKind::InlineI8 | OperandKind::InlineR => Some(8),
            OperandKind::InlineSwitch => None,
        }
    }

    /// Operand is a metadata token.
    #[must_use]
    pub fn is_token(self) -> bool {
        matches!(
            self,
            OperandKind::InlineString
                | OperandKind::InlineTok
                | OperandKind::InlineType
                | OperandKind::InlineMethod
                | OperandKind::InlineField
                | OperandKind::InlineSig
        )
    }
}

/// Control flow effect of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FlowControl {
    /// Falls through
    Next,
    /// Debugger break
    Break,
    /// Unconditional branch
    Branch,
    /// Conditional branch or switch
    CondBranch,
    /// Call, continues after return
    Call,
    /// Leaves the method, a filter or a finally block
    Return,
    /// Raises an exception
    Throw,
    /// Prefix modifying the next instruction
    Meta,
}

/// Static description of one CIL opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpCode {
    /// Mnemonic, empty for reserved slots
    pub name: &'static str,
    /// First byte, or [`FE_PREFIX`] for two-byte opcodes
    pub op1: u8,
    /// Second byte of a two-byte opcode, or the only byte
    pub op2: u8,
    /// Operand encoding
    pub operand: OperandKind,
    /// Control flow effect
    pub flow: FlowControl,
}

impl OpCode {
    /// Number of opcode bytes.
    #[must_use]
    pub fn size(&self) -> u32 {
        if self.op1 == FE_PREFIX {
            2
        } else {
            1
        }
    }

    /// Opcode bytes as a single value (`0xFE01` for `ceq`, `0x2A` for `ret`).
    #[must_use]
    pub fn value(&self) -> u16 {
        if self.op1 == FE_PREFIX {
            (u16::from(FE_PREFIX) << 8) | u16::from(self.op2)
        } else {
            u16::from(self.op2)
        }
    }

    /// Slot is unassigned.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.name.is_empty()
    }

    /// Operand is a branch offset or a switch table.
    #[must_use]
    pub fn is_branch(&self) -> bool {
        matches!(
            self.operand,
            OperandKind::ShortInlineBrTarget
                | OperandKind::InlineBrTarget
                | OperandKind::InlineSwitch
        )
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

const fn op(name: &'static str, op1: u8, op2: u8, operand: OperandKind, flow: FlowControl) -> OpCode {
    OpCode {
        name,
        op1,
        op2,
        operand,
        flow,
    }
}

const fn reserved(op1: u8, op2: u8) -> OpCode {
    op("", op1, op2, OperandKind::InlineNone, FlowControl::Next)
}

use FlowControl as F;
use OperandKind as K;

macro_rules! one_byte {
    ($($code:literal $name:literal $kind:ident $flow:ident),* $(,)?) => {
        &[$(op($name, $code, $code, K::$kind, F::$flow)),*]
    };
}

macro_rules! two_byte {
    ($($code:literal $name:literal $kind:ident $flow:ident),* $(,)?) => {
        &[$(op($name, FE_PREFIX, $code, K::$kind, F::$flow)),*]
    };
}

const ONE_BYTE_DEFINITIONS: &[OpCode] = one_byte! {
    0x00 "nop" InlineNone Next,
    0x01 "break" InlineNone Break,
    0x02 "ldarg.0" InlineNone Next,
    0x03 "ldarg.1" InlineNone Next,
    0x04 "ldarg.2" InlineNone Next,
    0x05 "ldarg.3" InlineNone Next,
    0x06 "ldloc.0" InlineNone Next,
    0x07 "ldloc.1" InlineNone Next,
    0x08 "ldloc.2" InlineNone Next,
    0x09 "ldloc.3" InlineNone Next,
    0x0A "stloc.0" InlineNone Next,
    0x0B "stloc.1" InlineNone Next,
    0x0C "stloc.2" InlineNone Next,
    0x0D "stloc.3" InlineNone Next,
    0x0E "ldarg.s" ShortInlineArg Next,
    0x0F "ldarga.s" ShortInlineArg Next,
    0x10 "starg.s" ShortInlineArg Next,
    0x11 "ldloc.s" ShortInlineVar Next,
    0x12 "ldloca.s" ShortInlineVar Next,
    0x13 "stloc.s" ShortInlineVar Next,
    0x14 "ldnull" InlineNone Next,
    0x15 "ldc.i4.m1" InlineNone Next,
    0x16 "ldc.i4.0" InlineNone Next,
    0x17 "ldc.i4.1" InlineNone Next,
    0x18 "ldc.i4.2" InlineNone Next,
    0x19 "ldc.i4.3" InlineNone Next,
    0x1A "ldc.i4.4" InlineNone Next,
    0x1B "ldc.i4.5" InlineNone Next,
    0x1C "ldc.i4.6" InlineNone Next,
    0x1D "ldc.i4.7" InlineNone Next,
    0x1E "ldc.i4.8" InlineNone Next,
    0x1F "ldc.i4.s" ShortInlineI Next,
    0x20 "ldc.i4" InlineI Next,
    0x21 "ldc.i8" InlineI8 Next,
    0x22 "ldc.r4" ShortInlineR Next,
    0x23 "ldc.r8" InlineR Next,
    0x25 "dup" InlineNone Next,
    0x26 "pop" InlineNone Next,
    0x27 "jmp" InlineMethod Call,
    0x28 "call" InlineMethod Call,
    0x29 "calli" InlineSig Call,
    0x2A "ret" InlineNone Return,
    0x2B "br.s" ShortInlineBrTarget Branch,
    0x2C "brfalse.s" ShortInlineBrTarget CondBranch,
    0x2D "brtrue.s" ShortInlineBrTarget CondBranch,
    0x2E "beq.s" ShortInlineBrTarget CondBranch,
    0x2F "bge.s" ShortInlineBrTarget CondBranch,
    0x30 "bgt.s" ShortInlineBrTarget CondBranch,
    0x31 "ble.s" ShortInlineBrTarget CondBranch,
    0x32 "blt.s" ShortInlineBrTarget CondBranch,
    0x33 "bne.un.s" ShortInlineBrTarget CondBranch,
    0x34 "bge.un.s" ShortInlineBrTarget CondBranch,
    0x35 "bgt.un.s" ShortInlineBrTarget CondBranch,
    0x36 "ble.un.s" ShortInlineBrTarget CondBranch,
    0x37 "blt.un.s" ShortInlineBrTarget CondBranch,
    0x38 "br" InlineBrTarget Branch,
    0x39 "brfalse" InlineBrTarget CondBranch,
    0x3A "brtrue" InlineBrTarget CondBranch,
    0x3B "beq" InlineBrTarget CondBranch,
    0x3C "bge" InlineBrTarget CondBranch,
    0x3D "bgt" InlineBrTarget CondBranch,
    0x3E "ble" InlineBrTarget CondBranch,
    0x3F "blt" InlineBrTarget CondBranch,
    0x40 "bne.un" InlineBrTarget CondBranch,
    0x41 "bge.un" InlineBrTarget CondBranch,
    0x42 "bgt.un" InlineBrTarget CondBranch,
    0x43 "ble.un" InlineBrTarget CondBranch,
    0x44 "blt.un" InlineBrTarget CondBranch,
    0x45 "switch" InlineSwitch CondBranch,
    0x46 "ldind.i1" InlineNone Next,
    0x47 "ldind.u1" InlineNone Next,
    0x48 "ldind.i2" InlineNone Next,
    0x49 "ldind.u2" InlineNone Next,
    0x4A "ldind.i4" InlineNone Next,
    0x4B "ldind.u4" InlineNone Next,
    0x4C "ldind.i8" InlineNone Next,
    0x4D "ldind.i" InlineNone Next,
    0x4E "ldind.r4" InlineNone Next,
    0x4F "ldind.r8" InlineNone Next,
    0x50 "ldind.ref" InlineNone Next,
    0x51 "stind.ref" InlineNone Next,
    0x52 "stind.i1" InlineNone Next,
    0x53 "stind.i2" InlineNone Next,
    0x54 "stind.i4" InlineNone Next,
    0x55 "stind.i8" InlineNone Next,
    0x56 "stind.r4" InlineNone Next,
    0x57 "stind.r8" InlineNone Next,
    0x58 "add" InlineNone Next,
    0x59 "sub" InlineNone Next,
    0x5A "mul" InlineNone Next,
    0x5B "div" InlineNone Next,
    0x5C "div.un" InlineNone Next,
    0x5D "rem" InlineNone Next,
    0x5E "rem.un" InlineNone Next,
    0x5F "and" InlineNone Next,
    0x60 "or" InlineNone Next,
    0x61 "xor" InlineNone Next,
    0x62 "shl" InlineNone Next,
    0x63 "shr" InlineNone Next,
    0x64 "shr.un" InlineNone Next,
    0x65 "neg" InlineNone Next,
    0x66 "not" InlineNone Next,
    0x67 "conv.i1" InlineNone Next,
    0x68 "conv.i2" InlineNone Next,
    0x69 "conv.i4" InlineNone Next,
    0x6A "conv.i8" InlineNone Next,
    0x6B "conv.r4" InlineNone Next,
    0x6C "conv.r8" InlineNone Next,
    0x6D "conv.u4" InlineNone Next,
    0x6E "conv.u8" InlineNone Next,
    0x6F "callvirt" InlineMethod Call,
    0x70 "cpobj" InlineType Next,
    0x71 "ldobj" InlineType Next,
    0x72 "ldstr" InlineString Next,
    0x73 "newobj" InlineMethod Call,
    0x74 "castclass" InlineType Next,
    0x75 "isinst" InlineType Next,
    0x76 "conv.r.un" InlineNone Next,
    0x79 "unbox" InlineType Next,
    0x7A "throw" InlineNone Throw,
    0x7B "ldfld" InlineField Next,
    0x7C "ldflda" InlineField Next,
    0x7D "stfld" InlineField Next,
    0x7E "ldsfld" InlineField Next,
    0x7F "ldsflda" InlineField Next,
    0x80 "stsfld" InlineField Next,
    0x81 "stobj" InlineType Next,
    0x82 "conv.ovf.i1.un" InlineNone Next,
    0x83 "conv.ovf.i2.un" InlineNone Next,
    0x84 "conv.ovf.i4.un" InlineNone Next,
    0x85 "conv.ovf.i8.un" InlineNone Next,
    0x86 "conv.ovf.u1.un" InlineNone Next,
    0x87 "conv.ovf.u2.un" InlineNone Next,
    0x88 "conv.ovf.u4.un" InlineNone Next,
    0x89 "conv.ovf.u8.un" InlineNone Next,
    0x8A "conv.ovf.i.un" InlineNone Next,
    0x8B "conv.ovf.u.un" InlineNone Next,
    0x8C "box" InlineType Next,
    0x8D "newarr" InlineType Next,
    0x8E "ldlen" InlineNone Next,
    0x8F "ldelema" InlineType Next,
    0x90 "ldelem.i1" InlineNone Next,
    0x91 "ldelem.u1" InlineNone Next,
    0x92 "ldelem.i2" InlineNone Next,
    0x93 "ldelem.u2" InlineNone Next,
    0x94 "ldelem.i4" InlineNone Next,
    0x95 "ldelem.u4" InlineNone Next,
    0x96 "ldelem.i8" InlineNone Next,
    0x97 "ldelem.i" InlineNone Next,
    0x98 "ldelem.r4" InlineNone Next,
    0x99 "ldelem.r8" InlineNone Next,
    0x9A "ldelem.ref" InlineNone Next,
    0x9B "stelem.i" InlineNone Next,
    0x9C "stelem.i1" InlineNone Next,
    0x9D "stelem.i2" InlineNone Next,
    0x9E "stelem.i4" InlineNone Next,
    0x9F "stelem.i8" InlineNone Next,
    0xA0 "stelem.r4" InlineNone Next,
    0xA1 "stelem.r8" InlineNone Next,
    0xA2 "stelem.ref" InlineNone Next,
    0xA3 "ldelem" InlineType Next,
    0xA4 "stelem" InlineType Next,
    0xA5 "unbox.any" InlineType Next,
    0xB3 "conv.ovf.i1" InlineNone Next,
    0xB4 "conv.ovf.u1" InlineNone Next,
    0xB5 "conv.ovf.i2" InlineNone Next,
    0xB6 "conv.ovf.u2" InlineNone Next,
    0xB7 "conv.ovf.i4" InlineNone Next,
    0xB8 "conv.ovf.u4" InlineNone Next,
    0xB9 "conv.ovf.i8" InlineNone Next,
    0xBA "conv.ovf.u8" InlineNone Next,
    0xC2 "refanyval" InlineType Next,
    0xC3 "ckfinite" InlineNone Next,
    0xC6 "mkrefany" InlineType Next,
    0xD0 "ldtoken" InlineTok Next,
    0xD1 "conv.u2" InlineNone Next,
    0xD2 "conv.u1" InlineNone Next,
    0xD3 "conv.i" InlineNone Next,
    0xD4 "conv.ovf.i" InlineNone Next,
    0xD5 "conv.ovf.u" InlineNone Next,
    0xD6 "add.ovf" InlineNone Next,
    0xD7 "add.ovf.un" InlineNone Next,
    0xD8 "mul.ovf" InlineNone Next,
    0xD9 "mul.ovf.un" InlineNone Next,
    0xDA "sub.ovf" InlineNone Next,
    0xDB "sub.ovf.un" InlineNone Next,
    0xDC "endfinally" InlineNone Return,
    0xDD "leave" InlineBrTarget Branch,
    0xDE "leave.s" ShortInlineBrTarget Branch,
    0xDF "stind.i" InlineNone Next,
    0xE0 "conv.u" InlineNone Next,
};

const TWO_BYTE_DEFINITIONS: &[OpCode] = two_byte! {
    0x00 "arglist" InlineNone Next,
    0x01 "ceq" InlineNone Next,
    0x02 "cgt" InlineNone Next,
    0x03 "cgt.un" InlineNone Next,
    0x04 "clt" InlineNone Next,
    0x05 "clt.un" InlineNone Next,
    0x06 "ldftn" InlineMethod Next,
    0x07 "ldvirtftn" InlineMethod Next,
    0x09 "ldarg" InlineArg Next,
    0x0A "ldarga" InlineArg Next,
    0x0B "starg" InlineArg Next,
    0x0C "ldloc" InlineVar Next,
    0x0D "ldloca" InlineVar Next,
    0x0E "stloc" InlineVar Next,
    0x0F "localloc" InlineNone Next,
    0x11 "endfilter" InlineNone Return,
    0x12 "unaligned." ShortInlineI Meta,
    0x13 "volatile." InlineNone Meta,
    0x14 "tail." InlineNone Meta,
    0x15 "initobj" InlineType Next,
    0x16 "constrained." InlineType Meta,
    0x17 "cpblk" InlineNone Next,
    0x18 "initblk" InlineNone Next,
    0x19 "no." ShortInlineI Meta,
    0x1A "rethrow" InlineNone Throw,
    0x1C "sizeof" InlineType Next,
    0x1D "refanytype" InlineNone Next,
    0x1E "readonly." InlineNone Meta,
};

const fn build_table(definitions: &[OpCode], op1: Option<u8>) -> [OpCode; 256] {
    let mut table = [reserved(0, 0); 256];

    let mut slot = 0;
    while slot < 256 {
        #[allow(clippy::cast_possible_truncation)]
        let byte = slot as u8;
        table[slot] = match op1 {
            Some(prefix) => reserved(prefix, byte),
            None => reserved(byte, byte),
        };
        slot += 1;
    }

    let mut index = 0;
    while index < definitions.len() {
        let definition = definitions[index];
        table[definition.op2 as usize] = definition;
        index += 1;
    }

    table
}

/// One-byte opcodes, indexed by the opcode byte
pub static INSTRUCTIONS: [OpCode; 256] = build_table(ONE_BYTE_DEFINITIONS, None);

/// Two-byte opcodes, indexed by the byte following [`FE_PREFIX`]
pub static INSTRUCTIONS_FE: [OpCode; 256] = build_table(TWO_BYTE_DEFINITIONS, Some(FE_PREFIX));

/// Look up an opcode by mnemonic.
#[must_use]
pub fn by_name(name: &str) -> Option<&'static OpCode> {
    INSTRUCTIONS
        .iter()
        .chain(INSTRUCTIONS_FE.iter())
        .find(|opcode| !opcode.is_reserved() && opcode.name == name)
}
