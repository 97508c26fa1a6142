//! Instruction set definitions.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the
//! canonical instruction table and invokes a callback macro for code
//! generation, so the assembler and the interpreter derive their encodings
//! from a single definition list. Adding an opcode means adding one row here
//! plus its mnemonic dispatch in the assembler and its handler in the
//! interpreter.
//!
//! This module generates:
//! - The [`OpCode`] enum with explicit discriminants and `TryFrom<u8>`
//! - Per-opcode metadata: mnemonic, [`Group`], fixed byte size, operand kinds
//! - The decoded instruction sum type [`Instr`] with `encode`/`decode`
//!
//! # Encoding
//!
//! Instructions use fixed per-opcode widths so the interpreter can advance
//! `IP` deterministically without a separate length table:
//! - Opcode: 1 byte
//! - Register operand: 1 byte (register id)
//! - Literal operand: 4 bytes (big-endian)
//! - Address operand: 4 bytes (big-endian)

use crate::errors::VmError;
use crate::memory::Memory;
use crate::registers::Register;
use std::fmt;

/// Mnemonic family, used to group instructions in disassembly output.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Group {
    Move,
    Stack,
    Arith,
    Jump,
    Control,
}

impl Group {
    pub const fn name(&self) -> &'static str {
        match self {
            Group::Move => "move",
            Group::Stack => "stack",
            Group::Arith => "arith",
            Group::Jump => "jump",
            Group::Control => "control",
        }
    }
}

/// Operand shape for one encoded instruction field.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OperandKind {
    /// 4-byte big-endian literal.
    Lit,
    /// 1-byte register id.
    Reg,
    /// 4-byte big-endian address.
    Addr,
}

impl OperandKind {
    /// Encoded width of this operand in bytes.
    pub const fn size(&self) -> usize {
        match self {
            OperandKind::Reg => 1,
            OperandKind::Lit | OperandKind::Addr => 4,
        }
    }
}

/// Invokes a callback macro with the complete instruction definition list.
///
/// Row format: `Name = opcode, "MNEMONIC", Group => [field: Kind, ...]`.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Control
            // =========================
            /// HALT ; stop execution
            Halt = 0x00, "HALT", Control => [],
            /// RET ; pop the current call frame and resume at the saved address
            Return = 0x01, "RET", Control => [],
            /// CALL target ; push a call frame and jump to target
            Call = 0x02, "CALL", Control => [target: Addr],
            // =========================
            // Moves
            // =========================
            /// MOV $lit reg ; reg = lit
            MovLitReg = 0x10, "MOV_LIT_REG", Move => [value: Lit, dst: Reg],
            /// MOV src dst ; dst = src
            MovRegReg = 0x11, "MOV_REG_REG", Move => [src: Reg, dst: Reg],
            /// MOV &addr reg ; reg = mem32[addr]
            MovMemReg = 0x12, "MOV_MEM_REG", Move => [addr: Addr, dst: Reg],
            /// MOV $lit &addr ; mem32[addr] = lit
            MovLitMem = 0x13, "MOV_LIT_MEM", Move => [value: Lit, addr: Addr],
            /// MOV reg &addr ; mem32[addr] = reg
            MovRegMem = 0x14, "MOV_REG_MEM", Move => [src: Reg, addr: Addr],
            /// MOV &src &dst ; mem32[dst] = mem32[src]
            MovMemMem = 0x15, "MOV_MEM_MEM", Move => [src: Addr, dst: Addr],
            // =========================
            // Stack
            // =========================
            /// PUSH $lit ; SP -= 4; mem32[SP] = lit
            PushLit = 0x20, "PUSH_LIT", Stack => [value: Lit],
            /// PUSH reg ; SP -= 4; mem32[SP] = reg
            PushReg = 0x21, "PUSH_REG", Stack => [src: Reg],
            /// POP reg ; reg = mem32[SP]; SP += 4
            PopReg = 0x22, "POP_REG", Stack => [dst: Reg],
            // =========================
            // Arithmetic
            // =========================
            /// ADD $lit reg ; reg += lit (wrapping)
            AddLitReg = 0x30, "ADD_LIT_REG", Arith => [value: Lit, dst: Reg],
            /// ADD src dst ; dst += src (wrapping)
            AddRegReg = 0x31, "ADD_REG_REG", Arith => [src: Reg, dst: Reg],
            /// ADD a b dst ; dst = a + b (wrapping)
            AddRegRegReg = 0x32, "ADD_REG_REG_REG", Arith => [a: Reg, b: Reg, dst: Reg],
            /// SUB $lit reg ; reg -= lit (wrapping)
            SubLitReg = 0x33, "SUB_LIT_REG", Arith => [value: Lit, dst: Reg],
            /// SUB src dst ; dst -= src (wrapping)
            SubRegReg = 0x34, "SUB_REG_REG", Arith => [src: Reg, dst: Reg],
            /// INC reg ; reg += 1 (wrapping)
            IncReg = 0x35, "INC_REG", Arith => [reg: Reg],
            /// DEC reg ; reg -= 1 (wrapping)
            DecReg = 0x36, "DEC_REG", Arith => [reg: Reg],
            /// INC &addr ; mem32[addr] += 1 (wrapping)
            IncMem = 0x37, "INC_MEM", Arith => [addr: Addr],
            /// DEC &addr ; mem32[addr] -= 1 (wrapping)
            DecMem = 0x38, "DEC_MEM", Arith => [addr: Addr],
            // =========================
            // Jumps (flagless; conditions compare ACC against the operand)
            // =========================
            /// JMP target ; IP = target
            Jmp = 0x40, "JMP", Jump => [target: Addr],
            /// JNE reg target ; if ACC != reg then IP = target
            JmpNe = 0x41, "JMP_NE", Jump => [rhs: Reg, target: Addr],
            /// JE reg target ; if ACC == reg then IP = target
            JmpEq = 0x42, "JMP_EQ", Jump => [rhs: Reg, target: Addr],
            /// JG reg target ; if ACC > reg then IP = target
            JmpGt = 0x43, "JMP_GT", Jump => [rhs: Reg, target: Addr],
            /// JL reg target ; if ACC < reg then IP = target
            JmpLt = 0x44, "JMP_LT", Jump => [rhs: Reg, target: Addr],
            /// JGE reg target ; if ACC >= reg then IP = target
            JmpGe = 0x45, "JMP_GE", Jump => [rhs: Reg, target: Addr],
            /// JLE reg target ; if ACC <= reg then IP = target
            JmpLe = 0x46, "JMP_LE", Jump => [rhs: Reg, target: Addr],
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal, $group:ident => [
                $( $field:ident : $kind:ident ),* $(,)?
            ]
        ),* $(,)?
    ) => {
        /// Opcode space of the VM.
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum OpCode {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for OpCode {
            type Error = VmError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(OpCode::$name), )*
                    _ => Err(VmError::InvalidOpcode {
                        opcode: value,
                        addr: 0,
                    }),
                }
            }
        }

        impl OpCode {
            /// Returns the canonical mnemonic for this opcode.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( OpCode::$name => $mnemonic, )*
                }
            }

            /// Returns the mnemonic group for this opcode.
            pub const fn group(&self) -> Group {
                match self {
                    $( OpCode::$name => Group::$group, )*
                }
            }

            /// Total encoded size of this instruction: opcode byte plus operands.
            pub const fn byte_size(&self) -> usize {
                match self {
                    $(
                        OpCode::$name => {
                            1usize $( + define_instructions!(@size $kind) )*
                        }
                    )*
                }
            }

            /// Ordered operand shapes following the opcode byte.
            pub const fn operand_kinds(&self) -> &'static [OperandKind] {
                match self {
                    $( OpCode::$name => &[ $( OperandKind::$kind ),* ], )*
                }
            }
        }

        /// One decoded instruction carrying its operands.
        ///
        /// Decoded once per step, then matched; operand widths never have to
        /// be re-derived at the execution site.
        #[derive(Clone, Debug, Eq, PartialEq)]
        pub enum Instr {
            $(
                $(#[$doc])*
                $name {
                    $( $field: define_instructions!(@ty $kind) ),*
                },
            )*
        }

        impl Instr {
            /// Returns the opcode of this instruction.
            pub const fn opcode(&self) -> OpCode {
                match self {
                    $( Instr::$name { .. } => OpCode::$name, )*
                }
            }

            /// Total encoded byte size of this instruction.
            pub const fn byte_size(&self) -> usize {
                self.opcode().byte_size()
            }

            /// Appends the encoded form of this instruction to `out`.
            pub fn encode(&self, out: &mut Vec<u8>) {
                match self {
                    $(
                        Instr::$name { $( $field ),* } => {
                            out.push($opcode);
                            $( define_instructions!(@emit out, $kind, $field); )*
                        }
                    )*
                }
            }

            /// Decodes the instruction starting at `addr` in the program image.
            ///
            /// Fails with [`VmError::InvalidOpcode`] (carrying the offending
            /// address and byte) on an opcode outside the known set, and with
            /// [`VmError::OutOfBounds`] when operands run past the image.
            #[allow(unused_mut, unused_assignments)]
            pub fn decode(image: &Memory, addr: u32) -> Result<Self, VmError> {
                let byte = image.read8(addr)?;
                let op = OpCode::try_from(byte)
                    .map_err(|_| VmError::InvalidOpcode { opcode: byte, addr })?;
                let mut cursor = addr.wrapping_add(1);
                Ok(match op {
                    $(
                        OpCode::$name => {
                            $(
                                let $field =
                                    define_instructions!(@decode image, cursor, $kind);
                            )*
                            Instr::$name { $( $field ),* }
                        }
                    )*
                })
            }
        }

        impl fmt::Display for Instr {
            /// Renders the instruction with assembly operand sigils.
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $(
                        Instr::$name { $( $field ),* } => {
                            f.write_str(OpCode::$name.mnemonic())?;
                            $( define_instructions!(@fmt f, $kind, $field); )*
                            Ok(())
                        }
                    )*
                }
            }
        }
    };

    // ---------- operand types ----------
    (@ty Lit)  => { u32 };
    (@ty Reg)  => { Register };
    (@ty Addr) => { u32 };

    // ---------- operand sizes ----------
    (@size Lit)  => { 4usize };
    (@size Reg)  => { 1usize };
    (@size Addr) => { 4usize };

    // ---------- encoding ----------
    (@emit $out:ident, Lit, $v:ident) => {
        $out.extend_from_slice(&$v.to_be_bytes());
    };
    (@emit $out:ident, Reg, $v:ident) => {
        $out.push(*$v as u8);
    };
    (@emit $out:ident, Addr, $v:ident) => {
        $out.extend_from_slice(&$v.to_be_bytes());
    };

    // ---------- decoding ----------
    (@decode $image:ident, $cursor:ident, Lit) => {{
        let v = $image.read32($cursor)?;
        $cursor = $cursor.wrapping_add(4);
        v
    }};
    (@decode $image:ident, $cursor:ident, Reg) => {{
        let b = $image.read8($cursor)?;
        $cursor = $cursor.wrapping_add(1);
        Register::try_from(b)?
    }};
    (@decode $image:ident, $cursor:ident, Addr) => {{
        let v = $image.read32($cursor)?;
        $cursor = $cursor.wrapping_add(4);
        v
    }};

    // ---------- rendering ----------
    (@fmt $f:ident, Lit, $v:ident) => {
        write!($f, " ${:#x}", $v)?;
    };
    (@fmt $f:ident, Reg, $v:ident) => {
        write!($f, " {}", $v.mnemonic().to_ascii_lowercase())?;
    };
    (@fmt $f:ident, Addr, $v:ident) => {
        write!($f, " &{:#x}", $v)?;
    };
}

for_each_instruction!(define_instructions);

#[cfg(test)]
mod tests {
    use super::*;

    /// Every opcode reachable from its discriminant byte.
    const ALL_OPCODES: [OpCode; 28] = [
        OpCode::Halt,
        OpCode::Return,
        OpCode::Call,
        OpCode::MovLitReg,
        OpCode::MovRegReg,
        OpCode::MovMemReg,
        OpCode::MovLitMem,
        OpCode::MovRegMem,
        OpCode::MovMemMem,
        OpCode::PushLit,
        OpCode::PushReg,
        OpCode::PopReg,
        OpCode::AddLitReg,
        OpCode::AddRegReg,
        OpCode::AddRegRegReg,
        OpCode::SubLitReg,
        OpCode::SubRegReg,
        OpCode::IncReg,
        OpCode::DecReg,
        OpCode::IncMem,
        OpCode::DecMem,
        OpCode::Jmp,
        OpCode::JmpNe,
        OpCode::JmpEq,
        OpCode::JmpGt,
        OpCode::JmpLt,
        OpCode::JmpGe,
        OpCode::JmpLe,
    ];

    #[test]
    fn discriminants_are_unique() {
        let mut seen = [false; 256];
        for op in ALL_OPCODES {
            assert!(!seen[op as usize], "duplicate opcode {:#04x}", op as u8);
            seen[op as usize] = true;
        }
    }

    #[test]
    fn mnemonics_are_unique() {
        for (i, a) in ALL_OPCODES.iter().enumerate() {
            for b in &ALL_OPCODES[i + 1..] {
                assert_ne!(a.mnemonic(), b.mnemonic());
            }
        }
    }

    #[test]
    fn byte_size_matches_operand_kinds() {
        for op in ALL_OPCODES {
            let expected: usize = 1 + op.operand_kinds().iter().map(OperandKind::size).sum::<usize>();
            assert_eq!(op.byte_size(), expected, "{}", op.mnemonic());
        }
    }

    #[test]
    fn canonical_byte_sizes() {
        assert_eq!(OpCode::Halt.byte_size(), 1);
        assert_eq!(OpCode::Return.byte_size(), 1);
        assert_eq!(OpCode::PushLit.byte_size(), 5);
        assert_eq!(OpCode::PushReg.byte_size(), 2);
        assert_eq!(OpCode::PopReg.byte_size(), 2);
        assert_eq!(OpCode::MovLitReg.byte_size(), 6);
        assert_eq!(OpCode::MovRegReg.byte_size(), 3);
        assert_eq!(OpCode::MovMemReg.byte_size(), 6);
        assert_eq!(OpCode::MovLitMem.byte_size(), 9);
        assert_eq!(OpCode::MovRegMem.byte_size(), 6);
        assert_eq!(OpCode::MovMemMem.byte_size(), 9);
        assert_eq!(OpCode::AddLitReg.byte_size(), 6);
        assert_eq!(OpCode::AddRegReg.byte_size(), 3);
        assert_eq!(OpCode::AddRegRegReg.byte_size(), 4);
        assert_eq!(OpCode::IncReg.byte_size(), 2);
        assert_eq!(OpCode::IncMem.byte_size(), 5);
        assert_eq!(OpCode::Jmp.byte_size(), 5);
        assert_eq!(OpCode::JmpNe.byte_size(), 6);
        assert_eq!(OpCode::Call.byte_size(), 5);
    }

    #[test]
    fn try_from_rejects_unknown_byte() {
        assert!(matches!(
            OpCode::try_from(0xFF),
            Err(VmError::InvalidOpcode { opcode: 0xFF, .. })
        ));
    }

    #[test]
    fn encode_mov_lit_reg_layout() {
        let instr = Instr::MovLitReg {
            value: 0x12345678,
            dst: Register::R2,
        };
        let mut out = Vec::new();
        instr.encode(&mut out);
        assert_eq!(
            out,
            vec![
                OpCode::MovLitReg as u8,
                0x12,
                0x34,
                0x56,
                0x78,
                Register::R2 as u8
            ]
        );
    }

    #[test]
    fn encode_decode_roundtrip() {
        let samples = vec![
            Instr::Halt {},
            Instr::Return {},
            Instr::MovLitReg { value: 7, dst: Register::Acc },
            Instr::MovMemMem { src: 0x10, dst: 0x20 },
            Instr::PushLit { value: u32::MAX },
            Instr::AddRegRegReg { a: Register::R1, b: Register::R2, dst: Register::R3 },
            Instr::JmpLe { rhs: Register::R4, target: 0xDEAD },
            Instr::Call { target: 0x40 },
        ];
        let mut image = Vec::new();
        for instr in &samples {
            instr.encode(&mut image);
        }
        let image = Memory::from_vec(image);
        let mut addr = 0u32;
        for expected in &samples {
            let decoded = Instr::decode(&image, addr).unwrap();
            assert_eq!(&decoded, expected);
            addr += decoded.byte_size() as u32;
        }
        assert_eq!(addr as usize, image.len());
    }

    #[test]
    fn decode_truncated_operand_fails() {
        // MOV_LIT_REG needs 5 operand bytes; provide 2.
        let image = Memory::from_vec(vec![OpCode::MovLitReg as u8, 0x00, 0x01]);
        assert!(matches!(
            Instr::decode(&image, 0),
            Err(VmError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn decode_invalid_register_fails() {
        let image = Memory::from_vec(vec![OpCode::IncReg as u8, 0x7F]);
        assert!(matches!(
            Instr::decode(&image, 0),
            Err(VmError::InvalidRegisterId { id: 0x7F })
        ));
    }

    #[test]
    fn display_uses_assembly_sigils() {
        let instr = Instr::MovLitReg {
            value: 0x1F,
            dst: Register::R1,
        };
        assert_eq!(instr.to_string(), "MOV_LIT_REG $0x1f r1");
        let instr = Instr::JmpNe {
            rhs: Register::R2,
            target: 0x40,
        };
        assert_eq!(instr.to_string(), "JMP_NE r2 &0x40");
    }

    #[test]
    fn groups_follow_families() {
        assert_eq!(OpCode::MovRegMem.group(), Group::Move);
        assert_eq!(OpCode::PushReg.group(), Group::Stack);
        assert_eq!(OpCode::SubLitReg.group(), Group::Arith);
        assert_eq!(OpCode::JmpGe.group(), Group::Jump);
        assert_eq!(OpCode::Call.group(), Group::Control);
        assert_eq!(OpCode::Halt.group(), Group::Control);
    }
}
