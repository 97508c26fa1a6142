//! Assembled program image.
//!
//! The binary format is a flat byte buffer of concatenated instruction
//! encodings starting at address 0, with no header or version field.
//! Persisting a program is a raw byte dump; loading it back is the inverse.

use crate::errors::VmError;
use crate::isa::Instr;
use crate::memory::Memory;
use std::fmt::Write;

/// Encoded program image produced by the assembler.
///
/// Read-only during execution; the interpreter borrows it immutably and
/// mutates only its own working memory and registers.
#[derive(Clone, Debug)]
pub struct Program {
    image: Memory,
}

impl Program {
    /// Wraps an encoded buffer without copying.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            image: Memory::from_vec(bytes),
        }
    }

    /// The program image as a [`Memory`] for instruction fetch.
    pub fn image(&self) -> &Memory {
        &self.image
    }

    /// Raw encoded bytes, suitable for a raw dump to disk.
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_slice()
    }

    /// Consumes the program, returning the encoded buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.image.into_vec()
    }

    /// Encoded length in bytes.
    pub fn len(&self) -> usize {
        self.image.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image.is_empty()
    }

    /// Renders the whole image as one instruction per line, with the
    /// address and mnemonic group of each instruction.
    ///
    /// Fails if the image does not decode cleanly end to end.
    pub fn disassemble(&self) -> Result<String, VmError> {
        let mut out = String::new();
        let mut addr = 0u32;
        while (addr as usize) < self.image.len() {
            let instr = Instr::decode(&self.image, addr)?;
            let _ = writeln!(
                out,
                "{:#010x}  [{}] {}",
                addr,
                instr.opcode().group().name(),
                instr
            );
            addr += instr.byte_size() as u32;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::OpCode;
    use crate::registers::Register;

    #[test]
    fn raw_dump_has_no_header() {
        let bytes = vec![OpCode::Halt as u8];
        let program = Program::from_vec(bytes.clone());
        assert_eq!(program.as_bytes(), &bytes[..]);
        assert_eq!(program.clone().into_bytes(), bytes);
        assert_eq!(program.len(), 1);
    }

    #[test]
    fn empty_program() {
        let program = Program::from_vec(Vec::new());
        assert!(program.is_empty());
        assert_eq!(program.disassemble().unwrap(), "");
    }

    #[test]
    fn disassemble_lists_every_instruction() {
        let mut bytes = Vec::new();
        Instr::MovLitReg {
            value: 5,
            dst: Register::R1,
        }
        .encode(&mut bytes);
        Instr::IncReg { reg: Register::R1 }.encode(&mut bytes);
        Instr::Halt {}.encode(&mut bytes);
        let program = Program::from_vec(bytes);

        let listing = program.disassemble().unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("[move] MOV_LIT_REG $0x5 r1"));
        assert!(lines[1].contains("[arith] INC_REG r1"));
        assert!(lines[2].contains("[control] HALT"));
        assert!(lines[1].starts_with("0x00000006"));
    }

    #[test]
    fn disassemble_rejects_corrupt_image() {
        let program = Program::from_vec(vec![0xEE]);
        assert!(matches!(
            program.disassemble(),
            Err(VmError::InvalidOpcode {
                opcode: 0xEE,
                addr: 0
            })
        ));
    }
}
