use thiserror::Error;

/// Errors that can occur during assembly or execution.
#[derive(Debug, Error)]
pub enum VmError {
    /// Unknown opcode byte in the program image.
    #[error("unknown opcode {opcode:#04x} at address {addr:#010x}")]
    InvalidOpcode { opcode: u8, addr: u32 },
    /// Register id outside the closed register set (corrupt program image).
    #[error("invalid register id {id:#04x}")]
    InvalidRegisterId { id: u8 },
    /// Unrecognized instruction mnemonic during assembly.
    #[error("unknown mnemonic: {name}")]
    UnknownMnemonic { name: String },
    /// Register name outside the closed register set.
    #[error("unknown register: {name}")]
    UnknownRegister { name: String },
    /// Malformed numeric literal.
    #[error("invalid numeric literal: {token}")]
    InvalidLiteral { token: String },
    /// Operand list does not match any encoding of the mnemonic.
    #[error("operands do not match any encoding of {mnemonic}")]
    OperandMismatch { mnemonic: String },
    /// Label defined more than once.
    #[error("duplicate label: {label}")]
    DuplicateLabel { label: String },
    /// Jump or call target that is never defined.
    #[error("undefined label: {label}")]
    UndefinedLabel { label: String },
    /// Assembly failure with source location context.
    #[error("line {line}: {message}")]
    Assembly {
        line: usize,
        column: usize,
        message: String,
    },
    /// Memory access outside the owned buffer.
    #[error("memory access out of bounds: address {addr:#010x}, width {len}, memory size {size}")]
    OutOfBounds { addr: u32, len: usize, size: usize },
    /// File I/O failure in the assembler front end.
    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },
}
