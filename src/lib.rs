//! Virtual machine library.
//!
//! Provides a byte-addressable big-endian memory, a fixed register file, a
//! closed instruction set, a two-pass label-resolving assembler, and a
//! fetch-decode-execute interpreter.

pub mod assembler;
pub mod errors;
pub mod interpreter;
pub mod isa;
pub mod memory;
pub mod program;
pub mod registers;
pub mod utils;
