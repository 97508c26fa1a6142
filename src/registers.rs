//! Register file.

use crate::errors::VmError;

/// Number of registers in the file.
pub const REGISTER_COUNT: usize = 8;

/// Closed register set of the VM.
///
/// `ACC` is the implicit left operand of conditional jumps. `IP`, `SP` and
/// `FP` are the instruction, stack and frame pointers. Every instruction
/// operand naming a register resolves to one of these.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Register {
    /// Accumulator.
    Acc = 0x00,
    R1,
    R2,
    R3,
    R4,
    /// Instruction pointer.
    Ip,
    /// Stack pointer.
    Sp,
    /// Frame pointer.
    Fp,
}

impl Register {
    /// All registers in id order.
    pub const ALL: [Register; REGISTER_COUNT] = [
        Register::Acc,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::Ip,
        Register::Sp,
        Register::Fp,
    ];

    /// Returns the assembly name of this register.
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Register::Acc => "ACC",
            Register::R1 => "R1",
            Register::R2 => "R2",
            Register::R3 => "R3",
            Register::R4 => "R4",
            Register::Ip => "IP",
            Register::Sp => "SP",
            Register::Fp => "FP",
        }
    }

    /// Case-insensitive lookup of a register by its assembly name.
    pub fn from_name(name: &str) -> Result<Register, VmError> {
        Register::ALL
            .into_iter()
            .find(|reg| name.eq_ignore_ascii_case(reg.mnemonic()))
            .ok_or_else(|| VmError::UnknownRegister {
                name: name.to_string(),
            })
    }
}

impl TryFrom<u8> for Register {
    type Error = VmError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Register::ALL
            .get(value as usize)
            .copied()
            .ok_or(VmError::InvalidRegisterId { id: value })
    }
}

/// Fixed register file with per-register modified bits.
///
/// The modified bits feed the debug display only; they never influence
/// control flow or arithmetic.
#[derive(Clone, Debug)]
pub struct RegisterFile {
    values: [u32; REGISTER_COUNT],
    modified: [bool; REGISTER_COUNT],
}

impl RegisterFile {
    /// Creates a register file with every register zeroed.
    pub fn new() -> Self {
        Self {
            values: [0; REGISTER_COUNT],
            modified: [false; REGISTER_COUNT],
        }
    }

    /// Current value of `reg`.
    pub fn get(&self, reg: Register) -> u32 {
        self.values[reg as usize]
    }

    /// Stores `value` into `reg` and marks it modified.
    pub fn set(&mut self, reg: Register, value: u32) {
        self.values[reg as usize] = value;
        self.modified[reg as usize] = true;
    }

    /// Adds `delta` to `reg`, wrapping on 32-bit overflow.
    pub fn inc(&mut self, reg: Register, delta: u32) {
        self.set(reg, self.get(reg).wrapping_add(delta));
    }

    /// Subtracts `delta` from `reg`, wrapping on 32-bit underflow.
    pub fn dec(&mut self, reg: Register, delta: u32) {
        self.set(reg, self.get(reg).wrapping_sub(delta));
    }

    /// Whether `reg` has been written since the last [`reset_modified`].
    ///
    /// [`reset_modified`]: RegisterFile::reset_modified
    pub fn is_modified(&self, reg: Register) -> bool {
        self.modified[reg as usize]
    }

    /// Clears every modified bit.
    pub fn reset_modified(&mut self) {
        self.modified = [false; REGISTER_COUNT];
    }

    /// Read-only snapshot of every register with its modified bit.
    pub fn snapshot(&self) -> [(Register, u32, bool); REGISTER_COUNT] {
        let mut out = [(Register::Acc, 0, false); REGISTER_COUNT];
        for (slot, reg) in out.iter_mut().zip(Register::ALL) {
            *slot = (reg, self.get(reg), self.is_modified(reg));
        }
        out
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}
