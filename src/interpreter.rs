//! Fetch-decode-execute interpreter.
//!
//! The interpreter borrows an immutable [`Program`] and owns its own working
//! memory and register file. Each [`step`] decodes the instruction under
//! `IP`, advances `IP` by the instruction's full encoded width, and then
//! executes it; control-flow instructions overwrite `IP` afterwards, so a
//! not-taken branch falls through to the next instruction with no special
//! casing. Any runtime fault (unknown opcode, out-of-bounds access) halts
//! the machine and surfaces as an error.
//!
//! [`step`]: Interpreter::step

use crate::errors::VmError;
use crate::isa::Instr;
use crate::memory::{Memory, DEFAULT_MEMORY_SIZE};
use crate::program::Program;
use crate::registers::{Register, RegisterFile};


/// Width of one stack slot in bytes.
pub const STACK_WIDTH: u32 = 4;

/// Registers saved and restored by the CALL/RETURN frame protocol, in push
/// order. RETURN restores them by popping in reverse.
const FRAME_REGISTERS: [Register; 5] = [
    Register::R1,
    Register::R2,
    Register::R3,
    Register::R4,
    Register::Acc,
];

/// The virtual machine proper.
///
/// The stack grows downward from the top of working memory; `SP` points at
/// the most recently pushed slot. `FP` anchors the current call frame and
/// moves only on CALL and RETURN.
pub struct Interpreter<'a> {
    program: &'a Program,
    memory: Memory,
    registers: RegisterFile,
    running: bool,
    /// Call depth, for RETURN-at-top-level detection.
    frames: usize,
}

impl<'a> Interpreter<'a> {
    /// Creates an interpreter with the default 64 KiB working memory.
    pub fn new(program: &'a Program) -> Self {
        Self::with_memory_size(program, DEFAULT_MEMORY_SIZE)
    }

    /// Creates an interpreter with `memory_size` bytes of working memory.
    /// `SP` and `FP` start one past the highest address, so the first push
    /// lands in the topmost slot.
    pub fn with_memory_size(program: &'a Program, memory_size: usize) -> Self {
        let mut registers = RegisterFile::new();
        registers.set(Register::Sp, memory_size as u32);
        registers.set(Register::Fp, memory_size as u32);
        registers.reset_modified();
        Self {
            program,
            memory: Memory::new(memory_size),
            registers,
            running: true,
            frames: 0,
        }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn program(&self) -> &Program {
        self.program
    }

    /// Whether the machine is still willing to execute instructions.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Runs from `entry` to completion and returns the final `ACC` value.
    pub fn run(&mut self, entry: u32) -> Result<u32, VmError> {
        self.run_with_hook(entry, |_| {})
    }

    /// Like [`run`], invoking `hook` before the first step and after every
    /// executed instruction. Drives the debugger's register display.
    ///
    /// [`run`]: Interpreter::run
    pub fn run_with_hook<F>(&mut self, entry: u32, mut hook: F) -> Result<u32, VmError>
    where
        F: FnMut(&Interpreter<'a>),
    {
        self.registers.set(Register::Ip, entry);
        self.registers.reset_modified();
        self.running = true;
        hook(self);
        while self.running {
            self.registers.reset_modified();
            self.step()?;
            hook(self);
        }
        Ok(self.registers.get(Register::Acc))
    }

    /// Executes one instruction. Returns `Ok(false)` once the machine has
    /// halted; stepping a halted machine is a no-op.
    pub fn step(&mut self) -> Result<bool, VmError> {
        if !self.running {
            return Ok(false);
        }
        let ip = self.registers.get(Register::Ip);
        let instr = match Instr::decode(self.program.image(), ip) {
            Ok(instr) => instr,
            Err(err) => {
                self.running = false;
                return Err(err);
            }
        };
        // IP advances past the whole encoding before execution, so jumps
        // overwrite it and faults leave it pointing at the next instruction.
        self.registers
            .set(Register::Ip, ip.wrapping_add(instr.byte_size() as u32));
        if let Err(err) = self.exec(&instr) {
            self.running = false;
            return Err(err);
        }
        Ok(self.running)
    }

    fn exec(&mut self, instr: &Instr) -> Result<(), VmError> {
        match *instr {
            Instr::Halt {} => self.running = false,
            Instr::Return {} => self.op_return()?,
            Instr::Call { target } => self.op_call(target)?,
            Instr::MovLitReg { value, dst } => self.registers.set(dst, value),
            Instr::MovRegReg { src, dst } => {
                let value = self.registers.get(src);
                self.registers.set(dst, value);
            }
            Instr::MovMemReg { addr, dst } => {
                let value = self.memory.read32(addr)?;
                self.registers.set(dst, value);
            }
            Instr::MovLitMem { value, addr } => {
                self.memory.write32(addr, value)?;
            }
            Instr::MovRegMem { src, addr } => {
                self.memory.write32(addr, self.registers.get(src))?;
            }
            Instr::MovMemMem { src, dst } => {
                let value = self.memory.read32(src)?;
                self.memory.write32(dst, value)?;
            }
            Instr::PushLit { value } => self.op_push(value)?,
            Instr::PushReg { src } => {
                let value = self.registers.get(src);
                self.op_push(value)?;
            }
            Instr::PopReg { dst } => {
                let value = self.op_pop()?;
                self.registers.set(dst, value);
            }
            Instr::AddLitReg { value, dst } => self.registers.inc(dst, value),
            Instr::AddRegReg { src, dst } => {
                let value = self.registers.get(src);
                self.registers.inc(dst, value);
            }
            Instr::AddRegRegReg { a, b, dst } => {
                let sum = self.registers.get(a).wrapping_add(self.registers.get(b));
                self.registers.set(dst, sum);
            }
            Instr::SubLitReg { value, dst } => self.registers.dec(dst, value),
            Instr::SubRegReg { src, dst } => {
                let value = self.registers.get(src);
                self.registers.dec(dst, value);
            }
            Instr::IncReg { reg } => self.registers.inc(reg, 1),
            Instr::DecReg { reg } => self.registers.dec(reg, 1),
            Instr::IncMem { addr } => {
                let value = self.memory.read32(addr)?.wrapping_add(1);
                self.memory.write32(addr, value)?;
            }
            Instr::DecMem { addr } => {
                let value = self.memory.read32(addr)?.wrapping_sub(1);
                self.memory.write32(addr, value)?;
            }
            Instr::Jmp { target } => self.registers.set(Register::Ip, target),
            Instr::JmpNe { rhs, target } => self.op_branch(rhs, target, |acc, rhs| acc != rhs),
            Instr::JmpEq { rhs, target } => self.op_branch(rhs, target, |acc, rhs| acc == rhs),
            Instr::JmpGt { rhs, target } => self.op_branch(rhs, target, |acc, rhs| acc > rhs),
            Instr::JmpLt { rhs, target } => self.op_branch(rhs, target, |acc, rhs| acc < rhs),
            Instr::JmpGe { rhs, target } => self.op_branch(rhs, target, |acc, rhs| acc >= rhs),
            Instr::JmpLe { rhs, target } => self.op_branch(rhs, target, |acc, rhs| acc <= rhs),
        }
        Ok(())
    }

    /// Conditional jump: compares `ACC` against `rhs` and redirects `IP` to
    /// `target` when the condition holds.
    fn op_branch(&mut self, rhs: Register, target: u32, cond: fn(u32, u32) -> bool) {
        let acc = self.registers.get(Register::Acc);
        if cond(acc, self.registers.get(rhs)) {
            self.registers.set(Register::Ip, target);
        }
    }

    fn op_push(&mut self, value: u32) -> Result<(), VmError> {
        let sp = self.registers.get(Register::Sp).wrapping_sub(STACK_WIDTH);
        self.memory.write32(sp, value)?;
        self.registers.set(Register::Sp, sp);
        Ok(())
    }

    fn op_pop(&mut self) -> Result<u32, VmError> {
        let sp = self.registers.get(Register::Sp);
        let value = self.memory.read32(sp)?;
        self.registers.set(Register::Sp, sp.wrapping_add(STACK_WIDTH));
        Ok(value)
    }

    /// Pushes a call frame and transfers control.
    ///
    /// Frame layout, from high to low address: the frame registers in
    /// [`FRAME_REGISTERS`] order, the caller's `FP`, the return address.
    /// `FP` then points at the return address slot.
    fn op_call(&mut self, target: u32) -> Result<(), VmError> {
        for reg in FRAME_REGISTERS {
            let value = self.registers.get(reg);
            self.op_push(value)?;
        }
        let caller_fp = self.registers.get(Register::Fp);
        self.op_push(caller_fp)?;
        let return_addr = self.registers.get(Register::Ip);
        self.op_push(return_addr)?;
        self.registers.set(Register::Fp, self.registers.get(Register::Sp));
        self.frames += 1;
        self.registers.set(Register::Ip, target);
        Ok(())
    }

    /// Unwinds the current call frame. At frame depth zero there is no frame
    /// to pop, so RETURN halts the machine cleanly instead; `run` then
    /// yields `ACC` as the program's result.
    fn op_return(&mut self) -> Result<(), VmError> {
        if self.frames == 0 {
            self.running = false;
            return Ok(());
        }
        // Dropping SP to FP discards anything the callee left on the stack.
        let fp = self.registers.get(Register::Fp);
        self.registers.set(Register::Sp, fp);
        let return_addr = self.op_pop()?;
        let caller_fp = self.op_pop()?;
        self.registers.set(Register::Fp, caller_fp);
        for reg in FRAME_REGISTERS.iter().rev() {
            let value = self.op_pop()?;
            self.registers.set(*reg, value);
        }
        self.frames -= 1;
        self.registers.set(Register::Ip, return_addr);
        Ok(())
    }
}
