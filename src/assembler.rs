//! Two-pass assembler for the VM's mnemonic language.
//!
//! The emission pass tokenizes each line, dispatches on the mnemonic, and
//! appends the fixed-width encoding to the program buffer, leaving a 4-byte
//! placeholder wherever a jump or call names a label and recording the patch
//! site. The resolution pass overwrites every placeholder with the resolved
//! address, big-endian; an undefined label there fails the whole assembly.
//! Forward references are therefore free, and the emitted bytes are
//! identical to assembling the same program with pre-resolved addresses.
//!
//! # Syntax
//!
//! ```text
//! start:                  ; label definition (instruction may share the line)
//!     mov $0x01 r1        ; $ prefixes a literal (0x / 0b bases supported)
//!     mov r1 &0x1234      ; & prefixes a memory address
//!     jne r1 start        ; jump targets are labels or &addr
//!     halt
//! ```
//!
//! - Mnemonics are lower-case (`mov`, `push`, `pop`, `add`, `sub`, `inc`,
//!   `dec`, `jmp`, `jne`, `je`, `jg`, `jl`, `jge`, `jle`, `call`, `ret`,
//!   `halt`)
//! - Registers are bare, case-insensitive names (`r1`..`r4`, `acc`, `ip`,
//!   `sp`, `fp`)
//! - Comments start with `;`; commas between operands are optional

use crate::errors::VmError;
use crate::isa::Instr;
use crate::program::Program;
use crate::registers::Register;
use std::collections::HashMap;
use std::fmt::Write;
use std::fs;
use std::path::Path;

const COMMENT_CHAR: char = ';';
const LABEL_SUFFIX: char = ':';
const LIT_SIGIL: char = '$';
const ADDR_SIGIL: char = '&';

/// Address width of a label placeholder in the encoded stream.
const PLACEHOLDER_LEN: usize = 4;

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column of the token in its line.
    column: usize,
}

/// Tokenizes one line: strips the `;` comment, splits on whitespace and
/// commas, and keeps column positions for diagnostics.
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let code = match line.find(COMMENT_CHAR) {
        Some(i) => &line[..i],
        None => line,
    };

    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in code.char_indices() {
        if c.is_whitespace() || c == ',' {
            if let Some(s) = start.take() {
                out.push(Token {
                    text: &code[s..i],
                    column: s + 1,
                });
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.push(Token {
            text: &code[s..],
            column: s + 1,
        });
    }
    out
}

/// Parses an unsigned number with base auto-detection (`0x`, `0b`, decimal).
fn parse_number(digits: &str, token: &str) -> Result<u32, VmError> {
    let parsed = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X"))
    {
        u32::from_str_radix(hex, 16)
    } else if let Some(bin) = digits.strip_prefix("0b").or_else(|| digits.strip_prefix("0B")) {
        u32::from_str_radix(bin, 2)
    } else {
        digits.parse::<u32>()
    };
    parsed.map_err(|_| VmError::InvalidLiteral {
        token: token.to_string(),
    })
}

/// One parsed operand token.
#[derive(Debug, Clone)]
enum Operand<'a> {
    /// `$`-prefixed literal.
    Lit(u32),
    /// `&`-prefixed memory address.
    Addr(u32),
    /// Bare register name.
    Reg(Register),
    /// Bare token that is not a register: a label reference.
    Label(&'a str),
}

fn parse_operand<'a>(token: &Token<'a>) -> Result<Operand<'a>, VmError> {
    let text = token.text;
    if let Some(digits) = text.strip_prefix(LIT_SIGIL) {
        Ok(Operand::Lit(parse_number(digits, text)?))
    } else if let Some(digits) = text.strip_prefix(ADDR_SIGIL) {
        Ok(Operand::Addr(parse_number(digits, text)?))
    } else if let Ok(reg) = Register::from_name(text) {
        Ok(Operand::Reg(reg))
    } else {
        Ok(Operand::Label(text))
    }
}

/// Checks if a token defines a label (ends with `:`).
fn is_label_def(token: &str) -> bool {
    token.ends_with(LABEL_SUFFIX) && token.len() > 1
}

fn label_name(token: &str) -> &str {
    &token[..token.len() - 1]
}

/// A jump or call target: either an explicit address or a label reference
/// that still needs patching.
fn jump_target<'a>(op: &Operand<'a>, mnemonic: &str) -> Result<(u32, Option<&'a str>), VmError> {
    match op {
        Operand::Addr(addr) => Ok((*addr, None)),
        Operand::Label(label) => Ok((0, Some(label))),
        Operand::Lit(_) | Operand::Reg(_) => Err(VmError::OperandMismatch {
            mnemonic: mnemonic.to_string(),
        }),
    }
}

/// Placeholder patch site recorded during the emission pass.
struct PatchSite {
    label: String,
    /// Program address of the 4 placeholder bytes.
    addr: u32,
    line: usize,
    column: usize,
}

/// Encodes one instruction line, recording a patch site when the target is a
/// label. Returns the instruction together with the label still to resolve.
fn parse_line<'a>(tokens: &[Token<'a>]) -> Result<(Instr, Option<&'a str>), VmError> {
    let mnemonic = tokens[0].text;
    let ops = tokens[1..]
        .iter()
        .map(parse_operand)
        .collect::<Result<Vec<_>, _>>()?;

    let mismatch = || VmError::OperandMismatch {
        mnemonic: mnemonic.to_string(),
    };

    let mut pending: Option<&str> = None;
    let instr = match mnemonic {
        "mov" => match ops.as_slice() {
            [Operand::Lit(value), Operand::Reg(dst)] => Instr::MovLitReg {
                value: *value,
                dst: *dst,
            },
            [Operand::Reg(src), Operand::Reg(dst)] => Instr::MovRegReg {
                src: *src,
                dst: *dst,
            },
            [Operand::Addr(addr), Operand::Reg(dst)] => Instr::MovMemReg {
                addr: *addr,
                dst: *dst,
            },
            [Operand::Lit(value), Operand::Addr(addr)] => Instr::MovLitMem {
                value: *value,
                addr: *addr,
            },
            [Operand::Reg(src), Operand::Addr(addr)] => Instr::MovRegMem {
                src: *src,
                addr: *addr,
            },
            [Operand::Addr(src), Operand::Addr(dst)] => Instr::MovMemMem {
                src: *src,
                dst: *dst,
            },
            _ => return Err(mismatch()),
        },
        "push" => match ops.as_slice() {
            [Operand::Lit(value)] => Instr::PushLit { value: *value },
            [Operand::Reg(src)] => Instr::PushReg { src: *src },
            _ => return Err(mismatch()),
        },
        "pop" => match ops.as_slice() {
            [Operand::Reg(dst)] => Instr::PopReg { dst: *dst },
            _ => return Err(mismatch()),
        },
        "add" => match ops.as_slice() {
            [Operand::Lit(value), Operand::Reg(dst)] => Instr::AddLitReg {
                value: *value,
                dst: *dst,
            },
            [Operand::Reg(src), Operand::Reg(dst)] => Instr::AddRegReg {
                src: *src,
                dst: *dst,
            },
            [Operand::Reg(a), Operand::Reg(b), Operand::Reg(dst)] => Instr::AddRegRegReg {
                a: *a,
                b: *b,
                dst: *dst,
            },
            _ => return Err(mismatch()),
        },
        "sub" => match ops.as_slice() {
            [Operand::Lit(value), Operand::Reg(dst)] => Instr::SubLitReg {
                value: *value,
                dst: *dst,
            },
            [Operand::Reg(src), Operand::Reg(dst)] => Instr::SubRegReg {
                src: *src,
                dst: *dst,
            },
            _ => return Err(mismatch()),
        },
        "inc" => match ops.as_slice() {
            [Operand::Reg(reg)] => Instr::IncReg { reg: *reg },
            [Operand::Addr(addr)] => Instr::IncMem { addr: *addr },
            _ => return Err(mismatch()),
        },
        "dec" => match ops.as_slice() {
            [Operand::Reg(reg)] => Instr::DecReg { reg: *reg },
            [Operand::Addr(addr)] => Instr::DecMem { addr: *addr },
            _ => return Err(mismatch()),
        },
        "jmp" => match ops.as_slice() {
            [target] => {
                let (target, label) = jump_target(target, mnemonic)?;
                pending = label;
                Instr::Jmp { target }
            }
            _ => return Err(mismatch()),
        },
        "jne" | "je" | "jg" | "jl" | "jge" | "jle" => match ops.as_slice() {
            [Operand::Reg(rhs), target] => {
                let (target, label) = jump_target(target, mnemonic)?;
                pending = label;
                let rhs = *rhs;
                match mnemonic {
                    "jne" => Instr::JmpNe { rhs, target },
                    "je" => Instr::JmpEq { rhs, target },
                    "jg" => Instr::JmpGt { rhs, target },
                    "jl" => Instr::JmpLt { rhs, target },
                    "jge" => Instr::JmpGe { rhs, target },
                    _ => Instr::JmpLe { rhs, target },
                }
            }
            _ => return Err(mismatch()),
        },
        "call" => match ops.as_slice() {
            [target] => {
                let (target, label) = jump_target(target, mnemonic)?;
                pending = label;
                Instr::Call { target }
            }
            _ => return Err(mismatch()),
        },
        "ret" => match ops.as_slice() {
            [] => Instr::Return {},
            _ => return Err(mismatch()),
        },
        "halt" => match ops.as_slice() {
            [] => Instr::Halt {},
            _ => return Err(mismatch()),
        },
        other => {
            return Err(VmError::UnknownMnemonic {
                name: other.to_string(),
            });
        }
    };

    Ok((instr, pending))
}

/// Runs both assembly passes over the source.
fn assemble(source: &str) -> Result<Vec<u8>, VmError> {
    let mut out: Vec<u8> = Vec::new();
    let mut labels: HashMap<String, u32> = HashMap::new();
    let mut patches: Vec<PatchSite> = Vec::new();

    // Emission pass: encode line by line, placeholders for label targets.
    for (idx, line) in source.lines().enumerate() {
        let line_no = idx + 1;
        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }

        let mut tokens = &tokens[..];
        if is_label_def(tokens[0].text) {
            let name = label_name(tokens[0].text);
            if labels.insert(name.to_string(), out.len() as u32).is_some() {
                return Err(located(
                    line_no,
                    tokens[0].column,
                    VmError::DuplicateLabel {
                        label: name.to_string(),
                    },
                ));
            }
            // An instruction may share the line with its label.
            tokens = &tokens[1..];
            if tokens.is_empty() {
                continue;
            }
        }

        let (instr, pending) =
            parse_line(tokens).map_err(|e| located(line_no, tokens[0].column, e))?;
        let at = out.len() as u32;
        instr.encode(&mut out);
        if let Some(label) = pending {
            patches.push(PatchSite {
                label: label.to_string(),
                addr: at + (instr.byte_size() - PLACEHOLDER_LEN) as u32,
                line: line_no,
                column: tokens[0].column,
            });
        }
    }

    // Resolution pass: every placeholder must find its label.
    for patch in patches {
        let target = labels.get(&patch.label).copied().ok_or_else(|| {
            located(
                patch.line,
                patch.column,
                VmError::UndefinedLabel {
                    label: patch.label.clone(),
                },
            )
        })?;
        let site = patch.addr as usize;
        out[site..site + PLACEHOLDER_LEN].copy_from_slice(&target.to_be_bytes());
    }

    Ok(out)
}

/// Wraps an assembly error with its source location.
fn located(line: usize, column: usize, err: VmError) -> VmError {
    VmError::Assembly {
        line,
        column,
        message: err.to_string(),
    }
}

/// Formats a compiler-style diagnostic for an assembly failure.
fn render_diagnostic(file: &str, source: &str, line: usize, column: usize, message: &str) -> String {
    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{column}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let underline = " ".repeat(column.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, raw_line.trim_end_matches('\r'));
        let _ = writeln!(diag, "  | {}^", underline);
    }

    diag
}

/// Emits a diagnostic to stderr for an assembly failure.
fn log_assembly_error(file: &str, source: &str, err: &VmError) {
    if let VmError::Assembly {
        line,
        column,
        message,
    } = err
    {
        eprintln!("{}", render_diagnostic(file, source, *line, *column, message));
    } else {
        eprintln!("error: {err}");
    }
}

/// Assembles a full source string into a program image.
///
/// Fails on the first syntax error (unknown mnemonic, unknown register,
/// malformed literal, operand mismatch) and on any unresolved label; no
/// partial program is ever produced.
pub fn assemble_source(source: &str) -> Result<Program, VmError> {
    assemble_source_with_name(source, "<source>")
}

fn assemble_source_with_name(source: &str, source_name: &str) -> Result<Program, VmError> {
    let result = assemble(source);
    if let Err(err) = &result {
        log_assembly_error(source_name, source, err);
    }
    result.map(Program::from_vec)
}

/// Convenience: assemble directly from a file path.
pub fn assemble_file<P: AsRef<Path>>(path: P) -> Result<Program, VmError> {
    let path = path.as_ref();
    let source = fs::read_to_string(path).map_err(|e| VmError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    assemble_source_with_name(&source, &path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::OpCode;

    #[test]
    fn tokenize_strips_comments_and_commas() {
        let tokens = tokenize("  mov $1, r1  ; set it up");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, vec!["mov", "$1", "r1"]);
        assert_eq!(tokens[0].column, 3);
        assert_eq!(tokens[1].column, 7);
    }

    #[test]
    fn tokenize_comment_only_line() {
        assert!(tokenize("; nothing here").is_empty());
        assert!(tokenize("").is_empty());
        assert!(tokenize("   \t ").is_empty());
    }

    #[test]
    fn parse_number_bases() {
        assert_eq!(parse_number("42", "$42").unwrap(), 42);
        assert_eq!(parse_number("0x1F", "$0x1F").unwrap(), 0x1F);
        assert_eq!(parse_number("0B1010", "$0B1010").unwrap(), 10);
        assert_eq!(parse_number("0xffffffff", "x").unwrap(), u32::MAX);
    }

    #[test]
    fn parse_number_rejects_garbage() {
        assert!(matches!(
            parse_number("12z", "$12z"),
            Err(VmError::InvalidLiteral { ref token }) if token == "$12z"
        ));
        assert!(parse_number("", "$").is_err());
        assert!(parse_number("0x", "$0x").is_err());
    }

    #[test]
    fn assemble_empty_source() {
        let program = assemble_source("").unwrap();
        assert!(program.is_empty());
        let program = assemble_source("\n; comment\n\n").unwrap();
        assert!(program.is_empty());
    }

    #[test]
    fn assemble_mov_lit_reg_layout() {
        let program = assemble_source("mov $0x12345678 r1").unwrap();
        assert_eq!(
            program.as_bytes(),
            &[
                OpCode::MovLitReg as u8,
                0x12,
                0x34,
                0x56,
                0x78,
                Register::R1 as u8
            ]
        );
    }

    #[test]
    fn assemble_all_mov_shapes() {
        let source = "mov $1 r1\nmov r1 r2\nmov &0x10 r3\nmov $2 &0x20\nmov r4 &0x30\nmov &0x40 &0x50";
        let program = assemble_source(source).unwrap();
        let ops: Vec<u8> = vec![
            program.as_bytes()[0],
            program.as_bytes()[6],
            program.as_bytes()[9],
            program.as_bytes()[15],
            program.as_bytes()[24],
            program.as_bytes()[30],
        ];
        assert_eq!(
            ops,
            vec![
                OpCode::MovLitReg as u8,
                OpCode::MovRegReg as u8,
                OpCode::MovMemReg as u8,
                OpCode::MovLitMem as u8,
                OpCode::MovRegMem as u8,
                OpCode::MovMemMem as u8,
            ]
        );
        assert_eq!(program.len(), 39);
    }

    #[test]
    fn assemble_stack_ops() {
        let program = assemble_source("push $5\npush r2\npop r3").unwrap();
        let bytes = program.as_bytes();
        assert_eq!(bytes[0], OpCode::PushLit as u8);
        assert_eq!(bytes[1..5], [0, 0, 0, 5]);
        assert_eq!(bytes[5], OpCode::PushReg as u8);
        assert_eq!(bytes[6], Register::R2 as u8);
        assert_eq!(bytes[7], OpCode::PopReg as u8);
        assert_eq!(bytes[8], Register::R3 as u8);
    }

    #[test]
    fn assemble_register_names_case_insensitive() {
        let program = assemble_source("mov $1 ACC\nmov $2 Acc").unwrap();
        assert_eq!(program.as_bytes()[5], Register::Acc as u8);
        assert_eq!(program.as_bytes()[11], Register::Acc as u8);
    }

    #[test]
    fn forward_label_reference_is_patched() {
        let program = assemble_source("jmp end\nhalt\nend:\nhalt").unwrap();
        let bytes = program.as_bytes();
        assert_eq!(bytes[0], OpCode::Jmp as u8);
        // jmp is 5 bytes, halt 1: `end` resolves to 6.
        assert_eq!(bytes[1..5], [0, 0, 0, 6]);
    }

    #[test]
    fn label_resolution_matches_manual_addresses() {
        let with_labels = assemble_source("loop:\ninc r1\njmp loop\nhalt").unwrap();
        let manual = assemble_source("inc r1\njmp &0x0\nhalt").unwrap();
        assert_eq!(with_labels.as_bytes(), manual.as_bytes());
    }

    #[test]
    fn label_may_share_line_with_instruction() {
        let program = assemble_source("start: inc r1\njmp start").unwrap();
        let bytes = program.as_bytes();
        assert_eq!(bytes[0], OpCode::IncReg as u8);
        assert_eq!(bytes[3..7], [0, 0, 0, 0]);
    }

    #[test]
    fn conditional_jump_encoding() {
        let program = assemble_source("target:\njne r2 target").unwrap();
        let bytes = program.as_bytes();
        assert_eq!(bytes[0], OpCode::JmpNe as u8);
        assert_eq!(bytes[1], Register::R2 as u8);
        assert_eq!(bytes[2..6], [0, 0, 0, 0]);
    }

    #[test]
    fn undefined_label_fails_assembly() {
        let err = assemble_source("jmp nowhere\nhalt").unwrap_err();
        assert!(matches!(
            err,
            VmError::Assembly { line: 1, ref message, .. } if message.contains("undefined label")
        ));
    }

    #[test]
    fn duplicate_label_fails_assembly() {
        let err = assemble_source("dup:\nhalt\ndup:\nhalt").unwrap_err();
        assert!(matches!(
            err,
            VmError::Assembly { line: 3, ref message, .. } if message.contains("duplicate label")
        ));
    }

    #[test]
    fn unknown_mnemonic_fails_assembly() {
        let err = assemble_source("halt\nfrobnicate r1\nhalt").unwrap_err();
        assert!(matches!(
            err,
            VmError::Assembly { line: 2, ref message, .. } if message.contains("unknown mnemonic")
        ));
    }

    #[test]
    fn unknown_register_fails_assembly() {
        // `r9` is not a register, so it reads as a label: no mov form takes one.
        let err = assemble_source("mov $1 r9").unwrap_err();
        assert!(matches!(err, VmError::Assembly { line: 1, .. }));
    }

    #[test]
    fn malformed_literal_fails_assembly() {
        let err = assemble_source("mov $zz r1").unwrap_err();
        assert!(matches!(
            err,
            VmError::Assembly { line: 1, ref message, .. } if message.contains("invalid numeric literal")
        ));
    }

    #[test]
    fn wrong_operand_count_fails_assembly() {
        let err = assemble_source("pop r1 r2").unwrap_err();
        assert!(matches!(
            err,
            VmError::Assembly { line: 1, ref message, .. } if message.contains("pop")
        ));
        assert!(assemble_source("halt r1").is_err());
        assert!(assemble_source("ret $1").is_err());
    }

    #[test]
    fn jump_target_rejects_literal_and_register() {
        assert!(assemble_source("jmp $5").is_err());
        assert!(assemble_source("jmp r1").is_err());
        assert!(assemble_source("call r1").is_err());
    }

    #[test]
    fn call_accepts_label_and_address() {
        let program = assemble_source("fn:\nret\ncall fn\ncall &0x0").unwrap();
        let bytes = program.as_bytes();
        assert_eq!(bytes[0], OpCode::Return as u8);
        assert_eq!(bytes[1], OpCode::Call as u8);
        assert_eq!(bytes[2..6], [0, 0, 0, 0]);
        assert_eq!(bytes[6], OpCode::Call as u8);
        assert_eq!(bytes[7..11], [0, 0, 0, 0]);
    }

    #[test]
    fn arith_encodings() {
        let program = assemble_source("add $3 r1\nadd r1 r2\nadd r1 r2 r3\nsub $1 r4\nsub r4 acc")
            .unwrap();
        let bytes = program.as_bytes();
        assert_eq!(bytes[0], OpCode::AddLitReg as u8);
        assert_eq!(bytes[6], OpCode::AddRegReg as u8);
        assert_eq!(bytes[9], OpCode::AddRegRegReg as u8);
        assert_eq!(
            bytes[10..13],
            [
                Register::R1 as u8,
                Register::R2 as u8,
                Register::R3 as u8
            ]
        );
        assert_eq!(bytes[13], OpCode::SubLitReg as u8);
        assert_eq!(bytes[19], OpCode::SubRegReg as u8);
    }

    #[test]
    fn inc_dec_reg_and_mem() {
        let program = assemble_source("inc r1\ndec r1\ninc &0x10\ndec &0x10").unwrap();
        let bytes = program.as_bytes();
        assert_eq!(bytes[0], OpCode::IncReg as u8);
        assert_eq!(bytes[2], OpCode::DecReg as u8);
        assert_eq!(bytes[4], OpCode::IncMem as u8);
        assert_eq!(bytes[9], OpCode::DecMem as u8);
    }

    #[test]
    fn diagnostic_renders_caret_under_column() {
        let diag = render_diagnostic("demo.asm", "halt\nbogus r1", 2, 1, "unknown mnemonic: bogus");
        assert!(diag.contains("error: unknown mnemonic: bogus"));
        assert!(diag.contains(" --> demo.asm:2:1"));
        assert!(diag.contains("   2 | bogus r1"));
        assert!(diag.contains("  | ^"));
    }

    #[test]
    fn assemble_file_missing_path() {
        let err = assemble_file("/definitely/not/here.asm").unwrap_err();
        assert!(matches!(err, VmError::Io { .. }));
    }
}
