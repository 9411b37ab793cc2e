//! Decompiler for early CPython bytecode.
//!
//! The pipeline is: load a compiled module container ([`object::Module`]),
//! decode its instruction stream ([`opcode`]), rebuild an AST by simulating
//! the operand stack while recovering block structure ([`builder`]), then
//! render source text ([`printer`]).

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ast;
pub mod builder;
pub mod object;
pub mod opcode;
pub mod printer;

pub use ast::{BinOp, Block, BlockKind, CmpOp, Node, SliceKind, UnaryOp};
pub use builder::{build_code, clean_tree, BuildResult};
pub use object::{Code, Module, Object, Version};
pub use opcode::{Bytecode, Instr, Opcode};
pub use printer::{disassemble_module, print_module};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecompileMode {
    Source,
    Disasm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompileOptions {
    pub mode: DecompileMode,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self { mode: DecompileMode::Source }
    }
}

#[derive(Debug, Error)]
pub enum DepycError {
    #[error("unexpected end of input")]
    Eof,

    #[error("not a compiled module (bad magic: 0x{0:08x})")]
    BadMagic(u32),

    #[error("unsupported bytecode version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("invalid marshal tag: 0x{0:02x} at offset {1}")]
    BadMarshalTag(u8, usize),

    #[error("invalid interned string back-reference: {0}")]
    BadStringRef(u32),

    #[error("top-level marshal object is not a code object")]
    NotCode,
}

/// Result of a whole-module decompilation.
#[derive(Debug, Clone)]
pub struct DecompileOutput {
    pub text: String,
    pub clean: bool,
    pub warnings: Vec<String>,
    pub version: Version,
}

pub fn decompile(bytes: &[u8]) -> Result<DecompileOutput, DepycError> {
    decompile_with_options(bytes, DecompileOptions::default())
}

pub fn decompile_with_options(
    bytes: &[u8],
    options: DecompileOptions,
) -> Result<DecompileOutput, DepycError> {
    let module = Module::load(bytes)?;
    let output = match options.mode {
        DecompileMode::Source => printer::print_module(&module),
        DecompileMode::Disasm => printer::disassemble_module(&module),
    };
    Ok(output)
}
