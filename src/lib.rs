//! HLBridge - HLB bytecode to managed stack-machine compiler
//!
//! Decodes an HLB bytecode image into a [`Module`] and compiles it into a
//! class-based [`TargetModule`]: source types become type declarations,
//! source functions become methods, and register instructions are
//! translated into stack instructions.
//!
//! # Pipeline
//!
//! ```text
//! bytes → decode → Module → Compiler (types, globals, functions) → TargetModule
//! ```
//!
//! # Example
//!
//! ```ignore
//! use hlbridge::{compile_bytes, CompilerConfig};
//!
//! let bytes = std::fs::read("app.hl")?;
//! let target = compile_bytes(&bytes, &CompilerConfig::default())?;
//! println!("{}", target.listing());
//! ```
//!
//! The crate never installs a `tracing` subscriber; callers decide where
//! diagnostics go.

pub mod bytecode;
pub mod compiler;
pub mod config;
pub mod target;

use std::fmt;

use rayon::prelude::*;

pub use bytecode::{decode, DecodeError, DecodeErrorKind, DecodeResult, Module};
pub use compiler::{CompileError, CompileResult, CompileStats, Compiler};
pub use config::{CompilerConfig, SafeCastPolicy, TranslationMode};
pub use target::TargetModule;

/// Errors from the full decode + compile pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Decode(DecodeError),
    Compile(CompileError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Decode(e) => write!(f, "decode error: {}", e),
            Error::Compile(e) => write!(f, "compile error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Decode(e) => Some(e),
            Error::Compile(e) => Some(e),
        }
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<CompileError> for Error {
    fn from(e: CompileError) -> Self {
        Error::Compile(e)
    }
}

/// Decode and compile one bytecode image
pub fn compile_bytes(bytes: &[u8], config: &CompilerConfig) -> Result<TargetModule, Error> {
    let module = decode(bytes)?;
    Ok(Compiler::new(config.clone()).compile(&module)?)
}

/// Decode and compile several images in parallel
///
/// Each image gets its own module and registry; results keep input order.
pub fn compile_many(images: &[&[u8]], config: &CompilerConfig) -> Vec<Result<TargetModule, Error>> {
    images
        .par_iter()
        .map(|bytes| compile_bytes(bytes, config))
        .collect()
}
