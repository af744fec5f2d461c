//! Decode error types for the binary module reader.

use std::fmt;

/// What went wrong while decoding
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeErrorKind {
    /// The buffer does not start with the `HLB` tag
    BadMagic([u8; 3]),
    /// Version byte outside the supported range
    UnsupportedVersion { found: u8, min: u8, max: u8 },
    /// Buffer underrun
    UnexpectedEof { wanted: usize, available: usize },
    /// Type record tag byte is not a known kind
    UnknownTypeKind(u8),
    /// Opcode byte is not a known kind
    UnknownOpcode(u8),
    /// A pooled string is not valid UTF-8
    InvalidUtf8 { index: usize },
    /// A string length points past the end of its block
    StringOutOfBlock { index: usize, end: usize, block: usize },
    /// A debug line record would cover more instructions than the function has
    DebugLineOverflow { function: u32, at: usize, count: usize, total: usize },
    /// A debug line record selects a file that does not exist
    InvalidDebugFile { file: usize, count: usize },
    /// A count field is negative or absurdly large
    InvalidCount(i64),
    /// A function or native claims an index outside the shared index space
    InvalidFunctionIndex { findex: usize, size: usize },
}

/// A fatal decode error with the byte offset where it was detected
#[derive(Debug, Clone, PartialEq)]
pub struct DecodeError {
    pub offset: usize,
    pub kind: DecodeErrorKind,
}

impl DecodeError {
    pub fn new(offset: usize, kind: DecodeErrorKind) -> Self {
        Self { offset, kind }
    }
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadMagic(found) => write!(f, "Bad magic header: expected \"HLB\", got {:?}", found),
            Self::UnsupportedVersion { found, min, max } => {
                write!(f, "Unsupported version {}: expected {}..={}", found, min, max)
            }
            Self::UnexpectedEof { wanted, available } => {
                write!(f, "Unexpected end of input: wanted {} bytes, {} available", wanted, available)
            }
            Self::UnknownTypeKind(tag) => write!(f, "Unknown type kind: {:#x}", tag),
            Self::UnknownOpcode(op) => write!(f, "Unknown opcode: {:#x}", op),
            Self::InvalidUtf8 { index } => write!(f, "String {} is not valid UTF-8", index),
            Self::StringOutOfBlock { index, end, block } => {
                write!(f, "String {} ends at {} past its block of {} bytes", index, end, block)
            }
            Self::DebugLineOverflow { function, at, count, total } => write!(
                f,
                "Debug line record in function {} covers {} ops from {} but only {} exist",
                function, count, at, total
            ),
            Self::InvalidDebugFile { file, count } => {
                write!(f, "Invalid debug file {} (module has {})", file, count)
            }
            Self::InvalidCount(n) => write!(f, "Invalid count: {}", n),
            Self::InvalidFunctionIndex { findex, size } => {
                write!(f, "Function index {} outside the index space of {}", findex, size)
            }
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at byte {:#x})", self.kind, self.offset)
    }
}

impl std::error::Error for DecodeError {}

/// Result type for decoding
pub type DecodeResult<T> = Result<T, DecodeError>;
