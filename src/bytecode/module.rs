//! Decoded module representation
//!
//! A [`Module`] owns every pool and table read from the binary image. It is
//! immutable once decoded and outlives the whole compilation run.

use super::opcodes::Opcode;
use super::reader::Diagnostic;
use super::types::{FunType, Type, TypeRef};

/// Lowest supported module version
pub const MIN_VERSION: u8 = 2;
/// Highest supported module version
pub const MAX_VERSION: u8 = 5;
/// Module flag bit: the image carries debug information
pub const FLAG_DEBUG: usize = 1;

/// Source position of one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugLine {
    pub file: usize,
    pub line: u32,
}

/// Name given to a register by the source compiler
#[derive(Debug, Clone, PartialEq)]
pub struct RegisterName {
    pub name: String,
    /// Instruction index where the assignment happens (negative for arguments)
    pub at: i32,
}

/// A function with a body
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub findex: usize,
    pub ty: TypeRef,
    /// Register types; the first `nargs` registers are the parameters
    pub regs: Vec<TypeRef>,
    pub ops: Vec<Opcode>,
    /// One entry per instruction when the module has debug info
    pub debug: Option<Vec<DebugLine>>,
    pub assigns: Vec<RegisterName>,
}

/// A bodiless function bound to an external library symbol
#[derive(Debug, Clone, PartialEq)]
pub struct Native {
    pub findex: usize,
    pub lib: String,
    pub name: String,
    pub ty: TypeRef,
}

/// Initial value of an object global
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub global: usize,
    /// Pool indices, one per field of the global's object type
    pub fields: Vec<usize>,
}

/// What a function index designates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    /// Position in [`Module::functions`]
    Function(usize),
    /// Position in [`Module::natives`]
    Native(usize),
}

/// Mapping from function index to position in the function/native tables
///
/// Functions and natives share one index space. The table stores a single
/// position per index: values below the function-table length address
/// functions, the rest address natives offset by that length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionTable {
    positions: Vec<Option<usize>>,
    function_count: usize,
}

impl FunctionTable {
    pub fn build(functions: &[Function], natives: &[Native]) -> Self {
        let max = functions
            .iter()
            .map(|f| f.findex)
            .chain(natives.iter().map(|n| n.findex))
            .max();
        let mut positions = vec![None; max.map_or(0, |m| m + 1)];
        for (i, f) in functions.iter().enumerate() {
            positions[f.findex] = Some(i);
        }
        for (i, n) in natives.iter().enumerate() {
            positions[n.findex] = Some(i + functions.len());
        }
        Self {
            positions,
            function_count: functions.len(),
        }
    }

    /// Table position of a function index
    #[inline]
    pub fn position(&self, findex: usize) -> Option<usize> {
        self.positions.get(findex).copied().flatten()
    }

    /// Resolve a table position into a function or native
    #[inline]
    pub fn classify(&self, position: usize) -> Callee {
        if position >= self.function_count {
            Callee::Native(position - self.function_count)
        } else {
            Callee::Function(position)
        }
    }

    /// Resolve a function index
    pub fn resolve(&self, findex: usize) -> Option<Callee> {
        self.position(findex).map(|p| self.classify(p))
    }

    /// Size of the function index space
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// A decoded bytecode module
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub version: u8,
    pub flags: usize,
    pub ints: Vec<i32>,
    pub floats: Vec<f64>,
    pub strings: Vec<String>,
    /// Byte-blob block (version 5 and later)
    pub bytes: Vec<u8>,
    /// Start of each blob inside `bytes`
    pub bytes_pos: Vec<usize>,
    pub debug_files: Vec<String>,
    pub types: Vec<Type>,
    pub globals: Vec<TypeRef>,
    pub natives: Vec<Native>,
    pub functions: Vec<Function>,
    pub constants: Vec<Constant>,
    pub entrypoint: usize,
    pub function_table: FunctionTable,
    /// Lenient data errors patched while decoding
    pub diagnostics: Vec<Diagnostic>,
}

impl Module {
    /// An empty module of the given version, with no pools or tables
    pub fn empty(version: u8) -> Self {
        Self {
            version,
            flags: 0,
            ints: Vec::new(),
            floats: Vec::new(),
            strings: Vec::new(),
            bytes: Vec::new(),
            bytes_pos: Vec::new(),
            debug_files: Vec::new(),
            types: Vec::new(),
            globals: Vec::new(),
            natives: Vec::new(),
            functions: Vec::new(),
            constants: Vec::new(),
            entrypoint: 0,
            function_table: FunctionTable::default(),
            diagnostics: Vec::new(),
        }
    }

    /// Rebuild the function-index table after editing the function tables
    pub fn rebuild_function_table(&mut self) {
        self.function_table = FunctionTable::build(&self.functions, &self.natives);
    }

    /// Check if the image carried debug information
    #[inline]
    pub fn has_debug(&self) -> bool {
        self.flags & FLAG_DEBUG != 0
    }

    #[inline]
    pub fn get_type(&self, r: TypeRef) -> Option<&Type> {
        r.resolve(&self.types)
    }

    /// Signature of a function type reference
    pub fn fun_type(&self, r: TypeRef) -> Option<&FunType> {
        self.get_type(r).and_then(Type::as_fun)
    }

    pub fn string(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }

    /// Raw bytes of a blob from the byte pool
    ///
    /// A blob runs from its start position to the next blob's start (or the
    /// end of the block for the last one).
    pub fn bytes_blob(&self, index: usize) -> Option<&[u8]> {
        let start = *self.bytes_pos.get(index)?;
        let end = self
            .bytes_pos
            .iter()
            .copied()
            .filter(|&p| p > start)
            .min()
            .unwrap_or(self.bytes.len());
        self.bytes.get(start..end)
    }

    /// Resolve a function index through the function table
    pub fn resolve_findex(&self, findex: usize) -> Option<Callee> {
        self.function_table.resolve(findex)
    }

    /// Signature of whatever a function index designates
    pub fn findex_type(&self, findex: usize) -> Option<TypeRef> {
        match self.resolve_findex(findex)? {
            Callee::Function(i) => self.functions.get(i).map(|f| f.ty),
            Callee::Native(i) => self.natives.get(i).map(|n| n.ty),
        }
    }

    /// Function with the given function index
    pub fn function_by_findex(&self, findex: usize) -> Option<&Function> {
        match self.resolve_findex(findex)? {
            Callee::Function(i) => self.functions.get(i),
            Callee::Native(_) => None,
        }
    }
}
