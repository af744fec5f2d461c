//! Binary encoder for modules
//!
//! The inverse of the decoder: produces module images byte-for-byte in the
//! format [`super::decoder::decode`] reads. Used to build fixtures and to
//! re-encode decoded modules.

use std::collections::HashMap;
use std::fmt;

use super::debug_info::write_debug_lines;
use super::module::Module;
use super::opcodes::{Arity, Opcode};
use super::types::{Field, ObjType, Type, TypeRef};

/// Largest magnitude the 4-byte index form can carry
pub const INDEX_MAX_MAGNITUDE: i64 = (1 << 29) - 1;

/// Encoding error
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeError {
    /// Value does not fit the variable-length index encoding
    IndexOutOfRange(i64),
    /// Name is not present in the module's string pool
    MissingString(String),
    /// A count that must fit in one byte does not
    CountTooLarge { what: &'static str, count: usize },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfRange(v) => write!(f, "Index {} out of encodable range", v),
            Self::MissingString(s) => write!(f, "String {:?} is not in the string pool", s),
            Self::CountTooLarge { what, count } => {
                write!(f, "Too many {} for a one-byte count: {}", what, count)
            }
        }
    }
}

impl std::error::Error for EncodeError {}

pub type EncodeResult<T> = Result<T, EncodeError>;

/// Primitive byte sink
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    out: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn write_u8(&mut self, b: u8) {
        self.out.push(b);
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    pub fn write_i32(&mut self, v: i32) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.out.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a signed variable-length index in its shortest form
    pub fn write_index(&mut self, v: i32) -> EncodeResult<()> {
        if (0..0x80).contains(&v) {
            self.out.push(v as u8);
            return Ok(());
        }
        let magnitude = (v as i64).abs();
        let sign = if v < 0 { 0x20u8 } else { 0 };
        if magnitude < 0x2000 {
            self.out.push(0x80 | sign | (magnitude >> 8) as u8);
            self.out.push((magnitude & 0xFF) as u8);
        } else if magnitude <= INDEX_MAX_MAGNITUDE {
            self.out.push(0xC0 | sign | (magnitude >> 24) as u8);
            self.out.push(((magnitude >> 16) & 0xFF) as u8);
            self.out.push(((magnitude >> 8) & 0xFF) as u8);
            self.out.push((magnitude & 0xFF) as u8);
        } else {
            return Err(EncodeError::IndexOutOfRange(v as i64));
        }
        Ok(())
    }

    pub fn write_uindex(&mut self, v: usize) -> EncodeResult<()> {
        if v as i64 > INDEX_MAX_MAGNITUDE {
            return Err(EncodeError::IndexOutOfRange(v as i64));
        }
        self.write_index(v as i32)
    }

    /// Write a string pool: block size, NUL-separated block, then lengths
    pub fn write_strings<S: AsRef<str>>(&mut self, strings: &[S]) -> EncodeResult<()> {
        let block: usize = strings.iter().map(|s| s.as_ref().len() + 1).sum();
        self.write_i32(block as i32);
        for s in strings {
            self.out.extend_from_slice(s.as_ref().as_bytes());
            self.out.push(0);
        }
        for s in strings {
            self.write_uindex(s.as_ref().len())?;
        }
        Ok(())
    }
}

/// Encodes a whole [`Module`]
pub struct ModuleWriter<'m> {
    module: &'m Module,
    w: ByteWriter,
    string_index: HashMap<&'m str, usize>,
}

impl<'m> ModuleWriter<'m> {
    pub fn new(module: &'m Module) -> Self {
        let mut string_index = HashMap::new();
        for (i, s) in module.strings.iter().enumerate() {
            string_index.entry(s.as_str()).or_insert(i);
        }
        Self {
            module,
            w: ByteWriter::new(),
            string_index,
        }
    }

    /// Encode a module into a fresh buffer
    pub fn encode(module: &'m Module) -> EncodeResult<Vec<u8>> {
        let mut writer = Self::new(module);
        writer.write_module()?;
        Ok(writer.w.into_bytes())
    }

    fn string(&mut self, s: &str) -> EncodeResult<()> {
        let index = *self
            .string_index
            .get(s)
            .ok_or_else(|| EncodeError::MissingString(s.to_string()))?;
        self.w.write_index(index as i32)
    }

    fn type_ref(&mut self, t: TypeRef) -> EncodeResult<()> {
        self.w.write_uindex(t.0)
    }

    fn write_module(&mut self) -> EncodeResult<()> {
        let m = self.module;
        self.w.write_raw(b"HLB");
        self.w.write_u8(m.version);
        self.w.write_uindex(m.flags)?;
        self.w.write_uindex(m.ints.len())?;
        self.w.write_uindex(m.floats.len())?;
        self.w.write_uindex(m.strings.len())?;
        if m.version >= 5 {
            self.w.write_uindex(m.bytes_pos.len())?;
        }
        self.w.write_uindex(m.types.len())?;
        self.w.write_uindex(m.globals.len())?;
        self.w.write_uindex(m.natives.len())?;
        self.w.write_uindex(m.functions.len())?;
        if m.version >= 4 {
            self.w.write_uindex(m.constants.len())?;
        }
        self.w.write_uindex(m.entrypoint)?;

        for &i in &m.ints {
            self.w.write_i32(i);
        }
        for &f in &m.floats {
            self.w.write_f64(f);
        }
        self.w.write_strings(&m.strings)?;
        if m.version >= 5 {
            self.w.write_i32(m.bytes.len() as i32);
            self.w.write_raw(&m.bytes);
            for &p in &m.bytes_pos {
                self.w.write_uindex(p)?;
            }
        }
        if m.has_debug() {
            self.w.write_uindex(m.debug_files.len())?;
            self.w.write_strings(&m.debug_files)?;
        }

        for t in &m.types {
            self.write_type(t)?;
        }
        for &g in &m.globals {
            self.type_ref(g)?;
        }
        for n in &m.natives {
            self.string(&n.lib)?;
            self.string(&n.name)?;
            self.type_ref(n.ty)?;
            self.w.write_uindex(n.findex)?;
        }
        for f in &m.functions {
            self.type_ref(f.ty)?;
            self.w.write_uindex(f.findex)?;
            self.w.write_uindex(f.regs.len())?;
            self.w.write_uindex(f.ops.len())?;
            for &r in &f.regs {
                self.type_ref(r)?;
            }
            for op in &f.ops {
                self.write_opcode(op)?;
            }
            if m.has_debug() {
                let lines = f.debug.as_deref().unwrap_or(&[]);
                let mut bytes = Vec::new();
                write_debug_lines(&mut bytes, lines);
                self.w.write_raw(&bytes);
                if m.version >= 3 {
                    self.w.write_uindex(f.assigns.len())?;
                    for a in &f.assigns {
                        self.string(&a.name)?;
                        self.w.write_index(a.at)?;
                    }
                }
            }
        }
        if m.version >= 4 {
            for c in &m.constants {
                self.w.write_uindex(c.global)?;
                self.w.write_uindex(c.fields.len())?;
                for &f in &c.fields {
                    self.w.write_uindex(f)?;
                }
            }
        }
        Ok(())
    }

    fn write_fields(&mut self, fields: &[Field]) -> EncodeResult<()> {
        for f in fields {
            self.string(&f.name)?;
            self.type_ref(f.ty)?;
        }
        Ok(())
    }

    fn write_obj(&mut self, o: &ObjType) -> EncodeResult<()> {
        self.string(&o.name)?;
        match o.super_type {
            Some(t) => self.w.write_index(t.0 as i32)?,
            None => self.w.write_index(-1)?,
        }
        self.w.write_uindex(o.global.map_or(0, |g| g + 1))?;
        self.w.write_uindex(o.fields.len())?;
        self.w.write_uindex(o.protos.len())?;
        self.w.write_uindex(o.bindings.len())?;
        self.write_fields(&o.fields)?;
        for p in &o.protos {
            self.string(&p.name)?;
            self.w.write_uindex(p.findex)?;
            self.w.write_index(p.pindex)?;
        }
        for b in &o.bindings {
            self.w.write_uindex(b.field)?;
            self.w.write_uindex(b.findex)?;
        }
        Ok(())
    }

    fn write_type(&mut self, t: &Type) -> EncodeResult<()> {
        self.w.write_u8(t.kind() as u8);
        match t {
            Type::Fun(f) | Type::Method(f) => {
                if f.args.len() > u8::MAX as usize {
                    return Err(EncodeError::CountTooLarge { what: "arguments", count: f.args.len() });
                }
                self.w.write_u8(f.args.len() as u8);
                for &a in &f.args {
                    self.type_ref(a)?;
                }
                self.type_ref(f.ret)?;
            }
            Type::Obj(o) | Type::Struct(o) => self.write_obj(o)?,
            Type::Ref(inner) | Type::Null(inner) | Type::Packed(inner) => self.type_ref(*inner)?,
            Type::Virtual(v) => {
                self.w.write_uindex(v.fields.len())?;
                self.write_fields(&v.fields)?;
            }
            Type::Abstract(name) => self.string(name)?,
            Type::Enum(e) => {
                self.string(&e.name)?;
                self.w.write_uindex(e.global.map_or(0, |g| g + 1))?;
                if e.constructs.len() > u8::MAX as usize {
                    return Err(EncodeError::CountTooLarge { what: "constructs", count: e.constructs.len() });
                }
                self.w.write_u8(e.constructs.len() as u8);
                for c in &e.constructs {
                    self.string(&c.name)?;
                    self.w.write_uindex(c.params.len())?;
                    for &p in &c.params {
                        self.type_ref(p)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn write_opcode(&mut self, op: &Opcode) -> EncodeResult<()> {
        self.w.write_u8(op.kind.to_byte());
        match op.kind.arity() {
            Arity::Fixed(n) => {
                for i in 0..n {
                    self.w.write_index(op.p(i))?;
                }
            }
            Arity::CallLike => {
                let args = op.call_args();
                if args.len() > u8::MAX as usize {
                    return Err(EncodeError::CountTooLarge { what: "call arguments", count: args.len() });
                }
                self.w.write_index(op.p(0))?;
                self.w.write_index(op.p(1))?;
                self.w.write_u8(args.len() as u8);
                for &a in args {
                    self.w.write_index(a)?;
                }
            }
            Arity::Switch => {
                let offsets = op.switch_offsets();
                self.w.write_uindex(op.p(0).max(0) as usize)?;
                self.w.write_uindex(offsets.len())?;
                for &o in offsets {
                    self.w.write_uindex(o.max(0) as usize)?;
                }
                let end = op.params.last().copied().unwrap_or(0);
                self.w.write_uindex(end.max(0) as usize)?;
            }
        }
        Ok(())
    }
}
