//! Binary module decoder
//!
//! Reads a complete module image into a [`Module`]. Structural problems (bad
//! header, unsupported version, buffer underrun, unknown tags) abort the
//! decode; out-of-range string and type indices are patched to 0 and recorded
//! as diagnostics on the module.

use tracing::{debug, trace};

use super::debug_info::read_debug_lines;
use super::error::{DecodeErrorKind, DecodeResult};
use super::module::{
    Constant, Function, FunctionTable, Module, Native, RegisterName, FLAG_DEBUG, MAX_VERSION,
    MIN_VERSION,
};
use super::opcodes::{Arity, OpKind, Opcode};
use super::reader::ByteReader;
use super::types::{
    Binding, EnumConstruct, EnumType, Field, FunType, ObjType, Proto, Type, TypeKind, TypeRef,
    VirtualType,
};

const MAGIC: &[u8; 3] = b"HLB";

/// Decode a module image
pub fn decode(bytes: &[u8]) -> DecodeResult<Module> {
    Decoder::new(bytes).run()
}

/// Table sizes announced by the header
#[derive(Debug, Default)]
struct Counts {
    ints: usize,
    floats: usize,
    strings: usize,
    bytes: usize,
    types: usize,
    globals: usize,
    natives: usize,
    functions: usize,
    constants: usize,
}

struct Decoder<'a> {
    r: ByteReader<'a>,
    strings: Vec<String>,
    ntypes: usize,
}

impl<'a> Decoder<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            r: ByteReader::new(bytes),
            strings: Vec::new(),
            ntypes: 0,
        }
    }

    fn run(mut self) -> DecodeResult<Module> {
        let magic = self.r.read_bytes(3)?;
        if magic != MAGIC {
            let mut found = [0u8; 3];
            found.copy_from_slice(magic);
            return Err(super::error::DecodeError::new(0, DecodeErrorKind::BadMagic(found)));
        }
        let version = self.r.read_u8()?;
        if !(MIN_VERSION..=MAX_VERSION).contains(&version) {
            return Err(super::error::DecodeError::new(
                3,
                DecodeErrorKind::UnsupportedVersion {
                    found: version,
                    min: MIN_VERSION,
                    max: MAX_VERSION,
                },
            ));
        }

        let flags = self.r.read_uindex()?;
        let counts = self.read_counts(version)?;
        let entrypoint = self.r.read_uindex()?;
        self.ntypes = counts.types;
        debug!(
            target: "hlbridge::decode",
            version,
            flags,
            types = counts.types,
            functions = counts.functions,
            natives = counts.natives,
            "Decoded module header"
        );

        let ints = (0..counts.ints)
            .map(|_| self.r.read_i32())
            .collect::<DecodeResult<Vec<_>>>()?;
        let floats = (0..counts.floats)
            .map(|_| self.r.read_f64())
            .collect::<DecodeResult<Vec<_>>>()?;
        self.strings = self.read_string_pool(counts.strings)?;

        let (bytes, bytes_pos) = if version >= 5 {
            self.read_bytes_pool(counts.bytes)?
        } else {
            (Vec::new(), Vec::new())
        };

        let debug_files = if flags & FLAG_DEBUG != 0 {
            let n = self.r.read_count()?;
            self.read_string_pool(n)?
        } else {
            Vec::new()
        };
        debug!(
            target: "hlbridge::decode",
            ints = ints.len(),
            floats = floats.len(),
            strings = self.strings.len(),
            blobs = bytes_pos.len(),
            debug_files = debug_files.len(),
            "Decoded constant pools"
        );

        let types = (0..counts.types)
            .map(|_| self.read_type())
            .collect::<DecodeResult<Vec<_>>>()?;
        let globals = (0..counts.globals)
            .map(|_| self.read_type_ref())
            .collect::<DecodeResult<Vec<_>>>()?;
        debug!(target: "hlbridge::decode", types = types.len(), globals = globals.len(), "Decoded type table");

        let index_space = counts.functions + counts.natives;
        let mut natives = Vec::with_capacity(counts.natives);
        for _ in 0..counts.natives {
            natives.push(self.read_native(index_space)?);
        }

        let mut functions = Vec::with_capacity(counts.functions);
        for _ in 0..counts.functions {
            functions.push(self.read_function(version, flags, index_space, debug_files.len())?);
        }
        debug!(
            target: "hlbridge::decode",
            functions = functions.len(),
            natives = natives.len(),
            "Decoded function bodies"
        );

        let mut constants = Vec::with_capacity(counts.constants);
        for _ in 0..counts.constants {
            constants.push(self.read_constant()?);
        }

        let function_table = FunctionTable::build(&functions, &natives);
        if function_table.resolve(entrypoint).is_none() {
            let at = self.r.offset();
            self.r.diagnose(at, format!("entrypoint {} does not name a function", entrypoint));
        }

        let diagnostics = self.r.take_diagnostics();
        if !diagnostics.is_empty() {
            debug!(target: "hlbridge::decode", count = diagnostics.len(), "Decoded with diagnostics");
        }

        Ok(Module {
            version,
            flags,
            ints,
            floats,
            strings: self.strings,
            bytes,
            bytes_pos,
            debug_files,
            types,
            globals,
            natives,
            functions,
            constants,
            entrypoint,
            function_table,
            diagnostics,
        })
    }

    fn read_counts(&mut self, version: u8) -> DecodeResult<Counts> {
        let mut c = Counts {
            ints: self.r.read_count()?,
            floats: self.r.read_count()?,
            strings: self.r.read_count()?,
            ..Counts::default()
        };
        if version >= 5 {
            c.bytes = self.r.read_count()?;
        }
        c.types = self.r.read_count()?;
        c.globals = self.r.read_count()?;
        c.natives = self.r.read_count()?;
        c.functions = self.r.read_count()?;
        if version >= 4 {
            c.constants = self.r.read_count()?;
        }
        Ok(c)
    }

    /// Read a block of NUL-separated strings followed by their lengths
    fn read_string_pool(&mut self, count: usize) -> DecodeResult<Vec<String>> {
        let size = self.r.read_i32()?;
        if size < 0 {
            return Err(self.r.error(DecodeErrorKind::InvalidCount(size as i64)));
        }
        let block = self.r.read_bytes(size as usize)?;
        let mut strings = Vec::with_capacity(count);
        let mut pos = 0usize;
        for index in 0..count {
            let len = self.r.read_uindex()?;
            let end = pos + len;
            if end > block.len() {
                return Err(self.r.error(DecodeErrorKind::StringOutOfBlock {
                    index,
                    end,
                    block: block.len(),
                }));
            }
            let s = std::str::from_utf8(&block[pos..end])
                .map_err(|_| self.r.error(DecodeErrorKind::InvalidUtf8 { index }))?;
            strings.push(s.to_string());
            pos = end + 1;
        }
        Ok(strings)
    }

    fn read_bytes_pool(&mut self, count: usize) -> DecodeResult<(Vec<u8>, Vec<usize>)> {
        let size = self.r.read_i32()?;
        if size < 0 {
            return Err(self.r.error(DecodeErrorKind::InvalidCount(size as i64)));
        }
        let block = self.r.read_bytes(size as usize)?.to_vec();
        let mut positions = Vec::with_capacity(count);
        for _ in 0..count {
            let at = self.r.offset();
            let p = self.r.read_uindex()?;
            if p > block.len() {
                self.r.diagnose(at, format!("blob start {} past block of {} bytes", p, block.len()));
                positions.push(0);
            } else {
                positions.push(p);
            }
        }
        Ok((block, positions))
    }

    /// Read a string-pool index; out of range falls back to string 0
    fn read_string(&mut self) -> DecodeResult<String> {
        let at = self.r.offset();
        let index = self.r.read_index()?;
        match usize::try_from(index).ok().and_then(|i| self.strings.get(i)) {
            Some(s) => Ok(s.clone()),
            None => {
                self.r.diagnose(at, format!("string index {} out of range", index));
                Ok(self.strings.first().cloned().unwrap_or_default())
            }
        }
    }

    /// Read a type-table index; out of range falls back to type 0
    fn read_type_ref(&mut self) -> DecodeResult<TypeRef> {
        let at = self.r.offset();
        let index = self.r.read_index()?;
        self.check_type_index(at, index)
    }

    fn check_type_index(&mut self, at: usize, index: i32) -> DecodeResult<TypeRef> {
        match usize::try_from(index) {
            Ok(i) if i < self.ntypes => Ok(TypeRef(i)),
            _ => {
                self.r.diagnose(at, format!("type index {} out of range", index));
                Ok(TypeRef(0))
            }
        }
    }

    fn read_global(&mut self) -> DecodeResult<Option<usize>> {
        let g = self.r.read_uindex()?;
        Ok(g.checked_sub(1))
    }

    fn read_fields(&mut self, count: usize) -> DecodeResult<Vec<Field>> {
        (0..count)
            .map(|_| {
                let name = self.read_string()?;
                let ty = self.read_type_ref()?;
                Ok(Field { name, ty })
            })
            .collect()
    }

    fn read_fun(&mut self) -> DecodeResult<FunType> {
        let nargs = self.r.read_u8()? as usize;
        let args = (0..nargs)
            .map(|_| self.read_type_ref())
            .collect::<DecodeResult<Vec<_>>>()?;
        let ret = self.read_type_ref()?;
        Ok(FunType { args, ret })
    }

    fn read_obj(&mut self) -> DecodeResult<ObjType> {
        let name = self.read_string()?;
        let at = self.r.offset();
        let super_index = self.r.read_index()?;
        let super_type = if super_index < 0 {
            None
        } else {
            Some(self.check_type_index(at, super_index)?)
        };
        let global = self.read_global()?;
        let nfields = self.r.read_count()?;
        let nprotos = self.r.read_count()?;
        let nbindings = self.r.read_count()?;
        let fields = self.read_fields(nfields)?;
        let mut protos = Vec::with_capacity(nprotos);
        for _ in 0..nprotos {
            let name = self.read_string()?;
            let findex = self.r.read_uindex()?;
            let pindex = self.r.read_index()?;
            protos.push(Proto { name, findex, pindex });
        }
        let mut bindings = Vec::with_capacity(nbindings);
        for _ in 0..nbindings {
            let field = self.r.read_uindex()?;
            let findex = self.r.read_uindex()?;
            bindings.push(Binding { field, findex });
        }
        Ok(ObjType {
            name,
            super_type,
            global,
            fields,
            protos,
            bindings,
        })
    }

    fn read_enum(&mut self) -> DecodeResult<EnumType> {
        let name = self.read_string()?;
        let global = self.read_global()?;
        let nconstructs = self.r.read_u8()? as usize;
        let mut constructs = Vec::with_capacity(nconstructs);
        for _ in 0..nconstructs {
            let cname = self.read_string()?;
            let nparams = self.r.read_count()?;
            let params = (0..nparams)
                .map(|_| self.read_type_ref())
                .collect::<DecodeResult<Vec<_>>>()?;
            constructs.push(EnumConstruct { name: cname, params });
        }
        Ok(EnumType {
            name,
            global,
            constructs,
        })
    }

    fn read_type(&mut self) -> DecodeResult<Type> {
        let tag = self.r.read_u8()?;
        let kind = TypeKind::from_byte(tag)
            .ok_or_else(|| self.r.error(DecodeErrorKind::UnknownTypeKind(tag)))?;
        Ok(match kind {
            TypeKind::Void => Type::Void,
            TypeKind::U8 => Type::U8,
            TypeKind::U16 => Type::U16,
            TypeKind::I32 => Type::I32,
            TypeKind::I64 => Type::I64,
            TypeKind::F32 => Type::F32,
            TypeKind::F64 => Type::F64,
            TypeKind::Bool => Type::Bool,
            TypeKind::Bytes => Type::Bytes,
            TypeKind::Dyn => Type::Dyn,
            TypeKind::Array => Type::Array,
            TypeKind::Type => Type::Type,
            TypeKind::DynObj => Type::DynObj,
            TypeKind::Fun => Type::Fun(self.read_fun()?),
            TypeKind::Method => Type::Method(self.read_fun()?),
            TypeKind::Obj => Type::Obj(self.read_obj()?),
            TypeKind::Struct => Type::Struct(self.read_obj()?),
            TypeKind::Ref => Type::Ref(self.read_type_ref()?),
            TypeKind::Null => Type::Null(self.read_type_ref()?),
            TypeKind::Packed => Type::Packed(self.read_type_ref()?),
            TypeKind::Virtual => {
                let n = self.r.read_count()?;
                Type::Virtual(VirtualType {
                    fields: self.read_fields(n)?,
                })
            }
            TypeKind::Abstract => Type::Abstract(self.read_string()?),
            TypeKind::Enum => Type::Enum(self.read_enum()?),
        })
    }

    fn read_findex(&mut self, index_space: usize) -> DecodeResult<usize> {
        let findex = self.r.read_uindex()?;
        if findex >= index_space {
            return Err(self.r.error(DecodeErrorKind::InvalidFunctionIndex {
                findex,
                size: index_space,
            }));
        }
        Ok(findex)
    }

    fn read_native(&mut self, index_space: usize) -> DecodeResult<Native> {
        let lib = self.read_string()?;
        let name = self.read_string()?;
        let ty = self.read_type_ref()?;
        let findex = self.read_findex(index_space)?;
        Ok(Native { findex, lib, name, ty })
    }

    fn read_opcode(&mut self) -> DecodeResult<Opcode> {
        let byte = self.r.read_u8()?;
        let kind = OpKind::from_byte(byte)
            .ok_or_else(|| self.r.error(DecodeErrorKind::UnknownOpcode(byte)))?;
        let mut op = Opcode::new(kind, &[]);
        match kind.arity() {
            Arity::Fixed(n) => {
                for _ in 0..n {
                    op.params.push(self.r.read_index()?);
                }
            }
            Arity::CallLike => {
                op.params.push(self.r.read_index()?);
                op.params.push(self.r.read_index()?);
                let count = self.r.read_u8()?;
                for _ in 0..count {
                    op.params.push(self.r.read_index()?);
                }
            }
            Arity::Switch => {
                op.params.push(self.r.read_uindex()? as i32);
                let count = self.r.read_count()?;
                for _ in 0..count {
                    op.params.push(self.r.read_uindex()? as i32);
                }
                op.params.push(self.r.read_uindex()? as i32);
            }
        }
        Ok(op)
    }

    fn read_function(
        &mut self,
        version: u8,
        flags: usize,
        index_space: usize,
        file_count: usize,
    ) -> DecodeResult<Function> {
        let ty = self.read_type_ref()?;
        let findex = self.read_findex(index_space)?;
        let nregs = self.r.read_count()?;
        let nops = self.r.read_count()?;
        let regs = (0..nregs)
            .map(|_| self.read_type_ref())
            .collect::<DecodeResult<Vec<_>>>()?;
        let ops = (0..nops)
            .map(|_| self.read_opcode())
            .collect::<DecodeResult<Vec<_>>>()?;

        let mut debug = None;
        let mut assigns = Vec::new();
        if flags & FLAG_DEBUG != 0 {
            debug = Some(read_debug_lines(&mut self.r, findex as u32, nops, file_count)?);
            if version >= 3 {
                let n = self.r.read_count()?;
                for _ in 0..n {
                    let name = self.read_string()?;
                    let at = self.r.read_index()?;
                    assigns.push(RegisterName { name, at });
                }
            }
        }

        trace!(target: "hlbridge::decode", findex, regs = nregs, ops = nops, "Decoded function");
        Ok(Function {
            findex,
            ty,
            regs,
            ops,
            debug,
            assigns,
        })
    }

    fn read_constant(&mut self) -> DecodeResult<Constant> {
        let global = self.r.read_uindex()?;
        let n = self.r.read_count()?;
        let fields = (0..n)
            .map(|_| self.r.read_uindex())
            .collect::<DecodeResult<Vec<_>>>()?;
        Ok(Constant { global, fields })
    }
}
