//! Code generation context
//!
//! Holds the state needed while translating one function body: the source
//! function, its register types, the label bound to each instruction and
//! the open trap frames. Handlers emit through this context so register
//! access and the boxing bridge stay in one place.
//!
//! Control may only leave a protected region through `leave`: branches and
//! returns out of an open trap are routed through [`CodegenContext::jump`],
//! [`CodegenContext::branch`] and [`CodegenContext::ret`].

use tracing::{trace, warn};

use crate::bytecode::{DebugLine, Function, Module, OpKind, Type};
use crate::config::{CompilerConfig, TranslationMode};
use crate::target::{
    CallTarget, Conv, Instr, Label, MethodBody, MethodBuilder, RuntimeMember, Signature, TargetType,
    TypeId,
};

use super::super::error::{CompileError, CompileResult};
use super::super::registry::Registry;
use super::super::type_map::map_type;
use super::analysis::{branch_target, BodyInfo, TrapRegion};

/// Counters collected while translating
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranslateStats {
    /// Target instructions emitted
    pub instructions: usize,
    /// Boxing or dynamic-bridge conversions inserted
    pub bridges: usize,
    /// Untranslated opcodes downgraded to `nop`
    pub gaps: usize,
}

impl TranslateStats {
    pub fn merge(&mut self, other: TranslateStats) {
        self.instructions += other.instructions;
        self.bridges += other.bridges;
        self.gaps += other.gaps;
    }
}

/// An open `Trap` region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    /// Register receiving the caught value
    pub reg: i32,
    pub handler: Label,
    pub region: TrapRegion,
}

/// Shared exit for returns from inside trap regions
#[derive(Debug, Clone, Copy)]
struct ReturnExit {
    label: Label,
    /// Local holding the return value; `None` for void functions
    local: Option<u16>,
}

pub struct CodegenContext<'a> {
    pub module: &'a Module,
    pub registry: &'a Registry,
    pub config: &'a CompilerConfig,
    pub func: &'a Function,
    pub signature: &'a Signature,
    pub builder: MethodBuilder,
    pub traps: Vec<TrapFrame>,
    pub stats: TranslateStats,
    /// Index of the instruction being translated
    pub at: usize,
    pub op: OpKind,

    reg_types: Vec<TargetType>,
    nargs: usize,
    labels: Vec<Label>,
    info: BodyInfo,
    last_line: Option<DebugLine>,
    ret_exit: Option<ReturnExit>,
}

impl<'a> CodegenContext<'a> {
    pub fn new(
        module: &'a Module,
        registry: &'a Registry,
        config: &'a CompilerConfig,
        func: &'a Function,
        signature: &'a Signature,
        info: BodyInfo,
    ) -> CompileResult<Self> {
        let reg_types = func
            .regs
            .iter()
            .map(|r| map_type(module, registry, *r))
            .collect::<CompileResult<Vec<_>>>()?;
        let nargs = signature.params.len();
        if reg_types.len() < nargs || reg_types.len() > u16::MAX as usize {
            return Err(CompileError::InvalidRegister {
                function: func.findex,
                at: 0,
                reg: reg_types.len() as i32,
            });
        }

        let mut builder = MethodBuilder::new();
        let labels = (0..func.ops.len()).map(|_| builder.new_label()).collect();
        for ty in &reg_types[nargs..] {
            builder.declare_local(match ty {
                TargetType::Void => TargetType::Any,
                t => t.clone(),
            });
        }

        Ok(Self {
            module,
            registry,
            config,
            func,
            signature,
            builder,
            traps: Vec::with_capacity(info.max_trap_depth),
            stats: TranslateStats::default(),
            at: 0,
            op: OpKind::Nop,
            reg_types,
            nargs,
            labels,
            info,
            last_line: None,
            ret_exit: None,
        })
    }

    // =========================================================================
    // Instruction boundaries
    // =========================================================================

    /// Start translating instruction `at`
    pub fn begin(&mut self, at: usize, op: OpKind) {
        self.at = at;
        self.op = op;
        if self.info.is_target(at) {
            if let Some(label) = self.labels.get(at).copied() {
                self.builder.mark(label);
            }
        }
        self.sequence_point();
    }

    fn sequence_point(&mut self) {
        if !self.config.emit_sequence_points || !self.module.has_debug() {
            return;
        }
        let Some(line) = self.func.debug.as_ref().and_then(|d| d.get(self.at)).copied() else {
            return;
        };
        if self.last_line != Some(line) {
            self.builder.emit(Instr::SequencePoint {
                file: line.file,
                line: line.line,
            });
            self.last_line = Some(line);
        }
    }

    pub fn finish(mut self) -> CompileResult<(MethodBody, TranslateStats)> {
        let findex = self.func.findex;
        let at = self.at;
        if !self.traps.is_empty() {
            return Err(CompileError::UnsupportedOperand {
                function: findex,
                at,
                op: self.op,
                found: format!("{} unclosed trap region(s)", self.traps.len()),
            });
        }
        if let Some(exit) = self.ret_exit {
            self.builder.mark(exit.label);
            if let Some(local) = exit.local {
                self.builder.emit(Instr::LdLoc(local));
            }
            self.builder.emit(Instr::Ret);
        }
        let mut stats = self.stats;
        let body = self.builder.finish().map_err(|label| CompileError::InvalidBranchTarget {
            function: findex,
            at,
            target: label.0 as i64,
        })?;
        stats.instructions = body.body.len();
        Ok((body, stats))
    }

    // =========================================================================
    // Errors
    // =========================================================================

    #[inline]
    pub fn findex(&self) -> usize {
        self.func.findex
    }

    pub fn unsupported(&self, found: impl Into<String>) -> CompileError {
        CompileError::UnsupportedOperand {
            function: self.func.findex,
            at: self.at,
            op: self.op,
            found: found.into(),
        }
    }

    pub fn invalid_register(&self, reg: i32) -> CompileError {
        CompileError::InvalidRegister {
            function: self.func.findex,
            at: self.at,
            reg,
        }
    }

    /// Handle an opcode from the untranslated list according to the mode
    pub fn gap(&mut self) -> CompileResult<()> {
        match self.config.translation {
            TranslationMode::Strict => Err(CompileError::TranslationGap {
                function: self.func.findex,
                at: self.at,
                op: self.op,
            }),
            TranslationMode::BestEffort => {
                warn!(
                    target: "hlbridge::compile::translate",
                    function = self.func.findex,
                    at = self.at,
                    op = %self.op,
                    "Opcode not translated, emitting nop"
                );
                self.stats.gaps += 1;
                self.emit(Instr::Nop);
                Ok(())
            }
        }
    }

    // =========================================================================
    // Registers
    // =========================================================================

    fn reg_index(&self, r: i32) -> CompileResult<usize> {
        usize::try_from(r)
            .ok()
            .filter(|&i| i < self.reg_types.len())
            .ok_or_else(|| self.invalid_register(r))
    }

    pub fn reg_type(&self, r: i32) -> CompileResult<TargetType> {
        Ok(self.reg_types[self.reg_index(r)?].clone())
    }

    /// Source type of a register
    pub fn source_type(&self, r: i32) -> CompileResult<&'a Type> {
        let i = self.reg_index(r)?;
        let tr = self.func.regs[i];
        self.module.get_type(tr).ok_or_else(|| CompileError::UnresolvedType {
            ty: tr.0,
            reason: format!("type of r{} in fun{}", r, self.func.findex),
        })
    }

    /// Type-table index of a register's type
    pub fn source_type_index(&self, r: i32) -> CompileResult<usize> {
        Ok(self.func.regs[self.reg_index(r)?].0)
    }

    /// Push a register; returns its type
    pub fn load(&mut self, r: i32) -> CompileResult<TargetType> {
        let i = self.reg_index(r)?;
        let ty = self.reg_types[i].clone();
        let instr = if ty == TargetType::Void {
            Instr::LdNull
        } else if i < self.nargs {
            Instr::LdArg(i as u16)
        } else {
            Instr::LdLoc((i - self.nargs) as u16)
        };
        self.emit(instr);
        Ok(ty)
    }

    /// Push a register converted to `to`
    pub fn load_as(&mut self, r: i32, to: &TargetType) -> CompileResult<()> {
        let from = self.load(r)?;
        self.coerce(&from, to)
    }

    /// Pop the top of stack into a register
    pub fn store(&mut self, r: i32) -> CompileResult<()> {
        let i = self.reg_index(r)?;
        let instr = if self.reg_types[i] == TargetType::Void {
            Instr::Pop
        } else if i < self.nargs {
            Instr::StArg(i as u16)
        } else {
            Instr::StLoc((i - self.nargs) as u16)
        };
        self.emit(instr);
        Ok(())
    }

    /// Convert the top of stack from `from` to the register's type and store it
    pub fn store_from(&mut self, r: i32, from: &TargetType) -> CompileResult<()> {
        let to = self.reg_type(r)?;
        self.coerce(from, &to)?;
        self.store(r)
    }

    // =========================================================================
    // Emission helpers
    // =========================================================================

    #[inline]
    pub fn emit(&mut self, instr: Instr) {
        self.builder.emit(instr);
    }

    /// Call a runtime-support member; constructors go through `newobj`
    pub fn call_runtime(&mut self, member: RuntimeMember) {
        if member.is_constructor() {
            self.emit(Instr::NewObj(CallTarget::Runtime(member)));
        } else {
            self.emit(Instr::Call(CallTarget::Runtime(member)));
        }
    }

    /// Label of the instruction `offset` past the next one
    pub fn branch_label(&self, offset: i32) -> CompileResult<Label> {
        let target = branch_target(self.at, offset);
        usize::try_from(target)
            .ok()
            .and_then(|t| self.labels.get(t).copied())
            .ok_or(CompileError::InvalidBranchTarget {
                function: self.func.findex,
                at: self.at,
                target,
            })
    }

    /// Region opened by the current `Trap` instruction
    pub fn trap_region(&self) -> CompileResult<TrapRegion> {
        self.info
            .region_at(self.at)
            .ok_or_else(|| self.unsupported("trap without an analyzed region"))
    }

    /// Check if a jump to `offset` leaves the innermost open trap
    fn leaves_trap(&self, offset: i32) -> bool {
        let Some(frame) = self.traps.last() else {
            return false;
        };
        let target = branch_target(self.at, offset);
        !usize::try_from(target).is_ok_and(|t| frame.region.contains(t))
    }

    /// Unconditional jump to the instruction `offset` past the next one
    pub fn jump(&mut self, offset: i32) -> CompileResult<()> {
        let target = self.branch_label(offset)?;
        if self.leaves_trap(offset) {
            self.emit(Instr::Leave(target));
        } else {
            self.emit(Instr::Br(target));
        }
        Ok(())
    }

    /// Conditional branch built by `make` from its target label
    ///
    /// Out of a trap the branch is taken to a local `leave`:
    ///
    /// ```text
    ///     <branch> taken
    ///     br skip
    /// taken:
    ///     leave target
    /// skip:
    /// ```
    pub fn branch(&mut self, offset: i32, make: impl FnOnce(Label) -> Instr) -> CompileResult<()> {
        let target = self.branch_label(offset)?;
        if !self.leaves_trap(offset) {
            self.emit(make(target));
            return Ok(());
        }
        let taken = self.builder.new_label();
        let skip = self.builder.new_label();
        self.emit(make(taken));
        self.emit(Instr::Br(skip));
        self.builder.mark(taken);
        self.emit(Instr::Leave(target));
        self.builder.mark(skip);
        Ok(())
    }

    /// Jump table over `offsets`; the selector is already on the stack
    pub fn switch(&mut self, offsets: &[i32]) -> CompileResult<()> {
        let mut table = Vec::with_capacity(offsets.len());
        let mut exits = Vec::new();
        for &offset in offsets {
            let target = self.branch_label(offset)?;
            if self.leaves_trap(offset) {
                let taken = self.builder.new_label();
                exits.push((taken, target));
                table.push(taken);
            } else {
                table.push(target);
            }
        }
        self.emit(Instr::Switch(table));
        if !exits.is_empty() {
            let skip = self.builder.new_label();
            self.emit(Instr::Br(skip));
            for (taken, target) in exits {
                self.builder.mark(taken);
                self.emit(Instr::Leave(target));
            }
            self.builder.mark(skip);
        }
        Ok(())
    }

    /// Return register `r`; inside a trap the value leaves to a shared exit
    pub fn ret(&mut self, r: i32) -> CompileResult<()> {
        let ret = self.signature.ret.clone();
        if ret != TargetType::Void {
            self.load_as(r, &ret)?;
        }
        if self.traps.is_empty() {
            self.emit(Instr::Ret);
            return Ok(());
        }
        let exit = match self.ret_exit {
            Some(exit) => exit,
            None => {
                let exit = ReturnExit {
                    label: self.builder.new_label(),
                    local: (ret != TargetType::Void).then(|| self.builder.declare_local(ret)),
                };
                self.ret_exit = Some(exit);
                exit
            }
        };
        if let Some(local) = exit.local {
            self.emit(Instr::StLoc(local));
        }
        self.emit(Instr::Leave(exit.label));
        Ok(())
    }

    /// Push the zero value of a type
    pub fn push_default(&mut self, ty: &TargetType) {
        let instr = match ty {
            TargetType::Bool | TargetType::U8 | TargetType::U16 | TargetType::I32 => Instr::LdcI4(0),
            TargetType::I64 => Instr::LdcI8(0),
            TargetType::F32 | TargetType::F64 => Instr::LdcR8(0.0),
            _ => Instr::LdNull,
        };
        self.emit(instr);
    }

    // =========================================================================
    // Boxing bridge
    // =========================================================================

    /// Convert the top of stack; reference downcasts are checked
    pub fn coerce(&mut self, from: &TargetType, to: &TargetType) -> CompileResult<()> {
        self.convert(from, to, true)
    }

    /// Convert the top of stack without runtime-checked reference casts
    pub fn coerce_unchecked(&mut self, from: &TargetType, to: &TargetType) -> CompileResult<()> {
        self.convert(from, to, false)
    }

    fn convert(&mut self, from: &TargetType, to: &TargetType, checked: bool) -> CompileResult<()> {
        use TargetType as T;
        if from == to {
            return Ok(());
        }
        match (from, to) {
            (_, T::Void) => self.emit(Instr::Pop),
            (T::Void, t) => {
                if t.is_value_type() {
                    self.emit(Instr::Pop);
                    self.push_default(t);
                }
            }
            (f, t) if f.is_value_type() && t.is_value_type() => self.convert_numeric(f, t),
            (f, T::Nullable(inner)) if f.is_value_type() => {
                self.convert(f, inner, checked)?;
                self.call_runtime(RuntimeMember::NullableNew((**inner).clone()));
            }
            // a null reference becomes the empty nullable instead of reaching the unbox
            (f, T::Nullable(inner)) if !matches!(f, T::Nullable(_)) => {
                let empty = self.builder.new_label();
                let end = self.builder.new_label();
                self.emit(Instr::Dup);
                self.emit(Instr::BrFalse(empty));
                self.convert(f, inner, checked)?;
                self.call_runtime(RuntimeMember::NullableNew((**inner).clone()));
                self.emit(Instr::Br(end));
                self.builder.mark(empty);
                self.emit(Instr::Pop);
                self.push_default(to);
                self.builder.mark(end);
            }
            (f, T::Dynamic) => {
                if f.is_value_type() {
                    self.emit(Instr::Box(f.clone()));
                }
                self.call_runtime(RuntimeMember::DynamicNew);
                self.stats.bridges += 1;
            }
            (f, T::Any) => {
                if f.is_value_type() {
                    self.emit(Instr::Box(f.clone()));
                    self.stats.bridges += 1;
                }
            }
            (T::Dynamic, t) => {
                self.call_runtime(RuntimeMember::DynamicValue);
                self.stats.bridges += 1;
                self.unwrap_object(t, checked);
            }
            (T::Any, t) => self.unwrap_object(t, checked),
            (T::Nullable(inner), t) => {
                self.call_runtime(RuntimeMember::NullableValue((**inner).clone()));
                self.convert(inner, t, checked)?;
            }
            (f, t) if t.is_value_type() || f.is_value_type() => {
                return Err(self.unsupported(format!("no conversion from {} to {}", f, t)));
            }
            (f, t) => self.convert_reference(f, t, checked),
        }
        trace!(target: "hlbridge::compile::translate", %from, %to, "Coerced");
        Ok(())
    }

    fn unwrap_object(&mut self, to: &TargetType, checked: bool) {
        if to.is_value_type() {
            self.emit(Instr::UnboxAny(to.clone()));
            self.stats.bridges += 1;
        } else if checked && *to != TargetType::Any {
            self.emit(Instr::CastClass(to.clone()));
        }
    }

    fn convert_numeric(&mut self, from: &TargetType, to: &TargetType) {
        use TargetType as T;
        let conv = match to {
            T::U8 if *from != T::Bool => Some(Conv::U1),
            T::U16 if !matches!(from, T::Bool | T::U8) => Some(Conv::U2),
            T::I32 | T::Bool if matches!(from, T::I64 | T::F32 | T::F64) => Some(Conv::I4),
            T::I64 => Some(Conv::I8),
            T::F32 => Some(Conv::R4),
            T::F64 => Some(Conv::R8),
            _ => None,
        };
        if let Some(conv) = conv {
            self.emit(Instr::Conv(conv));
        }
    }

    fn convert_reference(&mut self, from: &TargetType, to: &TargetType, checked: bool) {
        let widening = match (from.type_id(), to.type_id()) {
            (Some(a), Some(b)) => self.derives_from(a, b),
            _ => matches!((from, to), (TargetType::Delegate(_), TargetType::Delegate(_))),
        };
        if !widening && checked {
            self.emit(Instr::CastClass(to.clone()));
        }
    }

    /// Check if declaration `a` is `b` or derives from it
    pub fn derives_from(&self, a: TypeId, b: TypeId) -> bool {
        let mut current = Some(a);
        let mut steps = 0;
        while let Some(id) = current {
            if id == b {
                return true;
            }
            steps += 1;
            if steps > self.registry.target.types.len() {
                return false;
            }
            current = self.registry.target.type_decl(id).and_then(|t| t.base);
        }
        false
    }
}
