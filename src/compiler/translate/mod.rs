//! Opcode translator
//!
//! Translates one register-based source function into a stack-machine
//! method body. Every source instruction maps to a short target sequence:
//! operands are pushed from their registers (converted through the boxing
//! bridge where types differ), the operation is emitted, and the result is
//! stored back into the destination register.

mod analysis;
mod codegen;
mod handlers;

use tracing::trace;

use crate::bytecode::{Function, Module, OpKind, Opcode};
use crate::config::CompilerConfig;
use crate::target::{MethodBody, Signature};

use super::error::CompileResult;
use super::registry::Registry;

pub use analysis::{analyze, BodyInfo, TrapRegion};
pub use codegen::{CodegenContext, TranslateStats, TrapFrame};

/// Opcodes with no target translation
pub const UNTRANSLATED: &[OpKind] = &[OpKind::RefData, OpKind::RefOffset, OpKind::Prefetch, OpKind::Asm];

/// Translate the body of `func`
pub fn translate_function(
    module: &Module,
    registry: &Registry,
    config: &CompilerConfig,
    func: &Function,
    signature: &Signature,
) -> CompileResult<(MethodBody, TranslateStats)> {
    let info = analyze(func)?;
    let mut ctx = CodegenContext::new(module, registry, config, func, signature, info)?;
    for (at, op) in func.ops.iter().enumerate() {
        ctx.begin(at, op.kind);
        translate_op(&mut ctx, op)?;
    }
    let (body, stats) = ctx.finish()?;
    trace!(
        target: "hlbridge::compile::translate",
        function = func.findex,
        ops = func.ops.len(),
        instructions = body.body.len(),
        "Translated function"
    );
    Ok((body, stats))
}

fn translate_op(ctx: &mut CodegenContext<'_>, op: &Opcode) -> CompileResult<()> {
    use OpKind::*;
    match op.kind {
        Mov | Int | Float | Bool | Bytes | String | Null => handlers::compile_value_op(ctx, op),

        Add | Sub | Mul | SDiv | UDiv | SMod | UMod | Shl | SShr | UShr | And | Or | Xor | Neg
        | Not | Incr | Decr => handlers::compile_arithmetic_op(ctx, op),

        Call0 | Call1 | Call2 | Call3 | Call4 | CallN | CallMethod | CallThis | CallClosure
        | StaticClosure | InstanceClosure | VirtualClosure => handlers::compile_call_op(ctx, op),

        GetGlobal | SetGlobal | Field | SetField | GetThis | SetThis | DynGet | DynSet => {
            handlers::compile_field_op(ctx, op)
        }

        JTrue | JFalse | JNull | JNotNull | JSLt | JSGte | JSGt | JSLte | JULt | JUGte | JNotLt
        | JNotGte | JEq | JNotEq | JAlways | Switch | Label | Ret | Nop => {
            handlers::compile_control_op(ctx, op)
        }

        ToDyn | ToSFloat | ToUFloat | ToInt | SafeCast | UnsafeCast | ToVirtual => {
            handlers::compile_conversion_op(ctx, op)
        }

        Throw | Rethrow | Trap | EndTrap | NullCheck | Assert => handlers::compile_exception_op(ctx, op),

        GetI8 | GetI16 | GetMem | GetArray | SetI8 | SetI16 | SetMem | SetArray | New | ArraySize
        | Type | GetType | GetTID | Ref | Unref | Setref => handlers::compile_object_op(ctx, op),

        MakeEnum | EnumAlloc | EnumIndex | EnumField | SetEnumField => handlers::compile_enum_op(ctx, op),

        RefData | RefOffset | Prefetch | Asm => ctx.gap(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{FunType, Type, TypeRef};
    use crate::compiler::error::CompileError;
    use crate::config::TranslationMode;
    use crate::target::{CallTarget, Cmp, Conv, Instr, Label, RuntimeMember, TargetType};

    /// Types: 0 = i32, 1 = fun(i32, i32) -> i32, 2 = void, 3 = bool, 4 = dyn, 5 = f64,
    /// 6 = null<i32>
    fn module() -> Module {
        let mut m = Module::empty(4);
        m.types = vec![
            Type::I32,
            Type::Fun(FunType {
                args: vec![TypeRef(0), TypeRef(0)],
                ret: TypeRef(0),
            }),
            Type::Void,
            Type::Bool,
            Type::Dyn,
            Type::F64,
            Type::Null(TypeRef(0)),
        ];
        m.ints = vec![10, 20];
        m
    }

    fn function(regs: &[usize], ops: Vec<Opcode>) -> Function {
        Function {
            findex: 0,
            ty: TypeRef(1),
            regs: regs.iter().map(|r| TypeRef(*r)).collect(),
            ops,
            debug: None,
            assigns: vec![],
        }
    }

    fn translate(
        m: &Module,
        f: &Function,
        config: &CompilerConfig,
    ) -> CompileResult<(MethodBody, TranslateStats)> {
        let registry = Registry::new("m", m.types.len(), 1);
        let sig = Signature::new(vec![TargetType::I32, TargetType::I32], TargetType::I32);
        translate_function(m, &registry, config, f, &sig)
    }

    #[test]
    fn test_add_two_arguments() {
        let m = module();
        let f = function(
            &[0, 0, 0],
            vec![Opcode::new(OpKind::Add, &[2, 0, 1]), Opcode::new(OpKind::Ret, &[2])],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        assert_eq!(
            body.body,
            vec![
                Instr::LdArg(0),
                Instr::LdArg(1),
                Instr::Add,
                Instr::StLoc(0),
                Instr::LdLoc(0),
                Instr::Ret,
            ]
        );
        assert_eq!(body.locals, vec![TargetType::I32]);
    }

    #[test]
    fn test_void_registers_load_null_and_store_pop() {
        let m = module();
        let f = function(
            &[0, 0, 2, 0],
            vec![
                Opcode::new(OpKind::Null, &[2]),
                Opcode::new(OpKind::Int, &[3, 1]),
                Opcode::new(OpKind::Ret, &[3]),
            ],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        assert_eq!(&body.body[..2], &[Instr::LdNull, Instr::Pop]);
        assert_eq!(&body.body[2..4], &[Instr::LdcI4(20), Instr::StLoc(1)]);
        assert_eq!(body.locals.len(), 2);
    }

    #[test]
    fn test_loop_binds_label_before_target() {
        let m = module();
        let f = function(
            &[0, 0, 3],
            vec![
                Opcode::new(OpKind::Label, &[]),
                Opcode::new(OpKind::JSLt, &[0, 1, 1]),
                Opcode::new(OpKind::JAlways, &[-3]),
                Opcode::new(OpKind::Ret, &[0]),
            ],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        let first = body.body.first().cloned();
        assert!(matches!(first, Some(Instr::MarkLabel(_))));
        assert!(body
            .body
            .iter()
            .any(|i| matches!(i, Instr::Branch(Cmp::Lt, _))));
        assert!(body.body.iter().any(|i| matches!(i, Instr::Br(_))));
    }

    #[test]
    fn test_boxing_bridge_into_dynamic() {
        let m = module();
        let f = function(
            &[0, 0, 4],
            vec![Opcode::new(OpKind::ToDyn, &[2, 0]), Opcode::new(OpKind::Ret, &[0])],
        );
        let (body, stats) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        assert_eq!(body.body[1], Instr::Box(TargetType::I32));
        assert!(matches!(body.body[2], Instr::NewObj(_)));
        assert_eq!(stats.bridges, 1);
    }

    #[test]
    fn test_gap_strict_and_best_effort() {
        let m = module();
        let f = function(
            &[0, 0],
            vec![Opcode::new(OpKind::Prefetch, &[0, 0, 0]), Opcode::new(OpKind::Ret, &[0])],
        );
        assert!(matches!(
            translate(&m, &f, &CompilerConfig::default()),
            Err(CompileError::TranslationGap { at: 0, op: OpKind::Prefetch, .. })
        ));

        let config = CompilerConfig {
            translation: TranslationMode::BestEffort,
            ..CompilerConfig::default()
        };
        let (body, stats) = translate(&m, &f, &config).unwrap();
        assert_eq!(body.body[0], Instr::Nop);
        assert_eq!(stats.gaps, 1);
    }

    #[test]
    fn test_invalid_register_reported() {
        let m = module();
        let f = function(&[0, 0], vec![Opcode::new(OpKind::Ret, &[9])]);
        assert_eq!(
            translate(&m, &f, &CompilerConfig::default()).map(|_| ()),
            Err(CompileError::InvalidRegister {
                function: 0,
                at: 0,
                reg: 9,
            })
        );
    }

    #[test]
    fn test_float_into_int_register_converts() {
        let mut m = module();
        m.floats = vec![2.5];
        let f = function(
            &[0, 0, 5],
            vec![
                Opcode::new(OpKind::Float, &[2, 0]),
                Opcode::new(OpKind::ToInt, &[0, 2]),
                Opcode::new(OpKind::Ret, &[0]),
            ],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        assert!(body.body.contains(&Instr::Conv(Conv::I4)));
    }

    #[test]
    fn test_trap_region_catches_into_register() {
        let m = module();
        let f = function(
            &[0, 0, 4],
            vec![
                Opcode::new(OpKind::Trap, &[2, 2]),
                Opcode::new(OpKind::EndTrap, &[2]),
                Opcode::new(OpKind::Ret, &[0]),
                Opcode::new(OpKind::Ret, &[1]),
            ],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        assert_eq!(body.body[0], Instr::BeginTry);
        assert!(matches!(body.body[1], Instr::Leave(_)));
        assert_eq!(body.body[2], Instr::BeginCatch(TargetType::Any));
        assert_eq!(
            body.body[3],
            Instr::Call(CallTarget::Runtime(RuntimeMember::ExceptionValue))
        );
        assert_eq!(body.body[4], Instr::StLoc(0));
        assert_eq!(body.body[6], Instr::EndTry);
    }

    /// Inside the first protected region, every branch stays in the region
    /// and nothing returns
    fn assert_region_exits_through_leave(body: &[Instr]) {
        let start = body.iter().position(|i| *i == Instr::BeginTry).unwrap();
        let end = body
            .iter()
            .position(|i| matches!(i, Instr::BeginCatch(_)))
            .unwrap();
        let region = &body[start..end];
        let marked: Vec<Label> = region
            .iter()
            .filter_map(|i| match i {
                Instr::MarkLabel(l) => Some(*l),
                _ => None,
            })
            .collect();
        for instr in region {
            assert_ne!(*instr, Instr::Ret);
            if matches!(instr, Instr::Leave(_)) {
                continue;
            }
            for target in instr.targets() {
                assert!(marked.contains(&target), "{:?} branches out of the try block", instr);
            }
        }
    }

    #[test]
    fn test_return_inside_trap_leaves_to_shared_exit() {
        let m = module();
        let f = function(
            &[0, 0, 4],
            vec![
                Opcode::new(OpKind::Trap, &[2, 3]),
                Opcode::new(OpKind::JTrue, &[0, 2]),
                Opcode::new(OpKind::Ret, &[0]),
                Opcode::new(OpKind::EndTrap, &[2]),
                Opcode::new(OpKind::Ret, &[1]),
            ],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        assert_region_exits_through_leave(&body.body);
        assert_eq!(body.locals, vec![TargetType::Dynamic, TargetType::I32]);

        let b = &body.body;
        assert_eq!(b[0], Instr::BeginTry);
        assert_eq!(b[1], Instr::LdArg(0));
        let (taken, skip) = match (&b[2], &b[3]) {
            (Instr::BrTrue(taken), Instr::Br(skip)) => (*taken, *skip),
            other => panic!("expected a branch over a leave, got {:?}", other),
        };
        assert_eq!(b[4], Instr::MarkLabel(taken));
        assert!(matches!(b[5], Instr::Leave(_)));
        assert_eq!(b[6], Instr::MarkLabel(skip));
        assert_eq!(&b[7..9], &[Instr::LdArg(0), Instr::StLoc(1)]);
        let exit = match b[9] {
            Instr::Leave(l) => l,
            ref other => panic!("expected leave, got {:?}", other),
        };

        // the normal return path after the region
        assert_eq!(&b[b.len() - 3..], &[Instr::MarkLabel(exit), Instr::LdLoc(1), Instr::Ret]);
        let end_try = b.iter().position(|i| *i == Instr::EndTry).unwrap();
        assert!(end_try < b.len() - 3);
    }

    #[test]
    fn test_jumps_out_of_trap_use_leave() {
        let m = module();
        let f = function(
            &[0, 0, 4],
            vec![
                Opcode::new(OpKind::Trap, &[2, 4]),
                Opcode::new(OpKind::JSLt, &[0, 1, 3]),
                // to the EndTrap, still inside
                Opcode::new(OpKind::JAlways, &[1]),
                Opcode::new(OpKind::JAlways, &[1]),
                Opcode::new(OpKind::EndTrap, &[2]),
                Opcode::new(OpKind::Ret, &[0]),
            ],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        assert_region_exits_through_leave(&body.body);

        let count = |pred: fn(&Instr) -> bool| body.body.iter().filter(|i| pred(i)).count();
        // compare exit, JAlways exit, then the normal and catch exits of EndTrap
        assert_eq!(count(|i| matches!(i, Instr::Leave(_))), 4);
        // skip over the compare exit plus the in-region jump
        assert_eq!(count(|i| matches!(i, Instr::Br(_))), 2);
        assert_eq!(count(|i| matches!(i, Instr::Branch(Cmp::Lt, _))), 1);
        assert_eq!(body.body.last(), Some(&Instr::Ret));
        assert_eq!(body.locals, vec![TargetType::Dynamic]);
    }

    #[test]
    fn test_null_dynamic_into_nullable_skips_unbox() {
        let m = module();
        let f = function(
            &[0, 0, 4, 6],
            vec![
                Opcode::new(OpKind::Null, &[2]),
                Opcode::new(OpKind::Mov, &[3, 2]),
                Opcode::new(OpKind::Ret, &[0]),
            ],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        let b = &body.body;
        assert_eq!(&b[..4], &[Instr::LdNull, Instr::StLoc(0), Instr::LdLoc(0), Instr::Dup]);
        let empty = match b[4] {
            Instr::BrFalse(l) => l,
            ref other => panic!("expected null test before unboxing, got {:?}", other),
        };
        assert_eq!(
            &b[5..8],
            &[
                Instr::Call(CallTarget::Runtime(RuntimeMember::DynamicValue)),
                Instr::UnboxAny(TargetType::I32),
                Instr::NewObj(CallTarget::Runtime(RuntimeMember::NullableNew(TargetType::I32))),
            ]
        );
        let end = match b[8] {
            Instr::Br(l) => l,
            ref other => panic!("expected jump past the empty value, got {:?}", other),
        };
        assert_eq!(
            &b[9..14],
            &[
                Instr::MarkLabel(empty),
                Instr::Pop,
                Instr::LdNull,
                Instr::MarkLabel(end),
                Instr::StLoc(1),
            ]
        );
    }

    #[test]
    fn test_unclosed_trap_rejected() {
        let m = module();
        let f = function(
            &[0, 0, 4],
            vec![Opcode::new(OpKind::Trap, &[2, 0]), Opcode::new(OpKind::Ret, &[0])],
        );
        assert!(matches!(
            translate(&m, &f, &CompilerConfig::default()),
            Err(CompileError::UnsupportedOperand { .. })
        ));
    }

    #[test]
    fn test_null_check_guards_references_only() {
        let m = module();
        let f = function(
            &[0, 0, 4],
            vec![
                Opcode::new(OpKind::NullCheck, &[0]),
                Opcode::new(OpKind::NullCheck, &[2]),
                Opcode::new(OpKind::Ret, &[0]),
            ],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        assert_eq!(body.body[0], Instr::LdLoc(0));
        assert!(matches!(body.body[1], Instr::BrTrue(_)));
        assert_eq!(
            body.body[2],
            Instr::NewObj(CallTarget::Runtime(RuntimeMember::NullCheckErrorNew))
        );
        assert_eq!(body.body[3], Instr::Throw);
    }

    #[test]
    fn test_switch_jump_table() {
        let m = module();
        let f = function(
            &[0, 0],
            vec![
                Opcode::new(OpKind::Switch, &[0, 0, 1, 2]),
                Opcode::new(OpKind::Ret, &[0]),
                Opcode::new(OpKind::Ret, &[1]),
            ],
        );
        let (body, _) = translate(&m, &f, &CompilerConfig::default()).unwrap();
        assert_eq!(body.body[0], Instr::LdArg(0));
        assert!(matches!(&body.body[1], Instr::Switch(labels) if labels.len() == 2));
        assert_eq!(
            body.body
                .iter()
                .filter(|i| matches!(i, Instr::MarkLabel(_)))
                .count(),
            2
        );
    }
}
