use super::*;
use crate::bytecode::{
    Constant, EnumConstruct, EnumType, Field, FunType, Function, Native, ObjType, OpKind, Opcode, Proto,
    Type, TypeRef,
};
use crate::target::{CallTarget, DeclKind, FieldRef, GlobalId, GlobalKind, Instr, MethodId, TargetType};

fn obj(name: &str, super_type: Option<usize>, fields: &[(&str, usize)], protos: &[(&str, usize, i32)]) -> Type {
    Type::Obj(ObjType {
        name: name.to_string(),
        super_type: super_type.map(TypeRef),
        global: None,
        fields: fields
            .iter()
            .map(|(n, t)| Field {
                name: n.to_string(),
                ty: TypeRef(*t),
            })
            .collect(),
        protos: protos
            .iter()
            .map(|(n, f, p)| Proto {
                name: n.to_string(),
                findex: *f,
                pindex: *p,
            })
            .collect(),
        bindings: vec![],
    })
}

fn fun(args: &[usize], ret: usize) -> Type {
    Type::Fun(FunType {
        args: args.iter().map(|a| TypeRef(*a)).collect(),
        ret: TypeRef(ret),
    })
}

fn function(findex: usize, ty: usize, regs: &[usize], ops: Vec<Opcode>) -> Function {
    Function {
        findex,
        ty: TypeRef(ty),
        regs: regs.iter().map(|r| TypeRef(*r)).collect(),
        ops,
        debug: None,
        assigns: vec![],
    }
}

fn module(types: Vec<Type>, functions: Vec<Function>) -> Module {
    let mut m = Module::empty(4);
    m.types = types;
    m.functions = functions;
    m.rebuild_function_table();
    m
}

/// 0 = f64, 1 = void, 2 = fun() -> void, 3 = Point { x, y }
fn point_module() -> Module {
    module(
        vec![
            Type::F64,
            Type::Void,
            fun(&[], 1),
            obj("Point", None, &[("x", 0), ("y", 0)], &[]),
        ],
        vec![function(0, 2, &[1], vec![Opcode::new(OpKind::Ret, &[0])])],
    )
}

/// 0 = void, 1 = Base, 2 = Derived, 3 = fun(Base) -> void, 4 = fun(Derived) -> void
fn override_module() -> Module {
    module(
        vec![
            Type::Void,
            obj("Base", None, &[], &[("f", 0, 0)]),
            obj("Derived", Some(1), &[], &[("f", 1, 0)]),
            fun(&[1], 0),
            fun(&[2], 0),
        ],
        vec![
            function(0, 3, &[1], vec![Opcode::new(OpKind::Ret, &[0])]),
            function(1, 4, &[2], vec![Opcode::new(OpKind::Ret, &[0])]),
        ],
    )
}

#[test]
fn test_point_declaration() {
    let target = Compiler::default().compile(&point_module()).unwrap();

    let point = target.type_by_name("Point").unwrap();
    assert_eq!(point.kind, DeclKind::Class);
    assert_eq!(point.fields.len(), 2);
    assert_eq!(point.fields[0].name, "x");
    assert_eq!(point.fields[0].ty, TargetType::F64);
    assert_eq!(point.fields[1].ty, TargetType::F64);
    assert_eq!(point.base, None);

    let ctor = target.method_by_name("Point..ctor").unwrap();
    assert!(ctor.signature.params.is_empty());
    assert_eq!(ctor.body, vec![Instr::Ret]);
}

#[test]
fn test_add_function_signature_and_locals() {
    let m = module(
        vec![Type::I32, fun(&[0, 0], 0)],
        vec![function(
            0,
            1,
            &[0, 0, 0],
            vec![Opcode::new(OpKind::Add, &[2, 0, 1]), Opcode::new(OpKind::Ret, &[2])],
        )],
    );
    let target = Compiler::default().compile(&m).unwrap();
    let add = target.method_by_name("fun0").unwrap();
    assert_eq!(add.signature.params, vec![TargetType::I32, TargetType::I32]);
    assert_eq!(add.signature.ret, TargetType::I32);
    assert_eq!(add.locals.len(), 1);
    assert_eq!(add.source_findex, Some(0));
    assert_eq!(target.entrypoint, Some(MethodId(0)));
}

#[test]
fn test_define_before_resolve_rejected() {
    let m = point_module();
    let mut registry = Registry::new("m", m.types.len(), m.function_table.len());
    assert!(matches!(
        types::define_all(&m, &mut registry),
        Err(CompileError::StageOrder {
            expected: Stage::Defined,
            found: None,
            ..
        })
    ));
}

#[test]
fn test_functions_need_compiled_types() {
    let m = point_module();
    let mut registry = Registry::new("m", m.types.len(), m.function_table.len());
    types::resolve_all(&m, &mut registry).unwrap();
    assert!(matches!(
        functions::define_all(&m, &mut registry),
        Err(CompileError::StageOrder { .. })
    ));
}

#[test]
fn test_flattened_fields_follow_super_chain() {
    let m = module(
        vec![
            Type::I32,
            obj("Base", None, &[("a", 0)], &[]),
            obj("Derived", Some(1), &[("b", 0), ("c", 0)], &[]),
        ],
        vec![],
    );
    let mut registry = Registry::new("m", m.types.len(), 0);
    types::compile_types(&m, &mut registry).unwrap();

    let derived = registry.obj(2).unwrap();
    let names: Vec<_> = derived.flat_fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    let base_decl = registry.obj(1).unwrap().decl;
    assert_eq!(derived.flat_fields[0].field.owner, base_decl);
    assert_eq!(derived.flat_fields[2].field.index, 1);
    assert_eq!(registry.target.type_decl(derived.decl).unwrap().base, Some(base_decl));
}

#[test]
fn test_proto_override_rebinds_inherited_slot() {
    let m = override_module();
    let mut registry = Registry::new("m", m.types.len(), m.function_table.len());
    types::compile_types(&m, &mut registry).unwrap();

    let base = registry.obj(1).unwrap().clone();
    let derived = registry.obj(2).unwrap().clone();
    assert_eq!(base.flat_protos.len(), 1);
    assert_eq!(derived.flat_protos.len(), 1);
    assert_eq!(derived.flat_protos[0].findex, 1);
    assert_eq!(derived.flat_protos[0].field.owner, base.decl);

    // the slot field lives on the base only
    let base_decl = registry.target.type_decl(base.decl).unwrap();
    assert_eq!(base_decl.fields.len(), 1);
    assert_eq!(base_decl.fields[0].name, "$f");
    assert!(registry.target.type_decl(derived.decl).unwrap().fields.is_empty());

    let ctor = registry.target.method(derived.constructor).unwrap();
    assert_eq!(
        ctor.body,
        vec![
            Instr::LdArg(0),
            Instr::Call(CallTarget::Method(base.constructor)),
            Instr::LdArg(0),
            Instr::LdArg(0),
            Instr::NewDelegate {
                method: MethodId(1),
                bound: true,
            },
            Instr::StFld(base.flat_protos[0].field),
            Instr::Ret,
        ]
    );
}

#[test]
fn test_non_virtual_proto_takes_no_slot() {
    // 0 = void, 1 = i32, 2 = A, 3 = fun(A) -> i32, 4 = fun(A) -> void
    let m = module(
        vec![
            Type::Void,
            Type::I32,
            obj("A", None, &[], &[("helper", 0, -1), ("run", 1, 0)]),
            fun(&[2], 1),
            fun(&[2], 0),
        ],
        vec![
            function(0, 3, &[2, 1], vec![Opcode::new(OpKind::Ret, &[1])]),
            function(1, 4, &[2, 0], vec![Opcode::new(OpKind::Ret, &[1])]),
        ],
    );
    let target = Compiler::default().compile(&m).unwrap();

    let a = target.type_by_name("A").unwrap();
    assert_eq!(a.fields.len(), 1);
    assert_eq!(a.fields[0].name, "$run");
    match &a.fields[0].ty {
        TargetType::Delegate(sig) => assert_eq!(sig.ret, TargetType::Void),
        other => panic!("slot field typed {}", other),
    }

    let ctor = target.method_by_name("A..ctor").unwrap();
    assert_eq!(
        ctor.body,
        vec![
            Instr::LdArg(0),
            Instr::LdArg(0),
            Instr::NewDelegate {
                method: MethodId(1),
                bound: true,
            },
            Instr::StFld(FieldRef { owner: a.id, index: 0 }),
            Instr::Ret,
        ]
    );
    // still reachable by name for direct calls
    assert_eq!(target.methods[0].name, "A.helper");
}

#[test]
fn test_virtual_proto_slot_gap_rejected() {
    let m = module(
        vec![Type::Void, obj("A", None, &[], &[("run", 0, 1)]), fun(&[1], 0)],
        vec![function(0, 2, &[1], vec![Opcode::new(OpKind::Ret, &[0])])],
    );
    assert!(matches!(
        Compiler::default().compile(&m),
        Err(CompileError::UnresolvedType { ty: 1, .. })
    ));
}

#[test]
fn test_proto_functions_named_after_members() {
    let target = Compiler::default().compile(&override_module()).unwrap();
    assert_eq!(target.methods[0].name, "Base.f");
    assert_eq!(target.methods[1].name, "Derived.f");
}

#[test]
fn test_method_call_through_slot_delegate() {
    let mut m = override_module();
    m.functions.push(function(
        2,
        3,
        &[1, 0],
        vec![
            Opcode::new(OpKind::CallMethod, &[1, 0, 0]),
            Opcode::new(OpKind::Ret, &[1]),
        ],
    ));
    m.rebuild_function_table();
    let target = Compiler::default().compile(&m).unwrap();

    let body = &target.methods[2].body;
    assert_eq!(body[0], Instr::LdArg(0));
    assert!(matches!(body[1], Instr::LdFld(_)));
    assert!(matches!(&body[2], Instr::InvokeDelegate(sig) if sig.params.is_empty()));
    assert_eq!(body[3], Instr::Ret);
}

#[test]
fn test_enum_constructs() {
    let m = module(
        vec![
            Type::I32,
            Type::Enum(EnumType {
                name: "Option".into(),
                global: None,
                constructs: vec![
                    EnumConstruct {
                        name: "None".into(),
                        params: vec![],
                    },
                    EnumConstruct {
                        name: "Some".into(),
                        params: vec![TypeRef(0)],
                    },
                ],
            }),
        ],
        vec![],
    );
    let target = Compiler::default().compile(&m).unwrap();

    let base = target.type_by_name("Option").unwrap();
    assert_eq!(base.kind, DeclKind::Enum);
    assert_eq!(base.fields[0].name, "index");
    let some = target.type_by_name("Option.Some").unwrap();
    assert_eq!(some.base, Some(base.id));
    assert_eq!(some.fields[0].name, "p0");

    let ctor = target.method_by_name("Option.Some..ctor").unwrap();
    assert_eq!(ctor.signature.params, vec![TargetType::I32]);
    assert_eq!(&ctor.body[..3], &[Instr::LdArg(0), Instr::LdcI4(1), Instr::StFld(FieldRef { owner: base.id, index: 0 })]);
    assert_eq!(ctor.body.last(), Some(&Instr::Ret));
}

#[test]
fn test_constants_lowered_into_initializer() {
    let mut m = point_module();
    m.floats = vec![3.0, 4.5];
    m.globals = vec![TypeRef(3)];
    m.constants = vec![Constant {
        global: 0,
        fields: vec![0, 1],
    }];
    let target = Compiler::default().compile(&m).unwrap();

    assert_eq!(target.globals[0].kind, GlobalKind::Object);
    assert_eq!(target.globals[0].name, "global0");
    let init = target.method(target.initializer.unwrap()).unwrap();
    assert_eq!(init.name, "$init");
    assert_eq!(init.body.len(), 9);
    assert_eq!(init.body[2], Instr::LdcR8(3.0));
    assert_eq!(init.body[5], Instr::LdcR8(4.5));
    assert_eq!(init.body[7], Instr::StSFld(GlobalId(0)));
}

#[test]
fn test_constant_for_non_object_global_rejected() {
    let mut m = point_module();
    m.globals = vec![TypeRef(0)];
    m.constants = vec![Constant {
        global: 0,
        fields: vec![],
    }];
    assert!(matches!(
        Compiler::default().compile(&m),
        Err(CompileError::InvalidConstant { global: 0, .. })
    ));
}

#[test]
fn test_native_import() {
    let mut m = point_module();
    m.natives.push(Native {
        findex: 1,
        lib: "std".into(),
        name: "log".into(),
        ty: TypeRef(2),
    });
    m.rebuild_function_table();
    let target = Compiler::default().compile(&m).unwrap();
    let log = target.method_by_name("std.log").unwrap();
    assert_eq!(log.native.as_ref().map(|n| n.symbol.as_str()), Some("log"));
    assert!(log.body.is_empty());
}

#[test]
fn test_call_into_native_range() {
    // 0 = void, 1 = i32, 2 = fun() -> void, 3 = fun(i32) -> void
    let mut m = module(
        vec![Type::Void, Type::I32, fun(&[], 0), fun(&[1], 0)],
        vec![
            function(
                0,
                2,
                &[1, 0],
                vec![
                    Opcode::new(OpKind::Int, &[0, 0]),
                    Opcode::new(OpKind::Call1, &[1, 3, 0]),
                    Opcode::new(OpKind::Ret, &[1]),
                ],
            ),
            function(1, 2, &[0], vec![Opcode::new(OpKind::Ret, &[0])]),
            function(2, 2, &[0], vec![Opcode::new(OpKind::Ret, &[0])]),
        ],
    );
    m.ints = vec![7];
    m.natives = vec![
        Native {
            findex: 3,
            lib: "std".into(),
            name: "trace".into(),
            ty: TypeRef(3),
        },
        Native {
            findex: 4,
            lib: "std".into(),
            name: "sys_exit".into(),
            ty: TypeRef(3),
        },
    ];
    m.rebuild_function_table();
    let target = Compiler::default().compile(&m).unwrap();

    let call = target.methods[0]
        .body
        .iter()
        .find_map(|i| match i {
            Instr::Call(CallTarget::Method(id)) => Some(*id),
            _ => None,
        })
        .unwrap();
    let callee = target.method(call).unwrap();
    assert_eq!(callee.name, "std.trace");
    assert_eq!(callee.source_findex, Some(3));
    assert!(callee.native.is_some());
    assert_eq!(target.method_by_name("std.sys_exit").unwrap().source_findex, Some(4));
}

#[test]
fn test_untranslated_opcodes_fail_in_strict_mode() {
    for kind in translate::UNTRANSLATED {
        let m = module(
            vec![Type::Void, fun(&[], 0)],
            vec![function(
                0,
                1,
                &[0],
                vec![Opcode::new(*kind, &[0, 0, 0]), Opcode::new(OpKind::Ret, &[0])],
            )],
        );
        assert!(matches!(
            Compiler::default().compile(&m),
            Err(CompileError::TranslationGap { op, .. }) if op == *kind
        ));
    }
}

#[test]
fn test_compilation_is_deterministic() {
    let m = override_module();
    let compiler = Compiler::default();
    let (first, stats) = compiler.compile_with_stats(&m).unwrap();
    let second = compiler.compile(&m).unwrap();
    assert_eq!(first, second);
    assert_eq!(stats.types, first.types.len());
    assert_eq!(stats.instructions, first.instruction_count());
}
