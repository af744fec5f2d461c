//! Shared fixtures for integration tests
//!
//! Every fixture is a real binary image produced by the crate's own
//! `ModuleWriter`, so the tests exercise the decoder and the compiler
//! together.
#![allow(dead_code)]

use std::sync::Once;

use hlbridge::bytecode::{
    DebugLine, Field, FunType, Function, Module, ModuleWriter, ObjType, OpKind, Opcode, Proto,
    RegisterName, Type, TypeRef, FLAG_DEBUG,
};

static INIT: Once = Once::new();

/// Route `tracing` output to the test harness
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub const VOID: usize = 0;
pub const I32: usize = 1;
pub const BOOL: usize = 2;
pub const DYN: usize = 3;
pub const MAIN_TY: usize = 4;
pub const SUM_TY: usize = 5;
pub const COUNTER: usize = 6;
pub const STEP_TY: usize = 7;

pub fn op(kind: OpKind, params: &[i32]) -> Opcode {
    Opcode::new(kind, params)
}

fn fun(args: &[usize], ret: usize) -> Type {
    Type::Fun(FunType {
        args: args.iter().map(|a| TypeRef(*a)).collect(),
        ret: TypeRef(ret),
    })
}

pub fn function(findex: usize, ty: usize, regs: &[usize], ops: Vec<Opcode>) -> Function {
    Function {
        findex,
        ty: TypeRef(ty),
        regs: regs.iter().map(|r| TypeRef(*r)).collect(),
        ops,
        debug: None,
        assigns: vec![],
    }
}

/// A small counter program
///
/// ```text
/// fun0 main():        c = new Counter; n = sum(10); c.count = n; c.step()
/// fun1 sum(n) -> i32: loop adding i to acc while i < n
/// fun2 Counter.step:  this.count++
/// ```
pub fn counter_module(version: u8) -> Module {
    let mut m = Module::empty(version);
    m.ints = vec![10, 0];
    m.strings = vec!["Counter".into(), "count".into(), "step".into(), "n".into()];
    m.types = vec![
        Type::Void,
        Type::I32,
        Type::Bool,
        Type::Dyn,
        fun(&[], VOID),
        fun(&[I32], I32),
        Type::Obj(ObjType {
            name: "Counter".into(),
            super_type: None,
            global: None,
            fields: vec![Field {
                name: "count".into(),
                ty: TypeRef(I32),
            }],
            protos: vec![Proto {
                name: "step".into(),
                findex: 2,
                pindex: 0,
            }],
            bindings: vec![],
        }),
        fun(&[COUNTER], VOID),
    ];
    m.functions = vec![
        function(
            0,
            MAIN_TY,
            &[VOID, COUNTER, I32, I32],
            vec![
                op(OpKind::New, &[1]),
                op(OpKind::Int, &[2, 0]),
                op(OpKind::Call1, &[3, 1, 2]),
                op(OpKind::SetField, &[1, 0, 3]),
                op(OpKind::CallMethod, &[0, 0, 1]),
                op(OpKind::Ret, &[0]),
            ],
        ),
        function(
            1,
            SUM_TY,
            &[I32, I32, I32],
            vec![
                op(OpKind::Int, &[1, 1]),
                op(OpKind::Int, &[2, 1]),
                op(OpKind::Label, &[]),
                op(OpKind::JSGte, &[2, 0, 3]),
                op(OpKind::Add, &[1, 1, 2]),
                op(OpKind::Incr, &[2]),
                op(OpKind::JAlways, &[-5]),
                op(OpKind::Ret, &[1]),
            ],
        ),
        function(
            2,
            STEP_TY,
            &[COUNTER, I32, VOID],
            vec![
                op(OpKind::Field, &[1, 0, 0]),
                op(OpKind::Incr, &[1]),
                op(OpKind::SetField, &[0, 0, 1]),
                op(OpKind::Ret, &[2]),
            ],
        ),
    ];
    m.entrypoint = 0;
    m.rebuild_function_table();
    m
}

/// The counter program with a line table on every function
pub fn counter_module_with_debug() -> Module {
    let mut m = counter_module(4);
    m.flags |= FLAG_DEBUG;
    m.debug_files = vec!["Counter.hx".into()];
    for (i, f) in m.functions.iter_mut().enumerate() {
        let base = 10 * (i as u32 + 1);
        // two instructions per source line
        f.debug = Some(
            (0..f.ops.len())
                .map(|at| DebugLine {
                    file: 0,
                    line: base + at as u32 / 2,
                })
                .collect(),
        );
    }
    m.functions[1].assigns = vec![RegisterName {
        name: "n".into(),
        at: -1,
    }];
    m
}

pub fn encode(module: &Module) -> Vec<u8> {
    ModuleWriter::encode(module).expect("fixture encodes")
}
