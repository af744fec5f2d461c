mod common;

use common::*;
use hlbridge::bytecode::{decode, OpKind};
use hlbridge::compiler::CompileError;
use hlbridge::target::{Cmp, DeclKind, Instr, MethodId, TargetType};
use hlbridge::{compile_bytes, compile_many, Compiler, CompilerConfig, Error, TranslationMode};

#[test]
fn test_counter_program_compiles() {
    init_tracing();
    let target = compile_bytes(&encode(&counter_module(4)), &CompilerConfig::default()).unwrap();

    assert_eq!(target.name, "module");
    assert_eq!(target.entrypoint, Some(MethodId(0)));

    let counter = target.type_by_name("Counter").unwrap();
    assert_eq!(counter.kind, DeclKind::Class);
    let fields: Vec<_> = counter.fields.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(fields, vec!["count", "$step"]);

    let sum = target.method_by_name("fun1").unwrap();
    assert_eq!(sum.signature.params, vec![TargetType::I32]);
    assert_eq!(sum.signature.ret, TargetType::I32);
    assert_eq!(sum.locals, vec![TargetType::I32, TargetType::I32]);
    assert!(sum.body.iter().any(|i| matches!(i, Instr::Branch(Cmp::Ge, _))));
    assert!(sum.body.iter().any(|i| matches!(i, Instr::Br(_))));

    let step = target.method_by_name("Counter.step").unwrap();
    assert_eq!(step.source_findex, Some(2));
    assert!(step.body.contains(&Instr::Add));
}

#[test]
fn test_config_from_toml_drives_compilation() {
    init_tracing();
    let config = CompilerConfig::from_toml_str(
        r#"
        assembly_name = "counter"
        translation = "best-effort"
        emit_sequence_points = false
        "#,
    )
    .unwrap();
    assert_eq!(config.translation, TranslationMode::BestEffort);

    let target = compile_bytes(&encode(&counter_module_with_debug()), &config).unwrap();
    assert_eq!(target.name, "counter");
    assert!(target
        .methods
        .iter()
        .flat_map(|m| m.body.iter())
        .all(|i| !matches!(i, Instr::SequencePoint { .. })));
}

#[test]
fn test_sequence_points_follow_line_changes() {
    init_tracing();
    let target = compile_bytes(&encode(&counter_module_with_debug()), &CompilerConfig::default()).unwrap();
    let sum = target.method_by_name("fun1").unwrap();
    let lines: Vec<u32> = sum
        .body
        .iter()
        .filter_map(|i| match i {
            Instr::SequencePoint { line, .. } => Some(*line),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec![20, 21, 22, 23]);
}

#[test]
fn test_translation_gap_modes() {
    init_tracing();
    let mut module = counter_module(4);
    module.functions[1].ops.insert(0, op(OpKind::Prefetch, &[0, 0, 0]));
    let bytes = encode(&module);

    let strict = compile_bytes(&bytes, &CompilerConfig::default());
    assert!(matches!(
        strict,
        Err(Error::Compile(CompileError::TranslationGap {
            function: 1,
            op: OpKind::Prefetch,
            ..
        }))
    ));

    let config = CompilerConfig {
        translation: TranslationMode::BestEffort,
        ..CompilerConfig::default()
    };
    let decoded = decode(&bytes).unwrap();
    let (target, stats) = Compiler::new(config).compile_with_stats(&decoded).unwrap();
    assert_eq!(stats.gaps, 1);
    assert_eq!(target.method_by_name("fun1").unwrap().body[0], Instr::Nop);
}

#[test]
fn test_compile_many_matches_sequential() {
    init_tracing();
    let first = encode(&counter_module(4));
    let second = encode(&counter_module_with_debug());
    let broken = b"HLB\x09".to_vec();
    let images: Vec<&[u8]> = vec![first.as_slice(), broken.as_slice(), second.as_slice()];
    let config = CompilerConfig::default();

    let results = compile_many(&images, &config);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0], compile_bytes(&first, &config));
    assert!(matches!(results[1], Err(Error::Decode(_))));
    assert_eq!(results[2], compile_bytes(&second, &config));
}

#[test]
fn test_listing_names_every_method() {
    let target = compile_bytes(&encode(&counter_module(4)), &CompilerConfig::default()).unwrap();
    let text = target.listing();
    assert!(text.starts_with(".assembly module"));
    assert!(text.contains(".entrypoint method#0"));
    for m in &target.methods {
        assert!(text.contains(&m.name), "missing {}", m.name);
    }
}
