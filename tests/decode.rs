mod common;

use common::*;
use hlbridge::bytecode::{decode, Callee, DebugLine, DecodeErrorKind, Type, TypeRef, FLAG_DEBUG};

#[test]
fn test_decode_counter_image() {
    init_tracing();
    let source = counter_module(4);
    let module = decode(&encode(&source)).unwrap();

    assert_eq!(module, source);
    assert!(module.diagnostics.is_empty());
    assert_eq!(module.types.len(), 8);
    assert!(matches!(&module.types[COUNTER], Type::Obj(o) if o.name == "Counter"));
    assert_eq!(module.resolve_findex(2), Some(Callee::Function(2)));
    assert_eq!(module.entrypoint, 0);
}

#[test]
fn test_decode_debug_info() {
    init_tracing();
    let source = counter_module_with_debug();
    let module = decode(&encode(&source)).unwrap();

    assert_eq!(module.flags & FLAG_DEBUG, FLAG_DEBUG);
    assert_eq!(module.debug_files, vec!["Counter.hx".to_string()]);
    let lines = module.functions[1].debug.as_ref().unwrap();
    assert_eq!(lines.len(), module.functions[1].ops.len());
    assert_eq!(lines[0], DebugLine { file: 0, line: 20 });
    assert_eq!(lines[7], DebugLine { file: 0, line: 23 });
    assert_eq!(module.functions[1].assigns[0].name, "n");
    assert_eq!(module.functions[1].assigns[0].at, -1);
}

#[test]
fn test_version_gates_optional_sections() {
    init_tracing();
    let mut v5 = counter_module(5);
    v5.bytes = b"abcdef".to_vec();
    v5.bytes_pos = vec![0, 3];
    let decoded = decode(&encode(&v5)).unwrap();
    assert_eq!(decoded.bytes, b"abcdef".to_vec());
    assert_eq!(decoded.bytes_pos, vec![0, 3]);

    // the pre-v5 header has no blob count, so the blob pool is not written
    let mut v4 = counter_module(4);
    v4.bytes = b"ignored".to_vec();
    v4.bytes_pos = vec![0];
    let decoded = decode(&encode(&v4)).unwrap();
    assert!(decoded.bytes_pos.is_empty());

    let v2 = counter_module(2);
    let decoded = decode(&encode(&v2)).unwrap();
    assert!(decoded.constants.is_empty());
    assert_eq!(decoded.functions, v2.functions);
}

#[test]
fn test_truncated_image_reports_offset() {
    init_tracing();
    let bytes = encode(&counter_module(4));
    let cut = &bytes[..bytes.len() - 3];
    let err = decode(cut).unwrap_err();
    assert!(matches!(err.kind, DecodeErrorKind::UnexpectedEof { .. }));
    assert!(err.offset <= cut.len());
}

#[test]
fn test_unsupported_version() {
    let mut bytes = encode(&counter_module(4));
    bytes[3] = 9;
    let err = decode(&bytes).unwrap_err();
    assert_eq!(err.offset, 3);
    assert!(matches!(err.kind, DecodeErrorKind::UnsupportedVersion { found: 9, .. }));
}

#[test]
fn test_bad_global_type_is_patched() {
    init_tracing();
    let mut source = counter_module(4);
    source.globals = vec![TypeRef(COUNTER), TypeRef(77)];
    let module = decode(&encode(&source)).unwrap();
    assert_eq!(module.globals, vec![TypeRef(COUNTER), TypeRef(0)]);
    assert_eq!(module.diagnostics.len(), 1);
    assert!(module.diagnostics[0].message.contains("77"));
}

#[test]
fn test_disassembly_annotates_pools_and_branches() {
    let module = decode(&encode(&counter_module_with_debug())).unwrap();
    let text = module.disassemble(&module.functions[1]);
    assert!(text.starts_with("=== fun1 ==="));
    assert!(text.contains("Counter.hx:20"));
    assert!(text.contains("; -> 0007"));
    assert!(text.contains("; -> 0002"));

    let main = module.disassemble(&module.functions[0]);
    assert!(main.contains("; 10"));
    assert!(main.contains("; fun1"));
}
