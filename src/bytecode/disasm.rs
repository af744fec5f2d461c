//! Textual listing of decoded functions

use std::fmt::Write;

use super::module::{Function, Module};
use super::opcodes::{OpKind, Opcode};

impl Module {
    /// Disassemble one function body
    pub fn disassemble(&self, func: &Function) -> String {
        let mut output = String::new();
        let nargs = self.fun_type(func.ty).map_or(0, |f| f.args.len());
        let _ = writeln!(output, "=== fun{} ===", func.findex);
        let _ = writeln!(
            output,
            "type: {}, regs: {}, args: {}, ops: {}",
            func.ty,
            func.regs.len(),
            nargs,
            func.ops.len()
        );
        for (i, r) in func.regs.iter().enumerate() {
            let ty = self
                .get_type(*r)
                .map_or_else(|| "???".to_string(), |t| t.to_string());
            let _ = writeln!(output, "  r{}: {}", i, ty);
        }

        for (i, op) in func.ops.iter().enumerate() {
            let line = func
                .debug
                .as_ref()
                .and_then(|d| d.get(i))
                .map_or(String::new(), |l| {
                    let file = self.debug_files.get(l.file).map_or("?", String::as_str);
                    format!("{}:{:<4} ", file, l.line)
                });
            let _ = writeln!(output, "{:04} {}{}", i, line, self.disassemble_op(i, op));
        }
        output
    }

    /// Disassemble a single instruction at index `at`
    pub fn disassemble_op(&self, at: usize, op: &Opcode) -> String {
        let mut text = op.to_string();
        let note = match op.kind {
            OpKind::Int => self.ints.get(op.p(1) as usize).map(|v| format!("{}", v)),
            OpKind::Float => self.floats.get(op.p(1) as usize).map(|v| format!("{}", v)),
            OpKind::String => self.string(op.p(1) as usize).map(|s| format!("{:?}", s)),
            OpKind::Call0 | OpKind::Call1 | OpKind::Call2 | OpKind::Call3 | OpKind::Call4
            | OpKind::CallN | OpKind::StaticClosure | OpKind::InstanceClosure => {
                Some(self.describe_findex(op.p(1) as usize))
            }
            OpKind::DynGet => self.string(op.p(2) as usize).map(|s| format!(".{}", s)),
            OpKind::DynSet => self.string(op.p(1) as usize).map(|s| format!(".{}", s)),
            _ if op.kind.is_branch() => {
                let targets: Vec<String> = op
                    .branch_offsets()
                    .iter()
                    .map(|o| format!("{:04}", at as i64 + 1 + *o as i64))
                    .collect();
                Some(format!("-> {}", targets.join(", ")))
            }
            _ => None,
        };
        if let Some(note) = note {
            let _ = write!(text, "  ; {}", note);
        }
        text
    }

    fn describe_findex(&self, findex: usize) -> String {
        match self.resolve_findex(findex) {
            Some(super::module::Callee::Native(i)) => self
                .natives
                .get(i)
                .map_or_else(|| "???".to_string(), |n| format!("{}.{}", n.lib, n.name)),
            Some(super::module::Callee::Function(_)) => format!("fun{}", findex),
            None => "???".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::module::Native;
    use crate::bytecode::types::{FunType, Type, TypeRef};

    #[test]
    fn test_listing_annotates_operands() {
        let mut m = Module::empty(4);
        m.ints = vec![42];
        m.strings = vec!["std".into(), "log".into()];
        m.types = vec![
            Type::I32,
            Type::Fun(FunType { args: vec![TypeRef(0)], ret: TypeRef(0) }),
        ];
        m.natives = vec![Native { findex: 1, lib: "std".into(), name: "log".into(), ty: TypeRef(1) }];
        m.functions = vec![Function {
            findex: 0,
            ty: TypeRef(1),
            regs: vec![TypeRef(0), TypeRef(0)],
            ops: vec![
                Opcode::new(OpKind::Int, &[1, 0]),
                Opcode::new(OpKind::JSLt, &[0, 1, -2]),
                Opcode::new(OpKind::Call1, &[1, 1, 0]),
                Opcode::new(OpKind::Ret, &[1]),
            ],
            debug: None,
            assigns: vec![],
        }];
        m.rebuild_function_table();

        let listing = m.disassemble(&m.functions[0]);
        assert!(listing.starts_with("=== fun0 ==="));
        assert!(listing.contains("regs: 2, args: 1, ops: 4"));
        assert!(listing.contains("; 42"));
        assert!(listing.contains("; -> 0000"));
        assert!(listing.contains("; std.log"));
    }
}
