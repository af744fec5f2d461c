//! Human-readable listing of a target module

use std::fmt::{self, Write};

use itertools::Itertools;

use super::instr::{CallTarget, Instr};
use super::types::{MethodDecl, TargetModule, TypeDecl};

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallTarget::Method(id) => write!(f, "method#{}", id.0),
            CallTarget::Runtime(member) => f.write_str(&member.name()),
        }
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::LdArg(i) => write!(f, "ldarg {}", i),
            Instr::StArg(i) => write!(f, "starg {}", i),
            Instr::LdLoc(i) => write!(f, "ldloc {}", i),
            Instr::StLoc(i) => write!(f, "stloc {}", i),
            Instr::LdcI4(v) => write!(f, "ldc.i4 {}", v),
            Instr::LdcI8(v) => write!(f, "ldc.i8 {}", v),
            Instr::LdcR8(v) => write!(f, "ldc.r8 {}", v),
            Instr::LdStr(s) => write!(f, "ldstr {:?}", s),
            Instr::LdBytes(b) => write!(f, "ldbytes [{}]", b.iter().map(|x| format!("{:02x}", x)).join(" ")),
            Instr::LdToken(t) => write!(f, "ldtoken {}", t),
            Instr::LdFld(r) => write!(f, "ldfld {}:{}", r.owner.0, r.index),
            Instr::StFld(r) => write!(f, "stfld {}:{}", r.owner.0, r.index),
            Instr::LdSFld(g) => write!(f, "ldsfld global{}", g.0),
            Instr::StSFld(g) => write!(f, "stsfld global{}", g.0),
            Instr::Conv(c) => write!(f, "conv.{}", format!("{:?}", c).to_lowercase()),
            Instr::Br(l) => write!(f, "br L{}", l.0),
            Instr::BrTrue(l) => write!(f, "brtrue L{}", l.0),
            Instr::BrFalse(l) => write!(f, "brfalse L{}", l.0),
            Instr::Branch(cmp, l) => write!(f, "b{} L{}", format!("{:?}", cmp).to_lowercase(), l.0),
            Instr::Switch(ls) => write!(f, "switch ({})", ls.iter().map(|l| format!("L{}", l.0)).join(", ")),
            Instr::MarkLabel(l) => write!(f, "L{}:", l.0),
            Instr::Call(t) => write!(f, "call {}", t),
            Instr::NewObj(t) => write!(f, "newobj {}", t),
            Instr::NewDelegate { method, bound } => {
                write!(f, "newdelegate method#{}{}", method.0, if *bound { " bound" } else { "" })
            }
            Instr::InvokeDelegate(sig) => {
                write!(f, "invoke ({}) -> {}", sig.params.iter().join(", "), sig.ret)
            }
            Instr::Box(t) => write!(f, "box {}", t),
            Instr::UnboxAny(t) => write!(f, "unbox.any {}", t),
            Instr::CastClass(t) => write!(f, "castclass {}", t),
            Instr::IsInst(t) => write!(f, "isinst {}", t),
            Instr::NewArr(t) => write!(f, "newarr {}", t),
            Instr::LdElem(t) => write!(f, "ldelem {}", t),
            Instr::StElem(t) => write!(f, "stelem {}", t),
            Instr::BeginCatch(t) => write!(f, "catch {} {{", t),
            Instr::BeginTry => write!(f, ".try {{"),
            Instr::EndTry => write!(f, "}}"),
            Instr::Leave(l) => write!(f, "leave L{}", l.0),
            Instr::SequencePoint { file, line } => write!(f, ".line {}:{}", file, line),
            other => write!(f, "{}", format!("{:?}", other).to_lowercase()),
        }
    }
}

fn write_type(out: &mut String, decl: &TypeDecl) {
    let base = decl.base.map_or(String::new(), |b| format!(" : class#{}", b.0));
    let _ = writeln!(out, ".class#{} {:?} {}{}", decl.id.0, decl.kind, decl.name, base);
    for (i, field) in decl.fields.iter().enumerate() {
        let _ = writeln!(out, "  .field {} {} {}", i, field.ty, field.name);
    }
    if let Some(ctor) = decl.constructor {
        let _ = writeln!(out, "  .ctor method#{}", ctor.0);
    }
}

fn write_method(out: &mut String, m: &MethodDecl) {
    let _ = writeln!(
        out,
        ".method#{} {:?} {}({}) -> {}",
        m.id.0,
        m.kind,
        m.name,
        m.signature.params.iter().join(", "),
        m.signature.ret
    );
    if let Some(native) = &m.native {
        let _ = writeln!(out, "  .import {} {}", native.lib, native.symbol);
        return;
    }
    if !m.locals.is_empty() {
        let _ = writeln!(out, "  .locals ({})", m.locals.iter().join(", "));
    }
    for instr in &m.body {
        match instr {
            Instr::MarkLabel(_) => {
                let _ = writeln!(out, " {}", instr);
            }
            _ => {
                let _ = writeln!(out, "    {}", instr);
            }
        }
    }
}

impl TargetModule {
    /// Render the whole module as text
    pub fn listing(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, ".assembly {}", self.name);
        for g in &self.globals {
            let _ = writeln!(out, ".global {} {:?} {}", g.name, g.kind, g.ty);
        }
        if let Some(entry) = self.entrypoint {
            let _ = writeln!(out, ".entrypoint method#{}", entry.0);
        }
        for decl in &self.types {
            write_type(&mut out, decl);
        }
        for m in &self.methods {
            write_method(&mut out, m);
        }
        out
    }
}
