//! Control-flow analysis of a source function body
//!
//! Finds every instruction that is the target of a jump so the translator
//! knows where to bind labels, and rejects jumps that leave the body. Each
//! `Trap` is paired with the `EndTrap` closing it so branches can tell
//! whether they leave a protected region.

use crate::bytecode::{Function, OpKind};

use super::super::error::{CompileError, CompileResult};

/// Source instructions spanned by one `Trap`
///
/// `start` is the `Trap` itself; `end` is its `EndTrap`, or the body length
/// when the trap is never closed. Instructions in `start + 1..=end` are
/// protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapRegion {
    pub start: usize,
    pub end: usize,
}

impl TrapRegion {
    #[inline]
    pub fn contains(&self, at: usize) -> bool {
        at > self.start && at <= self.end
    }
}

/// Per-instruction branch target flags plus trap nesting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyInfo {
    pub targets: Vec<bool>,
    /// Deepest `Trap` nesting seen in instruction order
    pub max_trap_depth: usize,
    /// Trap regions ordered by their `Trap` instruction
    pub regions: Vec<TrapRegion>,
}

impl BodyInfo {
    #[inline]
    pub fn is_target(&self, at: usize) -> bool {
        self.targets.get(at).copied().unwrap_or(false)
    }

    /// Region opened by the `Trap` at `at`
    pub fn region_at(&self, at: usize) -> Option<TrapRegion> {
        self.regions.iter().find(|r| r.start == at).copied()
    }
}

/// Absolute target of a relative offset taken at `at`
#[inline]
pub fn branch_target(at: usize, offset: i32) -> i64 {
    at as i64 + 1 + offset as i64
}

pub fn analyze(func: &Function) -> CompileResult<BodyInfo> {
    let len = func.ops.len();
    let mut targets = vec![false; len];
    let mut open: Vec<usize> = Vec::new();
    let mut max_trap_depth = 0usize;
    let mut regions = Vec::new();

    for (at, op) in func.ops.iter().enumerate() {
        for offset in op.branch_offsets() {
            let target = branch_target(at, offset);
            if target < 0 || target >= len as i64 {
                return Err(CompileError::InvalidBranchTarget {
                    function: func.findex,
                    at,
                    target,
                });
            }
            targets[target as usize] = true;
        }
        match op.kind {
            OpKind::Trap => {
                open.push(regions.len());
                regions.push(TrapRegion { start: at, end: len });
                max_trap_depth = max_trap_depth.max(open.len());
            }
            OpKind::EndTrap => {
                if let Some(r) = open.pop() {
                    regions[r].end = at;
                }
            }
            _ => {}
        }
    }

    Ok(BodyInfo {
        targets,
        max_trap_depth,
        regions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{Opcode, TypeRef};

    fn body(ops: Vec<Opcode>) -> Function {
        Function {
            findex: 7,
            ty: TypeRef(0),
            regs: vec![TypeRef(0)],
            ops,
            debug: None,
            assigns: vec![],
        }
    }

    #[test]
    fn test_negative_zero_and_positive_offsets() {
        let f = body(vec![
            Opcode::new(OpKind::Label, &[]),
            Opcode::new(OpKind::JTrue, &[0, 0]),
            Opcode::new(OpKind::JFalse, &[0, 1]),
            Opcode::new(OpKind::JAlways, &[-4]),
            Opcode::new(OpKind::Ret, &[0]),
        ]);
        let info = analyze(&f).unwrap();
        assert_eq!(info.targets, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_jump_outside_body_rejected() {
        let f = body(vec![Opcode::new(OpKind::JAlways, &[0])]);
        assert_eq!(
            analyze(&f),
            Err(CompileError::InvalidBranchTarget {
                function: 7,
                at: 0,
                target: 1,
            })
        );

        let f = body(vec![Opcode::new(OpKind::JAlways, &[-2])]);
        assert!(matches!(
            analyze(&f),
            Err(CompileError::InvalidBranchTarget { target: -1, .. })
        ));
    }

    #[test]
    fn test_switch_and_trap_targets() {
        let f = body(vec![
            Opcode::new(OpKind::Trap, &[0, 3]),
            Opcode::new(OpKind::Switch, &[0, 0, 1, 2]),
            Opcode::new(OpKind::Nop, &[]),
            Opcode::new(OpKind::EndTrap, &[0]),
            Opcode::new(OpKind::Ret, &[0]),
        ]);
        let info = analyze(&f).unwrap();
        assert!(info.is_target(2));
        assert!(info.is_target(3));
        assert!(info.is_target(4));
        assert!(!info.is_target(1));
        assert_eq!(info.max_trap_depth, 1);
        assert_eq!(info.region_at(0), Some(TrapRegion { start: 0, end: 3 }));
        assert_eq!(info.region_at(1), None);
    }

    #[test]
    fn test_nested_trap_regions() {
        let f = body(vec![
            Opcode::new(OpKind::Trap, &[0, 5]),
            Opcode::new(OpKind::Trap, &[0, 2]),
            Opcode::new(OpKind::Nop, &[]),
            Opcode::new(OpKind::EndTrap, &[0]),
            Opcode::new(OpKind::Nop, &[]),
            Opcode::new(OpKind::EndTrap, &[0]),
            Opcode::new(OpKind::Trap, &[0, 0]),
            Opcode::new(OpKind::Ret, &[0]),
        ]);
        let info = analyze(&f).unwrap();
        assert_eq!(info.max_trap_depth, 2);
        assert_eq!(
            info.regions,
            vec![
                TrapRegion { start: 0, end: 5 },
                TrapRegion { start: 1, end: 3 },
                TrapRegion { start: 6, end: 8 },
            ]
        );
        let outer = info.regions[0];
        assert!(!outer.contains(0));
        assert!(outer.contains(4));
        assert!(outer.contains(5));
        assert!(!outer.contains(6));
    }
}
