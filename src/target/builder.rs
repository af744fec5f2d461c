//! Incremental method-body builder

use super::instr::{Instr, Label};
use super::types::TargetType;

/// Accumulates one method body
///
/// Labels are allocated up front and bound with [`MethodBuilder::mark`];
/// [`MethodBuilder::finish`] refuses bodies that jump to an unbound label.
#[derive(Debug, Default)]
pub struct MethodBuilder {
    body: Vec<Instr>,
    locals: Vec<TargetType>,
    labels: Vec<bool>,
}

/// Finished body plus its local declarations
#[derive(Debug, Clone, PartialEq)]
pub struct MethodBody {
    pub body: Vec<Instr>,
    pub locals: Vec<TargetType>,
}

impl MethodBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(false);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the current position
    pub fn mark(&mut self, label: Label) {
        if let Some(bound) = self.labels.get_mut(label.0) {
            *bound = true;
        }
        self.body.push(Instr::MarkLabel(label));
    }

    #[inline]
    pub fn emit(&mut self, instr: Instr) {
        self.body.push(instr);
    }

    pub fn declare_local(&mut self, ty: TargetType) -> u16 {
        self.locals.push(ty);
        (self.locals.len() - 1) as u16
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Last emitted instruction
    pub fn last(&self) -> Option<&Instr> {
        self.body.last()
    }

    /// Check the body and hand it out; fails with the first unbound label
    pub fn finish(self) -> Result<MethodBody, Label> {
        for instr in &self.body {
            for target in instr.targets() {
                if !self.labels.get(target.0).copied().unwrap_or(false) {
                    return Err(target);
                }
            }
        }
        Ok(MethodBody {
            body: self.body,
            locals: self.locals,
        })
    }
}
