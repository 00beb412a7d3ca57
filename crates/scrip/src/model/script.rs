use std::collections::HashMap;

use scrip_util::{define_index, IndexVec};
use thiserror::Error;

use super::types::{TypeIdx, VarScope};
use crate::source::Range;

define_index!(pub VariableIdx);
define_index!(pub LabelIdx);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SymbolError {
    #[error("variable `{0}` already declared in this scope")]
    AlreadyDeclared(String),
    #[error("label `{0}` already declared")]
    LabelAlreadyDeclared(String),
    #[error("local variable `{0}` declared outside of a scope")]
    LocalOutsideScope(String),
    #[error("no scope to close")]
    NoScope,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptVariable {
    pub name: String,
    pub ty: TypeIdx,
    pub scope: VarScope,
    // slot in the global or local variable space
    pub index: u32,
    // element count for arrays
    pub size: Option<u32>,
    pub range: Range,
    pub temporary: bool,
}

impl ScriptVariable {
    pub fn is_array(&self) -> bool {
        self.size.is_some()
    }

    pub fn slots(&self) -> u32 {
        self.size.unwrap_or(1).max(1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLabel {
    pub name: String,
    pub range: Range,
    // seen as `name:` in the source; false for a forward reference
    pub declared: bool,
    // position in the xlation stream the label points at
    pub xlation: Option<usize>,
}

/// Variables and labels of one build.
///
/// Scope 0 is the global scope and is never closed. Local variable slots
/// are reused once the scope that declared them closes.
#[derive(Debug)]
pub struct ScriptSymbols {
    variables: IndexVec<VariableIdx, ScriptVariable>,
    labels: IndexVec<LabelIdx, ScriptLabel>,
    label_names: HashMap<String, LabelIdx>,
    scopes: Vec<HashMap<String, VariableIdx>>,
    next_global: u32,
    next_local: u32,
    local_marks: Vec<u32>,
    temporaries: u32,
}

impl Default for ScriptSymbols {
    fn default() -> Self {
        Self {
            variables: IndexVec::new(),
            labels: IndexVec::new(),
            label_names: HashMap::new(),
            scopes: vec![HashMap::new()],
            next_global: 0,
            next_local: 0,
            local_marks: Vec::new(),
            temporaries: 0,
        }
    }
}

impl ScriptSymbols {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
        self.local_marks.push(self.next_local);
    }

    pub fn leave_scope(&mut self) -> Result<(), SymbolError> {
        if self.scopes.len() <= 1 {
            return Err(SymbolError::NoScope);
        }
        self.scopes.pop();
        if let Some(mark) = self.local_marks.pop() {
            self.next_local = mark;
        }
        Ok(())
    }

    /// Declares a variable, allocating the next free slot of its scope.
    pub fn declare(
        &mut self,
        name: &str,
        ty: TypeIdx,
        scope: VarScope,
        size: Option<u32>,
        range: Range,
    ) -> Result<VariableIdx, SymbolError> {
        let index = match scope {
            VarScope::Global => self.next_global,
            VarScope::Local => self.next_local,
        };
        self.declare_at(name, ty, scope, index, size, range)
    }

    // explicit slot, as given by `#register_var`
    pub fn declare_at(
        &mut self,
        name: &str,
        ty: TypeIdx,
        scope: VarScope,
        index: u32,
        size: Option<u32>,
        range: Range,
    ) -> Result<VariableIdx, SymbolError> {
        let table = match scope {
            VarScope::Global => 0,
            VarScope::Local if self.scopes.len() > 1 => self.scopes.len() - 1,
            VarScope::Local => return Err(SymbolError::LocalOutsideScope(name.to_string())),
        };
        if self.scopes[table].contains_key(name) {
            return Err(SymbolError::AlreadyDeclared(name.to_string()));
        }

        let variable = ScriptVariable {
            name: name.to_string(),
            ty,
            scope,
            index,
            size,
            range,
            temporary: false,
        };
        let end = index + variable.slots();
        match scope {
            VarScope::Global => self.next_global = self.next_global.max(end),
            VarScope::Local => self.next_local = self.next_local.max(end),
        }
        let idx = self.variables.push(variable);
        self.scopes[table].insert(name.to_string(), idx);
        Ok(idx)
    }

    // unnamed slot holding an intermediate result, in the innermost scope
    pub fn temporary(&mut self, ty: TypeIdx, scope: VarScope, range: Range) -> VariableIdx {
        let name = format!("__tmp{}", self.temporaries);
        self.temporaries += 1;
        let scope = if self.scopes.len() > 1 { scope } else { VarScope::Global };
        let index = match scope {
            VarScope::Global => self.next_global,
            VarScope::Local => self.next_local,
        };
        match scope {
            VarScope::Global => self.next_global += 1,
            VarScope::Local => self.next_local += 1,
        }
        self.variables.push(ScriptVariable {
            name,
            ty,
            scope,
            index,
            size: None,
            range,
            temporary: true,
        })
    }

    // innermost declaration wins
    pub fn lookup(&self, name: &str) -> Option<VariableIdx> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    pub fn variable(&self, idx: VariableIdx) -> &ScriptVariable {
        &self.variables[idx]
    }

    pub fn variables(&self) -> impl Iterator<Item = (VariableIdx, &ScriptVariable)> + '_ {
        self.variables.iter_enumerated()
    }

    /// Registers a label seen as `name:`. A forward reference to the same
    /// name becomes the declaration.
    pub fn declare_label(&mut self, name: &str, range: Range) -> Result<LabelIdx, SymbolError> {
        if let Some(idx) = self.label_names.get(name).copied() {
            let label = &mut self.labels[idx];
            if label.declared {
                return Err(SymbolError::LabelAlreadyDeclared(name.to_string()));
            }
            label.declared = true;
            label.range = range;
            return Ok(idx);
        }
        let idx = self.labels.push(ScriptLabel {
            name: name.to_string(),
            range,
            declared: true,
            xlation: None,
        });
        self.label_names.insert(name.to_string(), idx);
        Ok(idx)
    }

    pub fn reference_label(&mut self, name: &str, range: Range) -> LabelIdx {
        if let Some(idx) = self.label_names.get(name).copied() {
            return idx;
        }
        let idx = self.labels.push(ScriptLabel {
            name: name.to_string(),
            range,
            declared: false,
            xlation: None,
        });
        self.label_names.insert(name.to_string(), idx);
        idx
    }

    pub fn find_label(&self, name: &str) -> Option<LabelIdx> {
        self.label_names.get(name).copied()
    }

    pub fn label(&self, idx: LabelIdx) -> &ScriptLabel {
        &self.labels[idx]
    }

    pub fn label_mut(&mut self, idx: LabelIdx) -> &mut ScriptLabel {
        &mut self.labels[idx]
    }

    pub fn labels(&self) -> impl Iterator<Item = (LabelIdx, &ScriptLabel)> + '_ {
        self.labels.iter_enumerated()
    }
}
