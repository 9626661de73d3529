use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bytecode::verify::FRAME_HEADER;
use crate::compiler::compile_error::CompileErrorKind;

/// What a declared name stands for, with the data that kind carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// Inlined as `LIT` wherever referenced.
    Const { value: i64 },
    /// Offset from the base of the declaring frame.
    Var { address: usize },
    /// Instruction index of the procedure body.
    Procedure { entry: usize },
}

impl SymbolKind {
    pub fn name(&self) -> &'static str {
        match self {
            SymbolKind::Const { .. } => "constant",
            SymbolKind::Var { .. } => "variable",
            SymbolKind::Procedure { .. } => "procedure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    /// Nesting depth of the declaring block; the main program is level 0.
    pub level: usize,
    pub kind: SymbolKind,
}

/// A symbol found by `lookup`, with the number of levels between the use site
/// and the declaration. That distance is the static-link hop count.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub symbol: &'a Symbol,
    pub depth: usize,
}

#[derive(Debug)]
struct Scope {
    /// name -> index into `ScopeManager::declared`
    names: HashMap<String, usize>,
    next_address: usize,
}

impl Scope {
    fn new() -> Self {
        Self {
            names: HashMap::new(),
            next_address: FRAME_HEADER,
        }
    }
}

/// Stack of lexical scopes, innermost last.
///
/// The root scope (level 0) belongs to the main program and exists from
/// construction. Every symbol ever declared is also kept, in declaration
/// order, for the symbol-table listing.
#[derive(Debug)]
pub struct ScopeManager {
    scopes: Vec<Scope>,
    declared: Vec<Symbol>,
}

impl Default for ScopeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeManager {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::new()],
            declared: Vec::new(),
        }
    }

    /// Current nesting level.
    pub fn level(&self) -> usize {
        self.scopes.len() - 1
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    /// Drops the innermost scope and every name declared in it.
    pub fn exit_scope(&mut self) -> Result<(), CompileErrorKind> {
        if self.scopes.len() <= 1 {
            return Err(CompileErrorKind::Internal(
                "exit_scope called with only the root scope open".to_string(),
            ));
        }
        self.scopes.pop();
        Ok(())
    }

    /// Frame size needed by the innermost block: header plus its variables.
    pub fn frame_size(&self) -> usize {
        self.innermost().next_address
    }

    pub fn define_const(&mut self, name: &str, value: i64) -> Result<(), CompileErrorKind> {
        self.define(name, SymbolKind::Const { value })
    }

    /// Declares a variable and returns its frame offset.
    pub fn define_var(&mut self, name: &str) -> Result<usize, CompileErrorKind> {
        let address = self.innermost().next_address;
        self.define(name, SymbolKind::Var { address })?;
        self.innermost_mut().next_address += 1;
        Ok(address)
    }

    pub fn define_procedure(&mut self, name: &str, entry: usize) -> Result<(), CompileErrorKind> {
        self.define(name, SymbolKind::Procedure { entry })
    }

    /// Moves the entry point of the procedure `name` declared at `level`.
    pub fn set_procedure_entry(
        &mut self,
        level: usize,
        name: &str,
        entry: usize,
    ) -> Result<(), CompileErrorKind> {
        let index = self
            .scopes
            .get(level)
            .and_then(|scope| scope.names.get(name).copied())
            .ok_or_else(|| {
                CompileErrorKind::Internal(format!(
                    "procedure '{}' not found at level {}",
                    name, level
                ))
            })?;

        match &mut self.declared[index].kind {
            SymbolKind::Procedure { entry: slot } => {
                *slot = entry;
                Ok(())
            }
            other => Err(CompileErrorKind::Internal(format!(
                "'{}' is a {}, not a procedure",
                name,
                other.name()
            ))),
        }
    }

    /// Finds `name`, searching from the innermost scope outwards.
    pub fn lookup(&self, name: &str) -> Result<Resolved<'_>, CompileErrorKind> {
        self.scopes
            .iter()
            .rev()
            .enumerate()
            .find_map(|(depth, scope)| {
                scope.names.get(name).map(|&index| Resolved {
                    symbol: &self.declared[index],
                    depth,
                })
            })
            .ok_or_else(|| CompileErrorKind::Undefined(name.to_string()))
    }

    /// Every symbol declared so far, in declaration order.
    pub fn declared(&self) -> &[Symbol] {
        &self.declared
    }

    pub fn into_declared(self) -> Vec<Symbol> {
        self.declared
    }

    fn define(&mut self, name: &str, kind: SymbolKind) -> Result<(), CompileErrorKind> {
        if self.innermost().names.contains_key(name) {
            return Err(CompileErrorKind::Redeclared(name.to_string()));
        }

        let level = self.level();
        let index = self.declared.len();
        self.declared.push(Symbol {
            name: name.to_string(),
            level,
            kind,
        });
        self.innermost_mut().names.insert(name.to_string(), index);
        Ok(())
    }

    fn innermost(&self) -> &Scope {
        // The root scope is never popped.
        &self.scopes[self.scopes.len() - 1]
    }

    fn innermost_mut(&mut self) -> &mut Scope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_addresses_start_after_header() {
        let mut scopes = ScopeManager::new();
        assert_eq!(scopes.define_var("a").unwrap(), 3);
        assert_eq!(scopes.define_var("b").unwrap(), 4);
        scopes.define_const("k", 7).unwrap();
        assert_eq!(scopes.define_var("c").unwrap(), 5);
        assert_eq!(scopes.frame_size(), 6);
    }

    #[test]
    fn test_each_scope_has_its_own_counter() {
        let mut scopes = ScopeManager::new();
        scopes.define_var("a").unwrap();
        scopes.enter_scope();
        assert_eq!(scopes.frame_size(), 3);
        assert_eq!(scopes.define_var("b").unwrap(), 3);
        scopes.exit_scope().unwrap();
        assert_eq!(scopes.frame_size(), 4);
    }

    #[test]
    fn test_lookup_reports_level_difference() {
        let mut scopes = ScopeManager::new();
        scopes.define_var("x").unwrap();
        scopes.enter_scope();
        scopes.enter_scope();
        scopes.define_var("y").unwrap();

        let x = scopes.lookup("x").unwrap();
        assert_eq!(x.depth, 2);
        assert_eq!(x.symbol.level, 0);
        assert_eq!(x.symbol.kind, SymbolKind::Var { address: 3 });

        let y = scopes.lookup("y").unwrap();
        assert_eq!(y.depth, 0);
        assert_eq!(y.symbol.level, 2);
    }

    #[test]
    fn test_redeclaration_in_same_scope_fails() {
        let mut scopes = ScopeManager::new();
        scopes.define_var("x").unwrap();
        assert_eq!(
            scopes.define_const("x", 1),
            Err(CompileErrorKind::Redeclared("x".to_string()))
        );
        assert_eq!(
            scopes.define_procedure("x", 0),
            Err(CompileErrorKind::Redeclared("x".to_string()))
        );
    }

    #[test]
    fn test_shadowing_outer_scope_succeeds() {
        let mut scopes = ScopeManager::new();
        scopes.define_const("x", 1).unwrap();
        scopes.enter_scope();
        scopes.define_var("x").unwrap();

        let inner = scopes.lookup("x").unwrap();
        assert_eq!(inner.depth, 0);
        assert!(matches!(inner.symbol.kind, SymbolKind::Var { .. }));

        scopes.exit_scope().unwrap();
        let outer = scopes.lookup("x").unwrap();
        assert_eq!(outer.symbol.kind, SymbolKind::Const { value: 1 });
    }

    #[test]
    fn test_names_vanish_on_exit() {
        let mut scopes = ScopeManager::new();
        scopes.enter_scope();
        scopes.define_var("local").unwrap();
        scopes.exit_scope().unwrap();
        assert_eq!(
            scopes.lookup("local").unwrap_err(),
            CompileErrorKind::Undefined("local".to_string())
        );
        // still listed
        assert_eq!(scopes.declared().len(), 1);
    }

    #[test]
    fn test_exit_root_scope_fails() {
        let mut scopes = ScopeManager::new();
        assert!(matches!(
            scopes.exit_scope(),
            Err(CompileErrorKind::Internal(_))
        ));
        assert_eq!(scopes.level(), 0);
    }

    #[test]
    fn test_set_procedure_entry() {
        let mut scopes = ScopeManager::new();
        scopes.define_procedure("p", 1).unwrap();
        scopes.enter_scope();
        scopes.set_procedure_entry(0, "p", 5).unwrap();
        assert_eq!(
            scopes.lookup("p").unwrap().symbol.kind,
            SymbolKind::Procedure { entry: 5 }
        );

        scopes.define_var("v").unwrap();
        assert!(scopes.set_procedure_entry(1, "v", 2).is_err());
        assert!(scopes.set_procedure_entry(0, "missing", 2).is_err());
    }
}
