//! Name binding analysis.
//!
//! A name is local to a function when the function binds it anywhere in its
//! own body (parameter, assignment target, `for` target, `def`, `except ...
//! as`, import) and does not declare it `global`. Nested function bodies are
//! separate scopes and are not searched.

use std::collections::BTreeSet;

use crate::ast::*;

/// Compute the scope of a function from its parameters and body.
pub fn analyze_function(params: &[Param], body: &[Stmt]) -> ScopeInfo {
    let mut bound: BTreeSet<String> = params.iter().map(|p| p.name.clone()).collect();
    let mut globals = BTreeSet::new();
    collect_bindings(body, &mut bound, &mut globals);

    let locals = bound.difference(&globals).cloned().collect();
    ScopeInfo { locals, globals }
}

/// Names bound in the module namespace anywhere in the program: top-level
/// bindings plus names a function declares `global` and then binds.
pub fn module_bindings(module: &Module) -> BTreeSet<String> {
    let mut bound = BTreeSet::new();
    let mut globals = BTreeSet::new();
    collect_bindings(&module.body, &mut bound, &mut globals);
    collect_global_writes(&module.body, &mut bound);
    bound
}

fn collect_global_writes(body: &[Stmt], out: &mut BTreeSet<String>) {
    for_each_function(body, &mut |def| {
        let mut bound = BTreeSet::new();
        let mut globals = BTreeSet::new();
        collect_bindings(&def.body, &mut bound, &mut globals);
        out.extend(bound.intersection(&globals).cloned());
        collect_global_writes(&def.body, out);
    });
}

/// Call `f` for every function defined directly in `body` (including inside
/// compound statements, but not inside other functions).
fn for_each_function(body: &[Stmt], f: &mut dyn FnMut(&FunctionDef)) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::FunctionDef(def) => f(def),
            StmtKind::If { body, orelse, .. }
            | StmtKind::While { body, orelse, .. }
            | StmtKind::For { body, orelse, .. } => {
                for_each_function(body, f);
                for_each_function(orelse, f);
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                for_each_function(body, f);
                for handler in handlers {
                    for_each_function(&handler.body, f);
                }
                for_each_function(orelse, f);
                for_each_function(finalbody, f);
            }
            _ => {}
        }
    }
}

fn collect_bindings(body: &[Stmt], bound: &mut BTreeSet<String>, globals: &mut BTreeSet<String>) {
    for stmt in body {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    collect_target(target, bound);
                }
            }
            StmtKind::AugAssign { target, .. } => collect_target(target, bound),
            StmtKind::For {
                target,
                body,
                orelse,
                ..
            } => {
                collect_target(target, bound);
                collect_bindings(body, bound, globals);
                collect_bindings(orelse, bound, globals);
            }
            StmtKind::If { body, orelse, .. } | StmtKind::While { body, orelse, .. } => {
                collect_bindings(body, bound, globals);
                collect_bindings(orelse, bound, globals);
            }
            StmtKind::FunctionDef(def) => {
                bound.insert(def.name.clone());
            }
            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => {
                collect_bindings(body, bound, globals);
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        bound.insert(name.clone());
                    }
                    collect_bindings(&handler.body, bound, globals);
                }
                collect_bindings(orelse, bound, globals);
                collect_bindings(finalbody, bound, globals);
            }
            StmtKind::Global(names) => globals.extend(names.iter().cloned()),
            StmtKind::Import(aliases) | StmtKind::ImportFrom { names: aliases, .. } => {
                bound.extend(aliases.iter().map(|a| a.bound_name().to_string()));
            }
            StmtKind::Expr(_)
            | StmtKind::Return(_)
            | StmtKind::Pass
            | StmtKind::Break
            | StmtKind::Continue
            | StmtKind::Raise(_)
            | StmtKind::Assert { .. } => {}
        }
    }
}

/// Names bound by an assignment target. Attribute and subscript targets bind
/// nothing.
fn collect_target(target: &Expr, bound: &mut BTreeSet<String>) {
    match target {
        Expr::Name(name) => {
            bound.insert(name.clone());
        }
        Expr::Tuple(items) | Expr::List(items) => {
            for item in items {
                collect_target(item, bound);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn first_function(module: &Module) -> &FunctionDef {
        match &module.body[0].kind {
            StmtKind::FunctionDef(def) => def,
            other => panic!("Expected function definition, got {:?}", other),
        }
    }

    #[test]
    fn test_params_and_assignments_are_local() {
        let module = parse("def f(a, b=1):\n    c = a\n    for i in b:\n        pass\n").unwrap();
        let scope = &first_function(&module).scope;
        let locals: Vec<_> = scope.locals.iter().map(String::as_str).collect();
        assert_eq!(locals, vec!["a", "b", "c", "i"]);
    }

    #[test]
    fn test_global_declaration_removes_local() {
        let module = parse("def f():\n    global total\n    total = 1\n").unwrap();
        let scope = &first_function(&module).scope;
        assert!(scope.locals.is_empty());
        assert!(scope.globals.contains("total"));
    }

    #[test]
    fn test_nested_function_body_is_separate() {
        let module = parse("def f():\n    def g():\n        x = 1\n    return g\n").unwrap();
        let scope = &first_function(&module).scope;
        assert!(scope.is_local("g"));
        assert!(!scope.is_local("x"));
    }

    #[test]
    fn test_module_bindings() {
        let source = "\
import os as input_module
x, [y, z] = 1, [2, 3]
try:
    pass
except ValueError as err:
    pass
def f():
    global late
    late = 1
";
        let module = parse(source).unwrap();
        let bound = module_bindings(&module);
        for name in ["input_module", "x", "y", "z", "err", "f", "late"] {
            assert!(bound.contains(name), "missing {}", name);
        }
    }
}
