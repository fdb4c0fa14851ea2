//! In-place tree rewriting.
//!
//! [`Transformer`] has one hook per node kind; the default hooks call the
//! matching `walk_*` function, which visits every child. The input rewrite
//! overrides [`Transformer::visit_expr`] and walks children first, so nested
//! calls such as `input(input("a"))` are each rewritten on their own.

use tracing::debug;

use crate::ast::*;
use crate::scope;

/// The blocking input primitive whose call sites become suspension points.
pub const INPUT: &str = "input";

/// Mutable tree visitor.
pub trait Transformer {
    fn visit_module(&mut self, module: &mut Module) {
        walk_module(self, module);
    }

    fn visit_stmt(&mut self, stmt: &mut Stmt) {
        walk_stmt(self, stmt);
    }

    fn visit_function_def(&mut self, def: &mut FunctionDef) {
        walk_function_def(self, def);
    }

    fn visit_excepthandler(&mut self, handler: &mut ExceptHandler) {
        walk_excepthandler(self, handler);
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_module<V: Transformer + ?Sized>(visitor: &mut V, module: &mut Module) {
    walk_body(visitor, &mut module.body);
}

fn walk_body<V: Transformer + ?Sized>(visitor: &mut V, body: &mut [Stmt]) {
    for stmt in body {
        visitor.visit_stmt(stmt);
    }
}

pub fn walk_stmt<V: Transformer + ?Sized>(visitor: &mut V, stmt: &mut Stmt) {
    match &mut stmt.kind {
        StmtKind::Expr(expr) => visitor.visit_expr(expr),
        StmtKind::Assign { targets, value } => {
            for target in targets {
                visitor.visit_expr(target);
            }
            visitor.visit_expr(value);
        }
        StmtKind::AugAssign { target, value, .. } => {
            visitor.visit_expr(target);
            visitor.visit_expr(value);
        }
        StmtKind::If { test, body, orelse } | StmtKind::While { test, body, orelse } => {
            visitor.visit_expr(test);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        StmtKind::For {
            target,
            iter,
            body,
            orelse,
        } => {
            visitor.visit_expr(target);
            visitor.visit_expr(iter);
            walk_body(visitor, body);
            walk_body(visitor, orelse);
        }
        StmtKind::FunctionDef(def) => {
            // Unshared at rewrite time, so this does not copy.
            visitor.visit_function_def(std::rc::Rc::make_mut(def));
        }
        StmtKind::Return(value) | StmtKind::Raise(value) => {
            if let Some(value) = value {
                visitor.visit_expr(value);
            }
        }
        StmtKind::Try {
            body,
            handlers,
            orelse,
            finalbody,
        } => {
            walk_body(visitor, body);
            for handler in handlers {
                visitor.visit_excepthandler(handler);
            }
            walk_body(visitor, orelse);
            walk_body(visitor, finalbody);
        }
        StmtKind::Assert { test, msg } => {
            visitor.visit_expr(test);
            if let Some(msg) = msg {
                visitor.visit_expr(msg);
            }
        }
        StmtKind::Pass
        | StmtKind::Break
        | StmtKind::Continue
        | StmtKind::Global(_)
        | StmtKind::Import(_)
        | StmtKind::ImportFrom { .. } => {}
    }
}

pub fn walk_function_def<V: Transformer + ?Sized>(visitor: &mut V, def: &mut FunctionDef) {
    for param in &mut def.params {
        if let Some(default) = &mut param.default {
            visitor.visit_expr(default);
        }
    }
    walk_body(visitor, &mut def.body);
}

pub fn walk_excepthandler<V: Transformer + ?Sized>(visitor: &mut V, handler: &mut ExceptHandler) {
    if let Some(typ) = &mut handler.typ {
        visitor.visit_expr(typ);
    }
    walk_body(visitor, &mut handler.body);
}

pub fn walk_expr<V: Transformer + ?Sized>(visitor: &mut V, expr: &mut Expr) {
    match expr {
        Expr::Name(_) | Expr::Constant(_) => {}
        Expr::FString(parts) => {
            for part in parts {
                if let FStringPart::Field { value, .. } = part {
                    visitor.visit_expr(value);
                }
            }
        }
        Expr::List(items) | Expr::Tuple(items) => {
            for item in items {
                visitor.visit_expr(item);
            }
        }
        Expr::Dict(entries) => {
            for (key, value) in entries {
                visitor.visit_expr(key);
                visitor.visit_expr(value);
            }
        }
        Expr::BinOp { left, right, .. } => {
            visitor.visit_expr(left);
            visitor.visit_expr(right);
        }
        Expr::UnaryOp { operand, .. } => visitor.visit_expr(operand),
        Expr::BoolOp { values, .. } => {
            for value in values {
                visitor.visit_expr(value);
            }
        }
        Expr::Compare {
            left, comparators, ..
        } => {
            visitor.visit_expr(left);
            for comparator in comparators {
                visitor.visit_expr(comparator);
            }
        }
        Expr::Call {
            func,
            args,
            keywords,
        } => {
            visitor.visit_expr(func);
            for arg in args {
                visitor.visit_expr(arg);
            }
            for keyword in keywords {
                visitor.visit_expr(&mut keyword.value);
            }
        }
        Expr::Attribute { value, .. } => visitor.visit_expr(value),
        Expr::Subscript { value, index } => {
            visitor.visit_expr(value);
            visitor.visit_expr(index);
        }
        Expr::Slice { lower, upper, step } => {
            for part in [lower, upper, step].into_iter().flatten() {
                visitor.visit_expr(part);
            }
        }
        Expr::IfExp { test, body, orelse } => {
            visitor.visit_expr(test);
            visitor.visit_expr(body);
            visitor.visit_expr(orelse);
        }
        Expr::Await(value) => visitor.visit_expr(value),
    }
}

/// Rewrites unshadowed `input(...)` calls into `await input(...)`.
struct InputRewriter {
    /// `input` is bound somewhere in the module namespace.
    module_bound: bool,
    /// For each enclosing function, whether `input` is local to it.
    enclosing: Vec<bool>,
    rewritten: usize,
}

impl InputRewriter {
    fn is_shadowed(&self) -> bool {
        self.module_bound || self.enclosing.iter().any(|local| *local)
    }
}

impl Transformer for InputRewriter {
    fn visit_function_def(&mut self, def: &mut FunctionDef) {
        // Defaults are evaluated in the enclosing scope.
        for param in &mut def.params {
            if let Some(default) = &mut param.default {
                self.visit_expr(default);
            }
        }
        self.enclosing.push(def.scope.is_local(INPUT));
        walk_body(self, &mut def.body);
        self.enclosing.pop();
    }

    fn visit_expr(&mut self, expr: &mut Expr) {
        // Already a suspension point: only rewrite inside the call.
        if let Expr::Await(inner) = expr {
            if inner.is_call_to(INPUT) {
                walk_expr(self, inner);
                return;
            }
        }

        walk_expr(self, expr);

        if expr.is_call_to(INPUT) && !self.is_shadowed() {
            let call = std::mem::replace(expr, Expr::Constant(Constant::None));
            *expr = Expr::Await(Box::new(call));
            self.rewritten += 1;
        }
    }
}

/// Rewrite every qualifying `input` call in `module` in place. Returns the
/// number of suspension points created.
///
/// Shadowing is decided per namespace, not in program order: a module-level
/// binding of `input` anywhere in the module (say a `def input()` on the
/// last line) leaves every module-level call unrewritten, including calls
/// that run before the binding. Such a call yields an un-awaited coroutine.
pub fn rewrite_module(module: &mut Module) -> usize {
    let module_bound = scope::module_bindings(module).contains(INPUT);
    let mut rewriter = InputRewriter {
        module_bound,
        enclosing: Vec::new(),
        rewritten: 0,
    };
    rewriter.visit_module(module);
    debug!(
        suspension_points = rewriter.rewritten,
        input_shadowed = module_bound,
        "rewrote input calls"
    );
    rewriter.rewritten
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;

    fn rewrite(source: &str) -> (Module, usize) {
        let mut module = parse(source).unwrap();
        let count = rewrite_module(&mut module);
        (module, count)
    }

    fn assigned_value(stmt: &Stmt) -> &Expr {
        match &stmt.kind {
            StmtKind::Assign { value, .. } => value,
            other => panic!("Expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn test_rewrites_bare_call() {
        let (module, count) = rewrite("name = input('Name: ')\n");
        assert_eq!(count, 1);
        match assigned_value(&module.body[0]) {
            Expr::Await(call) => assert!(call.is_call_to(INPUT)),
            other => panic!("Expected await, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_calls_rewritten_independently() {
        let (module, count) = rewrite("x = input(input('a'))\n");
        assert_eq!(count, 2);
        let Expr::Await(outer) = assigned_value(&module.body[0]) else {
            panic!("Expected await");
        };
        let Expr::Call { args, .. } = outer.as_ref() else {
            panic!("Expected call");
        };
        assert!(matches!(&args[0], Expr::Await(inner) if inner.is_call_to(INPUT)));
    }

    #[test]
    fn test_rewrites_inside_functions_and_fstrings() {
        let source = "def ask():\n    return int(input())\nprint(f'{input()}!')\n";
        let (_, count) = rewrite(source);
        assert_eq!(count, 2);
    }

    #[test]
    fn test_attribute_and_alias_are_left_alone() {
        let (_, count) = rewrite("x = builtins.input()\nread = input\ny = read()\n");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_module_binding_shadows_everywhere() {
        let (_, count) = rewrite("x = input()\ndef input():\n    return 'stub'\n");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_local_binding_shadows_only_inside_function() {
        let source = "\
def f(input):
    return input()
def g():
    return input()
";
        let (_, count) = rewrite(source);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_enclosing_function_local_shadows_nested() {
        let source = "\
def outer():
    input = str
    def inner():
        return input()
    return inner()
";
        let (_, count) = rewrite(source);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_global_declaration_makes_module_binding() {
        let source = "\
def patch():
    global input
    input = str
print(input())
";
        let (_, count) = rewrite(source);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let (mut module, count) = rewrite("x = input(input())\n");
        assert_eq!(count, 2);
        let before = module.clone();
        assert_eq!(rewrite_module(&mut module), 0);
        assert_eq!(module, before);
    }

    #[test]
    fn test_other_nodes_untouched() {
        let source = "x = [1, len('a'), {'k': (2, 3)}]\n";
        let (module, count) = rewrite(source);
        assert_eq!(count, 0);
        assert_eq!(module, parse(source).unwrap());
    }
}
