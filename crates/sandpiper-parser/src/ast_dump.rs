/// AST dumping utilities for testing and debugging
///
/// Statements are printed as an indented tree; expressions are rendered back
/// to source form on a single line, with suspension points shown as `await`.

use crate::ast::*;
use std::fmt::Write as FmtWrite;

/// Dump a module AST as a pretty-printed tree
pub fn dump_module(module: &Module) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_module(&mut out, module);
    out
}

fn write_module(out: &mut String, module: &Module) -> std::fmt::Result {
    writeln!(out, "Module:")?;
    write_body(out, &module.body, 1)
}

fn write_body(out: &mut String, body: &[Stmt], indent: usize) -> std::fmt::Result {
    if body.is_empty() {
        writeln!(out, "{}(empty)", "  ".repeat(indent))?;
    }
    for stmt in body {
        write_stmt(out, stmt, indent)?;
    }
    Ok(())
}

fn write_stmt(out: &mut String, stmt: &Stmt, indent: usize) -> std::fmt::Result {
    let prefix = "  ".repeat(indent);
    let line = stmt.line;
    match &stmt.kind {
        StmtKind::Expr(expr) => writeln!(out, "{}[{}] Expr: {}", prefix, line, render(expr))?,
        StmtKind::Assign { targets, value } => {
            let targets: Vec<String> = targets.iter().map(render).collect();
            writeln!(out, "{}[{}] Assign: {} = {}", prefix, line, targets.join(" = "), render(value))?;
        }
        StmtKind::AugAssign { target, op, value } => {
            writeln!(out, "{}[{}] AugAssign: {} {}= {}", prefix, line, render(target), op.symbol(), render(value))?;
        }
        StmtKind::If { test, body, orelse } => {
            writeln!(out, "{}[{}] If: {}", prefix, line, render(test))?;
            write_body(out, body, indent + 1)?;
            if !orelse.is_empty() {
                writeln!(out, "{}Else:", prefix)?;
                write_body(out, orelse, indent + 1)?;
            }
        }
        StmtKind::While { test, body, orelse } => {
            writeln!(out, "{}[{}] While: {}", prefix, line, render(test))?;
            write_body(out, body, indent + 1)?;
            if !orelse.is_empty() {
                writeln!(out, "{}Else:", prefix)?;
                write_body(out, orelse, indent + 1)?;
            }
        }
        StmtKind::For { target, iter, body, orelse } => {
            writeln!(out, "{}[{}] For: {} in {}", prefix, line, render(target), render(iter))?;
            write_body(out, body, indent + 1)?;
            if !orelse.is_empty() {
                writeln!(out, "{}Else:", prefix)?;
                write_body(out, orelse, indent + 1)?;
            }
        }
        StmtKind::FunctionDef(def) => {
            let params: Vec<String> = def
                .params
                .iter()
                .map(|p| match &p.default {
                    Some(default) => format!("{}={}", p.name, render(default)),
                    None => p.name.clone(),
                })
                .collect();
            let kind = if def.is_async { "AsyncFunction" } else { "Function" };
            writeln!(out, "{}[{}] {}: {}({})", prefix, line, kind, def.name, params.join(", "))?;
            if !def.scope.locals.is_empty() {
                let locals: Vec<&str> = def.scope.locals.iter().map(String::as_str).collect();
                writeln!(out, "{}  Locals: {}", prefix, locals.join(", "))?;
            }
            write_body(out, &def.body, indent + 1)?;
        }
        StmtKind::Return(value) => match value {
            Some(value) => writeln!(out, "{}[{}] Return: {}", prefix, line, render(value))?,
            None => writeln!(out, "{}[{}] Return", prefix, line)?,
        },
        StmtKind::Raise(value) => match value {
            Some(value) => writeln!(out, "{}[{}] Raise: {}", prefix, line, render(value))?,
            None => writeln!(out, "{}[{}] Raise", prefix, line)?,
        },
        StmtKind::Pass => writeln!(out, "{}[{}] Pass", prefix, line)?,
        StmtKind::Break => writeln!(out, "{}[{}] Break", prefix, line)?,
        StmtKind::Continue => writeln!(out, "{}[{}] Continue", prefix, line)?,
        StmtKind::Try { body, handlers, orelse, finalbody } => {
            writeln!(out, "{}[{}] Try:", prefix, line)?;
            write_body(out, body, indent + 1)?;
            for handler in handlers {
                let typ = handler.typ.as_ref().map(render).unwrap_or_default();
                match &handler.name {
                    Some(name) => writeln!(out, "{}[{}] Except: {} as {}", prefix, handler.line, typ, name)?,
                    None => writeln!(out, "{}[{}] Except: {}", prefix, handler.line, typ)?,
                }
                write_body(out, &handler.body, indent + 1)?;
            }
            if !orelse.is_empty() {
                writeln!(out, "{}Else:", prefix)?;
                write_body(out, orelse, indent + 1)?;
            }
            if !finalbody.is_empty() {
                writeln!(out, "{}Finally:", prefix)?;
                write_body(out, finalbody, indent + 1)?;
            }
        }
        StmtKind::Global(names) => writeln!(out, "{}[{}] Global: {}", prefix, line, names.join(", "))?,
        StmtKind::Assert { test, msg } => match msg {
            Some(msg) => writeln!(out, "{}[{}] Assert: {}, {}", prefix, line, render(test), render(msg))?,
            None => writeln!(out, "{}[{}] Assert: {}", prefix, line, render(test))?,
        },
        StmtKind::Import(names) => {
            writeln!(out, "{}[{}] Import: {}", prefix, line, render_aliases(names))?;
        }
        StmtKind::ImportFrom { module, names } => {
            writeln!(out, "{}[{}] ImportFrom: {} import {}", prefix, line, module, render_aliases(names))?;
        }
    }
    Ok(())
}

fn render_aliases(names: &[Alias]) -> String {
    names
        .iter()
        .map(|a| match &a.asname {
            Some(asname) => format!("{} as {}", a.name, asname),
            None => a.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn render_all(exprs: &[Expr]) -> String {
    exprs.iter().map(render).collect::<Vec<_>>().join(", ")
}

/// Render an expression in source form.
pub fn render(expr: &Expr) -> String {
    match expr {
        Expr::Name(name) => name.clone(),
        Expr::Constant(constant) => match constant {
            Constant::None => "None".to_string(),
            Constant::Bool(true) => "True".to_string(),
            Constant::Bool(false) => "False".to_string(),
            Constant::Int(n) => n.to_string(),
            Constant::Float(n) => format!("{:?}", n),
            Constant::Str(s) => format!("{:?}", s),
        },
        Expr::FString(parts) => {
            let mut text = String::from("f\"");
            for part in parts {
                match part {
                    FStringPart::Literal(s) => text.push_str(&s.replace('{', "{{").replace('}', "}}")),
                    FStringPart::Field { value, conversion, format_spec } => {
                        text.push('{');
                        text.push_str(&render(value));
                        if let Some(c) = conversion {
                            text.push('!');
                            text.push(*c);
                        }
                        if let Some(spec) = format_spec {
                            text.push(':');
                            text.push_str(spec);
                        }
                        text.push('}');
                    }
                }
            }
            text.push('"');
            text
        }
        Expr::List(items) => format!("[{}]", render_all(items)),
        Expr::Tuple(items) if items.len() == 1 => format!("({},)", render(&items[0])),
        Expr::Tuple(items) => format!("({})", render_all(items)),
        Expr::Dict(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", render(k), render(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Expr::BinOp { left, op, right } => {
            format!("({} {} {})", render(left), op.symbol(), render(right))
        }
        Expr::UnaryOp { op, operand } => match op {
            UnaryOp::Not => format!("(not {})", render(operand)),
            UnaryOp::Neg => format!("(-{})", render(operand)),
            UnaryOp::Pos => format!("(+{})", render(operand)),
        },
        Expr::BoolOp { op, values } => {
            let sep = match op {
                BoolOp::And => " and ",
                BoolOp::Or => " or ",
            };
            format!("({})", values.iter().map(render).collect::<Vec<_>>().join(sep))
        }
        Expr::Compare { left, ops, comparators } => {
            let mut text = format!("({}", render(left));
            for (op, right) in ops.iter().zip(comparators) {
                let _ = write!(text, " {} {}", op.symbol(), render(right));
            }
            text.push(')');
            text
        }
        Expr::Call { func, args, keywords } => {
            let mut all: Vec<String> = args.iter().map(render).collect();
            all.extend(keywords.iter().map(|k| format!("{}={}", k.name, render(&k.value))));
            format!("{}({})", render(func), all.join(", "))
        }
        Expr::Attribute { value, attr } => format!("{}.{}", render(value), attr),
        Expr::Subscript { value, index } => format!("{}[{}]", render(value), render(index)),
        Expr::Slice { lower, upper, step } => {
            let part = |e: &Option<Box<Expr>>| e.as_deref().map(render).unwrap_or_default();
            match step {
                Some(_) => format!("{}:{}:{}", part(lower), part(upper), part(step)),
                None => format!("{}:{}", part(lower), part(upper)),
            }
        }
        Expr::IfExp { test, body, orelse } => {
            format!("({} if {} else {})", render(body), render(test), render(orelse))
        }
        Expr::Await(value) => format!("(await {})", render(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform;

    #[test]
    fn test_dump_shows_suspension_points() {
        let module = transform("name = input('Name: ')\nprint('Hi ' + name)\n").unwrap();
        let dump = dump_module(&module);
        assert_eq!(
            dump,
            "Module:\n  [1] Assign: name = (await input(\"Name: \"))\n  [2] Expr: print((\"Hi \" + name))\n"
        );
    }

    #[test]
    fn test_dump_function() {
        let module = transform("def f(a, b=2):\n    return a\n").unwrap();
        let dump = dump_module(&module);
        assert!(dump.contains("[1] Function: f(a, b=2)"), "{}", dump);
        assert!(dump.contains("Locals: a, b"), "{}", dump);
        assert!(dump.contains("[2] Return: a"), "{}", dump);
    }

    #[test]
    fn test_render_expressions() {
        let module = transform("x[1:2]\nf'{a!r:>3}'\n-(1)\n").unwrap();
        let rendered: Vec<String> = module
            .body
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Expr(e) => render(e),
                other => panic!("Expected expression, got {:?}", other),
            })
            .collect();
        assert_eq!(rendered, vec!["x[1:2]", "f\"{a!r:>3}\"", "(-1)"]);
    }
}
