//! Statement and expression evaluation.
//!
//! Every function on a recursion cycle returns a boxed local future, so
//! evaluation can suspend at an `await` anywhere in the call tree and resume
//! when the bridge delivers input. Values are reference counted and not
//! `Send`; the futures run on a single-threaded executor.

use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use sandpiper_parser::ast::{
    BinOp, BoolOp, Constant, ExceptHandler, Expr, FStringPart, Stmt, StmtKind,
};
use tracing::{debug, warn};

use crate::Result;
use crate::bridge::{InputError, RuntimeBridge};
use crate::builtins::{self, Args, Builtin};
use crate::error::{Error, Raised};
use crate::interpreter::Interpreter;
use crate::ops::{self, ValueIter};
use crate::runtime::{Env, Frame};
use crate::value::{Dict, ExcClass, ExceptionValue, Function, Value};

/// Statements executed between cooperative yields to the executor.
const YIELD_INTERVAL: u64 = 1024;

/// How control leaves a block.
#[derive(Debug, Clone)]
pub enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

impl<'b, B: RuntimeBridge> Interpreter<'b, B> {
    /// Execute a block of statements.
    pub fn exec_block<'a>(&'a mut self, body: &'a [Stmt]) -> LocalBoxFuture<'a, Result<Flow>> {
        async move {
            for stmt in body {
                match self.exec_stmt(stmt).await? {
                    Flow::Normal => {}
                    flow => return Ok(flow),
                }
            }
            Ok(Flow::Normal)
        }
        .boxed_local()
    }

    async fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        self.runtime.set_line(stmt.line);
        if let Err(err) = self.runtime.tick() {
            return Err(self.runtime.with_traceback(err));
        }
        // Give a pending cancellation a chance to win against runaway loops.
        if self.runtime.steps() % YIELD_INTERVAL == 0 {
            tokio::task::yield_now().await;
        }
        let result = self.exec_stmt_kind(stmt).await;
        result.map_err(|err| self.runtime.with_traceback(err))
    }

    async fn exec_stmt_kind(&mut self, stmt: &Stmt) -> Result<Flow> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval_expr(expr).await?;
            }

            StmtKind::Assign { targets, value } => {
                let value = self.eval_expr(value).await?;
                for target in targets {
                    self.assign(target, value.clone()).await?;
                }
            }

            StmtKind::AugAssign { target, op, value } => {
                self.exec_aug_assign(target, *op, value).await?;
            }

            StmtKind::If { test, body, orelse } => {
                let branch = if self.eval_expr(test).await?.is_truthy() {
                    body
                } else {
                    orelse
                };
                return self.exec_block(branch).await;
            }

            StmtKind::While { test, body, orelse } => loop {
                self.runtime.set_line(stmt.line);
                if !self.eval_expr(test).await?.is_truthy() {
                    return self.exec_block(orelse).await;
                }
                match self.exec_block(body).await? {
                    Flow::Break => break,
                    Flow::Normal | Flow::Continue => {}
                    flow @ Flow::Return(_) => return Ok(flow),
                }
            },

            StmtKind::For {
                target,
                iter,
                body,
                orelse,
            } => {
                let iterable = self.eval_expr(iter).await?;
                let mut items = ValueIter::new(&iterable)?;
                loop {
                    self.runtime.set_line(stmt.line);
                    let Some(item) = items.next() else {
                        return self.exec_block(orelse).await;
                    };
                    self.assign(target, item).await?;
                    match self.exec_block(body).await? {
                        Flow::Break => break,
                        Flow::Normal | Flow::Continue => {}
                        flow @ Flow::Return(_) => return Ok(flow),
                    }
                }
            }

            StmtKind::FunctionDef(def) => {
                let mut defaults = Vec::new();
                for param in &def.params {
                    if let Some(default) = &param.default {
                        defaults.push(self.eval_expr(default).await?);
                    }
                }
                let function = Function {
                    def: def.clone(),
                    defaults,
                    closure: self.runtime.current_env(),
                };
                self.runtime
                    .assign(&def.name, Value::Function(Rc::new(function)));
            }

            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr).await?,
                    None => Value::None,
                };
                return Ok(Flow::Return(value));
            }

            StmtKind::Pass | StmtKind::Global(_) => {}
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),

            StmtKind::Raise(exc) => {
                let err = match exc {
                    Some(expr) => raise_value(self.eval_expr(expr).await?),
                    None => match self.runtime.current_handled() {
                        Some(raised) => Error::Exception(raised.clone()),
                        None => Error::runtime_error("No active exception to reraise"),
                    },
                };
                return Err(err);
            }

            StmtKind::Try {
                body,
                handlers,
                orelse,
                finalbody,
            } => return self.exec_try(body, handlers, orelse, finalbody).await,

            StmtKind::Assert { test, msg } => {
                if !self.eval_expr(test).await?.is_truthy() {
                    let args = match msg {
                        Some(msg) => vec![self.eval_expr(msg).await?],
                        None => Vec::new(),
                    };
                    return Err(Error::raise(ExceptionValue::new(
                        ExcClass::AssertionError,
                        args,
                    )));
                }
            }

            StmtKind::Import(names) => {
                let module = names.first().map_or("", |alias| alias.name.as_str());
                return Err(module_not_found(module));
            }
            StmtKind::ImportFrom { module, .. } => return Err(module_not_found(module)),
        }
        Ok(Flow::Normal)
    }

    async fn exec_try(
        &mut self,
        body: &[Stmt],
        handlers: &[ExceptHandler],
        orelse: &[Stmt],
        finalbody: &[Stmt],
    ) -> Result<Flow> {
        let outcome = match self.exec_block(body).await {
            Err(Error::Exception(raised)) => match self.find_handler(handlers, &raised).await {
                Ok(Some(handler)) => self.run_handler(handler, raised).await,
                Ok(None) => Err(Error::Exception(raised)),
                Err(err) => Err(err),
            },
            Ok(Flow::Normal) => self.exec_block(orelse).await,
            other => other,
        };

        // An abandoned session unwinds without running cleanup code.
        if finalbody.is_empty() || matches!(outcome, Err(Error::Abandoned)) {
            return outcome;
        }
        match self.exec_block(finalbody).await? {
            Flow::Normal => outcome,
            flow => Ok(flow),
        }
    }

    async fn find_handler<'h>(
        &mut self,
        handlers: &'h [ExceptHandler],
        raised: &Raised,
    ) -> Result<Option<&'h ExceptHandler>> {
        for handler in handlers {
            let Some(typ) = &handler.typ else {
                return Ok(Some(handler));
            };
            self.runtime.set_line(handler.line);
            let class = self.eval_expr(typ).await?;
            if exception_matches(raised.class(), &class)? {
                return Ok(Some(handler));
            }
        }
        Ok(None)
    }

    async fn run_handler(&mut self, handler: &ExceptHandler, raised: Raised) -> Result<Flow> {
        if let Some(name) = &handler.name {
            self.runtime
                .assign(name, Value::Exception(raised.exc.clone()));
        }
        self.runtime.push_handled(raised);
        let outcome = self.exec_block(&handler.body).await;
        self.runtime.pop_handled();
        if let Some(name) = &handler.name {
            self.runtime.unbind(name);
        }
        outcome
    }

    async fn exec_aug_assign(&mut self, target: &Expr, op: BinOp, value: &Expr) -> Result<()> {
        match target {
            Expr::Name(name) => {
                let current = self.runtime.lookup(name)?;
                let rhs = self.eval_expr(value).await?;
                let updated = augmented(op, current, &rhs)?;
                self.runtime.assign(name, updated);
                Ok(())
            }
            Expr::Subscript {
                value: container,
                index,
            } => {
                let container = self.eval_expr(container).await?;
                let index = self.eval_expr(index).await?;
                let current = ops::get_item(&container, &index)?;
                let rhs = self.eval_expr(value).await?;
                let updated = augmented(op, current, &rhs)?;
                ops::set_item(&container, &index, updated)
            }
            Expr::Attribute { value: object, attr } => {
                let object = self.eval_expr(object).await?;
                builtins::get_attr(&object, attr)?;
                Err(Error::attribute_error(&object, attr))
            }
            _ => Err(Error::type_error(
                "illegal expression for augmented assignment",
            )),
        }
    }

    /// Bind `value` to an assignment target.
    fn assign<'a>(&'a mut self, target: &'a Expr, value: Value) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            match target {
                Expr::Name(name) => {
                    self.runtime.assign(name, value);
                    Ok(())
                }
                Expr::Tuple(targets) | Expr::List(targets) => {
                    let items = unpack(&value, targets.len())?;
                    for (target, item) in targets.iter().zip(items) {
                        self.assign(target, item).await?;
                    }
                    Ok(())
                }
                Expr::Subscript {
                    value: container,
                    index,
                } => {
                    let container = self.eval_expr(container).await?;
                    if matches!(index.as_ref(), Expr::Slice { .. }) {
                        return Err(Error::type_error("slice assignment is not supported"));
                    }
                    let index = self.eval_expr(index).await?;
                    ops::set_item(&container, &index, value)
                }
                Expr::Attribute { value: object, attr } => {
                    let object = self.eval_expr(object).await?;
                    Err(Error::attribute_error(&object, attr))
                }
                _ => Err(Error::type_error("cannot assign to expression")),
            }
        }
        .boxed_local()
    }

    /// Evaluate an expression.
    pub fn eval_expr<'a>(&'a mut self, expr: &'a Expr) -> LocalBoxFuture<'a, Result<Value>> {
        async move {
            match expr {
                Expr::Name(name) => self.runtime.lookup(name),

                Expr::Constant(constant) => Ok(constant_value(constant)),

                Expr::FString(parts) => {
                    let mut out = String::new();
                    for part in parts {
                        match part {
                            FStringPart::Literal(text) => out.push_str(text),
                            FStringPart::Field {
                                value,
                                conversion,
                                format_spec,
                            } => {
                                let value = self.eval_expr(value).await?;
                                let value = match conversion {
                                    Some('r') | Some('a') => Value::from(value.repr()),
                                    Some(_) => Value::from(value.to_str()),
                                    None => value,
                                };
                                let spec = format_spec.as_deref().unwrap_or("");
                                out.push_str(&ops::format_value(&value, spec)?);
                            }
                        }
                    }
                    Ok(Value::from(out))
                }

                Expr::List(items) => Ok(Value::list(self.eval_all(items).await?)),
                Expr::Tuple(items) => Ok(Value::tuple(self.eval_all(items).await?)),

                Expr::Dict(entries) => {
                    let mut dict = Dict::new();
                    for (key, value) in entries {
                        let key = self.eval_expr(key).await?;
                        let value = self.eval_expr(value).await?;
                        ops::check_hashable(&key)?;
                        dict.insert(key, value);
                    }
                    Ok(Value::dict(dict))
                }

                Expr::BinOp { left, op, right } => {
                    let left = self.eval_expr(left).await?;
                    let right = self.eval_expr(right).await?;
                    ops::binary(*op, &left, &right)
                }

                Expr::UnaryOp { op, operand } => {
                    let operand = self.eval_expr(operand).await?;
                    ops::unary(*op, &operand)
                }

                Expr::BoolOp { op, values } => {
                    let mut result = Value::None;
                    for value in values {
                        result = self.eval_expr(value).await?;
                        let decided = match op {
                            BoolOp::And => !result.is_truthy(),
                            BoolOp::Or => result.is_truthy(),
                        };
                        if decided {
                            break;
                        }
                    }
                    Ok(result)
                }

                Expr::Compare {
                    left,
                    ops: operators,
                    comparators,
                } => {
                    let mut current = self.eval_expr(left).await?;
                    for (op, comparator) in operators.iter().zip(comparators) {
                        let next = self.eval_expr(comparator).await?;
                        if !ops::compare(*op, &current, &next)? {
                            return Ok(Value::Bool(false));
                        }
                        current = next;
                    }
                    Ok(Value::Bool(true))
                }

                Expr::Call {
                    func,
                    args,
                    keywords,
                } => {
                    let callee = self.eval_expr(func).await?;
                    let positional = self.eval_all(args).await?;
                    let mut named = Vec::with_capacity(keywords.len());
                    for keyword in keywords {
                        let value = self.eval_expr(&keyword.value).await?;
                        named.push((keyword.name.clone(), value));
                    }
                    self.call_value(callee, Args::new(positional, named)).await
                }

                Expr::Attribute { value, attr } => {
                    let value = self.eval_expr(value).await?;
                    builtins::get_attr(&value, attr)
                }

                Expr::Subscript { value, index } => {
                    let container = self.eval_expr(value).await?;
                    match index.as_ref() {
                        Expr::Slice { lower, upper, step } => {
                            let lower = self.eval_optional(lower.as_deref()).await?;
                            let upper = self.eval_optional(upper.as_deref()).await?;
                            let step = self.eval_optional(step.as_deref()).await?;
                            ops::get_slice(&container, lower.as_ref(), upper.as_ref(), step.as_ref())
                        }
                        index => {
                            let index = self.eval_expr(index).await?;
                            ops::get_item(&container, &index)
                        }
                    }
                }

                Expr::Slice { .. } => Err(Error::type_error(
                    "slices are only valid inside subscripts",
                )),

                Expr::IfExp { test, body, orelse } => {
                    if self.eval_expr(test).await?.is_truthy() {
                        self.eval_expr(body).await
                    } else {
                        self.eval_expr(orelse).await
                    }
                }

                Expr::Await(inner) => {
                    let value = self.eval_expr(inner).await?;
                    self.await_value(value).await
                }
            }
        }
        .boxed_local()
    }

    async fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval_expr(expr).await?);
        }
        Ok(values)
    }

    async fn eval_optional(&mut self, expr: Option<&Expr>) -> Result<Option<Value>> {
        match expr {
            Some(expr) => Ok(Some(self.eval_expr(expr).await?)),
            None => Ok(None),
        }
    }

    /// Suspend on an input request until the bridge answers.
    async fn await_value(&mut self, value: Value) -> Result<Value> {
        let request = match value {
            Value::Coroutine(request) => request,
            other => {
                return Err(Error::type_error(format!(
                    "object {} can't be used in 'await' expression",
                    other.type_name()
                )));
            }
        };
        if !request.begin_await() {
            return Err(Error::runtime_error(
                "cannot reuse already awaited coroutine",
            ));
        }

        debug!(prompt = ?request.prompt, "suspending for input");
        match self.bridge.request_input(request.prompt.as_deref()).await {
            Ok(line) => {
                debug!(len = line.len(), "input delivered");
                Ok(Value::from(line))
            }
            Err(InputError::Abandoned) => {
                warn!("input request abandoned by host");
                Err(Error::Abandoned)
            }
            Err(InputError::Eof) => Err(Error::exception(
                ExcClass::EOFError,
                "EOF when reading a line",
            )),
        }
    }

    /// Call any callable value.
    pub fn call_value<'a>(&'a mut self, callee: Value, args: Args) -> LocalBoxFuture<'a, Result<Value>> {
        async move {
            match callee {
                Value::Function(function) => self.call_function(function, args).await,
                Value::Builtin(builtin @ (Builtin::Sorted | Builtin::Min | Builtin::Max))
                    if has_key(&args) =>
                {
                    self.call_with_key(builtin, args).await
                }
                Value::Builtin(builtin) => {
                    let bridge = self.bridge;
                    builtins::call_builtin(builtin, args, &|text: &str| bridge.write_output(text))
                }
                Value::BoundMethod(method) if method.name == "sort" && has_key(&args) => {
                    self.sort_with_key(&method.receiver, args).await
                }
                Value::BoundMethod(method) => {
                    builtins::call_method(&method.receiver, &method.name, args)
                }
                Value::ExcClass(class) => {
                    args.no_keywords(class.name())?;
                    Ok(Value::Exception(Rc::new(ExceptionValue::new(
                        class,
                        args.positional,
                    ))))
                }
                Value::Type(name) => Err(Error::type_error(format!(
                    "cannot create '{}' instances",
                    name
                ))),
                other => Err(Error::type_error(format!(
                    "'{}' object is not callable",
                    other.type_name()
                ))),
            }
        }
        .boxed_local()
    }

    async fn call_function(&mut self, function: Rc<Function>, args: Args) -> Result<Value> {
        let env = Rc::new(Env::new(function.closure.clone()));
        bind_arguments(&function, args, &env)?;

        self.runtime.enter_call()?;
        let def = function.def.clone();
        self.runtime.push_frame(Frame::function(def.clone(), env));
        let result = self.exec_block(&def.body).await;
        self.runtime.pop_frame();
        self.runtime.exit_call();

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::None),
        }
    }

    /// `sorted`, `min` and `max` with a `key` function.
    async fn call_with_key(&mut self, builtin: Builtin, mut args: Args) -> Result<Value> {
        let key = args.take_keyword("key").unwrap_or(Value::None);
        if builtin == Builtin::Sorted {
            let reverse = args
                .take_keyword("reverse")
                .is_some_and(|reverse| reverse.is_truthy());
            args.finish("sorted")?;
            args.arity("sorted", 1, 1)?;
            let items = ops::iterate(&args.positional[0])?;
            let pairs = self.keyed(&key, items).await?;
            let sorted = ops::sort_keyed(pairs, reverse)?;
            return Ok(Value::list(sorted.into_iter().map(|(_, item)| item).collect()));
        }
        let (items, default) = builtins::extreme_candidates(builtin, &mut args)?;
        let pairs = self.keyed(&key, items).await?;
        builtins::pick_extreme(builtin, pairs, default)
    }

    async fn sort_with_key(&mut self, list: &Value, mut args: Args) -> Result<Value> {
        let key = args.take_keyword("key").unwrap_or(Value::None);
        let reverse = args
            .take_keyword("reverse")
            .is_some_and(|reverse| reverse.is_truthy());
        args.finish("sort")?;
        args.arity("list.sort", 0, 0)?;
        let items = ops::iterate(list)?;
        let pairs = self.keyed(&key, items).await?;
        builtins::sort_list_in_place(list, pairs, reverse)?;
        Ok(Value::None)
    }

    /// Pair every item with `key(item)`.
    async fn keyed(&mut self, key: &Value, items: Vec<Value>) -> Result<Vec<(Value, Value)>> {
        let mut pairs = Vec::with_capacity(items.len());
        for item in items {
            let k = self
                .call_value(key.clone(), Args::new(vec![item.clone()], Vec::new()))
                .await?;
            pairs.push((k, item));
        }
        Ok(pairs)
    }
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(n) => Value::Int(*n),
        Constant::Float(n) => Value::Float(*n),
        Constant::Str(s) => Value::str(s),
    }
}

fn has_key(args: &Args) -> bool {
    args.keywords
        .iter()
        .any(|(name, value)| name == "key" && !matches!(value, Value::None))
}

/// `target op= rhs`. Lists extend in place.
fn augmented(op: BinOp, current: Value, rhs: &Value) -> Result<Value> {
    if let (BinOp::Add, Value::List(items)) = (op, &current) {
        let extra = ops::iterate(rhs)?;
        items.borrow_mut().extend(extra);
        return Ok(current);
    }
    ops::binary(op, &current, rhs)
}

fn unpack(value: &Value, expected: usize) -> Result<Vec<Value>> {
    let items = ops::iterate(value).map_err(|_| {
        Error::type_error(format!(
            "cannot unpack non-iterable {} object",
            value.type_name()
        ))
    })?;
    if items.len() > expected {
        return Err(Error::value_error(format!(
            "too many values to unpack (expected {})",
            expected
        )));
    }
    if items.len() < expected {
        return Err(Error::value_error(format!(
            "not enough values to unpack (expected {}, got {})",
            expected,
            items.len()
        )));
    }
    Ok(items)
}

/// The error a `raise value` statement produces.
fn raise_value(value: Value) -> Error {
    match value {
        Value::ExcClass(class) => Error::raise(ExceptionValue::new(class, Vec::new())),
        Value::Exception(exc) => Error::Exception(Raised::new(exc)),
        _ => Error::type_error("exceptions must derive from BaseException"),
    }
}

/// Whether an `except` clause naming `handler` catches `class`.
fn exception_matches(class: ExcClass, handler: &Value) -> Result<bool> {
    match handler {
        Value::ExcClass(expected) => Ok(class.is_subclass_of(*expected)),
        Value::Tuple(options) => {
            for option in options.iter() {
                if exception_matches(class, option)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(Error::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn module_not_found(module: &str) -> Error {
    let top = module.split('.').next().unwrap_or(module);
    Error::exception(
        ExcClass::ModuleNotFoundError,
        format!("No module named '{}'", top),
    )
}

fn bind_arguments(function: &Function, args: Args, env: &Env) -> Result<()> {
    let def = &function.def;
    let params = &def.params;
    let required = params.len() - function.defaults.len();
    let plural = |n: usize| if n == 1 { "" } else { "s" };

    let given = args.positional.len();
    if given > params.len() {
        let takes = if function.defaults.is_empty() {
            format!("{} positional argument{}", params.len(), plural(params.len()))
        } else {
            format!("from {} to {} positional arguments", required, params.len())
        };
        return Err(Error::type_error(format!(
            "{}() takes {} but {} {} given",
            def.name,
            takes,
            given,
            if given == 1 { "was" } else { "were" }
        )));
    }

    let mut bound: Vec<Option<Value>> = vec![None; params.len()];
    for (slot, value) in bound.iter_mut().zip(args.positional) {
        *slot = Some(value);
    }
    for (name, value) in args.keywords {
        let Some(index) = params.iter().position(|param| param.name == name) else {
            return Err(Error::type_error(format!(
                "{}() got an unexpected keyword argument '{}'",
                def.name, name
            )));
        };
        if bound[index].is_some() {
            return Err(Error::type_error(format!(
                "{}() got multiple values for argument '{}'",
                def.name, name
            )));
        }
        bound[index] = Some(value);
    }

    let mut missing = Vec::new();
    for (index, (param, slot)) in params.iter().zip(bound).enumerate() {
        let value = match slot {
            Some(value) => value,
            None if index >= required => function.defaults[index - required].clone(),
            None => {
                missing.push(format!("'{}'", param.name));
                continue;
            }
        };
        env.set(&param.name, value);
    }
    if !missing.is_empty() {
        return Err(Error::type_error(format!(
            "{}() missing {} required positional argument{}: {}",
            def.name,
            missing.len(),
            plural(missing.len()),
            join_names(&missing)
        )));
    }
    Ok(())
}

/// `'a'`, `'a' and 'b'`, `'a', 'b', and 'c'`.
fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [one] => one.clone(),
        [first, second] => format!("{} and {}", first, second),
        [init @ .., last] => format!("{}, and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::diagnostics::ErrorRecord;
    use crate::runtime::Runtime;
    use crate::wrapper::wrap;

    #[derive(Default)]
    struct Scripted {
        inputs: RefCell<VecDeque<String>>,
        output: RefCell<String>,
    }

    impl Scripted {
        fn with_inputs(inputs: &[&str]) -> Self {
            Self {
                inputs: RefCell::new(inputs.iter().map(|s| s.to_string()).collect()),
                output: RefCell::default(),
            }
        }
    }

    impl RuntimeBridge for Scripted {
        async fn request_input(&self, prompt: Option<&str>) -> std::result::Result<String, InputError> {
            if let Some(prompt) = prompt {
                self.output.borrow_mut().push_str(prompt);
            }
            self.inputs.borrow_mut().pop_front().ok_or(InputError::Eof)
        }

        fn write_output(&self, text: &str) {
            self.output.borrow_mut().push_str(text);
        }

        fn report_error(&self, _record: &ErrorRecord) {}

        fn signal_completion(&self) {}
    }

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn run_with(bridge: &Scripted, source: &str) -> (Runtime, Result<()>) {
        let mut interp = Interpreter::new(bridge);
        let unit = wrap(sandpiper_parser::transform(source).unwrap());
        let result = block_on(unit.invoke(&mut interp));
        (interp.runtime, result)
    }

    /// Run a script and return what it printed.
    fn output(source: &str) -> String {
        let bridge = Scripted::default();
        let (_, result) = run_with(&bridge, source);
        assert!(result.is_ok(), "script failed: {:?}", result);
        bridge.output.into_inner()
    }

    fn error(source: &str) -> Raised {
        let bridge = Scripted::default();
        match run_with(&bridge, source).1 {
            Err(Error::Exception(raised)) => raised,
            other => panic!("Expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_print_and_arithmetic() {
        assert_eq!(output("print(1 + 2 * 3, 7 // 2, 7 / 2)"), "7 3 3.5\n");
    }

    #[test]
    fn test_input_round_trip() {
        let bridge = Scripted::with_inputs(&["Ada"]);
        let (_, result) = run_with(&bridge, "name = input('Name: ')\nprint('Hello, ' + name)");
        assert!(result.is_ok());
        assert_eq!(bridge.output.into_inner(), "Name: Hello, Ada\n");
    }

    #[test]
    fn test_input_inside_function() {
        let bridge = Scripted::with_inputs(&["3", "4"]);
        let source = "def ask():\n    return int(input())\nprint(ask() + ask())";
        let (_, result) = run_with(&bridge, source);
        assert!(result.is_ok());
        assert_eq!(bridge.output.into_inner(), "7\n");
    }

    #[test]
    fn test_input_eof_raises_eoferror() {
        let raised = error("x = input()");
        assert_eq!(raised.class(), ExcClass::EOFError);
        assert_eq!(raised.message(), "EOF when reading a line");
    }

    #[test]
    fn test_aliased_input_is_not_suspended() {
        let out = output("read = input\nprint(type(read('x')).__name__)");
        assert_eq!(out, "coroutine\n");
    }

    #[test]
    fn test_while_else_and_break() {
        let source = "i = 0\nwhile i < 5:\n    i += 1\n    if i == 3:\n        break\nelse:\n    print('done')\nprint(i)";
        assert_eq!(output(source), "3\n");
    }

    #[test]
    fn test_for_else_runs_without_break() {
        assert_eq!(output("for i in range(2):\n    pass\nelse:\n    print('done')"), "done\n");
    }

    #[test]
    fn test_tuple_unpacking() {
        assert_eq!(output("a, b = 1, 2\na, b = b, a\nprint(a, b)"), "2 1\n");
        let raised = error("a, b = [1, 2, 3]");
        assert_eq!(raised.message(), "too many values to unpack (expected 2)");
        let raised = error("a, b, c = [1, 2]");
        assert_eq!(raised.message(), "not enough values to unpack (expected 3, got 2)");
    }

    #[test]
    fn test_closures_see_enclosing_scope() {
        let source = "def outer():\n    x = 10\n    def inner():\n        return x + 1\n    return inner()\nprint(outer())";
        assert_eq!(output(source), "11\n");
    }

    #[test]
    fn test_global_declaration() {
        let source = "count = 0\ndef bump():\n    global count\n    count += 1\nbump()\nbump()\nprint(count)";
        assert_eq!(output(source), "2\n");
    }

    #[test]
    fn test_unbound_local() {
        let raised = error("x = 1\ndef f():\n    print(x)\n    x = 2\nf()");
        assert_eq!(raised.class(), ExcClass::UnboundLocalError);
    }

    #[test]
    fn test_default_and_keyword_arguments() {
        let source = "def greet(name, greeting='Hello'):\n    return greeting + ', ' + name\nprint(greet('Ada'))\nprint(greet(greeting='Hi', name='Bob'))";
        assert_eq!(output(source), "Hello, Ada\nHi, Bob\n");
    }

    #[test]
    fn test_argument_errors() {
        let raised = error("def f(a, b):\n    pass\nf(1)");
        assert_eq!(raised.message(), "f() missing 1 required positional argument: 'b'");
        let raised = error("def f(a):\n    pass\nf(1, 2)");
        assert_eq!(raised.message(), "f() takes 1 positional argument but 2 were given");
        let raised = error("def f(a):\n    pass\nf(b=1)");
        assert_eq!(raised.message(), "f() got an unexpected keyword argument 'b'");
    }

    #[test]
    fn test_try_except_else_finally() {
        let source = "try:\n    1 / 0\nexcept ZeroDivisionError as e:\n    print('caught', e)\nelse:\n    print('else')\nfinally:\n    print('finally')";
        assert_eq!(output(source), "caught division by zero\nfinally\n");
        let source = "try:\n    pass\nexcept ValueError:\n    print('no')\nelse:\n    print('else')";
        assert_eq!(output(source), "else\n");
    }

    #[test]
    fn test_except_name_is_unbound_after_handler() {
        let raised = error("try:\n    raise ValueError('x')\nexcept ValueError as e:\n    pass\nprint(e)");
        assert_eq!(raised.class(), ExcClass::NameError);
    }

    #[test]
    fn test_except_tuple_and_hierarchy() {
        let source = "try:\n    [][1]\nexcept (KeyError, LookupError):\n    print('lookup')";
        assert_eq!(output(source), "lookup\n");
    }

    #[test]
    fn test_bare_raise_reraises() {
        let raised = error("try:\n    raise KeyError('k')\nexcept KeyError:\n    raise");
        assert_eq!(raised.class(), ExcClass::KeyError);
        let raised = error("raise");
        assert_eq!(raised.message(), "No active exception to reraise");
    }

    #[test]
    fn test_return_in_finally_overrides() {
        let source = "def f():\n    try:\n        raise ValueError('x')\n    finally:\n        return 'ok'\nprint(f())";
        assert_eq!(output(source), "ok\n");
    }

    #[test]
    fn test_raise_non_exception() {
        let raised = error("raise 5");
        assert_eq!(raised.message(), "exceptions must derive from BaseException");
    }

    #[test]
    fn test_assert() {
        let raised = error("assert 1 == 2, 'math'");
        assert_eq!(raised.class(), ExcClass::AssertionError);
        assert_eq!(raised.message(), "math");
    }

    #[test]
    fn test_import_is_rejected() {
        let raised = error("import os.path");
        assert_eq!(raised.class(), ExcClass::ModuleNotFoundError);
        assert_eq!(raised.message(), "No module named 'os'");
    }

    #[test]
    fn test_sorted_with_key() {
        let source = "words = ['ccc', 'a', 'bb']\nprint(sorted(words, key=len))\nprint(max(words, key=len))\nwords.sort(key=len, reverse=True)\nprint(words)";
        assert_eq!(output(source), "['a', 'bb', 'ccc']\nccc\n['ccc', 'bb', 'a']\n");
    }

    #[test]
    fn test_fstring_and_format_spec() {
        assert_eq!(output("x = 3.14159\nn = 'a'\nprint(f'{x:.2f} {x!r} {n:>3}')"), "3.14 3.14159   a\n");
    }

    #[test]
    fn test_chained_comparison_and_boolops() {
        assert_eq!(output("print(1 < 2 < 3, 1 < 3 < 2, 0 or 'x', 1 and 0)"), "True False x 0\n");
    }

    #[test]
    fn test_augmented_list_extends_in_place() {
        assert_eq!(output("a = [1]\nb = a\na += [2]\nprint(b)"), "[1, 2]\n");
        assert_eq!(output("d = {'k': 1}\nd['k'] += 5\nprint(d)"), "{'k': 6}\n");
    }

    #[test]
    fn test_calling_non_callable() {
        let raised = error("x = 5\nx()");
        assert_eq!(raised.message(), "'int' object is not callable");
    }

    #[test]
    fn test_traceback_records_lines() {
        let raised = error("def f():\n    raise ValueError('x')\nf()");
        let lines: Vec<_> = raised.traceback.iter().map(|f| (f.name.as_str(), f.line)).collect();
        assert_eq!(
            lines,
            vec![
                ("<dispatch>", 0),
                ("__sandpiper_main__", 0),
                ("<module>", 3),
                ("f", 2)
            ]
        );
    }

    #[test]
    fn test_join_names() {
        let names = |v: &[&str]| v.iter().map(|s| format!("'{}'", s)).collect::<Vec<_>>();
        assert_eq!(join_names(&names(&["a"])), "'a'");
        assert_eq!(join_names(&names(&["a", "b"])), "'a' and 'b'");
        assert_eq!(join_names(&names(&["a", "b", "c"])), "'a', 'b', and 'c'");
    }
}
