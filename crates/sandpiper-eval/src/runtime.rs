//! Runtime environment: namespaces, the call stack and resource limits.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use sandpiper_parser::ast::FunctionDef;

use crate::builtins::Builtin;
use crate::error::{Error, Raised, TraceFrame};
use crate::value::{ExcClass, Value};
use crate::Result;

/// Default maximum depth of nested user function calls.
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Upper bound accepted for the recursion limit. Every call level nests
/// several futures, so very deep recursion would exhaust the native stack.
pub const MAX_RECURSION_LIMIT: usize = 500;

/// A function's local namespace.
///
/// `parent` is the namespace of the enclosing function, which is how nested
/// functions read variables of the function they were defined in.
#[derive(Debug, Default)]
pub struct Env {
    vars: RefCell<HashMap<String, Value>>,
    parent: Option<Rc<Env>>,
}

impl Env {
    pub fn new(parent: Option<Rc<Env>>) -> Self {
        Self {
            vars: RefCell::new(HashMap::new()),
            parent,
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn remove(&self, name: &str) -> Option<Value> {
        self.vars.borrow_mut().remove(name)
    }

    pub fn parent(&self) -> Option<&Rc<Env>> {
        self.parent.as_ref()
    }
}

/// One activation on the call stack.
#[derive(Debug)]
pub struct Frame {
    pub name: String,
    /// Line of the statement currently executing in this frame.
    pub line: usize,
    /// Local namespace; `None` for frames that run against the globals.
    pub env: Option<Rc<Env>>,
    pub def: Option<Rc<FunctionDef>>,
}

impl Frame {
    /// A frame that executes against the module namespace.
    pub fn module_level(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            line: 0,
            env: None,
            def: None,
        }
    }

    pub fn function(def: Rc<FunctionDef>, env: Rc<Env>) -> Self {
        Self {
            name: def.name.clone(),
            line: def.line,
            env: Some(env),
            def: Some(def),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub recursion_limit: usize,
    /// Maximum number of executed statements, if any.
    pub step_limit: Option<u64>,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            step_limit: None,
        }
    }
}

/// Execution context of one session.
#[derive(Debug, Default)]
pub struct Runtime {
    globals: HashMap<String, Value>,
    frames: Vec<Frame>,
    /// Exceptions currently being handled, innermost last.
    handled: Vec<Raised>,
    /// Nesting depth of user function calls.
    depth: usize,
    steps: u64,
    limits: Limits,
}

impl Runtime {
    /// A fresh namespace for one session.
    pub fn seeded() -> Self {
        let mut runtime = Self::default();
        runtime.globals.insert("__name__".to_string(), Value::str("__main__"));
        runtime
            .globals
            .insert(Builtin::Input.name().to_string(), Value::Builtin(Builtin::Input));
        runtime
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn limits(&self) -> Limits {
        self.limits
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn global(&self, name: &str) -> Option<&Value> {
        self.globals.get(name)
    }

    /// Resolve a name as seen from the current frame.
    pub fn lookup(&self, name: &str) -> Result<Value> {
        let current = self.frames.last().and_then(|frame| Some((frame, frame.def.as_ref()?)));
        if let Some((frame, def)) = current {
            if def.scope.globals.contains(name) {
                return self.lookup_global(name);
            }
            if def.scope.is_local(name) {
                return frame.env.as_ref().and_then(|env| env.get(name)).ok_or_else(|| {
                    Error::exception(
                        ExcClass::UnboundLocalError,
                        format!("cannot access local variable '{}' where it is not associated with a value", name),
                    )
                });
            }
            let mut env = frame.env.as_ref().and_then(|env| env.parent());
            while let Some(scope) = env {
                if let Some(value) = scope.get(name) {
                    return Ok(value);
                }
                env = scope.parent();
            }
        }
        self.lookup_global(name)
    }

    fn lookup_global(&self, name: &str) -> Result<Value> {
        if let Some(value) = self.globals.get(name) {
            return Ok(value.clone());
        }
        if let Some(builtin) = Builtin::from_name(name) {
            return Ok(Value::Builtin(builtin));
        }
        if let Some(class) = ExcClass::from_name(name) {
            return Ok(Value::ExcClass(class));
        }
        Err(Error::name_error(name))
    }

    /// Bind a name in the current frame's scope.
    pub fn assign(&mut self, name: &str, value: Value) {
        match self.local_env(name) {
            Some(env) => env.set(name, value),
            None => {
                self.globals.insert(name.to_string(), value);
            }
        }
    }

    /// Remove a binding, as Python does for `except ... as name` targets.
    pub fn unbind(&mut self, name: &str) {
        match self.local_env(name) {
            Some(env) => {
                env.remove(name);
            }
            None => {
                self.globals.remove(name);
            }
        }
    }

    /// The namespace `name` binds into, or `None` for the globals.
    fn local_env(&self, name: &str) -> Option<Rc<Env>> {
        let frame = self.frames.last()?;
        let def = frame.def.as_ref()?;
        if def.scope.globals.contains(name) {
            return None;
        }
        frame.env.clone()
    }

    /// Namespace of the current frame, captured by functions defined in it.
    pub fn current_env(&self) -> Option<Rc<Env>> {
        self.frames.last().and_then(|frame| frame.env.clone())
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn set_line(&mut self, line: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
    }

    /// Enter a user function call, failing once the recursion limit is hit.
    pub fn enter_call(&mut self) -> Result<()> {
        if self.depth >= self.limits.recursion_limit {
            return Err(Error::exception(
                ExcClass::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit_call(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Count one executed statement against the step limit.
    pub fn tick(&mut self) -> Result<()> {
        self.steps += 1;
        match self.limits.step_limit {
            Some(limit) if self.steps > limit => Err(Error::exception(
                ExcClass::ExecutionLimitError,
                format!("step limit of {} statements exceeded", limit),
            )),
            _ => Ok(()),
        }
    }

    /// The current call stack, outermost first.
    pub fn snapshot(&self) -> Vec<TraceFrame> {
        self.frames
            .iter()
            .map(|frame| TraceFrame {
                name: frame.name.clone(),
                line: frame.line,
            })
            .collect()
    }

    /// Attach the current stack to an exception that does not have one yet.
    pub fn with_traceback(&self, err: Error) -> Error {
        match err {
            Error::Exception(mut raised) if raised.traceback.is_empty() => {
                raised.traceback = self.snapshot();
                Error::Exception(raised)
            }
            other => other,
        }
    }

    pub fn push_handled(&mut self, raised: Raised) {
        self.handled.push(raised);
    }

    pub fn pop_handled(&mut self) {
        self.handled.pop();
    }

    /// The exception a bare `raise` re-raises.
    pub fn current_handled(&self) -> Option<&Raised> {
        self.handled.last()
    }
}
