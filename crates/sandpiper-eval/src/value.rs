//! Runtime values for the Sandpiper interpreter.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use sandpiper_parser::ast::FunctionDef;

use crate::builtins::Builtin;
use crate::runtime::Env;

/// A runtime value.
///
/// Mutable containers are shared through `Rc<RefCell<..>>`, so values are
/// cheap to clone and aliasing behaves like Python's reference semantics.
#[derive(Debug, Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    Dict(Rc<RefCell<Dict>>),
    Range(Range),
    Function(Rc<Function>),
    Builtin(Builtin),
    /// A method looked up on a receiver, e.g. `items.append`.
    BoundMethod(Rc<BoundMethod>),
    ExcClass(ExcClass),
    Exception(Rc<ExceptionValue>),
    /// The pending result of an `input(...)` call.
    Coroutine(Rc<InputRequest>),
    /// Type object of a value that has no constructor (`type(None)`, ...).
    Type(&'static str),
}

impl Value {
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Rc::from(s.as_ref()))
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(items))
    }

    pub fn dict(dict: Dict) -> Self {
        Value::Dict(Rc::new(RefCell::new(dict)))
    }

    /// The Python type name, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Range(_) => "range",
            Value::Function(_) => "function",
            Value::Builtin(b) if b.is_type() => "type",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::BoundMethod(_) => "builtin_function_or_method",
            Value::ExcClass(_) | Value::Type(_) => "type",
            Value::Exception(exc) => exc.class.name(),
            Value::Coroutine(_) => "coroutine",
        }
    }

    /// Python truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(items) => !items.is_empty(),
            Value::Dict(dict) => !dict.borrow().is_empty(),
            Value::Range(range) => range.len() > 0,
            _ => true,
        }
    }

    /// `str(value)`
    pub fn to_str(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Exception(exc) => exc.message(),
            _ => self.repr(),
        }
    }

    /// `repr(value)`
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_repr(&mut out, &mut Vec::new());
        out
    }

    fn write_repr(&self, out: &mut String, seen: &mut Vec<*const ()>) {
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(n) => out.push_str(&n.to_string()),
            Value::Float(n) => out.push_str(&format_float(*n)),
            Value::Str(s) => out.push_str(&repr_str(s)),
            Value::List(items) => {
                let ptr = Rc::as_ptr(items) as *const ();
                if seen.contains(&ptr) {
                    out.push_str("[...]");
                    return;
                }
                seen.push(ptr);
                out.push('[');
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, seen);
                }
                out.push(']');
                seen.pop();
            }
            Value::Tuple(items) => {
                out.push('(');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out, seen);
                }
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(dict) => {
                let ptr = Rc::as_ptr(dict) as *const ();
                if seen.contains(&ptr) {
                    out.push_str("{...}");
                    return;
                }
                seen.push(ptr);
                out.push('{');
                for (i, (key, value)) in dict.borrow().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    key.write_repr(out, seen);
                    out.push_str(": ");
                    value.write_repr(out, seen);
                }
                out.push('}');
                seen.pop();
            }
            Value::Range(range) => {
                if range.step == 1 {
                    out.push_str(&format!("range({}, {})", range.start, range.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", range.start, range.stop, range.step));
                }
            }
            Value::Function(func) => {
                out.push_str(&format!("<function {} at {:p}>", func.def.name, Rc::as_ptr(func)));
            }
            Value::Builtin(b) if b.is_type() => out.push_str(&format!("<class '{}'>", b.name())),
            Value::Builtin(b) => out.push_str(&format!("<built-in function {}>", b.name())),
            Value::BoundMethod(method) => out.push_str(&format!(
                "<built-in method {} of {} object>",
                method.name,
                method.receiver.type_name()
            )),
            Value::ExcClass(class) => out.push_str(&format!("<class '{}'>", class.name())),
            Value::Exception(exc) => {
                out.push_str(exc.class.name());
                out.push('(');
                for (i, arg) in exc.args.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    arg.write_repr(out, seen);
                }
                out.push(')');
            }
            Value::Coroutine(request) => {
                out.push_str(&format!("<coroutine object input at {:p}>", Rc::as_ptr(request)));
            }
            Value::Type(name) => out.push_str(&format!("<class '{}'>", name)),
        }
    }

    /// Identity comparison (`is`).
    pub fn is(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            (Value::ExcClass(a), Value::ExcClass(b)) => a == b,
            (Value::Exception(a), Value::Exception(b)) => Rc::ptr_eq(a, b),
            (Value::Coroutine(a), Value::Coroutine(b)) => Rc::ptr_eq(a, b),
            (Value::Type(a), Value::Type(b)) => a == b,
            _ => false,
        }
    }

    /// Whether the value can be used as a dict key.
    pub fn is_hashable(&self) -> bool {
        match self {
            Value::List(_) | Value::Dict(_) => false,
            Value::Tuple(items) => items.iter().all(Value::is_hashable),
            _ => true,
        }
    }
}

impl PartialEq for Value {
    /// Python `==`.
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(_) | Value::Int(_), Value::Bool(_) | Value::Int(_)) => {
                self.as_int() == other.as_int()
            }
            (Value::Int(_) | Value::Bool(_) | Value::Float(_), Value::Int(_) | Value::Bool(_) | Value::Float(_)) => {
                self.as_float() == other.as_float()
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => {
                if Rc::ptr_eq(a, b) {
                    return true;
                }
                let (a, b) = (a.borrow(), b.borrow());
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).is_some_and(|other| *other == *v))
            }
            (Value::Range(a), Value::Range(b)) => a == b,
            _ => self.is(other),
        }
    }
}

impl Value {
    /// Integer view of `bool` / `int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Float view of any numeric value.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(*b as i64 as f64),
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_str())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::None
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Format a float the way Python's `repr` does.
pub fn format_float(n: f64) -> String {
    if n.is_nan() {
        return "nan".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n == 0.0 {
        return if n.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    // Shortest round-trip digits, in scientific form.
    let sci = format!("{:e}", n);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if !(-4..16).contains(&exponent) {
        let sign = if exponent < 0 { '-' } else { '+' };
        return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
    }

    let plain = format!("{}", n);
    if plain.contains('.') {
        plain
    } else {
        format!("{}.0", plain)
    }
}

/// Quote a string the way Python's `repr` does.
pub fn repr_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\x{:02x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

/// Insertion-ordered dictionary.
///
/// Keys are compared with Python equality; scripts are small enough that a
/// linear scan is fine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dict {
    entries: Vec<(Value, Value)>,
}

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace; a replaced key keeps its position.
    pub fn insert(&mut self, key: Value, value: Value) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &Value) -> Option<Value> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Value, Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> Vec<Value> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.entries.iter().map(|(_, v)| v.clone()).collect()
    }
}

/// `range(start, stop, step)`; `step` is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl Range {
    pub fn len(&self) -> usize {
        let (start, stop, step) = (self.start as i128, self.stop as i128, self.step as i128);
        let len = if step > 0 && start < stop {
            (stop - start + step - 1) / step
        } else if step < 0 && start > stop {
            (start - stop - step - 1) / -step
        } else {
            0
        };
        len as usize
    }

    pub fn get(&self, index: usize) -> Option<i64> {
        if index >= self.len() {
            return None;
        }
        Some(self.start + self.step * index as i64)
    }

    pub fn contains(&self, n: i64) -> bool {
        let in_bounds = if self.step > 0 {
            self.start <= n && n < self.stop
        } else {
            self.stop < n && n <= self.start
        };
        in_bounds && (n - self.start) % self.step == 0
    }
}

/// A user-defined function.
#[derive(Debug)]
pub struct Function {
    pub def: Rc<FunctionDef>,
    /// Evaluated defaults, aligned with the trailing parameters.
    pub defaults: Vec<Value>,
    /// Scope of the enclosing function, if the function is nested.
    pub closure: Option<Rc<Env>>,
}

#[derive(Debug)]
pub struct BoundMethod {
    pub receiver: Value,
    pub name: String,
}

/// The pending value of one `input(...)` call.
#[derive(Debug)]
pub struct InputRequest {
    pub prompt: Option<String>,
    awaited: Cell<bool>,
}

impl InputRequest {
    pub fn new(prompt: Option<String>) -> Self {
        Self {
            prompt,
            awaited: Cell::new(false),
        }
    }

    /// Mark the request as awaited. Returns `false` if it already was.
    pub fn begin_await(&self) -> bool {
        !self.awaited.replace(true)
    }
}

/// Builtin exception classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcClass {
    BaseException,
    Exception,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    LookupError,
    IndexError,
    KeyError,
    NameError,
    UnboundLocalError,
    RuntimeError,
    RecursionError,
    NotImplementedError,
    ImportError,
    ModuleNotFoundError,
    AssertionError,
    AttributeError,
    EOFError,
    StopIteration,
    TypeError,
    ValueError,
    /// Raised when a session exceeds its statement budget.
    ExecutionLimitError,
}

impl ExcClass {
    pub const ALL: [ExcClass; 22] = [
        ExcClass::BaseException,
        ExcClass::Exception,
        ExcClass::ArithmeticError,
        ExcClass::ZeroDivisionError,
        ExcClass::OverflowError,
        ExcClass::LookupError,
        ExcClass::IndexError,
        ExcClass::KeyError,
        ExcClass::NameError,
        ExcClass::UnboundLocalError,
        ExcClass::RuntimeError,
        ExcClass::RecursionError,
        ExcClass::NotImplementedError,
        ExcClass::ImportError,
        ExcClass::ModuleNotFoundError,
        ExcClass::AssertionError,
        ExcClass::AttributeError,
        ExcClass::EOFError,
        ExcClass::StopIteration,
        ExcClass::TypeError,
        ExcClass::ValueError,
        ExcClass::ExecutionLimitError,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ExcClass::BaseException => "BaseException",
            ExcClass::Exception => "Exception",
            ExcClass::ArithmeticError => "ArithmeticError",
            ExcClass::ZeroDivisionError => "ZeroDivisionError",
            ExcClass::OverflowError => "OverflowError",
            ExcClass::LookupError => "LookupError",
            ExcClass::IndexError => "IndexError",
            ExcClass::KeyError => "KeyError",
            ExcClass::NameError => "NameError",
            ExcClass::UnboundLocalError => "UnboundLocalError",
            ExcClass::RuntimeError => "RuntimeError",
            ExcClass::RecursionError => "RecursionError",
            ExcClass::NotImplementedError => "NotImplementedError",
            ExcClass::ImportError => "ImportError",
            ExcClass::ModuleNotFoundError => "ModuleNotFoundError",
            ExcClass::AssertionError => "AssertionError",
            ExcClass::AttributeError => "AttributeError",
            ExcClass::EOFError => "EOFError",
            ExcClass::StopIteration => "StopIteration",
            ExcClass::TypeError => "TypeError",
            ExcClass::ValueError => "ValueError",
            ExcClass::ExecutionLimitError => "ExecutionLimitError",
        }
    }

    pub fn from_name(name: &str) -> Option<ExcClass> {
        Self::ALL.into_iter().find(|class| class.name() == name)
    }

    pub fn parent(self) -> Option<ExcClass> {
        use ExcClass::*;
        match self {
            BaseException => None,
            Exception | ExecutionLimitError => Some(BaseException),
            ArithmeticError | LookupError | NameError | RuntimeError | ImportError
            | AssertionError | AttributeError | EOFError | StopIteration | TypeError
            | ValueError => Some(Exception),
            ZeroDivisionError | OverflowError => Some(ArithmeticError),
            IndexError | KeyError => Some(LookupError),
            UnboundLocalError => Some(NameError),
            RecursionError | NotImplementedError => Some(RuntimeError),
            ModuleNotFoundError => Some(ImportError),
        }
    }

    /// Whether `self` is `other` or derives from it.
    pub fn is_subclass_of(self, other: ExcClass) -> bool {
        let mut current = Some(self);
        while let Some(class) = current {
            if class == other {
                return true;
            }
            current = class.parent();
        }
        false
    }
}

/// An exception instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionValue {
    pub class: ExcClass,
    pub args: Vec<Value>,
}

impl ExceptionValue {
    pub fn new(class: ExcClass, args: Vec<Value>) -> Self {
        Self { class, args }
    }

    /// `str(exception)`
    pub fn message(&self) -> String {
        match self.args.as_slice() {
            [] => String::new(),
            [arg] if self.class == ExcClass::KeyError => arg.repr(),
            [arg] => arg.to_str(),
            args => Value::tuple(args.to_vec()).repr(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_repr_matches_python() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e-5), "1.5e-05");
        assert_eq!(format_float(123456.789), "123456.789");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn test_str_repr_quotes() {
        assert_eq!(repr_str("hi"), "'hi'");
        assert_eq!(repr_str("it's"), "\"it's\"");
        assert_eq!(repr_str("a\nb"), "'a\\nb'");
    }

    #[test]
    fn test_container_repr() {
        let value = Value::list(vec![
            Value::Int(1),
            Value::str("a"),
            Value::tuple(vec![Value::None]),
            Value::Float(2.0),
        ]);
        assert_eq!(value.repr(), "[1, 'a', (None,), 2.0]");
        assert_eq!(value.to_str(), value.repr());
    }

    #[test]
    fn test_self_referencing_list_repr() {
        let list = Value::list(vec![Value::Int(1)]);
        if let Value::List(items) = &list {
            items.borrow_mut().push(list.clone());
        }
        assert_eq!(list.repr(), "[1, [...]]");
    }

    #[test]
    fn test_numeric_equality_crosses_types() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Bool(true), Value::Int(1));
        assert_ne!(Value::str("1"), Value::Int(1));
    }

    #[test]
    fn test_dict_keeps_insertion_order() {
        let mut dict = Dict::new();
        dict.insert(Value::str("b"), Value::Int(1));
        dict.insert(Value::str("a"), Value::Int(2));
        dict.insert(Value::str("b"), Value::Int(3));
        assert_eq!(Value::dict(dict).repr(), "{'b': 3, 'a': 2}");
    }

    #[test]
    fn test_range_len_and_contains() {
        let range = Range { start: 0, stop: 10, step: 3 };
        assert_eq!(range.len(), 4);
        assert!(range.contains(9));
        assert!(!range.contains(10));
        let down = Range { start: 5, stop: 0, step: -2 };
        assert_eq!(down.len(), 3);
        assert_eq!(down.get(2), Some(1));
    }

    #[test]
    fn test_exception_hierarchy() {
        assert!(ExcClass::ZeroDivisionError.is_subclass_of(ExcClass::Exception));
        assert!(ExcClass::ModuleNotFoundError.is_subclass_of(ExcClass::ImportError));
        assert!(!ExcClass::ExecutionLimitError.is_subclass_of(ExcClass::Exception));
        assert!(ExcClass::ExecutionLimitError.is_subclass_of(ExcClass::BaseException));
    }

    #[test]
    fn test_exception_message() {
        let exc = ExceptionValue::new(ExcClass::KeyError, vec![Value::str("k")]);
        assert_eq!(exc.message(), "'k'");
        let exc = ExceptionValue::new(ExcClass::ValueError, vec![Value::str("x")]);
        assert_eq!(exc.message(), "x");
        let exc = ExceptionValue::new(ExcClass::ValueError, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(exc.message(), "(1, 2)");
    }

    #[test]
    fn test_input_request_awaits_once() {
        let request = InputRequest::new(None);
        assert!(request.begin_await());
        assert!(!request.begin_await());
    }
}
