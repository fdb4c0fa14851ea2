//! Builtin functions and methods.
//!
//! Builtins that need to call back into script code (`sorted`, `min` and
//! `max` with a `key`, `list.sort` with a `key`) are finished by the
//! evaluator; everything else is handled here synchronously.

use std::rc::Rc;

use sandpiper_parser::ast::BinOp;

use crate::error::Error;
use crate::ops::{self, iterate};
use crate::value::{BoundMethod, Dict, ExcClass, InputRequest, Range, Value};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Print,
    Input,
    Len,
    Str,
    Repr,
    Int,
    Float,
    Bool,
    List,
    Tuple,
    Dict,
    Range,
    Abs,
    Min,
    Max,
    Sum,
    Round,
    Sorted,
    Reversed,
    Enumerate,
    Zip,
    Isinstance,
    Type,
    Ord,
    Chr,
}

impl Builtin {
    pub const ALL: [Builtin; 25] = [
        Builtin::Print,
        Builtin::Input,
        Builtin::Len,
        Builtin::Str,
        Builtin::Repr,
        Builtin::Int,
        Builtin::Float,
        Builtin::Bool,
        Builtin::List,
        Builtin::Tuple,
        Builtin::Dict,
        Builtin::Range,
        Builtin::Abs,
        Builtin::Min,
        Builtin::Max,
        Builtin::Sum,
        Builtin::Round,
        Builtin::Sorted,
        Builtin::Reversed,
        Builtin::Enumerate,
        Builtin::Zip,
        Builtin::Isinstance,
        Builtin::Type,
        Builtin::Ord,
        Builtin::Chr,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Print => "print",
            Builtin::Input => "input",
            Builtin::Len => "len",
            Builtin::Str => "str",
            Builtin::Repr => "repr",
            Builtin::Int => "int",
            Builtin::Float => "float",
            Builtin::Bool => "bool",
            Builtin::List => "list",
            Builtin::Tuple => "tuple",
            Builtin::Dict => "dict",
            Builtin::Range => "range",
            Builtin::Abs => "abs",
            Builtin::Min => "min",
            Builtin::Max => "max",
            Builtin::Sum => "sum",
            Builtin::Round => "round",
            Builtin::Sorted => "sorted",
            Builtin::Reversed => "reversed",
            Builtin::Enumerate => "enumerate",
            Builtin::Zip => "zip",
            Builtin::Isinstance => "isinstance",
            Builtin::Type => "type",
            Builtin::Ord => "ord",
            Builtin::Chr => "chr",
        }
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    /// Whether this builtin is a type object (`int`, `list`, ...).
    pub fn is_type(self) -> bool {
        matches!(
            self,
            Builtin::Str
                | Builtin::Int
                | Builtin::Float
                | Builtin::Bool
                | Builtin::List
                | Builtin::Tuple
                | Builtin::Dict
                | Builtin::Range
        )
    }
}

/// Evaluated call arguments.
#[derive(Debug, Default)]
pub struct Args {
    pub positional: Vec<Value>,
    pub keywords: Vec<(String, Value)>,
}

impl Args {
    pub fn new(positional: Vec<Value>, keywords: Vec<(String, Value)>) -> Self {
        Self { positional, keywords }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    /// Remove a keyword argument. `None` values count as absent.
    pub fn take_keyword(&mut self, name: &str) -> Option<Value> {
        let index = self.keywords.iter().position(|(key, _)| key == name)?;
        match self.keywords.remove(index).1 {
            Value::None => None,
            value => Some(value),
        }
    }

    /// Fail on keyword arguments nobody consumed.
    pub fn finish(&self, func: &str) -> Result<()> {
        match self.keywords.first() {
            Some((key, _)) => Err(Error::type_error(format!(
                "'{}' is an invalid keyword argument for {}()",
                key, func
            ))),
            None => Ok(()),
        }
    }

    pub fn no_keywords(&self, func: &str) -> Result<()> {
        if self.keywords.is_empty() {
            Ok(())
        } else {
            Err(Error::type_error(format!("{}() takes no keyword arguments", func)))
        }
    }

    /// Check the number of positional arguments.
    pub fn arity(&self, func: &str, min: usize, max: usize) -> Result<()> {
        let n = self.positional.len();
        let plural = |k: usize| if k == 1 { "" } else { "s" };
        let message = if n >= min && n <= max {
            return Ok(());
        } else if min == max && max == 0 {
            format!("{}() takes no arguments ({} given)", func, n)
        } else if min == max && max == 1 {
            format!("{}() takes exactly one argument ({} given)", func, n)
        } else if min == max {
            format!("{}() takes exactly {} arguments ({} given)", func, max, n)
        } else if n < min {
            format!("{} expected at least {} argument{}, got {}", func, min, plural(min), n)
        } else {
            format!("{} expected at most {} argument{}, got {}", func, max, plural(max), n)
        };
        Err(Error::type_error(message))
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.positional.get(index)
    }
}

fn expect_int(value: &Value) -> Result<i64> {
    value.as_int().ok_or_else(|| {
        Error::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            value.type_name()
        ))
    })
}

fn expect_str<'v>(value: &'v Value, context: &str) -> Result<&'v str> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(Error::type_error(format!(
            "{} must be str, not {}",
            context,
            other.type_name()
        ))),
    }
}

/// Call a builtin. `output` receives text written by `print`.
pub fn call_builtin(builtin: Builtin, mut args: Args, output: &dyn Fn(&str)) -> Result<Value> {
    let name = builtin.name();
    match builtin {
        Builtin::Print => {
            let sep = print_separator(args.take_keyword("sep"), "sep", " ")?;
            let end = print_separator(args.take_keyword("end"), "end", "\n")?;
            args.take_keyword("flush");
            args.finish(name)?;
            let parts: Vec<String> = args.positional.iter().map(Value::to_str).collect();
            output(&format!("{}{}", parts.join(&sep), end));
            Ok(Value::None)
        }
        Builtin::Input => {
            args.no_keywords(name)?;
            args.arity(name, 0, 1)?;
            let prompt = args.get(0).map(Value::to_str);
            Ok(Value::Coroutine(Rc::new(InputRequest::new(prompt))))
        }
        Builtin::Len => {
            args.no_keywords(name)?;
            args.arity(name, 1, 1)?;
            Ok(Value::Int(len(&args.positional[0])? as i64))
        }
        Builtin::Str => {
            args.no_keywords(name)?;
            args.arity(name, 0, 1)?;
            Ok(Value::from(args.get(0).map(Value::to_str).unwrap_or_default()))
        }
        Builtin::Repr => {
            args.no_keywords(name)?;
            args.arity(name, 1, 1)?;
            Ok(Value::from(args.positional[0].repr()))
        }
        Builtin::Int => {
            let base = args.take_keyword("base");
            args.finish(name)?;
            args.arity(name, 0, 2)?;
            let base = match base.or_else(|| args.get(1).cloned()) {
                Some(base) => Some(expect_int(&base)?),
                None => None,
            };
            match args.get(0) {
                None => Ok(Value::Int(0)),
                Some(value) => to_int(value, base),
            }
        }
        Builtin::Float => {
            args.no_keywords(name)?;
            args.arity(name, 0, 1)?;
            match args.get(0) {
                None => Ok(Value::Float(0.0)),
                Some(value) => to_float(value),
            }
        }
        Builtin::Bool => {
            args.no_keywords(name)?;
            args.arity(name, 0, 1)?;
            Ok(Value::Bool(args.get(0).is_some_and(Value::is_truthy)))
        }
        Builtin::List => {
            args.no_keywords(name)?;
            args.arity(name, 0, 1)?;
            match args.get(0) {
                None => Ok(Value::list(Vec::new())),
                Some(value) => Ok(Value::list(iterate(value)?)),
            }
        }
        Builtin::Tuple => {
            args.no_keywords(name)?;
            args.arity(name, 0, 1)?;
            match args.get(0) {
                None => Ok(Value::tuple(Vec::new())),
                Some(value) => Ok(Value::tuple(iterate(value)?)),
            }
        }
        Builtin::Dict => {
            args.arity(name, 0, 1)?;
            let mut dict = Dict::new();
            if let Some(source) = args.get(0) {
                dict_update(&mut dict, source)?;
            }
            for (key, value) in args.keywords {
                dict.insert(Value::from(key), value);
            }
            Ok(Value::dict(dict))
        }
        Builtin::Range => {
            args.no_keywords(name)?;
            args.arity(name, 1, 3)?;
            let bounds = args
                .positional
                .iter()
                .map(expect_int)
                .collect::<Result<Vec<i64>>>()?;
            let range = match bounds.as_slice() {
                [stop] => Range { start: 0, stop: *stop, step: 1 },
                [start, stop] => Range { start: *start, stop: *stop, step: 1 },
                [start, stop, step] => Range { start: *start, stop: *stop, step: *step },
                _ => Range { start: 0, stop: 0, step: 1 },
            };
            if range.step == 0 {
                return Err(Error::value_error("range() arg 3 must not be zero"));
            }
            Ok(Value::Range(range))
        }
        Builtin::Abs => {
            args.no_keywords(name)?;
            args.arity(name, 1, 1)?;
            match &args.positional[0] {
                Value::Float(n) => Ok(Value::Float(n.abs())),
                value @ (Value::Int(_) | Value::Bool(_)) => {
                    let n = value.as_int().unwrap_or(0);
                    Ok(Value::Int(n.checked_abs().ok_or_else(Error::overflow)?))
                }
                other => Err(Error::type_error(format!(
                    "bad operand type for abs(): '{}'",
                    other.type_name()
                ))),
            }
        }
        Builtin::Min | Builtin::Max => {
            if args.take_keyword("key").is_some() {
                return Err(Error::runtime_error(format!("{}() with a key must be evaluated by the interpreter", name)));
            }
            let (items, default) = extreme_candidates(builtin, &mut args)?;
            let pairs = items.into_iter().map(|item| (item.clone(), item)).collect();
            pick_extreme(builtin, pairs, default)
        }
        Builtin::Sum => {
            let start = args.take_keyword("start");
            args.finish(name)?;
            args.arity(name, 1, 2)?;
            let mut total = start.or_else(|| args.get(1).cloned()).unwrap_or(Value::Int(0));
            if matches!(total, Value::Str(_)) {
                return Err(Error::type_error("sum() can't sum strings [use ''.join(seq) instead]"));
            }
            for item in iterate(&args.positional[0])? {
                total = ops::binary(BinOp::Add, &total, &item)?;
            }
            Ok(total)
        }
        Builtin::Round => {
            let ndigits = args.take_keyword("ndigits");
            args.finish(name)?;
            args.arity(name, 1, 2)?;
            let ndigits = match ndigits.or_else(|| args.get(1).cloned()) {
                None | Some(Value::None) => None,
                Some(value) => Some(expect_int(&value)?),
            };
            round(&args.positional[0], ndigits)
        }
        Builtin::Sorted => {
            if args.take_keyword("key").is_some() {
                return Err(Error::runtime_error("sorted() with a key must be evaluated by the interpreter"));
            }
            let reverse = args.take_keyword("reverse").is_some_and(|v| v.is_truthy());
            args.finish(name)?;
            args.arity(name, 1, 1)?;
            let pairs = iterate(&args.positional[0])?
                .into_iter()
                .map(|item| (item.clone(), item))
                .collect();
            let sorted = ops::sort_keyed(pairs, reverse)?;
            Ok(Value::list(sorted.into_iter().map(|(_, item)| item).collect()))
        }
        Builtin::Reversed => {
            args.no_keywords(name)?;
            args.arity(name, 1, 1)?;
            let value = &args.positional[0];
            match value {
                Value::List(_) | Value::Tuple(_) | Value::Str(_) | Value::Range(_) | Value::Dict(_) => {
                    let mut items = iterate(value)?;
                    items.reverse();
                    Ok(Value::list(items))
                }
                other => Err(Error::type_error(format!(
                    "'{}' object is not reversible",
                    other.type_name()
                ))),
            }
        }
        Builtin::Enumerate => {
            let start = args.take_keyword("start");
            args.finish(name)?;
            args.arity(name, 1, 2)?;
            let start = match start.or_else(|| args.get(1).cloned()) {
                Some(value) => expect_int(&value)?,
                None => 0,
            };
            let pairs = iterate(&args.positional[0])?
                .into_iter()
                .zip(start..)
                .map(|(item, i)| Value::tuple(vec![Value::Int(i), item]))
                .collect();
            Ok(Value::list(pairs))
        }
        Builtin::Zip => {
            args.no_keywords(name)?;
            let columns = args
                .positional
                .iter()
                .map(iterate)
                .collect::<Result<Vec<Vec<Value>>>>()?;
            let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
            let zipped = (0..rows)
                .map(|row| Value::tuple(columns.iter().map(|column| column[row].clone()).collect()))
                .collect();
            Ok(Value::list(zipped))
        }
        Builtin::Isinstance => {
            args.no_keywords(name)?;
            args.arity(name, 2, 2)?;
            Ok(Value::Bool(is_instance(&args.positional[0], &args.positional[1])?))
        }
        Builtin::Type => {
            args.no_keywords(name)?;
            if args.len() != 1 {
                return Err(Error::type_error("type() takes 1 argument"));
            }
            Ok(type_of(&args.positional[0]))
        }
        Builtin::Ord => {
            args.no_keywords(name)?;
            args.arity(name, 1, 1)?;
            match &args.positional[0] {
                Value::Str(s) => {
                    let mut chars = s.chars();
                    match (chars.next(), chars.next()) {
                        (Some(c), None) => Ok(Value::Int(c as i64)),
                        _ => Err(Error::type_error(format!(
                            "ord() expected a character, but string of length {} found",
                            s.chars().count()
                        ))),
                    }
                }
                other => Err(Error::type_error(format!(
                    "ord() expected string of length 1, but {} found",
                    other.type_name()
                ))),
            }
        }
        Builtin::Chr => {
            args.no_keywords(name)?;
            args.arity(name, 1, 1)?;
            let code = expect_int(&args.positional[0])?;
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .map(|c| Value::from(c.to_string()))
                .ok_or_else(|| Error::value_error("chr() arg not in range(0x110000)"))
        }
    }
}

fn print_separator(value: Option<Value>, which: &str, default: &str) -> Result<String> {
    match value {
        None => Ok(default.to_string()),
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(other) => Err(Error::type_error(format!(
            "{} must be None or a string, not {}",
            which,
            other.type_name()
        ))),
    }
}

/// `len(value)`
pub fn len(value: &Value) -> Result<usize> {
    match value {
        Value::Str(s) => Ok(s.chars().count()),
        Value::List(items) => Ok(items.borrow().len()),
        Value::Tuple(items) => Ok(items.len()),
        Value::Dict(dict) => Ok(dict.borrow().len()),
        Value::Range(range) => Ok(range.len()),
        other => Err(Error::type_error(format!(
            "object of type '{}' has no len()",
            other.type_name()
        ))),
    }
}

fn to_int(value: &Value, base: Option<i64>) -> Result<Value> {
    match (value, base) {
        (Value::Str(s), base) => parse_int(s, base.unwrap_or(10)).map(Value::Int),
        (_, Some(_)) => Err(Error::type_error("int() can't convert non-string with explicit base")),
        (Value::Int(_) | Value::Bool(_), None) => Ok(Value::Int(value.as_int().unwrap_or(0))),
        (Value::Float(f), None) => float_to_int(f.trunc()).map(Value::Int),
        (other, None) => Err(Error::type_error(format!(
            "int() argument must be a string, a bytes-like object or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn float_to_int(f: f64) -> Result<i64> {
    if f.is_nan() {
        return Err(Error::value_error("cannot convert float NaN to integer"));
    }
    if f.is_infinite() {
        return Err(Error::exception(
            ExcClass::OverflowError,
            "cannot convert float infinity to integer",
        ));
    }
    if f < i64::MIN as f64 || f >= i64::MAX as f64 {
        return Err(Error::overflow());
    }
    Ok(f as i64)
}

/// `int(text, base)`
pub fn parse_int(text: &str, base: i64) -> Result<i64> {
    let invalid = || {
        Error::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            Value::str(text).repr()
        ))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(Error::value_error("int() base must be >= 2 and <= 36, or 0"));
    }
    let trimmed = text.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let lower = digits.to_ascii_lowercase();
    let (radix, digits) = match (base, lower.get(..2)) {
        (0 | 16, Some("0x")) => (16, &lower[2..]),
        (0 | 8, Some("0o")) => (8, &lower[2..]),
        (0 | 2, Some("0b")) => (2, &lower[2..]),
        (0, _) => (10, lower.as_str()),
        (base, _) => (base as u32, lower.as_str()),
    };
    if digits.is_empty() || digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return Err(invalid());
    }
    let digits = digits.replace('_', "");
    let signed = if negative { format!("-{}", digits) } else { digits };
    i64::from_str_radix(&signed, radix).map_err(|err| match err.kind() {
        std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => Error::overflow(),
        _ => invalid(),
    })
}

fn to_float(value: &Value) -> Result<Value> {
    match value {
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Int(_) | Value::Bool(_) => Ok(Value::Float(value.as_float().unwrap_or(0.0))),
        Value::Str(s) => {
            let trimmed = s.trim();
            let cleaned = if trimmed.contains("__") || trimmed.starts_with('_') || trimmed.ends_with('_') {
                None
            } else {
                Some(trimmed.replace('_', ""))
            };
            cleaned
                .and_then(|text| text.parse::<f64>().ok())
                .map(Value::Float)
                .ok_or_else(|| {
                    Error::value_error(format!("could not convert string to float: {}", value.repr()))
                })
        }
        other => Err(Error::type_error(format!(
            "float() argument must be a string or a real number, not '{}'",
            other.type_name()
        ))),
    }
}

fn round(value: &Value, ndigits: Option<i64>) -> Result<Value> {
    match (value, ndigits) {
        (Value::Float(f), None) => float_to_int(f.round_ties_even()).map(Value::Int),
        (Value::Float(f), Some(n)) => {
            let factor = 10f64.powi(n.clamp(-308, 308) as i32);
            let rounded = (f * factor).round_ties_even() / factor;
            Ok(Value::Float(if rounded.is_finite() { rounded } else { *f }))
        }
        (Value::Int(_) | Value::Bool(_), ndigits) => {
            let n = value.as_int().unwrap_or(0);
            match ndigits {
                Some(digits) if digits < 0 => {
                    let factor = u32::try_from(-digits)
                        .ok()
                        .and_then(|exp| 10i128.checked_pow(exp));
                    let Some(factor) = factor else {
                        return Ok(Value::Int(0));
                    };
                    let n = n as i128;
                    let rem = n.rem_euclid(factor);
                    let base = n - rem;
                    let round_up = rem * 2 > factor || (rem * 2 == factor && (base / factor) % 2 != 0);
                    let rounded = if round_up { base + factor } else { base };
                    i64::try_from(rounded).map(Value::Int).map_err(|_| Error::overflow())
                }
                _ => Ok(Value::Int(n)),
            }
        }
        (other, _) => Err(Error::type_error(format!(
            "type {} doesn't define __round__ method",
            other.type_name()
        ))),
    }
}

/// Candidates and `default` for `min` / `max`.
pub fn extreme_candidates(builtin: Builtin, args: &mut Args) -> Result<(Vec<Value>, Option<Value>)> {
    let name = builtin.name();
    let default = args.take_keyword("default");
    args.finish(name)?;
    match args.len() {
        0 => Err(Error::type_error(format!("{} expected at least 1 argument, got 0", name))),
        1 => Ok((iterate(&args.positional[0])?, default)),
        _ if default.is_some() => Err(Error::type_error(format!(
            "Cannot specify a default for {}() with multiple positional arguments",
            name
        ))),
        _ => Ok((args.positional.clone(), None)),
    }
}

/// Choose among `(key, item)` pairs for `min` / `max`.
pub fn pick_extreme(builtin: Builtin, pairs: Vec<(Value, Value)>, default: Option<Value>) -> Result<Value> {
    match ops::select_extreme(pairs, builtin == Builtin::Max)? {
        Some(item) => Ok(item),
        None => default.ok_or_else(|| {
            Error::value_error(format!("{}() iterable argument is empty", builtin.name()))
        }),
    }
}

fn dict_update(dict: &mut Dict, source: &Value) -> Result<()> {
    if let Value::Dict(other) = source {
        for (key, value) in other.borrow().iter() {
            dict.insert(key.clone(), value.clone());
        }
        return Ok(());
    }
    for (index, item) in iterate(source)?.into_iter().enumerate() {
        let pair = iterate(&item).map_err(|_| {
            Error::type_error(format!(
                "cannot convert dictionary update sequence element #{} to a sequence",
                index
            ))
        })?;
        match <[Value; 2]>::try_from(pair) {
            Ok([key, value]) => {
                ops::check_hashable(&key)?;
                dict.insert(key, value);
            }
            Err(pair) => {
                return Err(Error::value_error(format!(
                    "dictionary update sequence element #{} has length {}; 2 is required",
                    index,
                    pair.len()
                )));
            }
        }
    }
    Ok(())
}

/// `type(value)`
pub fn type_of(value: &Value) -> Value {
    match value {
        Value::None => Value::Type("NoneType"),
        Value::Bool(_) => Value::Builtin(Builtin::Bool),
        Value::Int(_) => Value::Builtin(Builtin::Int),
        Value::Float(_) => Value::Builtin(Builtin::Float),
        Value::Str(_) => Value::Builtin(Builtin::Str),
        Value::List(_) => Value::Builtin(Builtin::List),
        Value::Tuple(_) => Value::Builtin(Builtin::Tuple),
        Value::Dict(_) => Value::Builtin(Builtin::Dict),
        Value::Range(_) => Value::Builtin(Builtin::Range),
        Value::Exception(exc) => Value::ExcClass(exc.class),
        other => Value::Type(other.type_name()),
    }
}

/// `isinstance(value, class)`
pub fn is_instance(value: &Value, class: &Value) -> Result<bool> {
    match class {
        Value::Tuple(classes) => {
            for class in classes.iter() {
                if is_instance(value, class)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Builtin(builtin) if builtin.is_type() => Ok(match builtin {
            Builtin::Int => matches!(value, Value::Int(_) | Value::Bool(_)),
            Builtin::Bool => matches!(value, Value::Bool(_)),
            Builtin::Float => matches!(value, Value::Float(_)),
            Builtin::Str => matches!(value, Value::Str(_)),
            Builtin::List => matches!(value, Value::List(_)),
            Builtin::Tuple => matches!(value, Value::Tuple(_)),
            Builtin::Dict => matches!(value, Value::Dict(_)),
            Builtin::Range => matches!(value, Value::Range(_)),
            _ => false,
        }),
        Value::ExcClass(class) => {
            Ok(matches!(value, Value::Exception(exc) if exc.class.is_subclass_of(*class)))
        }
        Value::Type(name) => Ok(value.type_name() == *name),
        _ => Err(Error::type_error(
            "isinstance() arg 2 must be a type, a tuple of types, or a union",
        )),
    }
}

const STR_METHODS: &[&str] = &[
    "upper", "lower", "strip", "lstrip", "rstrip", "split", "join", "replace", "startswith",
    "endswith", "find", "index", "count", "isdigit", "isalpha", "isalnum", "isspace", "islower",
    "isupper", "title", "capitalize", "format", "zfill", "ljust", "rjust", "center",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "pop", "insert", "remove", "index", "count", "sort", "reverse", "clear",
    "copy",
];

const DICT_METHODS: &[&str] = &[
    "get", "keys", "values", "items", "pop", "setdefault", "update", "clear", "copy",
];

/// `value.attr`
pub fn get_attr(value: &Value, attr: &str) -> Result<Value> {
    let methods: &[&str] = match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Exception(exc) if attr == "args" => return Ok(Value::tuple(exc.args.clone())),
        Value::Function(func) if attr == "__name__" => return Ok(Value::str(&func.def.name)),
        Value::Builtin(builtin) if attr == "__name__" => return Ok(Value::str(builtin.name())),
        Value::ExcClass(class) if attr == "__name__" => return Ok(Value::str(class.name())),
        Value::Type(name) if attr == "__name__" => return Ok(Value::str(name)),
        _ => &[],
    };
    if methods.contains(&attr) {
        Ok(Value::BoundMethod(Rc::new(BoundMethod {
            receiver: value.clone(),
            name: attr.to_string(),
        })))
    } else {
        Err(Error::attribute_error(value, attr))
    }
}

/// Call a method bound by [`get_attr`].
pub fn call_method(receiver: &Value, method: &str, args: Args) -> Result<Value> {
    match receiver {
        Value::Str(s) => str_method(s, method, args),
        Value::List(_) => list_method(receiver, method, args),
        Value::Dict(_) => dict_method(receiver, method, args),
        other => Err(Error::attribute_error(other, method)),
    }
}

fn char_index(s: &str, byte_index: usize) -> i64 {
    s[..byte_index].chars().count() as i64
}

fn strip_chars(args: &Args, func: &str) -> Result<Option<Vec<char>>> {
    args.no_keywords(func)?;
    args.arity(func, 0, 1)?;
    match args.get(0) {
        None | Some(Value::None) => Ok(None),
        Some(Value::Str(chars)) => Ok(Some(chars.chars().collect())),
        Some(other) => Err(Error::type_error(format!(
            "{} arg must be None or str, not {}",
            func,
            other.type_name()
        ))),
    }
}

fn str_method(s: &str, method: &str, mut args: Args) -> Result<Value> {
    let qualified = format!("str.{}", method);
    let no_args = |args: &Args| -> Result<()> {
        args.no_keywords(&qualified)?;
        args.arity(&qualified, 0, 0)
    };
    match method {
        "upper" => {
            no_args(&args)?;
            Ok(Value::from(s.to_uppercase()))
        }
        "lower" => {
            no_args(&args)?;
            Ok(Value::from(s.to_lowercase()))
        }
        "strip" | "lstrip" | "rstrip" => {
            let chars = strip_chars(&args, method)?;
            let matches = |c: char| match &chars {
                Some(set) => set.contains(&c),
                None => c.is_whitespace(),
            };
            let stripped = match method {
                "strip" => s.trim_matches(matches),
                "lstrip" => s.trim_start_matches(matches),
                _ => s.trim_end_matches(matches),
            };
            Ok(Value::str(stripped))
        }
        "split" => {
            let sep = args.take_keyword("sep");
            let maxsplit = args.take_keyword("maxsplit");
            args.finish(&qualified)?;
            args.arity(&qualified, 0, 2)?;
            let sep = sep.or_else(|| args.get(0).cloned());
            let maxsplit = match maxsplit.or_else(|| args.get(1).cloned()) {
                Some(value) => expect_int(&value)?,
                None => -1,
            };
            let parts = match sep {
                None | Some(Value::None) => split_whitespace(s, maxsplit),
                Some(Value::Str(sep)) if sep.is_empty() => {
                    return Err(Error::value_error("empty separator"));
                }
                Some(Value::Str(sep)) => match usize::try_from(maxsplit) {
                    Ok(max) => s.splitn(max + 1, sep.as_ref()).map(str::to_string).collect(),
                    Err(_) => s.split(sep.as_ref()).map(str::to_string).collect(),
                },
                Some(other) => {
                    return Err(Error::type_error(format!(
                        "must be str or None, not {}",
                        other.type_name()
                    )));
                }
            };
            Ok(Value::list(parts.into_iter().map(Value::from).collect()))
        }
        "join" => {
            args.no_keywords(&qualified)?;
            args.arity(&qualified, 1, 1)?;
            let mut parts = Vec::new();
            for (i, item) in iterate(&args.positional[0])?.into_iter().enumerate() {
                match item {
                    Value::Str(part) => parts.push(part.to_string()),
                    other => {
                        return Err(Error::type_error(format!(
                            "sequence item {}: expected str instance, {} found",
                            i,
                            other.type_name()
                        )));
                    }
                }
            }
            Ok(Value::from(parts.join(s)))
        }
        "replace" => {
            args.no_keywords(&qualified)?;
            args.arity(&qualified, 2, 3)?;
            let old = expect_str(&args.positional[0], "replace() argument 1")?;
            let new = expect_str(&args.positional[1], "replace() argument 2")?;
            let count = match args.get(2) {
                Some(value) => expect_int(value)?,
                None => -1,
            };
            Ok(Value::from(match usize::try_from(count) {
                Ok(count) => s.replacen(old, new, count),
                Err(_) => s.replace(old, new),
            }))
        }
        "startswith" | "endswith" => {
            args.no_keywords(&qualified)?;
            args.arity(&qualified, 1, 1)?;
            let candidates = match &args.positional[0] {
                Value::Tuple(items) => items.as_ref().clone(),
                other => vec![other.clone()],
            };
            for candidate in &candidates {
                let candidate = expect_str(candidate, &format!("{} first arg", method))?;
                let found = if method == "startswith" {
                    s.starts_with(candidate)
                } else {
                    s.ends_with(candidate)
                };
                if found {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "find" | "index" => {
            args.no_keywords(&qualified)?;
            args.arity(&qualified, 1, 1)?;
            let needle = expect_str(&args.positional[0], "must be str")?;
            match s.find(needle) {
                Some(i) => Ok(Value::Int(char_index(s, i))),
                None if method == "find" => Ok(Value::Int(-1)),
                None => Err(Error::value_error("substring not found")),
            }
        }
        "count" => {
            args.no_keywords(&qualified)?;
            args.arity(&qualified, 1, 1)?;
            let needle = expect_str(&args.positional[0], "must be str")?;
            let count = if needle.is_empty() {
                s.chars().count() + 1
            } else {
                s.matches(needle).count()
            };
            Ok(Value::Int(count as i64))
        }
        "isdigit" | "isalpha" | "isalnum" | "isspace" => {
            no_args(&args)?;
            let test: fn(char) -> bool = match method {
                "isdigit" => |c| c.is_numeric(),
                "isalpha" => char::is_alphabetic,
                "isalnum" => char::is_alphanumeric,
                _ => char::is_whitespace,
            };
            Ok(Value::Bool(!s.is_empty() && s.chars().all(test)))
        }
        "islower" | "isupper" => {
            no_args(&args)?;
            let has_cased = s.chars().any(|c| c.is_lowercase() || c.is_uppercase());
            let ok = if method == "islower" {
                !s.chars().any(char::is_uppercase)
            } else {
                !s.chars().any(char::is_lowercase)
            };
            Ok(Value::Bool(has_cased && ok))
        }
        "title" => {
            no_args(&args)?;
            let mut out = String::with_capacity(s.len());
            let mut previous_cased = false;
            for c in s.chars() {
                if previous_cased {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                previous_cased = c.is_alphabetic();
            }
            Ok(Value::from(out))
        }
        "capitalize" => {
            no_args(&args)?;
            let mut chars = s.chars();
            let out = match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            };
            Ok(Value::from(out))
        }
        "format" => Ok(Value::from(ops::str_format(s, &args.positional, &args.keywords)?)),
        "zfill" => {
            args.no_keywords(&qualified)?;
            args.arity(&qualified, 1, 1)?;
            let width = usize::try_from(expect_int(&args.positional[0])?).unwrap_or(0);
            let len = s.chars().count();
            if len >= width {
                return Ok(Value::str(s));
            }
            let (sign, digits) = match s.chars().next() {
                Some(c @ ('+' | '-')) => (c.to_string(), &s[1..]),
                _ => (String::new(), s),
            };
            Ok(Value::from(format!("{}{}{}", sign, "0".repeat(width - len), digits)))
        }
        "ljust" | "rjust" | "center" => {
            args.no_keywords(&qualified)?;
            args.arity(&qualified, 1, 2)?;
            let width = usize::try_from(expect_int(&args.positional[0])?).unwrap_or(0);
            let fill = match args.get(1) {
                Some(Value::Str(fill)) if fill.chars().count() == 1 => fill.chars().next().unwrap_or(' '),
                Some(_) => {
                    return Err(Error::type_error(
                        "The fill character must be exactly one character long",
                    ));
                }
                None => ' ',
            };
            let len = s.chars().count();
            if len >= width {
                return Ok(Value::str(s));
            }
            let padding = width - len;
            let fill_str = |n: usize| fill.to_string().repeat(n);
            let out = match method {
                "ljust" => format!("{}{}", s, fill_str(padding)),
                "rjust" => format!("{}{}", fill_str(padding), s),
                _ => {
                    let left = padding / 2 + (padding & width & 1);
                    format!("{}{}{}", fill_str(left), s, fill_str(padding - left))
                }
            };
            Ok(Value::from(out))
        }
        _ => Err(Error::attribute_error(&Value::str(s), method)),
    }
}

fn split_whitespace(s: &str, maxsplit: i64) -> Vec<String> {
    let Ok(max) = usize::try_from(maxsplit) else {
        return s.split_whitespace().map(str::to_string).collect();
    };
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if parts.len() == max {
            parts.push(rest.to_string());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(rest.to_string());
                break;
            }
        }
    }
    parts
}

fn list_method(receiver: &Value, method: &str, mut args: Args) -> Result<Value> {
    let Value::List(items) = receiver else {
        return Err(Error::attribute_error(receiver, method));
    };
    let qualified = format!("list.{}", method);
    if method != "sort" {
        args.no_keywords(&qualified)?;
    }
    match method {
        "append" => {
            args.arity(&qualified, 1, 1)?;
            items.borrow_mut().push(args.positional.remove(0));
            Ok(Value::None)
        }
        "extend" => {
            args.arity(&qualified, 1, 1)?;
            let extra = iterate(&args.positional[0])?;
            items.borrow_mut().extend(extra);
            Ok(Value::None)
        }
        "pop" => {
            args.arity(&qualified, 0, 1)?;
            let mut items = items.borrow_mut();
            if items.is_empty() {
                return Err(Error::index_error("pop from empty list"));
            }
            let index = match args.get(0) {
                Some(value) => expect_int(value)?,
                None => -1,
            };
            let len = items.len() as i64;
            let index = if index < 0 { index + len } else { index };
            if !(0..len).contains(&index) {
                return Err(Error::index_error("pop index out of range"));
            }
            Ok(items.remove(index as usize))
        }
        "insert" => {
            args.arity(&qualified, 2, 2)?;
            let index = expect_int(&args.positional[0])?;
            let value = args.positional.remove(1);
            let mut items = items.borrow_mut();
            let len = items.len() as i64;
            let index = if index < 0 { (index + len).max(0) } else { index.min(len) };
            items.insert(index as usize, value);
            Ok(Value::None)
        }
        "remove" => {
            args.arity(&qualified, 1, 1)?;
            let position = items.borrow().iter().position(|v| *v == args.positional[0]);
            match position {
                Some(i) => {
                    items.borrow_mut().remove(i);
                    Ok(Value::None)
                }
                None => Err(Error::value_error("list.remove(x): x not in list")),
            }
        }
        "index" => {
            args.arity(&qualified, 1, 1)?;
            let position = items.borrow().iter().position(|v| *v == args.positional[0]);
            position
                .map(|i| Value::Int(i as i64))
                .ok_or_else(|| Error::value_error(format!("{} is not in list", args.positional[0].repr())))
        }
        "count" => {
            args.arity(&qualified, 1, 1)?;
            let count = items.borrow().iter().filter(|v| **v == args.positional[0]).count();
            Ok(Value::Int(count as i64))
        }
        "sort" => {
            if args.take_keyword("key").is_some() {
                return Err(Error::runtime_error("list.sort() with a key must be evaluated by the interpreter"));
            }
            let reverse = args.take_keyword("reverse").is_some_and(|v| v.is_truthy());
            args.finish(&qualified)?;
            args.arity(&qualified, 0, 0)?;
            let snapshot = items.borrow().clone();
            sort_list_in_place(receiver, snapshot.into_iter().map(|v| (v.clone(), v)).collect(), reverse)?;
            Ok(Value::None)
        }
        "reverse" => {
            args.arity(&qualified, 0, 0)?;
            items.borrow_mut().reverse();
            Ok(Value::None)
        }
        "clear" => {
            args.arity(&qualified, 0, 0)?;
            items.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            args.arity(&qualified, 0, 0)?;
            Ok(Value::list(items.borrow().clone()))
        }
        _ => Err(Error::attribute_error(receiver, method)),
    }
}

/// Sort `(key, item)` pairs and store the items back into `list`.
pub fn sort_list_in_place(list: &Value, pairs: Vec<(Value, Value)>, reverse: bool) -> Result<()> {
    let sorted = ops::sort_keyed(pairs, reverse)?;
    if let Value::List(items) = list {
        *items.borrow_mut() = sorted.into_iter().map(|(_, item)| item).collect();
    }
    Ok(())
}

fn dict_method(receiver: &Value, method: &str, mut args: Args) -> Result<Value> {
    let Value::Dict(dict) = receiver else {
        return Err(Error::attribute_error(receiver, method));
    };
    let qualified = format!("dict.{}", method);
    if method != "update" {
        args.no_keywords(&qualified)?;
    }
    match method {
        "get" => {
            args.arity(&qualified, 1, 2)?;
            ops::check_hashable(&args.positional[0])?;
            let found = dict.borrow().get(&args.positional[0]).cloned();
            Ok(found.or_else(|| args.get(1).cloned()).unwrap_or(Value::None))
        }
        "keys" => {
            args.arity(&qualified, 0, 0)?;
            Ok(Value::list(dict.borrow().keys()))
        }
        "values" => {
            args.arity(&qualified, 0, 0)?;
            Ok(Value::list(dict.borrow().values()))
        }
        "items" => {
            args.arity(&qualified, 0, 0)?;
            let items = dict
                .borrow()
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect();
            Ok(Value::list(items))
        }
        "pop" => {
            args.arity(&qualified, 1, 2)?;
            ops::check_hashable(&args.positional[0])?;
            let removed = dict.borrow_mut().remove(&args.positional[0]);
            match (removed, args.get(1)) {
                (Some(value), _) => Ok(value),
                (None, Some(default)) => Ok(default.clone()),
                (None, None) => Err(Error::key_error(args.positional[0].clone())),
            }
        }
        "setdefault" => {
            args.arity(&qualified, 1, 2)?;
            let key = args.positional[0].clone();
            ops::check_hashable(&key)?;
            let existing = dict.borrow().get(&key).cloned();
            match existing {
                Some(value) => Ok(value),
                None => {
                    let default = args.get(1).cloned().unwrap_or(Value::None);
                    dict.borrow_mut().insert(key, default.clone());
                    Ok(default)
                }
            }
        }
        "update" => {
            args.arity(&qualified, 0, 1)?;
            let mut updated = dict.borrow().clone();
            if let Some(source) = args.get(0) {
                dict_update(&mut updated, source)?;
            }
            for (key, value) in std::mem::take(&mut args.keywords) {
                updated.insert(Value::from(key), value);
            }
            *dict.borrow_mut() = updated;
            Ok(Value::None)
        }
        "clear" => {
            args.arity(&qualified, 0, 0)?;
            dict.borrow_mut().clear();
            Ok(Value::None)
        }
        "copy" => {
            args.arity(&qualified, 0, 0)?;
            Ok(Value::dict(dict.borrow().clone()))
        }
        _ => Err(Error::attribute_error(receiver, method)),
    }
}
