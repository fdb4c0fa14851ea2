//! Operators, subscripts, iteration and string formatting.
//!
//! Everything here is synchronous; the evaluator calls into it once operands
//! have been evaluated.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use sandpiper_parser::ast::{BinOp, CmpOp, UnaryOp};

use crate::error::Error;
use crate::value::{format_float, ExcClass, Range, Value};
use crate::Result;

/// Largest sequence a script may build by repetition or from a range.
pub const MAX_SEQUENCE_LEN: usize = 1 << 24;

pub fn binary(op: BinOp, left: &Value, right: &Value) -> Result<Value> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return int_binary(op, a, b);
    }
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        return float_binary(op, a, b);
    }
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::from(format!("{}{}", a, b))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            let mut items = a.borrow().clone();
            items.extend(b.borrow().iter().cloned());
            Ok(Value::list(items))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            let mut items = a.as_ref().clone();
            items.extend(b.iter().cloned());
            Ok(Value::tuple(items))
        }
        (BinOp::Add, Value::Str(_) | Value::List(_) | Value::Tuple(_), _) => Err(Error::type_error(format!(
            "can only concatenate {} (not \"{}\") to {}",
            left.type_name(),
            right.type_name(),
            left.type_name()
        ))),
        (BinOp::Mul, Value::Str(_) | Value::List(_) | Value::Tuple(_), Value::Int(_) | Value::Bool(_)) => {
            repeat(left, right.as_int().unwrap_or(0))
        }
        (BinOp::Mul, Value::Int(_) | Value::Bool(_), Value::Str(_) | Value::List(_) | Value::Tuple(_)) => {
            repeat(right, left.as_int().unwrap_or(0))
        }
        (BinOp::Mod, Value::Str(template), _) => Ok(Value::from(percent_format(template, right)?)),
        _ => Err(unsupported_operands(op, left, right)),
    }
}

fn unsupported_operands(op: BinOp, left: &Value, right: &Value) -> Error {
    let symbol = match op {
        BinOp::Pow => "** or pow()",
        other => other.symbol(),
    };
    Error::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        symbol,
        left.type_name(),
        right.type_name()
    ))
}

fn int_binary(op: BinOp, a: i64, b: i64) -> Result<Value> {
    let value = match op {
        BinOp::Add => a.checked_add(b).ok_or_else(Error::overflow)?,
        BinOp::Sub => a.checked_sub(b).ok_or_else(Error::overflow)?,
        BinOp::Mul => a.checked_mul(b).ok_or_else(Error::overflow)?,
        BinOp::Div => {
            if b == 0 {
                return Err(Error::zero_division("division by zero"));
            }
            return Ok(Value::Float(a as f64 / b as f64));
        }
        BinOp::FloorDiv => {
            if b == 0 {
                return Err(Error::zero_division("integer division or modulo by zero"));
            }
            let quotient = a.checked_div(b).ok_or_else(Error::overflow)?;
            if a % b != 0 && ((a < 0) != (b < 0)) {
                quotient - 1
            } else {
                quotient
            }
        }
        BinOp::Mod => {
            if b == 0 {
                return Err(Error::zero_division("integer modulo by zero"));
            }
            let rem = a.checked_rem(b).unwrap_or(0);
            if rem != 0 && ((rem < 0) != (b < 0)) { rem + b } else { rem }
        }
        BinOp::Pow => {
            if b < 0 {
                if a == 0 {
                    return Err(Error::zero_division("0.0 cannot be raised to a negative power"));
                }
                return Ok(Value::Float((a as f64).powf(b as f64)));
            }
            let exp = u32::try_from(b).map_err(|_| Error::overflow())?;
            a.checked_pow(exp).ok_or_else(Error::overflow)?
        }
    };
    Ok(Value::Int(value))
}

fn float_binary(op: BinOp, a: f64, b: f64) -> Result<Value> {
    let value = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => {
            if b == 0.0 {
                return Err(Error::zero_division("float division by zero"));
            }
            a / b
        }
        BinOp::FloorDiv => {
            if b == 0.0 {
                return Err(Error::zero_division("float floor division by zero"));
            }
            (a / b).floor()
        }
        BinOp::Mod => {
            if b == 0.0 {
                return Err(Error::zero_division("float modulo by zero"));
            }
            let rem = a % b;
            if rem != 0.0 && ((rem < 0.0) != (b < 0.0)) { rem + b } else { rem }
        }
        BinOp::Pow => {
            if a == 0.0 && b < 0.0 {
                return Err(Error::zero_division("0.0 cannot be raised to a negative power"));
            }
            if a < 0.0 && b.fract() != 0.0 {
                return Err(Error::value_error("math domain error"));
            }
            let result = a.powf(b);
            if result.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(Error::exception(
                    ExcClass::OverflowError,
                    "numerical result out of range",
                ));
            }
            result
        }
    };
    Ok(Value::Float(value))
}

fn repeat(sequence: &Value, count: i64) -> Result<Value> {
    let count = usize::try_from(count).unwrap_or(0);
    let too_long = |len: usize| len.checked_mul(count).is_none_or(|total| total > MAX_SEQUENCE_LEN);
    match sequence {
        Value::Str(s) => {
            if too_long(s.len()) {
                return Err(sequence_too_long());
            }
            Ok(Value::from(s.repeat(count)))
        }
        Value::List(items) => {
            let items = items.borrow();
            if too_long(items.len()) {
                return Err(sequence_too_long());
            }
            Ok(Value::list(repeat_items(&items, count)))
        }
        Value::Tuple(items) => {
            if too_long(items.len()) {
                return Err(sequence_too_long());
            }
            Ok(Value::tuple(repeat_items(items, count)))
        }
        other => Err(Error::type_error(format!(
            "can't multiply sequence by non-int of type '{}'",
            other.type_name()
        ))),
    }
}

fn repeat_items(items: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * count);
    for _ in 0..count {
        out.extend(items.iter().cloned());
    }
    out
}

fn sequence_too_long() -> Error {
    Error::exception(ExcClass::OverflowError, "repeated sequence is too long")
}

pub fn unary(op: UnaryOp, operand: &Value) -> Result<Value> {
    match (op, operand) {
        (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
        (UnaryOp::Neg, Value::Int(_) | Value::Bool(_)) => {
            let n = operand.as_int().unwrap_or(0);
            Ok(Value::Int(n.checked_neg().ok_or_else(Error::overflow)?))
        }
        (UnaryOp::Neg, Value::Float(n)) => Ok(Value::Float(-n)),
        (UnaryOp::Pos, Value::Int(_) | Value::Bool(_)) => Ok(Value::Int(operand.as_int().unwrap_or(0))),
        (UnaryOp::Pos, Value::Float(n)) => Ok(Value::Float(*n)),
        (op, value) => {
            let symbol = if op == UnaryOp::Neg { "-" } else { "+" };
            Err(Error::type_error(format!(
                "bad operand type for unary {}: '{}'",
                symbol,
                value.type_name()
            )))
        }
    }
}

/// Evaluate one link of a comparison chain.
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    let ordering = |wanted: fn(Ordering) -> bool| -> Result<bool> {
        Ok(partial_order(left, right, op.symbol())?.is_some_and(wanted))
    };
    match op {
        CmpOp::Eq => Ok(left == right),
        CmpOp::NotEq => Ok(left != right),
        CmpOp::Is => Ok(left.is(right)),
        CmpOp::IsNot => Ok(!left.is(right)),
        CmpOp::In => contains(right, left),
        CmpOp::NotIn => Ok(!contains(right, left)?),
        CmpOp::Lt => ordering(Ordering::is_lt),
        CmpOp::LtE => ordering(Ordering::is_le),
        CmpOp::Gt => ordering(Ordering::is_gt),
        CmpOp::GtE => ordering(Ordering::is_ge),
    }
}

/// Ordering used by `<` and friends; `None` when incomparable (NaN).
pub fn partial_order(left: &Value, right: &Value, symbol: &str) -> Result<Option<Ordering>> {
    if let (Some(a), Some(b)) = (left.as_int(), right.as_int()) {
        return Ok(Some(a.cmp(&b)));
    }
    if let (Some(a), Some(b)) = (left.as_float(), right.as_float()) {
        return Ok(a.partial_cmp(&b));
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) => sequence_order(&a.borrow(), &b.borrow(), symbol),
        (Value::Tuple(a), Value::Tuple(b)) => sequence_order(a, b, symbol),
        _ => Err(Error::type_error(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            symbol,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn sequence_order(a: &[Value], b: &[Value], symbol: &str) -> Result<Option<Ordering>> {
    for (x, y) in a.iter().zip(b) {
        if x != y {
            return partial_order(x, y, symbol);
        }
    }
    Ok(Some(a.len().cmp(&b.len())))
}

pub fn less_than(left: &Value, right: &Value) -> Result<bool> {
    Ok(partial_order(left, right, "<")? == Some(Ordering::Less))
}

/// `item in container`
pub fn contains(container: &Value, item: &Value) -> Result<bool> {
    match container {
        Value::Str(haystack) => match item {
            Value::Str(needle) => Ok(haystack.contains(needle.as_ref())),
            other => Err(Error::type_error(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
        },
        Value::List(items) => Ok(items.borrow().iter().any(|v| v == item)),
        Value::Tuple(items) => Ok(items.iter().any(|v| v == item)),
        Value::Dict(dict) => {
            check_hashable(item)?;
            Ok(dict.borrow().contains_key(item))
        }
        Value::Range(range) => Ok(item.as_int().is_some_and(|n| range.contains(n))
            || matches!(item, Value::Float(f) if f.fract() == 0.0 && range.contains(*f as i64))),
        other => Err(Error::type_error(format!(
            "argument of type '{}' is not iterable",
            other.type_name()
        ))),
    }
}

pub fn check_hashable(key: &Value) -> Result<()> {
    if key.is_hashable() {
        Ok(())
    } else {
        Err(Error::type_error(format!("unhashable type: '{}'", key.type_name())))
    }
}

fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

fn index_operand(index: &Value, container: &Value) -> Result<i64> {
    index.as_int().ok_or_else(|| {
        Error::type_error(format!(
            "{} indices must be integers or slices, not {}",
            container.type_name(),
            index.type_name()
        ))
    })
}

/// `container[index]`
pub fn get_item(container: &Value, index: &Value) -> Result<Value> {
    match container {
        Value::List(items) => {
            let items = items.borrow();
            normalize_index(index_operand(index, container)?, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| Error::index_error("list index out of range"))
        }
        Value::Tuple(items) => normalize_index(index_operand(index, container)?, items.len())
            .map(|i| items[i].clone())
            .ok_or_else(|| Error::index_error("tuple index out of range")),
        Value::Str(s) => {
            let n = index_operand(index, container)?;
            let chars: Vec<char> = s.chars().collect();
            normalize_index(n, chars.len())
                .map(|i| Value::from(chars[i].to_string()))
                .ok_or_else(|| Error::index_error("string index out of range"))
        }
        Value::Range(range) => normalize_index(index_operand(index, container)?, range.len())
            .and_then(|i| range.get(i))
            .map(Value::Int)
            .ok_or_else(|| Error::index_error("range object index out of range")),
        Value::Dict(dict) => {
            check_hashable(index)?;
            dict.borrow()
                .get(index)
                .cloned()
                .ok_or_else(|| Error::key_error(index.clone()))
        }
        other => Err(Error::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// `container[index] = value`
pub fn set_item(container: &Value, index: &Value, value: Value) -> Result<()> {
    match container {
        Value::List(items) => {
            let mut items = items.borrow_mut();
            let i = normalize_index(index_operand(index, container)?, items.len())
                .ok_or_else(|| Error::index_error("list assignment index out of range"))?;
            items[i] = value;
            Ok(())
        }
        Value::Dict(dict) => {
            check_hashable(index)?;
            dict.borrow_mut().insert(index.clone(), value);
            Ok(())
        }
        other => Err(Error::type_error(format!(
            "'{}' object does not support item assignment",
            other.type_name()
        ))),
    }
}

fn slice_bound(bound: Option<&Value>) -> Result<Option<i64>> {
    match bound {
        None | Some(Value::None) => Ok(None),
        Some(value) => value.as_int().map(Some).ok_or_else(|| {
            Error::type_error("slice indices must be integers or None or have an __index__ method")
        }),
    }
}

/// Positions selected by `[lower:upper:step]` on a sequence of length `len`.
pub fn slice_positions(len: usize, lower: Option<i64>, upper: Option<i64>, step: i64) -> Vec<usize> {
    let len = len as i64;
    let adjust = |bound: i64, low: i64, high: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(low, high)
    };
    let mut positions = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |b| adjust(b, 0, len));
        let stop = upper.map_or(len, |b| adjust(b, 0, len));
        let mut i = start;
        while i < stop {
            positions.push(i as usize);
            i += step;
        }
    } else {
        let start = lower.map_or(len - 1, |b| adjust(b, -1, len - 1));
        let stop = upper.map_or(-1, |b| adjust(b, -1, len - 1));
        let mut i = start;
        while i > stop {
            positions.push(i as usize);
            i += step;
        }
    }
    positions
}

/// `container[lower:upper:step]`
pub fn get_slice(
    container: &Value,
    lower: Option<&Value>,
    upper: Option<&Value>,
    step: Option<&Value>,
) -> Result<Value> {
    let (lower, upper) = (slice_bound(lower)?, slice_bound(upper)?);
    let step = slice_bound(step)?.unwrap_or(1);
    if step == 0 {
        return Err(Error::value_error("slice step cannot be zero"));
    }
    match container {
        Value::List(items) => {
            let items = items.borrow();
            let picked = slice_positions(items.len(), lower, upper, step);
            Ok(Value::list(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let picked = slice_positions(items.len(), lower, upper, step);
            Ok(Value::tuple(picked.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_positions(chars.len(), lower, upper, step);
            Ok(Value::from(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        Value::Range(range) => {
            let picked = slice_positions(range.len(), lower, upper, step);
            let sliced = match (picked.first(), picked.len()) {
                (Some(&first), count) => {
                    let start = range.get(first).unwrap_or(range.start);
                    let step = range.step * step;
                    Range { start, stop: start + step * count as i64, step }
                }
                (None, _) => Range { start: 0, stop: 0, step: 1 },
            };
            Ok(Value::Range(sliced))
        }
        other => Err(Error::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        ))),
    }
}

/// Iterator over a script value.
///
/// Lists are iterated live, so appending inside a `for` loop extends the
/// loop the way it does in Python.
pub enum ValueIter {
    List { items: Rc<RefCell<Vec<Value>>>, index: usize },
    Range { range: Range, index: usize },
    Items(std::vec::IntoIter<Value>),
}

impl ValueIter {
    pub fn new(value: &Value) -> Result<Self> {
        Ok(match value {
            Value::List(items) => ValueIter::List { items: items.clone(), index: 0 },
            Value::Range(range) => ValueIter::Range { range: *range, index: 0 },
            Value::Tuple(items) => ValueIter::Items(items.as_ref().clone().into_iter()),
            Value::Str(s) => ValueIter::Items(
                s.chars().map(|c| Value::from(c.to_string())).collect::<Vec<_>>().into_iter(),
            ),
            Value::Dict(dict) => ValueIter::Items(dict.borrow().keys().into_iter()),
            other => {
                return Err(Error::type_error(format!(
                    "'{}' object is not iterable",
                    other.type_name()
                )));
            }
        })
    }
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        match self {
            ValueIter::List { items, index } => {
                let item = items.borrow().get(*index).cloned();
                *index += 1;
                item
            }
            ValueIter::Range { range, index } => {
                let item = range.get(*index).map(Value::Int);
                *index += 1;
                item
            }
            ValueIter::Items(items) => items.next(),
        }
    }
}

/// Collect every item of an iterable.
pub fn iterate(value: &Value) -> Result<Vec<Value>> {
    if matches!(value, Value::Range(range) if range.len() > MAX_SEQUENCE_LEN) {
        return Err(sequence_too_long());
    }
    Ok(ValueIter::new(value)?.collect())
}

/// Stable sort of `(key, item)` pairs by key, using `<` only.
pub fn sort_keyed(pairs: Vec<(Value, Value)>, reverse: bool) -> Result<Vec<(Value, Value)>> {
    let mut pairs = pairs;
    if pairs.len() <= 1 {
        return Ok(pairs);
    }
    let right = pairs.split_off(pairs.len() / 2);
    let left = sort_keyed(pairs, reverse)?;
    let right = sort_keyed(right, reverse)?;

    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    loop {
        let take_right = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => {
                if reverse {
                    less_than(&l.0, &r.0)?
                } else {
                    less_than(&r.0, &l.0)?
                }
            }
            (Some(_), None) => {
                merged.extend(left);
                break;
            }
            (None, _) => {
                merged.extend(right);
                break;
            }
        };
        let next = if take_right { right.next() } else { left.next() };
        merged.extend(next);
    }
    Ok(merged)
}

/// The item with the smallest (or largest) key; the first one wins ties.
pub fn select_extreme(pairs: Vec<(Value, Value)>, largest: bool) -> Result<Option<Value>> {
    let mut best: Option<(Value, Value)> = None;
    for (key, item) in pairs {
        let replace = match &best {
            None => true,
            Some((best_key, _)) if largest => less_than(best_key, &key)?,
            Some((best_key, _)) => less_than(&key, best_key)?,
        };
        if replace {
            best = Some((key, item));
        }
    }
    Ok(best.map(|(_, item)| item))
}

/// A parsed `[[fill]align][sign][#][0][width][,][.precision][type]` spec.
#[derive(Debug, Default, Clone, PartialEq)]
struct FormatSpec {
    fill: Option<char>,
    align: Option<char>,
    sign: Option<char>,
    zero: bool,
    width: usize,
    grouping: Option<char>,
    precision: Option<usize>,
    kind: Option<char>,
}

impl FormatSpec {
    fn parse(spec: &str, value: &Value) -> Result<Self> {
        let invalid = || {
            Error::value_error(format!(
                "Invalid format specifier '{}' for object of type '{}'",
                spec,
                value.type_name()
            ))
        };
        let chars: Vec<char> = spec.chars().collect();
        let mut parsed = FormatSpec::default();
        let mut i = 0;
        let is_align = |c: char| matches!(c, '<' | '>' | '^' | '=');

        if chars.len() >= 2 && is_align(chars[1]) {
            parsed.fill = Some(chars[0]);
            parsed.align = Some(chars[1]);
            i = 2;
        } else if chars.first().copied().is_some_and(is_align) {
            parsed.align = Some(chars[0]);
            i = 1;
        }
        if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
            parsed.sign = Some(c);
            i += 1;
        }
        if chars.get(i) == Some(&'#') {
            i += 1;
        }
        if chars.get(i) == Some(&'0') {
            parsed.zero = true;
            i += 1;
        }
        let start = i;
        while chars.get(i).is_some_and(char::is_ascii_digit) {
            i += 1;
        }
        if i > start {
            parsed.width = chars[start..i].iter().collect::<String>().parse().map_err(|_| invalid())?;
        }
        if let Some(&c @ (',' | '_')) = chars.get(i) {
            parsed.grouping = Some(c);
            i += 1;
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            let start = i;
            while chars.get(i).is_some_and(char::is_ascii_digit) {
                i += 1;
            }
            if i == start {
                return Err(Error::value_error("Format specifier missing precision"));
            }
            parsed.precision = Some(chars[start..i].iter().collect::<String>().parse().map_err(|_| invalid())?);
        }
        if let Some(&c) = chars.get(i) {
            if !"bcdeEfFgGosxX%".contains(c) {
                return Err(invalid());
            }
            parsed.kind = Some(c);
            i += 1;
        }
        if i != chars.len() {
            return Err(invalid());
        }
        Ok(parsed)
    }
}

/// `format(value, spec)`, as used by f-strings and `str.format`.
pub fn format_value(value: &Value, spec: &str) -> Result<String> {
    if spec.is_empty() {
        return Ok(value.to_str());
    }
    let parsed = FormatSpec::parse(spec, value)?;
    let unknown = |code: char| {
        Error::value_error(format!(
            "Unknown format code '{}' for object of type '{}'",
            code,
            value.type_name()
        ))
    };

    match value {
        Value::Str(s) => {
            if let Some(kind) = parsed.kind.filter(|&k| k != 's') {
                return Err(unknown(kind));
            }
            if parsed.sign.is_some() {
                return Err(Error::value_error("Sign not allowed in string format specifier"));
            }
            let text: String = match parsed.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.to_string(),
            };
            Ok(pad(&parsed, "", &text, '<'))
        }
        Value::Int(_) | Value::Bool(_) | Value::Float(_) => {
            let (negative, digits) = format_number(value, &parsed).ok_or_else(|| unknown(parsed.kind.unwrap_or('?')))?;
            let digits = match parsed.grouping {
                Some(sep) => group_digits(&digits, sep),
                None => digits,
            };
            let sign = match (negative, parsed.sign) {
                (true, _) => "-",
                (false, Some('+')) => "+",
                (false, Some(' ')) => " ",
                _ => "",
            };
            Ok(pad(&parsed, sign, &digits, '>'))
        }
        other => Err(Error::type_error(format!(
            "unsupported format string passed to {}.__format__",
            other.type_name()
        ))),
    }
}

/// Render the magnitude of a number; `None` if the type code does not apply.
fn format_number(value: &Value, spec: &FormatSpec) -> Option<(bool, String)> {
    let float = value.as_float()?;
    let negative = float.is_sign_negative() && float != 0.0 || value.as_int().is_some_and(|n| n < 0);
    let magnitude = float.abs();
    let precision = spec.precision.unwrap_or(6);

    let text = match (spec.kind, value.as_int()) {
        (None | Some('d'), Some(n)) => n.unsigned_abs().to_string(),
        (Some('d'), None) => return None,
        (Some('b'), Some(n)) => format!("{:b}", n.unsigned_abs()),
        (Some('o'), Some(n)) => format!("{:o}", n.unsigned_abs()),
        (Some('x'), Some(n)) => format!("{:x}", n.unsigned_abs()),
        (Some('X'), Some(n)) => format!("{:X}", n.unsigned_abs()),
        (Some('b' | 'o' | 'x' | 'X' | 'c' | 's'), _) => return None,
        (Some('f' | 'F'), _) => format!("{:.*}", precision, magnitude),
        (Some('%'), _) => format!("{:.*}%", precision, magnitude * 100.0),
        (Some('e'), _) => format_exponent(magnitude, precision),
        (Some('E'), _) => format_exponent(magnitude, precision).to_uppercase(),
        (Some('g'), _) => format_general(magnitude, precision),
        (Some('G'), _) => format_general(magnitude, precision).to_uppercase(),
        (None, _) => match spec.precision {
            Some(p) => format_general(magnitude, p),
            None => format_float(magnitude),
        },
        (Some(_), _) => return None,
    };
    Some((negative, text))
}

fn format_exponent(magnitude: f64, precision: usize) -> String {
    let text = format!("{:.*e}", precision, magnitude);
    match text.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{}e{}{:02}", mantissa, sign, exponent.abs())
        }
        None => text,
    }
}

fn format_general(magnitude: f64, precision: usize) -> String {
    let precision = precision.max(1);
    if magnitude == 0.0 || !magnitude.is_finite() {
        return format_float(magnitude);
    }
    let exponent = magnitude.log10().floor() as i64;
    if exponent < -4 || exponent >= precision as i64 {
        let text = format_exponent(magnitude, precision - 1);
        match text.split_once('e') {
            Some((mantissa, exponent)) => format!("{}e{}", strip_zeros(mantissa), exponent),
            None => text,
        }
    } else {
        let decimals = (precision as i64 - 1 - exponent).max(0) as usize;
        strip_zeros(&format!("{:.*}", decimals, magnitude)).to_string()
    }
}

fn strip_zeros(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn group_digits(digits: &str, sep: char) -> String {
    let (int_part, rest) = match digits.find(|c: char| !c.is_ascii_digit()) {
        Some(i) => digits.split_at(i),
        None => (digits, ""),
    };
    let mut grouped = String::new();
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(sep);
        }
        grouped.push(c);
    }
    grouped.push_str(rest);
    grouped
}

fn pad(spec: &FormatSpec, sign: &str, body: &str, default_align: char) -> String {
    let len = sign.chars().count() + body.chars().count();
    if len >= spec.width {
        return format!("{}{}", sign, body);
    }
    let (fill, align) = match (spec.fill, spec.align, spec.zero) {
        (fill, Some(align), _) => (fill.unwrap_or(' '), align),
        (_, None, true) => ('0', '='),
        (_, None, false) => (' ', default_align),
    };
    let padding = spec.width - len;
    let fill_str = |n: usize| fill.to_string().repeat(n);
    match align {
        '<' => format!("{}{}{}", sign, body, fill_str(padding)),
        '^' => format!(
            "{}{}{}{}",
            fill_str(padding / 2),
            sign,
            body,
            fill_str(padding - padding / 2)
        ),
        '=' => format!("{}{}{}", sign, fill_str(padding), body),
        _ => format!("{}{}{}", fill_str(padding), sign, body),
    }
}

/// `template % args`
pub fn percent_format(template: &str, args: &Value) -> Result<String> {
    let args: Vec<Value> = match args {
        Value::Tuple(items) => items.as_ref().clone(),
        other => vec![other.clone()],
    };
    let mut args = args.into_iter();
    let mut out = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::new();
        let mut align = None;
        while let Some(&flag @ ('-' | '+' | ' ' | '0')) = chars.peek() {
            match flag {
                '-' => align = Some('<'),
                '0' => spec.push('0'),
                sign => spec.insert(0, sign),
            }
            chars.next();
        }
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit() || **d == '.') {
            spec.push(d);
            chars.next();
        }
        if let Some(align) = align {
            spec.insert(0, align);
        }
        let conversion = chars
            .next()
            .ok_or_else(|| Error::value_error("incomplete format"))?;
        if conversion == '%' {
            out.push('%');
            continue;
        }
        let arg = args
            .next()
            .ok_or_else(|| Error::type_error("not enough arguments for format string"))?;
        let text = match conversion {
            's' => format_value(&Value::from(arg.to_str()), &spec)?,
            'r' => format_value(&Value::from(arg.repr()), &spec)?,
            'd' | 'i' | 'f' | 'F' | 'e' | 'E' | 'g' | 'x' | 'X' | 'o' => {
                let number = match (&arg, conversion) {
                    (Value::Float(f), 'd' | 'i' | 'x' | 'X' | 'o') => Value::Int(f.trunc() as i64),
                    (Value::Int(_) | Value::Bool(_) | Value::Float(_), _) => arg.clone(),
                    (other, _) => {
                        return Err(Error::type_error(format!(
                            "%{} format: a real number is required, not {}",
                            conversion,
                            other.type_name()
                        )));
                    }
                };
                let code = if conversion == 'i' { 'd' } else { conversion };
                format_value(&number, &format!("{}{}", spec, code))?
            }
            other => {
                return Err(Error::value_error(format!(
                    "unsupported format character '{}' (0x{:x})",
                    other, other as u32
                )));
            }
        };
        out.push_str(&text);
    }
    if args.next().is_some() {
        return Err(Error::type_error("not all arguments converted during string formatting"));
    }
    Ok(out)
}

/// `template.format(*args, **kwargs)`
pub fn str_format(template: &str, args: &[Value], kwargs: &[(String, Value)]) -> Result<String> {
    let mut out = String::new();
    let mut chars = template.chars().peekable();
    let mut next_auto = 0;

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(Error::value_error("Single '}' encountered in format string")),
            '{' => {
                let mut field = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    field.push(c);
                }
                if !closed {
                    return Err(Error::value_error("expected '}' before end of string"));
                }
                let (head, spec) = field.split_once(':').unwrap_or((&field, ""));
                let (name, conversion) = match head.split_once('!') {
                    Some((name, conversion)) => (name, Some(conversion)),
                    None => (head, None),
                };
                let positional = |index: usize| {
                    args.get(index).cloned().ok_or_else(|| {
                        Error::index_error(format!(
                            "Replacement index {} out of range for positional args tuple",
                            index
                        ))
                    })
                };
                let value = if name.is_empty() {
                    next_auto += 1;
                    positional(next_auto - 1)?
                } else if let Ok(index) = name.parse::<usize>() {
                    positional(index)?
                } else {
                    kwargs
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| Error::key_error(Value::str(name)))?
                };
                let value = match conversion {
                    None => value,
                    Some("r") | Some("a") => Value::from(value.repr()),
                    Some("s") => Value::from(value.to_str()),
                    Some(_) => {
                        return Err(Error::value_error("Unknown conversion specifier"));
                    }
                };
                out.push_str(&format_value(&value, spec)?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().copied().map(Value::Int).collect())
    }

    #[test]
    fn test_int_arithmetic() {
        assert_eq!(binary(BinOp::Add, &Value::Int(2), &Value::Int(3)).unwrap(), Value::Int(5));
        assert_eq!(binary(BinOp::Div, &Value::Int(7), &Value::Int(2)).unwrap(), Value::Float(3.5));
        assert_eq!(binary(BinOp::FloorDiv, &Value::Int(-7), &Value::Int(2)).unwrap(), Value::Int(-4));
        assert_eq!(binary(BinOp::Mod, &Value::Int(-7), &Value::Int(3)).unwrap(), Value::Int(2));
        assert_eq!(binary(BinOp::Pow, &Value::Int(2), &Value::Int(10)).unwrap(), Value::Int(1024));
        assert_eq!(binary(BinOp::Pow, &Value::Int(2), &Value::Int(-1)).unwrap(), Value::Float(0.5));
    }

    #[test]
    fn test_int_overflow() {
        let err = binary(BinOp::Mul, &Value::Int(i64::MAX), &Value::Int(2)).unwrap_err();
        assert_eq!(err.class(), Some(ExcClass::OverflowError));
    }

    #[test]
    fn test_division_by_zero() {
        let err = binary(BinOp::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        let err = binary(BinOp::Mod, &Value::Float(1.0), &Value::Float(0.0)).unwrap_err();
        assert_eq!(err.class(), Some(ExcClass::ZeroDivisionError));
    }

    #[test]
    fn test_concatenation_errors() {
        let err = binary(BinOp::Add, &Value::str("a"), &Value::Int(1)).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: can only concatenate str (not \"int\") to str");
        let err = binary(BinOp::Add, &Value::Int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: unsupported operand type(s) for +: 'int' and 'str'"
        );
    }

    #[test]
    fn test_sequence_repeat() {
        assert_eq!(binary(BinOp::Mul, &Value::str("ab"), &Value::Int(3)).unwrap(), Value::str("ababab"));
        assert_eq!(binary(BinOp::Mul, &Value::Int(2), &ints(&[1])).unwrap(), ints(&[1, 1]));
        assert_eq!(binary(BinOp::Mul, &Value::str("x"), &Value::Int(-1)).unwrap(), Value::str(""));
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CmpOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap());
        assert!(compare(CmpOp::Lt, &ints(&[1, 2]), &ints(&[1, 3])).unwrap());
        assert!(compare(CmpOp::In, &Value::str("ell"), &Value::str("hello")).unwrap());
        assert!(compare(CmpOp::NotIn, &Value::Int(4), &ints(&[1, 2])).unwrap());
        let err = compare(CmpOp::Lt, &Value::Int(1), &Value::str("a")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: '<' not supported between instances of 'int' and 'str'"
        );
    }

    #[test]
    fn test_indexing() {
        let list = ints(&[10, 20, 30]);
        assert_eq!(get_item(&list, &Value::Int(-1)).unwrap(), Value::Int(30));
        let err = get_item(&list, &Value::Int(3)).unwrap_err();
        assert_eq!(err.to_string(), "IndexError: list index out of range");
        assert_eq!(get_item(&Value::str("héllo"), &Value::Int(1)).unwrap(), Value::str("é"));
    }

    #[test]
    fn test_slicing() {
        let list = ints(&[0, 1, 2, 3, 4, 5]);
        let sliced = get_slice(&list, Some(&Value::Int(1)), Some(&Value::Int(4)), None).unwrap();
        assert_eq!(sliced, ints(&[1, 2, 3]));
        let reversed = get_slice(&list, None, None, Some(&Value::Int(-2))).unwrap();
        assert_eq!(reversed, ints(&[5, 3, 1]));
        let text = get_slice(&Value::str("hello"), None, Some(&Value::Int(-1)), None).unwrap();
        assert_eq!(text, Value::str("hell"));
    }

    #[test]
    fn test_live_list_iteration() {
        let list = ints(&[1]);
        let mut iter = ValueIter::new(&list).unwrap();
        assert_eq!(iter.next(), Some(Value::Int(1)));
        if let Value::List(items) = &list {
            items.borrow_mut().push(Value::Int(2));
        }
        assert_eq!(iter.next(), Some(Value::Int(2)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_stable_sort() {
        let pairs = vec![
            (Value::Int(2), Value::str("a")),
            (Value::Int(1), Value::str("b")),
            (Value::Int(2), Value::str("c")),
        ];
        let sorted: Vec<Value> = sort_keyed(pairs.clone(), false).unwrap().into_iter().map(|p| p.1).collect();
        assert_eq!(sorted, vec![Value::str("b"), Value::str("a"), Value::str("c")]);
        let sorted: Vec<Value> = sort_keyed(pairs, true).unwrap().into_iter().map(|p| p.1).collect();
        assert_eq!(sorted, vec![Value::str("a"), Value::str("c"), Value::str("b")]);
    }

    #[test]
    fn test_format_specs() {
        assert_eq!(format_value(&Value::Float(3.14159), ".2f").unwrap(), "3.14");
        assert_eq!(format_value(&Value::Int(42), ">5").unwrap(), "   42");
        assert_eq!(format_value(&Value::Int(42), "05d").unwrap(), "00042");
        assert_eq!(format_value(&Value::Int(-42), "05d").unwrap(), "-0042");
        assert_eq!(format_value(&Value::str("ab"), "*^6").unwrap(), "**ab**");
        assert_eq!(format_value(&Value::Int(1234567), ",").unwrap(), "1,234,567");
        assert_eq!(format_value(&Value::Float(0.25), ".1%").unwrap(), "25.0%");
        assert_eq!(format_value(&Value::Float(12345.678), ".2e").unwrap(), "1.23e+04");
        assert_eq!(format_value(&Value::Float(2.5), "").unwrap(), "2.5");
        let err = format_value(&Value::str("x"), "d").unwrap_err();
        assert_eq!(
            err.to_string(),
            "ValueError: Unknown format code 'd' for object of type 'str'"
        );
    }

    #[test]
    fn test_percent_format() {
        let args = Value::tuple(vec![Value::str("Ada"), Value::Int(3)]);
        assert_eq!(percent_format("%s has %d points", &args).unwrap(), "Ada has 3 points");
        assert_eq!(percent_format("%.2f%%", &Value::Float(9.5)).unwrap(), "9.50%");
        let err = percent_format("%s %s", &Value::str("one")).unwrap_err();
        assert_eq!(err.to_string(), "TypeError: not enough arguments for format string");
    }

    #[test]
    fn test_str_format() {
        let args = [Value::str("a"), Value::Int(2)];
        let kwargs = [("name".to_string(), Value::str("Ada"))];
        assert_eq!(str_format("{} {}", &args, &[]).unwrap(), "a 2");
        assert_eq!(str_format("{1}{0} {name!r} {{x}}", &args, &kwargs).unwrap(), "2a 'Ada' {x}");
        assert_eq!(str_format("{:>3}", &args[1..], &[]).unwrap(), "  2");
    }
}
