/// Abstract Syntax Tree types for Sandpiper scripts
///
/// The tree is owned (no borrowed slices) because the rewrite pass mutates it
/// in place and the interpreter keeps function bodies alive after parsing.

use std::collections::BTreeSet;
use std::rc::Rc;

/// A complete script
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub body: Vec<Stmt>,
}

/// A statement together with the line it starts on
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

impl Stmt {
    pub fn new(kind: StmtKind, line: usize) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression used as a statement
    Expr(Expr),
    /// `a = b = value`
    Assign { targets: Vec<Expr>, value: Expr },
    /// `target op= value`
    AugAssign { target: Expr, op: BinOp, value: Expr },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    For {
        target: Expr,
        iter: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    /// Function definition. Shared so that function values can hold on to
    /// their body without copying it.
    FunctionDef(Rc<FunctionDef>),
    Return(Option<Expr>),
    Pass,
    Break,
    Continue,
    /// `raise` or `raise expr`
    Raise(Option<Expr>),
    Try {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finalbody: Vec<Stmt>,
    },
    Global(Vec<String>),
    Assert { test: Expr, msg: Option<Expr> },
    Import(Vec<Alias>),
    ImportFrom { module: String, names: Vec<Alias> },
}

/// `def name(params): body`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    /// Set only on the synthetic entry point built by the execution wrapper.
    pub is_async: bool,
    pub scope: ScopeInfo,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

/// Names a function binds locally and names it declares `global`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScopeInfo {
    pub locals: BTreeSet<String>,
    pub globals: BTreeSet<String>,
}

impl ScopeInfo {
    pub fn is_local(&self, name: &str) -> bool {
        self.locals.contains(name)
    }
}

/// `except [type [as name]]: body`
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptHandler {
    pub typ: Option<Expr>,
    pub name: Option<String>,
    pub body: Vec<Stmt>,
    pub line: usize,
}

/// `name [as asname]` in an import
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub name: String,
    pub asname: Option<String>,
}

impl Alias {
    /// The name this alias binds in the importing namespace.
    pub fn bound_name(&self) -> &str {
        match &self.asname {
            Some(asname) => asname,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Constant(Constant),
    FString(Vec<FStringPart>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Dict(Vec<(Expr, Expr)>),
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `a and b and c` / `a or b`
    BoolOp { op: BoolOp, values: Vec<Expr> },
    /// Chained comparison: `a < b <= c`
    Compare {
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<KeywordArg>,
    },
    Attribute { value: Box<Expr>, attr: String },
    Subscript { value: Box<Expr>, index: Box<Expr> },
    /// Only valid as a subscript index
    Slice {
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    /// `body if test else orelse`
    IfExp {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    /// Suspension point. Never produced by the parser, only by the rewrite.
    Await(Box<Expr>),
}

impl Expr {
    pub fn name(name: impl Into<String>) -> Self {
        Expr::Name(name.into())
    }

    pub fn str(value: impl Into<String>) -> Self {
        Expr::Constant(Constant::Str(value.into()))
    }

    /// Whether this is a call to the bare name `name`.
    pub fn is_call_to(&self, name: &str) -> bool {
        matches!(self, Expr::Call { func, .. } if matches!(func.as_ref(), Expr::Name(n) if n == name))
    }

    /// Nodes on the longest path from this expression down to a leaf.
    pub fn height(&self) -> usize {
        let below = match self {
            Expr::Name(_) | Expr::Constant(_) => 0,
            Expr::FString(parts) => parts
                .iter()
                .map(|part| match part {
                    FStringPart::Literal(_) => 0,
                    FStringPart::Field { value, .. } => value.height(),
                })
                .max()
                .unwrap_or(0),
            Expr::List(items) | Expr::Tuple(items) => max_height(items),
            Expr::Dict(entries) => entries
                .iter()
                .map(|(key, value)| key.height().max(value.height()))
                .max()
                .unwrap_or(0),
            Expr::BinOp { left, right, .. } => left.height().max(right.height()),
            Expr::UnaryOp { operand, .. } => operand.height(),
            Expr::BoolOp { values, .. } => max_height(values),
            Expr::Compare {
                left, comparators, ..
            } => left.height().max(max_height(comparators)),
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                let keywords = keywords.iter().map(|k| k.value.height()).max().unwrap_or(0);
                func.height().max(max_height(args)).max(keywords)
            }
            Expr::Attribute { value, .. } => value.height(),
            Expr::Subscript { value, index } => value.height().max(index.height()),
            Expr::Slice { lower, upper, step } => [lower, upper, step]
                .into_iter()
                .flatten()
                .map(|bound| bound.height())
                .max()
                .unwrap_or(0),
            Expr::IfExp { test, body, orelse } => {
                test.height().max(body.height()).max(orelse.height())
            }
            Expr::Await(inner) => inner.height(),
        };
        below + 1
    }
}

fn max_height(exprs: &[Expr]) -> usize {
    exprs.iter().map(Expr::height).max().unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Field {
        value: Box<Expr>,
        /// `r`, `s` or `a`
        conversion: Option<char>,
        format_spec: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeywordArg {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    In,
    NotIn,
    Is,
    IsNot,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
            CmpOp::In => "in",
            CmpOp::NotIn => "not in",
            CmpOp::Is => "is",
            CmpOp::IsNot => "is not",
        }
    }
}
