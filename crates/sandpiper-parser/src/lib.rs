//! Parser and source transformer for Sandpiper scripts.
//!
//! [`parse`] builds the syntax tree; [`transform`] additionally rewrites every
//! unshadowed `input(...)` call into a suspension point.

pub mod adapter;
pub mod ast;
pub mod ast_dump;
mod fstring;
pub mod parser;
pub mod rewrite;
pub mod scope;

pub use adapter::{ParseError, TokenStream};
pub use ast::*;
pub use parser::Parser;

use tracing::debug;

/// Parse a Sandpiper script from a string
pub fn parse(input: &str) -> Result<Module, ParseError> {
    let module = Parser::new(input).parse_module()?;
    debug!(statements = module.body.len(), "parsed module");
    Ok(module)
}

/// Parse a script and rewrite its `input` calls into suspension points.
///
/// On a parse failure nothing is rewritten and the error is returned as is.
pub fn transform(input: &str) -> Result<Module, ParseError> {
    let mut module = parse(input)?;
    rewrite::rewrite_module(&mut module);
    Ok(module)
}
