//! Splitting f-string literals into literal text and replacement fields.

use crate::adapter::ParseError;
use crate::ast::FStringPart;
use crate::parser::Parser;

/// Append literal text, merging with a preceding literal part.
pub(crate) fn push_literal(parts: &mut Vec<FStringPart>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(FStringPart::Literal(last)) = parts.last_mut() {
        last.push_str(text);
    } else {
        parts.push(FStringPart::Literal(text.to_string()));
    }
}

/// Parse the body of an f-string (escapes already decoded) whose opening
/// quote sits at `line`:`column`, `nesting` levels deep in the script.
pub fn parse_fstring(
    raw: &str,
    line: usize,
    column: usize,
    nesting: usize,
) -> Result<Vec<FStringPart>, ParseError> {
    let chars: Vec<char> = raw.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match ch {
            '{' if next == Some('{') => {
                literal.push('{');
                i += 2;
            }
            '}' if next == Some('}') => {
                literal.push('}');
                i += 2;
            }
            '}' => {
                return Err(ParseError::syntax("f-string: single '}' is not allowed", line, column));
            }
            '{' => {
                push_literal(&mut parts, &std::mem::take(&mut literal));
                let (field, end) = parse_field(&chars, i + 1, line, column, nesting)?;
                parts.push(field);
                i = end;
            }
            _ => {
                literal.push(ch);
                i += 1;
            }
        }
    }
    push_literal(&mut parts, &literal);
    Ok(parts)
}

/// Parse one replacement field starting just after its `{`. Returns the field
/// and the index just past its closing `}`.
fn parse_field(
    chars: &[char],
    start: usize,
    line: usize,
    column: usize,
    nesting: usize,
) -> Result<(FStringPart, usize), ParseError> {
    let error = |message: &str| ParseError::syntax(format!("f-string: {}", message), line, column);

    // Find the end of the expression: a top-level `!`, `:` or `}`.
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut i = start;
    loop {
        let Some(&ch) = chars.get(i) else {
            return Err(error("expecting '}'"));
        };
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            i += 1;
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth > 0 => depth -= 1,
            '}' => break,
            '!' if depth == 0 && chars.get(i + 1) != Some(&'=') => break,
            ':' if depth == 0 => break,
            _ => {}
        }
        i += 1;
    }

    let text: String = chars[start..i].iter().collect();
    let text = text.trim();
    if text.is_empty() {
        return Err(error("empty expression not allowed"));
    }
    let value = Parser::nested(&format!("({})", text), nesting)
        .parse_standalone_expression()
        .map_err(|e| error(e.message()))?;

    let mut conversion = None;
    if chars.get(i) == Some(&'!') {
        match chars.get(i + 1) {
            Some(&c @ ('r' | 's' | 'a')) => {
                conversion = Some(c);
                i += 2;
            }
            _ => return Err(error("invalid conversion character: expected 's', 'r', or 'a'")),
        }
    }

    let mut format_spec = None;
    if chars.get(i) == Some(&':') {
        i += 1;
        let spec_start = i;
        while let Some(&ch) = chars.get(i) {
            match ch {
                '}' => break,
                '{' => return Err(error("nested replacement fields are not supported")),
                _ => i += 1,
            }
        }
        format_spec = Some(chars[spec_start..i].iter().collect());
    }

    if chars.get(i) != Some(&'}') {
        return Err(error("expecting '}'"));
    }

    let field = FStringPart::Field {
        value: Box::new(value),
        conversion,
        format_spec,
    };
    Ok((field, i + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    #[test]
    fn test_literal_and_field() {
        let parts = parse_fstring("Hi {name}!", 1, 1, 0).unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], FStringPart::Literal("Hi ".into()));
        assert!(matches!(&parts[1], FStringPart::Field { value, conversion: None, format_spec: None }
            if **value == Expr::name("name")));
        assert_eq!(parts[2], FStringPart::Literal("!".into()));
    }

    #[test]
    fn test_escaped_braces() {
        let parts = parse_fstring("{{literal}}", 1, 1, 0).unwrap();
        assert_eq!(parts, vec![FStringPart::Literal("{literal}".into())]);
    }

    #[test]
    fn test_conversion_and_spec() {
        let parts = parse_fstring("{x!r:>8}{y:.2f}", 1, 1, 0).unwrap();
        assert!(matches!(&parts[0], FStringPart::Field { conversion: Some('r'), format_spec: Some(spec), .. } if spec == ">8"));
        assert!(matches!(&parts[1], FStringPart::Field { conversion: None, format_spec: Some(spec), .. } if spec == ".2f"));
    }

    #[test]
    fn test_not_equal_is_not_a_conversion() {
        let parts = parse_fstring("{a != b}", 1, 1, 0).unwrap();
        assert!(matches!(&parts[0], FStringPart::Field { value, conversion: None, .. }
            if matches!(value.as_ref(), Expr::Compare { .. })));
    }

    #[test]
    fn test_nested_quotes_and_brackets() {
        let parts = parse_fstring("{d['}']}", 1, 1, 0).unwrap();
        assert!(matches!(&parts[0], FStringPart::Field { value, .. }
            if matches!(value.as_ref(), Expr::Subscript { .. })));
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            parse_fstring("{}", 1, 1, 0).unwrap_err().message(),
            "f-string: empty expression not allowed"
        );
        assert_eq!(
            parse_fstring("a}", 1, 1, 0).unwrap_err().message(),
            "f-string: single '}' is not allowed"
        );
        assert_eq!(
            parse_fstring("{x", 1, 1, 0).unwrap_err().message(),
            "f-string: expecting '}'"
        );
    }
}
