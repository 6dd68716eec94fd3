//! Text formulas (`ADD(RET, MA5(VOL))`) to postfix programs.

use super::program::Program;
use crate::error::{AlphaMinerError, Result};
use crate::functions::registry::OperatorRegistry;
use crate::types::Token;
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "engines/generation/formula.pest"]
struct FormulaParser;

/// Most names or opening parentheses a text formula may contain. Parsing
/// recurses once per nesting level, so deeper input is refused up front.
pub const MAX_FORMULA_NAMES: usize = 128;

/// Number of identifiers in `input`, i.e. the token count of the formula
/// if it parses.
pub fn count_names(input: &str) -> usize {
    let mut count = 0;
    let mut in_name = false;
    for c in input.chars() {
        if in_name {
            in_name = c.is_ascii_alphanumeric() || c == '_';
        } else if c.is_ascii_alphabetic() {
            in_name = true;
            count += 1;
        }
    }
    count
}

/// Parse a prefix formula into postfix tokens. Names are case-insensitive.
pub fn parse_formula(input: &str, registry: &OperatorRegistry) -> Result<Program> {
    let names = count_names(input);
    let nesting = input.chars().filter(|&c| c == '(').count();
    if names > MAX_FORMULA_NAMES || nesting > MAX_FORMULA_NAMES {
        return Err(AlphaMinerError::MalformedFormula(format!(
            "formula too large: {} names, {} nested calls (limit {})",
            names, nesting, MAX_FORMULA_NAMES
        )));
    }

    let mut pairs = FormulaParser::parse(Rule::formula, input)
        .map_err(|e| AlphaMinerError::MalformedFormula(e.to_string()))?;

    let formula = pairs
        .next()
        .ok_or_else(|| AlphaMinerError::MalformedFormula("empty input".to_string()))?;

    let mut tokens = Vec::new();
    for pair in formula.into_inner() {
        if pair.as_rule() == Rule::expr {
            emit_postfix(pair, registry, &mut tokens)?;
        }
    }
    Ok(Program::new(tokens))
}

fn emit_postfix(pair: Pair<Rule>, registry: &OperatorRegistry, out: &mut Vec<Token>) -> Result<()> {
    let mut inner = pair.into_inner();
    let ident = inner
        .next()
        .ok_or_else(|| AlphaMinerError::MalformedFormula("missing name".to_string()))?;
    let name = ident.as_str();

    let op = registry
        .lookup(name)
        .ok_or_else(|| AlphaMinerError::MalformedFormula(format!("unknown name '{}'", name)))?;

    let mut given = 0;
    if let Some(args) = inner.next() {
        for arg in args.into_inner() {
            emit_postfix(arg, registry, out)?;
            given += 1;
        }
    }

    if given != op.arity() {
        return Err(AlphaMinerError::MalformedFormula(format!(
            "{} expects {} arguments, got {}",
            op.name,
            op.arity(),
            given
        )));
    }

    out.push(op.token);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::generation::validator::canonicalize;

    #[test]
    fn test_parse_emits_postfix() {
        let registry = OperatorRegistry::default();
        let program = parse_formula("ADD(RET, MA5(VOL))", &registry).unwrap();
        let expected: Vec<Token> = ["RET", "VOL", "MA5", "ADD"]
            .iter()
            .map(|n| registry.token_of(n).unwrap())
            .collect();
        assert_eq!(program.tokens, expected);
    }

    #[test]
    fn test_parse_is_whitespace_and_case_insensitive() {
        let registry = OperatorRegistry::default();
        let a = parse_formula("  div( ret ,\n std5(vol) ) ", &registry).unwrap();
        let b = parse_formula("DIV(RET, STD5(VOL))", &registry).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            canonicalize(&registry, &a.tokens).as_deref(),
            Some("DIV(RET, STD5(VOL))")
        );
    }

    #[test]
    fn test_parse_errors() {
        let registry = OperatorRegistry::default();
        for bad in ["", "ADD(RET)", "FOO(RET)", "ADD(RET, VOL", "RET VOL", "RET()", "SENTIMENT"] {
            assert!(
                matches!(
                    parse_formula(bad, &registry),
                    Err(AlphaMinerError::MalformedFormula(_))
                ),
                "expected failure for {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_count_names() {
        assert_eq!(count_names("ADD(RET, MA5(VOL))"), 4);
        assert_eq!(count_names("volume_chg"), 1);
        assert_eq!(count_names("  "), 0);
    }

    #[test]
    fn test_deeply_nested_input_is_refused() {
        let registry = OperatorRegistry::default();
        let deep = format!("{}RET{}", "NEG(".repeat(100_000), ")".repeat(100_000));
        assert!(matches!(
            parse_formula(&deep, &registry),
            Err(AlphaMinerError::MalformedFormula(_))
        ));

        let unclosed = "(".repeat(100_000);
        assert!(matches!(
            parse_formula(&unclosed, &registry),
            Err(AlphaMinerError::MalformedFormula(_))
        ));

        let at_limit = format!(
            "{}RET{}",
            "NEG(".repeat(MAX_FORMULA_NAMES - 1),
            ")".repeat(MAX_FORMULA_NAMES - 1)
        );
        assert_eq!(
            parse_formula(&at_limit, &registry).unwrap().len(),
            MAX_FORMULA_NAMES
        );
    }
}
