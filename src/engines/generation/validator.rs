use super::program::Program;
use crate::functions::registry::OperatorRegistry;
use crate::types::Token;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidReason {
    Empty,
    UnknownToken {
        position: usize,
        id: u16,
    },
    Underflow {
        position: usize,
        required: usize,
        depth: usize,
    },
    Unclosed {
        depth: usize,
    },
    TooLong {
        len: usize,
        max: usize,
    },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty program"),
            Self::UnknownToken { position, id } => {
                write!(f, "unknown token id {} at position {}", id, position)
            }
            Self::Underflow {
                position,
                required,
                depth,
            } => write!(
                f,
                "stack underflow at position {}: operator needs {} operands, stack holds {}",
                position, required, depth
            ),
            Self::Unclosed { depth } => {
                write!(f, "program leaves {} values on the stack", depth)
            }
            Self::TooLong { len, max } => {
                write!(f, "program length {} exceeds maximum {}", len, max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Carries the canonical prefix rendering.
    Valid(String),
    Invalid(InvalidReason),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Stack-depth check of postfix programs.
pub struct ProgramValidator {
    registry: Arc<OperatorRegistry>,
    max_seq_len: usize,
}

impl ProgramValidator {
    /// `max_seq_len` should come from a validated `ModelConfig`, which keeps
    /// it within `MAX_FORMULA_NAMES` so canonical strings parse back.
    pub fn new(registry: Arc<OperatorRegistry>, max_seq_len: usize) -> Self {
        Self {
            registry,
            max_seq_len,
        }
    }

    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    pub fn validate(&self, program: &Program) -> Validation {
        self.validate_tokens(&program.tokens)
    }

    pub fn validate_tokens(&self, tokens: &[Token]) -> Validation {
        if tokens.len() > self.max_seq_len {
            return Validation::Invalid(InvalidReason::TooLong {
                len: tokens.len(),
                max: self.max_seq_len,
            });
        }
        if let Err(reason) = stack_depth(&self.registry, tokens) {
            return Validation::Invalid(reason);
        }
        match canonicalize(&self.registry, tokens) {
            Some(formula) => Validation::Valid(formula),
            None => Validation::Invalid(InvalidReason::Empty),
        }
    }
}

/// Simulate the stack; `Ok` only when exactly one value remains.
pub fn stack_depth(registry: &OperatorRegistry, tokens: &[Token]) -> Result<usize, InvalidReason> {
    if tokens.is_empty() {
        return Err(InvalidReason::Empty);
    }

    let mut depth = 0usize;
    for (position, token) in tokens.iter().enumerate() {
        let arity = registry.arity(*token).ok_or(InvalidReason::UnknownToken {
            position,
            id: token.0,
        })?;
        if depth < arity {
            return Err(InvalidReason::Underflow {
                position,
                required: arity,
                depth,
            });
        }
        depth = depth - arity + 1;
    }

    if depth != 1 {
        return Err(InvalidReason::Unclosed { depth });
    }
    Ok(depth)
}

/// Prefix rendering such as `ADD(RET, MA5(VOL))`. `None` when the tokens do
/// not form exactly one expression.
pub fn canonicalize(registry: &OperatorRegistry, tokens: &[Token]) -> Option<String> {
    let mut stack: Vec<String> = Vec::new();
    for token in tokens {
        let op = registry.get(*token)?;
        let arity = op.arity();
        if arity == 0 {
            stack.push(op.name.to_string());
            continue;
        }
        if stack.len() < arity {
            return None;
        }
        let args = stack.split_off(stack.len() - arity);
        stack.push(format!("{}({})", op.name, args.join(", ")));
    }

    if stack.len() == 1 {
        stack.pop()
    } else {
        None
    }
}
