pub mod generator;
pub mod grammar;
pub mod optimizer;
pub mod parser;
pub mod policy;
pub mod program;
pub mod validator;

pub use generator::{Draw, FormulaGenerator, SampledProgram};
pub use grammar::{DecodeState, Grammar};
pub use optimizer::Adam;
pub use parser::{count_names, parse_formula, MAX_FORMULA_NAMES};
pub use policy::{PolicyNetwork, PolicyParams, PolicyShape};
pub use program::Program;
pub use validator::{canonicalize, InvalidReason, ProgramValidator, Validation};
