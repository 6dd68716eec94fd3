pub mod operators;
pub mod primitives;
pub mod registry;
pub mod timeseries;

pub use operators::{OpKind, Operator, OperatorCategory};
pub use registry::OperatorRegistry;
