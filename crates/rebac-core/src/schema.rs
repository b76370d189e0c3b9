//! Namespace schema language: parsing and validation

pub mod parser;
pub mod validation;

pub use parser::parse_schema;
pub use validation::{validate_namespace, validate_schema, SchemaError};
