//! Core resolution pipeline.

pub mod analyzer;
pub mod batch;
pub mod codegen;
pub mod fingerprint;
pub mod lexer;
pub mod optimizer;
pub mod parser;
pub mod resolver;
pub mod transformer;
pub mod types;
pub mod validator;
