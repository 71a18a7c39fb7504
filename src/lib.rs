//! avm-resolve: rewrite raw Bicep resources into verified module calls.
//!
//! Scans a template, replaces catalogued resource declarations with module
//! calls, repairs every reference to them, validates the result and elides
//! params that equal the module's documented defaults.

pub mod catalog;
pub mod cli;
pub mod core;
pub mod error;

pub use crate::catalog::ModuleCatalog;
pub use crate::core::resolver::Resolver;
pub use crate::core::types::{PipelineResult, ResolveOptions};
pub use crate::error::{CatalogError, Error, ParseError};
