//! Domain model for symscope
//!
//! Address and process id types plus the error enums shared by every
//! symbol source.

pub mod errors;
pub mod types;

pub use types::{Addr, Pid};

pub use errors::{ExportError, LoadError, SymbolizeError};
