//! Mach-O file format handling.
//!
//! This module decodes the structures of Mach-O files, the executable format
//! used on macOS and iOS, from untrusted bytes: headers and fat containers,
//! load commands, segments and sections, symbol tables and code signatures.

mod commands;
mod constants;
mod cursor;
mod header;
mod report;
mod segment;
mod signature;
mod structs;
mod symbols;

#[cfg(test)]
pub(crate) mod testutil;

pub use commands::*;
pub use constants::*;
pub use cursor::*;
pub use header::*;
pub use report::*;
pub use segment::*;
pub use signature::*;
pub use structs::*;
pub use symbols::*;
