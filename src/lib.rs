//! Build tar archives from explicit `SRC[:DEST[:OPTS]]` path mappings.
//!
//! The [`cmdline`] module drives a run token by token; [`builder::Archiver`] does the actual work
//! of turning sources into entries, and [`archive`] owns the on-disk tar encoding.

pub mod archive;
pub mod builder;
pub mod cmdline;
pub mod concat;
pub mod error;
pub mod header;
pub mod identity;
pub mod mapping;
pub mod matcher;
pub mod metadata;
pub mod options;
pub mod util;
pub mod walk;

#[cfg(test)]
mod test;

pub use error::{Error, Result};
