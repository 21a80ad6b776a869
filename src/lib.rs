//! # class-registrar
//!
//! Discovers component classes on a JVM class path and registers them by the
//! integer type key of their marker annotation.
//!
//! ## Architecture
//!
//! - **classpath**: Class path entries (directories, jar/zip archives, memory) and resource listing
//! - **classfile**: Class file metadata decoding without loading or linking
//! - **reader**: Package listing as class descriptors
//! - **filter**: Pluggable candidate predicates (marker annotation by default)
//! - **resolve**: Resolution of matched classes to loadable types
//! - **scanner**: Per-call scan producing a type key → candidate mapping
//! - **registry**: Process-wide registry and its merge policy
//! - **bootstrap**: Startup registration driven by [`config::RegistrarConfig`]
//! - **config** / **cli**: Configuration resolution and the command line surface

pub mod bootstrap;
pub mod classfile;
pub mod classpath;
pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod model;
pub mod reader;
pub mod registry;
pub mod resolve;
pub mod scanner;

#[cfg(test)]
mod testutil;

pub use bootstrap::{Registrar, RegistrationReport};
pub use error::{DecodeError, ScanError};
pub use model::{CandidateMap, CandidateType, ClassDescriptor, TypeKey};
pub use registry::{ComponentRegistry, KeyConflictPolicy, MergeReport};
pub use scanner::{PackageScanner, ScanReport};
