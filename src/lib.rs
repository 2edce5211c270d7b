//! Knowledge-graph extraction for TypeScript/JavaScript component codebases.
//!
//! A run walks a project, extracts every function, class, component and
//! exported variable as a [`graph::node::Definition`], records what each one
//! uses, links those forward edges across files into backward edges, and
//! writes one JSON record per Definition.
//!
//! Stages, in order: [`walker`], [`parser`] (with [`resolver`]), [`linker`],
//! [`emit`]. [`pipeline::run`] drives all of them.

pub mod config;
pub mod emit;
pub mod error;
pub mod graph;
pub mod language;
pub mod linker;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod walker;

pub use error::{GraphError, QualifiedNameCollision, Result};
