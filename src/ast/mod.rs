//! SQL DOM: the dialect independent statement tree and its compiler.
//!
//! ```text
//! query::Provider tree
//!       ↓
//! SQL Compiler            (crate::query)
//!       ↓
//! SQL DOM                 (types.rs, node.rs)
//!       ↓
//! Rewrite passes          (optimizer.rs)
//!       ↓
//! Text compiler           (compiler.rs)
//!       ↓
//! Post-compile chain      (crate::postcompile)
//! ```
pub mod compiler;
pub mod node;
pub mod optimizer;
pub mod types;
pub mod visitor;

// Re-export key types for convenience
pub use compiler::compile;
pub use node::{CloneContext, NodeId, SqlRef};
pub use optimizer::{OptimizationPass, Optimizer};
pub use types::*;
pub use visitor::{count_nodes, NodeCount, ParameterCollector, SqlVisitor};
