//! Graph context and structural passes
//!
//! [`GraphContext`] provides efficient lookups over a borrowed graph;
//! [`cleanup`] is the mandatory dead-code-elimination and re-topologizing
//! pass every structural mutation must finish with.

pub mod cleanup;
pub mod context;
pub mod maps;

pub use cleanup::CleanupStats;
pub use context::GraphContext;
