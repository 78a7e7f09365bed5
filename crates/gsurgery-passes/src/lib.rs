//! Graph surgery passes
//!
//! Every pass borrows a graph and returns a new one (or a report); none of
//! them touch the filesystem.
//!
//! # Core Concepts
//!
//! - [`sanitize`]: drop attributes older consumers reject
//! - [`classify`]: read-only compatibility [`Report`] with dynamic-shape hazards
//! - [`extract`]: keep only what a set of outputs needs
//! - [`rewrite`]: replace disallowed operators with pass-through nodes
//! - [`check_discarded_branches`]: prove a rewrite dropped nothing the outputs need
//! - [`Pipeline`]: configured sequence of the above
//!
//! # Example
//!
//! ```rust
//! use gsurgery_graph::{Graph, Node};
//! use gsurgery_passes::{classify, extract, rewrite, RewriteRules, Taxonomy};
//!
//! let graph = Graph::from_nodes(vec![
//!     Node::new("x", "Placeholder"),
//!     Node::new("attn", "Softmax").input("x"),
//!     Node::new("out", "Identity").input("attn"),
//!     Node::new("debug", "Identity").input("x"),
//! ]);
//!
//! let graph = extract(&graph, &["out"]).unwrap();
//! let outcome = rewrite(&graph, &RewriteRules::vitis_ai()).unwrap();
//! assert_eq!(outcome.rewritten, 1);
//! assert!(classify(&outcome.graph, &Taxonomy::vitis_ai()).disallowed.is_empty());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod branch;
mod classify;
mod config;
mod error;
mod extract;
mod loader;
mod pipeline;
mod rewrite;
mod sanitize;

pub use branch::{check_discarded_branches, BranchCheck, BranchReport, SeveredBranch};
pub use classify::{
    classify, Category, Hazard, HazardKind, HazardRules, Occurrence, Report, ReportSink, Taxonomy,
    TaxonomyFile,
};
pub use config::{load_config, ConfigFormat};
pub use error::{ConfigError, ExtractError, RewriteError, SurgeryError, SurgeryResult};
pub use extract::{extract, reachable, ReachableSet};
pub use loader::{candidates, Candidates, LoadedModel, ModelLoader, StoreLoader, INPUT_OP};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutcome, Stage, StageSummary};
pub use rewrite::{rewrite, InputSelection, RewriteOutcome, RewriteRecord, RewriteRules};
pub use sanitize::{sanitize, AttributeRule, AttributeRules, SanitizeOutcome, ANY_OP};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
