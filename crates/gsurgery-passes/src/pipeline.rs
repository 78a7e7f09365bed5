//! Configured sequence of passes
//!
//! A [`Pipeline`] runs the stages its [`PipelineConfig`] lists, in order, each
//! on the graph the previous stage produced. The first failure aborts the run
//! and no partial result is returned.
//!
//! # Example
//!
//! ```toml
//! stages = ["sanitize", "extract", "rewrite"]
//! outputs = ["head/conv"]
//! branch_check = "warn"
//!
//! [[rules]]
//! op = "*"
//! drop = ["explicit_paddings"]
//!
//! [rewrite]
//! disallowed = ["Softmax", "ConcatV2"]
//! select = { ConcatV2 = { index = 0, min_inputs = 2 } }
//! ```

use crate::branch::{check_discarded_branches, BranchCheck, BranchReport};
use crate::classify::{classify, Report, Taxonomy};
use crate::config::load_config;
use crate::error::{ConfigError, SurgeryResult};
use crate::extract::extract;
use crate::rewrite::{rewrite, RewriteRecord, RewriteRules};
use crate::sanitize::{sanitize, AttributeRules};
use gsurgery_graph::Graph;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// One pass in a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Sanitize,
    Extract,
    Rewrite,
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sanitize => "sanitize",
            Self::Extract => "extract",
            Self::Rewrite => "rewrite",
        })
    }
}

/// Pipeline definition; every section is optional
///
/// Omitted tables fall back to [`AttributeRules::tf2_compat`],
/// [`Taxonomy::vitis_ai`] and [`RewriteRules::vitis_ai`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub stages: Vec<Stage>,
    /// Output names for extraction and the branch check
    pub outputs: Vec<String>,
    /// Attribute-drop rules for the sanitize stage
    pub rules: AttributeRules,
    /// Taxonomy for the final report
    pub taxonomy: Taxonomy,
    pub rewrite: RewriteRules,
    pub branch_check: BranchCheck,
}

impl PipelineConfig {
    /// Load from a TOML, YAML or JSON file
    ///
    /// # Errors
    /// See [`load_config`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_config(path)
    }

    /// Check that the stage list can run
    ///
    /// # Errors
    /// [`ConfigError::MissingOutputs`] for an extract stage with no outputs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.contains(&Stage::Extract) && self.outputs.is_empty() {
            return Err(ConfigError::MissingOutputs);
        }
        Ok(())
    }
}

/// What one stage did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    pub stage: Stage,
    pub nodes_before: usize,
    pub nodes_after: usize,
    /// Attributes dropped, nodes removed or nodes rewritten
    pub changed: usize,
}

/// Result of [`Pipeline::run`]
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub graph: Graph,
    pub stages: Vec<StageSummary>,
    pub rewrites: Vec<RewriteRecord>,
    /// Present when a rewrite ran, outputs are known and the check is on
    pub branches: Option<BranchReport>,
    /// Classification of the final graph
    pub report: Report,
}

/// Validated pipeline, ready to run
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Validate `config`
    ///
    /// # Errors
    /// See [`PipelineConfig::validate`]
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Load and validate a pipeline file
    ///
    /// # Errors
    /// Any [`ConfigError`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::new(PipelineConfig::from_path(path)?)
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run every stage on `graph`
    ///
    /// # Errors
    /// The first stage failure, or a severed dependency under
    /// [`BranchCheck::Error`]
    pub fn run(&self, graph: &Graph) -> SurgeryResult<PipelineOutcome> {
        let config = &self.config;
        let mut current = graph.clone();
        let mut stages = Vec::with_capacity(config.stages.len());
        let mut rewrites = Vec::new();
        let mut before_rewrite: Option<Graph> = None;

        for &stage in &config.stages {
            let nodes_before = current.len();
            let span = tracing::info_span!("stage", %stage);
            let _enter = span.enter();

            let changed = match stage {
                Stage::Sanitize => {
                    let outcome = sanitize(&current, &config.rules);
                    current = outcome.graph;
                    outcome.fixed
                }
                Stage::Extract => {
                    let next = extract(&current, &config.outputs)?;
                    let removed = nodes_before - next.len();
                    current = next;
                    removed
                }
                Stage::Rewrite => {
                    let outcome = rewrite(&current, &config.rewrite)?;
                    before_rewrite.get_or_insert_with(|| current.clone());
                    current = outcome.graph;
                    rewrites.extend(outcome.records);
                    outcome.rewritten
                }
            };

            tracing::info!(nodes_before, nodes_after = current.len(), changed, "stage complete");
            stages.push(StageSummary {
                stage,
                nodes_before,
                nodes_after: current.len(),
                changed,
            });
        }

        let branches = match before_rewrite {
            Some(before)
                if config.branch_check != BranchCheck::Off && !config.outputs.is_empty() =>
            {
                let report = check_discarded_branches(
                    &before,
                    &current,
                    &rewrites,
                    &config.outputs,
                    &config.taxonomy.hazards().constant_ops,
                )?;
                Some(report.enforce(config.branch_check)?)
            }
            _ => None,
        };

        let report = classify(&current, &config.taxonomy);
        Ok(PipelineOutcome {
            graph: current,
            stages,
            rewrites,
            branches,
            report,
        })
    }
}
