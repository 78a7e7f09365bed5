//! Discarded-branch check
//!
//! A pass-through keeps one input of a rewritten node and drops the rest. That
//! is only safe when nothing the outputs need was reachable solely through a
//! dropped input. This module compares reachability before and after a
//! rewrite and reports each dependency the rewrite severed. Dropped constant
//! operands (axes, split sizes) are not branches and never count.

use crate::error::{ExtractError, RewriteError};
use crate::extract::reachable;
use crate::rewrite::RewriteRecord;
use gsurgery_graph::{Graph, NameIndex};
use serde::{Deserialize, Serialize};

/// What to do when a rewrite severs a dependency
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchCheck {
    /// Skip the check
    Off,
    /// Log each severed dependency and continue
    Warn,
    /// Fail on the first severed dependency
    #[default]
    Error,
}

/// Producer that became unreachable because `node` dropped it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeveredBranch {
    pub node: String,
    pub producer: String,
}

/// Result of [`check_discarded_branches`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchReport {
    /// Rewritten nodes still reachable from the outputs
    pub checked: usize,
    pub severed: Vec<SeveredBranch>,
}

impl BranchReport {
    /// Whether no dependency was severed
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.severed.is_empty()
    }

    /// Apply `policy` to this report
    ///
    /// # Errors
    /// [`RewriteError::SeveredDependency`] for the first severed branch under
    /// [`BranchCheck::Error`]
    pub fn enforce(self, policy: BranchCheck) -> Result<Self, RewriteError> {
        match policy {
            BranchCheck::Off => {}
            BranchCheck::Warn => {
                for branch in &self.severed {
                    tracing::warn!(
                        node = %branch.node,
                        producer = %branch.producer,
                        "rewrite severed a required producer"
                    );
                }
            }
            BranchCheck::Error => {
                if let Some(branch) = self.severed.first() {
                    return Err(RewriteError::SeveredDependency {
                        node: branch.node.clone(),
                        producer: branch.producer.clone(),
                    });
                }
            }
        }
        Ok(self)
    }
}

/// Find producers a rewrite cut off from `outputs`
///
/// For each record whose node is reachable from `outputs` in `after`, every
/// discarded producer that was reachable in `before` must still be reachable
/// in `after`, unless its operator is one of `constant_ops`.
///
/// # Errors
/// [`ExtractError`] when `outputs` cannot be traversed in either graph
pub fn check_discarded_branches<S: AsRef<str>>(
    before: &Graph,
    after: &Graph,
    records: &[RewriteRecord],
    outputs: &[S],
    constant_ops: &[String],
) -> Result<BranchReport, ExtractError> {
    let needed_before = reachable(before, outputs)?;
    let needed_after = reachable(after, outputs)?;
    let index = NameIndex::build(before);
    let is_constant = |name: &str| {
        index
            .get(name)
            .is_some_and(|pos| constant_ops.contains(&before.nodes()[pos].op))
    };

    let mut report = BranchReport::default();
    for record in records {
        if !needed_after.contains(&record.node) {
            continue;
        }
        report.checked += 1;
        for input in &record.discarded {
            let producer = input.producer();
            if needed_before.contains(producer)
                && !needed_after.contains(producer)
                && !is_constant(producer)
            {
                report.severed.push(SeveredBranch {
                    node: record.node.clone(),
                    producer: producer.to_string(),
                });
            }
        }
    }

    tracing::debug!(
        checked = report.checked,
        severed = report.severed.len(),
        "checked discarded branches"
    );
    Ok(report)
}
