//! Per-reconciliation results that end up in policy status.

use crate::{topology::TargetError, PolicyRef};
use std::collections::{BTreeMap, BTreeSet};

/// Collects what a single reconciliation learned about each policy. Built
/// fresh by each caller and never shared between runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    /// Route-level policies and the gateway-level overrides superseding them.
    pub affected_by: BTreeMap<PolicyRef, BTreeSet<PolicyRef>>,
    pub diagnostics: BTreeMap<PolicyRef, Vec<Diagnostic>>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    #[error("target {0} was not found")]
    TargetNotFound(String),

    #[error("{0} is not a supported target kind")]
    UnsupportedTargetKind(String),

    #[error("conflicts with {winner}, which takes precedence")]
    Conflicted { winner: PolicyRef },

    #[error("overridden by {by}")]
    Overridden { by: PolicyRef },

    #[error("no route is governed by this policy")]
    Unenforced,
}

impl Report {
    pub fn record(&mut self, policy: PolicyRef, diagnostic: Diagnostic) {
        let diagnostics = self.diagnostics.entry(policy).or_default();
        if !diagnostics.contains(&diagnostic) {
            diagnostics.push(diagnostic);
        }
    }

    pub fn record_affected(&mut self, policy: PolicyRef, by: PolicyRef) {
        self.affected_by.entry(policy).or_default().insert(by);
    }

    pub fn diagnostics(&self, policy: &PolicyRef) -> &[Diagnostic] {
        self.diagnostics
            .get(policy)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The overrides superseding `policy`, if any.
    pub fn affected_by(&self, policy: &PolicyRef) -> impl Iterator<Item = &PolicyRef> {
        self.affected_by.get(policy).into_iter().flatten()
    }
}

impl From<&TargetError> for Diagnostic {
    fn from(error: &TargetError) -> Self {
        match error {
            TargetError::NotFound { kind, id } => Self::TargetNotFound(format!("{kind} {id}")),
            TargetError::UnsupportedKind { group, kind } if group.is_empty() => {
                Self::UnsupportedTargetKind(kind.clone())
            }
            TargetError::UnsupportedKind { group, kind } => {
                Self::UnsupportedTargetKind(format!("{kind}.{group}"))
            }
        }
    }
}
