//! Testing utilities for commit atomicity
//!
//! A [`FaultPlan`] makes the store fail in the middle of applying a batch,
//! after some records have already been written. Tests use it to observe
//! that a failed commit leaves no partial state behind.
//!
//! # Example
//!
//! ```ignore
//! use entitystore_storage::testing::FaultPlan;
//! use entitystore_storage::TypePartitionedStore;
//!
//! let plan = FaultPlan::fail_at_step(3);
//! let store = TypePartitionedStore::with_fault_plan(SchemaRegistry::new(), plan.clone());
//! // ... prepare a batch of five writes, commit fails, store unchanged
//! assert_eq!(plan.triggered(), 1);
//! ```

use entitystore_core::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct FaultState {
    /// 1-based apply step to fail at; `None` when disarmed
    fail_at: Option<usize>,
    /// Number of faults raised so far
    triggered: usize,
}

/// Deterministic fault injection for batch application
///
/// Apply steps are numbered from 1 within each commit: removals first, then
/// inserts, then updates. An armed plan fires once and then disarms itself.
/// Clones share state, so a test can keep a handle to a plan it gave away.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    state: Arc<Mutex<FaultState>>,
}

impl FaultPlan {
    /// A plan that never fails
    pub fn none() -> Self {
        Self::default()
    }

    /// A plan that fails the `step`-th apply step of the next commit that reaches it
    pub fn fail_at_step(step: usize) -> Self {
        let plan = Self::default();
        plan.arm(step);
        plan
    }

    /// Arm (or re-arm) the plan
    pub fn arm(&self, step: usize) {
        self.state.lock().fail_at = Some(step.max(1));
    }

    /// Disarm without firing
    pub fn disarm(&self) {
        self.state.lock().fail_at = None;
    }

    /// Whether a fault is pending
    pub fn is_armed(&self) -> bool {
        self.state.lock().fail_at.is_some()
    }

    /// Number of faults raised so far
    pub fn triggered(&self) -> usize {
        self.state.lock().triggered
    }

    /// Called by the store before each apply step
    pub(crate) fn before_step(&self, step: usize) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.fail_at == Some(step) {
            state.fail_at = None;
            state.triggered += 1;
            return Err(StoreError::storage(format!(
                "injected fault at apply step {}",
                step
            )));
        }
        Ok(())
    }
}
