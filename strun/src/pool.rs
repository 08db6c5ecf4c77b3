//! Exclusive environment locks.
//!
//! The pool is the only state shared between suites: an environment
//! identifier is either free or held by exactly one suite. Every operation
//! takes the same mutex, so the pool stays correct even if admission is
//! ever driven from several threads.

use strun_common::{EnvId, ErrorCode};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::trace;

/// Misuse of the pool. Always a scheduler bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("protocol error: release of environment '{env}' which is not locked")]
    NotLocked { env: EnvId },
}

impl PoolError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ProtocolViolation
    }
}

/// Set of currently locked environment identifiers.
#[derive(Debug, Default)]
pub struct EnvironmentPool {
    locked: Mutex<BTreeSet<EnvId>>,
}

impl EnvironmentPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, BTreeSet<EnvId>> {
        // The set is never left half-updated, so a poisoned lock is still valid.
        self.locked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock `env` if it is free. Returns whether the lock was acquired.
    pub fn try_lock(&self, env: &EnvId) -> bool {
        let acquired = self.guard().insert(env.clone());
        trace!(%env, acquired, "pool: try_lock");
        acquired
    }

    /// Unlock `env`.
    ///
    /// Releasing an environment that is not locked is a protocol error.
    pub fn release(&self, env: &EnvId) -> Result<(), PoolError> {
        if self.guard().remove(env) {
            trace!(%env, "pool: released");
            Ok(())
        } else {
            Err(PoolError::NotLocked { env: env.clone() })
        }
    }

    pub fn is_locked(&self, env: &EnvId) -> bool {
        self.guard().contains(env)
    }

    /// Snapshot of locked identifiers in sorted order.
    pub fn locked(&self) -> Vec<EnvId> {
        self.guard().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}
