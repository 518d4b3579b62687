//! Instructor operations gated by the static shared secret.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::aggregation::AggregationStore;
use crate::config::CourseConfig;
use crate::ledger::{AttemptLedger, LedgerPage};
use crate::persist::{KeyValueStore, StoreError, WarningSink};
use crate::puzzle::PuzzleBoard;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdminError {
    #[error("admin secret rejected")]
    Denied,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Lowercase hex SHA-256 of `secret`.
#[must_use]
pub fn secret_digest(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}

/// Whether `secret` matches the configured digest.
#[must_use]
pub fn verify_secret(secret: &str, cfg: &CourseConfig) -> bool {
    secret_digest(secret).eq_ignore_ascii_case(cfg.admin_secret_sha256.trim())
}

/// Class-scoped maintenance. Only obtainable with the right secret.
#[derive(Debug, Clone)]
pub struct AdminConsole<S> {
    ledger: AttemptLedger<S>,
    pool: AggregationStore<S>,
    board: PuzzleBoard<S>,
}

impl<S: KeyValueStore + Clone> AdminConsole<S> {
    /// # Errors
    ///
    /// Returns [`AdminError::Denied`] if `secret` does not match.
    pub fn unlock(store: S, cfg: &CourseConfig, secret: &str) -> Result<Self, AdminError> {
        if !verify_secret(secret, cfg) {
            log::warn!("admin access denied");
            return Err(AdminError::Denied);
        }
        log::info!("admin console unlocked");
        Ok(Self {
            ledger: AttemptLedger::new(store.clone(), cfg.ledger_capacity, WarningSink::default()),
            pool: AggregationStore::new(store.clone()),
            board: PuzzleBoard::new(store, WarningSink::default()),
        })
    }

    /// A page of the class-wide attempt log, oldest first.
    #[must_use]
    pub fn ledger_page(&self, offset: usize, limit: usize) -> LedgerPage {
        self.ledger.page(offset, limit)
    }

    /// # Errors
    ///
    /// Returns [`AdminError::Store`] if the store rejects the delete.
    pub fn clear_ledger(&self) -> Result<(), AdminError> {
        self.ledger.clear()?;
        log::info!("class-wide attempt log cleared");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`AdminError::Store`] if the store rejects the delete.
    pub fn clear_completions(&self) -> Result<(), AdminError> {
        self.pool.clear()?;
        log::info!("completion pool cleared");
        Ok(())
    }

    /// Retract the puzzle solved flag.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Store`] if the store rejects the delete.
    pub fn clear_puzzle(&self) -> Result<(), AdminError> {
        self.board.clear()?;
        log::info!("puzzle solved flag cleared");
        Ok(())
    }
}
