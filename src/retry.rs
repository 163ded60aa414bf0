//! Bounded retry of read-modify-write cycles that lost an optimistic concurrency race.

use std::future::Future;

use tracing::{debug, warn};

use crate::store::StoreError;

/// Errors that can tell a lost optimistic concurrency race apart from other failures.
pub trait ConflictError {
    fn is_conflict(&self) -> bool;
}

impl ConflictError for StoreError {
    fn is_conflict(&self) -> bool {
        StoreError::is_conflict(self)
    }
}

/// Runs `operation` until it succeeds, fails with anything but a conflict, or has been
/// retried `max_retries` times after conflicts.
///
/// Each attempt must re-read the object it writes; retrying a write of the same stale
/// copy would conflict forever.
pub async fn retry_on_conflict<F, Fut, T, E>(max_retries: u32, operation_name: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: ConflictError + std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_conflict() && attempt < max_retries => {
                attempt += 1;
                debug!("{operation_name}: conflict on attempt {attempt}, retrying with a fresh copy: {e}");
            },
            Err(e) => {
                if e.is_conflict() {
                    warn!("{operation_name}: giving up after {} conflicting attempts: {e}", attempt + 1);
                }
                return Err(e);
            },
        }
    }
}
