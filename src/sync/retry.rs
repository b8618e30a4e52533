//! Bounded retry wrappers around a [`VersionControl`].
//!
//! Only transient failures ([`FailureKind::is_transient`]) are retried. The
//! wait before retry `n` (0-based) is `base_delay × 2^n`. Anything else
//! returns on the spot without using up the remaining attempts.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Error, FailureKind, Result};

use super::git::VersionControl;
use super::types::{CONFLICT_COMMIT_MESSAGE, MergeOutcome, PullOutcome, PushOutcome, SyncResult};

/// Largest exponent applied to the base delay.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Wait before retrying after failed attempt `attempt` (0-based).
#[must_use]
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1 << attempt.min(MAX_BACKOFF_EXPONENT))
}

/// Whole milliseconds, saturating, for log fields.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Pull, retrying transient failures with exponential backoff.
///
/// An unreachable remote ([`PullOutcome::Offline`]) counts as transient, so
/// it never reaches the caller. Conflicts are returned for the caller to
/// resolve.
///
/// # Errors
///
/// Returns the first non-transient error, or [`Error::RetriesExhausted`]
/// once `max_attempts` transient failures have happened.
pub async fn pull_with_retry<V: VersionControl>(
    vcs: &V,
    max_attempts: u32,
    base_delay: Duration,
) -> Result<MergeOutcome> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        let failure = match vcs.pull().await {
            Ok(PullOutcome::Pulled) => return Ok(merged(MergeOutcome::Clean, attempt)),
            Ok(PullOutcome::Conflicts(paths)) => {
                return Ok(merged(MergeOutcome::Conflicts(paths), attempt));
            }
            Ok(PullOutcome::Offline(message)) => message,
            Err(e) if e.is_transient() => e.to_string(),
            Err(e) => return Err(e),
        };

        attempt += 1;
        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %failure, "Pull retries exhausted");
            return Err(Error::RetriesExhausted {
                attempts: attempt,
                last: failure,
            });
        }

        let delay = backoff_delay(base_delay, attempt - 1);
        warn!(
            attempt,
            delay_ms = millis(delay),
            error = %failure,
            "Pull failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

fn merged(outcome: MergeOutcome, failed_attempts: u32) -> MergeOutcome {
    if failed_attempts > 0 {
        info!(attempts = failed_attempts + 1, "Pull succeeded after retry");
    }
    outcome
}

/// Push local commits, pulling and merging whenever the remote has moved.
///
/// Each attempt pushes; on a rejected push it pulls, resolves and commits
/// any conflicts, and goes round again. Transient failures back off first.
/// Never returns an error: failures end up in [`SyncResult::error`].
pub async fn sync_with_retry<V: VersionControl>(
    vcs: &V,
    max_attempts: u32,
    base_delay: Duration,
) -> SyncResult {
    let max_attempts = max_attempts.max(1);
    let mut resolved = Vec::new();
    let mut last_failure = String::from("remote kept moving");

    for attempt in 0..max_attempts {
        debug!(attempt = attempt + 1, "Push attempt");

        match push_or_merge(vcs, &mut resolved).await {
            Ok(true) => return SyncResult::succeeded(resolved),
            Ok(false) => {
                last_failure = "push rejected, remote has new commits".to_string();
            }
            Err(e) if e.is_transient() => {
                last_failure = e.to_string();
                if attempt + 1 < max_attempts {
                    let delay = backoff_delay(base_delay, attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = millis(delay),
                        error = %e,
                        "Push cycle failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => {
                warn!(error = %e, "Push cycle failed");
                return SyncResult::failed(e.to_string());
            }
        }
    }

    let err = Error::RetriesExhausted {
        attempts: max_attempts,
        last: last_failure,
    };
    warn!(error = %err, "Push retries exhausted");
    SyncResult::failed(err.to_string())
}

/// One push attempt. `Ok(true)` when pushed, `Ok(false)` after merging
/// remote changes that still need pushing.
async fn push_or_merge<V: VersionControl>(vcs: &V, resolved: &mut Vec<String>) -> Result<bool> {
    if vcs.push().await? == PushOutcome::Pushed {
        return Ok(true);
    }

    match vcs.pull().await? {
        PullOutcome::Pulled => {}
        PullOutcome::Conflicts(paths) => {
            for path in &paths {
                vcs.resolve_conflict(path).await?;
            }
            vcs.commit(CONFLICT_COMMIT_MESSAGE).await?;
            info!(count = paths.len(), "Resolved conflicts during push");
            resolved.extend(paths);
        }
        PullOutcome::Offline(message) => {
            return Err(Error::transport(FailureKind::Network, message));
        }
    }
    Ok(false)
}
