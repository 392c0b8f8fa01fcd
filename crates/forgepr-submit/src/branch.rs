// branch.rs — Branch Reconciler: make the source branch ready for writing.
//
// prepare() is idempotent. Re-running it with reset=false never moves an
// existing source branch, which is what lets several runs accumulate
// commits on the same branch. With reset=true the source is deleted and
// recreated from the target head; the two steps are not atomic, but a rerun
// after a crash in between simply finds the source absent and creates it.

use forgepr_changeset::Branch;

use crate::error::{Result, SubmitError};
use crate::provider::GitProvider;

/// Ensure `source` exists relative to `target` and return it.
///
/// - target absent → `BranchNotFound` (the target must pre-exist)
/// - source absent → created from the target head
/// - source present, `reset_if_exists` → deleted and recreated from the target head
/// - source present, no reset → returned as-is
pub async fn prepare(
    provider: &dyn GitProvider,
    source: &str,
    target: &str,
    reset_if_exists: bool,
) -> Result<Branch> {
    let target_branch = provider
        .get_branch(target)
        .await?
        .ok_or_else(|| SubmitError::BranchNotFound {
            branch: target.to_string(),
        })?;

    match provider.get_branch(source).await? {
        Some(existing) if reset_if_exists => {
            tracing::info!(
                "{}: resetting branch {} to {} ({})",
                provider.name(),
                source,
                target,
                target_branch.head_commit_id
            );
            provider.delete_branch(&existing.name).await?;
            provider
                .create_branch(source, &target_branch.head_commit_id)
                .await
        }
        Some(existing) => {
            tracing::info!(
                "{}: reusing branch {} at {}",
                provider.name(),
                source,
                existing.head_commit_id
            );
            Ok(existing)
        }
        None => {
            tracing::info!(
                "{}: creating branch {} from {} ({})",
                provider.name(),
                source,
                target,
                target_branch.head_commit_id
            );
            provider
                .create_branch(source, &target_branch.head_commit_id)
                .await
        }
    }
}
