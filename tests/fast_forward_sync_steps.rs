//! Behaviour tests for fast-forward branch synchronisation.

#[path = "fast_forward_sync_steps/mod.rs"]
mod fast_forward_sync_steps_defs;

use fast_forward_sync_steps_defs::world::{SyncWorld, world};
use rstest_bdd_macros::scenario;

#[scenario(
    path = "tests/features/fast_forward_sync.feature",
    name = "Local commits are fast-forwarded to origin"
)]
#[tokio::test(flavor = "multi_thread")]
async fn local_commits_are_fast_forwarded(world: SyncWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/fast_forward_sync.feature",
    name = "A second run finds nothing to push"
)]
#[tokio::test(flavor = "multi_thread")]
async fn second_run_is_up_to_date(world: SyncWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/fast_forward_sync.feature",
    name = "Diverged branches are left untouched"
)]
#[tokio::test(flavor = "multi_thread")]
async fn diverged_branches_are_left_untouched(world: SyncWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/fast_forward_sync.feature",
    name = "A missing target branch is created"
)]
#[tokio::test(flavor = "multi_thread")]
async fn missing_target_branch_is_created(world: SyncWorld) {
    let _ = world;
}
