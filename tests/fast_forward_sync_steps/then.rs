//! Then steps for fast-forward synchronisation scenarios.

use super::world::{ORIGIN_REPO, SyncWorld, run_async};
use refsync::sync::{
    domain::{SyncRun, SyncTaskKey},
    ports::SyncRunRepository,
};
use rstest_bdd_macros::then;

fn last_run(world: &SyncWorld) -> Result<&SyncRun, eyre::Report> {
    match world.last_run.as_ref() {
        Some(Ok(run)) => Ok(run),
        Some(Err(err)) => Err(eyre::eyre!("execution recorded no run: {err}")),
        None => Err(eyre::eyre!("no task was executed")),
    }
}

#[then(r#"the run status is "{status}""#)]
fn run_status_is(world: &SyncWorld, status: String) -> Result<(), eyre::Report> {
    let run = last_run(world)?;
    if run.status().as_str() != status {
        return Err(eyre::eyre!(
            "expected status {status}, found {} ({:?})",
            run.status().as_str(),
            run.error()
        ));
    }
    Ok(())
}

#[then(r#"the run commit range is "{labels}""#)]
fn run_commit_range_is(world: &SyncWorld, labels: String) -> Result<(), eyre::Report> {
    let expected = labels
        .split("..")
        .map(|label| world.commit(label).map(|hash| hash.to_string()))
        .collect::<Result<Vec<_>, _>>()?
        .join("..");
    let run = last_run(world)?;
    if run.commit_range() != expected {
        return Err(eyre::eyre!(
            "expected commit range {expected}, found {}",
            run.commit_range()
        ));
    }
    Ok(())
}

#[then("the run commit range is empty")]
fn run_commit_range_is_empty(world: &SyncWorld) -> Result<(), eyre::Report> {
    let run = last_run(world)?;
    if !run.commit_range().is_empty() {
        return Err(eyre::eyre!(
            "expected an empty commit range, found {}",
            run.commit_range()
        ));
    }
    Ok(())
}

#[then(r#"origin branch "{branch}" points at commit "{label}""#)]
fn origin_branch_points_at(
    world: &SyncWorld,
    branch: String,
    label: String,
) -> Result<(), eyre::Report> {
    let expected = world.commit(&label)?;
    let actual = world.head(ORIGIN_REPO, &branch)?;
    if actual.as_ref() != Some(&expected) {
        return Err(eyre::eyre!(
            "expected origin {branch} at {expected}, found {actual:?}"
        ));
    }
    Ok(())
}

#[then(r#"the task "{key}" has {count:usize} recorded runs"#)]
fn task_has_runs(world: &SyncWorld, key: String, count: usize) -> Result<(), eyre::Report> {
    let task_key = SyncTaskKey::new(key)?;
    let history = run_async(world.runs.list_for_task(&task_key, count.saturating_add(10)))?;
    if history.len() != count {
        return Err(eyre::eyre!(
            "expected {count} runs, found {}",
            history.len()
        ));
    }
    Ok(())
}
