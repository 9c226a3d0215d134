//! When steps for fast-forward synchronisation scenarios.

use super::world::{SyncWorld, run_async};
use refsync::sync::domain::{SyncTaskKey, TriggerSource};
use rstest_bdd_macros::when;

#[when(r#"the task "{key}" is executed"#)]
fn execute_task(world: &mut SyncWorld, key: String) -> Result<(), eyre::Report> {
    let task_key = SyncTaskKey::new(key)?;
    let result = run_async(world.executor.execute_by_key(&task_key, TriggerSource::Manual));
    world.last_run = Some(result);
    Ok(())
}
