//! Given steps for fast-forward synchronisation scenarios.

use std::path::{Path, PathBuf};

use super::world::{ORIGIN_REPO, SyncWorld, WORK_REPO, run_async};
use eyre::WrapErr;
use refsync::sync::{
    domain::{
        BranchName, PushOptions, RemoteCredentials, RepositoryKey, SyncEndpoint, SyncTaskKey,
        SyncTaskSettings,
    },
    services::RepositoryRegistration,
};
use rstest_bdd_macros::given;

#[given(r#"a work repository registered as "{key}" with an origin remote"#)]
fn registered_work_repository(world: &mut SyncWorld, key: String) -> Result<(), eyre::Report> {
    world.git.init_repository(WORK_REPO)?;
    world.git.init_repository(ORIGIN_REPO)?;
    world
        .git
        .add_remote(Path::new(WORK_REPO), "origin", ORIGIN_REPO)?;
    run_async(world.service.register_repository(RepositoryRegistration {
        key: RepositoryKey::new(key)?,
        path: PathBuf::from(WORK_REPO),
        registered_url: None,
        credentials: RemoteCredentials::anonymous(),
    }))
    .wrap_err("register work repository")?;
    Ok(())
}

fn commit_on(
    world: &mut SyncWorld,
    repo: &str,
    branch: &str,
    label: String,
) -> Result<(), eyre::Report> {
    let file = format!("{label}.txt");
    let hash = world.git.commit(
        Path::new(repo),
        &BranchName::new(branch)?,
        &format!("commit {label}"),
        &[(file.as_str(), Some(label.as_str()))],
    )?;
    world.commits.insert(label, hash);
    Ok(())
}

#[given(r#"local branch "{branch}" gains commit "{label}""#)]
fn local_commit(world: &mut SyncWorld, branch: String, label: String) -> Result<(), eyre::Report> {
    commit_on(world, WORK_REPO, &branch, label)
}

#[given(r#"origin branch "{branch}" gains commit "{label}""#)]
fn origin_commit(world: &mut SyncWorld, branch: String, label: String) -> Result<(), eyre::Report> {
    commit_on(world, ORIGIN_REPO, &branch, label)
}

#[given(r#"origin branch "{branch}" is set to commit "{label}""#)]
fn origin_branch_at(
    world: &mut SyncWorld,
    branch: String,
    label: String,
) -> Result<(), eyre::Report> {
    let hash = world.commit(&label)?;
    world
        .git
        .create_branch(Path::new(ORIGIN_REPO), &BranchName::new(branch)?, &hash)?;
    Ok(())
}

#[given(r#"a sync task "{key}" from local "{source}" to origin "{target}""#)]
fn sync_task(
    world: &mut SyncWorld,
    key: String,
    source: String,
    target: String,
) -> Result<(), eyre::Report> {
    let settings = SyncTaskSettings {
        source: SyncEndpoint::from_parts("app", "local", &source)?,
        target: SyncEndpoint::from_parts("app", "origin", &target)?,
        push_options: PushOptions::default(),
        cron: None,
        enabled: true,
        webhook_token: None,
    };
    run_async(world.service.create_task(SyncTaskKey::new(key)?, settings))
        .wrap_err("create sync task")?;
    Ok(())
}
