//! In-memory git world for exercising the sync services without a git binary.
//!
//! Repositories are addressed by path and share one commit store, so a fetch
//! or push only moves refs. Remote URLs are interpreted as repository paths.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::sync::{
    domain::{BranchName, CommitHash, RemoteName},
    ports::{
        ChangeKind, ChangedPath, FetchOutcome, FetchRequest, GitError, GitGateway, GitResult,
        MergeCommand, PushOutcome, PushRequest,
    },
};

/// Path content of a commit snapshot.
type Snapshot = BTreeMap<String, String>;

/// In-memory [`GitGateway`] with helpers for building commit histories.
#[derive(Debug, Clone, Default)]
pub struct InMemoryGitGateway {
    state: Arc<RwLock<GitWorld>>,
}

#[derive(Debug, Default)]
struct GitWorld {
    repositories: HashMap<PathBuf, RepositoryState>,
    commits: HashMap<CommitHash, CommitNode>,
    sequence: u64,
    pushes: usize,
}

#[derive(Debug, Default)]
struct RepositoryState {
    refs: BTreeMap<String, CommitHash>,
    remotes: BTreeMap<String, String>,
    head: Option<BranchName>,
    merging: bool,
    push_rejection: Option<String>,
}

#[derive(Debug, Clone)]
struct CommitNode {
    parents: Vec<CommitHash>,
    files: Snapshot,
}

fn lock_error(err: impl std::fmt::Display) -> GitError {
    GitError::from(std::io::Error::other(err.to_string()))
}

fn missing_repository(path: &Path) -> GitError {
    GitError::NotFound(format!("repository {}", path.display()))
}

impl GitWorld {
    fn repository(&self, path: &Path) -> GitResult<&RepositoryState> {
        self.repositories
            .get(path)
            .ok_or_else(|| missing_repository(path))
    }

    fn repository_mut(&mut self, path: &Path) -> GitResult<&mut RepositoryState> {
        self.repositories
            .get_mut(path)
            .ok_or_else(|| missing_repository(path))
    }

    fn remote_repository(&self, url: &str, command: &str) -> GitResult<&RepositoryState> {
        self.repositories
            .get(Path::new(url))
            .ok_or_else(|| GitError::CommandFailed {
                command: command.to_owned(),
                stderr: format!("fatal: '{url}' does not appear to be a git repository"),
            })
    }

    fn node(&self, commit: &CommitHash) -> GitResult<&CommitNode> {
        self.commits
            .get(commit)
            .ok_or_else(|| GitError::NotFound(format!("commit {commit}")))
    }

    /// Every commit reachable from `start`, including `start` itself.
    fn ancestors(&self, start: &CommitHash) -> GitResult<BTreeSet<CommitHash>> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([start.clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            queue.extend(self.node(&current)?.parents.iter().cloned());
        }
        Ok(seen)
    }

    fn merge_base(&self, left: &CommitHash, right: &CommitHash) -> GitResult<Option<CommitHash>> {
        let left_ancestors = self.ancestors(left)?;
        let right_ancestors = self.ancestors(right)?;
        let common: Vec<CommitHash> = left_ancestors
            .intersection(&right_ancestors)
            .cloned()
            .collect();
        let mut best = None;
        for candidate in &common {
            let mut dominated = false;
            for other in &common {
                if other != candidate && self.ancestors(other)?.contains(candidate) {
                    dominated = true;
                    break;
                }
            }
            if !dominated {
                best = Some(candidate.clone());
                break;
            }
        }
        Ok(best)
    }

    fn create_commit(
        &mut self,
        parents: Vec<CommitHash>,
        files: Snapshot,
        message: &str,
    ) -> GitResult<CommitHash> {
        self.sequence += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.sequence.to_string());
        for parent in &parents {
            hasher.update(parent.as_str());
        }
        for (path, content) in &files {
            hasher.update(path);
            hasher.update([0]);
            hasher.update(content);
        }
        hasher.update(message);
        let digest = hex::encode(hasher.finalize());
        let hash =
            CommitHash::new(digest).map_err(|err| GitError::InvalidOutput(err.to_string()))?;
        self.commits
            .insert(hash.clone(), CommitNode { parents, files });
        Ok(hash)
    }
}

impl RepositoryState {
    fn resolve(
        &self,
        reference: &str,
        commits: &HashMap<CommitHash, CommitNode>,
    ) -> Option<CommitHash> {
        if reference == "HEAD" {
            return self
                .head
                .as_ref()
                .and_then(|branch| self.refs.get(&branch.head_ref()).cloned());
        }
        let candidates = [
            reference.to_owned(),
            format!("refs/heads/{reference}"),
            format!("refs/remotes/{reference}"),
        ];
        candidates
            .iter()
            .find_map(|candidate| self.refs.get(candidate).cloned())
            .or_else(|| {
                CommitHash::new(reference)
                    .ok()
                    .filter(|hash| commits.contains_key(hash))
            })
    }
}

impl InMemoryGitGateway {
    /// Creates an empty git world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&GitWorld) -> GitResult<T>) -> GitResult<T> {
        let world = self.state.read().map_err(lock_error)?;
        f(&world)
    }

    fn write<T>(&self, f: impl FnOnce(&mut GitWorld) -> GitResult<T>) -> GitResult<T> {
        let mut world = self.state.write().map_err(lock_error)?;
        f(&mut world)
    }

    /// Creates an empty repository at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::Io`] when the world lock is poisoned.
    pub fn init_repository(&self, path: impl Into<PathBuf>) -> GitResult<()> {
        let repository_path = path.into();
        self.write(|world| {
            world.repositories.entry(repository_path).or_default();
            Ok(())
        })
    }

    /// Configures a named remote in `repo` pointing at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] for an unknown repository.
    pub fn add_remote(&self, repo: &Path, remote: &str, url: &str) -> GitResult<()> {
        self.write(|world| {
            world
                .repository_mut(repo)?
                .remotes
                .insert(remote.to_owned(), url.to_owned());
            Ok(())
        })
    }

    /// Commits on top of `branch` in `repo`, creating the branch if needed.
    ///
    /// Each change writes a file, or deletes it when the content is `None`.
    /// The first branch committed to becomes the checked-out branch.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] for an unknown repository.
    pub fn commit(
        &self,
        repo: &Path,
        branch: &BranchName,
        message: &str,
        changes: &[(&str, Option<&str>)],
    ) -> GitResult<CommitHash> {
        self.write(|world| {
            let parent = world.repository(repo)?.refs.get(&branch.head_ref()).cloned();
            let mut files = match &parent {
                Some(hash) => world.node(hash)?.files.clone(),
                None => Snapshot::new(),
            };
            for (path, content) in changes {
                match content {
                    Some(text) => files.insert((*path).to_owned(), (*text).to_owned()),
                    None => files.remove(*path),
                };
            }
            let hash = world.create_commit(parent.into_iter().collect(), files, message)?;
            let state = world.repository_mut(repo)?;
            state.refs.insert(branch.head_ref(), hash.clone());
            if state.head.is_none() {
                state.head = Some(branch.clone());
            }
            Ok(hash)
        })
    }

    /// Points `refs/heads/<branch>` in `repo` at an existing commit.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] for an unknown repository or commit.
    pub fn create_branch(
        &self,
        repo: &Path,
        branch: &BranchName,
        at: &CommitHash,
    ) -> GitResult<()> {
        self.write(|world| {
            world.node(at)?;
            world
                .repository_mut(repo)?
                .refs
                .insert(branch.head_ref(), at.clone());
            Ok(())
        })
    }

    /// Returns the commit `reference` resolves to in `repo`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] for an unknown repository.
    pub fn ref_target(&self, repo: &Path, reference: &str) -> GitResult<Option<CommitHash>> {
        self.read(|world| Ok(world.repository(repo)?.resolve(reference, &world.commits)))
    }

    /// Returns the snapshot of `path` at `commit`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] for an unknown commit.
    pub fn file_at(&self, commit: &CommitHash, path: &str) -> GitResult<Option<String>> {
        self.read(|world| Ok(world.node(commit)?.files.get(path).cloned()))
    }

    /// Returns the parent list of `commit`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] for an unknown commit.
    pub fn parents_of(&self, commit: &CommitHash) -> GitResult<Vec<CommitHash>> {
        self.read(|world| Ok(world.node(commit)?.parents.clone()))
    }

    /// Makes every push into `repo` fail with `reason`, or clears the rule.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotFound`] for an unknown repository.
    pub fn reject_pushes(&self, repo: &Path, reason: Option<&str>) -> GitResult<()> {
        self.write(|world| {
            world.repository_mut(repo)?.push_rejection = reason.map(str::to_owned);
            Ok(())
        })
    }

    /// Returns how many pushes moved a remote ref.
    #[must_use]
    pub fn push_count(&self) -> usize {
        self.state.read().map(|world| world.pushes).unwrap_or_default()
    }
}

#[async_trait]
impl GitGateway for InMemoryGitGateway {
    async fn remote_url(&self, repo: &Path, remote: &RemoteName) -> GitResult<Option<String>> {
        self.read(|world| {
            Ok(world
                .repository(repo)?
                .remotes
                .get(remote.as_str())
                .cloned())
        })
    }

    async fn fetch(&self, repo: &Path, request: &FetchRequest) -> GitResult<FetchOutcome> {
        self.write(|world| {
            let command = format!("fetch {} {}", request.url, request.refspec());
            let remote_head = world
                .remote_repository(&request.url, &command)?
                .refs
                .get(&request.remote_ref)
                .cloned();
            let Some(head) = remote_head else {
                return Ok(FetchOutcome::MissingRemoteRef);
            };
            world
                .repository_mut(repo)?
                .refs
                .insert(request.tracking_ref.clone(), head);
            Ok(FetchOutcome::Fetched)
        })
    }

    async fn resolve_ref(&self, repo: &Path, reference: &str) -> GitResult<Option<CommitHash>> {
        self.ref_target(repo, reference)
    }

    async fn is_ancestor(
        &self,
        repo: &Path,
        ancestor: &CommitHash,
        descendant: &CommitHash,
    ) -> GitResult<bool> {
        self.read(|world| {
            world.repository(repo)?;
            world.node(ancestor)?;
            Ok(world.ancestors(descendant)?.contains(ancestor))
        })
    }

    async fn push(&self, repo: &Path, request: &PushRequest) -> GitResult<PushOutcome> {
        self.write(|world| {
            world.repository(repo)?;
            world.node(&request.commit)?;
            let command = format!("push {} {}", request.url, request.destination_ref);
            let remote = world.remote_repository(&request.url, &command)?;
            if let Some(reason) = &remote.push_rejection {
                return Err(GitError::CommandFailed {
                    command,
                    stderr: format!("! [remote rejected] ({reason})"),
                });
            }
            let current = remote.refs.get(&request.destination_ref).cloned();
            let forced = request
                .options
                .iter()
                .any(|option| option == "--force" || option == "-f");
            match current {
                Some(existing) if existing == request.commit => return Ok(PushOutcome::UpToDate),
                Some(existing)
                    if !forced && !world.ancestors(&request.commit)?.contains(&existing) =>
                {
                    return Err(GitError::CommandFailed {
                        command,
                        stderr: "! [rejected] (non-fast-forward)".to_owned(),
                    });
                }
                _ => {}
            }
            let url = PathBuf::from(&request.url);
            world
                .repository_mut(&url)?
                .refs
                .insert(request.destination_ref.clone(), request.commit.clone());
            world.pushes += 1;
            Ok(PushOutcome::Pushed)
        })
    }

    async fn update_ref(
        &self,
        repo: &Path,
        reference: &str,
        commit: &CommitHash,
    ) -> GitResult<()> {
        self.write(|world| {
            world.node(commit)?;
            world
                .repository_mut(repo)?
                .refs
                .insert(reference.to_owned(), commit.clone());
            Ok(())
        })
    }

    async fn merge_base(
        &self,
        repo: &Path,
        left: &CommitHash,
        right: &CommitHash,
    ) -> GitResult<Option<CommitHash>> {
        self.read(|world| {
            world.repository(repo)?;
            world.merge_base(left, right)
        })
    }

    async fn changed_paths(
        &self,
        repo: &Path,
        from: &CommitHash,
        to: &CommitHash,
    ) -> GitResult<Vec<ChangedPath>> {
        self.read(|world| {
            world.repository(repo)?;
            Ok(diff(&world.node(from)?.files, &world.node(to)?.files))
        })
    }

    async fn current_branch(&self, repo: &Path) -> GitResult<Option<BranchName>> {
        self.read(|world| Ok(world.repository(repo)?.head.clone()))
    }

    async fn checkout(&self, repo: &Path, branch: &BranchName) -> GitResult<()> {
        self.write(|world| {
            let state = world.repository_mut(repo)?;
            if state.merging {
                return Err(GitError::CommandFailed {
                    command: format!("checkout {branch}"),
                    stderr: "error: you need to resolve your current index first".to_owned(),
                });
            }
            if !state.refs.contains_key(&branch.head_ref()) {
                return Err(GitError::CommandFailed {
                    command: format!("checkout {branch}"),
                    stderr: format!(
                        "error: pathspec '{branch}' did not match any file(s) known to git"
                    ),
                });
            }
            state.head = Some(branch.clone());
            Ok(())
        })
    }

    async fn merge(&self, repo: &Path, command: &MergeCommand) -> GitResult<()> {
        self.write(|world| {
            let label = format!("merge {}", command.source.short());
            let state = world.repository(repo)?;
            let branch = state.head.clone().ok_or_else(|| GitError::CommandFailed {
                command: label.clone(),
                stderr: "fatal: no branch checked out".to_owned(),
            })?;
            let tip = state
                .refs
                .get(&branch.head_ref())
                .cloned()
                .ok_or_else(|| GitError::NotFound(branch.head_ref()))?;
            if world.ancestors(&tip)?.contains(&command.source) {
                return Ok(());
            }
            let base_files = match world.merge_base(&tip, &command.source)? {
                Some(base) => world.node(&base)?.files.clone(),
                None => Snapshot::new(),
            };
            let ours = world.node(&tip)?.files.clone();
            let theirs = world.node(&command.source)?.files.clone();
            let merged = match three_way(&base_files, &ours, &theirs) {
                Ok(files) => files,
                Err(conflicts) => {
                    world.repository_mut(repo)?.merging = true;
                    return Err(GitError::CommandFailed {
                        command: label,
                        stderr: conflicts
                            .iter()
                            .map(|path| format!("CONFLICT (content): Merge conflict in {path}"))
                            .collect::<Vec<_>>()
                            .join("\n"),
                    });
                }
            };
            let parents = if command.squash {
                vec![tip]
            } else {
                vec![tip, command.source.clone()]
            };
            let hash = world.create_commit(parents, merged, &command.message)?;
            world
                .repository_mut(repo)?
                .refs
                .insert(branch.head_ref(), hash);
            Ok(())
        })
    }

    async fn merge_abort(&self, repo: &Path) -> GitResult<()> {
        self.write(|world| {
            world.repository_mut(repo)?.merging = false;
            Ok(())
        })
    }
}

fn diff(from: &Snapshot, to: &Snapshot) -> Vec<ChangedPath> {
    let paths: BTreeSet<&String> = from.keys().chain(to.keys()).collect();
    paths
        .into_iter()
        .filter_map(|path| match (from.get(path), to.get(path)) {
            (None, Some(_)) => Some(ChangedPath::new(path.clone(), ChangeKind::Added)),
            (Some(_), None) => Some(ChangedPath::new(path.clone(), ChangeKind::Deleted)),
            (Some(before), Some(after)) if before != after => {
                Some(ChangedPath::new(path.clone(), ChangeKind::Modified))
            }
            _ => None,
        })
        .collect()
}

/// Merges file snapshots, returning the conflicting paths on failure.
fn three_way(base: &Snapshot, ours: &Snapshot, theirs: &Snapshot) -> Result<Snapshot, Vec<String>> {
    let paths: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
    let mut merged = Snapshot::new();
    let mut conflicts = Vec::new();
    for path in paths {
        let (b, o, t) = (base.get(path), ours.get(path), theirs.get(path));
        let resolved = if o == t || b == t {
            o
        } else if b == o {
            t
        } else {
            conflicts.push(path.clone());
            continue;
        };
        if let Some(content) = resolved {
            merged.insert(path.clone(), content.clone());
        }
    }
    if conflicts.is_empty() {
        Ok(merged)
    } else {
        Err(conflicts)
    }
}
