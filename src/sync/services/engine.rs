//! Fast-forward-only branch synchronisation.

use crate::sync::{
    domain::{
        CommitHash, CommitRange, ExecutionLog, RemoteName, RepositoryRecord, SyncEndpoint,
        SyncFailure, SyncFailureKind, SyncTask, redact_credentials, redact_url,
    },
    ports::{
        CredentialResolver, FetchOutcome, FetchRequest, GitGateway, PushOutcome, PushRequest,
        TransportCredential,
    },
};
use mockable::Clock;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A task together with the repository records its endpoints reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJobContext {
    /// Task being executed.
    pub task: SyncTask,
    /// Record of the source repository; its path is the work repository.
    pub source_repository: RepositoryRecord,
    /// Record of the target repository.
    pub target_repository: RepositoryRecord,
}

impl SyncJobContext {
    fn work_repo(&self) -> &Path {
        self.source_repository.path()
    }

    fn shares_repository(&self) -> bool {
        self.source_repository.key() == self.target_repository.key()
    }

    /// Tracking ref the target branch is fetched into.
    ///
    /// Namespaced by repository key when the target repository differs from
    /// the work repository so that equally named remotes cannot collide.
    fn target_tracking_ref(&self) -> String {
        let target = self.task.target();
        if self.shares_repository() {
            format!("refs/remotes/{}/{}", target.remote(), target.branch())
        } else {
            format!(
                "refs/remotes/{}/{}/{}",
                target.repository(),
                target.remote(),
                target.branch()
            )
        }
    }
}

/// Resolved transport details of one remote endpoint.
struct Transport {
    url: String,
    credential: Option<TransportCredential>,
}

/// Pushes the source head to the target branch when, and only when, the
/// target head is an ancestor of it.
///
/// Every observable step is appended to the caller's [`ExecutionLog`]; the
/// engine never writes run records itself.
pub struct FastForwardEngine<G, A, K>
where
    G: GitGateway,
    A: CredentialResolver,
    K: Clock + Send + Sync,
{
    git: Arc<G>,
    credentials: Arc<A>,
    clock: Arc<K>,
}

impl<G, A, K> FastForwardEngine<G, A, K>
where
    G: GitGateway,
    A: CredentialResolver,
    K: Clock + Send + Sync,
{
    /// Creates an engine.
    #[must_use]
    pub const fn new(git: Arc<G>, credentials: Arc<A>, clock: Arc<K>) -> Self {
        Self {
            git,
            credentials,
            clock,
        }
    }

    /// Runs one synchronisation.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncFailure`] tagged with the step that failed. No ref on
    /// the target remote is moved unless the push itself succeeds.
    pub async fn execute(
        &self,
        context: &SyncJobContext,
        log: &mut ExecutionLog,
    ) -> Result<CommitRange, SyncFailure> {
        let task = context.task.key();
        let result = self.synchronise(context, log).await;
        match &result {
            Ok(range) if range.is_up_to_date() => {
                info!(task = %task, "target already up to date");
            }
            Ok(range) => info!(task = %task, range = %range, "target fast-forwarded"),
            Err(failure) => {
                warn!(
                    task = %task,
                    kind = %failure.kind(),
                    error = failure.message(),
                    "sync failed"
                );
            }
        }
        result
    }

    async fn synchronise(
        &self,
        context: &SyncJobContext,
        log: &mut ExecutionLog,
    ) -> Result<CommitRange, SyncFailure> {
        let source_hash = self.resolve_source(context, log).await?;
        let (target, target_hash) = self.resolve_target(context, log).await?;

        if let Some(existing) = &target_hash {
            if *existing == source_hash {
                self.note(log, format!("target already at {source_hash}; nothing to push"));
                return Ok(CommitRange::UpToDate);
            }
            self.check_ancestry(context, existing, &source_hash, log)
                .await?;
        }

        self.push(context, &target, &source_hash, log).await?;

        Ok(match target_hash {
            Some(from) => CommitRange::FastForward {
                from,
                to: source_hash,
            },
            None => CommitRange::NewBranch(source_hash),
        })
    }

    async fn resolve_source(
        &self,
        context: &SyncJobContext,
        log: &mut ExecutionLog,
    ) -> Result<CommitHash, SyncFailure> {
        let source = context.task.source();
        let work = context.work_repo();
        let fetch_failed =
            |message: String| SyncFailure::new(SyncFailureKind::FetchSourceFailed, message);

        let reference = if source.remote().is_local() {
            self.note(log, format!("using local branch {}", source.branch()));
            source.branch().head_ref()
        } else {
            let transport = self
                .transport(
                    &context.source_repository,
                    source,
                    SyncFailureKind::FetchSourceFailed,
                    log,
                )
                .await?;
            let tracking_ref = format!("refs/remotes/{}/{}", source.remote(), source.branch());
            let request = FetchRequest {
                url: transport.url,
                remote_ref: source.branch().head_ref(),
                tracking_ref: tracking_ref.clone(),
                credential: transport.credential,
            };
            self.note(
                log,
                format!("git fetch {} {}", redact_url(&request.url), request.refspec()),
            );
            match self.git.fetch(work, &request).await {
                Ok(FetchOutcome::Fetched) => {}
                Ok(FetchOutcome::MissingRemoteRef) => {
                    return Err(self.fail(
                        log,
                        fetch_failed(format!(
                            "source branch {source} does not exist on the remote"
                        )),
                    ));
                }
                Err(err) => return Err(self.fail(log, fetch_failed(err.to_string()))),
            }
            tracking_ref
        };

        match self.git.resolve_ref(work, &reference).await {
            Ok(Some(hash)) => {
                self.note(log, format!("source {source} is at {hash}"));
                Ok(hash)
            }
            Ok(None) => Err(self.fail(
                log,
                fetch_failed(format!("source ref {reference} does not exist")),
            )),
            Err(err) => Err(self.fail(log, fetch_failed(err.to_string()))),
        }
    }

    async fn resolve_target(
        &self,
        context: &SyncJobContext,
        log: &mut ExecutionLog,
    ) -> Result<(Transport, Option<CommitHash>), SyncFailure> {
        let target = context.task.target();
        let work = context.work_repo();
        let fetch_failed =
            |message: String| SyncFailure::new(SyncFailureKind::FetchTargetFailed, message);

        let transport = self
            .transport(
                &context.target_repository,
                target,
                SyncFailureKind::FetchTargetFailed,
                log,
            )
            .await?;
        let tracking_ref = context.target_tracking_ref();
        let request = FetchRequest {
            url: transport.url.clone(),
            remote_ref: target.branch().head_ref(),
            tracking_ref: tracking_ref.clone(),
            credential: transport.credential.clone(),
        };
        self.note(
            log,
            format!("git fetch {} {}", redact_url(&request.url), request.refspec()),
        );
        match self.git.fetch(work, &request).await {
            Ok(FetchOutcome::Fetched) => {}
            Ok(FetchOutcome::MissingRemoteRef) => {
                self.note(
                    log,
                    format!("target branch {target} does not exist; it will be created"),
                );
                return Ok((transport, None));
            }
            Err(err) => return Err(self.fail(log, fetch_failed(err.to_string()))),
        }

        match self.git.resolve_ref(work, &tracking_ref).await {
            Ok(Some(hash)) => {
                self.note(log, format!("target {target} is at {hash}"));
                Ok((transport, Some(hash)))
            }
            Ok(None) => Err(self.fail(
                log,
                fetch_failed(format!("tracking ref {tracking_ref} missing after fetch")),
            )),
            Err(err) => Err(self.fail(log, fetch_failed(err.to_string()))),
        }
    }

    async fn check_ancestry(
        &self,
        context: &SyncJobContext,
        target_hash: &CommitHash,
        source_hash: &CommitHash,
        log: &mut ExecutionLog,
    ) -> Result<(), SyncFailure> {
        let work = context.work_repo();
        let ancestry_failed =
            |message: String| SyncFailure::new(SyncFailureKind::AncestryCheckFailed, message);

        let fast_forward = self
            .git
            .is_ancestor(work, target_hash, source_hash)
            .await
            .map_err(|err| self.fail(log, ancestry_failed(err.to_string())))?;
        if fast_forward {
            self.note(log, format!("{target_hash} is an ancestor of {source_hash}; fast-forward"));
            return Ok(());
        }

        let behind = self
            .git
            .is_ancestor(work, source_hash, target_hash)
            .await
            .map_err(|err| self.fail(log, ancestry_failed(err.to_string())))?;
        let failure = if behind {
            SyncFailure::new(
                SyncFailureKind::SourceBehindTarget,
                format!(
                    "source {source_hash} is behind target {target_hash}; \
                     pushing would discard commits"
                ),
            )
        } else {
            SyncFailure::new(
                SyncFailureKind::Conflict,
                format!("source {source_hash} and target {target_hash} have diverged"),
            )
        };
        Err(self.fail(log, failure))
    }

    async fn push(
        &self,
        context: &SyncJobContext,
        target: &Transport,
        source_hash: &CommitHash,
        log: &mut ExecutionLog,
    ) -> Result<(), SyncFailure> {
        let endpoint = context.task.target();
        let request = PushRequest {
            url: target.url.clone(),
            commit: source_hash.clone(),
            destination_ref: endpoint.branch().head_ref(),
            options: context.task.push_options().as_slice().to_vec(),
            credential: target.credential.clone(),
        };
        let options = request
            .options
            .iter()
            .map(|option| format!("{option} "))
            .collect::<String>();
        self.note(
            log,
            format!(
                "git push {options}{} {}:{}",
                redact_url(&request.url),
                request.commit,
                request.destination_ref
            ),
        );

        match self.git.push(context.work_repo(), &request).await {
            Ok(PushOutcome::Pushed) => {
                self.note(log, format!("pushed {source_hash} to {endpoint}"));
            }
            Ok(PushOutcome::UpToDate) => self.note(log, "remote reported everything up-to-date"),
            Err(err) => {
                return Err(self.fail(
                    log,
                    SyncFailure::new(SyncFailureKind::PushFailed, err.to_string()),
                ));
            }
        }

        let tracking_ref = context.target_tracking_ref();
        if let Err(err) = self
            .git
            .update_ref(context.work_repo(), &tracking_ref, source_hash)
            .await
        {
            warn!(task = %context.task.key(), error = %err, "could not move target tracking ref");
            self.note(log, format!("could not move {tracking_ref}: {err}"));
        }
        Ok(())
    }

    /// Resolves the URL and credential of an endpoint's remote.
    ///
    /// The remote configured in the repository wins; the registered URL is
    /// the fallback.
    async fn transport(
        &self,
        repository: &RepositoryRecord,
        endpoint: &SyncEndpoint,
        kind: SyncFailureKind,
        log: &mut ExecutionLog,
    ) -> Result<Transport, SyncFailure> {
        let remote: &RemoteName = endpoint.remote();
        let configured = self
            .git
            .remote_url(repository.path(), remote)
            .await
            .map_err(|err| self.fail(log, SyncFailure::new(kind, err.to_string())))?;
        let Some(url) = configured.or_else(|| repository.registered_url().map(str::to_owned))
        else {
            return Err(self.fail(
                log,
                SyncFailure::new(
                    kind,
                    format!(
                        "remote {remote} is not configured in {} and no URL is registered",
                        repository.key()
                    ),
                ),
            ));
        };
        self.note(
            log,
            format!(
                "remote {remote} of {} resolves to {}",
                repository.key(),
                redact_url(&url)
            ),
        );

        let credential = self
            .credentials
            .resolve(repository, remote)
            .await
            .map_err(|err| {
                self.fail(
                    log,
                    SyncFailure::new(SyncFailureKind::InvalidConfiguration, err.to_string()),
                )
            })?;
        debug!(
            repository = %repository.key(),
            remote = %remote,
            authenticated = credential.is_some(),
            "resolved transport"
        );
        Ok(Transport { url, credential })
    }

    fn note(&self, log: &mut ExecutionLog, message: impl AsRef<str>) {
        log.record(self.clock.utc(), message);
    }

    /// Logs a failure with any embedded credentials masked.
    fn fail(&self, log: &mut ExecutionLog, failure: SyncFailure) -> SyncFailure {
        let redacted = SyncFailure::new(failure.kind(), redact_credentials(failure.message()));
        self.note(log, format!("failed ({}): {}", redacted.kind(), redacted.message()));
        redacted
    }
}
