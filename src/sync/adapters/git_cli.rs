//! [`GitGateway`] backed by the `git` command-line client.
//!
//! Every call spawns one git process with `-C <repo>`. Credentials travel
//! through the child's environment (`GIT_CONFIG_*` or `GIT_SSH_COMMAND`) so
//! they never appear in arguments, command labels, or logs.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

use crate::sync::{
    domain::{BranchName, CommitHash, RemoteName, redact_url},
    ports::{
        ChangeKind, ChangedPath, FetchOutcome, FetchRequest, GitError, GitGateway, GitResult,
        MergeCommand, PushOutcome, PushRequest, TransportCredential,
    },
};

/// Default per-command timeout.
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(300);

const MISSING_REMOTE_REF: &str = "couldn't find remote ref";
const NOTHING_TO_PUSH: &str = "Everything up-to-date";
const NO_SUCH_REMOTE: &str = "No such remote";

/// Git gateway that shells out to the git binary.
#[derive(Debug, Clone)]
pub struct GitCliGateway {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for GitCliGateway {
    fn default() -> Self {
        Self::new("git", DEFAULT_GIT_TIMEOUT)
    }
}

/// One git process invocation.
struct Invocation<'a> {
    repo: &'a Path,
    args: Vec<String>,
    label: String,
    credential: Option<&'a TransportCredential>,
}

impl<'a> Invocation<'a> {
    fn new(repo: &'a Path, args: &[&str]) -> Self {
        Self {
            repo,
            args: args.iter().map(|arg| (*arg).to_owned()).collect(),
            label: args.join(" "),
            credential: None,
        }
    }

    fn labelled(mut self, label: String) -> Self {
        self.label = label;
        self
    }

    const fn with_credential(mut self, credential: Option<&'a TransportCredential>) -> Self {
        self.credential = credential;
        self
    }
}

impl GitCliGateway {
    /// Creates a gateway running `binary` with a per-command `timeout`.
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Builds the git process for one invocation.
    ///
    /// The locale is pinned to `C` because missing refs, unknown remotes and
    /// no-op pushes are recognised from git's untranslated messages.
    fn command(&self, invocation: &Invocation<'_>) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("-C")
            .arg(invocation.repo)
            .args(&invocation.args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .env("LANGUAGE", "C")
            .stdin(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in credential_env(invocation.credential) {
            command.env(key, value);
        }
        command
    }

    /// Runs git and returns the raw output regardless of exit status.
    async fn output(&self, invocation: Invocation<'_>) -> GitResult<(String, Output)> {
        let mut command = self.command(&invocation);
        debug!(repo = %invocation.repo.display(), command = %invocation.label, "running git");
        let output = tokio::time::timeout(self.timeout, command.output())
            .await
            .map_err(|_| GitError::Timeout {
                command: invocation.label.clone(),
                seconds: self.timeout.as_secs(),
            })??;
        Ok((invocation.label, output))
    }

    /// Runs git and returns trimmed stdout, failing on a non-zero exit.
    async fn run(&self, invocation: Invocation<'_>) -> GitResult<String> {
        let (label, output) = self.output(invocation).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
        } else {
            Err(command_failed(label, &output))
        }
    }

    /// Runs a git predicate where exit code 1 means `false`.
    async fn predicate(&self, invocation: Invocation<'_>) -> GitResult<Option<String>> {
        let (label, output) = self.output(invocation).await?;
        match output.status.code() {
            Some(0) => Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_owned())),
            Some(1) => Ok(None),
            _ => Err(command_failed(label, &output)),
        }
    }
}

fn command_failed(command: String, output: &Output) -> GitError {
    GitError::CommandFailed {
        command,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
    }
}

fn parse_hash(stdout: &str) -> GitResult<CommitHash> {
    CommitHash::new(stdout.trim()).map_err(|err| GitError::InvalidOutput(err.to_string()))
}

/// Environment that hands one credential to git for a single command.
fn credential_env(credential: Option<&TransportCredential>) -> Vec<(&'static str, String)> {
    match credential {
        None => Vec::new(),
        Some(TransportCredential::Basic { username, password }) => {
            let encoded = STANDARD.encode(format!("{username}:{}", password.expose()));
            vec![
                ("GIT_CONFIG_COUNT", "1".to_owned()),
                ("GIT_CONFIG_KEY_0", "http.extraHeader".to_owned()),
                ("GIT_CONFIG_VALUE_0", format!("Authorization: Basic {encoded}")),
            ]
        }
        Some(TransportCredential::SshKey { private_key_path }) => vec![(
            "GIT_SSH_COMMAND",
            format!(
                "ssh -i '{}' -o IdentitiesOnly=yes -o BatchMode=yes",
                private_key_path.display()
            ),
        )],
    }
}

/// Parses `git diff --name-status -z` output.
fn parse_name_status(stdout: &[u8]) -> GitResult<Vec<ChangedPath>> {
    let text = String::from_utf8_lossy(stdout);
    let mut fields = text.split('\0').filter(|field| !field.is_empty());
    let mut changes = Vec::new();
    while let Some(status) = fields.next() {
        let path = fields
            .next()
            .ok_or_else(|| GitError::InvalidOutput(format!("status {status} without a path")))?;
        let kind = match status.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('D') => ChangeKind::Deleted,
            Some('M' | 'T') => ChangeKind::Modified,
            _ => {
                return Err(GitError::InvalidOutput(format!(
                    "unsupported change status {status}"
                )));
            }
        };
        changes.push(ChangedPath::new(path, kind));
    }
    Ok(changes)
}

#[async_trait]
impl GitGateway for GitCliGateway {
    async fn remote_url(&self, repo: &Path, remote: &RemoteName) -> GitResult<Option<String>> {
        let invocation = Invocation::new(repo, &["remote", "get-url", remote.as_str()]);
        let (label, output) = self.output(invocation).await?;
        if output.status.success() {
            let url = String::from_utf8_lossy(&output.stdout).trim().to_owned();
            return Ok(Some(url).filter(|value| !value.is_empty()));
        }
        if String::from_utf8_lossy(&output.stderr).contains(NO_SUCH_REMOTE) {
            return Ok(None);
        }
        Err(command_failed(label, &output))
    }

    async fn fetch(&self, repo: &Path, request: &FetchRequest) -> GitResult<FetchOutcome> {
        let refspec = request.refspec();
        let invocation =
            Invocation::new(repo, &["fetch", "--no-tags", "--", &request.url, &refspec])
            .labelled(format!("fetch {} {refspec}", redact_url(&request.url)))
            .with_credential(request.credential.as_ref());
        let (label, output) = self.output(invocation).await?;
        if output.status.success() {
            return Ok(FetchOutcome::Fetched);
        }
        if String::from_utf8_lossy(&output.stderr).contains(MISSING_REMOTE_REF) {
            return Ok(FetchOutcome::MissingRemoteRef);
        }
        Err(command_failed(label, &output))
    }

    async fn resolve_ref(&self, repo: &Path, reference: &str) -> GitResult<Option<CommitHash>> {
        let revision = format!("{reference}^{{commit}}");
        let invocation = Invocation::new(repo, &["rev-parse", "--verify", "--quiet", &revision]);
        self.predicate(invocation)
            .await?
            .map(|stdout| parse_hash(&stdout))
            .transpose()
    }

    async fn is_ancestor(
        &self,
        repo: &Path,
        ancestor: &CommitHash,
        descendant: &CommitHash,
    ) -> GitResult<bool> {
        let invocation = Invocation::new(
            repo,
            &[
                "merge-base",
                "--is-ancestor",
                ancestor.as_str(),
                descendant.as_str(),
            ],
        );
        Ok(self.predicate(invocation).await?.is_some())
    }

    async fn push(&self, repo: &Path, request: &PushRequest) -> GitResult<PushOutcome> {
        let refspec = format!("{}:{}", request.commit, request.destination_ref);
        let mut args: Vec<&str> = vec!["push"];
        args.extend(request.options.iter().map(String::as_str));
        args.extend(["--", request.url.as_str(), refspec.as_str()]);
        let label = format!(
            "push {}{}{} {refspec}",
            request.options.join(" "),
            if request.options.is_empty() { "" } else { " " },
            redact_url(&request.url)
        );
        let invocation = Invocation::new(repo, &args)
            .labelled(label)
            .with_credential(request.credential.as_ref());
        let (command, output) = self.output(invocation).await?;
        if !output.status.success() {
            return Err(command_failed(command, &output));
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stderr.contains(NOTHING_TO_PUSH) || stdout.contains(NOTHING_TO_PUSH) {
            Ok(PushOutcome::UpToDate)
        } else {
            Ok(PushOutcome::Pushed)
        }
    }

    async fn update_ref(
        &self,
        repo: &Path,
        reference: &str,
        commit: &CommitHash,
    ) -> GitResult<()> {
        self.run(Invocation::new(repo, &["update-ref", reference, commit.as_str()]))
            .await
            .map(|_| ())
    }

    async fn merge_base(
        &self,
        repo: &Path,
        left: &CommitHash,
        right: &CommitHash,
    ) -> GitResult<Option<CommitHash>> {
        let invocation = Invocation::new(repo, &["merge-base", left.as_str(), right.as_str()]);
        self.predicate(invocation)
            .await?
            .map(|stdout| parse_hash(&stdout))
            .transpose()
    }

    async fn changed_paths(
        &self,
        repo: &Path,
        from: &CommitHash,
        to: &CommitHash,
    ) -> GitResult<Vec<ChangedPath>> {
        let invocation = Invocation::new(
            repo,
            &[
                "diff",
                "--name-status",
                "--no-renames",
                "-z",
                from.as_str(),
                to.as_str(),
            ],
        );
        let (label, output) = self.output(invocation).await?;
        if !output.status.success() {
            return Err(command_failed(label, &output));
        }
        parse_name_status(&output.stdout)
    }

    async fn current_branch(&self, repo: &Path) -> GitResult<Option<BranchName>> {
        let invocation = Invocation::new(repo, &["symbolic-ref", "--quiet", "--short", "HEAD"]);
        self.predicate(invocation)
            .await?
            .map(|name| {
                BranchName::new(name).map_err(|err| GitError::InvalidOutput(err.to_string()))
            })
            .transpose()
    }

    async fn checkout(&self, repo: &Path, branch: &BranchName) -> GitResult<()> {
        self.run(Invocation::new(repo, &["checkout", "--quiet", branch.as_str(), "--"]))
            .await
            .map(|_| ())
    }

    async fn merge(&self, repo: &Path, command: &MergeCommand) -> GitResult<()> {
        if command.squash {
            self.run(Invocation::new(
                repo,
                &["merge", "--squash", command.source.as_str()],
            ))
            .await?;
            let nothing_staged = self
                .predicate(Invocation::new(repo, &["diff", "--cached", "--quiet"]))
                .await?
                .is_some();
            if nothing_staged {
                debug!(
                    repo = %repo.display(),
                    source = %command.source.short(),
                    "squash merge brought no changes; nothing to commit"
                );
                return Ok(());
            }
            self.run(
                Invocation::new(repo, &["commit", "--quiet", "-m", &command.message])
                    .labelled("commit --quiet".to_owned()),
            )
            .await?;
        } else {
            self.run(
                Invocation::new(
                    repo,
                    &[
                        "merge",
                        "--no-ff",
                        "--no-edit",
                        "-m",
                        &command.message,
                        command.source.as_str(),
                    ],
                )
                .labelled(format!("merge --no-ff {}", command.source.short())),
            )
            .await?;
        }
        Ok(())
    }

    /// Restores the pre-merge state with `git reset --merge`, which also
    /// covers squash merges that leave no `MERGE_HEAD` behind.
    async fn merge_abort(&self, repo: &Path) -> GitResult<()> {
        self.run(Invocation::new(repo, &["reset", "--merge"]))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::domain::Secret;
    use rstest::rstest;
    use std::collections::HashMap;
    use std::ffi::OsStr;

    #[rstest]
    fn basic_credentials_travel_as_an_extra_header() {
        let credential = TransportCredential::Basic {
            username: "bot".to_owned(),
            password: Secret::new("s3cret"),
        };

        let env = credential_env(Some(&credential));

        assert_eq!(env.len(), 3);
        assert!(env.contains(&("GIT_CONFIG_KEY_0", "http.extraHeader".to_owned())));
        assert!(env.contains(&(
            "GIT_CONFIG_VALUE_0",
            format!("Authorization: Basic {}", STANDARD.encode("bot:s3cret"))
        )));
    }

    #[rstest]
    fn ssh_keys_travel_through_the_ssh_command() {
        let credential = TransportCredential::SshKey {
            private_key_path: PathBuf::from("/keys/deploy"),
        };

        let env = credential_env(Some(&credential));

        assert_eq!(
            env,
            vec![(
                "GIT_SSH_COMMAND",
                "ssh -i '/keys/deploy' -o IdentitiesOnly=yes -o BatchMode=yes".to_owned()
            )]
        );
    }

    #[rstest]
    #[case(None)]
    #[case(Some(TransportCredential::SshKey {
        private_key_path: PathBuf::from("/keys/deploy"),
    }))]
    fn commands_pin_the_c_locale(#[case] credential: Option<TransportCredential>) {
        let gateway = GitCliGateway::default();
        let invocation =
            Invocation::new(Path::new("/srv/app"), &["fetch"]).with_credential(credential.as_ref());

        let command = gateway.command(&invocation);

        let env: HashMap<&OsStr, Option<&OsStr>> = command.as_std().get_envs().collect();
        for variable in ["LC_ALL", "LANGUAGE"] {
            assert_eq!(
                env.get(OsStr::new(variable)).copied().flatten(),
                Some(OsStr::new("C")),
                "{variable} is not pinned"
            );
        }
        assert_eq!(
            env.get(OsStr::new("GIT_TERMINAL_PROMPT")).copied().flatten(),
            Some(OsStr::new("0"))
        );
    }

    #[rstest]
    fn anonymous_transport_sets_no_environment() {
        assert!(credential_env(None).is_empty());
    }

    #[rstest]
    fn name_status_output_is_parsed_into_changes() {
        let stdout = b"A\0new.txt\0M\0src/lib.rs\0D\0old.txt\0T\0link\0";

        let changes = parse_name_status(stdout).expect("valid output");

        assert_eq!(
            changes,
            vec![
                ChangedPath::new("new.txt", ChangeKind::Added),
                ChangedPath::new("src/lib.rs", ChangeKind::Modified),
                ChangedPath::new("old.txt", ChangeKind::Deleted),
                ChangedPath::new("link", ChangeKind::Modified),
            ]
        );
    }

    #[rstest]
    #[case(b"M\0".as_slice())]
    #[case(b"R100\0a\0b\0".as_slice())]
    fn malformed_name_status_output_is_rejected(#[case] stdout: &[u8]) {
        assert!(matches!(
            parse_name_status(stdout),
            Err(GitError::InvalidOutput(_))
        ));
    }
}
