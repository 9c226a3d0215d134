//! Interactive merges: predicted conflicts, merge commits and branch restore.

use std::path::PathBuf;
use std::sync::Arc;

use crate::sync::{
    adapters::memory::InMemoryGitGateway,
    domain::CommitHash,
    ports::{GitError, GitGateway, MockGitGateway},
    services::{MergeError, MergeRequest, MergeService},
};
use rstest::{fixture, rstest};

use super::support::{GitFixture, WORK_REPO, branch, work};

struct Prepared {
    fixture: GitFixture,
    service: MergeService<InMemoryGitGateway>,
    base: CommitHash,
}

impl Prepared {
    fn change(&self, branch_name: &str, path: &str, content: &str) -> CommitHash {
        self.fixture
            .git
            .commit(work(), &branch(branch_name), "edit", &[(path, Some(content))])
            .expect("commit created")
    }
}

fn request(squash: bool) -> MergeRequest {
    MergeRequest {
        repo_path: PathBuf::from(WORK_REPO),
        source_ref: "feature".to_owned(),
        target_branch: branch("main"),
        squash,
        message: "Merge feature".to_owned(),
    }
}

#[fixture]
async fn prepared() -> Prepared {
    let fixture = GitFixture::new().await;
    let base = fixture
        .git
        .commit(work(), &branch("main"), "base", &[("README.md", Some("hello"))])
        .expect("base commit");
    fixture
        .git
        .create_branch(work(), &branch("feature"), &base)
        .expect("feature branch");
    let service = MergeService::new(Arc::clone(&fixture.git));
    Prepared {
        fixture,
        service,
        base,
    }
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn clean_merge_creates_a_merge_commit(#[future] prepared: Prepared) {
    let world = prepared.await;
    let main_tip = world.change("main", "main.txt", "main");
    let feature_tip = world.change("feature", "feature.txt", "feature");

    let outcome = world
        .service
        .merge(&request(false))
        .await
        .expect("merge succeeds");

    assert_eq!(outcome.merge_base, world.base);
    assert_eq!(world.fixture.head(WORK_REPO, "main"), Some(outcome.head.clone()));
    assert_eq!(
        world.fixture.git.parents_of(&outcome.head).expect("parents"),
        vec![main_tip, feature_tip]
    );
    assert_eq!(
        world
            .fixture
            .git
            .file_at(&outcome.head, "feature.txt")
            .expect("snapshot"),
        Some("feature".to_owned())
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn squash_merge_has_a_single_parent(#[future] prepared: Prepared) {
    let world = prepared.await;
    let main_tip = world.change("main", "main.txt", "main");
    world.change("feature", "feature.txt", "one");
    world.change("feature", "feature.txt", "two");

    let outcome = world
        .service
        .merge(&request(true))
        .await
        .expect("squash succeeds");

    assert_eq!(
        world.fixture.git.parents_of(&outcome.head).expect("parents"),
        vec![main_tip]
    );
    assert_eq!(
        world
            .fixture
            .git
            .file_at(&outcome.head, "feature.txt")
            .expect("snapshot"),
        Some("two".to_owned())
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn predicted_conflicts_leave_the_target_untouched(#[future] prepared: Prepared) {
    let world = prepared.await;
    let main_tip = world.change("main", "README.md", "main readme");
    world.change("feature", "README.md", "feature readme");

    let result = world.service.merge(&request(false)).await;

    assert!(matches!(result, Err(MergeError::Conflicts(ref paths)) if paths == &["README.md"]));
    assert_eq!(world.fixture.head(WORK_REPO, "main"), Some(main_tip));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn original_branch_is_checked_out_again(#[future] prepared: Prepared) {
    let world = prepared.await;
    world.change("feature", "feature.txt", "feature");
    world
        .fixture
        .git
        .checkout(work(), &branch("feature"))
        .await
        .expect("checkout feature");

    world
        .service
        .merge(&request(false))
        .await
        .expect("merge succeeds");

    assert_eq!(
        world.fixture.git.current_branch(work()).await.expect("head"),
        Some(branch("feature"))
    );
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rejected_merge_is_aborted_and_the_branch_restored() {
    let hash = |digit: char| CommitHash::new(digit.to_string().repeat(40)).expect("valid hash");
    let mut git = MockGitGateway::new();
    git.expect_resolve_ref()
        .returning(move |_, reference| {
            Ok(Some(if reference == "feature" {
                hash('a')
            } else {
                hash('b')
            }))
        });
    git.expect_merge_base()
        .returning(move |_, _, _| Ok(Some(hash('c'))));
    git.expect_changed_paths().returning(|_, _, _| Ok(Vec::new()));
    git.expect_current_branch()
        .times(1)
        .returning(|_| Ok(Some(branch("develop"))));
    git.expect_checkout()
        .withf(|_, target| target.as_str() == "main")
        .times(1)
        .returning(|_, _| Ok(()));
    git.expect_checkout()
        .withf(|_, target| target.as_str() == "develop")
        .times(1)
        .returning(|_, _| Ok(()));
    git.expect_merge().times(1).returning(|_, _| {
        Err(GitError::CommandFailed {
            command: "merge".to_owned(),
            stderr: "fatal: refusing to merge".to_owned(),
        })
    });
    git.expect_merge_abort().times(1).returning(|_| Ok(()));
    let service = MergeService::new(Arc::new(git));

    let result = service.merge(&request(false)).await;

    assert!(matches!(result, Err(MergeError::MergeFailed(_))));
}
