use codegraph_core::GitSettings;
use codegraph_git::{
    CloneOptions, CloneProgress, CloneStage, GitErrorCode, GitRepositoryManager,
};
use git2::{Repository, RepositoryInitOptions, Signature};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

fn write_file<P: AsRef<Path>>(p: P, content: &str) {
    fs::create_dir_all(p.as_ref().parent().unwrap()).unwrap();
    fs::write(p, content).unwrap();
}

/// Creates `<root>/acme/widgets` with one commit on `main`.
fn origin_repo(root: &Path) -> PathBuf {
    let path = root.join("acme").join("widgets");
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("main");
    let repo = Repository::init_opts(&path, &opts).unwrap();

    write_file(path.join("src/app/Service.java"), "package app;\npublic class Service {}\n");
    let sig = Signature::now("Tester", "tester@example.com").unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new("src/app/Service.java")).unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "init", &tree, &[]).unwrap();
    path
}

fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn manager(root: &Path) -> GitRepositoryManager {
    let settings = GitSettings {
        cache_dir: root.join("cache"),
        ..Default::default()
    };
    GitRepositoryManager::new(&settings)
}

fn fixture() -> (TempDir, PathBuf, GitRepositoryManager) {
    let dir = tempdir().unwrap();
    let origin = origin_repo(dir.path());
    let manager = manager(dir.path());
    (dir, origin, manager)
}

#[tokio::test]
async fn clone_without_cache_returns_temp_checkout() {
    let (_dir, origin, manager) = fixture();
    let options = CloneOptions {
        use_cache: false,
        ..Default::default()
    };
    let cloned = manager.clone_repository(&file_url(&origin), options).await.unwrap();

    assert!(!cloned.from_cache);
    assert_eq!(cloned.branch, "main");
    assert_eq!(cloned.temp_dir.as_deref(), Some(cloned.path.as_path()));
    assert!(cloned.path.join("src/app/Service.java").is_file());
    assert_eq!(cloned.last_commit.as_ref().map(String::len), Some(40));
    assert!(cloned
        .path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("codegraph-git-"));

    assert!(manager.cleanup(&cloned.path).await);
    assert!(!cloned.path.exists());
}

#[tokio::test]
async fn second_clone_is_served_from_cache() {
    let (_dir, origin, manager) = fixture();
    let url = file_url(&origin);

    let first = manager.clone_repository(&url, CloneOptions::default()).await.unwrap();
    assert!(!first.from_cache);
    assert!(first.temp_dir.is_none());
    assert!(manager.cache().contains_path(&first.path));

    let second = manager.clone_repository(&url, CloneOptions::default()).await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.path, first.path);
    assert_eq!(second.last_commit, first.last_commit);

    let stats = manager.cache_stats().await.unwrap();
    assert_eq!(stats.entries, 1);
    assert!(stats.total_size_bytes > 0);

    // Cached copies are never removed by cleanup.
    assert!(!manager.cleanup(&second.path).await);
    assert!(second.path.exists());

    manager.clear_cache().await.unwrap();
    assert_eq!(manager.cache_stats().await.unwrap().entries, 0);
}

#[tokio::test]
async fn force_refresh_bypasses_cache() {
    let (_dir, origin, manager) = fixture();
    let url = file_url(&origin);
    manager.clone_repository(&url, CloneOptions::default()).await.unwrap();

    let refreshed = manager
        .clone_repository(
            &url,
            CloneOptions {
                force_refresh: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!refreshed.from_cache);
    assert_eq!(manager.cache_stats().await.unwrap().entries, 1);
}

#[tokio::test]
async fn progress_runs_through_stages() {
    let (_dir, origin, manager) = fixture();
    let stages: Arc<Mutex<Vec<CloneStage>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stages);
    let options = CloneOptions {
        use_cache: false,
        progress: Some(Arc::new(move |p: &CloneProgress| sink.lock().push(p.stage))),
        ..Default::default()
    };

    let cloned = manager.clone_repository(&file_url(&origin), options).await.unwrap();
    manager.cleanup(&cloned.path).await;

    let stages = stages.lock();
    assert_eq!(stages.first(), Some(&CloneStage::Validating));
    assert_eq!(stages.last(), Some(&CloneStage::Completed));
    assert!(stages.contains(&CloneStage::Cloning));
    assert!(!stages.contains(&CloneStage::Caching));
}

#[tokio::test]
async fn failed_clone_cleans_up_and_reports_code() {
    let (dir, _origin, manager) = fixture();
    let target = dir.path().join("clone-target");
    write_file(target.join("keep.txt"), "unrelated");
    let missing = dir.path().join("acme").join("missing");
    let options = CloneOptions {
        use_cache: false,
        temp_dir: Some(target.clone()),
        ..Default::default()
    };

    let err = manager
        .clone_repository(&file_url(&missing), options)
        .await
        .unwrap_err();
    assert_eq!(err.code, GitErrorCode::CloneFailed);
    assert_eq!(err.url.as_deref(), Some(file_url(&missing).as_str()));
    assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "unrelated");
    assert_eq!(fs::read_dir(&target).unwrap().count(), 1);
}

#[tokio::test]
async fn clone_into_supplied_dir_uses_fresh_child() {
    let (dir, origin, manager) = fixture();
    let parent = dir.path().join("work");
    write_file(parent.join("notes.md"), "mine");
    let options = CloneOptions {
        use_cache: false,
        temp_dir: Some(parent.clone()),
        ..Default::default()
    };

    let cloned = manager.clone_repository(&file_url(&origin), options).await.unwrap();
    assert_eq!(cloned.path.parent(), Some(parent.as_path()));
    assert!(cloned.path.join("src/app/Service.java").is_file());

    assert!(manager.cleanup(&cloned.path).await);
    assert!(!cloned.path.exists());
    assert_eq!(fs::read_to_string(parent.join("notes.md")).unwrap(), "mine");
}

#[tokio::test]
async fn validate_lists_remote_refs() {
    let (_dir, origin, manager) = fixture();
    let info = manager.validate_repository(&file_url(&origin), None).await.unwrap();
    assert_eq!(info.name, "widgets");
    assert_eq!(info.full_name, "acme/widgets");
    assert_eq!(info.branch, "main");
}

#[tokio::test]
async fn validate_rejects_missing_and_malformed() {
    let (dir, _origin, manager) = fixture();
    let missing = dir.path().join("acme").join("missing");
    let err = manager
        .validate_repository(&file_url(&missing), None)
        .await
        .unwrap_err();
    assert_eq!(err.code, GitErrorCode::ValidationFailed);

    let err = manager
        .validate_repository("https://github.com/only-owner", None)
        .await
        .unwrap_err();
    assert_eq!(err.code, GitErrorCode::InvalidUrl);
}
