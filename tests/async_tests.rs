use scoped_tempfile::{Builder, NamedTempFile, TempDir, TempFile};
use std::io::Write;

#[tokio::test]
async fn named_file_closes_on_a_blocking_thread() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"async").unwrap();
    let path = file.path().to_path_buf();
    assert!(path.is_file());

    file.close_async().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn kept_file_survives_close_async() {
    let root = TempDir::new().unwrap();
    let file = Builder::new().dir(root.path()).delete(false).named_tempfile().unwrap();
    let path = file.path().to_path_buf();

    file.close_async().await.unwrap();
    assert!(path.is_file());
    root.cleanup_async().await.unwrap();
    assert!(!path.exists());
}

#[tokio::test]
async fn anonymous_file_closes_on_a_blocking_thread() {
    let mut file = TempFile::new().unwrap();
    file.write_all(b"async").unwrap();
    file.close_async().await.unwrap();
}

#[tokio::test]
async fn dir_cleans_up_on_a_blocking_thread() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();
    std::fs::write(path.join("nested"), b"x").unwrap();

    dir.cleanup_async().await.unwrap();
    assert!(!path.exists());
}

#[test]
fn cleanup_async_runs_on_a_current_thread_runtime() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();

    tokio_test::block_on(dir.cleanup_async()).unwrap();
    assert!(!path.exists());
}

#[cfg(feature = "async-trait")]
#[tokio::test]
async fn async_close_covers_all_entry_types() {
    use scoped_tempfile::AsyncClose;

    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let named = NamedTempFile::new_in(&root).unwrap();
    let named_path = named.path().to_path_buf();
    let anonymous = TempFile::new_in(&root).unwrap();

    AsyncClose::close(named).await.unwrap();
    assert!(!named_path.exists());
    AsyncClose::close(anonymous).await.unwrap();
    AsyncClose::close(dir).await.unwrap();
    assert!(!root.exists());
}
