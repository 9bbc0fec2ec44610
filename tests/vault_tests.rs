//! End-to-end tests of the file service over the filesystem stores.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use filevault::auth::{self, Session};
use filevault::crypto::{Argon2Params, MasterKey, ReleasePolicy};
use filevault::errors::FileVaultError;
use filevault::storage::{
    FileIndex, FsBlobStore, JsonFileIndex, JsonUserDirectory, MemoryBlobStore, MemoryFileIndex,
    MemoryUserDirectory, UserDirectory,
};
use filevault::vault::{Disposition, FileContent, FileVault, UploadRequest, VaultOptions};
use futures::stream::{self, StreamExt, TryStreamExt};
use tempfile::TempDir;

fn fast_params() -> Argon2Params {
    Argon2Params {
        memory_kib: 8192,
        iterations: 1,
        parallelism: 1,
    }
}

fn upload_request(path: &str, name: &str, content: &[u8]) -> UploadRequest {
    let chunks: Vec<std::io::Result<Bytes>> = content
        .chunks(4)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    UploadRequest {
        path: path.into(),
        filename: name.into(),
        content_type: "text/plain".into(),
        body: stream::iter(chunks).boxed(),
    }
}

async fn read(content: FileContent) -> Result<Vec<u8>, FileVaultError> {
    let parts: Vec<Bytes> = content.body.try_collect().await?;
    Ok(parts.concat())
}

struct Store {
    dir: TempDir,
    blobs: Arc<FsBlobStore>,
    index: Arc<JsonFileIndex>,
    users: Arc<JsonUserDirectory>,
    vault: FileVault,
}

async fn fs_store(policy: ReleasePolicy) -> Store {
    let dir = TempDir::new().unwrap();
    let blobs = Arc::new(FsBlobStore::open(dir.path(), 8).await.unwrap());
    let index = Arc::new(JsonFileIndex::open(dir.path()).await.unwrap());
    let users = Arc::new(JsonUserDirectory::open(dir.path()).await.unwrap());
    let vault = FileVault::new(
        blobs.clone(),
        index.clone(),
        Arc::new(MasterKey::generate()),
        VaultOptions {
            release_policy: policy,
            chunk_size: 8,
        },
    );
    Store {
        dir,
        blobs,
        index,
        users,
        vault,
    }
}

async fn alice(users: &dyn UserDirectory) -> Session {
    auth::register(users, "alice", "correct horse", &fast_params())
        .await
        .unwrap();
    auth::login(users, "alice", "correct horse", &fast_params(), Duration::from_secs(300))
        .await
        .unwrap()
}

#[tokio::test]
async fn ten_byte_file_upload_list_download_preview() {
    let store = fs_store(ReleasePolicy::Optimistic).await;
    let session = alice(store.users.as_ref()).await;

    let file = store
        .vault
        .upload(&session, upload_request("/docs", "ten.txt", b"0123456789"))
        .await
        .unwrap();
    assert_eq!(file.size, 26);
    assert_eq!(std::fs::read(store.blobs.blob_path(&file.id)).unwrap().len(), 26);

    let listed = store.vault.list_files(&session, "/docs").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].filename, "ten.txt");
    assert!(!listed[0].is_public());
    assert!(store.vault.list_files(&session, "/").await.unwrap().is_empty());

    let download = store.vault.download(&session, &file.id).await.unwrap();
    assert_eq!(download.disposition.header_value(), "inline; filename=\"ten.txt\"");
    assert_eq!(read(download).await.unwrap(), b"0123456789");

    let preview = store.vault.preview(&session, &file.id).await.unwrap();
    assert_eq!(preview.disposition, Disposition::Preview);
    assert_eq!(preview.disposition.header_value(), "inline");
    assert_eq!(read(preview).await.unwrap(), b"0123456789");
}

#[tokio::test]
async fn public_fetch_needs_no_session_but_owner_path_does() {
    let store = fs_store(ReleasePolicy::Optimistic).await;
    let session = alice(store.users.as_ref()).await;
    let file = store
        .vault
        .upload(&session, upload_request("/", "shared.txt", b"hello public"))
        .await
        .unwrap();
    let public_id = store.vault.make_public(&session, &file.id).await.unwrap();

    let fetched = store.vault.fetch_public(&public_id).await.unwrap();
    assert_eq!(read(fetched).await.unwrap(), b"hello public");

    let mut logged_out = session.clone();
    logged_out.logout();
    assert!(matches!(
        store.vault.download(&logged_out, &file.id).await,
        Err(FileVaultError::SessionExpired)
    ));
    assert!(matches!(
        store.vault.preview(&logged_out, &file.id).await,
        Err(FileVaultError::SessionExpired)
    ));

    // With a live session the owner can still read the public file.
    let owned = store.vault.download(&session, &file.id).await.unwrap();
    assert_eq!(read(owned).await.unwrap(), b"hello public");
}

#[tokio::test]
async fn visibility_round_trip_leaves_blob_byte_identical() {
    let store = fs_store(ReleasePolicy::Optimistic).await;
    let session = alice(store.users.as_ref()).await;
    let file = store
        .vault
        .upload(&session, upload_request("/", "stable.bin", &[0xA5; 1000]))
        .await
        .unwrap();
    let blob_path = store.blobs.blob_path(&file.id);
    let before = std::fs::read(&blob_path).unwrap();

    let public_id = store.vault.make_public(&session, &file.id).await.unwrap();
    store.vault.make_private(&session, &file.id).await.unwrap();

    assert_eq!(std::fs::read(&blob_path).unwrap(), before);
    assert!(matches!(
        store.vault.fetch_public(&public_id).await,
        Err(FileVaultError::FileNotFound(_))
    ));
    let content = store.vault.download(&session, &file.id).await.unwrap();
    assert_eq!(read(content).await.unwrap(), vec![0xA5; 1000]);

    let record = store.index.get(&file.id).await.unwrap().unwrap();
    assert!(record.public_id().is_none());
}

#[tokio::test]
async fn concurrent_make_public_yields_one_public_id() {
    let store = fs_store(ReleasePolicy::Optimistic).await;
    let session = alice(store.users.as_ref()).await;
    let file = store
        .vault
        .upload(&session, upload_request("/", "race.txt", b"contended"))
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        store.vault.make_public(&session, &file.id),
        store.vault.make_public(&session, &file.id),
    );

    let winners: Vec<_> = [&a, &b].into_iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1, "exactly one call succeeds: {a:?} / {b:?}");
    let loser = if a.is_ok() { &b } else { &a };
    assert!(matches!(
        loser,
        Err(FileVaultError::VisibilityConflict(_)) | Err(FileVaultError::InvalidTransition { .. })
    ));

    let record = store.index.get(&file.id).await.unwrap().unwrap();
    assert_eq!(record.public_id(), Some(winners[0]));
    let fetched = store.vault.fetch_public(winners[0]).await.unwrap();
    assert_eq!(read(fetched).await.unwrap(), b"contended");
}

#[tokio::test]
async fn racing_publishers_over_memory_index() {
    let index = Arc::new(MemoryFileIndex::new());
    let vault = Arc::new(FileVault::new(
        Arc::new(MemoryBlobStore::new(16)),
        index.clone(),
        Arc::new(MasterKey::generate()),
        VaultOptions::default(),
    ));
    let users = MemoryUserDirectory::new();
    let session = alice(&users).await;
    let file = vault
        .upload(&session, upload_request("/", "race.txt", b"many callers"))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let vault = vault.clone();
        let session = session.clone();
        let id = file.id.clone();
        tasks.push(tokio::spawn(async move { vault.make_public(&session, &id).await }));
    }

    let mut ids = Vec::new();
    for task in tasks {
        if let Ok(public_id) = task.await.unwrap() {
            ids.push(public_id);
        }
    }
    assert_eq!(ids.len(), 1);
    let record = index.get(&file.id).await.unwrap().unwrap();
    assert_eq!(record.public_id(), Some(&ids[0]));
}

#[tokio::test]
async fn user_without_salt_cannot_log_in_or_decrypt() {
    let store = fs_store(ReleasePolicy::Optimistic).await;
    let session = alice(store.users.as_ref()).await;
    store
        .vault
        .upload(&session, upload_request("/", "a.txt", b"private"))
        .await
        .unwrap();

    // Simulate a record persisted before salts existed.
    let users_path = store.dir.path().join(JsonUserDirectory::FILE_NAME);
    let mut users: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&users_path).unwrap()).unwrap();
    users[0]["salt"] = serde_json::Value::Null;
    std::fs::write(&users_path, serde_json::to_vec(&users).unwrap()).unwrap();

    let reopened = JsonUserDirectory::open(store.dir.path()).await.unwrap();
    for _ in 0..3 {
        let result = auth::login(
            &reopened,
            "alice",
            "correct horse",
            &fast_params(),
            Duration::from_secs(60),
        )
        .await;
        assert!(matches!(result, Err(FileVaultError::KeyDerivationFailed(_))));
    }
}

#[tokio::test]
async fn tampered_blob_on_disk_is_rejected() {
    for policy in [ReleasePolicy::Optimistic, ReleasePolicy::Verified] {
        let store = fs_store(policy).await;
        let session = alice(store.users.as_ref()).await;
        let file = store
            .vault
            .upload(&session, upload_request("/", "t.txt", b"do not touch this content"))
            .await
            .unwrap();

        let path = store.blobs.blob_path(&file.id);
        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x80;
        std::fs::write(&path, raw).unwrap();

        let content = store.vault.download(&session, &file.id).await.unwrap();
        assert!(
            matches!(read(content).await, Err(FileVaultError::AuthenticationFailed)),
            "{policy:?}"
        );
    }
}

#[tokio::test]
async fn verified_policy_releases_nothing_from_a_tampered_blob() {
    let store = fs_store(ReleasePolicy::Verified).await;
    let session = alice(store.users.as_ref()).await;
    let file = store
        .vault
        .upload(&session, upload_request("/", "t.txt", &[1u8; 200]))
        .await
        .unwrap();

    let path = store.blobs.blob_path(&file.id);
    let mut raw = std::fs::read(&path).unwrap();
    raw[0] ^= 0x01;
    std::fs::write(&path, raw).unwrap();

    let mut body = store.vault.download(&session, &file.id).await.unwrap().body;
    assert!(matches!(body.next().await, Some(Err(FileVaultError::AuthenticationFailed))));
    assert!(body.next().await.is_none());
}

#[tokio::test]
async fn records_and_blobs_survive_reopening() {
    let dir = TempDir::new().unwrap();
    let server_key = Arc::new(MasterKey::generate());
    let open = |dir: &TempDir| {
        let path = dir.path().to_path_buf();
        let server_key = server_key.clone();
        async move {
            FileVault::new(
                Arc::new(FsBlobStore::open(&path, 64).await.unwrap()),
                Arc::new(JsonFileIndex::open(&path).await.unwrap()),
                server_key,
                VaultOptions::default(),
            )
        }
    };

    let users = JsonUserDirectory::open(dir.path()).await.unwrap();
    let session = alice(&users).await;

    let (file, public_id) = {
        let vault = open(&dir).await;
        let file = vault
            .upload(&session, upload_request("/", "keep.txt", b"persisted"))
            .await
            .unwrap();
        let public_id = vault.make_public(&session, &file.id).await.unwrap();
        (file, public_id)
    };

    let vault = open(&dir).await;
    let fetched = vault.fetch_public(&public_id).await.unwrap();
    assert_eq!(fetched.file.id, file.id);
    assert_eq!(read(fetched).await.unwrap(), b"persisted");
}
