//! Integration tests for the FileVault CLI.
//!
//! These tests drive the binary end-to-end using `assert_cmd`.  Passwords
//! come from `FILEVAULT_PASSWORD` so no prompt is ever shown, and the
//! config written into each temp dir keeps Argon2 cheap.

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

const FAST_CONFIG: &str = r#"
data_dir = ".filevault"
argon2_memory_kib = 8192
argon2_iterations = 1
argon2_parallelism = 1
chunk_size = 16
"#;

/// Helper: get a Command pointing at the filevault binary.
fn filevault() -> Command {
    #[allow(deprecated)]
    let mut cmd = Command::cargo_bin("filevault").expect("binary should exist");
    cmd.env_remove("FILEVAULT_SERVER_KEY")
        .env_remove("FILEVAULT_USER")
        .env_remove("FILEVAULT_PASSWORD")
        .env_remove("RUST_LOG");
    cmd
}

/// Helper: a command running in `dir` as `alice`.
fn as_alice(dir: &TempDir) -> Command {
    let mut cmd = filevault();
    cmd.current_dir(dir.path())
        .env("FILEVAULT_USER", "alice")
        .env("FILEVAULT_PASSWORD", "correct horse battery");
    cmd
}

/// Helper: an initialised store with `alice` registered.
fn initialised() -> TempDir {
    let tmp = TempDir::new().unwrap();
    tmp.child("filevault.toml").write_str(FAST_CONFIG).unwrap();
    filevault().current_dir(tmp.path()).arg("init").assert().success();
    as_alice(&tmp).arg("register").assert().success();
    tmp
}

fn stdout_line(output: &std::process::Output) -> String {
    String::from_utf8(output.stdout.clone()).unwrap().trim().to_string()
}

#[test]
fn help_flag_shows_usage() {
    filevault()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Encrypted file store"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("register"))
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("list"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("publish"))
        .stdout(predicate::str::contains("fetch"));
}

#[test]
fn version_flag_shows_version() {
    filevault()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("filevault"));
}

#[test]
fn no_args_shows_help() {
    filevault()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn commands_before_init_report_missing_server_key() {
    let tmp = TempDir::new().unwrap();

    filevault()
        .current_dir(tmp.path())
        .args(["list", "--user", "alice"])
        .env("FILEVAULT_PASSWORD", "correct horse battery")
        .assert()
        .failure()
        .stderr(predicate::str::contains("server key not found"));
}

#[test]
fn init_creates_data_dir_and_server_key() {
    let tmp = TempDir::new().unwrap();
    tmp.child("filevault.toml").write_str(FAST_CONFIG).unwrap();

    filevault().current_dir(tmp.path()).arg("init").assert().success();

    let key = std::fs::read_to_string(tmp.path().join(".filevault/server.key")).unwrap();
    assert_eq!(key.trim().len(), 64);
    assert!(key.trim().chars().all(|c| c.is_ascii_hexdigit()));

    // A second init keeps the existing key.
    filevault().current_dir(tmp.path()).arg("init").assert().success();
    let again = std::fs::read_to_string(tmp.path().join(".filevault/server.key")).unwrap();
    assert_eq!(key, again);
}

#[test]
fn init_writes_default_config_when_missing() {
    let tmp = TempDir::new().unwrap();

    filevault().current_dir(tmp.path()).arg("init").assert().success();

    tmp.child("filevault.toml")
        .assert(predicate::str::contains("argon2_memory_kib"));
}

#[test]
fn register_twice_fails() {
    let tmp = initialised();

    as_alice(&tmp)
        .arg("register")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn wrong_password_is_rejected() {
    let tmp = initialised();

    as_alice(&tmp)
        .env("FILEVAULT_PASSWORD", "not the password")
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid credentials"));
}

#[test]
fn full_upload_share_and_delete_flow() {
    let tmp = initialised();
    let source = tmp.child("notes.txt");
    source.write_str("meeting at noon\n").unwrap();

    // Upload prints the new file id.
    let output = as_alice(&tmp)
        .args(["upload", "notes.txt", "--path", "/work"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let id = stdout_line(&output);
    assert_eq!(id.len(), 32);

    // Blob on disk is ciphertext plus a 16-byte tag.
    let blob = std::fs::read(tmp.path().join(".filevault/blobs").join(format!("{id}.blob"))).unwrap();
    assert_eq!(blob.len(), "meeting at noon\n".len() + 16);
    assert!(!blob.windows(7).any(|w| w == b"meeting"));

    as_alice(&tmp)
        .args(["list", "--path", "/work"])
        .assert()
        .success()
        .stdout(predicate::str::contains("notes.txt"))
        .stdout(predicate::str::contains("private"));

    as_alice(&tmp)
        .args(["download", &id, "-o", "copy.txt"])
        .assert()
        .success();
    tmp.child("copy.txt").assert("meeting at noon\n");

    as_alice(&tmp)
        .args(["preview", &id])
        .assert()
        .success()
        .stdout("meeting at noon\n");

    // Publish prints the public id; fetch needs no user.
    let output = as_alice(&tmp).args(["publish", &id]).output().unwrap();
    assert!(output.status.success());
    let public_id = stdout_line(&output);
    assert_eq!(public_id.len(), 32);

    filevault()
        .current_dir(tmp.path())
        .args(["fetch", &public_id, "-o", "public.txt"])
        .assert()
        .success();
    tmp.child("public.txt").assert("meeting at noon\n");

    as_alice(&tmp)
        .args(["publish", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already public"));

    as_alice(&tmp).args(["unpublish", &id]).assert().success();

    filevault()
        .current_dir(tmp.path())
        .args(["fetch", &public_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));

    as_alice(&tmp).args(["delete", &id, "--force"]).assert().success();

    as_alice(&tmp)
        .args(["download", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
    assert!(!tmp.path().join(".filevault/blobs").join(format!("{id}.blob")).exists());
}

#[test]
fn other_users_cannot_read_private_files() {
    let tmp = initialised();
    tmp.child("secret.txt").write_str("alice only").unwrap();

    let output = as_alice(&tmp).args(["upload", "secret.txt"]).output().unwrap();
    assert!(output.status.success());
    let id = stdout_line(&output);

    as_alice(&tmp)
        .env("FILEVAULT_USER", "mallory")
        .arg("register")
        .assert()
        .success();

    as_alice(&tmp)
        .env("FILEVAULT_USER", "mallory")
        .args(["download", &id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn upload_several_files_prints_one_id_each() {
    let tmp = initialised();
    tmp.child("one.txt").write_str("first").unwrap();
    tmp.child("two.pdf").write_str("second").unwrap();

    let output = as_alice(&tmp)
        .args(["upload", "one.txt", "two.pdf", "--path", "/batch"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    let ids: Vec<&str> = stdout.lines().collect();
    assert_eq!(ids.len(), 2);
    assert_ne!(ids[0], ids[1]);

    as_alice(&tmp)
        .args(["list", "--path", "/batch"])
        .assert()
        .success()
        .stdout(predicate::str::contains("one.txt"))
        .stdout(predicate::str::contains("two.pdf"));

    as_alice(&tmp)
        .args(["preview", ids[1]])
        .assert()
        .success()
        .stdout("second");
}

#[test]
fn upload_rejects_name_with_several_files() {
    let tmp = initialised();
    tmp.child("one.txt").write_str("first").unwrap();
    tmp.child("two.txt").write_str("second").unwrap();

    as_alice(&tmp)
        .args(["upload", "one.txt", "two.txt", "--name", "x.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("single file"));
}

#[cfg(feature = "audit-log")]
#[test]
fn audit_records_operations() {
    let tmp = initialised();
    tmp.child("a.txt").write_str("abc").unwrap();
    as_alice(&tmp).args(["upload", "a.txt"]).assert().success();

    filevault()
        .current_dir(tmp.path())
        .args(["audit", "--last", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("register"));
}

#[test]
fn completions_bash_generates_script() {
    filevault()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("filevault"));
}
