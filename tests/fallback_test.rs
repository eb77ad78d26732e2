use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

fn script() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"{{"op":"register_user","user":"u1","name":"Ada","email":"ada@example.com"}}"#
    )
    .unwrap();
    file
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let file = script();
    let dir = tempfile::tempdir().unwrap();

    let mut cmd = Command::new(cargo_bin!("payrecon"));
    cmd.arg(file.path()).arg("--db-path").arg(dir.path().join("some_db"));

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."))
        .stdout(predicate::str::contains("u1,0,"));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let file = script();
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    let mut cmd = Command::new(cargo_bin!("payrecon"));
    cmd.arg(file.path()).arg("--db-path").arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back").not());
}
