use std::fs;
use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use rstest::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

#[test]
fn version() -> Result<()> {
    cargo_run!("imvec", "--version").success().stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn search_without_database() -> Result<()> {
    let db = assert_fs::TempDir::new()?;

    cargo_run!("imvec", "search_db", "-d", db.path(), "-t", "a cat")
        .failure()
        .stderr(predicate::str::contains("数据库不存在"));

    Ok(())
}

#[test]
fn query_flags_are_exclusive() -> Result<()> {
    let db = assert_fs::TempDir::new()?;

    cargo_run!("imvec", "search_db", "-d", db.path(), "-t", "a cat", "-i", "cat.jpg").failure();
    cargo_run!("imvec", "search_db", "-d", db.path()).failure();

    Ok(())
}

#[test]
fn create_from_missing_folder() -> Result<()> {
    let db = assert_fs::TempDir::new()?;

    cargo_run!("imvec", "create_db", "-f", db.path().join("missing"), "-o", db.path().join("db"))
        .failure()
        .stderr(predicate::str::contains("无法读取目录"));

    Ok(())
}

/// 目录中没有图片时不需要加载模型
#[rstest]
#[case::empty(&[])]
#[case::no_images(&["notes.txt", "readme.md"])]
fn create_and_search_empty(#[case] files: &[&str]) -> Result<()> {
    let images = assert_fs::TempDir::new()?;
    let db = assert_fs::TempDir::new()?;
    for name in files {
        images.child(name).write_str("not an image")?;
    }

    cargo_run!("imvec", "create_db", "-f", images.path(), "-o", db.path()).success();

    db.child("config.json").assert(predicate::path::is_file());
    db.child("store.db").assert(predicate::path::is_file());
    db.child("index.flat").assert(predicate::path::is_file());

    let config: serde_json::Value = serde_json::from_str(&fs::read_to_string(db.child("config.json").path())?)?;
    assert_eq!(config["document_count"], 0);
    assert_eq!(config["index"], "flat");

    // 重复同步不会改变数据库
    cargo_run!("imvec", "create_db", "-f", images.path(), "-o", db.path()).success();

    cargo_run!("imvec", "search_db", "-d", db.path(), "-t", "a cat", "--output-format", "json")
        .success()
        .stdout(predicate::str::diff("[]\n"));

    Ok(())
}

#[test]
fn create_with_hnsw_index() -> Result<()> {
    let images = assert_fs::TempDir::new()?;
    let db = assert_fs::TempDir::new()?;

    cargo_run!("imvec", "create_db", "-f", images.path(), "-o", db.path(), "--index", "hnsw").success();
    db.child("index.usearch").assert(predicate::path::exists());
    db.child("index.flat").assert(predicate::path::missing());

    Ok(())
}

#[test]
fn create_replaces_corrupt_database() -> Result<()> {
    let images = assert_fs::TempDir::new()?;
    let db = assert_fs::TempDir::new()?;
    db.child("config.json").write_str("garbage")?;
    db.child("store.db").write_str("garbage")?;

    cargo_run!("imvec", "create_db", "-f", images.path(), "-o", db.path()).success();

    let moved = fs::read_dir(db.path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .count();
    assert!(moved >= 2);
    db.child("config.json").assert(predicate::str::contains("\"document_count\": 0"));

    Ok(())
}
