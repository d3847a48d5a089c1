use std::path::Path;

use log::info;
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
pub mod model;

pub use model::*;

pub type Database = SqlitePool;

pub async fn init_db(filename: impl AsRef<Path>, read_only: bool) -> Result<Database, sqlx::Error> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    // NOTE: 只读模式下不设置 SQLite 的 read_only 标志，否则在缺少 -shm 文件时无法打开 WAL 模式的数据库
    let options = SqliteConnectOptions::new().filename(filename);
    let options = if read_only {
        options
    } else {
        options
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true)
    };

    let pool = SqlitePool::connect_with(options).await?;

    if !read_only {
        info!("检查数据库迁移");
        sqlx::migrate!().run(&pool).await?;
    }

    Ok(pool)
}
