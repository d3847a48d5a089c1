use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// 数据库文件存在，但无法读取或已损坏
    #[error("无法加载数据库 {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// 单个输入无法计算向量
    #[error("无法计算向量 {input}: {reason}")]
    Embedding { input: String, reason: String },

    /// 目标目录中没有可用的数据库
    #[error("数据库不存在: {0}")]
    NoDatabase(PathBuf),

    /// 图片目录无法读取
    #[error("无法读取目录 {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 模型加载失败
    #[error("无法加载模型 {model}: {reason}")]
    Model { model: String, reason: String },

    #[error("向量维度不一致: 期望 {expected}，实际 {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("数据库以只读模式打开")]
    ReadOnly,

    #[error("索引错误: {0}")]
    Index(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Load { path: path.into(), reason: reason.to_string() }
    }

    pub fn embedding(input: impl ToString, reason: impl ToString) -> Self {
        Self::Embedding { input: input.to_string(), reason: reason.to_string() }
    }
}
