use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;
use crate::index::IndexKind;
use crate::retriever::DEFAULT_TOP_K;

/// 默认模型
pub const DEFAULT_MODEL: &str = "openai/clip-vit-base-patch32";

static MODEL_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    let proj_dirs = ProjectDirs::from("", "imvec", "imvec").expect("failed to get project dir");
    proj_dirs.cache_dir().join("models")
});

fn default_model_dir() -> &'static str {
    MODEL_DIR.to_str().unwrap_or(".models")
}

#[derive(Parser, Debug, Clone)]
pub struct EmbedOptions {
    /// 推理设备：cpu、cuda 或 cuda:N
    #[arg(long, global = true, value_name = "DEVICE", default_value = "cpu")]
    pub device: String,
    /// Hugging Face 上的 CLIP 模型仓库
    #[arg(long, global = true, value_name = "REPO", default_value = DEFAULT_MODEL)]
    pub model: String,
    /// 模型缓存目录
    #[arg(long, global = true, value_name = "DIR", default_value = default_model_dir())]
    pub model_dir: PathBuf,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 显示的结果数量
    #[arg(short = 'k', long, value_name = "COUNT", default_value_t = DEFAULT_TOP_K)]
    pub count: usize,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value = "table")]
    pub output_format: OutputFormat,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "imvec",
    version,
    about = "在图片目录中建立向量索引，并通过图片或文本搜索相似图片"
)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    #[command(flatten)]
    pub embed: EmbedOptions,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 创建或更新图片向量数据库
    #[command(name = "create_db")]
    CreateDb(CreateDbCommand),
    /// 在向量数据库中搜索图片
    #[command(name = "search_db")]
    SearchDb(SearchDbCommand),
}

/// 数据库目录
#[derive(Debug, Clone)]
pub struct DbDir {
    path: PathBuf,
}

impl DbDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回 SQLite 数据库文件的路径
    pub fn database(&self) -> PathBuf {
        self.path.join("store.db")
    }

    /// 返回配置文件的路径
    pub fn config(&self) -> PathBuf {
        self.path.join("config.json")
    }

    /// 返回索引文件的路径
    pub fn index(&self, kind: IndexKind) -> PathBuf {
        self.path.join(kind.file_name())
    }

    /// 返回目录中已存在的数据库文件，包括 SQLite 的 WAL 文件
    pub fn existing_files(&self) -> Vec<PathBuf> {
        let mut files = vec![
            self.config(),
            self.database(),
            self.path.join("store.db-wal"),
            self.path.join("store.db-shm"),
        ];
        files.extend([IndexKind::Flat, IndexKind::Hnsw].map(|kind| self.index(kind)));
        files.into_iter().filter(|p| p.exists()).collect()
    }
}

impl FromStr for DbDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}
