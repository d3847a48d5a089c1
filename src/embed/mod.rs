mod clip;

use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub use self::clip::ClipEmbedder;
use crate::error::Result;

/// CLIP ViT-B/32 的向量维度
pub const EMBEDDING_DIM: usize = 512;

/// 查询类型
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Image,
    Text,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// 一次检索的输入
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// 图片路径
    Image(PathBuf),
    /// 文本描述
    Text(String),
}

impl Query {
    pub fn modality(&self) -> Modality {
        match self {
            Self::Image(_) => Modality::Image,
            Self::Text(_) => Modality::Text,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image(path) => write!(f, "{}", path.display()),
            Self::Text(text) => write!(f, "'{}'", text),
        }
    }
}

/// 多模态向量模型，图片和文本被映射到同一个向量空间
pub trait Embedder: Send + Sync {
    /// 模型标识，保存在数据库配置中，用于确认查询和文档处于同一向量空间
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    /// 提前完成耗时的初始化，例如加载模型
    fn prepare(&self) -> Result<()> {
        Ok(())
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>>;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    fn embed(&self, query: &Query) -> Result<Vec<f32>> {
        match query {
            Query::Image(path) => self.embed_image(path),
            Query::Text(text) => self.embed_text(text),
        }
    }
}

type Loader<E> = Box<dyn Fn() -> Result<E> + Send + Sync>;

/// 首次使用时才加载模型，每个进程最多加载一次
pub struct LazyEmbedder<E> {
    model_id: String,
    dimensions: usize,
    loader: Loader<E>,
    inner: OnceCell<E>,
}

impl<E: Embedder> LazyEmbedder<E> {
    pub fn new<F>(model_id: impl Into<String>, dimensions: usize, loader: F) -> Self
    where
        F: Fn() -> Result<E> + Send + Sync + 'static,
    {
        Self { model_id: model_id.into(), dimensions, loader: Box::new(loader), inner: OnceCell::new() }
    }

    /// 模型是否已经加载
    pub fn is_loaded(&self) -> bool {
        self.inner.get().is_some()
    }

    fn get(&self) -> Result<&E> {
        self.inner.get_or_try_init(|| (self.loader)())
    }
}

impl<E: Embedder> Embedder for LazyEmbedder<E> {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn prepare(&self) -> Result<()> {
        self.get().map(|_| ())
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        self.get()?.embed_image(path)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.get()?.embed_text(text)
    }
}
