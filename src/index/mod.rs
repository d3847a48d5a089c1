mod flat;
mod usearch;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub use self::flat::FlatIndex;
pub use self::usearch::HnswIndex;
use crate::error::Result;

/// 最近邻搜索结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// 文档 ID
    pub id: u64,
    /// 余弦相似度，范围 [-1, 1]
    pub similarity: f32,
}

/// 向量索引，只负责 ID 到向量的映射和余弦相似度搜索
pub trait VectorIndex: Send + Sync {
    /// 向量维度
    fn dimensions(&self) -> usize;

    /// 索引中的向量数量
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 索引中是否包含该 ID
    fn contains(&self, id: u64) -> bool;

    /// 添加一条向量，ID 已存在时覆盖
    fn add(&mut self, id: u64, vector: &[f32]) -> Result<()>;

    /// 删除一条向量，ID 不存在时什么都不做
    fn remove(&mut self, id: u64) -> Result<()>;

    /// 搜索最相似的 k 条向量，按相似度降序排列，相似度相同时 ID 小的在前
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// 保存索引到文件
    fn save(&self, path: &Path) -> Result<()>;
}

/// 索引类型
#[derive(ValueEnum, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// 暴力搜索，结果精确
    #[default]
    Flat,
    /// HNSW 近似搜索
    Hnsw,
}

impl IndexKind {
    /// 索引文件名
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::Flat => "index.flat",
            Self::Hnsw => "index.usearch",
        }
    }

    /// 创建一个空索引
    pub fn create(&self, dimensions: usize) -> Result<Box<dyn VectorIndex>> {
        Ok(match self {
            Self::Flat => Box::new(FlatIndex::new(dimensions)),
            Self::Hnsw => Box::new(HnswIndex::new(dimensions)?),
        })
    }

    /// 从文件加载索引
    pub fn open(&self, path: &Path, dimensions: usize) -> Result<Box<dyn VectorIndex>> {
        Ok(match self {
            Self::Flat => Box::new(FlatIndex::open(path, dimensions)?),
            Self::Hnsw => Box::new(HnswIndex::open(path, dimensions)?),
        })
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flat => write!(f, "flat"),
            Self::Hnsw => write!(f, "hnsw"),
        }
    }
}

impl FromStr for IndexKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "hnsw" => Ok(Self::Hnsw),
            _ => Err(format!("未知的索引类型: {}", s)),
        }
    }
}

/// 按相似度降序排列，相似度相同时按 ID 升序
pub(crate) fn sort_neighbors(neighbors: &mut [Neighbor]) {
    neighbors.sort_by(|a, b| b.similarity.total_cmp(&a.similarity).then(a.id.cmp(&b.id)));
}

/// 将向量归一化为单位向量，零向量保持不变
pub fn normalize(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 { vector.iter().map(|x| x / norm).collect() } else { vector.to_vec() }
}

/// 余弦相似度
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}
