use log::{error, info, warn};
use serde::Serialize;

use crate::config::DbDir;
use crate::embed::{Embedder, Query};
use crate::error::{Error, Result};
use crate::store::DocumentStore;

/// 默认返回的结果数量
pub const DEFAULT_TOP_K: usize = 3;

/// 一条检索结果
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ScoredResult {
    /// 排名，从 1 开始
    pub rank: usize,
    /// 缩放到 [0, 1] 的分数
    pub score: f32,
    /// 原始余弦相似度
    pub similarity: f32,
    pub id: u64,
    pub content: String,
    pub filename: String,
}

/// 将余弦相似度从 [-1, 1] 缩放到 [0, 1]
pub fn scale_score(similarity: f32) -> f32 {
    ((similarity + 1.0) / 2.0).clamp(0.0, 1.0)
}

pub struct Retriever<'a, E: Embedder + ?Sized> {
    embedder: &'a E,
    top_k: usize,
}

impl<'a, E: Embedder + ?Sized> Retriever<'a, E> {
    pub fn new(embedder: &'a E, top_k: usize) -> Self {
        Self { embedder, top_k }
    }

    /// 以只读模式加载数据库
    ///
    /// 数据库不存在或无法加载时返回 [`Error::NoDatabase`]
    pub async fn open_store(&self, dir: &DbDir) -> Result<DocumentStore> {
        match DocumentStore::open(dir.clone(), true).await {
            Ok(Some(store)) => Ok(store),
            Ok(None) => Err(Error::NoDatabase(dir.path().to_path_buf())),
            Err(e) => {
                error!("无法加载数据库: {}", e);
                Err(Error::NoDatabase(dir.path().to_path_buf()))
            }
        }
    }

    pub fn retrieve(&self, query: &Query, store: &DocumentStore) -> Result<Vec<ScoredResult>> {
        self.retrieve_k(query, store, self.top_k)
    }

    /// 计算查询向量并在数据库中搜索最相似的 `top_k` 张图片
    pub fn retrieve_k(
        &self,
        query: &Query,
        store: &DocumentStore,
        top_k: usize,
    ) -> Result<Vec<ScoredResult>> {
        let config = store.config();
        if self.embedder.dimensions() != config.embedding_dim {
            return Err(Error::DimensionMismatch {
                expected: config.embedding_dim,
                actual: self.embedder.dimensions(),
            });
        }
        if self.embedder.model_id() != config.embedding_model {
            warn!(
                "数据库使用模型 {} 创建，当前模型为 {}，结果可能不准确",
                config.embedding_model,
                self.embedder.model_id()
            );
        }
        if store.embedded_count() == 0 {
            info!("数据库中没有可搜索的图片");
            return Ok(vec![]);
        }

        let modality = query.modality();
        info!("搜索 {}: {}", modality, query);
        let embedding = self.embedder.embed(query)?;

        let results = store
            .search(&embedding, top_k, modality)?
            .into_iter()
            .enumerate()
            .map(|(i, (doc, similarity))| ScoredResult {
                rank: i + 1,
                score: scale_score(similarity),
                similarity,
                id: doc.id,
                content: doc.content.clone(),
                filename: doc.filename().to_owned(),
            })
            .collect();

        Ok(results)
    }
}
