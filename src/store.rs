use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use log::{debug, error, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::DbDir;
use crate::db::{self, Database, DocumentRecord, crud};
use crate::embed::Modality;
use crate::error::{Error, Result};
use crate::index::{IndexKind, VectorIndex};
use crate::utils::write_atomic;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 文档内容类型
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Image,
}

impl ContentType {
    /// 该类型的文档能否被指定类型的查询检索到
    ///
    /// 图片和文本处于同一个向量空间，因此图片文档可以被两种查询检索
    pub fn searchable_by(&self, modality: Modality) -> bool {
        match self {
            Self::Image => matches!(modality, Modality::Image | Modality::Text),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            _ => Err(format!("未知的内容类型: {}", s)),
        }
    }
}

/// 待插入的文档，此时还没有 ID 和向量
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    pub content: String,
    pub content_type: ContentType,
    pub meta: BTreeMap<String, String>,
}

impl NewDocument {
    /// 以图片路径创建文档，元数据中记录文件名
    pub fn image(path: &Path) -> Self {
        let filename = path.file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        Self {
            content: path.to_string_lossy().to_string(),
            content_type: ContentType::Image,
            meta: BTreeMap::from([("filename".to_string(), filename)]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: u64,
    /// 图片路径，同时也是文档在库中的唯一键
    pub content: String,
    pub content_type: ContentType,
    pub meta: BTreeMap<String, String>,
    pub embedding: Option<Vec<f32>>,
}

impl Document {
    pub fn filename(&self) -> &str {
        self.meta.get("filename").map(|s| s.as_str()).unwrap_or(&self.content)
    }

    fn to_record(&self) -> Result<DocumentRecord> {
        Ok(DocumentRecord {
            id: self.id as i64,
            content: self.content.clone(),
            content_type: self.content_type.to_string(),
            meta: serde_json::to_string(&self.meta)?,
            embedding: self.embedding.as_deref().map(|v| bytemuck::cast_slice::<f32, u8>(v).to_vec()),
        })
    }

    fn from_record(record: DocumentRecord, dimensions: usize) -> std::result::Result<Self, String> {
        let embedding = match record.embedding {
            Some(blob) => {
                if blob.len() != dimensions * size_of::<f32>() {
                    return Err(format!("文档 {} 的向量长度为 {} 字节", record.id, blob.len()));
                }
                Some(bytemuck::pod_collect_to_vec::<u8, f32>(&blob))
            }
            None => None,
        };
        Ok(Self {
            id: record.id as u64,
            content: record.content,
            content_type: record.content_type.parse()?,
            meta: serde_json::from_str(&record.meta).map_err(|e| e.to_string())?,
            embedding,
        })
    }
}

/// 保存在 config.json 中的数据库配置
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// 写入该数据库的程序版本
    pub version: String,
    pub index: IndexKind,
    pub similarity: String,
    pub embedding_dim: usize,
    pub embedding_model: String,
    /// 文档数量，用于检查文件是否完整
    pub document_count: usize,
    /// 已计算向量的文档数量，应与索引中的向量数量一致
    pub embedded_count: usize,
}

/// 一次向量计算的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingReport {
    pub embedded: usize,
    pub failed: usize,
}

/// 文档和向量的持久化存储
///
/// 所有修改先在内存中进行，调用 [`DocumentStore::save`] 后才写入磁盘。
/// 文档 ID 单调递增，因此 ID 顺序即插入顺序。
pub struct DocumentStore {
    dir: DbDir,
    config: StoreConfig,
    documents: BTreeMap<u64, Document>,
    by_content: HashMap<String, u64>,
    index: Box<dyn VectorIndex>,
    next_id: u64,
    /// 自上次保存以来新增或修改的文档
    dirty: HashSet<u64>,
    /// 自上次保存以来删除的文档
    deleted: HashSet<u64>,
    pool: Option<Database>,
    read_only: bool,
}

impl DocumentStore {
    /// 创建一个空的数据库，直到保存前不会写入任何文件
    pub fn create(
        dir: DbDir,
        kind: IndexKind,
        embedding_model: &str,
        dimensions: usize,
    ) -> Result<Self> {
        let config = StoreConfig {
            version: VERSION.to_string(),
            index: kind,
            similarity: "cosine".to_string(),
            embedding_dim: dimensions,
            embedding_model: embedding_model.to_string(),
            document_count: 0,
            embedded_count: 0,
        };
        Ok(Self {
            index: kind.create(dimensions)?,
            dir,
            config,
            documents: BTreeMap::new(),
            by_content: HashMap::new(),
            next_id: 1,
            dirty: HashSet::new(),
            deleted: HashSet::new(),
            pool: None,
            read_only: false,
        })
    }

    /// 打开已有的数据库
    ///
    /// 目录中没有数据库文件时返回 `Ok(None)`，文件不完整或损坏时返回 [`Error::Load`]
    pub async fn open(dir: DbDir, read_only: bool) -> Result<Option<Self>> {
        let config_file = dir.config();
        let database_file = dir.database();

        match (config_file.exists(), database_file.exists()) {
            (false, false) => {
                debug!("{} 中没有数据库文件", dir.path().display());
                return Ok(None);
            }
            (true, true) => {}
            (false, true) => return Err(Error::load(config_file, "配置文件不存在")),
            (true, false) => return Err(Error::load(database_file, "数据库文件不存在")),
        }

        info!("加载数据库: {}", dir.path().display());
        let store = Self::load(dir.clone(), read_only).await.map_err(|e| match e {
            Error::Load { .. } => e,
            e => Error::load(dir.path(), e),
        })?;
        info!(
            "数据库加载完成，共 {} 个文档，{} 个向量",
            store.documents.len(),
            store.index.len()
        );
        Ok(Some(store))
    }

    async fn load(dir: DbDir, read_only: bool) -> Result<Self> {
        let config_file = dir.config();
        let config: StoreConfig = serde_json::from_reader(BufReader::new(File::open(&config_file)?))
            .map_err(|e| Error::load(&config_file, e))?;
        debug!("数据库配置: {:?}", config);

        let pool = db::init_db(dir.database(), read_only).await?;
        let records = crud::get_documents(&pool).await?;

        let mut documents = BTreeMap::new();
        let mut by_content = HashMap::new();
        for record in records {
            let doc = Document::from_record(record, config.embedding_dim)
                .map_err(|e| Error::load(dir.database(), e))?;
            by_content.insert(doc.content.clone(), doc.id);
            documents.insert(doc.id, doc);
        }

        let embedded_count = documents.values().filter(|d| d.embedding.is_some()).count();
        if documents.len() != config.document_count || embedded_count != config.embedded_count {
            return Err(Error::load(
                dir.database(),
                format!(
                    "文档数量 {}/{} 与配置记录的 {}/{} 不一致",
                    documents.len(),
                    embedded_count,
                    config.document_count,
                    config.embedded_count
                ),
            ));
        }

        let index_file = dir.index(config.index);
        let mut index = if index_file.exists() {
            config.index.open(&index_file, config.embedding_dim)?
        } else if embedded_count == 0 {
            config.index.create(config.embedding_dim)?
        } else {
            return Err(Error::load(index_file, "索引文件不存在"));
        };
        let consistent = index.len() == embedded_count
            && documents.values().filter(|d| d.embedding.is_some()).all(|d| index.contains(d.id));
        if !consistent {
            // SQLite 已提交但索引未写完，此时以 SQLite 中的向量为准
            warn!("索引 {} 与数据库中的向量不一致，从数据库重建索引", index_file.display());
            index = config.index.create(config.embedding_dim)?;
            for doc in documents.values() {
                if let Some(embedding) = &doc.embedding {
                    index.add(doc.id, embedding)?;
                }
            }
        }

        let next_id = documents.keys().next_back().map_or(1, |id| id + 1);
        let pool = if read_only {
            // 只读模式下所有数据都已在内存中
            pool.close().await;
            None
        } else {
            Some(pool)
        };

        Ok(Self {
            dir,
            config,
            documents,
            by_content,
            index,
            next_id,
            dirty: HashSet::new(),
            deleted: HashSet::new(),
            pool,
            read_only,
        })
    }

    /// 打开已有的数据库，不存在时创建新数据库
    pub async fn open_or_create(
        dir: DbDir,
        kind: IndexKind,
        embedding_model: &str,
        dimensions: usize,
    ) -> Result<Self> {
        match Self::open(dir.clone(), false).await? {
            Some(store) => {
                if store.config.index != kind {
                    warn!("数据库使用 {} 索引，忽略参数 {}", store.config.index, kind);
                }
                if store.config.embedding_model != embedding_model {
                    warn!(
                        "数据库使用模型 {} 创建，当前模型为 {}",
                        store.config.embedding_model, embedding_model
                    );
                }
                Ok(store)
            }
            None => {
                info!("创建新数据库: {}", dir.path().display());
                Self::create(dir, kind, embedding_model, dimensions)
            }
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn dir(&self) -> &DbDir {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// 已计算向量的文档数量
    pub fn embedded_count(&self) -> usize {
        self.documents.values().filter(|d| d.embedding.is_some()).count()
    }

    pub fn get(&self, id: u64) -> Option<&Document> {
        self.documents.get(&id)
    }

    pub fn find_by_content(&self, content: &str) -> Option<&Document> {
        self.by_content.get(content).and_then(|id| self.documents.get(id))
    }

    pub fn contains_content(&self, content: &str) -> bool {
        self.by_content.contains_key(content)
    }

    /// 按插入顺序列出所有文档，包括尚未保存的修改
    pub fn list_all(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    /// 插入文档并分配 ID，返回新文档的 ID
    ///
    /// 内容已存在的文档会被跳过，不会覆盖已有记录
    pub fn insert(&mut self, documents: impl IntoIterator<Item = NewDocument>) -> Vec<u64> {
        let mut ids = vec![];
        for doc in documents {
            if self.by_content.contains_key(&doc.content) {
                debug!("文档已存在: {}", doc.content);
                continue;
            }
            let id = self.next_id;
            self.next_id += 1;
            self.by_content.insert(doc.content.clone(), id);
            self.documents.insert(
                id,
                Document {
                    id,
                    content: doc.content,
                    content_type: doc.content_type,
                    meta: doc.meta,
                    embedding: None,
                },
            );
            self.dirty.insert(id);
            self.deleted.remove(&id);
            ids.push(id);
        }
        ids
    }

    /// 删除文档及其向量，不存在的 ID 会被忽略，返回实际删除的数量
    pub fn delete(&mut self, ids: impl IntoIterator<Item = u64>) -> Result<usize> {
        let mut count = 0;
        for id in ids {
            let Some(doc) = self.documents.remove(&id) else {
                continue;
            };
            self.by_content.remove(&doc.content);
            if doc.embedding.is_some() {
                self.index.remove(id)?;
            }
            self.dirty.remove(&id);
            self.deleted.insert(id);
            count += 1;
        }
        Ok(count)
    }

    /// 为文档计算向量
    ///
    /// `skip_existing` 为 true 时只处理还没有向量的文档。单个文档失败时记录日志并跳过，
    /// 该文档保持没有向量的状态。
    pub fn update_embeddings<F>(&mut self, embed_fn: F, skip_existing: bool) -> EmbeddingReport
    where
        F: Fn(&Document) -> Result<Vec<f32>> + Sync,
    {
        let targets = self
            .documents
            .values()
            .filter(|doc| !skip_existing || doc.embedding.is_none())
            .collect::<Vec<_>>();
        if targets.is_empty() {
            return EmbeddingReport::default();
        }
        info!("计算 {} 个文档的向量", targets.len());

        let dimensions = self.config.embedding_dim;
        let results = targets
            .into_par_iter()
            .map(|doc| {
                let result = embed_fn(doc).and_then(|v| {
                    if v.len() != dimensions {
                        return Err(Error::DimensionMismatch { expected: dimensions, actual: v.len() });
                    }
                    Ok(v)
                });
                (doc.id, result)
            })
            .collect::<Vec<_>>();

        let mut report = EmbeddingReport::default();
        for (id, result) in results {
            let Some(doc) = self.documents.get_mut(&id) else {
                continue;
            };
            let added = result.and_then(|v| self.index.add(id, &v).map(|_| v));
            match added {
                Ok(v) => {
                    doc.embedding = Some(v);
                    self.dirty.insert(id);
                    report.embedded += 1;
                }
                Err(e) => {
                    error!("计算向量失败: {}: {}", doc.content, e);
                    if doc.embedding.take().is_some() {
                        // 重新计算失败的旧向量不再保留
                        self.index.remove(id).ok();
                        self.dirty.insert(id);
                    }
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// 余弦相似度搜索，返回最多 `top_k` 个结果，按相似度降序排列，相似度相同时按插入顺序
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        modality: Modality,
    ) -> Result<Vec<(&Document, f32)>> {
        if query.len() != self.config.embedding_dim {
            return Err(Error::DimensionMismatch {
                expected: self.config.embedding_dim,
                actual: query.len(),
            });
        }
        if top_k == 0 {
            return Ok(vec![]);
        }

        let mut result = self.search_k(query, top_k, modality)?;
        if result.len() < top_k && self.index.len() > top_k {
            // 部分结果被过滤掉了，扩大搜索范围
            result = self.search_k(query, self.index.len(), modality)?;
        }
        result.truncate(top_k);
        Ok(result)
    }

    fn search_k(&self, query: &[f32], k: usize, modality: Modality) -> Result<Vec<(&Document, f32)>> {
        Ok(self
            .index
            .search(query, k)?
            .into_iter()
            .filter_map(|n| self.documents.get(&n.id).map(|doc| (doc, n.similarity)))
            .filter(|(doc, _)| doc.embedding.is_some() && doc.content_type.searchable_by(modality))
            .collect())
    }

    /// 将当前状态写入磁盘
    ///
    /// 写入顺序为 SQLite、索引文件、配置文件，配置文件最后写入。
    /// 中途中断时，下次加载会因数量不一致而报告 [`Error::Load`]，
    /// 或者在索引与 SQLite 不一致时从 SQLite 中的向量重建索引
    pub async fn save(&mut self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        std::fs::create_dir_all(self.dir.path())?;

        let pool = match &self.pool {
            Some(pool) => pool.clone(),
            None => {
                let pool = db::init_db(self.dir.database(), false).await?;
                self.pool = Some(pool.clone());
                pool
            }
        };

        debug!("写入数据库：删除 {} 个文档，更新 {} 个文档", self.deleted.len(), self.dirty.len());
        let mut tx = pool.begin().await?;
        for id in &self.deleted {
            crud::delete_document(&mut *tx, *id as i64).await?;
        }
        for id in &self.dirty {
            if let Some(doc) = self.documents.get(id) {
                crud::upsert_document(&mut *tx, &doc.to_record()?).await?;
            }
        }
        tx.commit().await?;

        let index_file = self.dir.index(self.config.index);
        debug!("写入索引: {}", index_file.display());
        self.index.save(&index_file)?;

        self.config.version = VERSION.to_string();
        self.config.document_count = self.documents.len();
        self.config.embedded_count = self.embedded_count();
        let config_file = self.dir.config();
        write_atomic(&config_file, |file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &self.config)?;
            writer.flush()?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()
        })?;

        self.dirty.clear();
        self.deleted.clear();
        info!(
            "数据库已保存：{} 个文档，{} 个向量",
            self.config.document_count, self.config.embedded_count
        );
        Ok(())
    }

    /// 关闭数据库连接
    pub async fn close(self) {
        if let Some(pool) = self.pool {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn doc(path: &str) -> NewDocument {
        NewDocument::image(Path::new(path))
    }

    fn store(dir: &TempDir) -> DocumentStore {
        DocumentStore::create(DbDir::new(dir.path()), IndexKind::Flat, "test", 2).unwrap()
    }

    #[test]
    fn test_new_document_meta() {
        let d = doc("/images/cat.png");
        assert_eq!(d.content, "/images/cat.png");
        assert_eq!(d.content_type, ContentType::Image);
        assert_eq!(d.meta.get("filename").map(|s| s.as_str()), Some("cat.png"));
    }

    #[test]
    fn test_insert_assigns_increasing_ids_and_skips_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);

        let ids = store.insert([doc("/a.jpg"), doc("/b.jpg")]);
        assert_eq!(ids, &[1, 2]);
        let ids = store.insert([doc("/a.jpg"), doc("/c.jpg")]);
        assert_eq!(ids, &[3]);

        assert_eq!(store.len(), 3);
        assert!(store.list_all().all(|d| d.embedding.is_none()));
        assert_eq!(store.find_by_content("/c.jpg").map(|d| d.id), Some(3));
    }

    #[test]
    fn test_delete_ignores_unknown_ids() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert([doc("/a.jpg"), doc("/b.jpg")]);

        assert_eq!(store.delete([1, 99]).unwrap(), 1);
        assert_eq!(store.list_all().map(|d| d.id).collect::<Vec<_>>(), &[2]);
        assert!(!store.contains_content("/a.jpg"));
    }

    #[test]
    fn test_update_embeddings_partial_failure() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert([doc("/a.jpg"), doc("/broken.jpg"), doc("/c.jpg")]);

        let report = store.update_embeddings(
            |d| {
                if d.content.contains("broken") {
                    Err(Error::embedding(&d.content, "invalid image"))
                } else {
                    Ok(vec![1.0, d.id as f32])
                }
            },
            true,
        );
        assert_eq!(report, EmbeddingReport { embedded: 2, failed: 1 });
        assert!(store.find_by_content("/broken.jpg").unwrap().embedding.is_none());
        assert_eq!(store.embedded_count(), 2);

        // 维度不正确也视为失败
        let report = store.update_embeddings(|_| Ok(vec![1.0]), true);
        assert_eq!(report, EmbeddingReport { embedded: 0, failed: 1 });
    }

    #[test]
    fn test_search_skips_documents_without_embedding() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert([doc("/a.jpg"), doc("/b.jpg")]);
        store.update_embeddings(
            |d| match d.id {
                1 => Ok(vec![1.0, 0.0]),
                _ => Err(Error::embedding(&d.content, "broken")),
            },
            true,
        );

        let result = store.search(&[1.0, 0.0], 5, Modality::Text).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].0.content, "/a.jpg");
        assert!(store.search(&[1.0, 0.0, 0.0], 5, Modality::Text).is_err());
        assert!(store.search(&[1.0, 0.0], 0, Modality::Image).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_missing_returns_none() {
        let dir = TempDir::new().unwrap();
        assert!(DocumentStore::open(DbDir::new(dir.path()), true).await.unwrap().is_none());
        let missing = dir.path().join("nothing-here");
        assert!(DocumentStore::open(DbDir::new(missing), true).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_and_open_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert([doc("/a.jpg"), doc("/b.jpg"), doc("/c.jpg")]);
        store.update_embeddings(|d| Ok(vec![0.1 * d.id as f32, 1.0 / 3.0]), true);
        store.delete([2]).unwrap();
        store.save().await.unwrap();
        store.close().await;

        let loaded = DocumentStore::open(DbDir::new(dir.path()), true).await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.config().document_count, 2);
        assert_eq!(loaded.config().embedded_count, 2);
        let a = loaded.find_by_content("/a.jpg").unwrap();
        assert_eq!(a.embedding.as_deref(), Some(&[0.1f32, 1.0 / 3.0][..]));
        assert_eq!(a.filename(), "a.jpg");
        assert!(loaded.find_by_content("/b.jpg").is_none());
    }

    #[tokio::test]
    async fn test_ids_continue_after_reopen() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert([doc("/a.jpg"), doc("/b.jpg")]);
        store.save().await.unwrap();
        store.close().await;

        let mut store = DocumentStore::open(DbDir::new(dir.path()), false).await.unwrap().unwrap();
        assert_eq!(store.insert([doc("/c.jpg")]), &[3]);
        store.close().await;
    }

    #[tokio::test]
    async fn test_read_only_store_cannot_save() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.save().await.unwrap();
        store.close().await;

        let mut store = DocumentStore::open(DbDir::new(dir.path()), true).await.unwrap().unwrap();
        assert!(matches!(store.save().await, Err(Error::ReadOnly)));
    }

    #[tokio::test]
    async fn test_corrupt_config_is_load_error() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert([doc("/a.jpg")]);
        store.save().await.unwrap();
        store.close().await;

        std::fs::write(dir.path().join("config.json"), b"{ not json").unwrap();
        let r = DocumentStore::open(DbDir::new(dir.path()), true).await;
        assert!(matches!(r, Err(Error::Load { .. })));
    }

    #[tokio::test]
    async fn test_missing_index_file_is_load_error() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert([doc("/a.jpg")]);
        store.update_embeddings(|_| Ok(vec![1.0, 0.0]), true);
        store.save().await.unwrap();
        store.close().await;

        std::fs::remove_file(dir.path().join("index.flat")).unwrap();
        let r = DocumentStore::open(DbDir::new(dir.path()), true).await;
        assert!(matches!(r, Err(Error::Load { .. })));
    }

    #[tokio::test]
    async fn test_partial_files_is_load_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.json"), b"{}").unwrap();
        let r = DocumentStore::open(DbDir::new(dir.path()), false).await;
        assert!(matches!(r, Err(Error::Load { .. })));
    }

    #[test]
    fn test_reembed_replaces_vectors() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert([doc("/a.jpg"), doc("/b.jpg")]);
        store.update_embeddings(|d| Ok(if d.id == 1 { vec![1.0, 0.0] } else { vec![0.0, 1.0] }), true);

        // 重新计算全部向量，旧向量被替换而不是重复添加
        let report = store.update_embeddings(|d| Ok(if d.id == 1 { vec![0.0, 1.0] } else { vec![1.0, 0.0] }), false);
        assert_eq!(report, EmbeddingReport { embedded: 2, failed: 0 });
        assert_eq!(store.index.len(), 2);
        assert_eq!(store.get(1).unwrap().embedding.as_deref(), Some(&[0.0f32, 1.0][..]));
        let result = store.search(&[1.0, 0.0], 1, Modality::Image).unwrap();
        assert_eq!(result[0].0.id, 2);
        assert!((result[0].1 - 1.0).abs() < 1e-6);

        // 重新计算失败的文档不再保留旧向量
        let report = store.update_embeddings(
            |d| match d.id {
                1 => Ok(vec![1.0, 1.0]),
                _ => Err(Error::embedding(&d.content, "broken")),
            },
            false,
        );
        assert_eq!(report, EmbeddingReport { embedded: 1, failed: 1 });
        assert!(store.get(2).unwrap().embedding.is_none());
        assert_eq!(store.embedded_count(), 1);
        assert_eq!(store.index.len(), 1);
        assert!(!store.index.contains(2));
        assert!(store.dirty.contains(&2));
        let result = store.search(&[1.0, 0.0], 5, Modality::Text).unwrap();
        assert_eq!(result.iter().map(|(d, _)| d.id).collect::<Vec<_>>(), &[1]);
    }

    /// SQLite 提交后索引和配置文件未写入时，从 SQLite 重建索引
    #[tokio::test]
    async fn test_stale_index_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let mut store = store(&dir);
        store.insert([doc("/a.jpg"), doc("/b.jpg")]);
        store.update_embeddings(|d| Ok(if d.id == 1 { vec![1.0, 0.0] } else { vec![0.0, 1.0] }), true);
        store.save().await.unwrap();
        store.close().await;

        let index_file = dir.path().join("index.flat");
        let config_file = dir.path().join("config.json");
        let old_index = std::fs::read(&index_file).unwrap();
        let old_config = std::fs::read(&config_file).unwrap();

        // 文档数量不变：删除 a，新增 c
        let mut store = DocumentStore::open(DbDir::new(dir.path()), false).await.unwrap().unwrap();
        let a = store.find_by_content("/a.jpg").unwrap().id;
        store.delete([a]).unwrap();
        store.insert([doc("/c.jpg")]);
        store.update_embeddings(|_| Ok(vec![-1.0, 0.0]), true);
        store.save().await.unwrap();
        store.close().await;

        std::fs::write(&index_file, old_index).unwrap();
        std::fs::write(&config_file, old_config).unwrap();

        let store = DocumentStore::open(DbDir::new(dir.path()), true).await.unwrap().unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.index.len(), 2);
        assert!(!store.index.contains(a));
        let result = store.search(&[-1.0, 0.0], 1, Modality::Text).unwrap();
        assert_eq!(result[0].0.content, "/c.jpg");
        let found = store.search(&[1.0, 0.0], 5, Modality::Text).unwrap();
        assert!(found.iter().all(|(d, _)| d.content != "/a.jpg"));
    }
}
