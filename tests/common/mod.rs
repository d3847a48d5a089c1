#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use imvec::config::DbDir;
use imvec::index::IndexKind;
use imvec::{DocumentStore, Embedder, Error, Result};

pub const MODEL: &str = "fake-clip";

/// 测试用的向量模型
///
/// 图片文件的内容即为逗号分隔的向量，无法解析时视为损坏的图片；文本向量从预设表中查找
pub struct FakeEmbedder {
    dimensions: usize,
    texts: HashMap<String, Vec<f32>>,
    image_calls: AtomicUsize,
    text_calls: AtomicUsize,
}

impl FakeEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            texts: HashMap::new(),
            image_calls: AtomicUsize::new(0),
            text_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_text(mut self, text: &str, vector: &[f32]) -> Self {
        self.texts.insert(text.to_string(), vector.to_vec());
        self
    }

    pub fn image_calls(&self) -> usize {
        self.image_calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }
}

impl Embedder for FakeEmbedder {
    fn model_id(&self) -> &str {
        MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_image(&self, path: &Path) -> Result<Vec<f32>> {
        self.image_calls.fetch_add(1, Ordering::SeqCst);
        let text = fs::read_to_string(path).map_err(|e| Error::embedding(path.display(), e))?;
        text.trim()
            .split(',')
            .map(|s| s.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::embedding(path.display(), e))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        self.texts.get(text).cloned().ok_or_else(|| Error::embedding(text, "unknown text"))
    }
}

/// 写入一张“图片”，内容为向量
pub fn write_image(dir: &Path, name: &str, vector: &[f32]) {
    let content = vector.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(",");
    fs::write(dir.join(name), content).unwrap();
}

pub fn new_store(dir: &Path, dimensions: usize) -> DocumentStore {
    DocumentStore::create(DbDir::new(dir), IndexKind::Flat, MODEL, dimensions).unwrap()
}

/// 文档内容到向量的映射，用于比较同步前后的状态
pub fn snapshot(store: &DocumentStore) -> HashMap<String, (u64, Option<Vec<u32>>)> {
    store
        .list_all()
        .map(|doc| {
            let bits = doc.embedding.as_ref().map(|v| v.iter().map(|x| x.to_bits()).collect());
            (doc.content.clone(), (doc.id, bits))
        })
        .collect()
}
