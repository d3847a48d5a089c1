use std::fs::File;
use std::path::Path;

use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{Neighbor, VectorIndex, sort_neighbors};
use crate::error::{Error, Result};
use crate::utils::tmp_path;

/// 基于 usearch 的 HNSW 索引，距离为 1 - 余弦相似度
pub struct HnswIndex {
    index: Index,
    dimensions: usize,
}

impl HnswIndex {
    fn options(dimensions: usize) -> IndexOptions {
        IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            // 此处为 usearch 默认参数
            connectivity: 32,
            expansion_add: 40,
            expansion_search: 16,
            ..Default::default()
        }
    }

    pub fn new(dimensions: usize) -> Result<Self> {
        let index = Index::new(&Self::options(dimensions)).map_err(index_error)?;
        Ok(Self { index, dimensions })
    }

    pub fn open(path: &Path, dimensions: usize) -> Result<Self> {
        let s = Self::new(dimensions)?;
        s.index.load(&path.to_string_lossy()).map_err(|e| Error::load(path, e))?;
        if s.index.dimensions() != dimensions {
            return Err(Error::load(
                path,
                format!("索引维度为 {}，期望 {}", s.index.dimensions(), dimensions),
            ));
        }
        Ok(s)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch { expected: self.dimensions, actual: vector.len() });
        }
        Ok(())
    }
}

impl VectorIndex for HnswIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    fn contains(&self, id: u64) -> bool {
        self.index.contains(id)
    }

    fn add(&mut self, id: u64, vector: &[f32]) -> Result<()> {
        self.check_dimensions(vector)?;
        if self.index.contains(id) {
            self.index.remove(id).map_err(index_error)?;
        }
        // usearch 要求添加前预留足够的空间
        if self.index.size() + 1 > self.index.capacity() {
            let capacity = (self.index.capacity() * 2).max(64);
            self.index.reserve(capacity).map_err(index_error)?;
        }
        self.index.add(id, vector).map_err(index_error)?;
        Ok(())
    }

    fn remove(&mut self, id: u64) -> Result<()> {
        if self.index.contains(id) {
            self.index.remove(id).map_err(index_error)?;
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimensions(query)?;
        if k == 0 || self.index.size() == 0 {
            return Ok(vec![]);
        }
        let matches = self.index.search(query, k).map_err(index_error)?;
        let mut neighbors = matches
            .keys
            .into_iter()
            .zip(matches.distances)
            .map(|(id, distance)| Neighbor { id, similarity: 1.0 - distance })
            .collect::<Vec<_>>();
        sort_neighbors(&mut neighbors);
        Ok(neighbors)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let tmp = tmp_path(path);
        self.index.save(&tmp.to_string_lossy()).map_err(index_error)?;
        File::open(&tmp)?.sync_all()?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn index_error(e: impl std::fmt::Display) -> Error {
    Error::Index(e.to_string())
}
