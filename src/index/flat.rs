use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Neighbor, VectorIndex, normalize, sort_neighbors};
use crate::error::{Error, Result};
use crate::utils::write_atomic;

/// 向量数量超过该值时使用 rayon 并行计算相似度
const PARALLEL_THRESHOLD: usize = 4096;

/// 暴力搜索索引，内部存储归一化后的向量，内积即余弦相似度
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FlatIndex {
    dimensions: usize,
    ids: Vec<u64>,
    /// 按行存储的向量，长度为 ids.len() * dimensions
    vectors: Vec<f32>,
    /// ID 到行号的映射，加载时重建
    #[serde(skip)]
    rows: HashMap<u64, usize>,
}

impl FlatIndex {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions, ids: vec![], vectors: vec![], rows: HashMap::new() }
    }

    pub fn open(path: &Path, dimensions: usize) -> Result<Self> {
        let file = File::open(path)?;
        let mut index: Self = bincode::deserialize_from(BufReader::new(file))
            .map_err(|e| Error::load(path, e))?;
        if index.dimensions != dimensions {
            return Err(Error::load(
                path,
                format!("索引维度为 {}，期望 {}", index.dimensions, dimensions),
            ));
        }
        if index.vectors.len() != index.ids.len() * index.dimensions {
            return Err(Error::load(path, "索引数据长度不正确"));
        }
        index.rows = index.ids.iter().enumerate().map(|(row, &id)| (id, row)).collect();
        if index.rows.len() != index.ids.len() {
            return Err(Error::load(path, "索引中有重复的 ID"));
        }
        Ok(index)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(Error::DimensionMismatch { expected: self.dimensions, actual: vector.len() });
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn contains(&self, id: u64) -> bool {
        self.rows.contains_key(&id)
    }

    fn add(&mut self, id: u64, vector: &[f32]) -> Result<()> {
        self.check_dimensions(vector)?;
        let vector = normalize(vector);
        match self.rows.get(&id) {
            Some(&row) => {
                let d = self.dimensions;
                self.vectors[row * d..(row + 1) * d].copy_from_slice(&vector);
            }
            None => {
                self.rows.insert(id, self.ids.len());
                self.ids.push(id);
                self.vectors.extend_from_slice(&vector);
            }
        }
        Ok(())
    }

    /// 用最后一行填补被删除的行
    fn remove(&mut self, id: u64) -> Result<()> {
        let Some(row) = self.rows.remove(&id) else {
            return Ok(());
        };
        let d = self.dimensions;
        let last = self.ids.len() - 1;
        if row != last {
            self.vectors.copy_within(last * d..(last + 1) * d, row * d);
            let moved = self.ids[last];
            self.ids[row] = moved;
            self.rows.insert(moved, row);
        }
        self.ids.truncate(last);
        self.vectors.truncate(last * d);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.check_dimensions(query)?;
        if k == 0 || self.ids.is_empty() {
            return Ok(vec![]);
        }
        let query = normalize(query);
        let score = |(id, v): (&u64, &[f32])| Neighbor {
            id: *id,
            similarity: v.iter().zip(&query).map(|(a, b)| a * b).sum(),
        };

        let mut neighbors = if self.ids.len() >= PARALLEL_THRESHOLD {
            self.ids.par_iter().zip(self.vectors.par_chunks_exact(self.dimensions)).map(score).collect::<Vec<_>>()
        } else {
            self.ids.iter().zip(self.vectors.chunks_exact(self.dimensions)).map(score).collect::<Vec<_>>()
        };

        sort_neighbors(&mut neighbors);
        neighbors.truncate(k);
        Ok(neighbors)
    }

    fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, |file| {
            let mut writer = BufWriter::new(file);
            bincode::serialize_into(&mut writer, self)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()
        })?;
        Ok(())
    }
}
