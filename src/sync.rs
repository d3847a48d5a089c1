use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use indicatif::ProgressBar;
use log::{debug, info, warn};
use regex::Regex;
use tokio::task::block_in_place;
use walkdir::WalkDir;

use crate::embed::Embedder;
use crate::error::{Error, Result};
use crate::store::{DocumentStore, NewDocument};
use crate::utils::pb_style;

/// 默认扫描的图片后缀
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

/// 一次同步的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    /// 目录中符合条件的图片数量
    pub scanned: usize,
    /// 新增的文档
    pub added: usize,
    /// 因文件不存在而删除的文档
    pub removed: usize,
    /// 成功计算向量的文档
    pub embedded: usize,
    /// 计算向量失败的文档
    pub failed: usize,
}

/// 让数据库内容与图片目录保持一致
pub struct IndexSynchronizer<'a, E: Embedder + ?Sized> {
    embedder: &'a E,
    re_ext: Regex,
    progress: bool,
}

impl<'a, E: Embedder + ?Sized> IndexSynchronizer<'a, E> {
    /// `extensions` 为不带点的后缀名，匹配时不区分大小写
    pub fn new<S: AsRef<str>>(embedder: &'a E, extensions: &[S]) -> Self {
        let alternatives =
            extensions.iter().map(|s| regex::escape(s.as_ref().trim_start_matches('.'))).collect::<Vec<_>>();
        let re_ext = format!("(?i)^({})$", alternatives.join("|"));
        let re_ext = Regex::new(&re_ext).expect("failed to build regex");
        Self { embedder, re_ext, progress: false }
    }

    /// 计算向量时是否显示进度条
    pub fn progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// 列出目录下（不含子目录）所有符合后缀条件的图片
    pub fn scan(&self, folder: &Path) -> Result<BTreeSet<PathBuf>> {
        let fs_error = |source: io::Error| Error::FileSystem { path: folder.to_path_buf(), source };

        let root = std::fs::canonicalize(folder).map_err(fs_error)?;
        if !root.is_dir() {
            return Err(fs_error(io::Error::new(io::ErrorKind::InvalidInput, "不是目录")));
        }

        info!("开始扫描目录: {}", root.display());
        let mut files = BTreeSet::new();
        for entry in WalkDir::new(&root).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    let source = e.into_io_error().unwrap_or_else(|| io::Error::other("无法遍历目录"));
                    return Err(fs_error(source));
                }
                Err(e) => {
                    warn!("跳过无法读取的文件: {}", e);
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            // 文档以路径字符串为键，非 UTF-8 路径无法还原为原文件
            if path.to_str().is_none() {
                warn!("跳过文件名不是 UTF-8 的文件: {}", path.display());
                continue;
            }
            let Some(ext) = path.extension() else {
                continue;
            };
            if self.re_ext.is_match(&ext.to_string_lossy()) {
                files.insert(path.to_path_buf());
            }
        }
        info!("扫描完成，共 {} 张图片", files.len());

        Ok(files)
    }

    /// 对比目录与数据库并在内存中更新数据库：添加新图片、删除已不存在的图片、为缺少向量的文档计算向量
    ///
    /// 已有向量的文档不会重新计算，之前计算失败的文档会被重试
    pub fn reconcile(&self, folder: &Path, store: &mut DocumentStore) -> Result<SyncReport> {
        let current = self.scan(folder)?;
        let mut report = SyncReport { scanned: current.len(), ..Default::default() };

        let new_docs = current
            .iter()
            .filter(|path| !store.contains_content(&path.to_string_lossy()))
            .map(|path| NewDocument::image(path))
            .collect::<Vec<_>>();
        report.added = store.insert(new_docs).len();

        let stale = store
            .list_all()
            .filter(|doc| !current.contains(Path::new(&doc.content)))
            .inspect(|doc| debug!("删除已不存在的图片: {}", doc.content))
            .map(|doc| doc.id)
            .collect::<Vec<_>>();
        report.removed = store.delete(stale)?;

        let pending = store.len() - store.embedded_count();
        if pending > 0 {
            let expected = store.config().embedding_dim;
            if self.embedder.dimensions() != expected {
                return Err(Error::DimensionMismatch { expected, actual: self.embedder.dimensions() });
            }
            self.embedder.prepare()?;

            let pb = if self.progress {
                ProgressBar::new(pending as u64).with_style(pb_style())
            } else {
                ProgressBar::hidden()
            };
            let embedded = store.update_embeddings(
                |doc| {
                    let result = self.embedder.embed_image(Path::new(&doc.content));
                    pb.set_message(doc.filename().to_owned());
                    pb.inc(1);
                    result
                },
                true,
            );
            pb.finish_and_clear();

            report.embedded = embedded.embedded;
            report.failed = embedded.failed;
        }

        Ok(report)
    }

    /// 同步目录并保存数据库
    pub async fn sync(&self, folder: &Path, store: &mut DocumentStore) -> Result<SyncReport> {
        let report = block_in_place(|| self.reconcile(folder, store))?;
        store.save().await?;
        info!(
            "同步完成：扫描 {}，新增 {}，删除 {}，计算向量 {}，失败 {}",
            report.scanned, report.added, report.removed, report.embedded, report.failed
        );
        Ok(report)
    }
}
