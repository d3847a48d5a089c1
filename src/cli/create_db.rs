use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};

use crate::cli::{SubCommandExtend, clip_embedder};
use crate::config::{DbDir, Opts};
use crate::embed::Embedder;
use crate::error::Error;
use crate::index::IndexKind;
use crate::store::DocumentStore;
use crate::sync::IndexSynchronizer;
use crate::utils::move_aside;

#[derive(Parser, Debug, Clone)]
pub struct CreateDbCommand {
    /// 图片所在目录，不会扫描子目录
    #[arg(short, long, value_name = "DIR")]
    pub files: PathBuf,
    /// 数据库文件的输出目录
    #[arg(short, long, value_name = "DIR")]
    pub output: DbDir,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,gif,bmp")]
    pub suffix: String,
    /// 新建数据库时使用的索引类型，已有数据库保持原有类型
    #[arg(long, value_enum, default_value_t = IndexKind::Flat)]
    pub index: IndexKind,
}

impl SubCommandExtend for CreateDbCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let embedder = clip_embedder(&opts.embed);
        let (model, dim) = (embedder.model_id().to_owned(), embedder.dimensions());

        let mut store =
            match DocumentStore::open_or_create(self.output.clone(), self.index, &model, dim).await {
                Ok(store) => store,
                Err(e @ Error::Load { .. }) => {
                    warn!("{}", e);
                    warn!("无法加载已有数据库，将创建新数据库，原有数据不会被使用");
                    for file in self.output.existing_files() {
                        let target = move_aside(&file)?;
                        warn!("已将 {} 移动到 {}", file.display(), target.display());
                    }
                    DocumentStore::create(self.output.clone(), self.index, &model, dim)?
                }
                Err(e) => return Err(e.into()),
            };

        let suffix = self.suffix.split(',').filter(|s| !s.is_empty()).collect::<Vec<_>>();
        let synchronizer = IndexSynchronizer::new(&embedder, &suffix).progress(true);
        let report = synchronizer.sync(&self.files, &mut store).await?;
        store.close().await;

        if report.failed > 0 {
            warn!("{} 张图片计算向量失败，下次同步时会重试", report.failed);
        }
        info!("数据库已保存到 {}", self.output.path().display());

        Ok(())
    }
}
