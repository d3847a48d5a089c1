mod create_db;
mod search_db;

pub use create_db::*;
pub use search_db::*;

use crate::config::{EmbedOptions, Opts};
use crate::embed::{ClipEmbedder, EMBEDDING_DIM, LazyEmbedder};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 创建 CLIP 模型，模型在第一次计算向量时才会加载
pub fn clip_embedder(opts: &EmbedOptions) -> LazyEmbedder<ClipEmbedder> {
    let load_opts = opts.clone();
    LazyEmbedder::new(opts.model.clone(), EMBEDDING_DIM, move || ClipEmbedder::load(&load_opts))
}
