use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{ArgGroup, Parser, ValueEnum};
use log::{error, info};
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, clip_embedder};
use crate::config::{DbDir, Opts, SearchOptions};
use crate::embed::Query;
use crate::retriever::{Retriever, ScoredResult};

#[derive(Parser, Debug, Clone)]
#[command(group(ArgGroup::new("query").required(true).args(["image_query", "text_query"])))]
pub struct SearchDbCommand {
    /// 数据库目录
    #[arg(short, long = "db_path", value_name = "DIR")]
    pub db_path: DbDir,
    /// 以图搜图，被搜索的图片路径
    #[arg(short, long = "image_query", value_name = "PATH")]
    pub image_query: Option<PathBuf>,
    /// 以文搜图，描述图片内容的文本
    #[arg(short, long = "text_query", value_name = "TEXT")]
    pub text_query: Option<String>,
    #[command(flatten)]
    pub search: SearchOptions,
}

impl SearchDbCommand {
    fn query(&self) -> Query {
        match (&self.image_query, &self.text_query) {
            (Some(path), _) => Query::Image(path.clone()),
            (None, Some(text)) => Query::Text(text.clone()),
            // clap 保证二者必有其一
            (None, None) => unreachable!(),
        }
    }
}

impl SubCommandExtend for SearchDbCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let embedder = clip_embedder(&opts.embed);
        let retriever = Retriever::new(&embedder, self.search.count);

        let store = retriever.open_store(&self.db_path).await.inspect_err(|_| {
            error!("没有可用的数据库，请先使用 create_db 创建数据库");
        })?;

        let query = self.query();
        let result = block_in_place(|| retriever.retrieve(&query, &store))?;

        print_result(&result, &self.search.output_format)
    }
}

fn print_result(result: &[ScoredResult], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            if result.is_empty() {
                info!("没有找到相似的图片");
            }
            for r in result {
                println!("{}\t{:.2}%\t{}", r.rank, r.score * 100., r.filename);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}

impl FromStr for OutputFormat {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            _ => Ok(Self::Table),
        }
    }
}
