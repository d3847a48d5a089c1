pub mod cli;
pub mod config;
mod db;
pub mod embed;
pub mod error;
pub mod index;
pub mod retriever;
pub mod store;
pub mod sync;
pub mod utils;

pub use config::{DbDir, Opts};
pub use embed::{Embedder, Modality, Query};
pub use error::{Error, Result};
pub use retriever::{Retriever, ScoredResult};
pub use store::{Document, DocumentStore, NewDocument};
pub use sync::{IndexSynchronizer, SyncReport};
