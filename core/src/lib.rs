pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod tokenizer;

pub use error::{Result, StoreError};
pub use index::{Field, Page, PageId, Postings, WordId};
pub use persist::IndexStore;
pub use query::{QueryEngine, QueryOptions, ScoringMode, SearchResult};
pub use tokenizer::{Normalizer, StopStem};
