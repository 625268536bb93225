use crate::index::PageId;
use sled::transaction::TransactionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Codec(#[from] bincode::Error),

    /// A caller broke the ordering contract (e.g. indexed words before `add_page`).
    #[error("index integrity violation: {0}")]
    Integrity(String),
}

impl StoreError {
    pub(crate) fn missing_page(page_id: PageId) -> Self {
        StoreError::Integrity(format!("page {page_id} has no page record"))
    }
}

impl From<TransactionError<StoreError>> for StoreError {
    fn from(e: TransactionError<StoreError>) -> Self {
        match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => StoreError::Db(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
