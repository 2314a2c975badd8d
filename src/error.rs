use thiserror::Error;

use crate::catalog::CatalogSource;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid date format (expected YYYY-MM-DDTHH:MM:SS): {0}")]
    InvalidDateFormat(String),

    #[error("{0} unavailable: {1}")]
    CatalogUnavailable(CatalogSource, String),

    #[error("no match for the selected filters in the {0}")]
    NoMatchInCatalog(CatalogSource),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("xml error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}
