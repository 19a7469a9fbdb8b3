use peg::str::LineCol;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("inventory annotation is not a valid document: {0}")]
    Document(#[from] serde_json::Error),
    #[error("malformed inventory key {key:?}: {source}")]
    Key {
        key: String,
        #[source]
        source: peg::error::ParseError<LineCol>,
    },
}
pub type Result<T> = std::result::Result<T, Error>;
