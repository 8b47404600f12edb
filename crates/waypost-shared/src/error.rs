use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Identifier is empty")]
    Empty,

    #[error("Identifier contains reserved character {0:?}")]
    ReservedChar(char),

    #[error("Malformed friend request id: {0}")]
    MalformedRequestId(String),
}
