pub mod constants;
pub mod error;
pub mod models;
pub mod types;

pub use error::IdError;
pub use models::*;
pub use types::*;
