pub mod search;

mod error;

pub use error::{Error, Result};
pub use search::SearchClient;
