pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	DuckDb(#[from] duckdb::Error),

	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
