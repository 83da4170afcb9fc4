pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Search service responded with status {status}.")]
	Upstream { status: u16, body: String },
	#[error("Search service is unreachable: {message}")]
	Unreachable { message: String },
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	Csv(#[from] csv::Error),
	#[error("{message}")]
	InvalidResponse { message: String },
}
impl Error {
	/// Upstream HTTP status, when the service answered at all.
	pub fn upstream_status(&self) -> Option<u16> {
		match self {
			Self::Upstream { status, .. } => Some(*status),
			_ => None,
		}
	}
}
