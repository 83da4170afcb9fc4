pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	Validation { message: String, fields: Vec<String> },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Unreadable signature: {message}")]
	Format { message: String },
	#[error("Search failed: {message}")]
	Search { message: String, upstream_status: Option<u16>, upstream_body: Option<String> },
	#[error("Metadata store failed: {message}")]
	Store { message: String },
	#[error("Request cancelled.")]
	Cancelled,
	#[error("Internal error: {message}")]
	Internal { message: String },
}
impl Error {
	pub fn validation(message: impl Into<String>, fields: Vec<String>) -> Self {
		Self::Validation { message: message.into(), fields }
	}
}

impl From<bw_providers::Error> for Error {
	fn from(err: bw_providers::Error) -> Self {
		let message = err.to_string();

		match err {
			bw_providers::Error::Upstream { status, body } => Self::Search {
				message,
				upstream_status: Some(status),
				upstream_body: Some(body).filter(|body| !body.is_empty()),
			},
			_ => Self::Search { message, upstream_status: None, upstream_body: None },
		}
	}
}

impl From<bw_storage::Error> for Error {
	fn from(err: bw_storage::Error) -> Self {
		match err {
			bw_storage::Error::InvalidArgument(message) => Self::Internal { message },
			bw_storage::Error::Join(inner) => Self::Internal { message: inner.to_string() },
			other => Self::Store { message: other.to_string() },
		}
	}
}
