pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid signature: {message}")]
	InvalidSignature { message: String },
	#[error("Invalid allow-list: {message}")]
	InvalidAllowList { message: String },
}
