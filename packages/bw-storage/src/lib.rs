pub mod columnar;
pub mod document;

mod error;

pub use error::Error;

use std::{collections::HashSet, fmt, future::Future, pin::Pin, str::FromStr};

use bw_domain::{MetadataRecord, NullPolicy};

pub type Result<T, E = Error> = std::result::Result<T, E>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
	Columnar,
	Document,
}
impl Backend {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Columnar => "columnar",
			Self::Document => "document",
		}
	}
}

impl fmt::Display for Backend {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Backend {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw {
			"columnar" => Ok(Self::Columnar),
			"document" => Ok(Self::Document),
			_ => Err(Error::InvalidArgument(format!("Unknown metadata backend {raw:?}."))),
		}
	}
}

/// A metadata backend that resolves accessions to projected fields.
pub trait MetadataStore
where
	Self: Send + Sync,
{
	fn backend(&self) -> Backend;

	fn null_policy(&self) -> NullPolicy;

	/// Starts a request-scoped session. Resources it opens are released when it is dropped.
	fn session(&self) -> Box<dyn MetadataSession + '_>;
}

pub trait MetadataSession
where
	Self: Send,
{
	/// Returns one record per known accession with `fields` in the given order.
	///
	/// Unknown accessions are skipped. Matching is exact and case-sensitive.
	fn lookup<'a>(
		&'a mut self,
		accessions: &'a [String],
		fields: &'a [String],
	) -> BoxFuture<'a, Result<Vec<MetadataRecord>>>;
}

/// Keeps the first record seen for each accession.
pub(crate) fn dedupe_first(records: Vec<MetadataRecord>) -> Vec<MetadataRecord> {
	let mut seen = HashSet::with_capacity(records.len());

	records.into_iter().filter(|record| seen.insert(record.accession.clone())).collect()
}
