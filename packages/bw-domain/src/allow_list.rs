use ahash::AHashSet;
use serde::Deserialize;

use crate::{EnrichedRecord, Error, Result};

#[derive(Deserialize)]
#[serde(untagged)]
enum AllowListDocument {
	Wrapped { accessions: Vec<String> },
	Bare(Vec<String>),
}

/// A curated accession set. Membership only annotates records, it never removes them.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
	accessions: AHashSet<String>,
}
impl AllowList {
	pub fn empty() -> Self {
		Self::default()
	}

	/// Accepts `{"accessions": [...]}` or a bare JSON array of accession strings.
	pub fn from_json(raw: &[u8]) -> Result<Self> {
		let document: AllowListDocument = serde_json::from_slice(raw)
			.map_err(|err| Error::InvalidAllowList { message: err.to_string() })?;
		let accessions = match document {
			AllowListDocument::Wrapped { accessions } => accessions,
			AllowListDocument::Bare(accessions) => accessions,
		};

		Ok(accessions.into_iter().collect())
	}

	pub fn contains(&self, accession: &str) -> bool {
		self.accessions.contains(accession)
	}

	pub fn len(&self) -> usize {
		self.accessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.accessions.is_empty()
	}

	pub fn tag(&self, mut records: Vec<EnrichedRecord>) -> Vec<EnrichedRecord> {
		for record in &mut records {
			record.is_member = self.contains(&record.accession);
		}

		records
	}
}

impl FromIterator<String> for AllowList {
	fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
		Self { accessions: iter.into_iter().collect() }
	}
}
