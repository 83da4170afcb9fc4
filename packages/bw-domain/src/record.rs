use serde::{Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

pub const ACCESSION_KEY: &str = "acc";
pub const NOT_PROVIDED: &str = "NP";

/// Metadata of one accession, fields in the order the caller asked for them.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
	pub accession: String,
	pub fields: Vec<(String, Value)>,
}
impl MetadataRecord {
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.fields.iter().find(|(field, _)| field == name).map(|(_, value)| value)
	}
}

/// How missing metadata values are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
	/// Replace missing values with the literal `"NP"`.
	FillNp,
	/// Keep missing values as JSON `null`.
	Preserve,
}
impl NullPolicy {
	pub fn from_fill_missing(fill_missing: bool) -> Self {
		if fill_missing { Self::FillNp } else { Self::Preserve }
	}

	pub fn apply(self, value: Value) -> Value {
		match (self, value) {
			(Self::FillNp, Value::Null) => Value::String(NOT_PROVIDED.to_string()),
			(_, value) => value,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
	pub containment: f64,
	pub cani: f64,
}

/// A metadata record joined with its containment scores and allow-list membership.
///
/// Serializes as one flat object: `acc`, the metadata fields, `containment` and `cANI` when a
/// match exists, then `isMember`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
	pub accession: String,
	pub fields: Vec<(String, Value)>,
	pub scores: Option<Scores>,
	pub is_member: bool,
}

impl Serialize for EnrichedRecord {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		let len = 2 + self.fields.len() + if self.scores.is_some() { 2 } else { 0 };
		let mut map = serializer.serialize_map(Some(len))?;

		map.serialize_entry(ACCESSION_KEY, &self.accession)?;

		for (name, value) in &self.fields {
			map.serialize_entry(name, value)?;
		}

		if let Some(scores) = self.scores {
			map.serialize_entry("containment", &scores.containment)?;
			map.serialize_entry("cANI", &scores.cani)?;
		}

		map.serialize_entry("isMember", &self.is_member)?;
		map.end()
	}
}
