use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::{Error, Result};

const SOURMASH_SEED: u64 = 42;
const SOURMASH_HASH_FUNCTION: &str = "0.murmur64";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Molecule {
	Dna,
	Protein,
	Dayhoff,
	Hp,
}
impl Molecule {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Dna => "DNA",
			Self::Protein => "protein",
			Self::Dayhoff => "dayhoff",
			Self::Hp => "hp",
		}
	}
}

impl fmt::Display for Molecule {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Molecule {
	type Err = Error;

	fn from_str(raw: &str) -> Result<Self> {
		match raw.to_ascii_lowercase().as_str() {
			"dna" => Ok(Self::Dna),
			"protein" => Ok(Self::Protein),
			"dayhoff" => Ok(Self::Dayhoff),
			"hp" => Ok(Self::Hp),
			_ => Err(Error::InvalidSignature { message: format!("Unknown molecule {raw:?}.") }),
		}
	}
}

impl Serialize for Molecule {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(self.as_str())
	}
}

impl<'de> Deserialize<'de> for Molecule {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		let raw = String::deserialize(deserializer)?;

		raw.parse().map_err(serde::de::Error::custom)
	}
}

/// A scaled minhash sketch of one sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SketchSignature {
	pub ksize: u32,
	pub molecule: Molecule,
	pub scaled: u64,
	pub hashes: Vec<u64>,
}
impl SketchSignature {
	pub fn validate(&self) -> Result<()> {
		if self.ksize == 0 {
			return Err(Error::InvalidSignature {
				message: "ksize must be greater than zero.".to_string(),
			});
		}
		if self.scaled == 0 {
			return Err(Error::InvalidSignature {
				message: "scaled must be greater than zero.".to_string(),
			});
		}
		if self.hashes.is_empty() {
			return Err(Error::InvalidSignature {
				message: "hashes must be non-empty.".to_string(),
			});
		}

		Ok(())
	}

	/// Parses one entry of a submitted `signatures` array.
	///
	/// Entries are either the compact `{ksize, molecule, scaled, hashes}` form or a sourmash
	/// signature record, which may carry several sketches.
	pub fn from_submitted(value: &Value) -> Result<Vec<Self>> {
		if value.get("signatures").is_some() {
			return parse_sourmash_value(value.clone());
		}

		let signature: Self = serde_json::from_value(value.clone())
			.map_err(|err| Error::InvalidSignature { message: err.to_string() })?;

		signature.validate()?;

		Ok(vec![signature])
	}

	/// Renders the sketch as a single-record sourmash signature document.
	pub fn to_sourmash(&self) -> Value {
		serde_json::json!([{
			"class": "sourmash_signature",
			"hash_function": SOURMASH_HASH_FUNCTION,
			"license": "CC0",
			"version": 0.4,
			"signatures": [{
				"num": 0,
				"ksize": self.ksize,
				"seed": SOURMASH_SEED,
				"max_hash": max_hash_for_scaled(self.scaled),
				"mins": self.hashes,
				"molecule": self.molecule.as_str(),
			}],
		}])
	}
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SourmashDocument {
	Many(Vec<SourmashRecord>),
	One(SourmashRecord),
}

#[derive(Debug, Deserialize)]
struct SourmashRecord {
	signatures: Vec<SourmashSketch>,
}

#[derive(Debug, Deserialize)]
struct SourmashSketch {
	ksize: u32,
	#[serde(default = "default_molecule")]
	molecule: Molecule,
	#[serde(default)]
	max_hash: u64,
	mins: Vec<u64>,
}

/// Parses a sourmash signature file into its sketches, in file order.
pub fn parse_sourmash(raw: &[u8]) -> Result<Vec<SketchSignature>> {
	let document: SourmashDocument = serde_json::from_slice(raw)
		.map_err(|err| Error::InvalidSignature { message: err.to_string() })?;

	from_document(document)
}

pub fn scaled_for_max_hash(max_hash: u64) -> u64 {
	if max_hash == 0 {
		return 0;
	}

	(u64::MAX as f64 / max_hash as f64).round() as u64
}

pub fn max_hash_for_scaled(scaled: u64) -> u64 {
	if scaled == 0 {
		return 0;
	}

	(u64::MAX as f64 / scaled as f64).round() as u64
}

fn parse_sourmash_value(value: Value) -> Result<Vec<SketchSignature>> {
	let document: SourmashDocument = serde_json::from_value(value)
		.map_err(|err| Error::InvalidSignature { message: err.to_string() })?;

	from_document(document)
}

fn from_document(document: SourmashDocument) -> Result<Vec<SketchSignature>> {
	let records = match document {
		SourmashDocument::Many(records) => records,
		SourmashDocument::One(record) => vec![record],
	};
	let mut out = Vec::new();

	for sketch in records.into_iter().flat_map(|record| record.signatures) {
		if sketch.max_hash == 0 {
			return Err(Error::InvalidSignature {
				message: format!("Sketch with ksize {} is not a scaled sketch.", sketch.ksize),
			});
		}

		let signature = SketchSignature {
			ksize: sketch.ksize,
			molecule: sketch.molecule,
			scaled: scaled_for_max_hash(sketch.max_hash),
			hashes: sketch.mins,
		};

		signature.validate()?;
		out.push(signature);
	}

	if out.is_empty() {
		return Err(Error::InvalidSignature {
			message: "Signature document contains no sketches.".to_string(),
		});
	}

	Ok(out)
}

fn default_molecule() -> Molecule {
	Molecule::Dna
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn scaled_survives_max_hash_conversion() {
		for scaled in [1, 10, 1_000, 10_000] {
			assert_eq!(scaled_for_max_hash(max_hash_for_scaled(scaled)), scaled);
		}
	}

	#[test]
	fn molecule_parsing_is_case_insensitive() {
		assert_eq!("dna".parse::<Molecule>().expect("parse failed"), Molecule::Dna);
		assert_eq!("DNA".parse::<Molecule>().expect("parse failed"), Molecule::Dna);
		assert_eq!("Protein".parse::<Molecule>().expect("parse failed"), Molecule::Protein);
		assert!("rna".parse::<Molecule>().is_err());
	}

	#[test]
	fn reads_every_sketch_of_a_multi_ksize_file() {
		let raw = serde_json::json!([{
			"class": "sourmash_signature",
			"name": "SRR000001",
			"signatures": [
				{ "ksize": 21, "molecule": "DNA", "max_hash": max_hash_for_scaled(1_000), "mins": [1, 2, 3] },
				{ "ksize": 31, "molecule": "DNA", "max_hash": max_hash_for_scaled(1_000), "mins": [4] }
			]
		}]);
		let sigs = parse_sourmash(raw.to_string().as_bytes()).expect("parse failed");

		assert_eq!(sigs.len(), 2);
		assert_eq!(sigs[0].ksize, 21);
		assert_eq!(sigs[0].scaled, 1_000);
		assert_eq!(sigs[1].hashes, vec![4]);
	}

	#[test]
	fn rejects_num_sketches() {
		let raw = br#"{"signatures": [{"ksize": 21, "max_hash": 0, "mins": [1]}]}"#;

		assert!(parse_sourmash(raw).is_err());
	}
}
