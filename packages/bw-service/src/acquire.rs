use std::{io::ErrorKind, path::Path};

use regex::Regex;
use serde_json::Value;
use tokio::fs;

use bw_config::Signatures;
use bw_domain::{SketchSignature, parse_sourmash};

use crate::{Error, Result};

const SIGNATURE_SUFFIX: &str = ".fna.sig";

/// Reads the `signatures` array of a submitted payload.
pub fn submitted(payload: &Value) -> Result<Vec<SketchSignature>> {
	let Some(items) = payload.get("signatures").and_then(Value::as_array) else {
		return Err(Error::Format { message: "Payload has no signatures array.".to_string() });
	};
	let mut out = Vec::with_capacity(items.len());

	for (idx, item) in items.iter().enumerate() {
		let signatures = SketchSignature::from_submitted(item)
			.map_err(|err| Error::Format { message: format!("signatures[{idx}]: {err}") })?;

		out.extend(signatures);
	}

	if out.is_empty() {
		return Err(Error::Format { message: "Payload contains no signatures.".to_string() });
	}

	Ok(out)
}

/// Loads the stored signature file `{accession}.fna.sig` of a catalogue.
///
/// `accession` may contain `*` and `?` wildcards. When several files match, the first one in
/// lexical order wins unless the configuration asks to reject ambiguous names.
pub async fn resolve(
	cfg: &Signatures,
	catalogue: &str,
	accession: &str,
) -> Result<Vec<SketchSignature>> {
	check_path_segment("catalogue", catalogue)?;
	check_path_segment("accession", accession)?;

	let dir = cfg.root.join(catalogue);
	let pattern = file_pattern(accession)?;
	let mut candidates = list_matching(&dir, &pattern).await?;

	candidates.sort();

	let file_name = match candidates.as_slice() {
		[] => {
			return Err(Error::NotFound {
				message: format!("No signature file for accession {accession} in {catalogue}."),
			});
		},
		[only] => only,
		[first, ..] if cfg.on_ambiguous == "first_match" => {
			tracing::warn!(
				accession,
				catalogue,
				candidates = candidates.len(),
				chosen = %first,
				"Several signature files match; using the first."
			);

			first
		},
		_ => {
			return Err(Error::validation(
				format!(
					"Accession {accession} matches several signature files: {}.",
					candidates.join(", ")
				),
				vec!["accession".to_string()],
			));
		},
	};
	let path = dir.join(file_name);
	let raw = fs::read(&path).await.map_err(|err| Error::Format {
		message: format!("Failed to read {}: {err}", path.display()),
	})?;

	parse_sourmash(&raw).map_err(|err| Error::Format {
		message: format!("Failed to parse {}: {err}", path.display()),
	})
}

async fn list_matching(dir: &Path, pattern: &Regex) -> Result<Vec<String>> {
	let mut entries = match fs::read_dir(dir).await {
		Ok(entries) => entries,
		Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
		Err(err) => {
			return Err(Error::Internal {
				message: format!("Failed to list {}: {err}", dir.display()),
			});
		},
	};
	let mut out = Vec::new();

	while let Some(entry) = entries.next_entry().await.map_err(|err| Error::Internal {
		message: format!("Failed to list {}: {err}", dir.display()),
	})? {
		let Some(name) = entry.file_name().to_str().map(str::to_string) else {
			continue;
		};

		if pattern.is_match(&name) {
			out.push(name);
		}
	}

	Ok(out)
}

fn file_pattern(accession: &str) -> Result<Regex> {
	let mut pattern = String::from("^");

	for c in accession.chars() {
		match c {
			'*' => pattern.push_str(".*"),
			'?' => pattern.push('.'),
			other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
		}
	}

	pattern.push_str(&regex::escape(SIGNATURE_SUFFIX));
	pattern.push('$');

	Regex::new(&pattern).map_err(|err| Error::Internal { message: err.to_string() })
}

fn check_path_segment(name: &str, value: &str) -> Result<()> {
	let unsafe_segment = value.is_empty()
		|| value.contains(['/', '\\', '\0'])
		|| value == "."
		|| value.contains("..");

	if unsafe_segment {
		return Err(Error::validation(
			format!("{name} must not contain path separators or parent references."),
			vec![name.to_string()],
		));
	}

	Ok(())
}
