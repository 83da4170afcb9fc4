mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	AdvancedRoute, Columnar, Config, Document, Queries, RESERVED_FIELDS, Route, SIMPLE_FIELDS,
	Search, Service, Signatures, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	finish(cfg)
}

pub fn parse(raw: &str) -> Result<Config> {
	let cfg: Config = toml::from_str(raw)?;

	finish(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.http_bind.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.http_bind must be non-empty.".to_string(),
		});
	}
	if cfg.service.max_body_bytes == 0 {
		return Err(Error::Validation {
			message: "service.max_body_bytes must be greater than zero.".to_string(),
		});
	}
	if cfg.search.index_server.is_empty() {
		return Err(Error::Validation {
			message: "search.index_server must be non-empty.".to_string(),
		});
	}
	if !cfg.search.index_server.starts_with("http://")
		&& !cfg.search.index_server.starts_with("https://")
	{
		return Err(Error::Validation {
			message: "search.index_server must be an http or https URL.".to_string(),
		});
	}
	if cfg.search.ksize == 0 {
		return Err(Error::Validation {
			message: "search.ksize must be greater than zero.".to_string(),
		});
	}
	if !cfg.search.threshold.is_finite() {
		return Err(Error::Validation {
			message: "search.threshold must be a finite number.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&cfg.search.threshold) {
		return Err(Error::Validation {
			message: "search.threshold must be in the range 0.0-1.0.".to_string(),
		});
	}
	if cfg.search.timeout_ms == 0 {
		return Err(Error::Validation {
			message: "search.timeout_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.search.max_concurrent == 0 {
		return Err(Error::Validation {
			message: "search.max_concurrent must be greater than zero.".to_string(),
		});
	}
	if cfg.search.retry_backoff_max_ms < cfg.search.retry_backoff_ms {
		return Err(Error::Validation {
			message: "search.retry_backoff_max_ms must not be less than search.retry_backoff_ms."
				.to_string(),
		});
	}
	if !matches!(cfg.signatures.on_ambiguous.as_str(), "first_match" | "reject") {
		return Err(Error::Validation {
			message: "signatures.on_ambiguous must be one of first_match or reject.".to_string(),
		});
	}

	if let Some(columnar) = cfg.storage.columnar.as_ref() {
		if columnar.path.as_os_str().is_empty() {
			return Err(Error::Validation {
				message: "storage.columnar.path must be non-empty.".to_string(),
			});
		}

		for (label, value) in [
			("storage.columnar.table", &columnar.table),
			("storage.columnar.accession_column", &columnar.accession_column),
		] {
			validate_identifier(label, value)?;
		}
	}
	if let Some(document) = cfg.storage.document.as_ref() {
		for (label, value) in [
			("storage.document.uri", &document.uri),
			("storage.document.database", &document.database),
			("storage.document.collection", &document.collection),
			("storage.document.accession_field", &document.accession_field),
		] {
			if value.trim().is_empty() {
				return Err(Error::Validation { message: format!("{label} must be non-empty.") });
			}
		}
	}

	for (label, backend) in [
		("queries.simple", &cfg.queries.simple.backend),
		("queries.advanced", &cfg.queries.advanced.backend),
		("queries.accession", &cfg.queries.accession.backend),
	] {
		validate_backend(cfg, label, backend)?;
	}
	for (label, fields) in [
		("queries.simple.fields", &cfg.queries.simple.fields),
		("queries.advanced.vocabulary", &cfg.queries.advanced.vocabulary),
		("queries.accession.fields", &cfg.queries.accession.fields),
	] {
		if fields.is_empty() {
			return Err(Error::Validation { message: format!("{label} must be non-empty.") });
		}

		for (idx, field) in fields.iter().enumerate() {
			validate_identifier(label, field)?;

			if RESERVED_FIELDS.contains(&field.as_str()) {
				return Err(Error::Validation {
					message: format!("{label} uses the reserved output key {field:?}."),
				});
			}
			if fields[..idx].contains(field) {
				return Err(Error::Validation {
					message: format!("{label} lists {field:?} more than once."),
				});
			}
		}
	}

	Ok(())
}

fn finish(mut cfg: Config) -> Result<Config> {
	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

fn normalize(cfg: &mut Config) {
	let trimmed = cfg.search.index_server.trim().trim_end_matches('/').to_string();

	cfg.search.index_server = trimmed;

	for allow_list in [
		&mut cfg.queries.simple.allow_list,
		&mut cfg.queries.advanced.allow_list,
		&mut cfg.queries.accession.allow_list,
	] {
		if allow_list.as_ref().map(|path| path.as_os_str().is_empty()).unwrap_or(false) {
			*allow_list = None;
		}
	}
}

fn validate_backend(cfg: &Config, label: &str, backend: &str) -> Result<()> {
	match backend {
		"columnar" if cfg.storage.columnar.is_none() => Err(Error::Validation {
			message: format!("{label}.backend is columnar but [storage.columnar] is missing."),
		}),
		"document" if cfg.storage.document.is_none() => Err(Error::Validation {
			message: format!("{label}.backend is document but [storage.document] is missing."),
		}),
		"columnar" | "document" => Ok(()),
		_ => Err(Error::Validation {
			message: format!("{label}.backend must be one of columnar or document."),
		}),
	}
}

/// Names that end up inside SQL text must be plain identifiers.
fn validate_identifier(label: &str, value: &str) -> Result<()> {
	let mut chars = value.chars();
	let valid = match chars.next() {
		Some(first) if first.is_ascii_alphabetic() || first == '_' =>
			chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
		_ => false,
	};

	if !valid {
		return Err(Error::Validation {
			message: format!("{label} contains an invalid identifier {value:?}."),
		});
	}

	Ok(())
}
