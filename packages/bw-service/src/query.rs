use std::fmt;

use serde_json::{Map, Value};

use crate::{Error, Result};

const MIN_PARAM_CHARS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
	Simple,
	Advanced,
	Accession,
}
impl Variant {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Simple => "simple",
			Self::Advanced => "advanced",
			Self::Accession => "accession",
		}
	}
}

impl fmt::Display for Variant {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A validated query. Signature content is checked later, when it is acquired.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryRequest {
	Simple { payload: Value },
	/// `fields` follows the configured vocabulary order.
	Advanced { payload: Value, fields: Vec<String> },
	Accession { catalogue: String, accession: String },
}
impl QueryRequest {
	pub fn variant(&self) -> Variant {
		match self {
			Self::Simple { .. } => Variant::Simple,
			Self::Advanced { .. } => Variant::Advanced,
			Self::Accession { .. } => Variant::Accession,
		}
	}
}

/// Accepts `{"signatures": [...]}` and nothing else.
pub fn parse_simple(body: Value) -> Result<QueryRequest> {
	let object = as_object(&body)?;

	reject_unknown_fields(object, &["signatures"])?;
	check_signatures(object)?;

	Ok(QueryRequest::Simple { payload: body })
}

/// Accepts `{"signatures": [...], "metadata": {field: bool}}` with fields drawn from `vocabulary`.
pub fn parse_advanced(body: Value, vocabulary: &[String]) -> Result<QueryRequest> {
	let object = as_object(&body)?;

	reject_unknown_fields(object, &["signatures", "metadata"])?;
	check_signatures(object)?;

	let selection = match object.get("metadata") {
		Some(Value::Object(selection)) => selection,
		Some(_) => {
			return Err(Error::validation(
				"metadata must be an object of field selections.",
				vec!["metadata".to_string()],
			));
		},
		None => {
			return Err(Error::validation("metadata is required.", vec!["metadata".to_string()]));
		},
	};
	let mut unknown = Vec::new();
	let mut not_bool = Vec::new();

	for (name, value) in selection {
		if !vocabulary.contains(name) {
			unknown.push(format!("metadata.{name}"));
		} else if !value.is_boolean() {
			not_bool.push(format!("metadata.{name}"));
		}
	}

	if !unknown.is_empty() {
		return Err(Error::validation(
			format!("Unknown metadata fields: {}.", unknown.join(", ")),
			unknown,
		));
	}
	if !not_bool.is_empty() {
		return Err(Error::validation(
			format!("Metadata selections must be booleans: {}.", not_bool.join(", ")),
			not_bool,
		));
	}

	let fields = vocabulary
		.iter()
		.filter(|field| selection.get(field.as_str()) == Some(&Value::Bool(true)))
		.cloned()
		.collect();

	Ok(QueryRequest::Advanced { payload: body, fields })
}

/// Accepts exactly the `accession` and `catalogue` query parameters.
pub fn parse_accession(params: &[(String, String)]) -> Result<QueryRequest> {
	let mut accession = None;
	let mut catalogue = None;
	let mut offending = Vec::new();

	for (name, value) in params {
		let slot = match name.as_str() {
			"accession" => &mut accession,
			"catalogue" => &mut catalogue,
			_ => {
				offending.push(name.clone());

				continue;
			},
		};

		if slot.replace(value.clone()).is_some() {
			offending.push(name.clone());
		}
	}

	if !offending.is_empty() {
		offending.dedup();

		return Err(Error::validation(
			format!("Unknown or repeated parameters: {}.", offending.join(", ")),
			offending,
		));
	}

	for (name, value) in [("accession", &accession), ("catalogue", &catalogue)] {
		match value {
			None => offending.push(name.to_string()),
			Some(value) if value.chars().count() < MIN_PARAM_CHARS => offending.push(name.to_string()),
			Some(_) => {},
		}
	}

	match (accession, catalogue) {
		(Some(accession), Some(catalogue)) if offending.is_empty() =>
			Ok(QueryRequest::Accession { catalogue, accession }),
		_ => Err(Error::validation(
			format!(
				"accession and catalogue are required and must be at least {MIN_PARAM_CHARS} characters long."
			),
			offending,
		)),
	}
}

fn as_object(body: &Value) -> Result<&Map<String, Value>> {
	body.as_object()
		.ok_or_else(|| Error::validation("Request body must be a JSON object.", Vec::new()))
}

fn reject_unknown_fields(object: &Map<String, Value>, allowed: &[&str]) -> Result<()> {
	let unknown = object
		.keys()
		.filter(|key| !allowed.contains(&key.as_str()))
		.cloned()
		.collect::<Vec<_>>();

	if unknown.is_empty() {
		return Ok(());
	}

	Err(Error::validation(format!("Unknown fields: {}.", unknown.join(", ")), unknown))
}

fn check_signatures(object: &Map<String, Value>) -> Result<()> {
	let field = || vec!["signatures".to_string()];
	let items = match object.get("signatures") {
		Some(Value::Array(items)) => items,
		Some(_) => return Err(Error::validation("signatures must be an array.", field())),
		None => return Err(Error::validation("signatures is required.", field())),
	};

	if items.is_empty() {
		return Err(Error::validation("signatures must not be empty.", field()));
	}

	let not_objects = items
		.iter()
		.enumerate()
		.filter(|(_, item)| !item.is_object())
		.map(|(idx, _)| format!("signatures[{idx}]"))
		.collect::<Vec<_>>();

	if !not_objects.is_empty() {
		return Err(Error::validation("Each signature must be a JSON object.", not_objects));
	}

	Ok(())
}
