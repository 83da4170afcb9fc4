use std::path::PathBuf;

use serde::Deserialize;

pub const SIMPLE_FIELDS: [&str; 6] = [
	"bioproject",
	"assay_type",
	"collection_date_sam",
	"geo_loc_name_country_calc",
	"organism",
	"lat_lon",
];
/// Keys every enriched record already carries; metadata fields may not reuse them.
pub const RESERVED_FIELDS: [&str; 4] = ["acc", "containment", "cANI", "isMember"];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub search: Search,
	pub signatures: Signatures,
	pub storage: Storage,
	pub queries: Queries,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub http_bind: String,
	pub log_level: String,
	#[serde(default = "default_max_body_bytes")]
	pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Search {
	/// Base URL of the containment index, without the `/search` path.
	pub index_server: String,
	#[serde(default = "default_ksize")]
	pub ksize: u32,
	/// Matches must have containment strictly above this value.
	#[serde(default = "default_threshold")]
	pub threshold: f64,
	pub timeout_ms: u64,
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,
	#[serde(default = "default_retry_backoff_ms")]
	pub retry_backoff_ms: u64,
	#[serde(default = "default_retry_backoff_max_ms")]
	pub retry_backoff_max_ms: u64,
	#[serde(default = "default_max_concurrent")]
	pub max_concurrent: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Signatures {
	/// Directory holding one sub-directory per catalogue.
	pub root: PathBuf,
	/// One of "first_match" or "reject".
	#[serde(default = "default_on_ambiguous")]
	pub on_ambiguous: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub columnar: Option<Columnar>,
	pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Columnar {
	pub path: PathBuf,
	#[serde(default = "default_table")]
	pub table: String,
	#[serde(default = "default_accession_key")]
	pub accession_column: String,
	#[serde(default = "default_true")]
	pub fill_missing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
	pub uri: String,
	pub database: String,
	pub collection: String,
	#[serde(default = "default_accession_key")]
	pub accession_field: String,
	#[serde(default)]
	pub fill_missing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Queries {
	pub simple: Route,
	pub advanced: AdvancedRoute,
	pub accession: Route,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Route {
	/// One of "columnar" or "document".
	pub backend: String,
	pub allow_list: Option<PathBuf>,
	#[serde(default = "default_fields")]
	pub fields: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvancedRoute {
	pub backend: String,
	pub allow_list: Option<PathBuf>,
	/// Fields a caller may select. Selected fields are returned in this order.
	pub vocabulary: Vec<String>,
}

fn default_max_body_bytes() -> usize {
	5 * 1024 * 1024
}

fn default_ksize() -> u32 {
	21
}

fn default_threshold() -> f64 {
	0.1
}

fn default_max_retries() -> u32 {
	2
}

fn default_retry_backoff_ms() -> u64 {
	250
}

fn default_retry_backoff_max_ms() -> u64 {
	2_000
}

fn default_max_concurrent() -> usize {
	4
}

fn default_on_ambiguous() -> String {
	"first_match".to_string()
}

fn default_table() -> String {
	"metadata".to_string()
}

fn default_accession_key() -> String {
	"acc".to_string()
}

fn default_true() -> bool {
	true
}

fn default_fields() -> Vec<String> {
	SIMPLE_FIELDS.iter().map(|field| field.to_string()).collect()
}
