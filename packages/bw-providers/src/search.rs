// std
use std::time::Duration;

// crates.io
use reqwest::{
	Client, RequestBuilder, Response, StatusCode,
	header::{CONTENT_TYPE, HeaderValue},
};
use serde::Deserialize;

use bw_domain::{ContainmentMatch, SketchSignature};

use crate::{Error, Result};

const MAX_UPSTREAM_BODY_CHARS: usize = 4_096;
const ACCESSION_COLUMNS: [&str; 3] = ["SRA accession", "acc", "accession"];

/// Client for the remote containment index.
///
/// Holds its own connection pool; build one per request and drop it when the request ends.
#[derive(Debug, Clone)]
pub struct SearchClient {
	http: Client,
	index_server: String,
	ksize: u32,
	threshold: f64,
	max_retries: u32,
	backoff: Duration,
	backoff_max: Duration,
}
impl SearchClient {
	pub fn new(cfg: &bw_config::Search) -> Result<Self> {
		let http = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self {
			http,
			index_server: cfg.index_server.clone(),
			ksize: cfg.ksize,
			threshold: cfg.threshold,
			max_retries: cfg.max_retries,
			backoff: Duration::from_millis(cfg.retry_backoff_ms),
			backoff_max: Duration::from_millis(cfg.retry_backoff_max_ms),
		})
	}

	pub fn ksize(&self) -> u32 {
		self.ksize
	}

	/// Sends one sketch to `/search` and returns the matches above the threshold.
	pub async fn search(&self, signature: &SketchSignature) -> Result<Vec<ContainmentMatch>> {
		let url = format!("{}/search", self.index_server);
		let body = serde_json::to_vec(&signature.to_sourmash())?;
		let res = self
			.send_with_retry(|| {
				self.http
					.post(url.as_str())
					.header(CONTENT_TYPE, "application/json")
					.body(body.clone())
			})
			.await?;
		let is_json = res.headers().get(CONTENT_TYPE).map(is_json_content_type).unwrap_or(false);
		let text = res.text().await?;
		let matches = if is_json {
			parse_json_matches(&text, self.ksize)?
		} else {
			parse_csv_matches(&text, self.ksize)?
		};
		let total = matches.len();
		let kept = matches
			.into_iter()
			.filter(|hit| hit.containment > self.threshold)
			.collect::<Vec<_>>();

		tracing::debug!(total, kept = kept.len(), threshold = self.threshold, "Containment search returned.");

		Ok(kept)
	}

	pub async fn health(&self) -> Result<()> {
		let url = format!("{}/health", self.index_server);
		let res = self
			.http
			.get(url)
			.header(CONTENT_TYPE, "application/json")
			.send()
			.await
			.map_err(|err| Error::Unreachable { message: err.to_string() })?;

		check_status(res).await.map(|_| ())
	}

	async fn send_with_retry<F>(&self, build: F) -> Result<Response>
	where
		F: Fn() -> RequestBuilder,
	{
		let mut backoff = self.backoff;
		let mut attempt = 0;

		loop {
			attempt += 1;

			let (err, retryable) = match build().send().await {
				Ok(res) => {
					let status = res.status();

					match check_status(res).await {
						Ok(res) => return Ok(res),
						Err(err) => (err, is_retryable_status(status)),
					}
				},
				Err(err) => {
					let retryable = !err.is_builder();

					(Error::Unreachable { message: err.to_string() }, retryable)
				},
			};

			if !retryable || attempt > self.max_retries {
				return Err(err);
			}

			tracing::warn!(attempt, ?backoff, error = %err, "Containment search failed; retrying.");

			tokio::time::sleep(backoff).await;

			backoff = backoff.saturating_mul(2).min(self.backoff_max);
		}
	}
}

#[derive(Debug, Deserialize)]
struct JsonMatch {
	#[serde(alias = "acc", alias = "SRA accession")]
	accession: String,
	containment: f64,
	#[serde(rename = "cANI", default)]
	cani: Option<f64>,
}

/// Parses the index's CSV reply. The header row is required; column order is not.
pub fn parse_csv_matches(raw: &str, ksize: u32) -> Result<Vec<ContainmentMatch>> {
	if raw.trim().is_empty() {
		return Ok(Vec::new());
	}

	let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(raw.as_bytes());
	let headers = reader.headers()?.clone();
	let accession_idx = headers
		.iter()
		.position(|name| ACCESSION_COLUMNS.contains(&name))
		.ok_or_else(|| Error::InvalidResponse {
			message: "Search response is missing an accession column.".to_string(),
		})?;
	let containment_idx =
		headers.iter().position(|name| name == "containment").ok_or_else(|| {
			Error::InvalidResponse {
				message: "Search response is missing a containment column.".to_string(),
			}
		})?;
	let cani_idx = headers.iter().position(|name| name == "cANI");
	let mut out = Vec::new();

	for row in reader.records() {
		let row = row?;
		let accession = row.get(accession_idx).unwrap_or_default();

		if accession.is_empty() {
			return Err(Error::InvalidResponse {
				message: "Search response row has an empty accession.".to_string(),
			});
		}

		let containment = parse_score(row.get(containment_idx), "containment")?;
		let cani = match cani_idx.and_then(|idx| row.get(idx)).filter(|raw| !raw.is_empty()) {
			Some(raw) => Some(parse_score(Some(raw), "cANI")?),
			None => None,
		};

		if let Some(hit) = build_match(accession, containment, cani, ksize) {
			out.push(hit);
		}
	}

	Ok(out)
}

pub fn parse_json_matches(raw: &str, ksize: u32) -> Result<Vec<ContainmentMatch>> {
	let rows: Vec<JsonMatch> = serde_json::from_str(raw)?;

	Ok(rows
		.into_iter()
		.filter_map(|row| build_match(&row.accession, row.containment, row.cani, ksize))
		.collect())
}

/// Returns `None` when the containment is not a finite number. Scores outside 0.0-1.0 are
/// clamped, and an unusable cANI falls back to the value derived from containment.
fn build_match(
	accession: &str,
	containment: f64,
	cani: Option<f64>,
	ksize: u32,
) -> Option<ContainmentMatch> {
	let containment = check_score(accession, "containment", containment)?;
	let mut hit = ContainmentMatch::from_containment(accession, containment, ksize);

	if let Some(cani) = cani.and_then(|cani| check_score(accession, "cANI", cani)) {
		hit.cani = cani;
	}

	Some(hit)
}

fn parse_score(raw: Option<&str>, column: &str) -> Result<f64> {
	raw.unwrap_or_default().parse::<f64>().map_err(|_| Error::InvalidResponse {
		message: format!("Search response has a non-numeric {column} value."),
	})
}

fn check_score(accession: &str, column: &str, value: f64) -> Option<f64> {
	if !value.is_finite() {
		tracing::warn!(accession, column, value, "Ignoring non-finite search score.");

		return None;
	}
	if !(0.0..=1.0).contains(&value) {
		tracing::warn!(accession, column, value, "Clamping search score to 0.0-1.0.");
	}

	Some(value.clamp(0.0, 1.0))
}

async fn check_status(res: Response) -> Result<Response> {
	let status = res.status();

	if status.is_success() {
		return Ok(res);
	}

	let mut body = res.text().await.unwrap_or_default();

	if body.chars().count() > MAX_UPSTREAM_BODY_CHARS {
		body = body.chars().take(MAX_UPSTREAM_BODY_CHARS).collect();
	}

	Err(Error::Upstream { status: status.as_u16(), body })
}

fn is_retryable_status(status: StatusCode) -> bool {
	status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn is_json_content_type(value: &HeaderValue) -> bool {
	value.to_str().map(|raw| raw.starts_with("application/json")).unwrap_or(false)
}
