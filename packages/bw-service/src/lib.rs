pub mod acquire;
pub mod context;
pub mod query;

mod error;

pub use context::RequestContext;
pub use error::{Error, Result};
pub use query::{QueryRequest, Variant, parse_accession, parse_advanced, parse_simple};

use std::path::Path;

use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use bw_config::Config;
use bw_domain::{AllowList, ContainmentMatch, EnrichedRecord, SketchSignature, merge};
use bw_providers::SearchClient;
use bw_storage::{Backend, MetadataStore, columnar::ColumnarStore, document::DocumentStore};

#[derive(Debug, Clone, Serialize)]
pub struct Stats {
	pub n_datasets: u64,
}

/// Store, fields and allow-list selected for one query variant.
struct RoutePlan<'a> {
	store: &'a dyn MetadataStore,
	fields: &'a [String],
	allow_list: Option<&'a Path>,
}

/// Runs the acquire, search, lookup, merge and tag pipeline.
pub struct BranchwaterService {
	pub cfg: Config,
	columnar: Option<ColumnarStore>,
	document: Option<DocumentStore>,
}
impl BranchwaterService {
	/// Builds the configured metadata stores. The document client is shared by all requests.
	pub async fn connect(cfg: Config) -> Result<Self> {
		let columnar = cfg.storage.columnar.as_ref().map(ColumnarStore::new);
		let document = match cfg.storage.document.as_ref() {
			Some(document) => Some(DocumentStore::connect(document).await?),
			None => None,
		};

		Ok(Self { cfg, columnar, document })
	}

	pub fn with_stores(
		cfg: Config,
		columnar: Option<ColumnarStore>,
		document: Option<DocumentStore>,
	) -> Self {
		Self { cfg, columnar, document }
	}

	pub fn parse_simple(&self, body: serde_json::Value) -> Result<QueryRequest> {
		parse_simple(body)
	}

	pub fn parse_advanced(&self, body: serde_json::Value) -> Result<QueryRequest> {
		parse_advanced(body, &self.cfg.queries.advanced.vocabulary)
	}

	pub fn parse_accession(&self, params: &[(String, String)]) -> Result<QueryRequest> {
		parse_accession(params)
	}

	pub async fn run(
		&self,
		query: QueryRequest,
		cancel: CancellationToken,
	) -> Result<Vec<EnrichedRecord>> {
		let mut ctx = RequestContext::new(&self.cfg.search, query.variant(), cancel);
		let span = tracing::info_span!(
			"query",
			request_id = %ctx.request_id(),
			variant = ctx.variant().as_str()
		);

		async {
			let result = self.execute(&mut ctx, query).await;

			match &result {
				Ok(records) => tracing::info!(records = records.len(), "Query finished."),
				Err(Error::Internal { message }) => tracing::error!(%message, "Query failed."),
				Err(err) => tracing::warn!(error = %err, "Query failed."),
			}

			result
		}
		.instrument(span)
		.await
	}

	pub async fn health(&self) -> Result<()> {
		SearchClient::new(&self.cfg.search)?.health().await?;

		Ok(())
	}

	/// Dataset count shown on the landing pages. The columnar store is preferred when both exist.
	pub async fn stats(&self) -> Result<Stats> {
		let n_datasets = match (&self.columnar, &self.document) {
			(Some(columnar), _) => columnar.count().await?,
			(None, Some(document)) => document.count().await?,
			(None, None) => {
				return Err(Error::Internal {
					message: "No metadata store is configured.".to_string(),
				});
			},
		};

		Ok(Stats { n_datasets })
	}

	async fn execute<'a>(
		&'a self,
		ctx: &mut RequestContext<'a>,
		query: QueryRequest,
	) -> Result<Vec<EnrichedRecord>> {
		let plan = self.plan(&query)?;
		let signatures = match &query {
			QueryRequest::Simple { payload } | QueryRequest::Advanced { payload, .. } =>
				acquire::submitted(payload)?,
			QueryRequest::Accession { catalogue, accession } =>
				acquire::resolve(&self.cfg.signatures, catalogue, accession).await?,
		};
		let fields = match &query {
			QueryRequest::Advanced { fields, .. } => fields.as_slice(),
			_ => plan.fields,
		};

		ctx.ensure_active()?;

		let matches = self.search_all(ctx, &signatures).await?;
		let accessions = unique_accessions(&matches);

		tracing::debug!(
			signatures = signatures.len(),
			matches = matches.len(),
			accessions = accessions.len(),
			"Containment search complete."
		);

		let records = if accessions.is_empty() {
			Vec::new()
		} else {
			ctx.ensure_active()?;

			let cancel = ctx.cancel_token().clone();
			let session = ctx.metadata_session(plan.store);

			tokio::select! {
				biased;
				_ = cancel.cancelled() => return Err(Error::Cancelled),
				res = session.lookup(&accessions, fields) => res?,
			}
		};
		let enriched = merge(&matches, records, plan.store.null_policy());
		let allow_list = match plan.allow_list {
			Some(path) => load_allow_list(path).await?,
			None => AllowList::empty(),
		};

		ctx.ensure_active()?;

		Ok(allow_list.tag(enriched))
	}

	/// Sends every signature with the configured ksize, at most `max_concurrent` at a time.
	///
	/// Matches are concatenated in submission order.
	async fn search_all(
		&self,
		ctx: &mut RequestContext<'_>,
		signatures: &[SketchSignature],
	) -> Result<Vec<ContainmentMatch>> {
		let ksize = self.cfg.search.ksize;
		let eligible =
			signatures.iter().filter(|signature| signature.ksize == ksize).collect::<Vec<_>>();

		if eligible.is_empty() {
			return Err(Error::Format {
				message: format!("No submitted signature has ksize {ksize}."),
			});
		}
		if eligible.len() < signatures.len() {
			tracing::info!(
				skipped = signatures.len() - eligible.len(),
				ksize,
				"Skipping signatures with a different ksize."
			);
		}

		let cancel = ctx.cancel_token().clone();
		let client = ctx.search_client()?;
		let pending =
			eligible.into_iter().map(|signature| client.search(signature)).collect::<Vec<_>>();
		let searches = stream::iter(pending)
			.buffered(self.cfg.search.max_concurrent)
			.try_collect::<Vec<_>>();
		let batches = tokio::select! {
			biased;
			_ = cancel.cancelled() => return Err(Error::Cancelled),
			res = searches => res?,
		};

		Ok(batches.into_iter().flatten().collect())
	}

	fn plan(&self, query: &QueryRequest) -> Result<RoutePlan<'_>> {
		let queries = &self.cfg.queries;
		let (backend, fields, allow_list) = match query {
			QueryRequest::Simple { .. } =>
				(&queries.simple.backend, queries.simple.fields.as_slice(), &queries.simple.allow_list),
			QueryRequest::Advanced { .. } =>
				(&queries.advanced.backend, &[][..], &queries.advanced.allow_list),
			QueryRequest::Accession { .. } => (
				&queries.accession.backend,
				queries.accession.fields.as_slice(),
				&queries.accession.allow_list,
			),
		};

		Ok(RoutePlan { store: self.store(backend.parse()?)?, fields, allow_list: allow_list.as_deref() })
	}

	fn store(&self, backend: Backend) -> Result<&dyn MetadataStore> {
		let store: Option<&dyn MetadataStore> = match backend {
			Backend::Columnar => self.columnar.as_ref().map(|store| store as &dyn MetadataStore),
			Backend::Document => self.document.as_ref().map(|store| store as &dyn MetadataStore),
		};

		store.ok_or_else(|| Error::Internal {
			message: format!("The {backend} metadata store is not configured."),
		})
	}
}

/// Reads an allow-list document. Called once per request.
pub async fn load_allow_list(path: &Path) -> Result<AllowList> {
	let raw = tokio::fs::read(path).await.map_err(|err| Error::Internal {
		message: format!("Failed to read allow-list {}: {err}", path.display()),
	})?;

	AllowList::from_json(&raw).map_err(|err| Error::Internal {
		message: format!("Failed to parse allow-list {}: {err}", path.display()),
	})
}

/// Distinct accessions in first-seen order.
fn unique_accessions(matches: &[ContainmentMatch]) -> Vec<String> {
	let mut seen = std::collections::HashSet::with_capacity(matches.len());

	matches
		.iter()
		.filter(|hit| seen.insert(hit.accession.as_str()))
		.map(|hit| hit.accession.clone())
		.collect()
}
