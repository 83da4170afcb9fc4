use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use bw_providers::SearchClient;
use bw_storage::{MetadataSession, MetadataStore};

use crate::{Error, Result, query::Variant};

/// Resources owned by one request.
///
/// The search client and the metadata session are created on first use. Dropping the context
/// releases both, whichever way the request ends.
pub struct RequestContext<'a> {
	request_id: Uuid,
	variant: Variant,
	cancel: CancellationToken,
	search_cfg: &'a bw_config::Search,
	search: Option<SearchClient>,
	session: Option<Box<dyn MetadataSession + 'a>>,
	started: Instant,
}
impl<'a> RequestContext<'a> {
	pub fn new(search_cfg: &'a bw_config::Search, variant: Variant, cancel: CancellationToken) -> Self {
		Self {
			request_id: Uuid::new_v4(),
			variant,
			cancel,
			search_cfg,
			search: None,
			session: None,
			started: Instant::now(),
		}
	}

	pub fn request_id(&self) -> Uuid {
		self.request_id
	}

	pub fn variant(&self) -> Variant {
		self.variant
	}

	pub fn cancel_token(&self) -> &CancellationToken {
		&self.cancel
	}

	pub fn ensure_active(&self) -> Result<()> {
		if self.cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		Ok(())
	}

	pub fn search_client(&mut self) -> Result<&SearchClient> {
		if self.search.is_none() {
			self.search = Some(SearchClient::new(self.search_cfg)?);
		}

		self.search.as_ref().ok_or_else(|| Error::Internal {
			message: "Search client is unavailable.".to_string(),
		})
	}

	pub fn metadata_session(
		&mut self,
		store: &'a dyn MetadataStore,
	) -> &mut (dyn MetadataSession + 'a) {
		self.session.get_or_insert_with(|| store.session()).as_mut()
	}
}

impl Drop for RequestContext<'_> {
	fn drop(&mut self) {
		tracing::debug!(
			request_id = %self.request_id,
			variant = self.variant.as_str(),
			search_client = self.search.is_some(),
			metadata_session = self.session.is_some(),
			cancelled = self.cancel.is_cancelled(),
			elapsed_ms = self.started.elapsed().as_millis() as u64,
			"Releasing request resources."
		);

		self.session.take();
		self.search.take();
	}
}
