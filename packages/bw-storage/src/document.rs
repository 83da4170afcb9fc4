use mongodb::{
	Client, Collection,
	bson::{Bson, Document, doc},
};
use serde_json::Value;

use bw_domain::{MetadataRecord, NullPolicy};

use crate::{Backend, BoxFuture, MetadataSession, MetadataStore, Result, dedupe_first};

/// Metadata held in a MongoDB collection, one document per accession.
///
/// The client keeps its own pool and is shared by every request.
#[derive(Debug, Clone)]
pub struct DocumentStore {
	client: Client,
	database: String,
	collection: String,
	accession_field: String,
	null_policy: NullPolicy,
}
impl DocumentStore {
	/// Builds the client. No connection is made until the first query.
	pub async fn connect(cfg: &bw_config::Document) -> Result<Self> {
		let client = Client::with_uri_str(&cfg.uri).await?;

		Ok(Self {
			client,
			database: cfg.database.clone(),
			collection: cfg.collection.clone(),
			accession_field: cfg.accession_field.clone(),
			null_policy: NullPolicy::from_fill_missing(cfg.fill_missing),
		})
	}

	pub async fn count(&self) -> Result<u64> {
		Ok(self.collection().estimated_document_count().await?)
	}

	fn collection(&self) -> Collection<Document> {
		self.client.database(&self.database).collection(&self.collection)
	}
}

impl MetadataStore for DocumentStore {
	fn backend(&self) -> Backend {
		Backend::Document
	}

	fn null_policy(&self) -> NullPolicy {
		self.null_policy
	}

	fn session(&self) -> Box<dyn MetadataSession + '_> {
		Box::new(DocumentSession { store: self })
	}
}

pub struct DocumentSession<'a> {
	store: &'a DocumentStore,
}

impl MetadataSession for DocumentSession<'_> {
	fn lookup<'a>(
		&'a mut self,
		accessions: &'a [String],
		fields: &'a [String],
	) -> BoxFuture<'a, Result<Vec<MetadataRecord>>> {
		Box::pin(async move {
			if accessions.is_empty() {
				return Ok(Vec::new());
			}

			let key = self.store.accession_field.as_str();
			let mut filter = Document::new();

			filter.insert(key, doc! { "$in": accessions.to_vec() });

			let mut cursor = self
				.store
				.collection()
				.find(filter)
				.projection(projection(key, fields))
				.await?;
			let mut out = Vec::new();

			while cursor.advance().await? {
				let document = cursor.deserialize_current()?;
				let Some(accession) = document.get(key).and_then(Bson::as_str) else {
					continue;
				};
				let values = fields
					.iter()
					.map(|field| {
						let value = document.get(field).cloned().map(to_json).unwrap_or(Value::Null);

						(field.clone(), value)
					})
					.collect();

				out.push(MetadataRecord { accession: accession.to_string(), fields: values });
			}

			Ok(dedupe_first(out))
		})
	}
}

fn projection(key: &str, fields: &[String]) -> Document {
	let mut projection = doc! { "_id": 0 };

	projection.insert(key, 1);

	for field in fields {
		projection.insert(field.as_str(), 1);
	}

	projection
}

fn to_json(value: Bson) -> Value {
	match value {
		Bson::Null | Bson::Undefined => Value::Null,
		Bson::DateTime(ts) => ts.try_to_rfc3339_string().map(Value::String).unwrap_or(Value::Null),
		Bson::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
		other => other.into_relaxed_extjson(),
	}
}
