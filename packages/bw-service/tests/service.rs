use std::{
	path::{Path, PathBuf},
	time::Duration,
};

use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use bw_domain::{Molecule, SketchSignature, round_score};
use bw_service::{BranchwaterService, Error, QueryRequest};
use bw_storage::columnar::ColumnarStore;
use bw_testkit::{MockIndex, MockResponse};

const METADATA_SQL: &str = "\
CREATE TABLE metadata (
	acc VARCHAR,
	bioproject VARCHAR,
	assay_type VARCHAR,
	collection_date_sam VARCHAR,
	geo_loc_name_country_calc VARCHAR,
	organism VARCHAR,
	lat_lon VARCHAR,
	instrument VARCHAR
);
INSERT INTO metadata VALUES
	('SRX2', 'PRJNA2', 'AMPLICON', '2019', 'Kenya', 'soil metagenome', NULL, 'MinION'),
	('SRX1', 'PRJNA1', 'WGS', '2020-01-05', 'Brazil', 'human gut metagenome', '1.0 N 2.0 W', NULL);";

struct Fixture {
	dir: tempfile::TempDir,
}
impl Fixture {
	fn new() -> Self {
		let dir = tempfile::tempdir().expect("Failed to create temp dir.");

		bw_testkit::write_duckdb(&dir.path().join("metadata.duckdb"), METADATA_SQL)
			.expect("Failed to seed DuckDB.");
		std::fs::write(dir.path().join("simple_allow.json"), r#"{"accessions": ["SRX1"]}"#)
			.expect("Failed to write allow-list.");
		std::fs::write(dir.path().join("advanced_allow.json"), r#"["SRX2"]"#)
			.expect("Failed to write allow-list.");

		Self { dir }
	}

	fn root(&self) -> PathBuf {
		self.dir.path().join("signatures")
	}

	fn service(&self, index_url: &str) -> BranchwaterService {
		self.service_with(index_url, "first_match", 2)
	}

	fn service_with(&self, index_url: &str, on_ambiguous: &str, max_retries: u32) -> BranchwaterService {
		let cfg = bw_config::parse(&config_toml(self.dir.path(), index_url, on_ambiguous, max_retries))
			.expect("Failed to parse test config.");
		let columnar = cfg.storage.columnar.as_ref().map(ColumnarStore::new);

		BranchwaterService::with_stores(cfg, columnar, None)
	}
}

fn config_toml(dir: &Path, index_url: &str, on_ambiguous: &str, max_retries: u32) -> String {
	let dir = dir.display();

	format!(
		r#"
[service]
http_bind = "127.0.0.1:0"
log_level = "debug"

[search]
index_server = "{index_url}"
ksize = 21
threshold = 0.1
timeout_ms = 2000
max_retries = {max_retries}
retry_backoff_ms = 1
retry_backoff_max_ms = 4
max_concurrent = 2

[signatures]
root = '{dir}/signatures'
on_ambiguous = "{on_ambiguous}"

[storage.columnar]
path = '{dir}/metadata.duckdb'

[queries.simple]
backend = "columnar"
allow_list = '{dir}/simple_allow.json'

[queries.advanced]
backend = "columnar"
allow_list = '{dir}/advanced_allow.json'
vocabulary = ["bioproject", "organism", "instrument", "lat_lon"]

[queries.accession]
backend = "columnar"
fields = ["organism"]
"#
	)
}

fn signature(ksize: u32) -> SketchSignature {
	SketchSignature { ksize, molecule: Molecule::Dna, scaled: 1_000, hashes: vec![11, 22, 33] }
}

fn compact(signature: &SketchSignature) -> Value {
	serde_json::to_value(signature).expect("Failed to encode signature.")
}

fn as_json(records: &[bw_domain::EnrichedRecord]) -> Vec<Value> {
	records.iter().map(|record| serde_json::to_value(record).expect("Encode failed.")).collect()
}

async fn run(service: &BranchwaterService, query: QueryRequest) -> bw_service::Result<Vec<Value>> {
	service.run(query, CancellationToken::new()).await.map(|records| as_json(&records))
}

#[tokio::test]
async fn simple_query_joins_scores_metadata_and_membership() {
	let fixture = Fixture::new();
	let index =
		MockIndex::start(vec![MockResponse::csv(&[("SRX1", 0.8531), ("SRX2", 0.9149), ("SRX9", 0.5)])])
			.await
			.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = service
		.parse_simple(json!({"signatures": [compact(&signature(21))]}))
		.expect("Expected valid query.");
	let records = run(&service, query).await.expect("Query failed.");

	assert_eq!(records.len(), 2);
	assert_eq!(records[0]["acc"], "SRX2");
	assert_eq!(records[0]["containment"], json!(0.91));
	assert_eq!(records[0]["cANI"], json!(round_score(0.9149_f64.powf(1.0 / 21.0))));
	assert_eq!(records[0]["lat_lon"], "NP");
	assert_eq!(records[0]["isMember"], false);
	assert_eq!(records[1]["acc"], "SRX1");
	assert_eq!(records[1]["containment"], json!(0.85));
	assert_eq!(records[1]["organism"], "human gut metagenome");
	assert_eq!(records[1]["isMember"], true);

	let keys = records[1].as_object().expect("Expected object.").len();

	assert_eq!(keys, 1 + bw_config::SIMPLE_FIELDS.len() + 3);
	assert_eq!(index.search_hits(), 1);
	assert_eq!(index.bodies()[0][0]["signatures"][0]["mins"], json!([11, 22, 33]));
}

#[tokio::test]
async fn advanced_query_projects_selected_fields_with_its_own_allow_list() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![MockResponse::csv(&[("SRX1", 0.4), ("SRX2", 0.3)])])
		.await
		.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = service
		.parse_advanced(json!({
			"signatures": [compact(&signature(21))],
			"metadata": {"instrument": true, "bioproject": true, "organism": false}
		}))
		.expect("Expected valid query.");
	let records = run(&service, query).await.expect("Query failed.");
	let srx1 = records.iter().find(|record| record["acc"] == "SRX1").expect("SRX1 missing.");
	let keys = srx1.as_object().expect("Expected object.").keys().cloned().collect::<Vec<_>>();

	assert!(keys.contains(&"bioproject".to_string()));
	assert!(keys.contains(&"instrument".to_string()));
	assert!(!keys.contains(&"organism".to_string()));
	assert_eq!(srx1["instrument"], "NP");
	assert_eq!(srx1["isMember"], false);

	let srx2 = records.iter().find(|record| record["acc"] == "SRX2").expect("SRX2 missing.");

	assert_eq!(srx2["isMember"], true);
}

#[tokio::test]
async fn multiple_signatures_are_all_searched() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![MockResponse::csv(&[("SRX1", 0.4)])])
		.await
		.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = service
		.parse_simple(json!({"signatures": [
			compact(&signature(21)),
			compact(&signature(31)),
			compact(&signature(21)),
			compact(&signature(21))
		]}))
		.expect("Expected valid query.");
	let records = run(&service, query).await.expect("Query failed.");

	assert_eq!(index.search_hits(), 3);
	assert_eq!(records.len(), 1);
	assert_eq!(records[0]["acc"], "SRX1");
}

#[tokio::test]
async fn mismatched_ksize_fails_before_searching() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![MockResponse::csv(&[("SRX1", 0.4)])])
		.await
		.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = service
		.parse_simple(json!({"signatures": [compact(&signature(31))]}))
		.expect("Expected valid query.");
	let err = run(&service, query).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::Format { .. }), "Unexpected error {err:?}.");
	assert_eq!(index.search_hits(), 0);
}

#[tokio::test]
async fn invalid_signature_content_is_a_format_error() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![]).await.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = service
		.parse_simple(json!({"signatures": [{"ksize": 21, "molecule": "DNA", "scaled": 1000, "hashes": []}]}))
		.expect("Expected valid query.");
	let err = run(&service, query).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::Format { .. }), "Unexpected error {err:?}.");
	assert_eq!(index.search_hits(), 0);
}

#[tokio::test]
async fn no_matches_yield_an_empty_result() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![MockResponse::csv(&[("SRX1", 0.05)])])
		.await
		.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = service
		.parse_simple(json!({"signatures": [compact(&signature(21))]}))
		.expect("Expected valid query.");

	assert!(run(&service, query).await.expect("Query failed.").is_empty());
}

#[tokio::test]
async fn accession_query_resolves_the_stored_signature() {
	let fixture = Fixture::new();

	bw_testkit::write_signature(&fixture.root(), "human-gut", "MGYG000000001.fna.sig", &signature(21))
		.expect("Failed to write signature.");

	let index = MockIndex::start(vec![MockResponse::csv(&[("SRX1", 0.7)])])
		.await
		.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = QueryRequest::Accession {
		catalogue: "human-gut".to_string(),
		accession: "MGYG000000001".to_string(),
	};
	let records = run(&service, query).await.expect("Query failed.");

	assert_eq!(records, vec![json!({
		"acc": "SRX1",
		"organism": "human gut metagenome",
		"containment": 0.7,
		"cANI": round_score(0.7_f64.powf(1.0 / 21.0)),
		"isMember": false
	})]);
}

#[tokio::test]
async fn accession_query_without_a_file_is_not_found() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![]).await.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());

	for catalogue in ["human-gut", "missing-catalogue"] {
		let query = QueryRequest::Accession {
			catalogue: catalogue.to_string(),
			accession: "MGYG404".to_string(),
		};
		let err = run(&service, query).await.expect_err("Expected failure.");

		assert!(matches!(err, Error::NotFound { .. }), "Unexpected error {err:?}.");
	}

	assert_eq!(index.search_hits(), 0);
}

#[tokio::test]
async fn malformed_signature_file_is_a_format_error() {
	let fixture = Fixture::new();
	let dir = fixture.root().join("human-gut");

	std::fs::create_dir_all(&dir).expect("Failed to create catalogue.");
	std::fs::write(dir.join("MGYG1.fna.sig"), b"not json").expect("Failed to write file.");

	let index = MockIndex::start(vec![]).await.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = QueryRequest::Accession {
		catalogue: "human-gut".to_string(),
		accession: "MGYG1".to_string(),
	};
	let err = run(&service, query).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::Format { .. }), "Unexpected error {err:?}.");
}

#[tokio::test]
async fn ambiguous_files_follow_the_configured_policy() {
	let fixture = Fixture::new();
	let mut first = signature(21);

	first.hashes = vec![1];

	bw_testkit::write_signature(&fixture.root(), "human-gut", "MGYG02.fna.sig", &signature(21))
		.expect("Failed to write signature.");
	bw_testkit::write_signature(&fixture.root(), "human-gut", "MGYG01.fna.sig", &first)
		.expect("Failed to write signature.");

	let index = MockIndex::start(vec![MockResponse::csv(&[])])
		.await
		.expect("Failed to start mock index.");
	let query = QueryRequest::Accession {
		catalogue: "human-gut".to_string(),
		accession: "MGYG0*".to_string(),
	};
	let lenient = fixture.service(&index.url());

	run(&lenient, query.clone()).await.expect("Query failed.");

	assert_eq!(index.bodies()[0][0]["signatures"][0]["mins"], json!([1]));

	let strict = fixture.service_with(&index.url(), "reject", 2);
	let err = run(&strict, query).await.expect_err("Expected failure.");

	match err {
		Error::Validation { message, fields } => {
			assert_eq!(fields, vec!["accession".to_string()]);
			assert!(message.contains("MGYG01.fna.sig"));
			assert!(message.contains("MGYG02.fna.sig"));
		},
		other => panic!("Unexpected error {other:?}."),
	}
}

#[tokio::test]
async fn path_traversal_is_rejected() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![]).await.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = QueryRequest::Accession {
		catalogue: "..".to_string(),
		accession: "metadata".to_string(),
	};
	let err = run(&service, query).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::Validation { .. }), "Unexpected error {err:?}.");
}

#[tokio::test]
async fn upstream_failures_keep_status_and_body() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![MockResponse::status(500, "index exploded")])
		.await
		.expect("Failed to start mock index.");
	let service = fixture.service_with(&index.url(), "first_match", 0);
	let query = service
		.parse_simple(json!({"signatures": [compact(&signature(21))]}))
		.expect("Expected valid query.");
	let err = run(&service, query).await.expect_err("Expected failure.");

	match err {
		Error::Search { upstream_status, upstream_body, .. } => {
			assert_eq!(upstream_status, Some(500));
			assert_eq!(upstream_body.as_deref(), Some("index exploded"));
		},
		other => panic!("Unexpected error {other:?}."),
	}

	assert_eq!(index.search_hits(), 1);
}

#[tokio::test]
async fn unreadable_metadata_store_is_a_store_error() {
	let fixture = Fixture::new();

	std::fs::remove_file(fixture.dir.path().join("metadata.duckdb"))
		.expect("Failed to remove metadata store.");

	let index = MockIndex::start(vec![MockResponse::csv(&[("SRX1", 0.8)])])
		.await
		.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = service
		.parse_simple(json!({"signatures": [compact(&signature(21))]}))
		.expect("Expected valid query.");
	let err = run(&service, query).await.expect_err("Expected failure.");

	assert!(matches!(err, Error::Store { .. }), "Unexpected error {err:?}.");
	assert_eq!(index.search_hits(), 1);
}

#[tokio::test]
async fn cancellation_stops_in_flight_searches() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![
		MockResponse::csv(&[("SRX1", 0.4)]).with_delay(Duration::from_millis(1_500)),
	])
	.await
	.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = service
		.parse_simple(json!({"signatures": [compact(&signature(21))]}))
		.expect("Expected valid query.");
	let cancel = CancellationToken::new();
	let trigger = cancel.clone();

	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_millis(50)).await;
		trigger.cancel();
	});

	let err = service.run(query, cancel).await.expect_err("Expected cancellation.");

	assert!(matches!(err, Error::Cancelled), "Unexpected error {err:?}.");
}

#[tokio::test]
async fn cancelled_requests_never_search() {
	let fixture = Fixture::new();
	let index = MockIndex::start(vec![MockResponse::csv(&[("SRX1", 0.4)])])
		.await
		.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());
	let query = service
		.parse_simple(json!({"signatures": [compact(&signature(21))]}))
		.expect("Expected valid query.");
	let cancel = CancellationToken::new();

	cancel.cancel();

	let err = service.run(query, cancel).await.expect_err("Expected cancellation.");

	assert!(matches!(err, Error::Cancelled), "Unexpected error {err:?}.");
	assert_eq!(index.search_hits(), 0);
}

#[tokio::test]
async fn stats_and_health_report_backing_services() {
	let fixture = Fixture::new();
	let index = MockIndex::start_with_health(vec![], MockResponse::status(503, "warming up"))
		.await
		.expect("Failed to start mock index.");
	let service = fixture.service(&index.url());

	assert_eq!(service.stats().await.expect("Stats failed.").n_datasets, 2);

	match service.health().await {
		Err(Error::Search { upstream_status, .. }) => assert_eq!(upstream_status, Some(503)),
		other => panic!("Unexpected health result {other:?}."),
	}
}
