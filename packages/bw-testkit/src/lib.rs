mod error;

pub use error::{Error, Result};

use std::{
	collections::VecDeque,
	env, fs,
	net::SocketAddr,
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use axum::{
	Router,
	body::Bytes,
	extract::State,
	http::{StatusCode, header},
	response::{IntoResponse, Response},
	routing::{get, post},
};
use duckdb::Connection;
use serde_json::Value;
use tokio::{net::TcpListener, task::JoinHandle, time};

use bw_domain::SketchSignature;

/// A canned reply of the mock containment index.
#[derive(Debug, Clone)]
pub struct MockResponse {
	status: u16,
	content_type: &'static str,
	body: String,
	delay: Option<Duration>,
}
impl MockResponse {
	/// A CSV body in the index's `SRA accession,containment` layout.
	pub fn csv(rows: &[(&str, f64)]) -> Self {
		let mut body = String::from("SRA accession,containment\n");

		for (accession, containment) in rows {
			body.push_str(&format!("{accession},{containment}\n"));
		}

		Self { status: 200, content_type: "text/plain; charset=utf-8", body, delay: None }
	}

	pub fn json(value: Value) -> Self {
		Self { status: 200, content_type: "application/json", body: value.to_string(), delay: None }
	}

	pub fn status(status: u16, body: &str) -> Self {
		Self {
			status,
			content_type: "text/plain; charset=utf-8",
			body: body.to_string(),
			delay: None,
		}
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = Some(delay);

		self
	}

	async fn render(self) -> Response {
		if let Some(delay) = self.delay {
			time::sleep(delay).await;
		}

		let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

		(status, [(header::CONTENT_TYPE, self.content_type)], self.body).into_response()
	}
}

struct MockState {
	queue: Mutex<VecDeque<MockResponse>>,
	last: Mutex<Option<MockResponse>>,
	health: MockResponse,
	hits: AtomicUsize,
	bodies: Mutex<Vec<Value>>,
}

/// An in-process stand-in for the remote containment index.
///
/// `/search` replies with the queued responses in order and repeats the last one once the queue
/// is drained. The server task is aborted on drop.
pub struct MockIndex {
	addr: SocketAddr,
	state: Arc<MockState>,
	task: JoinHandle<()>,
}
impl MockIndex {
	pub async fn start(responses: Vec<MockResponse>) -> Result<Self> {
		Self::start_with_health(responses, MockResponse::status(200, "ok")).await
	}

	pub async fn start_with_health(
		responses: Vec<MockResponse>,
		health: MockResponse,
	) -> Result<Self> {
		let state = Arc::new(MockState {
			queue: Mutex::new(responses.into()),
			last: Mutex::new(None),
			health,
			hits: AtomicUsize::new(0),
			bodies: Mutex::new(Vec::new()),
		});
		let app = Router::new()
			.route("/search", post(mock_search))
			.route("/health", get(mock_health))
			.with_state(state.clone());
		let listener = TcpListener::bind("127.0.0.1:0").await?;
		let addr = listener.local_addr()?;
		let task = tokio::spawn(async move {
			if let Err(err) = axum::serve(listener, app).await {
				eprintln!("Mock index server stopped: {err}.");
			}
		});

		Ok(Self { addr, state, task })
	}

	pub fn url(&self) -> String {
		format!("http://{}", self.addr)
	}

	pub fn search_hits(&self) -> usize {
		self.state.hits.load(Ordering::SeqCst)
	}

	/// Request bodies received on `/search`, in arrival order.
	pub fn bodies(&self) -> Vec<Value> {
		self.state.bodies.lock().unwrap_or_else(|err| err.into_inner()).clone()
	}
}
impl Drop for MockIndex {
	fn drop(&mut self) {
		self.task.abort();
	}
}

async fn mock_search(State(state): State<Arc<MockState>>, body: Bytes) -> Response {
	state.hits.fetch_add(1, Ordering::SeqCst);

	if let Ok(value) = serde_json::from_slice::<Value>(&body) {
		state.bodies.lock().unwrap_or_else(|err| err.into_inner()).push(value);
	}

	let next = state.queue.lock().unwrap_or_else(|err| err.into_inner()).pop_front();
	let response = {
		let mut last = state.last.lock().unwrap_or_else(|err| err.into_inner());

		match next {
			Some(response) => {
				*last = Some(response.clone());

				response
			},
			None => last.clone().unwrap_or_else(|| MockResponse::csv(&[])),
		}
	};

	response.render().await
}

async fn mock_health(State(state): State<Arc<MockState>>) -> Response {
	state.health.clone().render().await
}

pub fn env_mongo_uri() -> Option<String> {
	env::var("BW_MONGO_URI").ok()
}

/// Creates a DuckDB file at `path` and runs `statements` against it.
pub fn write_duckdb(path: &Path, statements: &str) -> Result<()> {
	let conn = Connection::open(path)?;

	conn.execute_batch(statements)?;

	Ok(())
}

/// Writes `signature` as a sourmash file under `root/catalogue/file_name`.
pub fn write_signature(
	root: &Path,
	catalogue: &str,
	file_name: &str,
	signature: &SketchSignature,
) -> Result<PathBuf> {
	let dir = root.join(catalogue);

	fs::create_dir_all(&dir)?;

	let path = dir.join(file_name);

	fs::write(&path, serde_json::to_vec(&signature.to_sourmash())?)?;

	Ok(path)
}
