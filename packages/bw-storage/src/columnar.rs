use std::path::{Path, PathBuf};

use duckdb::{
	AccessMode, Config, Connection, params, params_from_iter,
	types::{TimeUnit, Value as DuckValue},
};
use serde_json::{Map, Number, Value};
use time::{
	Duration, OffsetDateTime, Time,
	format_description::{FormatItem, well_known::Rfc3339},
	macros::format_description,
};
use tokio::task;

use bw_domain::{MetadataRecord, NullPolicy};

use crate::{Backend, BoxFuture, MetadataSession, MetadataStore, Result, dedupe_first};

const TIME_OF_DAY: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
const NANOS_PER_DAY: i128 = 86_400 * 1_000_000_000;

/// Metadata held in a DuckDB file, one row per accession.
#[derive(Debug, Clone)]
pub struct ColumnarStore {
	path: PathBuf,
	table: String,
	accession_column: String,
	null_policy: NullPolicy,
}
impl ColumnarStore {
	pub fn new(cfg: &bw_config::Columnar) -> Self {
		Self {
			path: cfg.path.clone(),
			table: cfg.table.clone(),
			accession_column: cfg.accession_column.clone(),
			null_policy: NullPolicy::from_fill_missing(cfg.fill_missing),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Number of rows in the metadata table.
	pub async fn count(&self) -> Result<u64> {
		let path = self.path.clone();
		let sql = format!("SELECT count(*) FROM {}", quote_ident(&self.table));
		let count = task::spawn_blocking(move || -> Result<i64> {
			let conn = open_read_only(&path)?;
			let count = conn.query_row(&sql, params![], |row| row.get(0))?;

			Ok(count)
		})
		.await??;

		Ok(count.max(0) as u64)
	}
}

impl MetadataStore for ColumnarStore {
	fn backend(&self) -> Backend {
		Backend::Columnar
	}

	fn null_policy(&self) -> NullPolicy {
		self.null_policy
	}

	fn session(&self) -> Box<dyn MetadataSession + '_> {
		Box::new(ColumnarSession { store: self, conn: None })
	}
}

/// Holds at most one read-only connection, opened on the first non-empty lookup.
pub struct ColumnarSession<'a> {
	store: &'a ColumnarStore,
	conn: Option<Connection>,
}

impl MetadataSession for ColumnarSession<'_> {
	fn lookup<'a>(
		&'a mut self,
		accessions: &'a [String],
		fields: &'a [String],
	) -> BoxFuture<'a, Result<Vec<MetadataRecord>>> {
		Box::pin(async move {
			if accessions.is_empty() {
				return Ok(Vec::new());
			}

			let sql = select_sql(
				&self.store.table,
				&self.store.accession_column,
				fields,
				accessions.len(),
			);
			let path = self.store.path.clone();
			let conn = self.conn.take();
			let accessions = accessions.to_vec();
			let fields = fields.to_vec();
			let (conn, records) = task::spawn_blocking(move || -> Result<_> {
				let conn = match conn {
					Some(conn) => conn,
					None => {
						tracing::debug!(path = %path.display(), "Opening columnar metadata store.");

						open_read_only(&path)?
					},
				};
				let records = query_records(&conn, &sql, &accessions, &fields)?;

				Ok((conn, records))
			})
			.await??;

			self.conn = Some(conn);

			Ok(dedupe_first(records))
		})
	}
}

impl Drop for ColumnarSession<'_> {
	fn drop(&mut self) {
		if self.conn.take().is_some() {
			tracing::debug!(path = %self.store.path.display(), "Closed columnar metadata store.");
		}
	}
}

fn open_read_only(path: &Path) -> Result<Connection> {
	let config = Config::default().access_mode(AccessMode::ReadOnly)?;

	Ok(Connection::open_with_flags(path, config)?)
}

fn query_records(
	conn: &Connection,
	sql: &str,
	accessions: &[String],
	fields: &[String],
) -> Result<Vec<MetadataRecord>> {
	let mut stmt = conn.prepare(sql)?;
	let mut rows = stmt.query(params_from_iter(accessions.iter()))?;
	let mut out = Vec::new();

	while let Some(row) = rows.next()? {
		let accession: String = row.get(0)?;
		let mut values = Vec::with_capacity(fields.len());

		for (idx, field) in fields.iter().enumerate() {
			let value: DuckValue = row.get(idx + 1)?;

			values.push((field.clone(), to_json(value)));
		}

		out.push(MetadataRecord { accession, fields: values });
	}

	Ok(out)
}

fn select_sql(table: &str, accession_column: &str, fields: &[String], params: usize) -> String {
	let columns = std::iter::once(accession_column)
		.chain(fields.iter().map(String::as_str))
		.map(quote_ident)
		.collect::<Vec<_>>()
		.join(", ");
	let placeholders = vec!["?"; params].join(", ");

	format!(
		"SELECT {columns} FROM {} WHERE {} IN ({placeholders})",
		quote_ident(table),
		quote_ident(accession_column),
	)
}

fn quote_ident(name: &str) -> String {
	format!("\"{}\"", name.replace('"', "\"\""))
}

fn to_json(value: DuckValue) -> Value {
	match value {
		DuckValue::Null => Value::Null,
		DuckValue::Boolean(v) => Value::Bool(v),
		DuckValue::TinyInt(v) => Value::from(v),
		DuckValue::SmallInt(v) => Value::from(v),
		DuckValue::Int(v) => Value::from(v),
		DuckValue::BigInt(v) => Value::from(v),
		DuckValue::HugeInt(v) =>
			i64::try_from(v).map(Value::from).unwrap_or_else(|_| Value::String(v.to_string())),
		DuckValue::UTinyInt(v) => Value::from(v),
		DuckValue::USmallInt(v) => Value::from(v),
		DuckValue::UInt(v) => Value::from(v),
		DuckValue::UBigInt(v) => Value::from(v),
		DuckValue::Float(v) => float_to_json(f64::from(v)),
		DuckValue::Double(v) => float_to_json(v),
		DuckValue::Decimal(v) => decimal_to_json(&v.to_string()),
		DuckValue::Text(v) | DuckValue::Enum(v) => Value::String(v),
		DuckValue::Blob(bytes) => Value::String(hex::encode(bytes)),
		DuckValue::Date32(days) => date_to_json(days),
		DuckValue::Time64(unit, v) => time_to_json(unit, v),
		DuckValue::Timestamp(unit, v) => timestamp_to_json(unit, v),
		DuckValue::Interval { months, days, nanos } =>
			serde_json::json!({ "months": months, "days": days, "nanos": nanos }),
		DuckValue::List(items) | DuckValue::Array(items) =>
			Value::Array(items.into_iter().map(to_json).collect()),
		DuckValue::Struct(fields) => Value::Object(
			fields.iter().map(|(key, value)| (key.clone(), to_json(value.clone()))).collect(),
		),
		DuckValue::Map(entries) => Value::Object(
			entries
				.iter()
				.map(|(key, value)| (map_key(key.clone()), to_json(value.clone())))
				.collect::<Map<_, _>>(),
		),
		DuckValue::Union(inner) => to_json(*inner),
		other => {
			tracing::warn!(value = ?other, "Unsupported columnar value type. Emitting null.");

			Value::Null
		},
	}
}

fn decimal_to_json(text: &str) -> Value {
	text.parse::<f64>()
		.ok()
		.and_then(Number::from_f64)
		.map(Value::Number)
		.unwrap_or_else(|| Value::String(text.to_string()))
}

fn map_key(key: DuckValue) -> String {
	match to_json(key) {
		Value::String(key) => key,
		other => other.to_string(),
	}
}

fn unit_to_nanos(unit: TimeUnit, value: i64) -> i128 {
	match unit {
		TimeUnit::Second => i128::from(value) * 1_000_000_000,
		TimeUnit::Millisecond => i128::from(value) * 1_000_000,
		TimeUnit::Microsecond => i128::from(value) * 1_000,
		TimeUnit::Nanosecond => i128::from(value),
	}
}

fn float_to_json(value: f64) -> Value {
	Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}

fn date_to_json(days: i32) -> Value {
	let date = OffsetDateTime::UNIX_EPOCH.checked_add(Duration::days(i64::from(days)));

	date.map(|date| Value::String(date.date().to_string())).unwrap_or(Value::Null)
}

fn time_to_json(unit: TimeUnit, value: i64) -> Value {
	let nanos = unit_to_nanos(unit, value).rem_euclid(NANOS_PER_DAY);
	let time = Time::MIDNIGHT + Duration::nanoseconds(nanos as i64);

	time.format(TIME_OF_DAY).map(Value::String).unwrap_or(Value::Null)
}

fn timestamp_to_json(unit: TimeUnit, value: i64) -> Value {
	OffsetDateTime::from_unix_timestamp_nanos(unit_to_nanos(unit, value))
		.ok()
		.and_then(|ts| ts.format(&Rfc3339).ok())
		.map(Value::String)
		.unwrap_or(Value::Null)
}
