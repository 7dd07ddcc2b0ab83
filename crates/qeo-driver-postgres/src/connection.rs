//! PostgreSQL connection implementation

use async_trait::async_trait;
use bytes::BytesMut;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use qeo_core::{Connection, QeoError, QueryResult, Result, Row, StatementResult, Value};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::{FromSql, ToSql, Type};
use tokio_postgres::{Client, Config, NoTls, Row as PgRow};

pub(crate) fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let mut message = db_error.message().to_string();
    if let Some(detail) = db_error.detail()
        && !detail.trim().is_empty()
    {
        message.push_str(&format!(" (detail: {})", detail));
    }
    if let Some(hint) = db_error.hint()
        && !hint.trim().is_empty()
    {
        message.push_str(&format!(" (hint: {})", hint));
    }

    match db_error.code().code() {
        "57014" => format!("statement timeout or cancellation: {}", message),
        "42704" | "42883" => format!("undefined object: {}", message),
        "42601" => format!("syntax error: {}", message),
        code => format!("{} (code: {})", message, code),
    }
}

/// Build the TLS connector for an sslmode other than `disable`.
///
/// `prefer` and `require` encrypt without verifying the server certificate,
/// matching libpq semantics for those modes.
pub(crate) fn build_tls_connector(ssl_mode: SslMode) -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();
    let lenient = matches!(ssl_mode, SslMode::Prefer | SslMode::Require);
    builder.danger_accept_invalid_certs(lenient);
    builder.danger_accept_invalid_hostnames(lenient);
    let connector = builder
        .build()
        .map_err(|e| QeoError::Connection(format!("Failed to build TLS connector: {}", e)))?;
    Ok(MakeTlsConnector::new(connector))
}

/// A single PostgreSQL session
pub struct PostgresConnection {
    client: Arc<Mutex<Client>>,
    pending: PendingStatements,
}

/// Statements queued for the next call on a session, in submission order
#[derive(Debug, Default)]
pub(crate) struct PendingStatements(parking_lot::Mutex<Vec<String>>);

impl PendingStatements {
    pub(crate) fn push(&self, sql: &str) {
        self.0.lock().push(sql.to_string());
    }

    pub(crate) fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock())
    }
}

impl PostgresConnection {
    /// Connect using a libpq-style URL or key/value connection string
    pub async fn connect(url: &str) -> Result<Self> {
        let config = Config::from_str(url)
            .map_err(|e| QeoError::Configuration(format!("Invalid database URL: {}", e)))?;
        let ssl_mode = config.get_ssl_mode();

        tracing::info!(
            dbname = config.get_dbname().unwrap_or_default(),
            ssl_mode = ?ssl_mode,
            "connecting to PostgreSQL database"
        );

        let client = if ssl_mode == SslMode::Disable {
            let (client, connection) = config
                .connect(NoTls)
                .await
                .map_err(|e| QeoError::Connection(format!("Failed to connect to PostgreSQL: {}", e)))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        } else {
            let tls = build_tls_connector(ssl_mode)?;
            let (client, connection) = config
                .connect(tls)
                .await
                .map_err(|e| QeoError::Connection(format!("Failed to connect to PostgreSQL: {}", e)))?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    tracing::error!(error = %e, "PostgreSQL connection error");
                }
            });
            client
        };

        tracing::info!("PostgreSQL connection established");
        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            pending: PendingStatements::default(),
        })
    }

    /// Run deferred statements while the caller holds the client lock.
    /// A failing statement is logged and does not fail the caller's call.
    async fn drain_pending(&self, client: &Client) {
        for sql in self.pending.take() {
            tracing::debug!(sql = %sql, "running deferred statement");
            if let Err(e) = client.batch_execute(&sql).await {
                tracing::warn!(sql = %sql, error = %format_postgres_error(&e), "deferred statement failed");
            }
        }
    }
}

/// Owned parameter values handed to tokio-postgres
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Json(serde_json::Value),
    TextArray(Vec<String>),
}

impl PgValue {
    /// Convert a value so it matches the prepared parameter type. Integers
    /// are narrowed or widened to the column width tokio-postgres expects.
    pub(crate) fn from_value_for_type(value: &Value, target_type: &Type) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int32(v) => Self::coerce_int(*v as i64, target_type),
            Value::Int64(v) => Self::coerce_int(*v, target_type),
            Value::Float32(v) => match *target_type {
                Type::FLOAT8 => PgValue::Float64(*v as f64),
                _ => PgValue::Float32(*v),
            },
            Value::Float64(v) => match *target_type {
                Type::FLOAT4 => PgValue::Float32(*v as f32),
                _ => PgValue::Float64(*v),
            },
            Value::String(v) => match *target_type {
                Type::JSON | Type::JSONB => serde_json::from_str(v)
                    .map(PgValue::Json)
                    .unwrap_or_else(|_| PgValue::String(v.clone())),
                _ => PgValue::String(v.clone()),
            },
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::Decimal(v) => PgValue::String(v.clone()),
            Value::Array(_) => Self::from_value(value),
        }
    }

    /// Fallback used when the statement reports no parameter type
    pub(crate) fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => PgValue::Int16(*v),
            Value::Int32(v) => PgValue::Int32(*v),
            Value::Int64(v) => PgValue::Int64(*v),
            Value::Float32(v) => PgValue::Float32(*v),
            Value::Float64(v) => PgValue::Float64(*v),
            Value::Decimal(v) | Value::String(v) => PgValue::String(v.clone()),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::Array(items) => {
                PgValue::TextArray(items.iter().map(|item| item.to_string()).collect())
            }
        }
    }

    fn coerce_int(value: i64, target_type: &Type) -> Self {
        match *target_type {
            Type::INT2 => PgValue::Int16(value as i16),
            Type::INT4 => PgValue::Int32(value as i32),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            _ => PgValue::Int64(value),
        }
    }
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<postgres_types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(postgres_types::IsNull::Yes),
            PgValue::Bool(v) => v.to_sql(ty, out),
            PgValue::Int16(v) => v.to_sql(ty, out),
            PgValue::Int32(v) => v.to_sql(ty, out),
            PgValue::Int64(v) => v.to_sql(ty, out),
            PgValue::Float32(v) => v.to_sql(ty, out),
            PgValue::Float64(v) => v.to_sql(ty, out),
            PgValue::String(v) => v.to_sql(ty, out),
            PgValue::Json(v) => v.to_sql(ty, out),
            PgValue::TextArray(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// NUMERIC decoded to its canonical text form
#[derive(Debug)]
pub(crate) struct PgNumericString(pub(crate) String);

impl PgNumericString {
    pub(crate) fn parse(
        raw: &[u8],
    ) -> std::result::Result<String, Box<dyn std::error::Error + Sync + Send>> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }
        let ndigits = i16::from_be_bytes([raw[0], raw[1]]).max(0) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]) as i32;
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]).max(0) as usize;
        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }
        if sign == 0xC000 {
            return Ok("NaN".to_string());
        }

        let digits: Vec<u16> = raw[8..8 + ndigits * 2]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        let group = |i: i32| -> u16 {
            usize::try_from(i)
                .ok()
                .and_then(|i| digits.get(i).copied())
                .unwrap_or(0)
        };

        let mut integer = String::new();
        for i in 0..=weight.max(-1) {
            if integer.is_empty() {
                integer.push_str(&group(i).to_string());
            } else {
                integer.push_str(&format!("{:04}", group(i)));
            }
        }
        if integer.is_empty() {
            integer.push('0');
        }

        let mut fraction = String::new();
        let mut i = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", group(i)));
            i += 1;
        }
        fraction.truncate(dscale);
        let fraction = fraction.trim_end_matches('0');

        let mut output = String::new();
        if sign == 0x4000 && (integer != "0" || !fraction.is_empty()) {
            output.push('-');
        }
        output.push_str(&integer);
        if !fraction.is_empty() {
            output.push('.');
            output.push_str(fraction);
        }
        Ok(output)
    }
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

/// Raw UTF-8 payload for types without a dedicated decoder (enums, domains)
#[derive(Debug)]
struct PgFallbackString(String);

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(
        _: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn bind_params(params: &[Value], param_types: &[Type]) -> Vec<PgValue> {
    params
        .iter()
        .enumerate()
        .map(|(i, value)| match param_types.get(i) {
            Some(target_type) => PgValue::from_value_for_type(value, target_type),
            None => PgValue::from_value(value),
        })
        .collect()
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let client = self.client.lock().await;
        self.drain_pending(&client).await;

        let rows_affected = if params.is_empty() {
            // Utility statements (SET, EXPLAIN wrappers) cannot always be prepared
            client
                .batch_execute(sql)
                .await
                .map(|_| 0)
                .map_err(|e| QeoError::Query(format_postgres_error(&e)))?
        } else {
            let statement = client.prepare(sql).await.map_err(|e| {
                QeoError::Query(format!("Failed to prepare statement: {}", format_postgres_error(&e)))
            })?;
            let pg_params = bind_params(params, statement.params());
            let param_refs: Vec<&(dyn ToSql + Sync)> =
                pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
            client
                .execute(&statement, &param_refs)
                .await
                .map_err(|e| QeoError::Query(format_postgres_error(&e)))?
        };

        tracing::debug!(affected_rows = rows_affected, "statement executed");
        Ok(StatementResult {
            affected_rows: rows_affected,
        })
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = std::time::Instant::now();
        let client = self.client.lock().await;
        self.drain_pending(&client).await;

        let statement = client.prepare(sql).await.map_err(|e| {
            QeoError::Query(format!("Failed to prepare query: {}", format_postgres_error(&e)))
        })?;
        let pg_params = bind_params(params, statement.params());
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            pg_params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        let pg_rows = client
            .query(&statement, &param_refs)
            .await
            .map_err(|e| QeoError::Query(format_postgres_error(&e)))?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect();
        let rows = pg_rows
            .iter()
            .map(|pg_row| {
                let values = (0..columns.len())
                    .map(|idx| postgres_to_value(pg_row, idx))
                    .collect();
                Row::new(columns.clone(), values)
            })
            .collect::<Vec<_>>();

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );
        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms,
        })
    }

    fn defer_statement(&self, sql: &str) -> bool {
        self.pending.push(sql);
        true
    }

    async fn close(&self) -> Result<()> {
        tracing::info!("closing PostgreSQL connection");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.client
            .try_lock()
            .map(|client| client.is_closed())
            .unwrap_or(false)
    }
}

fn get<'a, T: FromSql<'a>>(row: &'a PgRow, idx: usize) -> Option<T> {
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}

fn postgres_to_value(row: &PgRow, idx: usize) -> Value {
    let type_name = row.columns()[idx].type_().name();

    let value = match type_name {
        "bool" => get::<bool>(row, idx).map(Value::Bool),
        "int2" => get::<i16>(row, idx).map(Value::Int16),
        "int4" => get::<i32>(row, idx).map(Value::Int32),
        "int8" => get::<i64>(row, idx).map(Value::Int64),
        "oid" => get::<u32>(row, idx).map(|v| Value::Int64(v as i64)),
        "float4" => get::<f32>(row, idx).map(Value::Float32),
        "float8" => get::<f64>(row, idx).map(Value::Float64),
        "numeric" => get::<PgNumericString>(row, idx).map(|v| Value::Decimal(v.0)),
        "text" | "varchar" | "bpchar" | "name" => get::<String>(row, idx).map(Value::String),
        "json" | "jsonb" => get::<serde_json::Value>(row, idx).map(Value::Json),
        "_text" | "_varchar" | "_bpchar" | "_name" => get::<Vec<String>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::String).collect())),
        "_int2" => get::<Vec<i16>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::Int16).collect())),
        "_int4" => get::<Vec<i32>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::Int32).collect())),
        "_int8" => get::<Vec<i64>>(row, idx)
            .map(|arr| Value::Array(arr.into_iter().map(Value::Int64).collect())),
        _ => get::<PgFallbackString>(row, idx).map(|v| Value::String(v.0)),
    };

    value.unwrap_or(Value::Null)
}
