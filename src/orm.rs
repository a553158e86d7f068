//! Minimal async ORM over sqlite + sqlx
//!
//! Usage:
//! let db = Db::connect("sqlite::memory:").await?;
//! let mut session = db.session().await?;
//! let people = Person::query().filter_eq("name", "qq").all(session.conn()).await?;
//! session.commit().await?;
pub use futures::future::BoxFuture;
use crate::error::{Error, Result};
use crate::settings::DatabaseSettings;
use log::{debug, info, LevelFilter};
use sha2::{Digest, Sha256};
pub use sqlx::FromRow;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions, SqliteRow};
use sqlx::{ConnectOptions, Executor, QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use std::marker::PhantomData;
use std::str::FromStr;
use std::sync::Arc;

const MIGRATIONS_TABLE: &str = "__templates_migrations";

/// An async database pool wrapper.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

pub struct Migration(pub MigrationFn);

impl std::ops::Deref for Migration {
    type Target = MigrationFn;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Migration function pointer for a model.
/// Each model registers a `fn(Arc<Db>) -> BoxFuture<'static, Result<()>>` with `inventory::submit!`.
pub type MigrationFn = fn(Arc<Db>) -> BoxFuture<'static, Result<()>>;

#[async_trait::async_trait]
pub trait Model: Send + Sync {
    fn table_name() -> &'static str;
    fn create_table_sql() -> String;
    fn columns() -> Vec<(String, String)>;

    async fn migrate(db: Arc<Db>) -> Result<()> {
        let table_name = Self::table_name();
        let create_sql = Self::create_table_sql();
        let schema_hash = hash(&create_sql);

        db.execute(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                table_name TEXT UNIQUE NOT NULL,
                schema_sql TEXT NOT NULL,
                hash TEXT NOT NULL,
                applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            MIGRATIONS_TABLE
        ))
        .await?;

        let recorded: Option<String> = sqlx::query_scalar(&format!(
            "SELECT hash FROM {} WHERE table_name = ?",
            MIGRATIONS_TABLE
        ))
        .bind(table_name)
        .fetch_optional(db.pool())
        .await?;

        let Some(recorded) = recorded else {
            db.execute(&create_sql).await?;
            sqlx::query(&format!(
                "INSERT INTO {} (table_name, schema_sql, hash) VALUES (?, ?, ?)",
                MIGRATIONS_TABLE
            ))
            .bind(table_name)
            .bind(&create_sql)
            .bind(&schema_hash)
            .execute(db.pool())
            .await?;
            info!(
                "Migrated `{}` (table created, initial schema applied).",
                table_name
            );
            return Ok(());
        };

        if recorded == schema_hash {
            info!("No schema changes detected for `{}`.", table_name);
            return Ok(());
        }

        let existing: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", table_name))
            .fetch_all(db.pool())
            .await?
            .into_iter()
            .map(|row: SqliteRow| row.get::<String, _>("name"))
            .collect();

        let mut added = Vec::new();
        for (name, sqltype) in Self::columns() {
            if !existing.contains(&name) {
                db.execute(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {}",
                    table_name, name, sqltype
                ))
                .await?;
                added.push((name, sqltype));
            }
        }

        if added.is_empty() {
            info!("Schema text changed for `{}` but no columns were added.", table_name);
        } else {
            info!(
                "Schema changes detected for `{}`, the following columns were added:",
                table_name
            );
            for (name, sqltype) in &added {
                info!("  - {} {}", name, sqltype);
            }
        }

        sqlx::query(&format!(
            "UPDATE {} SET schema_sql = ?, hash = ?, applied_at = CURRENT_TIMESTAMP \
             WHERE table_name = ?",
            MIGRATIONS_TABLE
        ))
        .bind(&create_sql)
        .bind(&schema_hash)
        .bind(table_name)
        .execute(db.pool())
        .await?;
        Ok(())
    }
}

// Helper function to hash a SQL string
fn hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_in_memory(uri: &str) -> bool {
    uri.contains(":memory:") || uri.contains("mode=memory")
}

impl Db {
    /// Connect (or create) a SQLite database at the given URI.
    pub async fn connect(uri: &str) -> Result<Self> {
        Self::connect_with_echo(uri, false).await
    }

    /// Connect using the database section of the settings.
    pub async fn open(settings: &DatabaseSettings) -> Result<Self> {
        Self::connect_with_echo(&settings.url, settings.echo).await
    }

    /// Connect, logging every statement at `info` when `echo` is set.
    pub async fn connect_with_echo(uri: &str, echo: bool) -> Result<Self> {
        info!("Connecting to SQLite database at URI: {}", uri);
        let options = SqliteConnectOptions::from_str(uri)?
            .create_if_missing(true)
            .log_statements(if echo {
                LevelFilter::Info
            } else {
                LevelFilter::Debug
            });

        // An in-memory database lives exactly as long as its connection.
        let pool_options = if is_in_memory(uri) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_options.connect_with(options).await?;
        info!("Connected to SQLite database: {}", uri);
        Ok(Db { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a unit of work. Dropping the session without `commit` rolls it back.
    pub async fn session(&self) -> Result<Session> {
        let tx = self.pool.begin().await?;
        debug!("Session opened");
        Ok(Session { tx })
    }

    /// Execute an arbitrary SQL statement, e.g. DDL, INSERT, UPDATE.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        debug!("Executing SQL: {}", sql);
        let result = self.pool.execute(sql).await;
        match &result {
            Ok(_) => debug!("SQL executed successfully"),
            Err(e) => log::error!("SQL execution failed: {}", e),
        }
        result.map(|_| ()).map_err(Error::from)
    }

    /// Fetch all rows and map to a type implementing `FromRow`.
    pub async fn fetch_all<T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin>(
        &self,
        sql: &str,
    ) -> Result<Vec<T>> {
        debug!("Fetching rows with SQL: {}", sql);
        let result = sqlx::query_as(sql).fetch_all(&self.pool).await;
        match &result {
            Ok(rows) => debug!("Fetched {} rows successfully", rows.len()),
            Err(e) => log::error!("Row fetch failed: {}", e),
        }
        result.map_err(Error::from)
    }
}

/// A transaction-scoped unit of work.
pub struct Session {
    tx: Transaction<'static, Sqlite>,
}

impl Session {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        debug!("Session committed");
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        debug!("Session rolled back");
        Ok(())
    }
}

/// Migrate all registered models using the inventory pattern.
pub async fn auto_migrate(db: Arc<Db>) -> Result<()> {
    info!("Starting auto migration of all registered models...");
    let mut total = 0;
    for m in inventory::iter::<Migration> {
        total += 1;
        if let Err(e) = m(db.clone()).await {
            log::error!("Auto-migration failed for a model: {}", e);
            return Err(e);
        }
    }
    info!("Auto migration completed for {} models.", total);
    Ok(())
}

/// A value bound into a generated query.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Null => {
            qb.push("NULL");
        }
        Value::Bool(v) => {
            qb.push_bind(*v);
        }
        Value::Int(v) => {
            qb.push_bind(*v);
        }
        Value::Real(v) => {
            qb.push_bind(*v);
        }
        Value::Text(v) => {
            qb.push_bind(v.clone());
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn keyword(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug)]
enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
}

/// A deferred query against one model's table.
///
/// Building never touches the database; SQL is generated and column names are
/// validated only when one of the executing methods runs, so a partially built
/// query can be cloned and extended.
pub struct Query<M> {
    filters: Vec<Filter>,
    order: Vec<(String, Order)>,
    limit: Option<i64>,
    model: PhantomData<fn() -> M>,
}

impl<M> Clone for Query<M> {
    fn clone(&self) -> Self {
        Query {
            filters: self.filters.clone(),
            order: self.order.clone(),
            limit: self.limit,
            model: PhantomData,
        }
    }
}

impl<M> Default for Query<M> {
    fn default() -> Self {
        Query {
            filters: Vec::new(),
            order: Vec::new(),
            limit: None,
            model: PhantomData,
        }
    }
}

impl<M> Query<M>
where
    M: Model + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// `column = value`; a `Value::Null` becomes `column IS NULL`.
    pub fn filter_eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::Eq(column.to_string(), value.into()));
        self
    }

    pub fn filter_in<V: Into<Value>>(
        mut self,
        column: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.filters.push(Filter::In(column.to_string(), values));
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        self.order.push((column.to_string(), order));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// First row in query order, or `None` when nothing matches.
    pub async fn first(&self, conn: &mut SqliteConnection) -> Result<Option<M>> {
        let mut qb = self.select("*", None)?;
        self.push_order(&mut qb)?;
        qb.push(" LIMIT 1");
        Ok(qb.build_query_as::<M>().fetch_optional(&mut *conn).await?)
    }

    /// Every matching row; empty when nothing matches.
    pub async fn all(&self, conn: &mut SqliteConnection) -> Result<Vec<M>> {
        let mut qb = self.select("*", None)?;
        self.push_order(&mut qb)?;
        if let Some(limit) = self.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        Ok(qb.build_query_as::<M>().fetch_all(&mut *conn).await?)
    }

    /// `COUNT(*)` of matching rows.
    pub async fn count(&self, conn: &mut SqliteConnection) -> Result<i64> {
        let mut qb = self.select("COUNT(*)", None)?;
        Ok(qb.build_query_scalar::<i64>().fetch_one(&mut *conn).await?)
    }

    /// `COUNT(column)` of matching rows, skipping nulls.
    pub async fn count_column(&self, column: &str, conn: &mut SqliteConnection) -> Result<i64> {
        self.check(column)?;
        let mut qb = self.select(&format!("COUNT({})", column), None)?;
        Ok(qb.build_query_scalar::<i64>().fetch_one(&mut *conn).await?)
    }

    /// `AVG(column)` over matching rows; `None` when no row contributes.
    pub async fn avg(&self, column: &str, conn: &mut SqliteConnection) -> Result<Option<f64>> {
        self.check(column)?;
        let mut qb = self.select(&format!("AVG({})", column), None)?;
        Ok(qb
            .build_query_scalar::<Option<f64>>()
            .fetch_one(&mut *conn)
            .await?)
    }

    /// One `(key, AVG(column))` row per distinct key, ordered by key.
    pub async fn group_avg<K>(
        &self,
        key: &str,
        column: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<(K, Option<f64>)>>
    where
        K: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin,
    {
        self.check(key)?;
        self.check(column)?;
        let mut qb = self.select(&format!("{}, AVG({})", key, column), Some(key))?;
        Ok(qb
            .build_query_as::<(K, Option<f64>)>()
            .fetch_all(&mut *conn)
            .await?)
    }

    /// One `(key, SUM(column), COUNT(column))` row per distinct key, ordered by key.
    pub async fn group_sum_count<K>(
        &self,
        key: &str,
        column: &str,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<(K, Option<i64>, i64)>>
    where
        K: for<'r> sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite> + Send + Unpin,
    {
        self.check(key)?;
        self.check(column)?;
        let mut qb = self.select(
            &format!("{}, SUM({}), COUNT({})", key, column, column),
            Some(key),
        )?;
        Ok(qb
            .build_query_as::<(K, Option<i64>, i64)>()
            .fetch_all(&mut *conn)
            .await?)
    }

    fn check(&self, column: &str) -> Result<()> {
        if M::columns().iter().any(|(name, _)| name == column) {
            Ok(())
        } else {
            Err(Error::UnknownColumn {
                table: M::table_name(),
                column: column.to_string(),
            })
        }
    }

    fn select(&self, projection: &str, group_by: Option<&str>) -> Result<QueryBuilder<'static, Sqlite>> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM {}", projection, M::table_name()));
        for (i, filter) in self.filters.iter().enumerate() {
            qb.push(if i == 0 { " WHERE " } else { " AND " });
            match filter {
                Filter::Eq(column, Value::Null) => {
                    self.check(column)?;
                    qb.push(column).push(" IS NULL");
                }
                Filter::Eq(column, value) => {
                    self.check(column)?;
                    qb.push(column).push(" = ");
                    push_value(&mut qb, value);
                }
                Filter::In(column, values) => {
                    self.check(column)?;
                    if values.is_empty() {
                        qb.push("0");
                        continue;
                    }
                    qb.push(column).push(" IN (");
                    for (j, value) in values.iter().enumerate() {
                        if j > 0 {
                            qb.push(", ");
                        }
                        push_value(&mut qb, value);
                    }
                    qb.push(")");
                }
            }
        }
        if let Some(key) = group_by {
            qb.push(" GROUP BY ").push(key).push(" ORDER BY ").push(key);
        }
        Ok(qb)
    }

    fn push_order(&self, qb: &mut QueryBuilder<'static, Sqlite>) -> Result<()> {
        for (i, (column, order)) in self.order.iter().enumerate() {
            self.check(column)?;
            qb.push(if i == 0 { " ORDER BY " } else { ", " });
            qb.push(column).push(" ").push(order.keyword());
        }
        Ok(())
    }
}
