use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use courier_common::{internal, model::Template};
use sqlx::{
    FromRow, PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};

use crate::{Result, StoreError, TemplateStore};

/// Connection settings for the template database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseOptions {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub schema: String,
    pub username: String,
    pub password: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

#[derive(Debug, FromRow)]
struct TemplateRow {
    id: String,
    subject: String,
    body: String,
    sender: String,
    recipients: String,
    has_attachment: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for Template {
    fn from(row: TemplateRow) -> Self {
        Self {
            id: row.id,
            subject: row.subject,
            body: row.body,
            sender: row.sender,
            recipients: row.recipients,
            has_attachment: row.has_attachment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Template store backed by a Postgres table `<schema>.templates`
#[derive(Debug, Clone)]
pub struct PgTemplateStore {
    pool: PgPool,
    query: String,
}

impl PgTemplateStore {
    /// Open a lazily-connected pool.
    ///
    /// No connection is made until the first lookup, so an unreachable
    /// database shows up as a lookup error rather than a startup failure.
    ///
    /// # Errors
    /// If the schema is not a plain SQL identifier
    pub fn connect_lazy(options: &DatabaseOptions) -> Result<Self> {
        let query = lookup_query(&options.schema)?;

        let connect = PgConnectOptions::new()
            .host(&options.host)
            .port(options.port)
            .database(&options.database)
            .username(&options.username)
            .password(&options.password);

        let pool = PgPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect_lazy_with(connect);

        internal!(
            level = DEBUG,
            host = %options.host,
            port = options.port,
            database = %options.database,
            schema = %options.schema,
            "Configured template database pool"
        );

        Ok(Self { pool, query })
    }

    /// Close all pooled connections
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl TemplateStore for PgTemplateStore {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn lookup(&self, template_id: &str) -> Result<Option<Template>> {
        let row = sqlx::query_as::<_, TemplateRow>(&self.query)
            .bind(template_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Template::from))
    }
}

/// The lookup statement for `schema`.
///
/// The schema cannot be bound as a parameter, so it is restricted to a
/// plain identifier before being interpolated.
fn lookup_query(schema: &str) -> Result<String> {
    if !is_identifier(schema) {
        return Err(StoreError::Configuration(format!(
            "Schema '{schema}' is not a plain SQL identifier"
        )));
    }

    Ok(format!(
        "SELECT id, subject, body, sender, recipients, has_attachment, created_at, updated_at \
         FROM {schema}.templates WHERE id = $1"
    ))
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && value.len() <= 63
}
