// dbvault/src/restore/db_restore.rs
use std::path::Path;

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};
use tracing::debug;

use crate::config::DatabaseConfig;
use crate::errors::Result;
use crate::tools::{CommandRunner, Invocation, Stage, run_stage};

/// Catalog access and DDL on the restore target.
#[async_trait]
pub trait SchemaAdmin: Send {
    /// Base tables of `schema`, sorted by name.
    async fn user_tables(&mut self, schema: &str) -> Result<Vec<String>>;

    /// Runs every statement in one transaction; nothing is applied on error.
    async fn run_in_transaction(&mut self, statements: &[String]) -> Result<()>;
}

/// Opens a [`SchemaAdmin`] handle. The handle is owned by the caller and the
/// connection closes when it is dropped.
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    type Admin: SchemaAdmin;

    async fn connect(&self) -> Result<Self::Admin>;
}

pub struct PgConnector {
    options: PgConnectOptions,
}

impl PgConnector {
    pub fn new(db: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&db.host)
            .port(db.port)
            .username(&db.user)
            .password(&db.password)
            .database(&db.name);
        PgConnector { options }
    }
}

pub struct PgSchemaAdmin {
    conn: PgConnection,
}

#[async_trait]
impl DatabaseConnector for PgConnector {
    type Admin = PgSchemaAdmin;

    async fn connect(&self) -> Result<PgSchemaAdmin> {
        let conn = PgConnection::connect_with(&self.options).await?;
        Ok(PgSchemaAdmin { conn })
    }
}

#[async_trait]
impl SchemaAdmin for PgSchemaAdmin {
    async fn user_tables(&mut self, schema: &str) -> Result<Vec<String>> {
        let tables = sqlx::query_scalar::<_, String>(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_schema = $1 AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .bind(schema)
        .fetch_all(&mut self.conn)
        .await?;
        Ok(tables)
    }

    async fn run_in_transaction(&mut self, statements: &[String]) -> Result<()> {
        let mut tx = self.conn.begin().await?;
        for statement in statements {
            debug!(%statement, "executing");
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `DROP TABLE ... CASCADE` for every table of `schema`.
pub fn drop_statements(schema: &str, tables: &[String]) -> Vec<String> {
    tables
        .iter()
        .map(|table| {
            format!(
                "DROP TABLE IF EXISTS {}.{} CASCADE",
                quote_ident(schema),
                quote_ident(table)
            )
        })
        .collect()
}

/// Drops every table of `schema` in a single transaction and returns how
/// many were dropped. An empty schema is left alone without a transaction.
pub async fn wipe_schema<C>(connector: &C, schema: &str) -> Result<usize>
where
    C: DatabaseConnector + ?Sized,
{
    let mut admin = connector.connect().await?;
    let tables = admin.user_tables(schema).await?;
    if tables.is_empty() {
        println!("ℹ️  Schema {} has no tables, nothing to clear.", schema);
        return Ok(0);
    }

    println!("🧹 Dropping {} tables from schema {}...", tables.len(), schema);
    admin
        .run_in_transaction(&drop_statements(schema, &tables))
        .await?;
    println!("✓ Database cleared");
    Ok(tables.len())
}

/// The psql call that replays `script` against the target database.
pub fn load_invocation(db: &DatabaseConfig, script: &Path) -> Invocation {
    Invocation::new("psql")
        .arg("-X") // Do not read psqlrc
        .arg("-q")
        .arg("-v")
        .arg("ON_ERROR_STOP=1")
        .arg("-h")
        .arg(&db.host)
        .arg("-p")
        .arg(db.port.to_string())
        .arg("-U")
        .arg(&db.user)
        .arg("-d")
        .arg(&db.name)
        .arg("-f")
        .arg(script)
        .env("PGPASSWORD", &db.password)
}

/// Loads the plaintext script with psql.
pub fn load_database<R: CommandRunner + ?Sized>(
    runner: &R,
    db: &DatabaseConfig,
    script: &Path,
) -> Result<()> {
    println!("📥 Database load started");
    run_stage(runner, Stage::Load, &load_invocation(db, script))?;
    println!("✓ Database loaded");
    Ok(())
}
