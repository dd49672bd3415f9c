use std::fmt;
use std::time::Duration;

use log::LevelFilter;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::ConnectOptions;
use uuid::Uuid;

use crate::config::{DatabaseConfig, RuntimeMode, Secret};
use crate::entity::{quote_ident, Entity, EntityRegistry, NamingStrategy};

/// Everything needed to open and configure the database connection.
///
/// Built once from validated configuration. The password is never printed,
/// neither through `Debug` nor `Display`.
#[derive(Debug, Clone)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: Secret,
    pub database: String,
    pub naming: NamingStrategy,
    /// Create missing tables/columns for registered entities on connect.
    pub synchronize: bool,
    /// Log executed statements.
    pub logging: bool,
    /// Hold at least one connection open for the lifetime of the process.
    pub keep_alive: bool,
}

impl ConnectionDescriptor {
    pub fn from_config(db: &DatabaseConfig) -> Self {
        Self {
            host: db.host.clone(),
            port: db.port,
            username: db.username.clone(),
            password: db.password.clone(),
            database: db.name.clone(),
            naming: NamingStrategy::SnakeCase,
            synchronize: true,
            logging: true,
            keep_alive: true,
        }
    }

    pub fn connect_options(&self) -> PgConnectOptions {
        let opts = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .password(self.password.expose())
            .database(&self.database);
        match self.statement_log_level() {
            Some(level) => opts.log_statements(level),
            None => opts.disable_statement_logging(),
        }
    }

    /// Level executed statements are logged at, `None` when statement logging is off.
    pub fn statement_log_level(&self) -> Option<LevelFilter> {
        self.logging.then_some(LevelFilter::Info)
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        let opts = PgPoolOptions::new().max_connections(10).acquire_timeout(Duration::from_secs(10));
        if self.keep_alive {
            opts.min_connections(1).idle_timeout(None).max_lifetime(None)
        } else {
            opts
        }
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "postgres://{}:***@{}:{}/{}", self.username, self.host, self.port, self.database)
    }
}

/// The process-wide database handle.
#[derive(Clone)]
pub struct Database {
    pub pool: PgPool,
    pub descriptor: ConnectionDescriptor,
}

impl Database {
    /// Opens the pool, checks connectivity and synchronises the schema when enabled.
    ///
    /// Any failure here is a startup failure; there is no retry.
    pub async fn connect(
        descriptor: ConnectionDescriptor,
        registry: &EntityRegistry,
        mode: RuntimeMode,
    ) -> anyhow::Result<Self> {
        tracing::info!("Connecting to database {}", descriptor);
        let pool = descriptor.pool_options().connect_with(descriptor.connect_options()).await?;
        let db = Self { pool, descriptor };
        db.ping().await?;

        if db.descriptor.synchronize {
            if mode.is_production() {
                tracing::warn!("Schema synchronisation is enabled in production mode");
            }
            db.synchronize(registry).await?;
        }
        Ok(db)
    }

    /// Builds the handle without touching the network. Connections open on first use.
    pub fn connect_lazy(descriptor: ConnectionDescriptor) -> Self {
        let pool = descriptor.pool_options().min_connections(0).connect_lazy_with(descriptor.connect_options());
        Self { pool, descriptor }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Creates missing tables and columns. Existing columns are never altered or dropped.
    ///
    /// Any failed statement aborts synchronisation.
    pub async fn synchronize(&self, registry: &EntityRegistry) -> anyhow::Result<()> {
        let naming = self.descriptor.naming;
        for entity in registry.entities() {
            let table = entity.table_name(naming);
            self.execute_ddl(&table, &entity.create_table_sql(naming)).await?;
            for stmt in entity.add_column_sql(naming) {
                self.execute_ddl(&table, &stmt).await?;
            }
            tracing::debug!("Synchronised table {}", table);
        }
        tracing::info!("Schema synchronised for {} entities", registry.len());
        Ok(())
    }

    async fn execute_ddl(&self, table: &str, stmt: &str) -> anyhow::Result<()> {
        sqlx::query(stmt).execute(&self.pool).await.map_err(|e| {
            tracing::error!("Schema statement on {} failed: {}", table, e);
            anyhow::anyhow!("schema synchronisation failed for {}: {}", table, e)
        })?;
        Ok(())
    }

    pub fn table_name<E: Entity>(&self) -> String {
        self.descriptor.naming.table_name(E::NAME)
    }

    /// Sets the soft-delete marker. Returns false when the record is missing or already deleted.
    pub async fn soft_delete<E: Entity>(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let sql = soft_delete_sql(&self.table_name::<E>(), self.descriptor.naming);
        let res = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    /// Clears the soft-delete marker. Returns false when the record is missing or not deleted.
    pub async fn restore<E: Entity>(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let sql = restore_sql(&self.table_name::<E>(), self.descriptor.naming);
        let res = sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }
}

pub(crate) fn soft_delete_sql(table: &str, naming: NamingStrategy) -> String {
    let (deleted, updated) = marker_columns(naming);
    format!(
        "UPDATE {t} SET {d} = now(), {u} = now() WHERE \"id\" = $1 AND {d} IS NULL",
        t = quote_ident(table),
        d = deleted,
        u = updated
    )
}

pub(crate) fn restore_sql(table: &str, naming: NamingStrategy) -> String {
    let (deleted, updated) = marker_columns(naming);
    format!(
        "UPDATE {t} SET {d} = NULL, {u} = now() WHERE \"id\" = $1 AND {d} IS NOT NULL",
        t = quote_ident(table),
        d = deleted,
        u = updated
    )
}

fn marker_columns(naming: NamingStrategy) -> (String, String) {
    (quote_ident(&naming.column_name("deletedAt")), quote_ident(&naming.column_name("updatedAt")))
}
