//! Base persisted-record shape and entity metadata.
//!
//! Domain entities embed [`BaseEntity`] and describe their extra columns through
//! the [`Entity`] trait. Registered entities are what schema synchronisation
//! creates tables for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Fields shared by every persisted record.
///
/// `deleted_at` is the soft-delete marker: `None` while the record is live, a
/// timestamp once it has been logically removed. It is never serialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BaseEntity {
    /// Record ID
    pub id: Uuid,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
    /// Deletion time
    #[serde(skip_serializing, default)]
    #[schema(ignore)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl BaseEntity {
    pub fn new() -> Self {
        let now = Utc::now();
        Self { id: Uuid::new_v4(), created_at: now, updated_at: now, deleted_at: None }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Marks the record as logically removed. Deleting twice keeps the first timestamp.
    pub fn soft_delete(&mut self) {
        if self.deleted_at.is_none() {
            let now = Utc::now();
            self.deleted_at = Some(now);
            self.updated_at = now;
        }
    }

    pub fn restore(&mut self) {
        if self.deleted_at.take().is_some() {
            self.touch();
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

impl Default for BaseEntity {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps entity and property names onto table and column identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NamingStrategy {
    /// `UserProfile` -> `user_profile`, `createdAt` -> `created_at`.
    #[default]
    SnakeCase,
    Preserve,
}

impl NamingStrategy {
    pub fn table_name(self, entity: &str) -> String {
        self.apply(entity)
    }

    pub fn column_name(self, property: &str) -> String {
        self.apply(property)
    }

    fn apply(self, name: &str) -> String {
        match self {
            NamingStrategy::Preserve => name.to_string(),
            NamingStrategy::SnakeCase => to_snake_case(name),
        }
    }
}

fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            // Break before an upper-case letter that starts a word: "userId", "HTTPServer" -> "http_server".
            let starts_word = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if starts_word && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Postgres column types used by entity definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    Varchar(u32),
    Integer,
    BigInt,
    Double,
    Boolean,
    Timestamptz,
    Jsonb,
}

impl ColumnType {
    pub fn sql(self) -> String {
        match self {
            ColumnType::Uuid => "UUID".into(),
            ColumnType::Text => "TEXT".into(),
            ColumnType::Varchar(n) => format!("VARCHAR({})", n),
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::BigInt => "BIGINT".into(),
            ColumnType::Double => "DOUBLE PRECISION".into(),
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::Timestamptz => "TIMESTAMPTZ".into(),
            ColumnType::Jsonb => "JSONB".into(),
        }
    }
}

/// A column declared by property name; the naming strategy derives the SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub property: &'static str,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub primary: bool,
    pub default: Option<&'static str>,
}

impl ColumnDef {
    pub const fn new(property: &'static str, column_type: ColumnType) -> Self {
        Self { property, column_type, nullable: false, unique: false, primary: false, default: None }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub const fn default_sql(mut self, expr: &'static str) -> Self {
        self.default = Some(expr);
        self
    }

    pub fn ddl(&self, naming: NamingStrategy) -> String {
        let mut sql = format!("{} {}", quote_ident(&naming.column_name(self.property)), self.column_type.sql());
        if self.primary {
            sql.push_str(" PRIMARY KEY");
        } else {
            if !self.nullable {
                sql.push_str(" NOT NULL");
            }
            if self.unique {
                sql.push_str(" UNIQUE");
            }
        }
        if let Some(default) = self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

/// Columns contributed by [`BaseEntity`] to every table.
pub fn base_columns() -> Vec<ColumnDef> {
    vec![
        ColumnDef::new("id", ColumnType::Uuid).primary().default_sql("gen_random_uuid()"),
        ColumnDef::new("createdAt", ColumnType::Timestamptz).default_sql("now()"),
        ColumnDef::new("updatedAt", ColumnType::Timestamptz).default_sql("now()"),
        ColumnDef::new("deletedAt", ColumnType::Timestamptz).nullable(),
    ]
}

/// A persisted domain type. Implementors list only their own columns; the base columns are implied.
pub trait Entity {
    /// Type-level entity name, e.g. `"UserProfile"`.
    const NAME: &'static str;

    fn columns() -> Vec<ColumnDef>;

    fn metadata() -> EntityMetadata {
        let mut columns = base_columns();
        columns.extend(Self::columns());
        EntityMetadata { name: Self::NAME, columns }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityMetadata {
    pub name: &'static str,
    pub columns: Vec<ColumnDef>,
}

impl EntityMetadata {
    pub fn table_name(&self, naming: NamingStrategy) -> String {
        naming.table_name(self.name)
    }

    pub fn create_table_sql(&self, naming: NamingStrategy) -> String {
        let columns: Vec<String> = self.columns.iter().map(|c| c.ddl(naming)).collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.table_name(naming)),
            columns.join(",\n    ")
        )
    }

    /// One `ADD COLUMN IF NOT EXISTS` per column, for tables that predate a column.
    pub fn add_column_sql(&self, naming: NamingStrategy) -> Vec<String> {
        let table = quote_ident(&self.table_name(naming));
        self.columns
            .iter()
            .filter(|c| !c.primary)
            .map(|c| {
                // NOT NULL without a default cannot be added to a populated table.
                let col = if c.default.is_none() && !c.nullable {
                    ColumnDef { nullable: true, ..c.clone() }
                } else {
                    c.clone()
                };
                format!("ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}", table, col.ddl(naming))
            })
            .collect()
    }
}

/// Entities known to the persistence layer. Domain modules register theirs before connecting.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: Vec<EntityMetadata>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: Entity>(&mut self) -> &mut Self {
        if !self.entities.iter().any(|m| m.name == E::NAME) {
            self.entities.push(E::metadata());
        }
        self
    }

    pub fn with<E: Entity>(mut self) -> Self {
        self.register::<E>();
        self
    }

    pub fn entities(&self) -> &[EntityMetadata] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

pub(crate) fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}
