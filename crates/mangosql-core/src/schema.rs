//! Schema model and canonical type system

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Portable logical type system
///
/// Maps dialect-specific column types to the token vocabulary consumed by
/// code generators. Serialized as its token (`uuid`, `integer[]`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum LogicalType {
    /// Boolean type
    Bool,

    /// Integer type (any precision, serials included)
    Integer,

    /// Floating point (any precision)
    Float,

    /// Exact numeric
    Decimal,

    /// Unbounded text
    String,

    /// Bounded text
    Varchar,

    /// Fixed-width text
    Char,

    /// Binary data
    Bytes,

    /// Date (no time component)
    Date,

    /// Time of day
    Time,

    /// Timestamp without time zone
    Timestamp,

    /// Timestamp with time zone
    TimestampTz,

    /// UUID
    Uuid,

    /// JSON document
    Json,

    /// Binary JSON document
    Jsonb,

    /// Array of another logical type
    Array(Box<LogicalType>),

    /// Anything outside the vocabulary, kept by (lower-cased) name
    Custom(String),
}

impl LogicalType {
    /// Parse a logical type token, the inverse of `Display`
    pub fn from_token(token: &str) -> Self {
        let token = token.trim().to_lowercase();

        if let Some(inner) = token.strip_suffix("[]") {
            return Self::Array(Box::new(Self::from_token(inner)));
        }

        match token.as_str() {
            "bool" => Self::Bool,
            "integer" => Self::Integer,
            "float" => Self::Float,
            "decimal" => Self::Decimal,
            "string" => Self::String,
            "varchar" => Self::Varchar,
            "char" => Self::Char,
            "bytes" => Self::Bytes,
            "date" => Self::Date,
            "time" => Self::Time,
            "timestamp" => Self::Timestamp,
            "timestamptz" => Self::TimestampTz,
            "uuid" => Self::Uuid,
            "json" => Self::Json,
            "jsonb" => Self::Jsonb,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Whether values of this type are numbers
    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float | Self::Decimal)
    }
}

impl std::fmt::Display for LogicalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Integer => write!(f, "integer"),
            Self::Float => write!(f, "float"),
            Self::Decimal => write!(f, "decimal"),
            Self::String => write!(f, "string"),
            Self::Varchar => write!(f, "varchar"),
            Self::Char => write!(f, "char"),
            Self::Bytes => write!(f, "bytes"),
            Self::Date => write!(f, "date"),
            Self::Time => write!(f, "time"),
            Self::Timestamp => write!(f, "timestamp"),
            Self::TimestampTz => write!(f, "timestamptz"),
            Self::Uuid => write!(f, "uuid"),
            Self::Json => write!(f, "json"),
            Self::Jsonb => write!(f, "jsonb"),
            Self::Array(inner) => write!(f, "{}[]", inner),
            Self::Custom(name) => write!(f, "{}", name),
        }
    }
}

impl From<LogicalType> for String {
    fn from(logical_type: LogicalType) -> Self {
        logical_type.to_string()
    }
}

impl From<String> for LogicalType {
    fn from(token: String) -> Self {
        Self::from_token(&token)
    }
}

/// A column, either declared by a table or resolved from a query projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name (for resolved columns, the projected expression)
    pub name: String,

    /// Logical type
    #[serde(rename = "type")]
    pub logical_type: LogicalType,

    /// Raw SQL type as written by the dialect
    pub type_sql: String,

    /// Nullability
    pub nullable: bool,

    /// Whether the database fills the value when omitted
    pub has_default: bool,

    /// Declaration order (for resolved columns, the composite ordering key)
    pub order: usize,

    /// Source table of a resolved column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// Alias (or name) the source table is referenced by in the query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_alias: Option<String>,

    /// Camel-cased identifier of a resolved column
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Projected output name of a resolved column
    #[serde(default, rename = "as", skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Column {
    /// Create a new nullable column without default
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        let type_sql = logical_type.to_string().to_uppercase();
        Self {
            name: name.into(),
            logical_type,
            type_sql,
            nullable: true,
            has_default: false,
            order: 0,
            table: None,
            table_alias: None,
            reference: None,
            alias: None,
        }
    }

    /// Set the raw SQL type
    pub fn with_type_sql(mut self, type_sql: impl Into<String>) -> Self {
        self.type_sql = type_sql.into();
        self
    }

    /// Set nullability
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Set whether the column has a default
    pub fn with_default(mut self, has_default: bool) -> Self {
        self.has_default = has_default;
        self
    }

    /// Set declaration order
    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    /// Name the column is exposed under: the alias when resolved from a query
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// Constraint kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConstraintKind {
    Primary,
    Unique,
    Check,
}

impl ConstraintKind {
    /// Whether the constraint is backed by an index
    pub fn is_indexed(&self) -> bool {
        matches!(self, Self::Primary | Self::Unique)
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "PRIMARY"),
            Self::Unique => write!(f, "UNIQUE"),
            Self::Check => write!(f, "CHECK"),
        }
    }
}

/// A table constraint
///
/// For CHECK constraints `columns` holds the check expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub name: String,
    pub columns: Vec<String>,
    pub kind: ConstraintKind,
}

/// A table index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    pub columns: Vec<String>,
}

/// A foreign key, seen from the table that owns `columns`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Constraint name (empty when unnamed)
    pub name: String,

    /// Local columns
    pub columns: Vec<String>,

    /// Other side of the reference
    pub table: String,

    /// Columns on the other side
    pub table_columns: Vec<String>,
}

impl Reference {
    /// The same foreign key seen from the other side, given the owning table
    pub fn inverse(&self, owner: &str) -> Self {
        Self {
            name: self.name.clone(),
            columns: self.table_columns.clone(),
            table: owner.to_string(),
            table_columns: self.columns.clone(),
        }
    }
}

/// A table and everything declared against it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub columns: BTreeMap<String, Column>,
    pub constraints: Vec<Constraint>,
    pub indexes: Vec<Index>,

    /// Foreign keys declared by this table
    pub references: Vec<Reference>,

    /// Foreign keys other tables declare against this table
    pub referenced: Vec<Reference>,

    /// DDL declaration order
    pub order: usize,
}

impl Table {
    /// Create an empty table
    pub fn new(name: impl Into<String>, order: usize) -> Self {
        Self {
            name: name.into(),
            columns: BTreeMap::new(),
            constraints: Vec::new(),
            indexes: Vec::new(),
            references: Vec::new(),
            referenced: Vec::new(),
            order,
        }
    }

    /// Find a column by name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    /// Columns in declaration order
    pub fn columns_ordered(&self) -> Vec<&Column> {
        let mut columns: Vec<&Column> = self.columns.values().collect();
        columns.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        columns
    }

    /// Order value for a column appended after every existing one
    pub fn next_column_order(&self) -> usize {
        self.columns.values().map(|c| c.order).max().unwrap_or(0) + 1
    }

    /// Append a constraint, and its index when the kind is indexed
    ///
    /// This is the only way constraints enter a table, which keeps every
    /// PRIMARY/UNIQUE constraint paired with an index over the same columns.
    pub fn add_constraint(&mut self, kind: ConstraintKind, name: impl Into<String>, columns: Vec<String>) {
        let name = name.into();
        if kind.is_indexed() {
            self.indexes.push(Index {
                name: name.clone(),
                columns: columns.clone(),
            });
        }
        self.constraints.push(Constraint { name, columns, kind });
    }

    /// Append an index, and a UNIQUE constraint when the index is unique
    pub fn add_index(&mut self, name: impl Into<String>, columns: Vec<String>, unique: bool) {
        let name = name.into();
        if unique {
            self.add_constraint(ConstraintKind::Unique, name, columns);
        } else {
            self.indexes.push(Index { name, columns });
        }
    }

    /// Remove every constraint, index and reference with this name
    ///
    /// Returns whether anything was removed.
    pub fn drop_constraint(&mut self, name: &str) -> bool {
        let before = self.constraints.len() + self.indexes.len() + self.references.len();
        self.constraints.retain(|c| c.name != name);
        self.indexes.retain(|i| i.name != name);
        self.references.retain(|r| r.name != name);
        before != self.constraints.len() + self.indexes.len() + self.references.len()
    }

    /// Remove an index and the PRIMARY/UNIQUE constraint it backs
    pub fn drop_index(&mut self, name: &str) -> bool {
        let before = self.indexes.len();
        self.indexes.retain(|i| i.name != name);
        if self.indexes.len() == before {
            return false;
        }
        self.constraints
            .retain(|c| !(c.name == name && c.kind.is_indexed()));
        true
    }

    /// Remove the PRIMARY constraint and its index
    pub fn drop_primary_key(&mut self) -> bool {
        let Some(position) = self
            .constraints
            .iter()
            .position(|c| c.kind == ConstraintKind::Primary)
        else {
            return false;
        };

        let primary = self.constraints.remove(position);
        if let Some(index) = self
            .indexes
            .iter()
            .position(|i| i.name == primary.name && i.columns == primary.columns)
        {
            self.indexes.remove(index);
        }
        true
    }

    /// Whether an index with this name exists
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.iter().any(|i| i.name == name)
    }

    /// Rename every constraint, index and reference with this name
    pub fn rename_constraint(&mut self, from: &str, to: &str) -> bool {
        let mut renamed = false;
        for constraint in self.constraints.iter_mut().filter(|c| c.name == from) {
            constraint.name = to.to_string();
            renamed = true;
        }
        for index in self.indexes.iter_mut().filter(|i| i.name == from) {
            index.name = to.to_string();
            renamed = true;
        }
        for reference in self.references.iter_mut().filter(|r| r.name == from) {
            reference.name = to.to_string();
            renamed = true;
        }
        renamed
    }

    /// Move a column to a new name, keeping its definition
    ///
    /// Constraint, index and reference column lists follow the rename.
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        let Some(mut column) = self.columns.remove(from) else {
            return false;
        };
        column.name = to.to_string();
        self.columns.insert(to.to_string(), column);

        let rename = |columns: &mut Vec<String>| {
            for column in columns.iter_mut().filter(|c| c.as_str() == from) {
                *column = to.to_string();
            }
        };
        self.constraints.iter_mut().for_each(|c| rename(&mut c.columns));
        self.indexes.iter_mut().for_each(|i| rename(&mut i.columns));
        self.references.iter_mut().for_each(|r| rename(&mut r.columns));
        true
    }

    /// Primary key columns
    ///
    /// Falls back to the foreign key columns, then to the first index, then
    /// to the first declared column, when no PRIMARY constraint exists.
    pub fn primary_key(&self) -> Vec<&str> {
        if let Some(primary) = self
            .constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::Primary)
        {
            return primary.columns.iter().map(String::as_str).collect();
        }

        if !self.references.is_empty() {
            return self
                .references
                .iter()
                .flat_map(|r| r.columns.iter().map(String::as_str))
                .collect();
        }

        if let Some(index) = self.indexes.first() {
            return index.columns.iter().map(String::as_str).collect();
        }

        self.columns_ordered()
            .first()
            .map(|c| vec![c.name.as_str()])
            .unwrap_or_default()
    }
}

/// A hand-written query with its resolved output shape
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Query {
    /// Query text as parsed
    pub query: String,

    /// Method name from the query macro
    pub method: String,

    /// Query name from the query macro
    pub name: String,

    /// Projection rebuilt as `expr AS alias` pairs, in output order
    pub select: String,

    /// Projection as written
    pub select_original: String,

    /// Output columns
    pub select_fields: Vec<Column>,

    pub from: String,

    #[serde(rename = "where")]
    pub where_clause: String,

    pub group_by: Vec<String>,

    pub having: String,
}

/// A comment directive naming one hand-written query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryMacro {
    pub method: String,
    pub name: String,

    /// Normalized query fingerprint, used only for matching
    pub query: String,
}

/// Tables one FROM-clause term can resolve to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDeps {
    /// Concrete table names
    pub names: Vec<String>,

    /// Declared alias (empty if none)
    pub alias: String,
}

/// Tables plus queries, as handed to the code generator
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub tables: BTreeMap<String, Table>,
    pub queries: Vec<Query>,
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a table by name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Find a table by name, mutably
    pub fn table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Tables in declaration order
    pub fn tables_ordered(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.values().collect();
        tables.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        tables
    }

    /// Find a query by method name
    pub fn query(&self, method: &str) -> Option<&Query> {
        self.queries.iter().find(|q| q.method == method)
    }
}
