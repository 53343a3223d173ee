//! Logical type table
//!
//! Maps parsed column types onto the portable `LogicalType` vocabulary.

use mangosql_core::LogicalType;
use regex::Regex;
use sqlparser::ast::DataType;
use std::sync::LazyLock;

static TYPE_MODIFIERS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\([^)]*\)").unwrap());

/// Lower-cased type name with modifiers and extra whitespace removed
fn base_name(rendered: &str) -> String {
    TYPE_MODIFIERS
        .replace_all(&rendered.to_lowercase(), "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map a rendered type name (`VARCHAR(255)`, `integer[]`, ...) to a logical type
pub fn logical_type_from_name(rendered: &str) -> LogicalType {
    let name = base_name(rendered);

    if let Some(inner) = name.strip_suffix("[]") {
        return LogicalType::Array(Box::new(logical_type_from_name(inner)));
    }

    match name.as_str() {
        "bool" | "boolean" => LogicalType::Bool,
        "int" | "integer" | "int2" | "int4" | "int8" | "smallint" | "bigint" | "tinyint"
        | "mediumint" | "serial" | "bigserial" | "smallserial" | "serial2" | "serial4"
        | "serial8" => LogicalType::Integer,
        "real" | "float" | "float4" | "float8" | "double" | "double precision" => {
            LogicalType::Float
        }
        "decimal" | "numeric" | "dec" | "money" => LogicalType::Decimal,
        "text" | "string" | "citext" | "clob" => LogicalType::String,
        "varchar" | "character varying" | "nvarchar" | "varchar2" => LogicalType::Varchar,
        "char" | "character" | "bpchar" | "nchar" => LogicalType::Char,
        "bytea" | "blob" | "binary" | "varbinary" => LogicalType::Bytes,
        "date" => LogicalType::Date,
        "time" | "time without time zone" | "time with time zone" | "timetz" => LogicalType::Time,
        "timestamp" | "timestamp without time zone" | "datetime" => LogicalType::Timestamp,
        "timestamptz" | "timestamp with time zone" => LogicalType::TimestampTz,
        "uuid" => LogicalType::Uuid,
        "json" => LogicalType::Json,
        "jsonb" => LogicalType::Jsonb,
        other => {
            let custom = other.rsplit('.').next().unwrap_or(other);
            LogicalType::Custom(custom.trim_matches('"').to_string())
        }
    }
}

/// Logical type of a parsed column type
pub fn logical_type(data_type: &DataType) -> LogicalType {
    logical_type_from_name(&data_type.to_string())
}

/// Raw SQL spelling of a parsed column type
pub fn type_sql(data_type: &DataType) -> String {
    let rendered = data_type.to_string().to_uppercase();
    if rendered == "STRING" {
        "TEXT".to_string()
    } else {
        rendered
    }
}

/// Whether the type generates its own values
pub fn is_serial(data_type: &DataType) -> bool {
    matches!(
        base_name(&data_type.to_string()).as_str(),
        "serial" | "bigserial" | "smallserial" | "serial2" | "serial4" | "serial8"
    )
}
