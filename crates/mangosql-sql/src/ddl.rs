//! DDL statement model
//!
//! Lowers `sqlparser` statements into the small set of table and index
//! operations the schema builder understands. Identifiers come out
//! lower-cased and unqualified. Statements and definitions outside that set
//! are logged and dropped here, so the builder can match exhaustively.

use mangosql_core::LogicalType;
use sqlparser::ast::{
    AlterColumnOperation, AlterIndexOperation, AlterTableOperation, ColumnDef, ColumnOption,
    CreateIndex, CreateTable, Expr, Ident, ObjectName, ObjectType, Statement, TableConstraint,
};
use tracing::warn;

use crate::types;

/// A table or index statement the schema builder applies
#[derive(Debug, Clone, PartialEq)]
pub enum DdlStatement {
    CreateTable(CreateTableSpec),
    CreateIndex(IndexSpec),
    DropTables { names: Vec<String>, if_exists: bool },
    DropIndexes { names: Vec<String>, if_exists: bool },
    RenameIndex { from: String, to: String },
    AlterTable {
        table: String,
        if_exists: bool,
        operations: Vec<AlterOperation>,
    },
}

impl std::fmt::Display for DdlStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateTable(spec) => write!(f, "CREATE TABLE {}", spec.name),
            Self::CreateIndex(spec) => write!(f, "CREATE INDEX {} ON {}", spec.name, spec.table),
            Self::DropTables { names, .. } => write!(f, "DROP TABLE {}", names.join(", ")),
            Self::DropIndexes { names, .. } => write!(f, "DROP INDEX {}", names.join(", ")),
            Self::RenameIndex { from, to } => write!(f, "ALTER INDEX {} RENAME TO {}", from, to),
            Self::AlterTable { table, .. } => write!(f, "ALTER TABLE {}", table),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableSpec {
    pub name: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnSpec>,

    /// Table-level constraints, applied after every column
    pub constraints: Vec<ConstraintSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub logical_type: LogicalType,
    pub type_sql: String,
    pub nullable: bool,
    pub has_default: bool,

    /// Inline PRIMARY KEY / UNIQUE / REFERENCES / CHECK, over this column
    pub constraints: Vec<ConstraintSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintSpec {
    PrimaryKey {
        name: String,
        columns: Vec<String>,
    },
    Unique {
        name: String,
        columns: Vec<String>,
    },
    ForeignKey {
        name: String,
        columns: Vec<String>,
        table: String,
        table_columns: Vec<String>,
    },
    Check {
        name: String,
        expr: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AlterOperation {
    AddColumn(ColumnSpec),
    DropColumn { name: String, if_exists: bool },
    RenameColumn { from: String, to: String },
    AlterColumnType {
        name: String,
        logical_type: LogicalType,
        type_sql: String,
    },
    SetNullable { name: String, nullable: bool },
    SetHasDefault { name: String, has_default: bool },
    AddConstraint(ConstraintSpec),
    DropConstraint { name: String, if_exists: bool },
    DropPrimaryKey,
    RenameConstraint { from: String, to: String },
    RenameTable { to: String },
}

/// Lower-cased identifier
fn ident(ident: &Ident) -> String {
    ident.value.to_lowercase()
}

fn optional_ident(name: &Option<Ident>) -> String {
    name.as_ref().map(ident).unwrap_or_default()
}

fn idents(idents: &[Ident]) -> Vec<String> {
    idents.iter().map(ident).collect()
}

/// Last part of a possibly schema-qualified name, lower-cased
pub fn object_name(name: &ObjectName) -> String {
    name.0.last().map(ident).unwrap_or_default()
}

/// Column name an index expression refers to
fn indexed_column(expr: &Expr) -> String {
    match expr {
        Expr::Identifier(name) => ident(name),
        Expr::CompoundIdentifier(parts) => parts.last().map(ident).unwrap_or_default(),
        other => other.to_string().to_lowercase(),
    }
}

/// Lower a parsed statement, or `None` if it is not table or index DDL
pub fn lower_statement(statement: &Statement) -> Option<DdlStatement> {
    match statement {
        Statement::CreateTable(CreateTable {
            name,
            columns,
            constraints,
            if_not_exists,
            ..
        }) => Some(DdlStatement::CreateTable(lower_create_table(
            name,
            columns,
            constraints,
            *if_not_exists,
        ))),
        Statement::CreateIndex(CreateIndex {
            name,
            table_name,
            columns,
            unique,
            ..
        }) => Some(DdlStatement::CreateIndex(IndexSpec {
            name: name.as_ref().map(object_name).unwrap_or_default(),
            table: object_name(table_name),
            columns: columns.iter().map(|c| indexed_column(&c.expr)).collect(),
            unique: *unique,
        })),
        Statement::Drop {
            object_type,
            if_exists,
            names,
            ..
        } => {
            let names = names.iter().map(object_name).collect();
            match object_type {
                ObjectType::Table => Some(DdlStatement::DropTables {
                    names,
                    if_exists: *if_exists,
                }),
                ObjectType::Index => Some(DdlStatement::DropIndexes {
                    names,
                    if_exists: *if_exists,
                }),
                other => {
                    warn!(object = %other, "Skipping unsupported DROP statement");
                    None
                }
            }
        }
        Statement::AlterTable {
            name,
            if_exists,
            operations,
            ..
        } => {
            let table = object_name(name);
            let operations = operations
                .iter()
                .filter_map(|operation| lower_alter_operation(&table, operation))
                .collect();
            Some(DdlStatement::AlterTable {
                table,
                if_exists: *if_exists,
                operations,
            })
        }
        Statement::AlterIndex { name, operation } => {
            if let AlterIndexOperation::RenameIndex { index_name } = operation {
                Some(DdlStatement::RenameIndex {
                    from: object_name(name),
                    to: object_name(index_name),
                })
            } else {
                warn!(index = %name, "Skipping unsupported ALTER INDEX operation");
                None
            }
        }
        other => {
            warn!(statement = %other, "Skipping unsupported statement");
            None
        }
    }
}

fn lower_create_table(
    name: &ObjectName,
    columns: &[ColumnDef],
    constraints: &[TableConstraint],
    if_not_exists: bool,
) -> CreateTableSpec {
    let table = object_name(name);
    CreateTableSpec {
        columns: columns.iter().map(lower_column).collect(),
        constraints: constraints
            .iter()
            .filter_map(|constraint| lower_table_constraint(&table, constraint))
            .collect(),
        name: table,
        if_not_exists,
    }
}

/// Lower a column definition with its inline options
pub fn lower_column(column: &ColumnDef) -> ColumnSpec {
    let name = ident(&column.name);
    let mut spec = ColumnSpec {
        logical_type: types::logical_type(&column.data_type),
        type_sql: types::type_sql(&column.data_type),
        nullable: true,
        has_default: types::is_serial(&column.data_type),
        constraints: Vec::new(),
        name,
    };

    for option in &column.options {
        let constraint_name = optional_ident(&option.name);
        match &option.option {
            ColumnOption::Null => spec.nullable = true,
            ColumnOption::NotNull => spec.nullable = false,
            ColumnOption::Default(_) | ColumnOption::Generated { .. } => spec.has_default = true,
            ColumnOption::Unique { is_primary, .. } => {
                let columns = vec![spec.name.clone()];
                if *is_primary {
                    spec.nullable = false;
                    spec.constraints.push(ConstraintSpec::PrimaryKey {
                        name: constraint_name,
                        columns,
                    });
                } else {
                    spec.constraints.push(ConstraintSpec::Unique {
                        name: constraint_name,
                        columns,
                    });
                }
            }
            ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                ..
            } => spec.constraints.push(ConstraintSpec::ForeignKey {
                name: constraint_name,
                columns: vec![spec.name.clone()],
                table: object_name(foreign_table),
                table_columns: idents(referred_columns),
            }),
            ColumnOption::Check(expr) => spec.constraints.push(ConstraintSpec::Check {
                name: constraint_name,
                expr: expr.to_string(),
            }),
            ColumnOption::DialectSpecific(tokens) => {
                let auto_increment = tokens.iter().any(|token| {
                    let token = token.to_string();
                    token.eq_ignore_ascii_case("auto_increment")
                        || token.eq_ignore_ascii_case("autoincrement")
                });
                if auto_increment {
                    spec.has_default = true;
                }
            }
            other => warn!(
                column = %spec.name,
                option = %other,
                "Skipping unsupported column option"
            ),
        }
    }

    spec
}

/// Lower a table-level constraint; index-only definitions are skipped
pub fn lower_table_constraint(table: &str, constraint: &TableConstraint) -> Option<ConstraintSpec> {
    match constraint {
        TableConstraint::PrimaryKey { name, columns, .. } => Some(ConstraintSpec::PrimaryKey {
            name: optional_ident(name),
            columns: idents(columns),
        }),
        TableConstraint::Unique { name, columns, .. } => Some(ConstraintSpec::Unique {
            name: optional_ident(name),
            columns: idents(columns),
        }),
        TableConstraint::ForeignKey {
            name,
            columns,
            foreign_table,
            referred_columns,
            ..
        } => Some(ConstraintSpec::ForeignKey {
            name: optional_ident(name),
            columns: idents(columns),
            table: object_name(foreign_table),
            table_columns: idents(referred_columns),
        }),
        TableConstraint::Check { name, expr, .. } => Some(ConstraintSpec::Check {
            name: optional_ident(name),
            expr: expr.to_string(),
        }),
        other => {
            warn!(table = %table, definition = %other, "Skipping unsupported table definition");
            None
        }
    }
}

fn lower_alter_operation(table: &str, operation: &AlterTableOperation) -> Option<AlterOperation> {
    match operation {
        AlterTableOperation::AddColumn { column_def, .. } => {
            Some(AlterOperation::AddColumn(lower_column(column_def)))
        }
        AlterTableOperation::DropColumn {
            column_name,
            if_exists,
            ..
        } => Some(AlterOperation::DropColumn {
            name: ident(column_name),
            if_exists: *if_exists,
        }),
        AlterTableOperation::RenameColumn {
            old_column_name,
            new_column_name,
        } => Some(AlterOperation::RenameColumn {
            from: ident(old_column_name),
            to: ident(new_column_name),
        }),
        AlterTableOperation::RenameTable { table_name } => Some(AlterOperation::RenameTable {
            to: object_name(table_name),
        }),
        AlterTableOperation::AddConstraint(constraint) => {
            lower_table_constraint(table, constraint).map(AlterOperation::AddConstraint)
        }
        AlterTableOperation::DropConstraint { name, if_exists, .. } => {
            Some(AlterOperation::DropConstraint {
                name: ident(name),
                if_exists: *if_exists,
            })
        }
        AlterTableOperation::DropPrimaryKey => Some(AlterOperation::DropPrimaryKey),
        AlterTableOperation::RenameConstraint { old_name, new_name } => {
            Some(AlterOperation::RenameConstraint {
                from: ident(old_name),
                to: ident(new_name),
            })
        }
        AlterTableOperation::AlterColumn { column_name, op } => {
            let name = ident(column_name);
            match op {
                AlterColumnOperation::SetDataType { data_type, .. } => {
                    Some(AlterOperation::AlterColumnType {
                        name,
                        logical_type: types::logical_type(data_type),
                        type_sql: types::type_sql(data_type),
                    })
                }
                AlterColumnOperation::SetNotNull => Some(AlterOperation::SetNullable {
                    name,
                    nullable: false,
                }),
                AlterColumnOperation::DropNotNull => Some(AlterOperation::SetNullable {
                    name,
                    nullable: true,
                }),
                AlterColumnOperation::SetDefault { .. } => Some(AlterOperation::SetHasDefault {
                    name,
                    has_default: true,
                }),
                AlterColumnOperation::DropDefault => Some(AlterOperation::SetHasDefault {
                    name,
                    has_default: false,
                }),
                other => {
                    warn!(table = %table, column = %name, operation = ?other, "Skipping unsupported ALTER COLUMN");
                    None
                }
            }
        }
        other => {
            warn!(table = %table, operation = %other, "Skipping unsupported ALTER TABLE operation");
            None
        }
    }
}
