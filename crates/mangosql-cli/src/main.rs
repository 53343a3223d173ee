use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mangosql_core::{Config, DriverConfig, LoggerConfig, Schema, Table};
use mangosql_sql::{normalize, parse_queries, parse_schema};

mod diagram;
mod input;

/// MangoSQL - typed schema and query model from SQL DDL
#[derive(Parser)]
#[command(name = "mangosql")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: mangosql.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Target driver (overrides the config file)
    #[arg(long, global = true)]
    driver: Option<DriverConfig>,

    /// Target logger (overrides the config file)
    #[arg(long, global = true)]
    logger: Option<LoggerConfig>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the schema and resolve queries, then print the result
    Inspect {
        /// Schema file or migration folder
        src: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the dialect-normalized DDL
    Normalize {
        /// Schema file or migration folder
        src: PathBuf,
    },

    /// Render the schema as a D2 entity relationship diagram
    Diagram {
        /// Schema file or migration folder
        src: PathBuf,

        /// Diagram title (empty to leave out the title block)
        #[arg(short, long, default_value = "Database")]
        title: String,

        /// Extra title lines, separated by '|' (version, commit, feature, ...)
        #[arg(short, long, default_value = "")]
        meta: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Summary,
}

/// What `inspect --format json` prints
#[derive(Serialize)]
struct Inspection<'a> {
    driver: DriverConfig,
    logger: LoggerConfig,
    schema: &'a Schema,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    // Load config if specified
    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("mangosql.toml").exists() {
        Config::from_file(Path::new("mangosql.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    if let Some(driver) = cli.driver {
        config.driver = driver;
    }
    if let Some(logger) = cli.logger {
        config.logger = logger;
    }

    if cli.verbose {
        eprintln!(
            "{} driver: {}, logger: {}",
            "Using".cyan(),
            config.driver,
            config.logger
        );
    }

    match cli.command {
        Commands::Inspect {
            src,
            format,
            output,
        } => inspect_command(&config, &src, format, output.as_deref(), cli.verbose),
        Commands::Normalize { src } => normalize_command(&config, &src),
        Commands::Diagram {
            src,
            title,
            meta,
            output,
        } => diagram_command(&config, &src, &title, &meta, output.as_deref(), cli.verbose),
    }
}

/// Inspect command - build the schema, resolve queries, print both
fn inspect_command(
    config: &Config,
    src: &Path,
    format: OutputFormat,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let ddl = input::load_schema(src, &config.input)?;
    let mut schema = parse_schema(&ddl)?;

    if verbose {
        eprintln!(
            "{} {} tables from {}",
            "Built".green(),
            schema.tables.len(),
            src.display()
        );
    }

    let queries = input::load_queries(src, &config.input)?;
    parse_queries(&mut schema, &queries)?;

    if verbose && !schema.queries.is_empty() {
        eprintln!("{} {} queries", "Resolved".green(), schema.queries.len());
    }

    let rendered = match format {
        OutputFormat::Json => {
            let inspection = Inspection {
                driver: config.driver,
                logger: config.logger,
                schema: &schema,
            };
            serde_json::to_string_pretty(&inspection)?
        }
        OutputFormat::Summary => summary(config, &schema),
    };

    write_output(&rendered, output, verbose)
}

/// Normalize command - print what the statement parser will see
fn normalize_command(config: &Config, src: &Path) -> Result<()> {
    let ddl = input::load_schema(src, &config.input)?;
    println!("{}", normalize(&ddl));
    Ok(())
}

/// Diagram command - build the schema and print it as D2
fn diagram_command(
    config: &Config,
    src: &Path,
    title: &str,
    meta: &str,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let ddl = input::load_schema(src, &config.input)?;
    let schema = parse_schema(&ddl)?;

    let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let options = diagram::DiagramOptions {
        title,
        meta,
        date: &date,
    };
    write_output(&diagram::render_d2(&schema, &options), output, verbose)
}

fn write_output(rendered: &str, output: Option<&Path>, verbose: bool) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if verbose {
                eprintln!("{} {}", "Written to:".green(), path.display());
            }
        }
        None => println!("{}", rendered.trim_end()),
    }

    Ok(())
}

/// Human-readable listing of tables and queries
fn summary(config: &Config, schema: &Schema) -> String {
    let mut out = Vec::new();

    out.push(format!(
        "{} {} / {}",
        "Target".bold(),
        config.driver.to_string().cyan(),
        config.logger.to_string().cyan()
    ));
    out.push(String::new());
    out.push(format!("{} ({})", "Tables".bold(), schema.tables.len()));

    for table in schema.tables_ordered() {
        out.push(format!("  {}", table.name.green().bold()));
        out.extend(table_lines(table));
    }

    if !schema.queries.is_empty() {
        out.push(String::new());
        out.push(format!("{} ({})", "Queries".bold(), schema.queries.len()));

        for query in &schema.queries {
            out.push(format!("  {} {}", query.method.green().bold(), format!("({})", query.name).dimmed()));
            for field in &query.select_fields {
                let sql_type = if field.type_sql == "UNKNOWN" {
                    field.type_sql.yellow()
                } else {
                    field.type_sql.normal()
                };
                out.push(format!(
                    "    {:<24} {:<12} {}",
                    field.output_name(),
                    field.logical_type.to_string(),
                    sql_type
                ));
            }
        }
    }

    out.join("\n")
}

fn table_lines(table: &Table) -> Vec<String> {
    let primary_key = table.primary_key();
    let mut lines = Vec::new();

    for column in table.columns_ordered() {
        let mut flags = Vec::new();
        if primary_key.contains(&column.name.as_str()) {
            flags.push("PK".yellow().to_string());
        }
        if !column.nullable {
            flags.push("NOT NULL".to_string());
        }
        if column.has_default {
            flags.push("DEFAULT".dimmed().to_string());
        }

        lines.push(format!(
            "    {:<24} {:<12} {}",
            column.name,
            column.logical_type.to_string(),
            flags.join(" ")
        ));
    }

    for constraint in &table.constraints {
        lines.push(format!(
            "    {} {} ({})",
            constraint.kind.to_string().blue(),
            constraint.name,
            constraint.columns.join(", ")
        ));
    }

    for reference in &table.references {
        lines.push(format!(
            "    {} ({}) -> {}({})",
            "REFERENCES".magenta(),
            reference.columns.join(", "),
            reference.table,
            reference.table_columns.join(", ")
        ));
    }

    for reference in &table.referenced {
        lines.push(format!(
            "    {} {}({})",
            "REFERENCED BY".dimmed(),
            reference.table,
            reference.table_columns.join(", ")
        ));
    }

    lines
}
