use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Table as ComfyTable};
use std::path::PathBuf;

use tablekit::catalog::SchemaProvider;
use tablekit::driver::RecordingDriver;
use tablekit::parser::parse_where_str;
use tablekit::{Connection, EngineConfig, FixedLanguages, SelectOptions, StaticSchemas};

/// tablekit SQL inspector
#[derive(Parser, Debug)]
#[command(name = "tk_sql")]
#[command(about = "Compiles where-specs to SQL against a schema catalog", long_about = None)]
struct Args {
    /// JSON array of table schemas
    #[arg(short = 's', long)]
    schemas: PathBuf,

    /// Engine config file (defaults to ./tablekit.toml, then the user config dir)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the SELECT (or COUNT) a read with this where-spec would run
    Where {
        table: String,
        /// Where-spec as JSON, e.g. '{"age": [">", 18], "name": ["IN", ["a", "b"]]}'
        #[arg(default_value = "{}")]
        spec: String,
        #[arg(long)]
        count: bool,
        /// Join top-level conditions with OR
        #[arg(long)]
        or: bool,
        #[arg(long)]
        lang: Option<String>,
        #[arg(long)]
        order_by: Option<String>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Render a table schema
    Describe { table: String },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    tablekit::init_logging(&args.log);

    let config = EngineConfig::load(args.config.as_deref())?;
    let schemas = StaticSchemas::from_json_file(&args.schemas)?;

    match args.command {
        Command::Describe { table } => {
            let Some(schema) = schemas.table_schema(&table)? else {
                return Err(format!("table '{table}' not found in {}", args.schemas.display()).into());
            };
            let mut out = ComfyTable::new();
            out.load_preset(UTF8_FULL);
            out.set_header(["column", "type", "null", "key", "references"].map(Cell::new));
            for column in &schema.columns {
                let key = match (column.primary_key, column.real, column.generated) {
                    (true, _, _) => "PRI",
                    (_, false, _) => "linked",
                    (_, _, true) => "generated",
                    _ => "",
                };
                let references = column
                    .foreign_keys
                    .iter()
                    .map(|fk| format!("{}.{}", fk.referenced_table, fk.referenced_column))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.add_row([
                    Cell::new(&column.name),
                    Cell::new(column.data_type.to_string()),
                    Cell::new(if column.nullable { "YES" } else { "NO" }),
                    Cell::new(key),
                    Cell::new(references),
                ]);
            }
            println!("{out}");
        }
        Command::Where {
            table,
            spec,
            count,
            or,
            lang,
            order_by,
            limit,
        } => {
            let languages = match &lang {
                Some(lang) => FixedLanguages::new(lang.clone()),
                None => FixedLanguages::default(),
            };
            let mut conn = Connection::new(RecordingDriver::new(), schemas, config).with_languages(languages);
            let schema = conn.schema(&table)?;
            let spec = parse_where_str(&spec, Some(&schema))?;

            let mut options = SelectOptions::new();
            if or {
                options = options.or();
            }
            if let Some(order) = order_by {
                options = options.order_by(order);
            }
            if let Some(limit) = limit {
                options = options.limit(limit);
            }
            let sql = if count {
                conn.compile_count(&table, spec, &options)?
            } else {
                conn.compile_select(&table, spec, &options)?
            };
            println!("{sql};");
        }
    }
    Ok(())
}
