use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Local;
use clap::error::ErrorKind;
use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use databased_core::{ColumnInfo, Row, Value};
use databased_sqlite::{DatabaseConfig, Databased, Select};
use tracing::Level;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

const PACKAGE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Timestamp embedded in dump and backup file names.
const FILE_TIMESTAMP_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

/// Grid cells longer than this are cut and suffixed with `...`.
const MAX_CELL_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Boxed text table.
    Grid,
    /// Pretty-printed JSON array of row objects.
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "dbshell", version)]
#[command(about = "Inspect and edit a SQLite database from the command line")]
struct Cli {
    #[command(flatten)]
    database: DatabaseArgs,
    /// Directory for the log file (default: next to the database).
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Also print debug-level log events to stderr.
    #[arg(long, global = true)]
    verbose: bool,
    /// How result rows are printed.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Grid)]
    format: OutputFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct DatabaseArgs {
    /// Database file; created with its parent directories if missing.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// YAML file with connection options. `--db` overrides its path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Seconds to wait for a locked database.
    #[arg(long, global = true)]
    timeout: Option<f64>,
    /// Return TIMESTAMP/DATETIME columns as plain text.
    #[arg(long, global = true)]
    no_detect_types: bool,
    /// Turn off foreign key enforcement.
    #[arg(long, global = true)]
    no_foreign_keys: bool,
    /// Roll back instead of committing when the connection closes.
    #[arg(long, global = true)]
    no_commit_on_close: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute one SQL statement and print any rows it returns.
    Query(QueryArgs),
    /// Select rows from a table.
    Select(SelectArgs),
    /// Insert one or more rows.
    Insert(InsertArgs),
    /// Set a column to a new value.
    Update(UpdateArgs),
    /// Delete rows.
    Delete(DeleteArgs),
    /// Count rows or distinct values.
    Count(CountArgs),
    /// Search columns for a substring.
    Find(FindArgs),
    /// Create a table if it does not exist.
    AddTable(AddTableArgs),
    /// Drop a table.
    DropTable(DropTableArgs),
    /// Add a column to a table.
    AddColumn(AddColumnArgs),
    /// Drop a column from a table.
    DropColumn(DropColumnArgs),
    /// Rename a table.
    RenameTable(RenameTableArgs),
    /// Rename a column.
    RenameColumn(RenameColumnArgs),
    /// Show column details for tables and views.
    Describe(DescribeArgs),
    /// List table names.
    Tables,
    /// List view names.
    Views,
    /// List index names.
    Indices,
    /// Show tables and views with their columns.
    Schema(SchemaArgs),
    /// Write schema and data `.sql` dump files.
    Dump(DumpArgs),
    /// Execute a `.sql` script.
    Script(ScriptArgs),
    /// Rebuild the database file to reclaim free space.
    Vacuum,
    /// Copy the database file next to itself.
    Backup(BackupArgs),
    /// Replace the database file with a backup copy.
    Restore(RestoreArgs),
    /// Empty this database's log file.
    FlushLog,
    /// Show the connection options in use.
    Properties,
    /// Read commands from stdin until `quit`.
    Shell,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// SQL text. Use `?` placeholders for values.
    sql: String,
    /// Value for the next placeholder. Repeat as needed.
    #[arg(short = 'p', long = "param", allow_hyphen_values = true)]
    params: Vec<String>,
}

#[derive(Debug, Args)]
struct SelectArgs {
    /// Table to select from; may include an alias.
    table: String,
    /// Columns or expressions to return (default: all).
    #[arg(short = 'c', long, num_args = 1..)]
    columns: Vec<String>,
    /// Join clause, e.g. "JOIN brands b ON b.id = c.brand_id". Repeatable.
    #[arg(short = 'j', long = "join")]
    joins: Vec<String>,
    /// WHERE condition.
    #[arg(short = 'w', long = "where")]
    filter: Option<String>,
    /// GROUP BY expression.
    #[arg(short = 'g', long)]
    group_by: Option<String>,
    /// HAVING condition; needs --group-by.
    #[arg(long)]
    having: Option<String>,
    /// ORDER BY expression, e.g. "name DESC".
    #[arg(short = 'o', long)]
    order_by: Option<String>,
    /// Maximum number of rows.
    #[arg(short = 'l', long)]
    limit: Option<u64>,
    /// Return every column except these.
    #[arg(short = 'x', long = "exclude", num_args = 1.., conflicts_with = "columns")]
    exclude_columns: Vec<String>,
}

#[derive(Debug, Args)]
struct InsertArgs {
    /// Table to insert into.
    table: String,
    /// Target columns (default: every column of the table).
    #[arg(short = 'c', long, num_args = 1..)]
    columns: Vec<String>,
    /// Values, row after row. The count must be a multiple of the column count.
    #[arg(short = 'v', long, num_args = 1.., required = true, allow_negative_numbers = true)]
    values: Vec<String>,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("scope").required(true).args(["filter", "all"])))]
struct UpdateArgs {
    table: String,
    column: String,
    /// New value. NULL, integers, and decimals are stored as such.
    #[arg(allow_hyphen_values = true)]
    value: String,
    /// Only update rows matching this condition.
    #[arg(short = 'w', long = "where")]
    filter: Option<String>,
    /// Update every row of the table.
    #[arg(long)]
    all: bool,
}

#[derive(Debug, Args)]
#[command(group(ArgGroup::new("scope").required(true).args(["filter", "all"])))]
struct DeleteArgs {
    table: String,
    /// Only delete rows matching this condition.
    #[arg(short = 'w', long = "where")]
    filter: Option<String>,
    /// Delete every row of the table.
    #[arg(long)]
    all: bool,
}

#[derive(Debug, Args)]
struct CountArgs {
    table: String,
    /// Column to count; `*` counts rows.
    #[arg(short = 'c', long, default_value = "*")]
    column: String,
    /// Only count rows matching this condition.
    #[arg(short = 'w', long = "where")]
    filter: Option<String>,
    /// Count distinct values of --column.
    #[arg(short = 'd', long)]
    distinct: bool,
}

#[derive(Debug, Args)]
struct FindArgs {
    table: String,
    /// Substring to look for.
    needle: String,
    /// Columns to search (default: all).
    #[arg(short = 'c', long, num_args = 1..)]
    columns: Vec<String>,
}

#[derive(Debug, Args)]
struct AddTableArgs {
    table: String,
    /// Column definitions, e.g. "id INTEGER PRIMARY KEY" "name TEXT NOT NULL".
    #[arg(required = true, num_args = 1..)]
    columns: Vec<String>,
}

#[derive(Debug, Args)]
struct DropTableArgs {
    table: String,
}

#[derive(Debug, Args)]
struct AddColumnArgs {
    table: String,
    /// Column definition, e.g. "rating REAL DEFAULT 0".
    column_def: String,
}

#[derive(Debug, Args)]
struct DropColumnArgs {
    table: String,
    column: String,
}

#[derive(Debug, Args)]
struct RenameTableArgs {
    table: String,
    new_name: String,
}

#[derive(Debug, Args)]
struct RenameColumnArgs {
    table: String,
    column: String,
    new_name: String,
}

#[derive(Debug, Args)]
struct DescribeArgs {
    /// Tables or views to describe (default: all).
    tables: Vec<String>,
}

#[derive(Debug, Args)]
struct SchemaArgs {
    /// Include row counts.
    #[arg(short = 'c', long)]
    counts: bool,
}

#[derive(Debug, Args)]
struct DumpArgs {
    /// Only dump these tables (default: all).
    #[arg(short = 't', long, num_args = 1..)]
    tables: Vec<String>,
    /// Write only the schema file.
    #[arg(long, conflicts_with = "data_only")]
    schema_only: bool,
    /// Write only the data file.
    #[arg(long)]
    data_only: bool,
    /// Directory for the dump files.
    #[arg(short = 'o', long, default_value = ".")]
    output_dir: PathBuf,
}

#[derive(Debug, Args)]
struct ScriptArgs {
    path: PathBuf,
}

#[derive(Debug, Args)]
struct BackupArgs {
    /// Add a timestamp to the backup file name.
    #[arg(long)]
    timestamp: bool,
}

#[derive(Debug, Args)]
struct RestoreArgs {
    /// Backup file to copy over the database.
    backup: PathBuf,
}

/// One line of shell input: any database command plus session controls.
#[derive(Debug, Parser)]
#[command(name = "dbshell", no_binary_name = true, disable_version_flag = true)]
#[command(after_help = "Input that is not a command runs as SQL, e.g. SELECT * FROM cereals")]
struct ShellLine {
    #[command(subcommand)]
    command: ShellCommand,
}

#[derive(Debug, Subcommand)]
enum ShellCommand {
    #[command(flatten)]
    Database(Command),
    /// Commit pending writes.
    Commit,
    /// Discard pending writes.
    Rollback,
    /// Set the lock timeout in seconds.
    SetTimeout { seconds: f64 },
    /// Turn timestamp decoding on or off.
    SetDetectTypes {
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enabled: bool,
    },
    /// Turn foreign key enforcement on or off.
    SetForeignKeys {
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enabled: bool,
    },
    /// Choose whether closing commits or rolls back.
    SetCommitOnClose {
        #[arg(action = clap::ArgAction::Set, value_parser = clap::builder::BoolishValueParser::new())]
        enabled: bool,
    },
    /// Leave the shell.
    #[command(alias = "exit")]
    Quit,
}

/// State shared by every command of one invocation or shell session.
struct Session {
    db: Databased,
    format: OutputFormat,
    log_file: PathBuf,
}

impl Session {
    fn print_rows(&self, rows: &[Row]) -> Result<(), String> {
        match self.format {
            OutputFormat::Grid if rows.is_empty() => println!("(no rows)"),
            OutputFormat::Grid => print!("{}", render_grid(rows)),
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(rows)
                    .map_err(|e| format!("Failed to serialize rows: {e}"))?;
                println!("{json}");
            }
        }
        Ok(())
    }

    /// Status text. Kept off stdout in JSON mode so the output stays parseable.
    fn status(&self, message: impl std::fmt::Display) {
        match self.format {
            OutputFormat::Grid => println!("{message}"),
            OutputFormat::Json => eprintln!("{message}"),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = resolve_config(&cli.database)?;
    let log_file = log_file_path(&config.path, cli.log_dir.as_deref());
    init_logging(&log_file, cli.verbose)?;

    let db = Databased::new(config).map_err(|e| format!("Failed to open database: {e}"))?;
    let mut session = Session {
        db,
        format: cli.format,
        log_file,
    };

    match cli.command {
        Command::Shell => run_shell(&mut session)?,
        command => {
            let result = run_command(&mut session, command);
            settle(&mut session.db, result)?;
        }
    }
    session
        .db
        .close()
        .map_err(|e| format!("Failed to close database: {e}"))
}

/// Commits after a successful command when commit-on-close is set; rolls
/// back after a failed one so partial work is not kept.
fn settle(db: &mut Databased, result: Result<(), String>) -> Result<(), String> {
    match result {
        Ok(()) => {
            if db.commit_on_close() && db.in_transaction() {
                db.commit().map_err(|e| format!("Commit failed: {e}"))?;
            }
            Ok(())
        }
        Err(err) => {
            if let Err(rollback) = db.rollback() {
                tracing::warn!(error = %rollback, "rollback after failed command failed");
            }
            Err(err)
        }
    }
}

fn run_command(session: &mut Session, command: Command) -> Result<(), String> {
    match command {
        Command::Query(args) => run_query(session, args),
        Command::Select(args) => run_select(session, args),
        Command::Insert(args) => run_insert(session, args),
        Command::Update(args) => run_update(session, args),
        Command::Delete(args) => run_delete(session, args),
        Command::Count(args) => run_count(session, args),
        Command::Find(args) => run_find(session, args),
        Command::AddTable(args) => run_add_table(session, args),
        Command::DropTable(args) => run_drop_table(session, args),
        Command::AddColumn(args) => run_add_column(session, args),
        Command::DropColumn(args) => run_drop_column(session, args),
        Command::RenameTable(args) => run_rename_table(session, args),
        Command::RenameColumn(args) => run_rename_column(session, args),
        Command::Describe(args) => run_describe(session, args),
        Command::Tables => run_list(session, "table"),
        Command::Views => run_list(session, "view"),
        Command::Indices => run_list(session, "index"),
        Command::Schema(args) => run_schema(session, args),
        Command::Dump(args) => run_dump(session, args),
        Command::Script(args) => run_script(session, args),
        Command::Vacuum => run_vacuum(session),
        Command::Backup(args) => run_backup(session, args),
        Command::Restore(args) => run_restore(session, args),
        Command::FlushLog => run_flush_log(session),
        Command::Properties => run_properties(session),
        Command::Shell => Err("Already in a shell session".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Data commands
// ---------------------------------------------------------------------------

fn run_query(session: &mut Session, args: QueryArgs) -> Result<(), String> {
    let params: Vec<Value> = args.params.iter().map(|p| parse_value(p)).collect();
    let rows = session
        .db
        .query(&args.sql, &params)
        .map_err(|e| format!("Query failed: {e}"))?;
    session.print_rows(&rows)?;
    session.status(format!("{} affected rows", session.db.affected_rows()));
    Ok(())
}

fn run_select(session: &mut Session, args: SelectArgs) -> Result<(), String> {
    let mut select = Select::new();
    if !args.columns.is_empty() {
        select = select.with_columns(args.columns);
    }
    if !args.exclude_columns.is_empty() {
        select = select.with_exclude_columns(args.exclude_columns);
    }
    for join in args.joins {
        select = select.with_join(join);
    }
    if let Some(filter) = args.filter {
        select = select.with_filter(filter);
    }
    if let Some(group_by) = args.group_by {
        select = select.with_group_by(group_by);
    }
    if let Some(having) = args.having {
        select = select.with_having(having);
    }
    if let Some(order_by) = args.order_by {
        select = select.with_order_by(order_by);
    }
    if let Some(limit) = args.limit {
        select = select.with_limit(limit);
    }

    let rows = session
        .db
        .select(&args.table, &select)
        .map_err(|e| format!("Select failed: {e}"))?;
    session.print_rows(&rows)?;
    session.status(format!("{} rows from {}", rows.len(), args.table));
    Ok(())
}

fn run_insert(session: &mut Session, args: InsertArgs) -> Result<(), String> {
    let columns = if args.columns.is_empty() {
        session
            .db
            .get_columns(&args.table)
            .map_err(|e| format!("Failed to read columns of '{}': {e}", args.table))?
    } else {
        args.columns
    };
    if columns.is_empty() {
        return Err(format!("Table '{}' does not exist", args.table));
    }
    if args.values.len() % columns.len() != 0 {
        return Err(format!(
            "{} values do not divide into rows of {} columns",
            args.values.len(),
            columns.len()
        ));
    }

    let rows: Vec<Vec<Value>> = args
        .values
        .chunks(columns.len())
        .map(|chunk| chunk.iter().map(|v| parse_value(v)).collect())
        .collect();
    let inserted = session
        .db
        .insert(&args.table, &columns, &rows)
        .map_err(|e| format!("Insert failed: {e}"))?;
    session.status(format!("Inserted {inserted} rows into {}.", args.table));
    Ok(())
}

fn run_update(session: &mut Session, args: UpdateArgs) -> Result<(), String> {
    let updated = session
        .db
        .update(
            &args.table,
            &args.column,
            parse_value(&args.value),
            args.filter.as_deref(),
        )
        .map_err(|e| format!("Update failed: {e}"))?;
    session.status(format!("Updated {updated} rows in {}.", args.table));
    Ok(())
}

fn run_delete(session: &mut Session, args: DeleteArgs) -> Result<(), String> {
    let deleted = session
        .db
        .delete(&args.table, args.filter.as_deref())
        .map_err(|e| format!("Delete failed: {e}"))?;
    session.status(format!("Deleted {deleted} rows from {}.", args.table));
    Ok(())
}

fn run_count(session: &mut Session, args: CountArgs) -> Result<(), String> {
    let count = session
        .db
        .count(&args.table, &args.column, args.filter.as_deref(), args.distinct)
        .map_err(|e| format!("Count failed: {e}"))?;

    let mut row = Row::new();
    row.insert("table", args.table);
    row.insert("column", args.column);
    row.insert("distinct", args.distinct);
    row.insert("where", args.filter);
    row.insert("count", count as i64);
    session.print_rows(&[row])
}

fn run_find(session: &mut Session, args: FindArgs) -> Result<(), String> {
    let columns: Vec<&str> = args.columns.iter().map(String::as_str).collect();
    let columns = (!columns.is_empty()).then_some(columns.as_slice());
    let rows = session
        .db
        .find(&args.table, &args.needle, columns)
        .map_err(|e| format!("Find failed: {e}"))?;
    session.print_rows(&rows)?;
    session.status(format!("{} rows from {} contain '{}'", rows.len(), args.table, args.needle));
    Ok(())
}

// ---------------------------------------------------------------------------
// Schema commands
// ---------------------------------------------------------------------------

fn run_add_table(session: &mut Session, args: AddTableArgs) -> Result<(), String> {
    session
        .db
        .create_table(&args.table, &args.columns)
        .map_err(|e| format!("Failed to create table '{}': {e}", args.table))?;
    session.status(format!("Table '{}' is ready.", args.table));
    Ok(())
}

fn run_drop_table(session: &mut Session, args: DropTableArgs) -> Result<(), String> {
    let dropped = session
        .db
        .drop_table(&args.table)
        .map_err(|e| format!("Failed to drop table '{}': {e}", args.table))?;
    if dropped {
        session.status(format!("Dropped table '{}'.", args.table));
    } else {
        session.status(format!("Table '{}' was not dropped; see the log.", args.table));
    }
    Ok(())
}

fn run_add_column(session: &mut Session, args: AddColumnArgs) -> Result<(), String> {
    session
        .db
        .add_column(&args.table, &args.column_def)
        .map_err(|e| format!("Failed to add column to '{}': {e}", args.table))?;
    session.status(format!("Added column to '{}'.", args.table));
    Ok(())
}

fn run_drop_column(session: &mut Session, args: DropColumnArgs) -> Result<(), String> {
    session
        .db
        .drop_column(&args.table, &args.column)
        .map_err(|e| format!("Failed to drop column '{}': {e}", args.column))?;
    session.status(format!("Dropped column '{}' from '{}'.", args.column, args.table));
    Ok(())
}

fn run_rename_table(session: &mut Session, args: RenameTableArgs) -> Result<(), String> {
    session
        .db
        .rename_table(&args.table, &args.new_name)
        .map_err(|e| format!("Failed to rename table '{}': {e}", args.table))?;
    session.status(format!("Renamed '{}' to '{}'.", args.table, args.new_name));
    Ok(())
}

fn run_rename_column(session: &mut Session, args: RenameColumnArgs) -> Result<(), String> {
    session
        .db
        .rename_column(&args.table, &args.column, &args.new_name)
        .map_err(|e| format!("Failed to rename column '{}': {e}", args.column))?;
    session.status(format!(
        "Renamed '{}.{}' to '{}'.",
        args.table, args.column, args.new_name
    ));
    Ok(())
}

fn run_describe(session: &mut Session, args: DescribeArgs) -> Result<(), String> {
    let tables = if args.tables.is_empty() {
        let mut all = list_names(session, "table")?;
        all.extend(list_names(session, "view")?);
        all
    } else {
        args.tables
    };

    let mut rows = Vec::new();
    for table in &tables {
        let columns = session
            .db
            .describe(table)
            .map_err(|e| format!("Failed to describe '{table}': {e}"))?;
        if columns.is_empty() {
            return Err(format!("No table or view named '{table}'"));
        }
        rows.extend(columns.iter().map(|column| column_row(table, column)));
    }
    session.print_rows(&rows)
}

fn run_list(session: &mut Session, kind: &str) -> Result<(), String> {
    let rows: Vec<Row> = list_names(session, kind)?
        .into_iter()
        .map(|name| Row::from_iter([("name", name)]))
        .collect();
    session.print_rows(&rows)
}

fn run_schema(session: &mut Session, args: SchemaArgs) -> Result<(), String> {
    let mut rows = Vec::new();
    for kind in ["table", "view"] {
        for name in list_names(session, kind)? {
            let columns = session
                .db
                .get_columns(&name)
                .map_err(|e| format!("Failed to read columns of '{name}': {e}"))?;
            let mut row = Row::new();
            row.insert("kind", kind);
            row.insert("name", name.as_str());
            row.insert("columns", columns.join(", "));
            if args.counts {
                let count = session
                    .db
                    .count_rows(&name)
                    .map_err(|e| format!("Failed to count '{name}': {e}"))?;
                row.insert("rows", count as i64);
            }
            rows.push(row);
        }
    }
    session.print_rows(&rows)
}

fn list_names(session: &mut Session, kind: &str) -> Result<Vec<String>, String> {
    let names = match kind {
        "view" => session.db.list_views(),
        "index" => session.db.list_indices(),
        _ => session.db.list_tables(),
    };
    names.map_err(|e| format!("Failed to list {kind} names: {e}"))
}

fn column_row(table: &str, column: &ColumnInfo) -> Row {
    let mut row = Row::new();
    row.insert("table", table);
    row.insert("position", column.position);
    row.insert("name", column.name.as_str());
    row.insert("type", column.declared_type.as_str());
    row.insert("not_null", column.not_null);
    row.insert("default", column.default_value.clone());
    row.insert("primary_key", column.primary_key);
    row
}

// ---------------------------------------------------------------------------
// File commands
// ---------------------------------------------------------------------------

fn run_dump(session: &mut Session, args: DumpArgs) -> Result<(), String> {
    fs::create_dir_all(&args.output_dir).map_err(|e| {
        format!(
            "Failed to create output directory '{}': {e}",
            args.output_dir.display()
        )
    })?;
    let stamp = Local::now().format(FILE_TIMESTAMP_FORMAT).to_string();
    let name = session.db.name();
    let tables: Vec<&str> = args.tables.iter().map(String::as_str).collect();
    let tables = (!tables.is_empty()).then_some(tables.as_slice());

    if !args.data_only {
        let path = dump_file_path(&args.output_dir, &name, "schema", &stamp);
        session
            .db
            .dump_schema(&path, tables)
            .map_err(|e| format!("Schema dump failed: {e}"))?;
        session.status(format!("Schema written to {}", path.display()));
    }
    if !args.schema_only {
        let path = dump_file_path(&args.output_dir, &name, "data", &stamp);
        session
            .db
            .dump_data(&path, tables)
            .map_err(|e| format!("Data dump failed: {e}"))?;
        session.status(format!("Data written to {}", path.display()));
    }
    Ok(())
}

fn run_script(session: &mut Session, args: ScriptArgs) -> Result<(), String> {
    session
        .db
        .execute_script(&args.path)
        .map_err(|e| format!("Script '{}' failed: {e}", args.path.display()))?;
    session.status(format!("Executed {}", args.path.display()));
    Ok(())
}

fn run_vacuum(session: &mut Session) -> Result<(), String> {
    session
        .db
        .connect()
        .map_err(|e| format!("Failed to open database: {e}"))?;
    let before = file_size(session.db.path())?;
    let freed = session
        .db
        .vacuum()
        .map_err(|e| format!("Vacuum failed: {e}"))?;
    let after = file_size(session.db.path())?;
    session.status(format!("Size before vacuuming: {}", format_bytes(before)));
    session.status(format!("Size after vacuuming: {}", format_bytes(after)));
    session.status(format!("Freed {}", format_bytes(freed)));
    Ok(())
}

fn run_backup(session: &mut Session, args: BackupArgs) -> Result<(), String> {
    session
        .db
        .close()
        .map_err(|e| format!("Failed to close database before backup: {e}"))?;
    let stamp = args
        .timestamp
        .then(|| Local::now().format(FILE_TIMESTAMP_FORMAT).to_string());
    let source = session.db.path().to_path_buf();
    let target = backup_path(&source, stamp.as_deref());
    fs::copy(&source, &target).map_err(|e| {
        format!(
            "Failed to copy '{}' to '{}': {e}",
            source.display(),
            target.display()
        )
    })?;
    tracing::info!(backup = %target.display(), "created backup");
    session.status(format!("Backup written to {}", target.display()));
    Ok(())
}

fn run_restore(session: &mut Session, args: RestoreArgs) -> Result<(), String> {
    if !args.backup.is_file() {
        return Err(format!("Backup file '{}' does not exist", args.backup.display()));
    }
    session
        .db
        .close()
        .map_err(|e| format!("Failed to close database before restore: {e}"))?;
    let target = session.db.path().to_path_buf();
    fs::copy(&args.backup, &target).map_err(|e| {
        format!(
            "Failed to copy '{}' to '{}': {e}",
            args.backup.display(),
            target.display()
        )
    })?;
    tracing::info!(backup = %args.backup.display(), "restored database");
    session.status(format!("Restored {} from {}", target.display(), args.backup.display()));
    Ok(())
}

fn run_flush_log(session: &mut Session) -> Result<(), String> {
    if !session.log_file.exists() {
        session.status(format!("No log file at {}", session.log_file.display()));
        return Ok(());
    }
    fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(&session.log_file)
        .map_err(|e| format!("Failed to flush '{}': {e}", session.log_file.display()))?;
    session.status(format!("Flushed {}", session.log_file.display()));
    Ok(())
}

fn run_properties(session: &mut Session) -> Result<(), String> {
    let text = match session.format {
        OutputFormat::Grid => serde_yaml::to_string(session.db.config())
            .map_err(|e| format!("Failed to render properties: {e}"))?,
        OutputFormat::Json => serde_json::to_string_pretty(session.db.config())
            .map_err(|e| format!("Failed to render properties: {e}"))?,
    };
    println!("{}", text.trim_end());
    Ok(())
}

// ---------------------------------------------------------------------------
// Shell
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Quit,
}

fn run_shell(session: &mut Session) -> Result<(), String> {
    session.status(format!(
        "dbshell {PACKAGE_VERSION} on {}. Type 'help' for commands.",
        session.db.path().display()
    ));
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stdout = io::stdout();
    loop {
        print!("{}> ", session.db.name());
        stdout
            .flush()
            .map_err(|e| format!("Failed to write prompt: {e}"))?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line.map_err(|e| format!("Failed to read input: {e}"))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match run_shell_line(session, line) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(err) => eprintln!("error: {err}"),
        }
    }
    Ok(())
}

fn run_shell_line(session: &mut Session, line: &str) -> Result<Flow, String> {
    let tokens = split_line(line)?;
    let Some(first) = tokens.first() else {
        return Ok(Flow::Continue);
    };
    if first != "help" && ShellLine::command().find_subcommand(first).is_none() {
        let result = run_query(
            session,
            QueryArgs {
                sql: line.to_string(),
                params: Vec::new(),
            },
        );
        settle(&mut session.db, result)?;
        return Ok(Flow::Continue);
    }

    let parsed = match ShellLine::try_parse_from(&tokens) {
        Ok(parsed) => parsed,
        Err(err) if err.kind() == ErrorKind::DisplayHelp => {
            print!("{err}");
            return Ok(Flow::Continue);
        }
        Err(err) => return Err(err.to_string().trim_end().to_string()),
    };

    match parsed.command {
        ShellCommand::Database(command) => {
            let result = run_command(session, command);
            settle(&mut session.db, result)?;
        }
        ShellCommand::Commit => session
            .db
            .commit()
            .map_err(|e| format!("Commit failed: {e}"))?,
        ShellCommand::Rollback => session
            .db
            .rollback()
            .map_err(|e| format!("Rollback failed: {e}"))?,
        ShellCommand::SetTimeout { seconds } => {
            let timeout = Duration::try_from_secs_f64(seconds)
                .map_err(|e| format!("Invalid timeout '{seconds}': {e}"))?;
            session
                .db
                .set_timeout(timeout)
                .map_err(|e| format!("Invalid timeout '{seconds}': {e}"))?;
            reconnect_later(session)?;
        }
        ShellCommand::SetDetectTypes { enabled } => {
            session.db.set_detect_types(enabled);
            reconnect_later(session)?;
        }
        ShellCommand::SetForeignKeys { enabled } => session
            .db
            .set_enforce_foreign_keys(enabled)
            .map_err(|e| format!("Failed to set foreign keys: {e}"))?,
        ShellCommand::SetCommitOnClose { enabled } => session.db.set_commit_on_close(enabled),
        ShellCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

/// Closes the connection so options read at connect time apply to the
/// next command.
fn reconnect_later(session: &mut Session) -> Result<(), String> {
    session
        .db
        .close()
        .map_err(|e| format!("Failed to close database: {e}"))
}

/// Splits a shell line into words. Single or double quotes group words and
/// are removed; quotes of the other kind inside them are kept.
fn split_line(line: &str) -> Result<Vec<String>, String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if let Some(q) = quote {
        return Err(format!("Unterminated {q} quote"));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Builds the connection options from `--config` and the override flags.
fn resolve_config(args: &DatabaseArgs) -> Result<DatabaseConfig, String> {
    let mut config = match &args.config {
        Some(path) => DatabaseConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => DatabaseConfig::default(),
    };
    if let Some(db) = &args.db {
        config.path = db.clone();
    }
    if config.path.as_os_str().is_empty() {
        return Err("No database given: pass --db or set `path` in the --config file".to_string());
    }
    if let Some(timeout) = args.timeout {
        config.timeout_secs = timeout;
    }
    if args.no_detect_types {
        config.detect_types = false;
    }
    if args.no_foreign_keys {
        config.enforce_foreign_keys = false;
    }
    if args.no_commit_on_close {
        config.commit_on_close = false;
    }
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

/// `<dir>/<db file name without dots>.log`, next to the database unless a
/// log directory is given.
fn log_file_path(db_path: &Path, log_dir: Option<&Path>) -> PathBuf {
    let stem = db_path
        .file_name()
        .map(|name| name.to_string_lossy().replace('.', ""))
        .unwrap_or_else(|| "databased".to_string());
    let dir = match log_dir {
        Some(dir) => dir.to_path_buf(),
        None => db_path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(format!("{stem}.log"))
}

fn init_logging(log_file: &Path, verbose: bool) -> Result<(), String> {
    if let Some(parent) = log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create log directory '{}': {e}", parent.display()))?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| format!("Failed to open log file '{}': {e}", log_file.display()))?;
    let file = Mutex::new(file);

    let (writer, level) = if verbose {
        (BoxMakeWriter::new(file.and(io::stderr)), Level::DEBUG)
    } else {
        (BoxMakeWriter::new(file), Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_max_level(level)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {e}"))
}

/// Reads a command-line value: `NULL`, integers, and decimals become typed
/// cells; everything else is text. Numbers with leading zeros stay text.
fn parse_value(raw: &str) -> Value {
    if raw.eq_ignore_ascii_case("null") {
        return Value::Null;
    }
    let digits = raw.trim_start_matches(['-', '+']);
    if digits.len() > 1 && digits.starts_with('0') && !digits.starts_with("0.") {
        return Value::from(raw);
    }
    if let Ok(v) = raw.parse::<i64>() {
        return Value::Integer(v);
    }
    let numeric = raw.starts_with(|c: char| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    match raw.parse::<f64>() {
        Ok(v) if numeric && v.is_finite() => Value::Real(v),
        _ => Value::from(raw),
    }
}

fn dump_file_path(dir: &Path, name: &str, kind: &str, stamp: &str) -> PathBuf {
    dir.join(format!("{name}_{kind}_{stamp}.sql"))
}

/// `<stem>_backup[_<stamp>].<ext>` beside the database file.
fn backup_path(db_path: &Path, stamp: Option<&str>) -> PathBuf {
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}_backup");
    if let Some(stamp) = stamp {
        name.push('_');
        name.push_str(stamp);
    }
    if let Some(ext) = db_path.extension() {
        name.push('.');
        name.push_str(&ext.to_string_lossy());
    }
    db_path.with_file_name(name)
}

fn file_size(path: &Path) -> Result<u64, String> {
    fs::metadata(path)
        .map(|meta| meta.len())
        .map_err(|e| format!("Failed to stat '{}': {e}", path.display()))
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut size = bytes as f64 / 1024.0;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.2} {}", UNITS[unit])
}

/// Renders rows as a boxed text grid. Columns are taken in first-seen
/// order across all rows.
fn render_grid(rows: &[Row]) -> String {
    let mut headers: Vec<&str> = Vec::new();
    for row in rows {
        for column in row.columns() {
            if !headers.contains(&column) {
                headers.push(column);
            }
        }
    }
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            headers
                .iter()
                .map(|h| row.get(h).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let border = {
        let parts: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
        format!("+{}+\n", parts.join("+"))
    };

    let mut out = String::new();
    out.push_str(&border);
    out.push_str(&grid_line(headers.iter().copied(), &widths));
    out.push_str(&border);
    for row in &cells {
        out.push_str(&grid_line(row.iter().map(String::as_str), &widths));
    }
    out.push_str(&border);
    out
}

fn grid_line<'a>(values: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let parts: Vec<String> = values
        .zip(widths)
        .map(|(v, w)| format!(" {v}{} ", " ".repeat(w - v.chars().count())))
        .collect();
    format!("|{}|\n", parts.join("|"))
}

fn cell_text(value: &Value) -> String {
    let text = match value {
        Value::Null => String::new(),
        other => other.to_string().replace('\n', "\\n"),
    };
    if text.chars().count() > MAX_CELL_WIDTH {
        let cut: String = text.chars().take(MAX_CELL_WIDTH - 3).collect();
        format!("{cut}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definitions_are_consistent() {
        Cli::command().debug_assert();
        ShellLine::command().debug_assert();
    }

    #[test]
    fn test_split_line_handles_quotes() {
        assert_eq!(
            split_line(r#"update cereals brand "Big Gravy" -w "brand = 'Dr. Wheat'""#).unwrap(),
            vec!["update", "cereals", "brand", "Big Gravy", "-w", "brand = 'Dr. Wheat'"]
        );
        assert_eq!(split_line("  a   b ").unwrap(), vec!["a", "b"]);
        assert_eq!(split_line(r#"x "" y"#).unwrap(), vec!["x", "", "y"]);
        assert!(split_line(r#"select "open"#).is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("NULL"), Value::Null);
        assert_eq!(parse_value("42"), Value::Integer(42));
        assert_eq!(parse_value("-7"), Value::Integer(-7));
        assert_eq!(parse_value("2.5"), Value::Real(2.5));
        assert_eq!(parse_value("007"), Value::from("007"));
        assert_eq!(parse_value("0.5"), Value::Real(0.5));
        assert_eq!(parse_value("inf"), Value::from("inf"));
        assert_eq!(parse_value("Dr. Wheat"), Value::from("Dr. Wheat"));
    }

    #[test]
    fn test_log_file_path() {
        assert_eq!(
            log_file_path(Path::new("data/cereals.db"), None),
            PathBuf::from("data/cerealsdb.log")
        );
        assert_eq!(
            log_file_path(Path::new("cereals.db"), Some(Path::new("logs"))),
            PathBuf::from("logs/cerealsdb.log")
        );
    }

    #[test]
    fn test_output_file_names() {
        assert_eq!(
            backup_path(Path::new("data/cereals.db"), None),
            PathBuf::from("data/cereals_backup.db")
        );
        assert_eq!(
            backup_path(Path::new("cereals.db"), Some("01_02_2024_03_04_05")),
            PathBuf::from("cereals_backup_01_02_2024_03_04_05.db")
        );
        assert_eq!(
            dump_file_path(Path::new("out"), "cereals", "schema", "01_02_2024_03_04_05"),
            PathBuf::from("out/cereals_schema_01_02_2024_03_04_05.sql")
        );
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MiB");
    }

    #[test]
    fn test_render_grid() {
        let rows = vec![
            Row::from_iter([("id", Value::from(1)), ("name", Value::from("Bob"))]),
            Row::from_iter([("id", Value::from(22)), ("name", Value::Null)]),
        ];
        assert_eq!(
            render_grid(&rows),
            "+----+------+\n\
             | id | name |\n\
             +----+------+\n\
             | 1  | Bob  |\n\
             | 22 |      |\n\
             +----+------+\n"
        );
    }

    #[test]
    fn test_long_cells_are_cut() {
        let text = cell_text(&Value::from("x".repeat(100)));
        assert_eq!(text.chars().count(), MAX_CELL_WIDTH);
        assert!(text.ends_with("..."));
    }
}
