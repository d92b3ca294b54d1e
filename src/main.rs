use clap::{Parser, Subcommand};
use prettytable::{Cell, Row, Table};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{error, info, warn};

use heapdb::{
    ColumnDef, DataType, Database, DbConfig, DbError, DbResult, Record, TableId, Value, logging,
};

const CONFIG_FILE: &str = "config.json";

#[derive(Parser)]
#[command(name = "heapdb", about = "Heap-file storage engine with a locking buffer pool")]
struct Cli {
    /// Database directory
    #[arg(long, default_value = "heapdb-data")]
    dir: PathBuf,

    /// JSON config file; defaults to config.json in the database directory
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    pool_pages: Option<usize>,

    #[arg(long)]
    page_size: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database directory and save its config
    Init,
    /// List tables
    Tables,
    /// Create a table from `name:type[:notnull]` column specs, e.g. `id:int:notnull name:char(16)`
    CreateTable {
        name: String,
        #[arg(required = true)]
        columns: Vec<String>,
    },
    /// Insert one row; `null` stands for NULL
    Insert {
        table: String,
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Print every row of a table
    Scan { table: String },
    /// Run concurrent inserting transactions and check the final row count
    Workload {
        #[arg(long, default_value = "workload")]
        table: String,
        #[arg(long, default_value_t = 4)]
        threads: usize,
        #[arg(long, default_value_t = 25)]
        txns: usize,
        #[arg(long, default_value_t = 10)]
        rows: usize,
        /// Deliberately abort every k-th transaction (0 disables)
        #[arg(long, default_value_t = 5)]
        abort_every: usize,
        /// Attempts per transaction before giving up on retriable errors
        #[arg(long, default_value_t = 10)]
        attempts: usize,
    },
}

fn main() -> ExitCode {
    logging::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> DbResult<DbConfig> {
    let stored = cli.dir.join(CONFIG_FILE);
    let mut config = match &cli.config {
        Some(path) => DbConfig::load(path)?,
        None if stored.exists() => DbConfig::load(&stored)?,
        None => DbConfig::default(),
    };
    if let Some(pool_pages) = cli.pool_pages {
        config.pool_pages = pool_pages;
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> DbResult<()> {
    let config = load_config(&cli)?;
    let db = Database::open(&cli.dir, config)?;

    match cli.command {
        Command::Init => save_config(&db)?,
        Command::Tables => list_tables(&db),
        Command::CreateTable { name, columns } => {
            let columns = columns
                .iter()
                .map(|spec| parse_column(spec))
                .collect::<DbResult<Vec<_>>>()?;
            let id = db.create_table(&name, columns)?;
            println!("created table {name} ({id})");
        }
        Command::Insert { table, values } => {
            let table = db.table_id(&table)?;
            let values = db.schema(table)?.parse_values(&values)?;
            let rid = db.run(3, |txn| txn.insert(table, values.clone()))?;
            println!("inserted at {}:{}", rid.page_id, rid.slot_id);
        }
        Command::Scan { table } => scan(&db, &table)?,
        Command::Workload {
            table,
            threads,
            txns,
            rows,
            abort_every,
            attempts,
        } => {
            let spec = WorkloadSpec {
                threads,
                txns,
                rows,
                abort_every,
                attempts,
            };
            workload(&db, &table, &spec)?;
        }
    }

    db.close()
}

fn save_config(db: &Database) -> DbResult<()> {
    let path = db.dir().join(CONFIG_FILE);
    if path.exists() {
        warn!(path = %path.display(), "config already exists, leaving it untouched");
        return Ok(());
    }
    std::fs::write(&path, serde_json::to_string_pretty(db.config())?)?;
    println!("initialized {}", db.dir().display());
    Ok(())
}

/// `name:type` or `name:type:notnull`
fn parse_column(spec: &str) -> DbResult<ColumnDef> {
    let mut parts = spec.split(':');
    let (Some(name), Some(ty)) = (parts.next(), parts.next()) else {
        return Err(DbError::Catalog(format!("bad column spec {spec:?}")));
    };
    let data_type = DataType::parse(ty)
        .ok_or_else(|| DbError::Catalog(format!("unknown column type {ty:?}")))?;
    let not_null = match parts.next() {
        None => false,
        Some(flag) if flag.eq_ignore_ascii_case("notnull") => true,
        Some(flag) => return Err(DbError::Catalog(format!("unknown column flag {flag:?}"))),
    };
    Ok(ColumnDef::new(name, data_type, not_null))
}

fn list_tables(db: &Database) {
    let mut out = Table::new();
    out.set_titles(Row::new(vec![
        Cell::new("id"),
        Cell::new("name"),
        Cell::new("columns"),
    ]));
    for table in db.catalog().tables() {
        let columns = table
            .columns
            .iter()
            .map(|c| {
                let not_null = if c.not_null { " NOT NULL" } else { "" };
                format!("{} {:?}{not_null}", c.name, c.data_type)
            })
            .collect::<Vec<_>>()
            .join(", ");
        out.add_row(Row::new(vec![
            Cell::new(&table.id.to_string()),
            Cell::new(&table.name),
            Cell::new(&columns),
        ]));
    }
    out.printstd();
}

fn scan(db: &Database, name: &str) -> DbResult<()> {
    let table = db.table_id(name)?;
    let schema = db.schema(table)?;

    let txn = db.begin();
    let records = txn.scan(table)?.collect::<DbResult<Vec<Record>>>()?;
    txn.commit()?;

    let mut out = Table::new();
    let mut titles = vec![Cell::new("rid")];
    titles.extend(schema.columns().iter().map(|c| Cell::new(&c.name)));
    out.set_titles(Row::new(titles));

    for record in &records {
        let rid = record
            .record_id()
            .map(|rid| format!("{}:{}", rid.page_id, rid.slot_id))
            .unwrap_or_default();
        let mut cells = vec![Cell::new(&rid)];
        cells.extend(record.values().iter().map(|v| Cell::new(&v.to_string())));
        out.add_row(Row::new(cells));
    }
    out.printstd();
    println!("{} row(s)", records.len());
    Ok(())
}

struct WorkloadSpec {
    threads: usize,
    txns: usize,
    rows: usize,
    abort_every: usize,
    attempts: usize,
}

#[derive(Default)]
struct WorkloadStats {
    committed: AtomicUsize,
    aborted: AtomicUsize,
    retried: AtomicUsize,
    failed: AtomicUsize,
}

fn count_rows(db: &Database, table: TableId) -> DbResult<usize> {
    db.run(10, |txn| {
        let mut count = 0;
        for record in txn.scan(table)? {
            record?;
            count += 1;
        }
        Ok(count)
    })
}

fn workload(db: &Database, name: &str, spec: &WorkloadSpec) -> DbResult<()> {
    let table = match db.table_id(name) {
        Ok(id) => id,
        Err(DbError::TableNotFound(_)) => db.create_table(
            name,
            vec![
                ColumnDef::new("worker", DataType::Int, true),
                ColumnDef::new("txn", DataType::Int, true),
                ColumnDef::new("seq", DataType::Int, true),
            ],
        )?,
        Err(e) => return Err(e),
    };

    let before = count_rows(db, table)?;
    let stats = WorkloadStats::default();
    let start = Instant::now();

    thread::scope(|s| {
        for worker in 0..spec.threads {
            let stats = &stats;
            s.spawn(move || run_worker(db, table, worker, spec, stats));
        }
    });

    let committed = stats.committed.load(Ordering::Relaxed);
    let after = count_rows(db, table)?;
    let expected = before + committed * spec.rows;

    info!(elapsed = ?start.elapsed(), "workload finished");
    println!(
        "committed {committed}, aborted {}, retried {}, failed {}",
        stats.aborted.load(Ordering::Relaxed),
        stats.retried.load(Ordering::Relaxed),
        stats.failed.load(Ordering::Relaxed),
    );
    println!("rows: {after} (expected {expected})");

    if after != expected {
        return Err(DbError::Catalog(format!(
            "row count mismatch: found {after}, expected {expected}"
        )));
    }
    Ok(())
}

fn run_worker(
    db: &Database,
    table: TableId,
    worker: usize,
    spec: &WorkloadSpec,
    stats: &WorkloadStats,
) {
    for n in 0..spec.txns {
        let deliberate_abort =
            spec.abort_every > 0 && (worker * spec.txns + n + 1) % spec.abort_every == 0;

        for attempt in 1..=spec.attempts.max(1) {
            let txn = db.begin();
            let result = (0..spec.rows).try_for_each(|seq| {
                txn.insert(
                    table,
                    vec![
                        Value::Int(worker as i32),
                        Value::Int(n as i32),
                        Value::Int(seq as i32),
                    ],
                )
                .map(|_| ())
            });

            let outcome = match result {
                Ok(()) if deliberate_abort => txn.abort().map(|()| false),
                Ok(()) => txn.commit().map(|()| true),
                Err(e) => {
                    drop(txn);
                    Err(e)
                }
            };

            match outcome {
                Ok(true) => {
                    stats.committed.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Ok(false) => {
                    stats.aborted.fetch_add(1, Ordering::Relaxed);
                    break;
                }
                Err(e) if e.is_retriable() && attempt < spec.attempts => {
                    stats.retried.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(worker, txn = n, error = %e, "giving up on transaction");
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }
        }
    }
}
