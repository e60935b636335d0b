//! pagedb command line tool: build, dump and aggregate heap files.

use anyhow::{bail, Context, Result};
use clap::{Parser as ClapParser, Subcommand};
use log::info;
use pagedb::access::{DataType, Schema, Tuple};
use pagedb::executor::{
    collect_tuples, AggregateExecutor, AggregateFunction, Executor, SeqScanExecutor,
};
use pagedb::storage::{BufferPoolManager, HeapFile, HeapPage, PageId};
use pagedb::transaction::TransactionId;
use pagedb::{DbConfig, DbError};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// pagedb - heap file storage and query execution
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Page size in bytes
    #[arg(long, default_value_t = pagedb::config::DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Number of pages the buffer pool may cache
    #[arg(long, default_value_t = pagedb::config::DEFAULT_POOL_PAGES)]
    pool_pages: usize,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a comma-separated text file into a heap file
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Column types, e.g. "int,string,int"
        #[arg(long)]
        types: String,
    },
    /// Print every tuple of a heap file
    Print {
        file: PathBuf,
        #[arg(long)]
        types: String,
    },
    /// Aggregate one column of a heap file
    Aggregate {
        file: PathBuf,
        #[arg(long)]
        types: String,
        /// Column to aggregate
        #[arg(long)]
        field: usize,
        /// count, sum, avg, min or max
        #[arg(long)]
        op: String,
        /// Column to group by
        #[arg(long)]
        group_by: Option<usize>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = DbConfig::new()
        .with_page_size(args.page_size)
        .with_pool_pages(args.pool_pages);

    match args.command {
        Command::Convert {
            input,
            output,
            types,
        } => convert(&input, &output, &parse_schema(&types)?, &config),
        Command::Print { file, types } => print(&file, parse_schema(&types)?, &config),
        Command::Aggregate {
            file,
            types,
            field,
            op,
            group_by,
        } => aggregate(
            &file,
            parse_schema(&types)?,
            field,
            AggregateFunction::from_name(&op)?,
            group_by,
            &config,
        ),
    }
}

fn parse_schema(types: &str) -> Result<Arc<Schema>> {
    let types = types
        .split(',')
        .map(DataType::from_name)
        .collect::<pagedb::Result<Vec<_>>>()?;
    if types.is_empty() {
        bail!("at least one column type is required");
    }
    Ok(Arc::new(Schema::from_types(&types)))
}

/// Pack the input lines into pages in order and write them out directly.
fn convert(input: &Path, output: &Path, schema: &Arc<Schema>, config: &DbConfig) -> Result<()> {
    let reader = BufReader::new(
        File::open(input).with_context(|| format!("Failed to open input: {:?}", input))?,
    );
    let file = HeapFile::create(output, Arc::clone(schema), config)
        .with_context(|| format!("Failed to create heap file: {:?}", output))?;

    let mut page_no = 0;
    let mut page = HeapPage::empty(
        PageId::new(file.id(), page_no),
        Arc::clone(schema),
        config.page_size,
    )?;
    let mut count = 0usize;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != schema.len() {
            bail!(
                "line {}: expected {} fields, found {}",
                line_no + 1,
                schema.len(),
                fields.len()
            );
        }
        let values = fields
            .iter()
            .zip(schema.types())
            .map(|(text, data_type)| data_type.parse_text(text))
            .collect::<pagedb::Result<Vec<_>>>()
            .with_context(|| format!("line {}", line_no + 1))?;
        let mut tuple = Tuple::new(Arc::clone(schema), values)?;

        match page.insert_tuple(&mut tuple) {
            Ok(_) => {}
            Err(DbError::PageFull(_)) => {
                file.write_page(&page)?;
                page_no += 1;
                page = HeapPage::empty(
                    PageId::new(file.id(), page_no),
                    Arc::clone(schema),
                    config.page_size,
                )?;
                page.insert_tuple(&mut tuple)?;
            }
            Err(e) => return Err(e.into()),
        }
        count += 1;
    }

    if count > 0 {
        file.write_page(&page)?;
    }
    info!(
        "wrote {} tuples in {} pages to {}",
        count,
        file.num_pages()?,
        output.display()
    );
    Ok(())
}

fn open_table(
    path: &Path,
    schema: Arc<Schema>,
    config: &DbConfig,
) -> Result<(BufferPoolManager, Arc<HeapFile>)> {
    if !path.exists() {
        bail!("heap file not found: {:?}", path);
    }
    let file = Arc::new(HeapFile::open(path, schema, config)?);
    let pool = BufferPoolManager::new(config);
    pool.register_file(Arc::clone(&file));
    Ok((pool, file))
}

fn print(path: &Path, schema: Arc<Schema>, config: &DbConfig) -> Result<()> {
    let (pool, file) = open_table(path, schema, config)?;
    let tid = TransactionId::fresh();

    let mut scan = SeqScanExecutor::new(&pool, tid, file, "t");
    scan.open()?;
    while scan.has_next()? {
        println!("{}", scan.next()?);
    }
    scan.close();

    pool.transaction_complete(tid, true)?;
    Ok(())
}

fn aggregate(
    path: &Path,
    schema: Arc<Schema>,
    field: usize,
    function: AggregateFunction,
    group_by: Option<usize>,
    config: &DbConfig,
) -> Result<()> {
    let (pool, file) = open_table(path, schema, config)?;
    let tid = TransactionId::fresh();

    let scan = SeqScanExecutor::new(&pool, tid, file, "t");
    let mut agg = AggregateExecutor::new(Box::new(scan), field, group_by, function)?;
    agg.open()?;
    println!("{}", agg.schema());
    for tuple in collect_tuples(&mut agg)? {
        println!("{}", tuple);
    }
    agg.close();

    pool.transaction_complete(tid, true)?;
    Ok(())
}
