// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ppi_toolkit::db::{count_metadata, get_import_runs, get_joined_data};
use ppi_toolkit::{
    align_by_date, category_search, compare_series, compute_changes, default_range, detect_kind,
    export_changes_csv, fuzzy_search, get_group_stats, get_latest_data_date, import_payload,
    keyword_search, latest_changes, parse_windows, reset_database, verify_count, ChangeRecord,
    Config, ImportOutcome, SeriesProvider, SqliteStore, YearMonth, DEFAULT_SEARCH_LIMIT,
};

/// Used when neither --db, PPI_TOOLKIT_DB nor the config file names a database
const FALLBACK_DB_PATH: &str = "ppi_toolkit.db";

/// Log filter when RUST_LOG is unset
const DEFAULT_LOG_FILTER: &str = "info";

#[derive(Parser)]
#[command(name = "ppi-toolkit")]
#[command(about = "Producer Price Index toolkit: import, search and annualized changes", long_about = None)]
struct Cli {
    /// SQLite database file
    #[arg(long, global = true, env = "PPI_TOOLKIT_DB")]
    db: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// User-Agent sent to download.bls.gov (contact e-mail)
    #[arg(long, global = true, env = "PPI_TOOLKIT_USER_AGENT")]
    user_agent: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Download wp.series and wp.data.0.Current from BLS and import them
    Import {
        /// Drop existing metadata and observations first
        #[arg(long)]
        fresh: bool,

        /// Import even when the payload checksum was seen before
        #[arg(long)]
        force: bool,
    },

    /// Import local BLS flat files (kind detected from the header)
    ImportFiles {
        files: Vec<PathBuf>,

        #[arg(long)]
        fresh: bool,

        #[arg(long)]
        force: bool,
    },

    /// Search series titles
    Search {
        query: String,

        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,

        /// Plain substring match instead of fuzzy ranking
        #[arg(long)]
        keyword: bool,
    },

    /// List commodity groups, or the series of one group
    Categories {
        #[arg(long)]
        group: Option<String>,
    },

    /// Show metadata and coverage of a series
    Info {
        series_id: String,

        /// Most recent observations to list
        #[arg(long, default_value_t = 12)]
        recent: usize,
    },

    /// Import history
    Imports,

    /// Annualized changes over a date range
    Changes {
        series_id: String,

        /// First month, YYYY-MM (default: 24 months before --end)
        #[arg(long)]
        start: Option<YearMonth>,

        /// Last month, YYYY-MM (default: latest observation)
        #[arg(long)]
        end: Option<YearMonth>,

        /// Lookback windows in months, e.g. 1,3,6,12
        #[arg(long, value_delimiter = ',')]
        windows: Vec<u32>,

        /// Write the result to a CSV file instead of the terminal
        #[arg(long)]
        csv: Option<PathBuf>,
    },

    /// Annualized changes at the latest observation
    Latest {
        series_id: String,

        /// Snapshot as of this month, YYYY-MM
        #[arg(long)]
        as_of: Option<YearMonth>,

        #[arg(long, value_delimiter = ',')]
        windows: Vec<u32>,
    },

    /// Interactive chart of annualized changes
    Chart {
        series_id: String,

        #[arg(long)]
        start: Option<YearMonth>,

        #[arg(long)]
        end: Option<YearMonth>,

        #[arg(long, value_delimiter = ',')]
        windows: Vec<u32>,

        /// Chart title (default: series title)
        #[arg(long)]
        title: Option<String>,
    },

    /// Compare series rebased to 100 at their first month in range
    Compare {
        #[arg(required = true, num_args = 1..)]
        series_ids: Vec<String>,

        /// First month, YYYY-MM (default: each series' first observation)
        #[arg(long)]
        start: Option<YearMonth>,

        /// Last month, YYYY-MM (default: each series' last observation)
        #[arg(long)]
        end: Option<YearMonth>,

        /// Open an interactive chart instead of printing a table
        #[arg(long)]
        chart: bool,
    },
}

fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Init => run_init(&config)?,
        Commands::Import { fresh, force } => run_import(&config, fresh, force)?,
        Commands::ImportFiles { files, fresh, force } => run_import_files(&config, &files, fresh, force)?,
        Commands::Search { query, limit, keyword } => run_search(&config, &query, limit, keyword)?,
        Commands::Categories { group } => run_categories(&config, group.as_deref())?,
        Commands::Info { series_id, recent } => run_info(&config, &series_id, recent)?,
        Commands::Imports => run_imports(&config)?,
        Commands::Changes { series_id, start, end, windows, csv } => {
            run_changes(&config, &series_id, start, end, &windows, csv)?
        }
        Commands::Latest { series_id, as_of, windows } => run_latest(&config, &series_id, as_of, &windows)?,
        Commands::Chart { series_id, start, end, windows, title } => {
            run_chart_mode(&config, &series_id, start, end, &windows, title)?
        }
        Commands::Compare { series_ids, start, end, chart } => {
            run_compare(&config, &series_ids, start, end, chart)?
        }
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .with_writer(std::io::stderr)
        .init();
}

/// Config file (if any), then CLI flags / env on top
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    if config.db_path.is_none() {
        config.db_path = Some(PathBuf::from(FALLBACK_DB_PATH));
    }
    if let Some(user_agent) = &cli.user_agent {
        config.user_agent = user_agent.clone();
    }

    Ok(config)
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let db_path = config.require_db_path()?;
    SqliteStore::open(db_path).with_context(|| format!("Failed to open database {}", db_path.display()))
}

fn effective_windows(config: &Config, windows: &[u32]) -> Vec<u32> {
    if windows.is_empty() {
        config.windows.clone()
    } else {
        windows.to_vec()
    }
}

/// Fill in omitted bounds from the stored series
fn resolve_range(
    store: &SqliteStore,
    series_id: &str,
    start: Option<YearMonth>,
    end: Option<YearMonth>,
) -> Result<Option<(YearMonth, YearMonth)>> {
    let series = if start.is_some() && end.is_some() {
        Vec::new()
    } else {
        store.get_series_data(series_id)?
    };

    Ok(default_range(&series, start, end)?)
}

fn query_changes(
    store: &SqliteStore,
    series_id: &str,
    start: Option<YearMonth>,
    end: Option<YearMonth>,
    windows: &[u32],
) -> Result<Vec<ChangeRecord>> {
    let (start, end) = match resolve_range(store, series_id, start, end)? {
        Some(range) => range,
        None => return Ok(Vec::new()),
    };

    let records = compute_changes(
        store,
        series_id,
        start.year,
        start.month,
        end.year,
        end.month,
        windows,
    )?;

    Ok(records)
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_init(config: &Config) -> Result<()> {
    println!("🔧 Setting up database...");
    let store = open_store(config)?;
    println!("✓ Database initialized with WAL mode");
    println!("  Series: {}", count_metadata(store.connection())?);
    println!("  Observations: {}", verify_count(store.connection())?);
    Ok(())
}

fn print_import_outcome(label: &str, outcome: &ImportOutcome) {
    let run = outcome.run();
    if outcome.is_unchanged() {
        println!(
            "✓ {} unchanged since {} (run {}), skipped",
            label,
            run.imported_at.format("%Y-%m-%d %H:%M"),
            run.run_id
        );
    } else {
        println!(
            "✓ {}: {} read, {} inserted, {} skipped",
            label, run.rows_read, run.rows_inserted, run.rows_skipped
        );
    }
}

fn print_import_summary(store: &SqliteStore) -> Result<()> {
    let conn = store.connection();

    println!("\n🔍 Verifying database...");
    println!("✓ Series: {}", count_metadata(conn)?);
    println!("✓ Observations: {}", verify_count(conn)?);
    if let Some(latest) = get_latest_data_date(conn)? {
        println!("✓ Latest data: {}", latest);
    }
    Ok(())
}

#[cfg(feature = "download")]
fn run_import(config: &Config, fresh: bool, force: bool) -> Result<()> {
    use ppi_toolkit::{BlsDownloader, FlatFileKind};

    println!("🗄️  PPI Import - BLS flat files → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let downloader = BlsDownloader::new(config)
        .context("Set --user-agent or PPI_TOOLKIT_USER_AGENT to a contact e-mail")?;
    let store = open_store(config)?;

    if fresh {
        println!("\n🧹 Resetting tables...");
        reset_database(store.connection())?;
    }

    println!("\n📡 Downloading series metadata...");
    let metadata = downloader.fetch_metadata().context("Failed to download wp.series")?;
    let outcome = import_payload(
        store.connection(),
        FlatFileKind::Series,
        &metadata.source,
        &metadata.bytes,
        force || fresh,
    )?;
    print_import_outcome("Metadata", &outcome);

    println!("\n📡 Downloading observations...");
    let data = downloader.fetch_data().context("Failed to download wp.data")?;
    let outcome = import_payload(
        store.connection(),
        FlatFileKind::Data,
        &data.source,
        &data.bytes,
        force || fresh,
    )?;
    print_import_outcome("Observations", &outcome);

    print_import_summary(&store)
}

#[cfg(not(feature = "download"))]
fn run_import(_config: &Config, _fresh: bool, _force: bool) -> Result<()> {
    eprintln!("❌ Download not available!");
    eprintln!("   Rebuild with: cargo build --features download");
    eprintln!("   Or import local files: ppi-toolkit import-files wp.series wp.data.0.Current");
    std::process::exit(1);
}

fn run_import_files(config: &Config, files: &[PathBuf], fresh: bool, force: bool) -> Result<()> {
    println!("🗄️  PPI Import - local flat files → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if files.is_empty() {
        anyhow::bail!("No files given");
    }

    let store = open_store(config)?;

    if fresh {
        println!("\n🧹 Resetting tables...");
        reset_database(store.connection())?;
    }

    for path in files {
        let kind = detect_kind(path).with_context(|| format!("Failed to read {}", path.display()))?;
        println!("\n📂 {} ({})", path.display(), kind.name());

        let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let outcome = import_payload(
            store.connection(),
            kind,
            &path.display().to_string(),
            &bytes,
            force || fresh,
        )?;
        print_import_outcome(kind.name(), &outcome);
    }

    print_import_summary(&store)
}

fn run_search(config: &Config, query: &str, limit: usize, keyword: bool) -> Result<()> {
    let store = open_store(config)?;

    if keyword {
        let matches = keyword_search(store.connection(), query)?;
        println!("🔎 {} series matching '{}'\n", matches.len(), query);
        for meta in matches.iter().take(limit) {
            println!("  {:<20} {}", meta.series_id, meta.series_title);
        }
        return Ok(());
    }

    let hits = fuzzy_search(store.connection(), query, limit)?;
    if hits.is_empty() {
        println!("No series match '{}'", query);
        return Ok(());
    }

    println!("🔎 Best matches for '{}'\n", query);
    for hit in hits {
        println!("  {:>5.1}  {:<20} {}", hit.score, hit.series_id, hit.series_title);
    }
    Ok(())
}

fn run_categories(config: &Config, group: Option<&str>) -> Result<()> {
    let store = open_store(config)?;

    match group {
        Some(group_code) => {
            let series = category_search(store.connection(), group_code)?;
            println!("📁 Group {} ({} series)\n", group_code, series.len());
            for meta in series {
                println!("  {:<20} {}", meta.series_id, meta.series_title);
            }
        }
        None => {
            let groups = get_group_stats(store.connection())?;
            println!("📁 {} commodity groups\n", groups.len());
            for group in groups {
                println!(
                    "  {:<6} {:>5} series  {}",
                    group.group_code,
                    group.series_count,
                    group.group_title.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

fn run_info(config: &Config, series_id: &str, recent: usize) -> Result<()> {
    let store = open_store(config)?;
    let meta = store.get_series_metadata(series_id)?;
    let series = store.get_series_data(series_id)?;

    println!("📊 {} - {}", meta.series_id, meta.series_title);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("  Group:      {}", meta.group_code);
    println!("  Item:       {}", meta.item_code);
    println!(
        "  Seasonal:   {}",
        if meta.is_seasonally_adjusted() { "adjusted" } else { "not adjusted" }
    );
    println!("  Base date:  {}", meta.base_date);
    println!("  Stored:     {} observations", series.len());
    if let (Some(first), Some(last)) = (series.first(), series.last()) {
        println!("  Coverage:   {} → {}", first.year_month(), last.year_month());
        println!("  Latest:     {:.3}", last.value);
    }

    let joined = get_joined_data(store.connection(), series_id)?;
    if recent > 0 && !joined.is_empty() {
        println!("\n  Recent observations:");
        for row in joined.iter().skip(joined.len().saturating_sub(recent)) {
            println!("    {} {}  {:>10.3}", row.year, row.period, row.value);
        }
    }
    Ok(())
}

fn run_imports(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let runs = get_import_runs(store.connection())?;

    println!("🧾 {} imports\n", runs.len());
    for run in runs {
        println!(
            "  {}  {:>8} read {:>8} new {:>6} skipped  {}",
            run.imported_at.format("%Y-%m-%d %H:%M"),
            run.rows_read,
            run.rows_inserted,
            run.rows_skipped,
            run.source
        );
    }
    Ok(())
}

fn format_change(change: Option<f64>) -> String {
    match change {
        Some(v) => format!("{:>9.2}", v),
        None => format!("{:>9}", "-"),
    }
}

fn print_change_table(records: &[ChangeRecord], windows: &[u32]) {
    let mut header = format!("  {:<10} {:>10}", "Date", "Value");
    for w in windows {
        header.push_str(&format!("{:>9}", format!("ann_{}m", w)));
    }
    println!("{}", header);

    for record in records {
        let mut line = format!("  {:<10} {:>10.3}", record.date.format("%Y-%m-%d"), record.value);
        for w in windows {
            line.push_str(&format_change(record.ann(*w)));
        }
        println!("{}", line);
    }
}

fn run_changes(
    config: &Config,
    series_id: &str,
    start: Option<YearMonth>,
    end: Option<YearMonth>,
    windows: &[u32],
    csv: Option<PathBuf>,
) -> Result<()> {
    let windows = effective_windows(config, windows);
    let store = open_store(config)?;
    let records = query_changes(&store, series_id, start, end, &windows)?;

    if let Some(path) = csv {
        export_changes_csv(&path, &records, &parse_windows(&windows)?)?;
        println!("✓ Wrote {} rows to {}", records.len(), path.display());
        return Ok(());
    }

    if records.is_empty() {
        println!("No observations for {} in the requested range", series_id);
        return Ok(());
    }

    println!("📈 Annualized changes for {} (%)\n", series_id);
    print_change_table(&records, &windows);
    Ok(())
}

fn run_latest(config: &Config, series_id: &str, as_of: Option<YearMonth>, windows: &[u32]) -> Result<()> {
    let windows = effective_windows(config, windows);
    let store = open_store(config)?;

    match latest_changes(&store, series_id, as_of, &windows)? {
        Some(record) => {
            println!("📈 Latest annualized changes for {} (%)\n", series_id);
            print_change_table(std::slice::from_ref(&record), &windows);
        }
        None => println!("No observations for {}", series_id),
    }
    Ok(())
}

fn run_compare(
    config: &Config,
    series_ids: &[String],
    start: Option<YearMonth>,
    end: Option<YearMonth>,
    chart: bool,
) -> Result<()> {
    let store = open_store(config)?;
    let compared = compare_series(&store, series_ids, start, end)?;

    if compared.iter().all(|s| s.points.is_empty()) {
        println!("No observations to compare in the requested range");
        return Ok(());
    }

    if chart {
        return run_compare_chart(compared);
    }

    println!("📊 Series rebased to first month in range = 100\n");

    let mut header = format!("  {:<10}", "Date");
    for series in &compared {
        header.push_str(&format!("{:>14}", series.series_id));
    }
    println!("{}", header);

    for (date, values) in align_by_date(&compared) {
        let mut line = format!("  {:<10}", date.format("%Y-%m-%d"));
        for value in values {
            match value {
                Some(v) => line.push_str(&format!("{:>14.2}", v)),
                None => line.push_str(&format!("{:>14}", "-")),
            }
        }
        println!("{}", line);
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_compare_chart(compared: Vec<ppi_toolkit::RebasedSeries>) -> Result<()> {
    println!("Starting UI... (Press 'q' to quit)\n");

    let app = ui::CompareApp::new(ui::COMPARE_TITLE.to_string(), compared);
    ui::run_compare_ui(&app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_compare_chart(_compared: Vec<ppi_toolkit::RebasedSeries>) -> Result<()> {
    eprintln!("❌ Chart mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or drop --chart to print the rebased table");
    std::process::exit(1);
}

#[cfg(feature = "tui")]
fn run_chart_mode(
    config: &Config,
    series_id: &str,
    start: Option<YearMonth>,
    end: Option<YearMonth>,
    windows: &[u32],
    title: Option<String>,
) -> Result<()> {
    println!("🖥️  Loading chart for {}...\n", series_id);

    let windows = parse_windows(&effective_windows(config, windows))?;
    let store = open_store(config)?;
    let months: Vec<u32> = windows.iter().map(|w| w.months()).collect();
    let range = resolve_range(&store, series_id, start, end)?;
    let records = match range {
        Some((start, end)) => query_changes(&store, series_id, Some(start), Some(end), &months)?,
        None => Vec::new(),
    };

    if records.is_empty() {
        eprintln!("❌ No observations for {} in the requested range", series_id);
        std::process::exit(1);
    }

    let series_title = store
        .get_series_metadata(series_id)
        .ok()
        .map(|meta| meta.series_title);
    let title = title.unwrap_or_else(|| ui::default_title(series_id, series_title.as_deref()));

    println!("✓ Loaded {} months\n", records.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let levels = ppi_toolkit::price_levels(
        &store.get_series_data(series_id)?,
        range.map(|(start, _)| start),
        range.map(|(_, end)| end),
    )?;

    let mut app = ui::App::new(title, records, levels, windows);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_chart_mode(
    _config: &Config,
    _series_id: &str,
    _start: Option<YearMonth>,
    _end: Option<YearMonth>,
    _windows: &[u32],
    _title: Option<String>,
) -> Result<()> {
    eprintln!("❌ Chart mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or export CSV: ppi-toolkit changes <SERIES_ID> --csv out.csv");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_changes() {
        let cli = Cli::try_parse_from([
            "ppi-toolkit", "--db", "test.db", "changes", "WPU0111",
            "--start", "2023-01", "--end", "2023-12", "--windows", "1,12",
        ])
        .unwrap();

        match cli.command {
            Commands::Changes { series_id, start, end, windows, csv } => {
                assert_eq!(series_id, "WPU0111");
                assert_eq!(start, Some(YearMonth::new(2023, 1).unwrap()));
                assert_eq!(end, Some(YearMonth::new(2023, 12).unwrap()));
                assert_eq!(windows, vec![1, 12]);
                assert!(csv.is_none());
            }
            _ => panic!("expected changes command"),
        }
    }

    #[test]
    fn test_cli_parses_compare() {
        let cli = Cli::try_parse_from([
            "ppi-toolkit", "compare", "WPS0111", "WPS0112", "--start", "2023-01", "--chart",
        ])
        .unwrap();

        match cli.command {
            Commands::Compare { series_ids, start, end, chart } => {
                assert_eq!(series_ids, vec!["WPS0111", "WPS0112"]);
                assert_eq!(start, Some(YearMonth::new(2023, 1).unwrap()));
                assert!(end.is_none());
                assert!(chart);
            }
            _ => panic!("expected compare command"),
        }

        assert!(Cli::try_parse_from(["ppi-toolkit", "compare"]).is_err());
    }

    #[test]
    fn test_default_log_filter_is_info() {
        assert_eq!(EnvFilter::new(DEFAULT_LOG_FILTER).to_string(), "info");
    }

    #[test]
    fn test_cli_rejects_bad_month() {
        assert!(Cli::try_parse_from(["ppi-toolkit", "changes", "WPU01", "--start", "2023-13"]).is_err());
    }
}
