use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use env_logger::{Builder, Env, Target};
use hfr::events::{EventValue, keys};
use hfr::index::{IndexPaths, LineIndex, LineIndexConfig, LoadState, stats};
use hfr::search::SearchOutcome;
use hfr::utils::progress::{ProgressBar, ProgressStyle};
use hfr::utils::{AppConfig, clear_indexes, get_config_path};
use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hfr")]
#[command(about = "Random access to the lines of huge text files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding index files (overrides the config file)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,

    /// Config file to use instead of the per-user one
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write log output to this file instead of stderr
    #[arg(long, global = true)]
    log: Option<PathBuf>,

    /// Do not show progress
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a file (or validate its existing index)
    Open {
        path: PathBuf,
    },
    /// Print lines of a file
    Line {
        path: PathBuf,

        /// First row to print (0-based)
        row: i64,

        /// Number of rows to print
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u64,
    },
    /// Find the next occurrence of a string
    Search {
        path: PathBuf,

        needle: String,

        /// Row to start from
        #[arg(long, default_value_t = 0)]
        row: i64,

        /// Column to start from
        #[arg(long, default_value_t = 0)]
        col: u32,

        /// Match case-insensitively
        #[arg(short, long)]
        ignore_case: bool,

        /// Search towards the start of the file
        #[arg(short, long)]
        backward: bool,
    },
    /// Show statistics of a file's index
    Stats {
        path: PathBuf,
    },
    /// List all indexed files
    List,
    /// Remove an index
    Remove {
        /// File whose index to remove
        path: Option<PathBuf>,

        /// Remove every index
        #[arg(long, conflicts_with = "path")]
        all: bool,
    },
    /// Print the effective configuration
    Config {
        /// Write it back to the config file
        #[arg(long)]
        save: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log.as_deref())?;

    let mut app = match &cli.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    if let Some(dir) = &cli.index_dir {
        app.index_dir = Some(dir.clone());
    }
    let config = LineIndexConfig::from(&app);
    info!("Using index directory {}", config.index_dir.display());

    match cli.command {
        Commands::Open { path } => {
            let index = open_and_wait(config, &path, cli.quiet)?;
            println!("File:     {}", path.display());
            println!("Rows:     {}", index.rows());
            println!("Columns:  {}", index.cols());
            println!("Encoding: {:?}", index.bom());
            if let Some(EventValue::Elapsed(elapsed)) = index.events().peek(keys::LINES_ELAPSED) {
                println!("Elapsed:  {:.2?}", elapsed);
            }
            // Let the full content hash finish so the next open can rely on it
            index.wait();
            if index.state() == LoadState::Error {
                bail!("{}", last_reason(&index).unwrap_or_else(|| "integrity check failed".into()));
            }
        }
        Commands::Line { path, row, count } => {
            let index = open_and_wait(config, &path, cli.quiet)?;
            let width = (row.max(0) as u64).saturating_add(count).to_string().len();
            let count = i64::try_from(count).unwrap_or(i64::MAX);
            for r in row..row.saturating_add(count) {
                match index.line(r) {
                    Some(text) if (r as u64) < index.rows() => {
                        println!("{:>width$}: {}", r, text, width = width)
                    }
                    _ => break,
                }
            }
        }
        Commands::Search {
            path,
            needle,
            row,
            col,
            ignore_case,
            backward,
        } => {
            let index = open_and_wait(config, &path, cli.quiet)?;
            index.start_search(row, col, &needle, !ignore_case, !backward)?;
            match index.wait_search()? {
                Some(SearchOutcome::Found { row, col }) => {
                    let text = index.line(row as i64).unwrap_or_default();
                    println!("{}:{}: {}", row, col, text);
                }
                Some(SearchOutcome::NotFound) => {
                    println!("Not found: {}", needle);
                    std::process::exit(1);
                }
                Some(SearchOutcome::Cancelled) | None => bail!("Search cancelled"),
            }
        }
        Commands::Stats { path } => {
            stats::show_stats(&config.index_dir, &path)?;
        }
        Commands::List => {
            stats::list_indexes(&config.index_dir)?;
        }
        Commands::Remove { path, all } => {
            if all {
                let removed = clear_indexes(&config.index_dir)?;
                println!("Removed {} index files from {}", removed, config.index_dir.display());
            } else if let Some(path) = path {
                IndexPaths::for_source(&config.index_dir, &path)
                    .delete()
                    .with_context(|| format!("Failed to remove index for {}", path.display()))?;
                println!("Removed index for: {}", path.display());
            } else {
                bail!("Specify a file or --all");
            }
        }
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&app)?);
            if save {
                let path = match &cli.config {
                    Some(path) => path.clone(),
                    None => get_config_path()?,
                };
                app.save_to(&path)?;
                println!("Saved config to {}", path.display());
            }
        }
    }

    Ok(())
}

fn setup_logging(log: Option<&Path>) -> Result<()> {
    let mut builder = Builder::from_env(Env::default().default_filter_or("warn"));

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}] {}",
            buf.timestamp_seconds(),
            record.level(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    if let Some(log_path) = log {
        if let Some(parent_dir) = log_path.parent()
            && !parent_dir.as_os_str().is_empty()
            && !parent_dir.exists()
        {
            fs::create_dir_all(parent_dir)?;
        }
        let log_file = fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;
        builder.target(Target::Pipe(Box::new(log_file)));
    } else {
        builder.target(Target::Stderr);
    }

    builder.init();
    Ok(())
}

/// Open `path` and block until its rows are final, drawing progress from the event channel
fn open_and_wait(config: LineIndexConfig, path: &Path, quiet: bool) -> Result<LineIndex> {
    let index = LineIndex::new(config);
    let events = Arc::clone(index.events());

    let pb = if quiet {
        None
    } else {
        let pb = ProgressBar::new(1000);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {percent}% {msg}")?
                .progress_chars("=>-"),
        );
        pb.enable_steady_tick(Duration::from_millis(80));

        let bar = pb.clone();
        events.subscribe(keys::LINES_PROGRESS, move |_, value| {
            if let Some(permille) = value.as_int() {
                bar.set_position(permille.max(0) as u64);
            }
        });
        let bar = pb.clone();
        events.subscribe(keys::LINES_ROWS, move |_, value| {
            if let Some(rows) = value.as_int() {
                bar.set_message(format!("{} rows", rows));
            }
        });
        Some(pb)
    };

    let reason = Arc::new(Mutex::new(None::<String>));
    let slot = Arc::clone(&reason);
    events.subscribe(keys::LINES_REASON, move |_, value| {
        if let Some(text) = value.as_text() {
            *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(text.to_string());
        }
    });

    index
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    loop {
        let state = index.wait_for_load(Duration::from_millis(50));
        events.dispatch();
        if !state.is_in_progress() {
            break;
        }
    }

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    match index.state() {
        LoadState::Ready => Ok(index),
        LoadState::Cancelled => bail!("Loading {} was cancelled", path.display()),
        state => {
            let reason = reason.lock().unwrap_or_else(|e| e.into_inner()).take();
            bail!(
                "Loading {} failed ({}): {}",
                path.display(),
                state.as_str(),
                reason.unwrap_or_else(|| "unknown error".into())
            )
        }
    }
}

fn last_reason(index: &LineIndex) -> Option<String> {
    index
        .events()
        .peek(keys::LINES_REASON)
        .and_then(|value| value.as_text().map(str::to_string))
}
