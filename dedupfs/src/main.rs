mod output;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dedupfs_core::{
    ActionLog, Cancellation, Lines, NoopLog, Store, TracingLog, dedupe_dir, dedupe_paths,
};
use output::{
    DedupeOutput, GcOutput, InitOutput, MoveOutput, OutputWriter, PutOutput,
    RemoveOutput, StatOutput,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// dedupfs - A deduplicated file store
#[derive(Parser, Debug)]
#[command(name = "dedupfs")]
#[command(
    about = "Deduplicated file store: SHA-512 content-addressed data files behind a tree of symlinks",
    long_about = None
)]
#[command(version)]
struct Cli {
    /// Store root directory
    #[arg(
        short,
        long,
        global = true,
        env = "DEDUPFS_ROOT",
        default_value = "./dedupfs-store"
    )]
    root: PathBuf,

    /// Increase log verbosity (-v info and action log, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Give up on tree walks after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Deduplicate a directory's files in place using symlinks.
    ///
    /// Duplicates (by SHA-512 content hash) are replaced with a symlink to the
    /// first file seen in file-name order. Hidden (dot-prefixed) entries such
    /// as ".git" or ".bashrc" are skipped.
    DirSymlink {
        /// Directory to deduplicate
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Deduplicate the files whose paths are read from stdin, one per line
    LinesSymlink,

    /// Initialize a new store
    Init {
        /// Permission mode for store directories (octal)
        #[arg(long, default_value = "700", value_parser = parse_mode)]
        dir_mode: u32,
    },

    /// Store content under a link name
    Put {
        /// Link name inside the store
        link: String,

        /// File to read (reads stdin if omitted)
        file: Option<PathBuf>,
    },

    /// Output link content to stdout
    Cat {
        /// Link name
        link: String,
    },

    /// Move a link or a directory of links
    Mv {
        /// Current link name
        old: String,

        /// New link name
        new: String,
    },

    /// Remove a link or a directory of links
    Rm {
        /// Link name
        link: String,
    },

    /// Show the data file behind a link
    Stat {
        /// Link name
        link: String,
    },

    /// Garbage collect data files no link points to
    Gc {
        /// Dry run - show what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = OutputWriter::new(cli.json);
    if let Err(err) = run(cli, &output) {
        output.write_error(&err, 1);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // RUST_LOG wins over -v
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("dedupfs={level},dedupfs_core={level}"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run(cli: Cli, output: &OutputWriter) -> Result<()> {
    let cancel = match cli.timeout {
        Some(secs) => Cancellation::new().with_timeout(Duration::from_secs(secs)),
        None => Cancellation::none(),
    };
    let log: &dyn ActionLog = if cli.verbose > 0 {
        &TracingLog
    } else {
        &NoopLog
    };
    let root = cli.root.as_path();

    match cli.command {
        Commands::DirSymlink { dir } => cmd_dir_symlink(&dir, &cancel, log, output),
        Commands::LinesSymlink => cmd_lines_symlink(&cancel, log, output),
        Commands::Init { dir_mode } => cmd_init(root, dir_mode, output),
        Commands::Put { link, file } => cmd_put(root, &link, file.as_deref(), output),
        Commands::Cat { link } => cmd_cat(root, &link),
        Commands::Mv { old, new } => cmd_mv(root, &old, &new, output),
        Commands::Rm { link } => cmd_rm(root, &link, output),
        Commands::Stat { link } => cmd_stat(root, &link, output),
        Commands::Gc { dry_run } => cmd_gc(root, dry_run, &cancel, output),
    }
}

fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    let digits = s.trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| format!("invalid octal mode: {}", s))
}

fn open_store(root: &Path) -> Result<Store> {
    Store::open(root).with_context(|| format!("Failed to open store at {}", root.display()))
}

/// Turn a prune failure into a warning; any other failure stays an error.
fn prune_warning(result: dedupfs_core::Result<()>, context: String) -> Result<Option<String>> {
    match result {
        Ok(()) => Ok(None),
        Err(e) if e.is_prune_failure() => {
            tracing::warn!(error = %e, "pruning empty directories failed");
            Ok(Some(e.to_string()))
        }
        Err(e) => Err(anyhow::Error::new(e).context(context)),
    }
}

fn cmd_dir_symlink(
    dir: &Path,
    cancel: &Cancellation,
    log: &dyn ActionLog,
    output: &OutputWriter,
) -> Result<()> {
    let stats = dedupe_dir(dir, cancel, log)
        .with_context(|| format!("Failed to deduplicate {}", dir.display()))?;

    let data = DedupeOutput {
        success: true,
        result_code: 0,
        source: dir.display().to_string(),
        stats,
    };
    output.write(&data, || data.to_text())
}

fn cmd_lines_symlink(cancel: &Cancellation, log: &dyn ActionLog, output: &OutputWriter) -> Result<()> {
    let stdin = io::stdin();
    let stats = dedupe_paths(Lines::new(stdin.lock()), cancel, log)
        .with_context(|| "Failed to deduplicate paths from stdin")?;

    let data = DedupeOutput {
        success: true,
        result_code: 0,
        source: "<stdin>".to_string(),
        stats,
    };
    output.write(&data, || data.to_text())
}

fn cmd_init(root: &Path, dir_mode: u32, output: &OutputWriter) -> Result<()> {
    let store = Store::init(root, dir_mode)
        .with_context(|| format!("Failed to initialize store at {}", root.display()))?;

    let data = InitOutput {
        success: true,
        result_code: 0,
        root: root.display().to_string(),
        algorithm: "sha512".to_string(),
        dir_mode: format!("{:04o}", store.dir_mode()),
    };
    output.write(&data, || {
        format!(
            "Initialized dedupfs store at {}\nAlgorithm: {}\n",
            data.root, data.algorithm
        )
    })
}

fn cmd_put(root: &Path, link: &str, file: Option<&Path>, output: &OutputWriter) -> Result<()> {
    let store = open_store(root)?;

    let hash = match file {
        Some(path) => {
            let file = fs::File::open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            store.put(link, file)
        }
        None => {
            if atty::is(atty::Stream::Stdin) {
                anyhow::bail!(
                    "Refusing to read content from an interactive terminal; pipe data in or pass a FILE"
                );
            }
            store.put(link, io::stdin().lock())
        }
    }
    .with_context(|| format!("Failed to store {}", link))?;

    let data = PutOutput {
        success: true,
        result_code: 0,
        link: link.to_string(),
        hash,
        data_path: store.data_path(&hash).display().to_string(),
    };
    output.write(&data, || format!("{} {}\n", data.hash, data.link))
}

fn cmd_cat(root: &Path, link: &str) -> Result<()> {
    let store = open_store(root)?;

    let mut file = store
        .open_link(link)
        .with_context(|| format!("Failed to open {}", link))?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    // Raw content, in JSON mode too
    let bytes = io::copy(&mut file, &mut handle)
        .with_context(|| format!("Failed to output {}", link))?;
    tracing::debug!(link, bytes, "cat finished");

    Ok(())
}

fn cmd_mv(root: &Path, old: &str, new: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(root)?;

    let warning = prune_warning(
        store.rename(old, new),
        format!("Failed to move {} to {}", old, new),
    )?;
    if let Some(ref warning) = warning {
        output.write_warning(warning);
    }

    let data = MoveOutput {
        success: true,
        result_code: 0,
        from: old.to_string(),
        to: new.to_string(),
        warning,
    };
    output.write(&data, || format!("Moved {} -> {}\n", data.from, data.to))
}

fn cmd_rm(root: &Path, link: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(root)?;

    let warning = prune_warning(store.remove(link), format!("Failed to remove {}", link))?;
    if let Some(ref warning) = warning {
        output.write_warning(warning);
    }

    let data = RemoveOutput {
        success: true,
        result_code: 0,
        link: link.to_string(),
        warning,
    };
    output.write(&data, || format!("Removed {}\n", data.link))
}

fn cmd_stat(root: &Path, link: &str, output: &OutputWriter) -> Result<()> {
    let store = open_store(root)?;

    let hash = store
        .resolve(link)
        .with_context(|| format!("Failed to resolve {}", link))?;
    let data_path = store.data_path(&hash);

    // A missing data file is reported, not an error
    let size = fs::metadata(&data_path).ok().map(|m| m.len());

    let data = StatOutput {
        success: true,
        result_code: 0,
        link: link.to_string(),
        hash,
        data_path: data_path.display().to_string(),
        size,
    };
    output.write(&data, || data.to_text())
}

fn cmd_gc(root: &Path, dry_run: bool, cancel: &Cancellation, output: &OutputWriter) -> Result<()> {
    let store = open_store(root)?;

    let stats = store
        .gc(dry_run, cancel)
        .with_context(|| "Failed to run garbage collection")?;

    let data = GcOutput {
        success: true,
        result_code: 0,
        dry_run,
        stats,
    };
    output.write(&data, || data.to_text())
}
