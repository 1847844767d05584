//! blockfs shell binary.
//!
//! Usage:
//!   # Mount the default snapshot (~/.local/share/blockfs/fs.json)
//!   blockfs
//!
//!   # Use a specific snapshot and block size
//!   blockfs --snapshot /tmp/fs.json --block-size 64
//!
//! Set `RUST_LOG=blockfs_kernel=debug` to trace block and descriptor activity.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use blockfs_kernel::SnapshotStore;
use blockfs_shell::config::{self, ShellConfig};
use blockfs_shell::{Outcome, Shell};

/// Interactive shell for the blockfs in-memory filesystem.
#[derive(Parser, Debug)]
#[command(name = "blockfs")]
#[command(about = "Interactive shell for an in-memory block filesystem")]
struct Args {
    /// Config file (default: ~/.config/blockfs/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Snapshot file to mount
    #[arg(short, long)]
    snapshot: Option<String>,

    /// Block size for a new filesystem (a loaded snapshot keeps its own)
    #[arg(long)]
    block_size: Option<usize>,

    /// Start without mounting
    #[arg(long)]
    no_mount: bool,
}

fn main() -> Result<()> {
    // Logs go to stderr so they don't interleave with command output
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config_path: Option<PathBuf> = match &args.config {
        Some(path) => Some(config::expand(path)),
        None => config::default_config_path(),
    };
    let mut settings = match &config_path {
        Some(path) => ShellConfig::load(path)?,
        None => ShellConfig::default(),
    };
    if let Some(snapshot) = args.snapshot {
        settings.snapshot = Some(snapshot);
    }
    if let Some(block_size) = args.block_size {
        settings.fs = settings.fs.with_block_size(block_size);
    }

    let snapshot = settings.snapshot_path();
    if let Some(parent) = snapshot.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::info!(snapshot = %snapshot.display(), block_size = settings.fs.block_size, "starting");

    let mut shell = Shell::new(SnapshotStore::new(snapshot), settings.fs);
    if !args.no_mount {
        run_line(&mut shell, "mount");
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", shell.prompt());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        if !run_line(&mut shell, &line?) {
            return Ok(());
        }
    }

    // EOF: save like `exit` would
    if shell.is_mounted() {
        run_line(&mut shell, "unmount");
    }
    Ok(())
}

/// Execute one line, printing output or the error. Returns false on exit.
fn run_line(shell: &mut Shell, line: &str) -> bool {
    match shell.execute(line) {
        Ok(Outcome::Output(text)) => {
            if !text.is_empty() {
                println!("{text}");
            }
            true
        }
        Ok(Outcome::Exit) => false,
        Err(e) => {
            eprintln!("error: {e:#}");
            true
        }
    }
}
