use clap::Parser;
use stem_dataset_core::{reorganize_musdb, set_reorganize_progress_callback};
use std::{path::PathBuf, process};

/// Reorganize the MUSDB18 dataset into per-stem wav directories
#[derive(Parser)]
#[command(name = "reorganize-musdb")]
#[command(about = "Reorganize MUSDB18 dataset", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the MUSDB18 training set (e.g. musdb18/train)
    #[arg(long = "train_dir", value_name = "DIR")]
    train_dir: PathBuf,

    /// Path to the MUSDB18 test set (e.g. musdb18/test)
    #[arg(long = "test_dir", value_name = "DIR")]
    test_dir: PathBuf,

    /// Where to write the reorganized dataset
    #[arg(long = "out_dir", value_name = "DIR")]
    out_dir: PathBuf,

    /// Verbose output (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    if !cli.quiet {
        set_reorganize_progress_callback(|split, done, total| {
            eprint!("\r{}: {done}/{total} tracks", split.dir_name());
            if done >= total {
                eprintln!();
            }
        });
    }

    match reorganize_musdb(&cli.train_dir, &cli.test_dir, &cli.out_dir) {
        Ok(summary) => {
            log::info!(
                "Wrote {} files ({} train, {} test tracks) to {}",
                summary.files_written,
                summary.train_tracks,
                summary.test_tracks,
                cli.out_dir.display()
            );
            println!("Reorganization complete!");
            process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) {
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}
