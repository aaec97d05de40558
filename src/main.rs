use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;

use race_tally::tally::{tally_data, TallyOptions};

const EXIT_SUCCESS: i32 = 0;
const EXIT_DATA: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "race-tally")]
#[command(about = "League standings from a folder of YAML result documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the root data folder (containing results/, athletes/, leagues/)
    data_folder: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Ignore existing cache entries and recompute every document
    #[arg(long)]
    no_cache: bool,
}

fn main() {
    let cli = Cli::parse();
    let start_time = Instant::now();

    let options = TallyOptions {
        no_cache: cli.no_cache,
    };
    let run = match tally_data(&cli.data_folder, &options) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Tally failed: {:#}", e);
            std::process::exit(EXIT_DATA);
        }
    };

    let use_colors = race_tally::output::should_use_colors();
    println!("{}", race_tally::output::format_board(&run.board, use_colors));

    if cli.verbose {
        eprintln!();
        eprintln!(
            "Processed {} documents ({} cache hits)",
            run.documents, run.cache_hits
        );
    }
    eprintln!("Time taken: {:?}", start_time.elapsed());

    std::process::exit(EXIT_SUCCESS);
}
