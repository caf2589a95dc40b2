//! CoverVid CLI - Batch Audio to Cover-Video Converter
//!
//! Converts every audio file in a directory into an mp4 showing a cover image,
//! several files at a time.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use tracing::{debug, info};

use covervid::{
    init_with_config, processing::discover, run_batch, BatchOutcome, Config, CoverVidError,
    FfmpegTranscoder, LogReporter, ProgressReporter, RunConfig, SpinnerReporter,
};

/// CoverVid - Batch Audio to Cover-Video Converter
#[derive(Parser)]
#[command(
    name = "covervid",
    version,
    about = "Convert a folder of audio tracks into videos with a static cover image",
    long_about = "CoverVid pairs every audio file in a directory with one cover image and \
                  renders an mp4 for each, converting several files in parallel. With \
                  --metadata the videos are named \"[Artist] - [Title]\" from the audio tags.",
    after_help = "Examples:\n  \
                  covervid -d /some/dir/with/mp3s -p 15\n  \
                  covervid -d /some/dir/with/mp3s -c front.jpg\n  \
                  covervid -d /some/dir/with/mp3s -m\n  \
                  covervid -d /some/dir/with/mp3s -o /some/output/dir"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory with audio files to convert
    #[arg(short, long, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// Cover file inside the directory [default: Cover.jpg]
    #[arg(short, long, value_name = "FILE")]
    cover: Option<PathBuf>,

    /// Output directory [default: the input directory]
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// How many files to convert in parallel [default: 5]
    #[arg(short, long, value_name = "COUNT")]
    parallel: Option<usize>,

    /// Name outputs "[Artist] - [Title]" from the audio metadata
    #[arg(short, long)]
    metadata: bool,

    /// Configuration file path
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show what would be converted without converting
    #[arg(long)]
    dry_run: bool,

    /// Output the summary as JSON
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'Q', long, conflicts_with = "verbose")]
    quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Validate configuration file
    Config {
        /// Configuration file to validate
        file: PathBuf,
    },
    /// Generate example configuration file
    ExampleConfig {
        /// Output file path (.toml or .yaml)
        #[arg(short, long, default_value = "covervid.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let mut cli = Cli::parse();

    if let Some(command) = cli.command.take() {
        if let Err(e) = handle_subcommand(command) {
            eprintln!("{}: {:#}", style("Error").red().bold(), e);
            process::exit(1);
        }
        return;
    }

    let mut config = match &cli.config {
        Some(path) => match Config::from_file(path).and_then(|c| c.validate().map(|()| c)) {
            Ok(config) => config,
            Err(e) => fail(&e),
        },
        None => Config::default(),
    };

    // Initialize logging based on verbosity
    if cli.quiet {
        config.logging.level = "error".to_string();
    } else if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    init_with_config(&config);

    if let Some(path) = &cli.config {
        info!("Loaded configuration from: {:?}", path);
    }

    let Some(dir) = cli.dir.clone() else {
        eprintln!("{}: The input directory (-d) is required", style("Error").red().bold());
        eprintln!("Run with --help for usage information");
        process::exit(1);
    };

    let run = build_run_config(&cli, &dir, &config);
    debug!("Run configuration: {:?}", run);

    if cli.dry_run {
        if let Err(e) = run_dry(&run).await {
            fail(&e);
        }
        return;
    }

    let reporter: Arc<dyn ProgressReporter> = if cli.json || cli.quiet {
        Arc::new(LogReporter)
    } else {
        Arc::new(SpinnerReporter::new())
    };
    let transcoder = Arc::new(FfmpegTranscoder::new(config.transcoder.clone()));
    let timeout = Duration::from_secs(config.transcoder.timeout_seconds);

    match run_batch(&run, transcoder, timeout, reporter).await {
        Ok(outcome) => print_summary(&outcome, cli.json),
        Err(e) => fail(&e),
    }
}

/// Merge command line options over the configuration defaults
fn build_run_config(cli: &Cli, dir: &Path, config: &Config) -> RunConfig {
    let mut run = RunConfig::with_defaults(dir, &config.defaults).metadata(cli.metadata);

    if let Some(cover) = &cli.cover {
        run = run.cover(cover);
    }
    if let Some(output) = &cli.output {
        run = run.output_dir(output);
    }
    if let Some(parallel) = cli.parallel {
        run = run.parallel(parallel);
    }

    run
}

/// List the jobs a run would process
async fn run_dry(run: &RunConfig) -> covervid::Result<()> {
    run.validate()?;
    let jobs = discover(run).await?;

    println!("{} files would be converted:", style(jobs.len()).bold());
    for job in &jobs {
        println!("  {}", job.path.display());
    }
    Ok(())
}

/// Handle subcommands
fn handle_subcommand(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Config { file } => {
            let config = Config::from_file(&file)
                .with_context(|| format!("Failed to load {}", file.display()))?;
            config.validate()?;

            println!("{}: Configuration file is valid", style("Success").green().bold());
            println!("ffmpeg: {}", config.transcoder.ffmpeg_path.display());
            println!("Parallel: {}", config.defaults.parallel);
        }
        Commands::ExampleConfig { output } => {
            Config::default().to_file(&output)?;
            println!("{}: Generated example configuration: {}",
                     style("Success").green().bold(),
                     output.display());
        }
    }
    Ok(())
}

/// Print a fatal error and exit with a failure code
fn fail(error: &CoverVidError) -> ! {
    eprintln!("{}: {}", style("Error").red().bold(), error.user_message());
    process::exit(1);
}

/// Print processing summary
fn print_summary(outcome: &BatchOutcome, json_output: bool) {
    if json_output {
        match serde_json::to_string_pretty(outcome) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("{}: {}", style("Error").red().bold(), e),
        }
        return;
    }

    println!();
    println!("{} files converted", style(outcome.converted_count()).green().bold());
    println!("  {}: {:.2}s", style("Duration").blue(), outcome.elapsed.as_secs_f64());
    if outcome.converted_count() > 0 {
        println!("  {}: {:.2} files/sec", style("Speed").cyan(), outcome.files_per_second());
    }
}
