use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use gfs_fetch::{
    run::{DEFAULT_OUTPUT_DIR, DEFAULT_REMOTE_ROOT},
    store::{self, StoreOptions},
    BatchCoordinator, FileAcquirer, Layout, RetryPolicy, RunSpecification,
};

#[derive(Parser)]
#[command(version, about = "Mirrors GFS forecast files as they are published", long_about = None)]
struct Cli {
    #[arg(short, long, action = clap::ArgAction::Count, global = true, help = "Increase debug level (use -d for debug, -dd for trace)")]
    debug: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every forecast hour of a run, waiting for files not yet published.
    Fetch {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        location: LocationArgs,

        /// seconds to wait before checking again for a file not yet published
        #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u64).range(1..))]
        absent_interval: u64,

        /// seconds to wait after a network or disk error
        #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
        fault_interval: u64,

        /// upper bound in seconds of a random delay added to every wait
        #[arg(long, default_value_t = 0)]
        jitter: u64,

        /// limit in seconds on a whole request, download included. Unlimited by default
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        request_timeout: Option<u64>,
    },
    /// Print the files a fetch would download, without touching the network.
    Plan {
        #[command(flatten)]
        run: RunArgs,

        #[command(flatten)]
        location: LocationArgs,
    },
}

#[derive(Args)]
struct RunArgs {
    /// year of the forecast run
    #[arg(short, long)]
    year: u32,

    /// month of the forecast run
    #[arg(short, long)]
    month: u32,

    /// day of the forecast run
    #[arg(long)]
    day: u32,

    /// cycle hour of the run (00, 06, 12 or 18 UTC)
    #[arg(short, long, default_value_t = 0)]
    cycle: u32,

    /// first forecast hour
    #[arg(short, long, default_value_t = 0)]
    start: u32,

    /// last forecast hour. The interval is inclusive
    #[arg(short, long, default_value_t = 24)]
    end: u32,

    /// hours between forecast files
    #[arg(long, default_value_t = 3)]
    step: u32,
}

impl RunArgs {
    fn spec(&self) -> Result<RunSpecification, anyhow::Error> {
        RunSpecification::new(
            self.year, self.month, self.day, self.cycle, self.start, self.end, self.step,
        )
        .context("invalid forecast run")
    }
}

#[derive(Args)]
struct LocationArgs {
    /// url the run directories are published under, or a local mirror directory
    #[arg(short, long, env = "GFS_REMOTE_ROOT", default_value = DEFAULT_REMOTE_ROOT)]
    remote_root: String,

    /// directory run directories are created in
    #[arg(short, long, env = "GFS_OUTPUT_DIR", default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: String,
}

impl LocationArgs {
    fn layout(&self) -> Result<Layout, anyhow::Error> {
        Layout::new(&self.remote_root, &self.output_dir)
            .with_context(|| format!("Invalid remote root: {}", self.remote_root))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = match cli.debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<(), anyhow::Error> {
    match command {
        Commands::Fetch {
            run,
            location,
            absent_interval,
            fault_interval,
            jitter,
            request_timeout,
        } => {
            let spec = run.spec()?;
            let layout = location.layout()?;
            let options = StoreOptions {
                request_timeout: request_timeout.map(Duration::from_secs),
            };
            let remote = store::new(layout.remote_root(), &options)?;
            let policy = RetryPolicy {
                absent_interval: Duration::from_secs(absent_interval),
                fault_interval: Duration::from_secs(fault_interval),
                jitter: Duration::from_secs(jitter),
            };

            let coordinator =
                BatchCoordinator::new(FileAcquirer::new(Arc::new(remote), policy), layout);
            let report = coordinator.run_batch(&spec).await?;

            println!(
                "{} files resolved ({} verified, {} retired) in {:.0?}",
                report.resolved(),
                report.verified,
                report.retired,
                report.elapsed
            );
        }
        Commands::Plan { run, location } => {
            let spec = run.spec()?;
            let layout = location.layout()?;

            println!("{}", layout.local_dir(&spec).display());
            for task in layout.tasks(&spec)? {
                println!(
                    "{}\t{}\t{}",
                    task.file_name(),
                    task.remote_url(),
                    task.local_path().display()
                );
            }
        }
    }

    Ok(())
}
