//! Entry point of the dispatcher.
//!
//! - `courier poll` receives batches from the queue until SIGINT/SIGTERM
//! - `courier event --file <path>` processes one SQS event file and exits

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier::{
    Container, Controller, Settings,
    controller::{SHUTDOWN_BROADCAST, shutdown},
    event,
};
use courier_common::{internal, logging};

/// Queue driven email notification dispatcher
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Send templated emails requested on a queue", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll the queue until interrupted
    Poll,
    /// Process the records of one SQS event file
    Event {
        /// Path to a JSON file of the form {"Records": [...]}
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    let settings = Settings::from_env()?;
    let container = Container::build(&settings).await?;

    let result = match cli.command {
        Commands::Poll => poll(&container, &settings).await,
        Commands::Event { file } => run_event(&container, &settings, file).await,
    };

    container.close().await;
    result
}

async fn poll(container: &Container, settings: &Settings) -> anyhow::Result<()> {
    let controller = Controller::new(container.processor(), container.queue(), &settings.queue);

    tokio::select! {
        () = controller.serve(SHUTDOWN_BROADCAST.subscribe()) => {}
        r = shutdown() => r?,
    }

    internal!(level = INFO, "Shutting down...");
    Ok(())
}

async fn run_event(container: &Container, settings: &Settings, file: PathBuf) -> anyhow::Result<()> {
    let records = event::read_event(&file).await?;
    internal!(level = INFO, file = %file.display(), records = records.len(), "Processing event");

    let report = event::dispatch(&container.processor(), &records, settings.queue.batch_deadline).await?;

    internal!(
        level = INFO,
        successes = report.successes(),
        failures = report.failures(),
        skipped = report.skipped(),
        "Event processed"
    );
    Ok(())
}
