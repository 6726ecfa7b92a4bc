use crate::demo::{run_demo, run_due, DemoArgs, DueArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use kos_billing::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Kos Billing",
    about = "Run the boarding-house billing service or inspect due dates from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Show the due date, days remaining and reminder tier for a billing period
    Due(DueArgs),
    /// Run generate, reconcile, scan and broadcast against an in-memory directory
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Tenant directory CSV (tenant_id,name,phone,room_id,room_name,price)
    #[arg(long)]
    pub(crate) directory: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Due(args) => run_due(args),
        Command::Demo(args) => run_demo(args),
    }
}
