mod cli;
mod commands;
mod context;
mod error;
mod events_printer;
mod exit;

use clap::Parser;
use cli::{Cli, Commands};
use context::AppContext;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let ctx = AppContext::new(cli.state_dir, cli.catalog_dir);

    let result = match cli.command {
        Commands::Detect => commands::detect(&ctx).await,
        Commands::Plan { tool, answer } => commands::plan(&ctx, &tool, answer).await,
        Commands::Install { tool, answer, yes, sudo_password } => {
            commands::install(&ctx, &tool, answer, yes, sudo_password).await
        }
        Commands::Update { tool, answer, yes, sudo_password } => {
            commands::install(&ctx, &tool, answer, yes, sudo_password).await
        }
        Commands::Remove { tool, yes, sudo_password } => commands::remove(&ctx, &tool, yes, sudo_password).await,
        Commands::Resume { plan_id, sudo_password } => commands::resume(&ctx, &plan_id, sudo_password).await,
        Commands::Cancel { plan_id } => commands::cancel(&ctx, &plan_id).await,
        Commands::ListPlans => commands::list_plans(&ctx).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.exit_code());
        }
    }
}
