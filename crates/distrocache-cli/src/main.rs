use std::path::PathBuf;

use clap::Parser;
use cli::{Args, Commands};
use distrocache_config::config::Config;
use distrocache_core::{Coordinator, Store};
use error::CliResult;
use logging::setup_logging;
use sets::{drop_set, list_sets};
use tracing::{debug, info};
use utils::{set_color, OutputFormat};

mod cli;
mod error;
mod logging;
mod server;
mod sets;
mod utils;

fn load_config(args: &Args) -> CliResult<Config> {
    let path = args.config.as_deref().map(PathBuf::from);
    let mut config = Config::load(path.as_deref())?;
    if let Some(database_file) = &args.database_file {
        config.database_path = Some(database_file.clone());
    }
    Ok(config)
}

async fn print_snapshot(
    coordinator: &Coordinator,
    distribution: &str,
    set_ref: &str,
    format: OutputFormat,
) -> CliResult<()> {
    let snapshot = coordinator.snapshot(distribution, set_ref).await?;
    debug!(
        distribution,
        name = %snapshot.set.name,
        repositories = snapshot.repo_states.len(),
        "resolved snapshot"
    );
    print!("{}", format.render(&snapshot)?);
    Ok(())
}

async fn handle_cli() -> CliResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    if args.no_color {
        set_color(false);
    }

    let config = load_config(&args)?;

    match &args.command {
        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
        Commands::Serve {
            host,
            port,
        } => {
            let coordinator = Coordinator::from_config(&config)?;
            info!(
                "Serving distribution sets from {}",
                config.distro.repository
            );
            server::serve(coordinator, host, *port).await?;
        }
        Commands::Snapshot {
            distribution,
            set_ref,
            format,
        } => {
            let coordinator = Coordinator::from_config(&config)?;
            print_snapshot(&coordinator, distribution, set_ref, *format).await?;
        }
        Commands::Sets {
            distribution,
        } => {
            let store = Store::open(config.get_database_path()?)?;
            list_sets(&store, distribution.as_deref(), args.json)?;
        }
        Commands::DropSet {
            distribution,
            name,
        } => {
            let store = Store::open(config.get_database_path()?)?;
            drop_set(&store, distribution, name)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli().await {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
