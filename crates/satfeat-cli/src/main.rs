use anyhow::Result;
use clap::Parser;
use satfeat_cli::cli::{Cli, Commands};
use satfeat_cli::commands::{inspect, run};
use tracing::error;
use tracing_subscriber::FmtSubscriber;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {err}");
    }

    if let Err(err) = dispatch(cli.command) {
        error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            config,
            start_year,
            end_year,
            out,
            seed,
        } => run::handle(
            &config,
            &run::RunOverrides {
                start_year,
                end_year,
                output_dir: out,
                seed,
            },
        ),
        Commands::Validate { config } => inspect::validate(&config),
        Commands::Periods { config, format } => inspect::periods(&config, format),
        Commands::Partition {
            config,
            partitions,
            format,
        } => inspect::partition(&config, partitions, format),
    }
}
