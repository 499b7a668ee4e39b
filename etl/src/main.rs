use clap::{Arg, ArgAction, Command};
use std::io::Write;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let matches = Command::new("ETL Pipeline Manager")
        .version("1.0")
        .about("Fetches weather for every configured user and prints the combined CSV")
        .subcommand(
            Command::new("etl")
                .about("Run the extraction step only")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("history")
                        .long("history")
                        .action(ArgAction::SetTrue)
                        .help("Fetch the historic snapshot instead of the forecast"),
                ),
        )
        .get_matches();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match matches.subcommand() {
        Some(("etl", etl_matches)) => {
            let config_path = etl_matches.get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/config.yaml");
            let history = etl_matches.get_flag("history");
            tracing::info!(config = config_path, history, "Starting extraction");

            match etl::run_etl_pipeline(config_path, history).await {
                Ok(csv) => {
                    if let Err(e) = std::io::stdout().write_all(&csv) {
                        eprintln!("Failed to write CSV: {}", e);
                        process::exit(1);
                    }
                }
                Err(e) => {
                    eprintln!("ETL pipeline error: {}", e);
                    process::exit(1);
                }
            }
        },

        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    }
}
