use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use common::schema::SourceKind;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .global(true)
        .help("Sets a custom config file")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or("config/config.yaml");

    let pipeline = lakehouse::build_pipeline(config_path)
        .with_context(|| format!("Failed to initialise pipeline from {}", config_path))?;

    match matches.subcommand() {
        Some(("forecast", _)) => {
            let summary = pipeline.run_forecast_and_union().await?;
            println!("{}", summary.message());
        }
        Some(("history", _)) => {
            let summary = pipeline.fetch_historic_weather().await?;
            println!("{}", summary.message());
        }
        Some(("transform", _)) => {
            let summary = pipeline.transform_historic_weather().await?;
            println!("{}", summary.message());
        }
        Some(("load", load_matches)) => {
            let kind: SourceKind = load_matches
                .get_one::<String>("kind")
                .map(|s| s.as_str())
                .unwrap_or("forecast")
                .parse()?;
            let result = pipeline.load_to_warehouse(kind).await?;
            println!("{}", result.message());
        }
        Some(("download", download_matches)) => {
            let prefix = download_matches
                .get_one::<String>("prefix")
                .context("--prefix is required")?;
            let destination = download_matches
                .get_one::<PathBuf>("dest")
                .cloned()
                .unwrap_or_else(|| PathBuf::from("."));
            let files = pipeline
                .download_folder(prefix, &destination)
                .await
                .with_context(|| format!("Failed to download {}", prefix))?;
            println!("Downloaded {} files to {}", files.len(), destination.display());
        }
        Some(("serve", _)) => {
            let port = pipeline.settings().api_port;
            lakehouse::serve(pipeline, port).await?;
        }
        _ => anyhow::bail!("Please specify a valid subcommand"),
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = Command::new("Weather Pipeline Manager")
        .version("1.0")
        .about("Fetches forecasts and history, maintains unioned CSVs and loads them into the warehouse")
        .arg(config_arg())
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(Command::new("forecast").about("Fetch forecasts and rebuild the unioned forecast history"))
        .subcommand(Command::new("history").about("Fetch the historic weather snapshot"))
        .subcommand(Command::new("transform").about("Union all historic snapshots"))
        .subcommand(
            Command::new("load")
                .about("Bulk-load a unioned file into the warehouse")
                .arg(
                    Arg::new("kind")
                        .value_parser(["forecast", "history"])
                        .required(true)
                        .help("Which unioned file to load"),
                ),
        )
        .subcommand(
            Command::new("download")
                .about("Mirror a bucket folder to local disk")
                .arg(
                    Arg::new("prefix")
                        .long("prefix")
                        .required(true)
                        .help("Object name prefix to download"),
                )
                .arg(
                    Arg::new("dest")
                        .long("dest")
                        .value_name("DIR")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Local destination directory"),
                ),
        )
        .subcommand(Command::new("serve").about("Run the HTTP trigger API"))
        .get_matches();

    init_tracing(matches.get_flag("json"));

    if let Err(e) = run(&matches).await {
        tracing::error!(error = ?e, "Pipeline run failed");
        eprintln!("Pipeline error: {:#}", e);
        process::exit(1);
    }
}
