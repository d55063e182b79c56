use anyhow::Context;
use clap::{Arg, ArgAction, ArgMatches, Command};
use etl::{Stage, run_etl_pipeline};
use std::process;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config/etl.toml";

fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .default_value(DEFAULT_CONFIG)
        .help("Sets a custom config file")
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(stage: Stage, matches: &ArgMatches) -> anyhow::Result<()> {
    let config_path = matches
        .get_one::<String>("config")
        .map(|s| s.as_str())
        .unwrap_or(DEFAULT_CONFIG);

    let written = run_etl_pipeline(config_path, stage)
        .await
        .with_context(|| format!("ETL run failed (config: {})", config_path))?;

    for summary in written {
        println!("{}\t{} rows\t{}", summary.table, summary.rows, summary.location);
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let matches = Command::new("ETL Pipeline Manager")
        .version("1.0")
        .about("Builds the listening-analytics star schema from raw catalog and event logs")
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("run")
                .about("Run the catalog and event stages")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("catalog")
                .about("Build the tracks and creators tables")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("events")
                .about("Build the listeners, time buckets and playback events tables")
                .arg(config_arg()),
        )
        .get_matches();

    init_logging(matches.get_flag("json-logs"));

    let result = match matches.subcommand() {
        Some(("run", sub)) => run(Stage::All, sub).await,
        Some(("catalog", sub)) => run(Stage::Catalog, sub).await,
        Some(("events", sub)) => run(Stage::Events, sub).await,
        _ => {
            eprintln!("Please specify a valid subcommand");
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("ETL pipeline error: {:#}", e);
        process::exit(1);
    }
}
