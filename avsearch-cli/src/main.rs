mod cli;
mod commands;
mod config;
mod error;
mod output;

use crate::{
    cli::{Args, Commands, LogFormat},
    commands::{CommandExecutor, WatchOptions},
    config::{AppConfig, Overrides},
    error::Result,
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use std::process;
use tracing::{Level, debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    let output_format = args.command.output_format();

    if let Err(e) = run(args).await {
        match output_format {
            Some(format) if format.is_json() => {
                let error_json = serde_json::json!({
                    "status": "error",
                    "message": e.to_string(),
                });
                println!("{}", error_json);
            }
            _ => {
                error!("Application error: {}", e);
                #[cfg(feature = "colored-output")]
                {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                }
                #[cfg(not(feature = "colored-output"))]
                {
                    eprintln!("Error: {}", e);
                }
            }
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet, args.log_format);

    let config = AppConfig::load(args.config.as_deref())?;
    debug!("Loaded configuration from {:?}", args.config);

    let overrides = Overrides {
        endpoint: args.endpoint,
        token: args.token,
        namespace: args.namespace,
        bucket: args.bucket,
        timeout_secs: args.timeout,
    };
    let executor = CommandExecutor::new(config, overrides);

    match args.command {
        Commands::Status { key, output } => executor.status(&key, output).await?,

        Commands::Watch {
            key,
            interval,
            follow,
            give_up_after,
            output,
        } => {
            executor
                .watch(
                    &key,
                    WatchOptions {
                        interval,
                        follow,
                        give_up_after,
                    },
                    output,
                )
                .await?
        }

        Commands::List { output } => executor.list(output).await?,

        Commands::Upload {
            file,
            watch,
            interval,
            output,
        } => {
            let watch = watch.then_some(WatchOptions {
                interval,
                follow: false,
                give_up_after: None,
            });
            executor.upload(&file, watch, output).await?
        }

        Commands::Search {
            query,
            limit,
            threshold,
            output,
        } => executor.search(&query, limit, threshold, output).await?,

        Commands::Transcript { key, output } => executor.transcript(&key, output).await?,

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }

        Commands::Config { show, reset, path } => {
            if reset {
                AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults");
            } else if show {
                let config = AppConfig::load(args.config.as_deref())?;
                println!("{}", config.show()?);
            } else if path {
                match args.config {
                    Some(file) => println!("{}", file.display()),
                    None => println!("{}", AppConfig::default_path()?.display()),
                }
            } else {
                println!(
                    "Use --show to display current configuration, --reset to reset to defaults or --path to locate the file"
                );
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, format: LogFormat) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Text => subscriber
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(verbose)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
