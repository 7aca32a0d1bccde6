use clap::{Parser, Subcommand};
use log::{error, info};
use smsgate::configuration::{init_logging, Config};
use smsgate::controller::Controller;
use smsgate::error_handling::types::ControllerError;
use smsgate::ingestion::RunOutcome;
use smsgate::web_interface::render_messages_text;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "smsgate")]
#[command(version = "0.0.2")]
#[command(about = "SMS ingestion gateway for a fleet of GSM modems")]
struct Args {
    /// Path to the TOML configuration file
    config_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web interface and the periodic ingest and reconcile timer
    Serve,
    /// Run one ingestion pass, then one reconciliation
    Ingest,
    /// Compare every SIM's serving cell against the number registry
    Reconcile,
    /// List the modems attached to this host
    Scan,
    /// Manage the number registry
    Number {
        #[command(subcommand)]
        action: NumberCommand,
    },
    /// Print stored messages, newest first
    Messages,
}

#[derive(Subcommand)]
enum NumberCommand {
    List,
    Add {
        imsi: String,
        number: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    Edit {
        imsi: String,
        #[arg(long)]
        number: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        imsi: String,
    },
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Unable to serialize output: {}", e),
    }
}

async fn execute(controller: Controller, command: Command) -> Result<(), ControllerError> {
    let connector = controller.config().serial_connector();
    match command {
        Command::Serve => {
            controller.discover(&connector).await?;
            Arc::new(controller).run().await?;
        }
        Command::Ingest => {
            controller.discover(&connector).await?;
            match controller.ingest_once().await? {
                RunOutcome::Completed(report) => print_json(&report),
                RunOutcome::Skipped => info!("Another ingestion run is in progress"),
            }
            print_json(&controller.reconcile_once().await);
            controller.shutdown().await;
        }
        Command::Reconcile => {
            controller.discover(&connector).await?;
            print_json(&controller.reconcile_once().await);
            controller.shutdown().await;
        }
        Command::Scan => {
            for device in controller.scan(&connector)? {
                println!("{}\t{}\t{}", device.device_id, device.path.display(), device.imei);
            }
        }
        Command::Number { action } => match action {
            NumberCommand::List => {
                for entry in controller.list_numbers().await? {
                    println!(
                        "{}\t{}\t{}\t{}",
                        entry.imsi,
                        entry.number.as_deref().unwrap_or("-"),
                        entry.cid.as_deref().unwrap_or("-"),
                        entry.description
                    );
                }
            }
            NumberCommand::Add {
                imsi,
                number,
                description,
            } => controller.add_number(&imsi, &number, &description).await?,
            NumberCommand::Edit {
                imsi,
                number,
                description,
            } => {
                controller.edit_number(&imsi, number, description).await?;
            }
            NumberCommand::Delete { imsi } => controller.delete_number(&imsi).await?,
        },
        Command::Messages => {
            print!("{}", render_messages_text(&controller.messages().await?));
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Get command-line arguments
    let args = Args::parse();

    let config = match Config::from_file(&args.config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Unable to import configuration from {}: {}",
                args.config_file.display(),
                e
            );
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config) {
        eprintln!("Unable to set up logging: {}", e);
        std::process::exit(1);
    }
    info!("Configuration imported successfully");

    let controller = match Controller::new(config).await {
        Ok(controller) => controller,
        Err(e) => {
            error!("Unable to create a controller instance: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = execute(controller, args.command).await {
        error!("Error occured in the controller process: {}, exiting...", e);
        std::process::exit(1);
    }
}
