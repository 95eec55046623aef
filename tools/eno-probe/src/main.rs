//! eno-probe - ENO one Modbus probe
//!
//! Reads the register map of an Enovates ENO one charger over Modbus TCP and
//! prints it as YAML or JSON. Also sets the EMS current limit.

mod output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use enovates_modbus::{ClientConfig, EnoOneClient, SUPPORTED_API_VERSION};
use figment::providers::Serialized;
use serde::Serialize;
use std::path::PathBuf;
use tracing::debug;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "eno-probe")]
#[command(about = "Probe an Enovates ENO one charger over Modbus TCP")]
#[command(long_about = "Probe an Enovates ENO one charger over Modbus TCP

Connection settings are layered: built-in defaults, then --config file
(.yaml/.toml/.json), then ENO_* environment variables, then command-line flags.

Examples:
  eno-probe --host 192.168.1.50 version        # Check firmware API version
  eno-probe --host 192.168.1.50 show           # Read every register group
  eno-probe --host charger get measurements    # Read one group
  eno-probe --host charger set-ems-limit 6000  # Limit to 6 A
  eno-probe registers                          # Print the register table")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Charger hostname or IP address
    #[arg(long, global = true)]
    host: Option<String>,

    /// Modbus TCP port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Modbus unit id
    #[arg(short, long, global = true)]
    unit_id: Option<u8>,

    /// Exchange timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Yaml)]
    format: OutputFormat,

    /// Read even if the firmware API version is not supported
    #[arg(long, global = true)]
    force: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the firmware Modbus API version
    Version,

    /// Read every register group in one session
    Show,

    /// Read a single register group
    Get {
        #[arg(value_enum)]
        record: Record,
    },

    /// Set the EMS current limit
    SetEmsLimit {
        /// Limit in mA (0-65535)
        milliamps: u32,
    },

    /// Print the register table without connecting
    Registers,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Record {
    State,
    Measurements,
    Mode3,
    EmsLimit,
    TransactionToken,
    CurrentOffered,
    Diagnostics,
}

/// Flag values that override the layered configuration
#[derive(Serialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit_id: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let overrides = Overrides {
            host: self.host.clone(),
            port: self.port,
            unit_id: self.unit_id,
            timeout_ms: self.timeout_ms,
        };
        let config = ClientConfig::figment(self.config.as_deref())?
            .merge(Serialized::defaults(overrides))
            .extract::<ClientConfig>()
            .map_err(enovates_modbus::Error::from)
            .context("Failed to load client configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Registers = cli.command {
        output::print_register_table();
        return Ok(());
    }

    let config = cli.client_config()?;
    debug!("Using {:?}", config);
    let target = format!("{}:{}", config.host, config.port);
    let client = EnoOneClient::from_config(config)?.with_version_override(cli.force);
    client
        .transport()
        .await
        .with_context(|| format!("Failed to connect to {}", target))?;

    let result = run(&cli, &client).await;
    client.close().await?;
    result
}

async fn run(cli: &Cli, client: &EnoOneClient) -> Result<()> {
    let compatible = client.check_version().await?;

    if let Commands::Version = cli.command {
        let version = client.get_api_version().await?;
        let verdict = if compatible {
            "supported".green()
        } else {
            "not supported".red()
        };
        eprintln!(
            "{} API {} ({}, client supports {})",
            "INFO".bright_cyan(),
            version,
            verdict,
            SUPPORTED_API_VERSION
        );
        return cli.format.print(&version);
    }

    if !compatible {
        if !cli.force {
            bail!(
                "Charger API version is not supported (client supports {}); use --force to read anyway",
                SUPPORTED_API_VERSION
            );
        }
        eprintln!(
            "{} Reading registers of an unsupported API version",
            "WARN".yellow()
        );
    }

    match &cli.command {
        Commands::Show => cli.format.print(&client.snapshot().await?),
        Commands::Get { record } => match record {
            Record::State => cli.format.print(&client.get_state().await?),
            Record::Measurements => cli.format.print(&client.get_measurements().await?),
            Record::Mode3 => cli.format.print(&client.get_mode3_details().await?),
            Record::EmsLimit => cli.format.print(&client.get_ems_limit().await?),
            Record::TransactionToken => cli.format.print(&client.get_transaction_token().await?),
            Record::CurrentOffered => cli.format.print(&client.get_current_offered().await?),
            Record::Diagnostics => cli.format.print(&client.get_diagnostics().await?),
        },
        Commands::SetEmsLimit { milliamps } => {
            client.set_ems_limit(*milliamps).await?;
            eprintln!(
                "{} EMS limit set to {} mA",
                "OK".green(),
                milliamps
            );
            Ok(())
        },
        Commands::Version | Commands::Registers => Ok(()),
    }
}
