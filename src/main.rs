//! varan CLI.
//!
//! Three execution modes, selected by flags:
//!
//! - batch: `varan <config> [--archive]`
//! - server: `varan --server[=HOST::PORT] <config>`
//! - client: `varan --client=HOST::PORT <payload>`

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use varan::{build_runtime, run_batch, run_client, run_server, Config};

#[derive(Parser)]
#[command(name = "varan")]
#[command(about = "Incremental product-line analysis infrastructure", long_about = None)]
struct Cli {
    /// Configuration file (batch and server modes) or message payload
    /// (client mode)
    #[arg(value_name = "CONFIG|PAYLOAD")]
    input: String,

    /// Run as analysis server, optionally at a custom HOST::PORT
    #[arg(long, value_name = "HOST::PORT", require_equals = true, num_args = 0..=1)]
    server: Option<Option<String>>,

    /// Send the payload to a running analysis server at HOST::PORT
    #[arg(long, value_name = "HOST::PORT", require_equals = true, conflicts_with = "server")]
    client: Option<String>,

    /// Archive the analysis summary after a batch run
    #[arg(long, conflicts_with_all = ["server", "client"])]
    archive: bool,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();
    let runtime = build_runtime(None)?;

    if let Some(address) = cli.client {
        let reply = runtime.block_on(run_client(&address, &cli.input))?;
        println!("{}", reply);
    } else if let Some(address) = cli.server {
        let config = load_config(&cli.input)?;
        runtime.block_on(run_server(config, address))?;
    } else {
        let config = load_config(&cli.input)?;
        runtime.block_on(run_batch(config, cli.archive))?;
    }

    Ok(())
}

fn load_config(path: &str) -> Result<Config> {
    let path = PathBuf::from(path);
    if !path.is_file() {
        anyhow::bail!("Configuration file {} does not exist", path.display());
    }
    Config::from_file(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_batch() {
        let cli = Cli::try_parse_from(["varan", "config.yaml"]).unwrap();
        assert!(cli.server.is_none());
        assert!(cli.client.is_none());
        assert!(!cli.archive);
        assert_eq!(cli.input, "config.yaml");
    }

    #[test]
    fn test_cli_parse_batch_with_archive() {
        let cli = Cli::try_parse_from(["varan", "config.yaml", "--archive"]).unwrap();
        assert!(cli.archive);
    }

    #[test]
    fn test_cli_parse_server_default_address() {
        let cli = Cli::try_parse_from(["varan", "--server", "config.yaml"]).unwrap();
        assert_eq!(cli.server, Some(None));
        assert_eq!(cli.input, "config.yaml");
    }

    #[test]
    fn test_cli_parse_server_custom_address() {
        let cli =
            Cli::try_parse_from(["varan", "--server=127.0.0.1::4000", "config.yaml"]).unwrap();
        assert_eq!(cli.server, Some(Some("127.0.0.1::4000".to_string())));
    }

    #[test]
    fn test_cli_parse_client() {
        let cli = Cli::try_parse_from(["varan", "--client=127.0.0.1::3141", "payload"]).unwrap();
        assert_eq!(cli.client.as_deref(), Some("127.0.0.1::3141"));
        assert_eq!(cli.input, "payload");
    }

    #[test]
    fn test_cli_client_and_server_conflict() {
        let result =
            Cli::try_parse_from(["varan", "--client=127.0.0.1::3141", "--server", "payload"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["varan"]).is_err());
    }
}
