//! chainpin CLI — run a connector and log the events it delivers.
//!
//! Usage:
//! ```bash
//! # Follow BatchPin and contract events from an ethconnect instance
//! chainpin listen --connector ethereum --config ethereum.json
//!
//! # Same for fabconnect, with JSON logs
//! chainpin listen --connector fabric --config fabric.json --json-logs
//!
//! # Print the signature of an FFI event
//! chainpin signature --event '{"name":"Changed","params":[{"name":"x","schema":{"type":"integer","details":{"type":"uint256"}}}]}'
//! ```

use std::env;
use std::process;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;

use chainpin_core::ffi::FfiEventDefinition;
use chainpin_core::{
    BatchPin, Callbacks, Event, EventWithSubscription, FireFlyContracts, JsonObject, Metrics,
    Plugin, PluginError, TransactionStatus, VerifierRef,
};
use chainpin_ethereum::{abi, EthereumPlugin};
use chainpin_fabric::FabricPlugin;
use chainpin_observability::{init_tracing, LogConfig, OtelMetrics};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "listen" => cmd_listen(&args[2..]).await,
        "signature" => cmd_signature(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("chainpin {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainpin {}", env!("CARGO_PKG_VERSION"));
    println!("Run FireFly blockchain connectors from the terminal\n");
    println!("USAGE:");
    println!("    chainpin <COMMAND>\n");
    println!("COMMANDS:");
    println!("    listen     Start a connector and log its events until Ctrl-C");
    println!("    signature  Print the Ethereum signature of an FFI event");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("LISTEN FLAGS:");
    println!("    --connector <ethereum|fabric>  Connector type        [required]");
    println!("    --config <FILE>                JSON connector config [required]");
    println!("    --log-level <LEVEL>            Default log level     [default: info]");
    println!("    --json-logs                    Emit JSON log lines");
    println!("    --metrics                      Record OpenTelemetry submission metrics\n");
    println!("SIGNATURE FLAGS:");
    println!("    --event <JSON>                 FFI event definition  [required]");
}

async fn cmd_listen(args: &[String]) -> Result<()> {
    let connector = parse_flag(args, "--connector").context("--connector is required")?;
    let path = parse_flag(args, "--config").context("--config is required")?;

    init_tracing(&LogConfig {
        level: parse_flag(args, "--log-level").unwrap_or_else(|| "info".into()),
        json: has_flag(args, "--json-logs"),
        ..Default::default()
    });

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))?;
    let metrics: Arc<dyn Metrics> = Arc::new(OtelMetrics::global(has_flag(args, "--metrics")));

    match connector.as_str() {
        "ethereum" => run(EthereumPlugin::new(metrics), config).await,
        "fabric" => run(FabricPlugin::new(metrics), config).await,
        other => bail!("unknown connector '{other}', expected ethereum or fabric"),
    }
}

async fn run<P: Plugin>(mut plugin: P, config: serde_json::Value) -> Result<()> {
    let config: P::Config = serde_json::from_value(config)
        .with_context(|| format!("invalid {} config", plugin.name()))?;
    plugin.init(config).await?;
    plugin.register_listener(Arc::new(LoggingCallbacks));

    let mut contracts = FireFlyContracts::default();
    plugin.configure_contract(&mut contracts).await?;
    tracing::info!(
        connector = plugin.name(),
        contract = ?contracts.active.info,
        network_version = plugin.network_version(),
        "FireFly contract configured"
    );

    plugin.start().await?;
    tracing::info!(connector = plugin.name(), "listening, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;

    plugin.shutdown();
    plugin.wait_closed().await;
    tracing::info!("stopped");
    Ok(())
}

fn cmd_signature(args: &[String]) -> Result<()> {
    let raw = parse_flag(args, "--event").context("--event is required")?;
    let event: FfiEventDefinition =
        serde_json::from_str(&raw).context("--event is not an FFI event definition")?;
    let signature = abi::event_signature(&event);
    if signature.is_empty() {
        bail!("event '{}' has parameters with no Ethereum type", event.name);
    }
    println!("{signature}");
    Ok(())
}

/// Logs every callback and accepts everything.
struct LoggingCallbacks;

#[async_trait]
impl Callbacks for LoggingCallbacks {
    async fn blockchain_op_update(
        &self,
        plugin: &str,
        op_id: &str,
        status: TransactionStatus,
        blockchain_tx_id: &str,
        error_message: &str,
        _output: &JsonObject,
    ) {
        tracing::info!(plugin, op_id, ?status, tx = blockchain_tx_id, error_message, "operation update");
    }

    async fn batch_pin_complete(
        &self,
        batch: &BatchPin,
        signing_key: &VerifierRef,
    ) -> Result<(), PluginError> {
        tracing::info!(
            namespace = %batch.namespace,
            tx = %batch.transaction_id,
            batch = %batch.batch_id,
            contexts = batch.contexts.len(),
            author = %signing_key.value,
            protocol_id = %batch.event.protocol_id,
            "batch pin"
        );
        Ok(())
    }

    async fn blockchain_network_action(
        &self,
        action: &str,
        event: &Event,
        signing_key: &VerifierRef,
    ) -> Result<(), PluginError> {
        tracing::info!(action, author = %signing_key.value, protocol_id = %event.protocol_id, "network action");
        Ok(())
    }

    async fn blockchain_event(&self, event: &EventWithSubscription) -> Result<(), PluginError> {
        tracing::info!(
            subscription = %event.subscription,
            name = %event.event.name,
            location = %event.event.location,
            protocol_id = %event.event.protocol_id,
            output = ?event.event.output,
            "blockchain event"
        );
        Ok(())
    }
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_flags() {
        let a = args(&["--connector", "fabric", "--json-logs", "--config"]);
        assert_eq!(parse_flag(&a, "--connector").as_deref(), Some("fabric"));
        assert_eq!(parse_flag(&a, "--config"), None);
        assert!(has_flag(&a, "--json-logs"));
        assert!(!has_flag(&a, "--metrics"));
    }

    #[test]
    fn signature_command() {
        let event = r#"{"name":"Changed","params":[{"name":"x","schema":{"type":"integer","details":{"type":"uint256"}}}]}"#;
        assert!(cmd_signature(&args(&["--event", event])).is_ok());
        assert!(cmd_signature(&args(&["--event", "nope"])).is_err());
        assert!(cmd_signature(&args(&[])).is_err());
        let untyped = r#"{"name":"Changed","params":[{"name":"x","schema":{"type":"integer"}}]}"#;
        assert!(cmd_signature(&args(&["--event", untyped])).is_err());
    }

    #[tokio::test]
    async fn listen_rejects_bad_input() {
        assert!(cmd_listen(&args(&["--config", "x.json"])).await.is_err());
        assert!(cmd_listen(&args(&["--connector", "fabric"])).await.is_err());
        assert!(cmd_listen(&args(&["--connector", "fabric", "--config", "/nonexistent/chainpin.json"]))
            .await
            .is_err());
    }
}
