use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{fmt, EnvFilter};

use pinshare_core::{
    ChunkSizing, ReceiveRequest, SendRequest, TcpTransferer, TransferConfig, Transferer,
};

#[derive(Parser, Debug)]
#[command(name = "pinshare", version, about = "PIN-authenticated LAN file transfer")]
struct Cli {
    /// Set log level: error,warn,info,debug,trace
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// JSON config file (default: <config dir>/pinshare/config.json if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Payload chunk size in bytes, or "auto"
    #[arg(long, global = true, value_parser = parse_chunk_size)]
    chunk_size: Option<ChunkSizing>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send a file or directory to a waiting receiver
    Send {
        /// Receiver host name or IP
        #[arg(long)]
        host: String,

        /// Receiver port
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,

        /// Shared PIN
        #[arg(long)]
        pin: String,

        /// File or directory to send
        #[arg(long)]
        file: PathBuf,

        /// Refuse hosts outside the local network
        #[arg(long)]
        local_only: bool,
    },

    /// Wait for one sender and save what it sends
    Receive {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,

        /// Port to listen on
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        port: Option<u16>,

        /// Shared PIN
        #[arg(long)]
        pin: String,

        /// Where received files are written
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        /// Refuse bind addresses outside the local network
        #[arg(long)]
        local_only: bool,
    },

    /// List this machine's addresses and their scope
    Interfaces {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn parse_chunk_size(s: &str) -> Result<ChunkSizing, String> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(ChunkSizing::Auto);
    }
    let bytes: usize = s
        .parse()
        .map_err(|_| format!("expected a byte count or \"auto\", got {:?}", s))?;
    ChunkSizing::fixed(bytes).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_target(false)
        .init();

    tokio::select! {
        res = run(cli) => match res {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{:#}", e);
                println!("✗ {:#}", e);
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            println!("\n✗ Interrupted");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = load_config(cli.config.as_ref())?;
    if let Some(chunk_size) = cli.chunk_size {
        cfg.chunk_size = chunk_size;
    }

    match cli.cmd {
        Commands::Send { host, port, pin, file, local_only } => {
            let local_only = cfg.local_only || local_only;
            let cfg = cfg.with_local_only(local_only);
            let port = port.unwrap_or(cfg.port);
            log_scope(&host).await;

            println!("Sending {} to {}:{} (chunk size: {})", file.display(), host, port, cfg.chunk_size);
            let transferer = TcpTransferer::new(cfg)?;
            let report = transferer
                .send(SendRequest { host, port, pin, path: file })
                .await
                .context("Send failed")?;

            println!("✓ Sent {}", report.name);
            println!("  Size: {} bytes", report.bytes);
            println!("  Chunk size: {} bytes", report.chunk_size);
            println!(
                "  Time: {:.2}s ({:.2} MiB/s)",
                report.elapsed.as_secs_f64(),
                report.throughput_mib_s()
            );
            println!("  SHA-256: {}", report.digest_hex());
        }

        Commands::Receive { bind, port, pin, output_dir, local_only } => {
            let local_only = cfg.local_only || local_only;
            let cfg = cfg.with_local_only(local_only);
            let bind = bind.unwrap_or_else(|| cfg.bind.clone());
            let port = port.unwrap_or(cfg.port);
            log_scope(&bind).await;

            println!("Waiting for a sender on {}:{}", bind, port);
            println!("  Output directory: {}", output_dir.display());
            println!("  Press Ctrl+C to stop");
            let transferer = TcpTransferer::new(cfg)?;
            let report = transferer
                .receive(ReceiveRequest { bind, port, pin, output_dir })
                .await
                .context("Receive failed")?;

            println!("✓ Received {}", report.path.display());
            if let Some(peer) = report.peer {
                println!("  From: {}", peer);
            }
            println!("  Size: {} bytes", report.bytes);
            println!(
                "  Time: {:.2}s ({:.2} MiB/s)",
                report.elapsed.as_secs_f64(),
                report.throughput_mib_s()
            );
            println!("  SHA-256: {}", report.digest_hex());
        }

        Commands::Interfaces { json } => {
            let ips = locality::interface_addrs().context("Failed to list interfaces")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ips)?);
            } else {
                println!("Found {} address(es):", ips.len());
                for item in ips {
                    let lo = if item.is_loopback { ", loopback" } else { "" };
                    println!("  {:<12} {:<40} {}{}", item.name, item.ip, item.scope, lo);
                }
            }
        }
    }

    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pinshare").join("config.json"))
}

/// An explicit `--config` must exist; the default location is optional.
fn load_config(explicit: Option<&PathBuf>) -> Result<TransferConfig> {
    let path = match explicit {
        Some(p) => p.clone(),
        None => match default_config_path().filter(|p| p.exists()) {
            Some(p) => p,
            None => return Ok(TransferConfig::default()),
        },
    };

    tracing::debug!("Loading config from {}", path.display());
    TransferConfig::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
}

async fn log_scope(host: &str) {
    match locality::classify(host).await {
        Ok((ip, scope)) => tracing::info!("{} is {} ({})", host, ip, scope),
        Err(e) => tracing::warn!("{}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chunk_size() {
        assert_eq!(parse_chunk_size("auto").unwrap(), ChunkSizing::Auto);
        assert_eq!(parse_chunk_size("1048576").unwrap(), ChunkSizing::Fixed(1_048_576));
        assert!(parse_chunk_size("0").is_err());
        assert!(parse_chunk_size("big").is_err());
        assert!(parse_chunk_size("1125899906842624").is_err());
    }

    #[test]
    fn test_cli_parses_send() {
        let cli = Cli::try_parse_from([
            "pinshare", "--chunk-size", "65536", "send", "--host", "192.168.1.20", "--port",
            "5000", "--pin", "1234", "--file", "a.txt", "--local-only",
        ])
        .unwrap();
        assert_eq!(cli.chunk_size, Some(ChunkSizing::Fixed(65536)));
        match cli.cmd {
            Commands::Send { host, port, local_only, .. } => {
                assert_eq!(host, "192.168.1.20");
                assert_eq!(port, Some(5000));
                assert!(local_only);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_port_zero() {
        let res = Cli::try_parse_from([
            "pinshare", "receive", "--port", "0", "--pin", "1234",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_receive_defaults() {
        let cli = Cli::try_parse_from(["pinshare", "receive", "--pin", "1234"]).unwrap();
        match cli.cmd {
            Commands::Receive { bind, port, output_dir, local_only, .. } => {
                assert_eq!(bind, None);
                assert_eq!(port, None);
                assert_eq!(output_dir, PathBuf::from("."));
                assert!(!local_only);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
