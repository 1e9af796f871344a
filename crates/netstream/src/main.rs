//! nst: inspect files, pipes and sockets through netstream.
//!
//! - `nst transports` lists the registered socket schemes
//! - `nst serve <uri>` runs a line echo server on a caller-side event loop
//! - `nst connect <uri>` sends a line and prints the reply
//! - `nst inspect <path>` prints a file stream's capabilities and metadata

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use netstream_core::config::{Config, LogFormat};
use netstream_core::logging::{LogLevel, init_logging};
use netstream_core::{Endpoint, StreamCollection, StreamFactory, SystemTransport, Transport};
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key of the listening socket inside the serve loop's collection.
const SERVER_KEY: &str = "server";

/// Longest line the echo server reads in one go.
const MAX_LINE: usize = 8192;

#[derive(Parser)]
#[command(name = "nst", version, about = "Uniform streams over files, pipes and sockets")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "NETSTREAM_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the socket schemes the system transport registers
    Transports,

    /// Echo lines back to every client until enough clients have left
    Serve {
        /// Listen URI, e.g. tcp://127.0.0.1:7000 or unix:///tmp/nst.sock
        uri: String,

        /// Exit after this many clients have disconnected
        #[arg(long)]
        max_clients: Option<usize>,
    },

    /// Connect, optionally send one line, and print everything received
    Connect {
        uri: String,

        /// Line to send before half-closing the connection
        #[arg(long)]
        send: Option<String>,

        /// Connect timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Open a file and print its stream properties as JSON
    Inspect {
        path: PathBuf,

        /// Open mode (r, r+, w, a+, ...)
        #[arg(long, default_value = "r")]
        mode: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<netstream_core::Error>() {
                Some(stream_err) => eprintln!("error[{}]: {err:#}", stream_err.code()),
                None => eprintln!("error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level.to_string();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    init_logging(&config.logging).context("failed to initialize logging")?;
    let factory = StreamFactory::with_config(&config);

    match cli.command {
        Commands::Transports => {
            for scheme in SystemTransport::new().transports() {
                println!("{scheme}");
            }
            Ok(())
        }
        Commands::Serve { uri, max_clients } => serve(&factory, &config, &uri, max_clients),
        Commands::Connect {
            uri,
            send,
            timeout_ms,
        } => connect(&factory, &uri, send.as_deref(), timeout_ms),
        Commands::Inspect { path, mode } => inspect(&factory, &path, &mode),
    }
}

fn serve(
    factory: &StreamFactory,
    config: &Config,
    uri: &str,
    max_clients: Option<usize>,
) -> Result<()> {
    let mut server = factory.create_socket_server(uri, None)?;
    server.set_blocking(false)?;
    let local = server.get_local_name()?;
    println!("listening on {local}");
    io::stdout().flush()?;
    info!(uri, local = %local, "serving");

    let mut collection = factory.create_stream_collection();
    collection.attach(server.into(), Some(SERVER_KEY))?;
    let tick = config.server.accept_timeout();
    let mut finished = 0usize;

    while max_clients.is_none_or(|max| finished < max) {
        for key in collection.wait_read(tick)? {
            if key == SERVER_KEY {
                accept_pending(&mut collection)?;
                continue;
            }

            let Some(socket) = collection.get_mut(&key).and_then(Endpoint::as_socket_mut) else {
                continue;
            };
            let done = match socket.read_line(MAX_LINE) {
                Ok(Some(line)) => {
                    debug!(key = %key, bytes = line.len(), "echo");
                    socket.write(&line).is_err()
                }
                Ok(None) => socket.eof(),
                Err(err) => {
                    warn!(key = %key, error = %err, "read failed");
                    true
                }
            };
            if done {
                collection.detach(&key);
                finished += 1;
                info!(key = %key, finished, "client disconnected");
            }
        }
    }
    Ok(())
}

/// Accept every queued connection on the listening socket and attach it.
///
/// Peers are switched to non-blocking so that a client holding back the end
/// of a line cannot stall the loop inside `read_line`.
fn accept_pending(collection: &mut StreamCollection<Endpoint>) -> Result<Vec<String>> {
    let mut accepted = Vec::new();
    if let Some(server) = collection.get_mut(SERVER_KEY).and_then(Endpoint::as_server_mut) {
        while let Some(peer) = server.accept(None)? {
            accepted.push(peer);
        }
    }
    let mut keys = Vec::with_capacity(accepted.len());
    for mut peer in accepted {
        peer.set_blocking(false)?;
        let peer_name = peer.get_remote_name().unwrap_or_default();
        let key = collection.attach(peer.into(), None)?;
        info!(key = %key, peer = %peer_name, "client connected");
        keys.push(key);
    }
    Ok(keys)
}

fn connect(
    factory: &StreamFactory,
    uri: &str,
    send: Option<&str>,
    timeout_ms: Option<u64>,
) -> Result<()> {
    let mut client = factory.create_socket_client(uri);
    if let Some(ms) = timeout_ms {
        client.set_timeout(Some(Duration::from_millis(ms)));
    }
    let mut stream = client.connect()?;
    if let Some(text) = send {
        stream.write(text.as_bytes())?;
        stream.write(b"\n")?;
    }
    stream.close_write()?;
    let reply = stream.get_contents()?;
    io::stdout().write_all(&reply)?;
    Ok(())
}

fn inspect(factory: &StreamFactory, path: &std::path::Path, mode: &str) -> Result<()> {
    let stream = factory.create_stream_from_file(path, mode)?;
    let report = serde_json::json!({
        "path": path.display().to_string(),
        "readable": stream.is_readable(),
        "writable": stream.is_writable(),
        "seekable": stream.is_seekable(),
        "size": stream.get_size(),
        "metadata": stream.get_metadata(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_override_config() {
        let cli = Cli::parse_from([
            "nst",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "transports",
        ]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        assert!(Cli::try_parse_from(["nst", "--log-level", "loud", "transports"]).is_err());
    }

    #[test]
    fn accepted_peers_are_non_blocking() {
        let factory = StreamFactory::new();
        let mut server = factory
            .create_socket_server("tcp://127.0.0.1:0", None)
            .unwrap();
        let address = server.get_local_name().unwrap();
        server.set_blocking(false).unwrap();
        let mut collection = factory.create_stream_collection();
        collection.attach(server.into(), Some(SERVER_KEY)).unwrap();

        let mut client = factory
            .create_socket_client(&format!("tcp://{address}"))
            .connect()
            .unwrap();
        // half a line, no newline yet
        client.write(b"partial").unwrap();

        let keys = (0..50)
            .find_map(|_| {
                let keys = accept_pending(&mut collection).unwrap();
                if keys.is_empty() {
                    std::thread::sleep(Duration::from_millis(10));
                    None
                } else {
                    Some(keys)
                }
            })
            .expect("client connection is accepted");
        assert_eq!(keys.len(), 1);
        let peer = collection
            .get_mut(&keys[0])
            .and_then(Endpoint::as_socket_mut)
            .unwrap();
        assert_eq!(peer.is_blocking(), Some(false));

        // the loop reads what is there and returns instead of waiting for the rest
        let mut partial = Vec::new();
        for _ in 0..50 {
            if let Some(bytes) = peer.read_line(MAX_LINE).unwrap() {
                partial.extend(bytes);
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(partial, b"partial");
        assert!(!peer.eof());
    }

    #[test]
    fn inspect_defaults_to_read_mode() {
        let cli = Cli::parse_from(["nst", "inspect", "/etc/hosts"]);
        match cli.command {
            Commands::Inspect { mode, .. } => assert_eq!(mode, "r"),
            _ => panic!("expected inspect"),
        }
    }
}
