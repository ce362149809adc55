//! Entry point for procfs_sensor. Parses args, connects the output and runs the sensor.

use anyhow::Context;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use procfs_sensor::config::load_config;
use procfs_sensor::logging::init_logging;
use procfs_sensor::pipeline::Sensor;
use procfs_sensor::scheduler::Scheduler;
use procfs_sensor::source::CommandSource;
use procfs_sensor::transport::TransportWriter;

struct ParsedArgs {
    config: Option<PathBuf>,
    help: bool,
}

fn usage(prog: &str) -> String {
    format!("Usage: {prog} [--config FILE|-c FILE] [FILE.json]")
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<ParsedArgs, String> {
    let mut it = args.into_iter();
    let prog = it.next().unwrap_or_else(|| "procfs_sensor".into());
    let mut config: Option<PathBuf> = None;
    let mut help = false;

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => help = true,
            "--config" | "-c" => {
                config = Some(
                    it.next()
                        .map(PathBuf::from)
                        .ok_or_else(|| format!("missing value for {arg}. {}", usage(&prog)))?,
                );
            }
            _ if arg.starts_with("--config=") => {
                if let Some((_, v)) = arg.split_once('=') {
                    if !v.is_empty() {
                        config = Some(PathBuf::from(v));
                    }
                }
            }
            _ if arg.starts_with('-') => {
                return Err(format!("Unknown option {arg}. {}", usage(&prog)));
            }
            _ => {
                if config.is_none() {
                    config = Some(PathBuf::from(arg));
                } else {
                    return Err(format!("Unexpected argument. {}", usage(&prog)));
                }
            }
        }
    }

    Ok(ParsedArgs { config, help })
}

fn prompt_string(prompt: &str) -> io::Result<String> {
    eprint!("{prompt}");
    let _ = io::stderr().flush();
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("stop signal received, finishing current tick");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = match parse_args(env::args()) {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };
    if parsed.help {
        println!("{}", usage("procfs_sensor"));
        return Ok(());
    }

    let config_path = match parsed.config {
        Some(p) => p,
        None => PathBuf::from(prompt_string("Config file name: ")?),
    };
    let config = load_config(&config_path)?;
    init_logging(config.verbose)?;

    info!(
        sensor = %config.name,
        targets = ?config.target,
        interval_ms = config.sampling_interval,
        schedule = ?config.schedule,
        "starting sensor"
    );

    let (host, port) = config.output_addr();
    let stream = TcpStream::connect((host.as_str(), port))
        .await
        .with_context(|| format!("cannot connect to {host}:{port}"))?;
    stream.set_nodelay(true)?;
    info!(%host, port, framing = ?config.framing, "output connected");

    let (transport, writer) = TransportWriter::spawn(stream, config.framing);
    let source = CommandSource::new(&config.stat_command.program, config.stat_timeout());
    info!(program = source.program(), timeout = ?config.stat_timeout(), "stat source ready");
    let sensor = Sensor::from_config(&config, source, transport);
    let scheduler = Scheduler::new(config.sampling_interval(), config.schedule);

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    let result = sensor.run(&scheduler, &cancel, config.on_tick_failure).await;

    // Last handle gone: the writer drains, closes the connection and exits.
    drop(sensor);
    match writer.await {
        Ok(written) => info!(reports = written, "output connection closed"),
        Err(e) => warn!(error = %e, "transport writer task failed"),
    }

    let ticks = result.context("sensor stopped on unrecoverable error")?;
    info!(ticks, "sensor stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn positional_and_flag_forms() {
        let p = parse_args(args(&["s", "sensor.json"])).unwrap();
        assert_eq!(p.config, Some(PathBuf::from("sensor.json")));
        let p = parse_args(args(&["s", "-c", "a.json"])).unwrap();
        assert_eq!(p.config, Some(PathBuf::from("a.json")));
        let p = parse_args(args(&["s", "--config=b.json"])).unwrap();
        assert_eq!(p.config, Some(PathBuf::from("b.json")));
        assert!(parse_args(args(&["s"])).unwrap().config.is_none());
    }

    #[test]
    fn rejects_unknown_and_extra_args() {
        assert!(parse_args(args(&["s", "--bogus"])).is_err());
        assert!(parse_args(args(&["s", "a.json", "b.json"])).is_err());
        assert!(parse_args(args(&["s", "--config"])).is_err());
        assert!(parse_args(args(&["s", "--help", "a.json"])).unwrap().help);
    }
}
