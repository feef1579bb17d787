//! Binary entrypoint for the `dlt` CLI.
//!
//! Commands:
//! - `init` - write a starter `dlt.toml`
//! - `listen [--port <path>] [--reply <text>]` - answer every incoming request until Ctrl-C
//! - `send [--port <path>] [--response] [--hex] <payload>` - send one frame and wait for a reply
//! - `decode <hex>` - run the frame decoder over a captured hex dump
//!
//! See the library crate docs for module‑level details: `dltlink::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use std::time::Duration;

use dltlink::config::Config;
use dltlink::dlt::{Decoded, FrameDecoder};
use dltlink::logutil::payload_preview;
use dltlink::metrics::LinkStatsSnapshot;
use dltlink::{DltInterface, MessageKind};

#[derive(Parser)]
#[command(name = "dlt")]
#[command(about = "Framed request/response link over a serial port")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "dlt.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Answer incoming requests until interrupted
    Listen {
        /// Serial device (overrides the config file)
        #[arg(short, long)]
        port: Option<String>,
        /// Payload sent back for every request
        #[arg(short, long, default_value = "resp")]
        reply: String,
        /// How often to poll for received frames (ms)
        #[arg(long, default_value_t = 50)]
        poll_ms: u64,
    },
    /// Send a single frame and print the first frame received back
    Send {
        /// Serial device (overrides the config file)
        #[arg(short, long)]
        port: Option<String>,
        /// Send as a response instead of a request
        #[arg(long)]
        response: bool,
        /// Treat the payload as hex bytes
        #[arg(long)]
        hex: bool,
        /// Seconds to wait for a reply
        #[arg(short, long, default_value_t = 2)]
        wait: u64,
        payload: String,
    },
    /// Decode frames from a hex dump of captured link traffic
    Decode { hex: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let pre_config = match cli.command {
        Commands::Init => None,
        _ => Config::load(&cli.config).await.ok(),
    };
    init_logging(&pre_config, cli.verbose);

    match cli.command {
        Commands::Init => {
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Listen {
            port,
            reply,
            poll_ms,
        } => {
            let config = config_or_default(pre_config, &cli.config);
            let mut link = open_link(&config, port)?;
            info!("Listening; replying {} to every request", payload_preview(reply.as_bytes()));

            let ctrl_c = tokio::signal::ctrl_c();
            tokio::pin!(ctrl_c);
            let mut interval = tokio::time::interval(Duration::from_millis(poll_ms.max(1)));
            loop {
                tokio::select! {
                    _ = &mut ctrl_c => {
                        info!("Interrupted, closing link");
                        break;
                    }
                    _ = interval.tick() => {
                        while let Some((kind, payload)) = link.read() {
                            println!("{:?} {}", kind, payload_preview(&payload));
                            if kind == MessageKind::Request {
                                link.respond(reply.as_bytes())?;
                            }
                        }
                        if !link.is_connected() {
                            warn!("Link is down ({:?}), exiting", link.state());
                            break;
                        }
                    }
                }
            }
            let stats = close_link(link).await?;
            print_stats(&stats);
        }
        Commands::Send {
            port,
            response,
            hex,
            wait,
            payload,
        } => {
            let bytes = if hex {
                parse_hex(&payload)?
            } else {
                payload.into_bytes()
            };
            let config = config_or_default(pre_config, &cli.config);
            let mut link = open_link(&config, port)?;
            if response {
                link.respond(&bytes)?;
            } else {
                link.request(&bytes)?;
            }

            let deadline = tokio::time::Instant::now() + Duration::from_secs(wait);
            let mut reply = None;
            while tokio::time::Instant::now() < deadline {
                if let Some(msg) = link.read() {
                    reply = Some(msg);
                    break;
                }
                if !link.is_connected() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            match reply {
                Some((kind, payload)) => println!("{:?} {}", kind, payload_preview(&payload)),
                None => println!("No reply within {}s", wait),
            }
            let stats = close_link(link).await?;
            print_stats(&stats);
        }
        Commands::Decode { hex } => {
            let bytes = parse_hex(&hex)?;
            let mut decoder = FrameDecoder::new();
            let mut stream = bytes.into_iter();
            let mut desyncs = 0usize;
            loop {
                match decoder.decode_stream(&mut stream) {
                    Decoded::Frame(frame) => {
                        println!("{}  {}", frame, payload_preview(&frame.payload))
                    }
                    Decoded::Desync(_) => desyncs += 1,
                    Decoded::NeedMoreData => break,
                }
            }
            println!("desync bytes: {}", desyncs);
            if decoder.in_progress() {
                println!("trailing partial frame");
            }
        }
    }

    Ok(())
}

fn config_or_default(config: Option<Config>, path: &str) -> Config {
    config.unwrap_or_else(|| {
        warn!("No usable config at {}, using defaults", path);
        Config::default()
    })
}

fn open_link(config: &Config, port: Option<String>) -> Result<DltInterface> {
    let mut link_config = config.link.clone();
    if let Some(port) = port {
        link_config.port = port;
    }
    let link = DltInterface::from_config(&link_config)
        .map_err(|e| anyhow!("Failed to open DLT link on {}: {}", link_config.port, e))?;
    info!(
        "Connected to {} on {} at {} baud",
        link_config.backend, link_config.port, link_config.baud_rate
    );
    Ok(link)
}

/// `close` joins the worker thread, so keep it off the async executor.
async fn close_link(mut link: DltInterface) -> Result<LinkStatsSnapshot> {
    let stats = tokio::task::spawn_blocking(move || {
        link.close();
        link.stats()
    })
    .await?;
    Ok(stats)
}

fn print_stats(stats: &LinkStatsSnapshot) {
    info!(
        "frames rx={} tx={} bytes rx={} tx={} desync={} empty_dropped={} \
         read_errors={} write_errors={}",
        stats.frames_received,
        stats.frames_sent,
        stats.bytes_received,
        stats.bytes_sent,
        stats.desync_bytes,
        stats.empty_frames_dropped,
        stats.read_errors,
        stats.write_errors
    );
}

/// Parse `77 01 04 74 65`, `77:01:04` or `770104` into bytes.
fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits.as_str());
    if !digits.is_ascii() {
        return Err(anyhow!("hex input contains non-hex characters"));
    }
    if digits.len() % 2 != 0 {
        return Err(anyhow!("hex input has an odd number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| anyhow!("invalid hex byte '{}': {}", &digits[i..i + 2], e))
        })
        .collect()
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides config
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|cfg| cfg.logging.level_filter())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // mirror to the console only when a human is watching
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::parse_hex;

    #[test]
    fn parses_common_hex_layouts() {
        assert_eq!(parse_hex("77 01 04").unwrap(), vec![0x77, 0x01, 0x04]);
        assert_eq!(parse_hex("77:01:04").unwrap(), vec![0x77, 0x01, 0x04]);
        assert_eq!(parse_hex("0x770104").unwrap(), vec![0x77, 0x01, 0x04]);
        assert!(parse_hex("770").is_err());
        assert!(parse_hex("zz").is_err());
    }
}
