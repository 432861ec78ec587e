//! natprobe CLI
//!
//! Find out what kind of NAT sits in front of a game host, and punch UDP
//! holes so peers can join.

mod config;
mod progress;

use clap::{Parser, Subcommand};
use console::style;
use natprobe_core::{
    HolePuncher, JoinTarget, NatService, NatType, ServerSource, classify_target, punch_port,
};
use natprobe_stun::bind_udp_socket;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use config::Config;
use progress::{Spinner, format_duration};

/// natprobe - NAT type classification and UDP hole punching
#[derive(Parser)]
#[command(name = "natprobe")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify the NAT in front of a local port
    Classify {
        /// Local port to classify from (defaults to the configured game port)
        #[arg(short, long)]
        port: Option<u16>,

        /// STUN server list file
        #[arg(short, long)]
        servers: Option<PathBuf>,

        /// Per-attempt timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Attempts per STUN transaction
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Send a hole punching datagram to a peer
    Punch {
        /// Peer IPv4 address
        #[arg(required = true)]
        ip: String,

        /// Peer port
        #[arg(required = true)]
        port: u16,

        /// Local port to punch from (defaults to the configured game port)
        #[arg(short, long)]
        local_port: Option<u16>,

        /// Number of punches to send
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,

        /// Delay between punches in milliseconds
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
    },

    /// Check whether a join address needs NAT traversal
    Check {
        /// IPv4 address or hostname, optionally with `:port`
        #[arg(required = true)]
        address: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    // Validate configuration
    config.validate()?;

    // Initialize logging
    let level = if cli.verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    match cli.command {
        Commands::Classify {
            port,
            servers,
            timeout_ms,
            retries,
        } => {
            classify(port, servers, timeout_ms, retries, config).await?;
        }
        Commands::Punch {
            ip,
            port,
            local_port,
            count,
            interval_ms,
        } => {
            punch(&ip, port, local_port, count, interval_ms, config).await?;
        }
        Commands::Check { address } => {
            check(&address);
        }
    }

    Ok(())
}

/// Classify the NAT and print the report
async fn classify(
    port: Option<u16>,
    servers: Option<PathBuf>,
    timeout_ms: Option<u64>,
    retries: Option<u32>,
    mut config: Config,
) -> anyhow::Result<()> {
    if let Some(timeout_ms) = timeout_ms {
        config.stun.timeout_ms = timeout_ms;
    }
    if let Some(retries) = retries {
        config.stun.retries = retries;
    }
    config.validate()?;

    let mut traversal = config.traversal()?;
    if let Some(path) = servers {
        traversal.servers = ServerSource::File(path);
    }
    let port = port.unwrap_or(config.network.local_port);

    tracing::info!("Classifying NAT from local port {}", port);
    println!("Local port: {}", port);
    if let ServerSource::File(path) = &traversal.servers {
        println!("Server list: {}", path.display());
    }
    println!(
        "Budget per server: {}",
        format_duration(traversal.transaction.worst_case())
    );
    println!();

    let service = NatService::new(traversal)?;
    let spinner = Spinner::new(format!("Testing NAT type from port {port}..."));

    let handle = match service.classify_nat_async(port) {
        Ok(handle) => handle,
        Err(e) => {
            spinner.abandon();
            return Err(e.into());
        }
    };
    let nat_type = handle.join().await?;
    spinner.finish_with_message(format!("NAT type: {}", styled(nat_type)));

    if let Some(report) = service.last_classification() {
        if let Some(server) = report.server {
            println!("  STUN server: {}", server);
        }
        if let Some(mapped) = report.mapped {
            println!("  External address: {}", mapped);
        }
        if let Some(preserved) = report.port_preserved {
            println!("  Port preserved: {}", preserved);
        }
    }
    println!();
    println!("{}", service.status_text());

    Ok(())
}

/// Punch one or more datagrams to a peer
async fn punch(
    ip: &str,
    port: u16,
    local_port: Option<u16>,
    count: u32,
    interval_ms: u64,
    mut config: Config,
) -> anyhow::Result<()> {
    if let Some(local_port) = local_port {
        config.network.local_port = local_port;
    }
    let traversal = config.traversal()?;
    let bind_addr = traversal.bind_addr(traversal.local_port);

    if count <= 1 {
        let socket = bind_udp_socket(bind_addr)?;
        punch_port(&socket, ip, port)?;
        println!("Punched {}:{} from {}", ip, port, socket.local_addr()?);
        return Ok(());
    }

    let target_ip: Ipv4Addr = ip
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid peer IPv4 address: {}", ip))?;
    let target = SocketAddr::from((target_ip, port));
    let interval = Duration::from_millis(interval_ms);

    let puncher = HolePuncher::bind(bind_addr)?.with_payload(traversal.punch_payload);
    let local = puncher.local_addr()?;
    let spinner = Spinner::new(format!("Punching {target} from {local} ({count} times)..."));

    let sent =
        tokio::task::spawn_blocking(move || puncher.punch_repeatedly(target, count, interval))
            .await?;
    spinner.finish_with_message(format!("Sent {sent}/{count} punches to {target}"));

    if sent == 0 {
        anyhow::bail!("No punch to {} could be sent", target);
    }
    Ok(())
}

/// Print how a join address would be handled
fn check(address: &str) {
    let target = classify_target(address);
    let kind = match &target {
        JoinTarget::Private(ip) => format!("private address {ip}"),
        JoinTarget::External(ip) => format!("public address {ip}"),
        JoinTarget::Domain(name) => format!("hostname {name}"),
        JoinTarget::Invalid => {
            println!("{} is not a valid address", style(address).red());
            return;
        }
    };

    println!("{}: {}", address, kind);
    if target.needs_traversal() {
        println!("NAT traversal: {}", style("recommended").yellow());
    } else {
        println!("NAT traversal: {}", style("not needed").green());
    }
}

fn styled(nat_type: NatType) -> console::StyledObject<String> {
    let text = nat_type.to_string();
    match nat_type {
        NatType::FullCone => style(text).green().bold(),
        NatType::Restricted | NatType::RestrictedPort => style(text).yellow().bold(),
        NatType::Symmetric | NatType::Blocked | NatType::Error => style(text).red().bold(),
        NatType::Unknown | NatType::Searching => style(text).dim(),
    }
}
