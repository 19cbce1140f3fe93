//! Ensemble probe
//!
//! Connects to an ensemble, keeps a session alive with pings and fails
//! over between members, logging every transition. Serves as the
//! reference connection driver for the library.
//!
//! Environment variables:
//! - ENSEMBLE_SERVERS: connect string, e.g. `10.0.0.1:2181,10.0.0.2:2181/app`
//! - ENSEMBLE_SESSION_TIMEOUT_MS: requested session timeout
//! - ENSEMBLE_LOG: tracing filter (default `info`)

mod driver;

use std::time::Duration;

use clap::Parser;
use ensemble_link::prelude::*;
use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

use driver::ProbeDriver;

#[derive(Parser, Debug)]
#[command(name = "ensemble-probe")]
#[command(about = "Keep a session open against an ensemble and report failovers")]
struct Cli {
    /// Connect string
    #[arg(long, env = "ENSEMBLE_SERVERS", default_value = "127.0.0.1:2181")]
    servers: String,

    /// Requested session timeout in milliseconds
    #[arg(
        long,
        env = "ENSEMBLE_SESSION_TIMEOUT_MS",
        default_value_t = DEFAULT_SESSION_TIMEOUT.as_millis() as u64
    )]
    session_timeout_ms: u64,

    /// Delay after every member was tried once, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    spin_delay_ms: u64,

    /// Accept read-only servers
    #[arg(long)]
    read_only: bool,

    /// Exit after this many ping replies
    #[arg(long)]
    pings: Option<u64>,

    /// Tracing filter
    #[arg(long, env = "ENSEMBLE_LOG", default_value = "info")]
    log: String,
}

/// Why a connection ended.
enum Outcome {
    /// Shutdown was requested.
    Closed,
    /// Connection failed or went silent; try the next member.
    Reconnect,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log)?)
        .init();

    let hosts = HostSet::from_connect_string(&cli.servers)?.with_span(info_span!("hosts"));
    info!(servers = %cli.servers, members = hosts.size(), "starting probe");

    let session_timeout = Duration::from_millis(cli.session_timeout_ms);
    let spin_delay = Duration::from_millis(cli.spin_delay_ms);
    let config = TransportConfig::builder()
        .connect_timeout(session_timeout / hosts.size() as u32)
        .build();
    let mut transport = TcpTransport::new(config).with_span(info_span!("transport"));
    let mut driver = ProbeDriver::new(transport.handle().clone(), session_timeout, cli.read_only);

    let handle = transport.handle().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.on_closing();
        }
    });

    loop {
        transport.cleanup();
        driver.on_disconnected();
        let endpoint = hosts.next_async(spin_delay).await;
        if let Err(e) = transport.connect(endpoint) {
            if e.is_terminal() {
                break;
            }
            warn!(%endpoint, error = %e, "connect failed");
            continue;
        }

        match run_connection(&mut transport, &mut driver, &hosts, session_timeout, cli.pings).await {
            Outcome::Closed => break,
            Outcome::Reconnect => continue,
        }
    }

    transport.close();
    info!(pings = driver.pings_answered(), "probe stopped");
    Ok(())
}

/// Drive one connection until it fails, goes silent, or shutdown is
/// requested.
async fn run_connection(
    transport: &mut TcpTransport,
    driver: &mut ProbeDriver,
    hosts: &HostSet,
    session_timeout: Duration,
    max_pings: Option<u64>,
) -> Outcome {
    let mut pending = PendingQueue::new();
    let handshake_timeout = session_timeout / hosts.size() as u32;
    let mut announced = false;

    loop {
        let wait = match driver.negotiated_timeout() {
            Some(negotiated) => (negotiated / 3).saturating_sub(transport.idle_send()),
            None => Duration::from_millis(100),
        };
        if let Err(e) = transport
            .do_transport(wait.max(Duration::from_millis(1)), &mut pending, driver)
            .await
        {
            if e.is_terminal() {
                return Outcome::Closed;
            }
            warn!(remote = ?transport.remote_addr(), error = %e, "connection lost");
            fail_pending(&mut pending);
            return Outcome::Reconnect;
        }
        if transport.phase() == ConnectionPhase::Closed {
            return Outcome::Closed;
        }

        let Some(negotiated) = driver.negotiated_timeout() else {
            if transport.is_connected() && transport.idle_recv() > handshake_timeout {
                warn!(remote = ?transport.remote_addr(), "handshake timed out");
                return Outcome::Reconnect;
            }
            continue;
        };

        if !announced {
            hosts.on_connected();
            announced = true;
            info!(
                remote = ?transport.remote_addr(),
                local = ?transport.local_addr(),
                "connected"
            );
        }

        let read_timeout = negotiated * 2 / 3;
        if transport.idle_recv() > read_timeout {
            warn!(idle = ?transport.idle_recv(), "server went silent");
            fail_pending(&mut pending);
            return Outcome::Reconnect;
        }
        if transport.idle_send() >= read_timeout / 2 {
            driver.send_ping();
        }
        if max_pings.is_some_and(|max| driver.pings_answered() >= max) {
            transport.on_closing();
        }
    }
}

fn fail_pending(pending: &mut PendingQueue) {
    for packet in pending.drain(..) {
        packet.complete(Err(TransportError::ConnectionClosed));
    }
}
