//! `iked`: loads connection configuration, binds a UDP socket, and drives
//! the ModeCfg session core over it.

mod boundary;
mod cli;
mod config;
mod transport;

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use clap::Parser;
use ike_core::{Connection, ConnectionStore, SessionEventSender, SessionManager};
use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use boundary::ModeCfgCodec;
use cli::Cli;
use config::Config;
use transport::UdpTransport;

/// Identifies a session by its cookie pair, the only key a ModeCfg
/// datagram carries before a session object exists for it.
type CookiePair = ([u8; 8], [u8; 8]);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.filter_directive())))
        .init();

    let config = Config::from_file(&cli.config)?;
    info!(path = %cli.config.display(), connections = config.connections.len(), "loaded configuration");

    let store = Arc::new(build_connection_store(&config));
    let push_mode_by_name: Arc<HashMap<String, bool>> = Arc::new(
        config
            .connections
            .iter()
            .map(|c| (c.name.clone(), c.push_mode))
            .collect(),
    );
    let socket = Arc::new(UdpSocket::bind(&config.listen).await?);
    info!(listen = %config.listen, "iked listening");

    let (events, _rx) = SessionEventSender::new();
    let manager = SessionManager::new(events);
    manager.spawn_half_open_reaper();
    manager.spawn_keepalive_driver();

    let sessions: Mutex<HashMap<CookiePair, Arc<ike_core::Session>>> = Mutex::new(HashMap::new());
    let codec = ModeCfgCodec;
    let mut buf = vec![0u8; 4096];

    loop {
        let (len, peer) = tokio::select! {
            result = socket.recv_from(&mut buf) => match result {
                Ok(pair) => pair,
                Err(err) => {
                    warn!(%err, "recv_from failed");
                    continue;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested, draining");
                break;
            }
        };

        let raw = &buf[..len];
        let header = match ike_core::modecfg::IkeHeader::decode(raw) {
            Ok(h) => h,
            Err(_) => {
                warn!(%peer, "dropping undersized datagram");
                continue;
            }
        };

        let key = (header.icookie, header.rcookie);
        let session = {
            let existing = sessions.lock().get(&key).cloned();
            match existing {
                Some(session) => session,
                None => match new_session(&manager, &store, &push_mode_by_name, &socket, peer, key) {
                    Ok(session) => {
                        sessions.lock().insert(key, session.clone());
                        session
                    }
                    Err(err) => {
                        warn!(%peer, %err, "no connection matches inbound peer, dropping");
                        continue;
                    }
                },
            }
        };

        let status = manager.handle_inbound(&session, &codec, raw);
        if !status.is_ok() && status != ike_core::StfStatus::Ignore {
            warn!(session_id = session.id, %status, "ModeCfg exchange did not complete cleanly");
        }
    }

    Ok(())
}

fn build_connection_store(config: &Config) -> ConnectionStore {
    let store = ConnectionStore::new();
    for c in &config.connections {
        let mut conn = Connection::new(c.name.clone(), c.local, c.remote).with_dns(c.dns.clone()).with_nbns(c.nbns.clone());
        if let Some(addr) = c.host_srcip {
            conn = conn.with_host_srcip(addr);
        }
        store.add(conn);
    }
    store
}

/// Matches the peer against the connection store and creates a session for
/// it. Push-mode connections immediately send the unsolicited SET and arm
/// retransmission; pull-mode connections just start waiting for the
/// REQUEST the caller is about to hand to `handle_inbound`.
fn new_session(
    manager: &Arc<SessionManager>,
    store: &ConnectionStore,
    push_mode_by_name: &HashMap<String, bool>,
    socket: &Arc<UdpSocket>,
    peer: std::net::SocketAddr,
    (icookie, rcookie): CookiePair,
) -> anyhow::Result<Arc<ike_core::Session>> {
    let peer_ip = match peer.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => anyhow::bail!("IKE ModeCfg only matches IPv4 peers"),
    };
    let local_ip = match socket.local_addr()?.ip() {
        std::net::IpAddr::V4(v4) => v4,
        std::net::IpAddr::V6(_) => Ipv4Addr::UNSPECIFIED,
    };

    let connection = store
        .get_by_hosts(local_ip, peer_ip)
        .or_else(|_| store.get_by_hosts(Ipv4Addr::UNSPECIFIED, peer_ip))?;
    let push_mode = push_mode_by_name.get(&connection.name).copied().unwrap_or(false);

    let transport: Arc<dyn ike_core::Transport> = Arc::new(UdpTransport::new(socket.clone(), peer));
    let session = manager.create_session(icookie, rcookie, connection, transport);
    info!(session_id = session.id, %peer, "session created");

    let codec = ModeCfgCodec;
    if push_mode {
        manager.start_push(&session, &codec)?;
        manager.spawn_retransmit_driver(session.clone());
    } else {
        manager.begin_awaiting_request(&session);
    }

    Ok(session)
}
