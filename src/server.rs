//! Accepts TCP connections, assigns session ids, and fans registry-change
//! notifications out to every connected session.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::codec::Reply;
use crate::error::Result;
use crate::registry::Radio;
use crate::session::{Session, SessionHandle};

pub struct Server {
    radio: Arc<Radio>,
    sessions: Arc<RwLock<HashMap<SocketAddr, SessionHandle>>>,
    next_session_id: AtomicU64,
    listener: TcpListener,
    extended: bool,
    session_gone_tx: mpsc::UnboundedSender<SocketAddr>,
}

impl Server {
    pub async fn bind(port: u16, playlists: &[Vec<String>], extended: bool, tick: Duration) -> Result<Server> {
        let radio = Radio::create(playlists, tick).await?;
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;

        let sessions: Arc<RwLock<HashMap<SocketAddr, SessionHandle>>> = Arc::new(RwLock::new(HashMap::new()));
        let (session_gone_tx, mut session_gone_rx) = mpsc::unbounded_channel::<SocketAddr>();
        let reaper_sessions = Arc::clone(&sessions);
        tokio::spawn(async move {
            while let Some(peer) = session_gone_rx.recv().await {
                reaper_sessions.write().await.remove(&peer);
            }
        });

        Ok(Server {
            radio: Arc::new(radio),
            sessions,
            next_session_id: AtomicU64::new(0),
            listener,
            extended,
            session_gone_tx,
        })
    }

    /// The local address the server is bound to, e.g. for tests that bind
    /// an ephemeral port and need to connect to it.
    pub fn listener_addr(&self) -> SocketAddr {
        self.listener.local_addr().expect("bound tcp listener has a local addr")
    }

    /// The underlying registry, for callers that need to query station state
    /// directly (e.g. tests asserting on subscriber counts).
    pub fn radio(&self) -> &Radio {
        &self.radio
    }

    /// Accept connections until the process is asked to shut down. Each
    /// connection is handed to its own `Session` task, which reports back
    /// over `session_gone_tx` on any terminal path (EOF, protocol error, or
    /// operator shutdown) so the session map never accumulates dead entries.
    pub async fn listen(&self) -> ! {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
                    info!(session_id = id, %peer, "new client connected; expecting HELLO");
                    let handle = Session::spawn(
                        id,
                        stream,
                        peer,
                        self.extended,
                        Arc::clone(&self.radio),
                        self.session_gone_tx.clone(),
                    );
                    self.sessions.write().await.insert(peer, handle);
                }
                Err(e) => {
                    warn!(error = %e, "could not accept client connection");
                }
            }
        }
    }

    /// Prints, for each live station, the comma-separated list of subscriber
    /// peer addresses.
    pub async fn print_state(&self) {
        for index in self.radio.station_indices().await {
            let listeners = self
                .radio
                .station_listeners(index)
                .await
                .unwrap_or_default()
                .iter()
                .map(|addr| addr.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!("Station {index}: {listeners}");
        }
    }

    /// Add a station and notify every connected session of the registry
    /// change.
    pub async fn add_station(&self, songs: &[String]) -> Result<()> {
        let (new_index, num_stations) = self.radio.add_station(songs).await?;
        info!(new_index, num_stations, "station added");
        self.broadcast(&Reply::NewStation {
            station_index: new_index,
            num_stations,
        })
        .await;
        Ok(())
    }

    /// Remove a station and notify every connected session of the registry
    /// change. Any of its subscribers are informed via their subscriber
    /// handle's `station_shutdown` slot as part of the station's own
    /// teardown; picking a new station afterward is the client's concern.
    pub async fn remove_station(&self, index: u16) -> Result<()> {
        let (removed_index, num_stations) = self.radio.remove_station(index).await?;
        info!(removed_index, num_stations, "station removed");
        self.broadcast(&Reply::StationShutdown {
            station_index: removed_index,
            num_stations,
        })
        .await;
        Ok(())
    }

    async fn broadcast(&self, reply: &Reply) {
        let sessions = self.sessions.read().await;
        for handle in sessions.values() {
            handle.send(reply).await;
        }
    }

    /// Tear down the registry and every live session; used on operator quit.
    /// Each session is signaled and awaited so its TCP channel is actually
    /// closed, not just dropped from the bookkeeping map.
    pub async fn quit(&self) {
        info!("server shutting down");
        self.radio.quit().await;
        let handles: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        for handle in handles {
            handle.shutdown().await;
        }
        self.sessions.write().await.clear();
    }
}
