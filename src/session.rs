//! Per-TCP-connection control-plane state machine.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{info, info_span, warn, Instrument};

use crate::codec::{Command, Reply};
use crate::config::CONTROL_BUFFER;
use crate::registry::Radio;
use crate::sink::UdpSink;
use crate::subscriber::SubscriberHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    AwaitingHello,
    Idle,
    Subscribed { station_index: u16 },
}

enum ControlFlow {
    Continue,
    Close,
}

enum StreamEvent {
    StationShutdown,
}

type Writer = Arc<AsyncMutex<OwnedWriteHalf>>;
type JoinSlot = Arc<AsyncMutex<Option<JoinHandle<()>>>>;

/// Server-side handle used to push registry-change notifications to a
/// session that may be in any state, from outside that session's own task,
/// and to shut it down (and wait for its TCP channel to actually close) on
/// operator quit.
#[derive(Clone)]
pub struct SessionHandle {
    pub session_id: u64,
    writer: Writer,
    shutdown_tx: watch::Sender<bool>,
    join: JoinSlot,
}

impl SessionHandle {
    pub async fn send(&self, reply: &Reply) {
        send_on(&self.writer, reply).await;
    }

    /// Signal the session's task to stop and wait for it to finish tearing
    /// down (leaving its station, closing its TCP channel). Idempotent: a
    /// second call finds the join slot already taken and returns immediately.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        if let Some(handle) = self.join.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn send_on(writer: &Writer, reply: &Reply) {
    let bytes = match reply.encode() {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to encode outgoing reply");
            return;
        }
    };
    let mut w = writer.lock().await;
    if let Err(e) = w.write_all(&bytes).await {
        warn!(error = %e, "failed to write reply");
    }
}

pub struct Session {
    id: u64,
    peer: SocketAddr,
    extended: bool,
    radio: Arc<Radio>,
    writer: Writer,
    state: SessionState,
    subscriber: Option<Arc<SubscriberHandle>>,
    stream_stop_tx: Option<watch::Sender<bool>>,
    stream_task: Option<JoinHandle<()>>,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
    events_rx: mpsc::UnboundedReceiver<StreamEvent>,
    session_gone_tx: mpsc::UnboundedSender<SocketAddr>,
}

impl Session {
    /// Split `stream`, spawn the session's handler task, and return a handle
    /// the server can use to push unsolicited notifications and to shut the
    /// session down. `session_gone_tx` is notified with this session's peer
    /// address on every terminal path so `Server.sessions` never accumulates
    /// dead entries once a client disconnects.
    pub fn spawn(
        id: u64,
        stream: TcpStream,
        peer: SocketAddr,
        extended: bool,
        radio: Arc<Radio>,
        session_gone_tx: mpsc::UnboundedSender<SocketAddr>,
    ) -> SessionHandle {
        let (read_half, write_half) = stream.into_split();
        let writer: Writer = Arc::new(AsyncMutex::new(write_half));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let session = Session {
            id,
            peer,
            extended,
            radio,
            writer,
            state: SessionState::AwaitingHello,
            subscriber: None,
            stream_stop_tx: None,
            stream_task: None,
            events_tx,
            events_rx,
            session_gone_tx,
        };
        let writer_for_handle = Arc::clone(&session.writer);

        let span = info_span!("session", id = id);
        let join = tokio::spawn(session.run(read_half, shutdown_rx).instrument(span));

        SessionHandle {
            session_id: id,
            writer: writer_for_handle,
            shutdown_tx,
            join: Arc::new(AsyncMutex::new(Some(join))),
        }
    }

    async fn run(mut self, mut reader: OwnedReadHalf, mut shutdown_rx: watch::Receiver<bool>) {
        info!(peer = %self.peer, "new client connected; expecting HELLO");
        loop {
            tokio::select! {
                frame = read_frame(&mut reader) => {
                    match frame {
                        Ok(Some(buf)) => {
                            if matches!(self.handle_frame(&buf).await, ControlFlow::Close) {
                                break;
                            }
                        }
                        Ok(None) => {
                            info!("client closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "receive error; closing connection");
                            break;
                        }
                    }
                }
                event = self.events_rx.recv() => {
                    match event {
                        Some(StreamEvent::StationShutdown) => {
                            self.state = SessionState::Idle;
                        }
                        None => unreachable!("events_tx kept alive for session lifetime"),
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("server shutdown requested; closing session");
                        break;
                    }
                }
            }
        }
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        self.stop_current_streaming().await;
        if let SessionState::Subscribed { station_index } = self.state {
            let _ = self.radio.leave(station_index, self.peer).await;
        }
        let mut w = self.writer.lock().await;
        let _ = w.shutdown().await;
        drop(w);
        let _ = self.session_gone_tx.send(self.peer);
    }

    async fn handle_frame(&mut self, buf: &[u8]) -> ControlFlow {
        match self.state {
            SessionState::AwaitingHello => match Command::decode(buf, self.extended) {
                Ok(Command::Hello { udp_port }) => self.handle_hello(udp_port).await,
                _ => {
                    self.send_invalid("must hello first").await;
                    ControlFlow::Close
                }
            },
            SessionState::Idle | SessionState::Subscribed { .. } => {
                match Command::decode(buf, self.extended) {
                    Ok(Command::Hello { .. }) => {
                        self.send_invalid("more than one hello").await;
                        ControlFlow::Close
                    }
                    Ok(Command::SetStation { station_index }) => {
                        self.handle_set_station(station_index).await
                    }
                    Ok(Command::GetStationSongs { station_index }) => {
                        self.handle_get_station_songs(station_index).await
                    }
                    Err(_) => {
                        let tag = Command::tag(buf).unwrap_or(0xFF);
                        self.send_invalid(&format!("command {tag} not recognized")).await;
                        ControlFlow::Close
                    }
                }
            }
        }
    }

    async fn handle_hello(&mut self, udp_port: u16) -> ControlFlow {
        let udp_peer = SocketAddr::new(self.peer.ip(), udp_port);
        match UdpSink::connect(udp_peer).await {
            Ok(sink) => {
                self.subscriber = Some(Arc::new(SubscriberHandle::new(Arc::new(sink))));
                self.state = SessionState::Idle;
                let num_stations = self.radio.num_stations().await;
                self.send_reply(&Reply::Welcome { num_stations }).await;
                info!("HELLO received; sending WELCOME, expecting SET_STATION");
                ControlFlow::Continue
            }
            Err(e) => {
                warn!(error = %e, "could not connect udp sink");
                ControlFlow::Close
            }
        }
    }

    async fn handle_set_station(&mut self, station_index: u16) -> ControlFlow {
        info!(station_index, "received SET_STATION");
        if !self.radio.station_exists(station_index).await {
            self.send_invalid(&format!("station {station_index} doesn't exist")).await;
            return ControlFlow::Close;
        }

        if let SessionState::Subscribed { station_index: prior } = self.state {
            self.stop_current_streaming().await;
            let _ = self.radio.leave(prior, self.peer).await;
        }

        let subscriber = self
            .subscriber
            .clone()
            .expect("subscriber handle exists once past AwaitingHello");

        if let Err(e) = self.radio.join(station_index, self.peer, subscriber.clone()).await {
            self.send_invalid(&e.to_string()).await;
            return ControlFlow::Close;
        }

        self.start_streaming(subscriber);

        let song_name = self
            .radio
            .current_song(station_index)
            .await
            .unwrap_or_default();
        self.send_reply(&Reply::Announce { song_name }).await;
        self.state = SessionState::Subscribed { station_index };
        ControlFlow::Continue
    }

    async fn handle_get_station_songs(&mut self, station_index: u16) -> ControlFlow {
        info!(station_index, "received GET_STATION_SONGS");
        match self.radio.songs(station_index).await {
            Ok(songs) => {
                self.send_reply(&Reply::SongsList { songs }).await;
                ControlFlow::Continue
            }
            Err(e) => {
                self.send_invalid(&e.to_string()).await;
                ControlFlow::Close
            }
        }
    }

    fn start_streaming(&mut self, subscriber: Arc<SubscriberHandle>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let writer = Arc::clone(&self.writer);
        let events_tx = self.events_tx.clone();
        let handle = tokio::spawn(stream_task(writer, subscriber, stop_rx, events_tx));
        self.stream_stop_tx = Some(stop_tx);
        self.stream_task = Some(handle);
    }

    /// Signal and wait for any in-flight streaming task, so a station switch
    /// never interleaves announces from the old and new subscriptions.
    async fn stop_current_streaming(&mut self) {
        if let Some(stop_tx) = self.stream_stop_tx.take() {
            stop_tx.send_replace(true);
        }
        if let Some(handle) = self.stream_task.take() {
            let _ = handle.await;
        }
    }

    async fn send_reply(&self, reply: &Reply) {
        send_on(&self.writer, reply).await;
    }

    async fn send_invalid(&self, message: &str) {
        self.send_reply(&Reply::Invalid {
            message: message.to_string(),
        })
        .await;
    }
}

async fn stream_task(
    writer: Writer,
    subscriber: Arc<SubscriberHandle>,
    mut stop_rx: watch::Receiver<bool>,
    events_tx: mpsc::UnboundedSender<StreamEvent>,
) {
    let mut song_change_rx = subscriber.song_change_receiver();
    let mut shutdown_rx = subscriber.shutdown_receiver();
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    let _ = events_tx.send(StreamEvent::StationShutdown);
                    break;
                }
            }
            changed = song_change_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(name) = song_change_rx.borrow().clone() {
                    send_on(&writer, &Reply::Announce { song_name: name }).await;
                }
            }
        }
    }
}

/// Read one control frame. Mirrors the reference implementation's assumption
/// that a client command arrives in a single read; `buf` is sized generously
/// so a frame is never split across reads in practice.
async fn read_frame(reader: &mut OwnedReadHalf) -> std::io::Result<Option<Vec<u8>>> {
    let mut buf = vec![0u8; CONTROL_BUFFER];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some(buf))
}
