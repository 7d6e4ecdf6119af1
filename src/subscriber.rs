//! The per-session endpoint a Station writes into and a Session reads from.

use std::sync::Arc;

use tokio::sync::watch;

use crate::sink::AudioSink;

/// Owned jointly by exactly one Session and one Station (SPEC_FULL.md §3);
/// created once at handshake and reused across `SET_STATION` calls.
pub struct SubscriberHandle {
    pub audio_sink: Arc<dyn AudioSink>,
    song_change_tx: watch::Sender<Option<String>>,
    song_change_rx: watch::Receiver<Option<String>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl SubscriberHandle {
    pub fn new(audio_sink: Arc<dyn AudioSink>) -> Self {
        let (song_change_tx, song_change_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        SubscriberHandle {
            audio_sink,
            song_change_tx,
            song_change_rx,
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Station-side: publish a song-change notification. Coalesces with any
    /// prior unread value rather than blocking the broadcast loop.
    pub fn publish_song_change(&self, name: String) {
        self.song_change_tx.send_replace(Some(name));
    }

    /// Station-side: signal that the station has shut down.
    pub fn publish_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Session-side: a fresh receiver for song-change events, for the
    /// streaming task to watch alongside `shutdown_receiver()`.
    pub fn song_change_receiver(&self) -> watch::Receiver<Option<String>> {
        self.song_change_rx.clone()
    }

    /// Session-side: a fresh receiver for the shutdown signal.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}
