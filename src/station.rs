//! An independent playlist with its own broadcast loop and subscriber set.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

use crate::error::{RadioError, Result};
use crate::song::{ChunkOutcome, Song};
use crate::subscriber::SubscriberHandle;

pub struct Station {
    songs: RwLock<Vec<Song>>,
    current_index: AtomicUsize,
    num_songs: AtomicUsize,
    subscribers: RwLock<HashMap<SocketAddr, Arc<SubscriberHandle>>>,
    quit_tx: watch::Sender<bool>,
    quit_rx: watch::Receiver<bool>,
    tick: Duration,
}

impl Station {
    /// Open every song in `song_names` and build a station, without starting
    /// its broadcast loop. Fails atomically: if any song can't be opened, no
    /// partially-open station is returned.
    pub async fn create(song_names: &[String], tick: Duration) -> Result<Arc<Station>> {
        let mut songs = Vec::with_capacity(song_names.len());
        for name in song_names {
            songs.push(Song::open(name.clone()).await?);
        }
        let num_songs = songs.len();
        let (quit_tx, quit_rx) = watch::channel(false);
        Ok(Arc::new(Station {
            songs: RwLock::new(songs),
            current_index: AtomicUsize::new(0),
            num_songs: AtomicUsize::new(num_songs),
            subscribers: RwLock::new(HashMap::new()),
            quit_tx,
            quit_rx,
            tick,
        }))
    }

    /// Spawn the broadcast loop task. The caller retains its own `Arc` handle.
    pub fn start(self: &Arc<Self>) {
        let station = Arc::clone(self);
        tokio::spawn(async move {
            station.broadcast_loop().await;
        });
    }

    pub async fn subscribe(&self, peer: SocketAddr, handle: Arc<SubscriberHandle>) {
        self.subscribers.write().await.insert(peer, handle);
    }

    pub async fn unsubscribe(&self, peer: SocketAddr) -> Result<()> {
        let mut subs = self.subscribers.write().await;
        if subs.remove(&peer).is_none() {
            return Err(RadioError::NotSubscribed(peer.to_string()));
        }
        Ok(())
    }

    pub async fn current_song_name(&self) -> String {
        let songs = self.songs.read().await;
        let idx = self.current_index.load(Ordering::SeqCst);
        songs[idx].name().to_string()
    }

    pub async fn song_names(&self) -> Vec<String> {
        let songs = self.songs.read().await;
        songs.iter().map(|s| s.name().to_string()).collect()
    }

    /// Append a song to the playlist; safe to call while the broadcast loop
    /// is running against earlier entries.
    pub async fn add_song(&self, name: impl Into<String>) -> Result<()> {
        let song = Song::open(name).await?;
        let mut songs = self.songs.write().await;
        songs.push(song);
        self.num_songs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub async fn subscriber_addrs(&self) -> Vec<SocketAddr> {
        self.subscribers.read().await.keys().copied().collect()
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Signal the broadcast loop to tear down. Idempotent.
    pub fn quit(&self) {
        self.quit_tx.send_replace(true);
    }

    async fn broadcast_loop(self: Arc<Self>) {
        let mut quit_rx = self.quit_rx.clone();
        info!("station broadcast loop started");
        loop {
            if *quit_rx.borrow() {
                break;
            }

            let outcome = {
                let mut songs = self.songs.write().await;
                let idx = self.current_index.load(Ordering::SeqCst);
                songs[idx].next_chunk().await
            };

            match outcome {
                Ok(ChunkOutcome::Chunk { data, len }) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.tick) => {}
                        _ = quit_rx.changed() => {
                            if *quit_rx.borrow() {
                                break;
                            }
                        }
                    }
                    let chunk = Bytes::copy_from_slice(&data[..len]);
                    self.fan_out(chunk).await;
                }
                Ok(ChunkOutcome::EndOfFile) => {
                    self.advance_song().await;
                }
                Err(e) => {
                    warn!(error = %e, "song read failed; advancing to next song");
                    self.advance_song().await;
                }
            }
        }
        self.shutdown_all().await;
        info!("station broadcast loop ended");
    }

    async fn advance_song(&self) {
        let mut songs = self.songs.write().await;
        let idx = self.current_index.load(Ordering::SeqCst);
        let _ = songs[idx].rewind().await;
        let num_songs = self.num_songs.load(Ordering::SeqCst);
        let next_idx = (idx + 1) % num_songs;
        self.current_index.store(next_idx, Ordering::SeqCst);
        let next_name = songs[next_idx].name().to_string();
        drop(songs);

        debug!(song = %next_name, "song changed");
        let subs = self.subscribers.read().await;
        for handle in subs.values() {
            handle.publish_song_change(next_name.clone());
        }
    }

    async fn fan_out(&self, chunk: Bytes) {
        let subs = self.subscribers.read().await;
        for handle in subs.values() {
            handle.audio_sink.send(chunk.clone());
        }
    }

    async fn shutdown_all(&self) {
        let songs: Vec<Song> = self.songs.write().await.drain(..).collect();
        for song in songs {
            song.close();
        }

        let mut subs = self.subscribers.write().await;
        for handle in subs.values() {
            handle.publish_shutdown();
        }
        subs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ChannelSink;
    use std::time::Duration as StdDuration;

    fn write_temp(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "broadstream-station-test-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, contents).unwrap();
        path
    }

    const FAST_TICK: StdDuration = StdDuration::from_millis(5);

    #[tokio::test]
    async fn test_broadcast_loop_delivers_prefix_of_song() {
        let path = write_temp("prefix", &vec![9u8; 600]);
        let station = Station::create(&[path.to_str().unwrap().to_string()], FAST_TICK)
            .await
            .unwrap();
        station.start();

        let (sink, mut rx) = ChannelSink::new();
        let handle = Arc::new(SubscriberHandle::new(Arc::new(sink)));
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        station.subscribe(peer, handle).await;

        let mut received = Vec::new();
        for _ in 0..3 {
            let chunk =
                tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
                    .await
                    .expect("timed out waiting for a chunk")
                    .expect("sink closed");
            received.extend_from_slice(&chunk);
        }

        assert!(received.len() >= 512);
        assert!(received.iter().all(|&b| b == 9));
        station.quit();
    }

    #[tokio::test]
    async fn test_end_of_file_advances_and_announces_next_song() {
        let path_a = write_temp("eof-a", b"short");
        let path_b = write_temp("eof-b", b"nextsong");
        let station = Station::create(
            &[
                path_a.to_str().unwrap().to_string(),
                path_b.to_str().unwrap().to_string(),
            ],
            FAST_TICK,
        )
        .await
        .unwrap();
        station.start();

        let (sink, _audio_rx) = ChannelSink::new();
        let handle = Arc::new(SubscriberHandle::new(Arc::new(sink)));
        let mut song_change_rx = handle.song_change_receiver();
        let peer: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        station.subscribe(peer, handle).await;

        tokio::time::timeout(StdDuration::from_secs(2), song_change_rx.changed())
            .await
            .expect("timed out waiting for song change")
            .unwrap();
        let next = song_change_rx.borrow().clone().unwrap();
        assert!(next.ends_with("eof-b"));
        assert_eq!(station.current_song_name().await, next);
        station.quit();
    }

    #[tokio::test]
    async fn test_quit_signals_shutdown_and_clears_subscribers() {
        let path = write_temp("quit", &vec![1u8; 10]);
        let station = Station::create(&[path.to_str().unwrap().to_string()], FAST_TICK)
            .await
            .unwrap();
        station.start();

        let (sink, _rx) = ChannelSink::new();
        let handle = Arc::new(SubscriberHandle::new(Arc::new(sink)));
        let mut shutdown_rx = handle.shutdown_receiver();
        let peer: SocketAddr = "127.0.0.1:4002".parse().unwrap();
        station.subscribe(peer, handle).await;

        station.quit();
        tokio::time::timeout(StdDuration::from_secs(2), shutdown_rx.changed())
            .await
            .expect("timed out waiting for shutdown")
            .unwrap();
        assert!(*shutdown_rx.borrow());

        // Give the loop a moment to finish draining the subscriber map.
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        assert_eq!(station.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe_round_trip() {
        let path = write_temp("sub", &vec![2u8; 10]);
        let station = Station::create(&[path.to_str().unwrap().to_string()], FAST_TICK)
            .await
            .unwrap();

        let (sink, _rx) = ChannelSink::new();
        let handle = Arc::new(SubscriberHandle::new(Arc::new(sink)));
        let peer: SocketAddr = "127.0.0.1:4003".parse().unwrap();

        assert_eq!(station.subscriber_count().await, 0);
        station.subscribe(peer, handle).await;
        assert_eq!(station.subscriber_count().await, 1);
        station.unsubscribe(peer).await.unwrap();
        assert_eq!(station.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_peer_errors() {
        let path = write_temp("unsub-unknown", &vec![3u8; 10]);
        let station = Station::create(&[path.to_str().unwrap().to_string()], FAST_TICK)
            .await
            .unwrap();
        let peer: SocketAddr = "127.0.0.1:4004".parse().unwrap();
        assert!(matches!(
            station.unsubscribe(peer).await,
            Err(RadioError::NotSubscribed(_))
        ));
    }

    #[tokio::test]
    async fn test_add_song_extends_playlist() {
        let path_a = write_temp("add-a", b"a");
        let path_b = write_temp("add-b", b"b");
        let station = Station::create(&[path_a.to_str().unwrap().to_string()], FAST_TICK)
            .await
            .unwrap();
        assert_eq!(station.song_names().await.len(), 1);
        station
            .add_song(path_b.to_str().unwrap().to_string())
            .await
            .unwrap();
        assert_eq!(station.song_names().await.len(), 2);
    }

    #[tokio::test]
    async fn test_create_fails_atomically_on_bad_song() {
        let path_a = write_temp("atomic-a", b"a");
        let result = Station::create(
            &[
                path_a.to_str().unwrap().to_string(),
                "/nonexistent/file".to_string(),
            ],
            FAST_TICK,
        )
        .await;
        assert!(result.is_err());
    }
}
