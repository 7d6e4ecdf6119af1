//! The full set of stations a server exposes, keyed by a monotonically
//! increasing index that is never reused even after a station is removed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::error::{RadioError, Result};
use crate::station::Station;
use crate::subscriber::SubscriberHandle;

pub struct Radio {
    stations: RwLock<HashMap<u16, Arc<Station>>>,
    next_index: AtomicU16,
    tick: Duration,
}

impl Radio {
    /// Build a radio with one station per playlist in `playlists`, each
    /// immediately started. `playlists[i]` is the list of song paths for
    /// station `i`; in base mode each station has exactly one song.
    pub async fn create(playlists: &[Vec<String>], tick: Duration) -> Result<Radio> {
        let mut map = HashMap::new();
        for (idx, songs) in playlists.iter().enumerate() {
            let station = Station::create(songs, tick).await?;
            station.start();
            map.insert(idx as u16, station);
        }
        Ok(Radio {
            stations: RwLock::new(map),
            next_index: AtomicU16::new(playlists.len() as u16),
            tick,
        })
    }

    pub async fn station_exists(&self, index: u16) -> bool {
        self.stations.read().await.contains_key(&index)
    }

    async fn get(&self, index: u16) -> Result<Arc<Station>> {
        self.stations
            .read()
            .await
            .get(&index)
            .cloned()
            .ok_or(RadioError::NoSuchStation(index))
    }

    pub async fn join(
        &self,
        index: u16,
        peer: SocketAddr,
        handle: Arc<SubscriberHandle>,
    ) -> Result<()> {
        let station = self.get(index).await?;
        station.subscribe(peer, handle).await;
        Ok(())
    }

    pub async fn leave(&self, index: u16, peer: SocketAddr) -> Result<()> {
        let station = self.get(index).await?;
        station.unsubscribe(peer).await
    }

    pub async fn current_song(&self, index: u16) -> Result<String> {
        let station = self.get(index).await?;
        Ok(station.current_song_name().await)
    }

    pub async fn songs(&self, index: u16) -> Result<Vec<String>> {
        let station = self.get(index).await?;
        Ok(station.song_names().await)
    }

    pub async fn num_stations(&self) -> u16 {
        self.stations.read().await.len() as u16
    }

    pub async fn station_indices(&self) -> Vec<u16> {
        let mut indices: Vec<u16> = self.stations.read().await.keys().copied().collect();
        indices.sort_unstable();
        indices
    }

    pub async fn station_listeners(&self, index: u16) -> Result<Vec<SocketAddr>> {
        let station = self.get(index).await?;
        Ok(station.subscriber_addrs().await)
    }

    /// Add a new station; its index is the next unused value, never a
    /// recycled one. Returns `(new_index, num_stations)`.
    pub async fn add_station(&self, songs: &[String]) -> Result<(u16, u16)> {
        let station = Station::create(songs, self.tick).await?;
        station.start();
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        let mut stations = self.stations.write().await;
        stations.insert(index, station);
        Ok((index, stations.len() as u16))
    }

    /// Remove and shut down a station. Returns `(removed_index, num_stations)`.
    pub async fn remove_station(&self, index: u16) -> Result<(u16, u16)> {
        let mut stations = self.stations.write().await;
        if stations.is_empty() {
            return Err(RadioError::Empty);
        }
        let station = stations
            .remove(&index)
            .ok_or(RadioError::NoSuchStation(index))?;
        station.quit();
        Ok((index, stations.len() as u16))
    }

    /// Shut down every station, e.g. on server exit.
    pub async fn quit(&self) {
        let mut stations = self.stations.write().await;
        for (_, station) in stations.drain() {
            station.quit();
        }
    }
}
