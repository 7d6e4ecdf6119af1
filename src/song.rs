//! Playlist source: sequential, chunked reads over a single opaque audio file.

use std::io::SeekFrom;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::config::CHUNK;
use crate::error::{RadioError, Result};

/// The outcome of reading the next chunk from a [`Song`].
pub enum ChunkOutcome {
    /// `len` valid bytes were read into the chunk buffer (never padded).
    Chunk { data: Vec<u8>, len: usize },
    /// The song has been fully read.
    EndOfFile,
}

/// Sequential read access to one audio file, treated as an opaque byte stream.
pub struct Song {
    name: String,
    file: File,
}

impl Song {
    /// Open `name` for sequential reading.
    pub async fn open(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let file = File::open(&name)
            .await
            .map_err(|e| RadioError::open(name.clone(), e))?;
        Ok(Song { name, file })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read up to [`CHUNK`] bytes. Short reads report their true length.
    pub async fn next_chunk(&mut self) -> Result<ChunkOutcome> {
        let mut buf = vec![0u8; CHUNK];
        let mut total = 0;
        while total < CHUNK {
            let n = self.file.read(&mut buf[total..]).await?;
            if n == 0 {
                break;
            }
            total += n;
        }
        if total == 0 {
            Ok(ChunkOutcome::EndOfFile)
        } else {
            Ok(ChunkOutcome::Chunk {
                data: buf,
                len: total,
            })
        }
    }

    /// Seek back to the start of the file.
    pub async fn rewind(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::Start(0)).await?;
        Ok(())
    }

    /// Release the file handle. Consuming `self` drops it immediately rather
    /// than relying on whatever container happens to hold the `Song` going
    /// out of scope later.
    pub fn close(self) {
        drop(self.file);
    }
}
