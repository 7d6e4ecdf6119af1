use thiserror::Error;

pub type Result<T> = std::result::Result<T, RadioError>;

/// Every error kind the broadcast core can produce.
///
/// Library code always returns `Result<T, RadioError>`; the three binaries convert to
/// `anyhow::Result` at their outermost `main`.
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("could not open {name}: {source}")]
    Open {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("station {0} doesn't exist")]
    NoSuchStation(u16),

    #[error("cannot remove station when there are no stations")]
    Empty,

    #[error("{0} not subscribed to station")]
    NotSubscribed(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("could not encode message: {0}")]
    Encode(String),

    #[error("could not decode message: {0}")]
    Decode(String),
}

impl RadioError {
    pub fn open(name: impl Into<String>, source: std::io::Error) -> Self {
        RadioError::Open {
            name: name.into(),
            source,
        }
    }
}
