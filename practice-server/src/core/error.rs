use thiserror::Error;

/// Errors that stop the server from starting or serving
///
/// Request-level failures use [`crate::AppError`]; this type only covers
/// process lifecycle.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
