#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Device memory exhaustion on the plain device-only allocation path.
    /// The only driver condition surfaced to the caller instead of aborting:
    /// the runtime may free other buffers and retry.
    #[error("memory object allocation failure")]
    AllocationFailure,

    #[error("driver unavailable: {0}")]
    DriverUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
