//! Error taxonomy shared across the audio and render subsystems.

use thiserror::Error;

/// Failures that cross a subsystem boundary.
///
/// Analysis-path faults never appear here: the analyzer recovers locally
/// with a zero spectrum because a visualization must not halt on bad
/// audio math.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable audio device. Fatal to the capture subsystem only; the
    /// render loop keeps going with a flat spectrum.
    #[error("audio device unavailable: {0}")]
    Device(String),

    /// Stream read/rebuild failure. Transient errors are retried with
    /// backoff; persistent loss stops capture gracefully.
    #[error("audio capture failed: {0}")]
    Capture(String),

    /// Shader compile or link failure, carrying the driver info log.
    #[error("shader error: {0}")]
    Shader(String),

    /// Operation invoked before the resource it needs exists.
    #[error("{0} is not ready")]
    ResourceNotReady(&'static str),
}
