//! Error types for the framebuffer engine

pub use display_interface::DisplayError;

/// Errors reported by the engine.
///
/// Drawing calls never fail: out-of-range coordinates are clipped and an
/// unconfigured engine ignores them. Only configuration, reset and read-back
/// report errors to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid or unsupported resolution or viewport
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The framebuffer could not be allocated
    #[error("out of memory allocating {bytes} bytes of framebuffer")]
    OutOfMemory { bytes: usize },

    /// A transfer on the serial bus failed
    #[error("bus transfer failed: {0:?}")]
    Bus(DisplayError),

    /// Reset handshake did not succeed within the allowed attempts
    #[error("panel reset failed after {attempts} attempts")]
    ResetFailed { attempts: u8 },

    /// Region lies outside the viewport
    #[error("region ({x}, {y}) {width}x{height} exceeds the {vp_width}x{vp_height} viewport")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        vp_width: u32,
        vp_height: u32,
    },

    /// Operation needs a configured framebuffer
    #[error("display is not configured")]
    NotConfigured,

    /// `configure` was called before a bus was attached with `begin`
    #[error("no bus attached")]
    NotAttached,
}

impl From<DisplayError> for Error {
    fn from(e: DisplayError) -> Self {
        Error::Bus(e)
    }
}

/// Result alias used across the crate
pub type Result<T> = core::result::Result<T, Error>;
