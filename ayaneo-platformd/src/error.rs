/* Error taxonomy shared by the bus, the profiles and the lifecycle controller. */

use std::time::Duration;

use thiserror::Error;

/* Failures of a single register access. */
#[derive(Debug, Error)]
pub enum BusError {
    /* The arbitration lock could not be taken in time. The access was abandoned. */
    #[error("hardware lock not acquired within {0:?}")]
    Busy(Duration),

    /* The backend syscall failed (port or EC file access). */
    #[error("register access failed: {0}")]
    Io(#[from] std::io::Error),
}

/* Errors surfaced to callers of the `Platform` API. */
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("hardware busy: {0}")]
    HardwareBusy(#[source] BusError),

    #[error("{what} {value} is outside 0..=255")]
    InvalidInput { what: &'static str, value: u32 },

    #[error("{0} has no lighting or charge profile")]
    UnsupportedModel(String),

    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(&'static str),

    #[error(transparent)]
    Bus(BusError),
}

impl From<BusError> for PlatformError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Busy(_) => Self::HardwareBusy(err),
            BusError::Io(_) => Self::Bus(err),
        }
    }
}

pub type Result<T, E = PlatformError> = std::result::Result<T, E>;
