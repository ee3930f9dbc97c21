pub mod charge;
pub mod led;
pub mod manager;
pub mod sleep;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use zbus::connection::Builder;
use zbus::{Connection, fdo};

use crate::error::PlatformError;
use crate::lifecycle::Platform;

pub const BUS_NAME: &str = "org.ayaneo.platform1";
pub const ROOT_PATH: &str = "/org/ayaneo/platform1";
pub const LED_PATH: &str = "/org/ayaneo/platform1/led";
pub const CHARGE_PATH: &str = "/org/ayaneo/platform1/charge";

/* Map a platform error onto the standard DBus error a client expects. */
pub fn to_fdo(err: PlatformError) -> fdo::Error {
    match err {
        PlatformError::InvalidInput { .. } => fdo::Error::InvalidArgs(err.to_string()),
        PlatformError::CapabilityUnavailable(_) | PlatformError::UnsupportedModel(_) => {
            fdo::Error::NotSupported(err.to_string())
        }
        PlatformError::HardwareBusy(_) | PlatformError::Bus(_) => {
            fdo::Error::Failed(err.to_string())
        }
    }
}

/* Claim the bus name and serve the Manager, Led and Charge objects. */
/*  */
/* The returned connection keeps serving until dropped. */
pub async fn run_server(platform: Arc<Platform>) -> Result<Connection> {
    let conn = Builder::system()?
        .name(BUS_NAME)?
        .serve_at(ROOT_PATH, manager::PlatformManager::new(Arc::clone(&platform)))?
        .serve_at(LED_PATH, led::PlatformLed::new(Arc::clone(&platform)))?
        .serve_at(CHARGE_PATH, charge::PlatformCharge::new(Arc::clone(&platform)))?
        .build()
        .await?;

    info!("DBus server ready on {BUS_NAME}");

    tokio::spawn(forward_state_changes(conn.clone(), platform));
    Ok(conn)
}

/* Emit PropertiesChanged for Manager.State on every lifecycle transition. */
async fn forward_state_changes(conn: Connection, platform: Arc<Platform>) {
    let mut states = platform.subscribe();

    let iface_ref = match conn
        .object_server()
        .interface::<_, manager::PlatformManager>(ROOT_PATH)
        .await
    {
        Ok(iface) => iface,
        Err(e) => {
            warn!("Manager interface missing, state changes not published: {e}");
            return;
        }
    };

    while states.changed().await.is_ok() {
        if let Err(e) = iface_ref
            .get()
            .await
            .state_changed(iface_ref.signal_emitter())
            .await
        {
            warn!("Failed to emit State change: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;

    #[test]
    fn test_error_mapping() {
        let invalid = PlatformError::InvalidInput { what: "red", value: 300 };
        assert!(matches!(to_fdo(invalid), fdo::Error::InvalidArgs(_)));

        let unavailable = PlatformError::CapabilityUnavailable("bypass charging");
        assert!(matches!(to_fdo(unavailable), fdo::Error::NotSupported(_)));

        let busy = PlatformError::from(BusError::Busy(std::time::Duration::from_millis(500)));
        assert!(matches!(to_fdo(busy), fdo::Error::Failed(_)));
    }
}
