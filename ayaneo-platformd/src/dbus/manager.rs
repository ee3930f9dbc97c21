use std::sync::Arc;

use zbus::interface;

use crate::lifecycle::Platform;

/* DBus API version, bumped on incompatible interface changes. */
pub const API_VERSION: i32 = 1;

/* The org.ayaneo.platform1.Manager interface. */
/*  */
/* Entry point for clients: which board this is and what the daemon is doing. */
pub struct PlatformManager {
    platform: Arc<Platform>,
}

impl PlatformManager {
    pub fn new(platform: Arc<Platform>) -> Self {
        Self { platform }
    }
}

#[interface(name = "org.ayaneo.platform1.Manager")]
impl PlatformManager {
    /* The DBus API version (constant, read-only). */
    #[zbus(property, name = "APIVersion")]
    async fn api_version(&self) -> i32 {
        API_VERSION
    }

    /* Detected model, e.g. "AIR Plus". */
    #[zbus(property)]
    async fn model(&self) -> String {
        self.platform.model().to_string()
    }

    /* Lifecycle state: active, suspended, ... */
    #[zbus(property)]
    async fn state(&self) -> String {
        self.platform.state().to_string()
    }

    /* Color cascades written to hardware since start. */
    #[zbus(property)]
    async fn cascades_applied(&self) -> u64 {
        self.platform.stats().applied()
    }

    #[zbus(property)]
    async fn cascades_failed(&self) -> u64 {
        self.platform.stats().failed()
    }
}
