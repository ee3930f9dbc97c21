use std::sync::Arc;

use zbus::fdo;
use zbus::interface;

use crate::charge::ChargeBehavior;
use crate::lifecycle::Platform;

use super::to_fdo;

/* The org.ayaneo.platform1.Charge interface. */
pub struct PlatformCharge {
    platform: Arc<Platform>,
}

impl PlatformCharge {
    pub fn new(platform: Arc<Platform>) -> Self {
        Self { platform }
    }
}

#[interface(name = "org.ayaneo.platform1.Charge")]
impl PlatformCharge {
    /* Whether this board and firmware support bypass charging (constant). */
    #[zbus(property)]
    async fn available(&self) -> bool {
        self.platform.is_charge_bypass_available()
    }

    /* Requested behaviour: "auto" or "inhibit" (read-write). */
    #[zbus(property)]
    async fn behaviour(&self) -> String {
        self.platform.charge_behavior().await.to_string()
    }

    #[zbus(property)]
    async fn set_behaviour(&self, behaviour: String) -> fdo::Result<()> {
        let behaviour = behaviour
            .parse::<ChargeBehavior>()
            .map_err(fdo::Error::InvalidArgs)?;
        self.platform
            .set_charge_behavior(behaviour)
            .await
            .map_err(to_fdo)
    }

    /* Behaviour last confirmed by the hardware, or "unknown". */
    #[zbus(property)]
    async fn applied_behaviour(&self) -> String {
        self.platform
            .applied_charge_behavior()
            .await
            .map_or_else(|| "unknown".to_string(), |b| b.to_string())
    }
}
