use std::sync::Arc;

use tokio::sync::RwLock;
use zbus::fdo;
use zbus::interface;

use crate::color::{ColorTarget, MAX_CHANNEL};
use crate::lifecycle::{Platform, SuspendPolicy};

use super::to_fdo;

/* Multicolor LED attributes: the color written is
 * `brightness * intensity / 255` per channel. */
struct Multicolor {
    brightness: u32,
    intensity: [u32; 3],
}

/* The org.ayaneo.platform1.Led interface. */
/*  */
/* Both rings (and KUN's button) as one multicolor LED. Every write only
 * queues a target; the hardware catches up in the background. */
pub struct PlatformLed {
    platform: Arc<Platform>,
    multicolor: RwLock<Multicolor>,
}

impl PlatformLed {
    pub fn new(platform: Arc<Platform>) -> Self {
        Self {
            platform,
            multicolor: RwLock::new(Multicolor {
                brightness: MAX_CHANNEL,
                intensity: [0; 3],
            }),
        }
    }

    async fn compose(&self, brightness: u32, intensity: [u32; 3]) -> fdo::Result<()> {
        let target = ColorTarget::from_multi_intensity(brightness, intensity).map_err(to_fdo)?;
        let mut mc = self.multicolor.write().await;
        mc.brightness = brightness;
        mc.intensity = intensity;
        self.platform.set_color_target(target).await;
        Ok(())
    }
}

#[interface(name = "org.ayaneo.platform1.Led")]
impl PlatformLed {
    /* Effective RGB triplet, 0-255 per channel (read-write). Setting it
     * resets brightness to full. */
    #[zbus(property)]
    async fn color(&self) -> (u32, u32, u32) {
        let [r, g, b] = self.platform.color().await.to_array();
        (r.into(), g.into(), b.into())
    }

    #[zbus(property)]
    async fn set_color(&self, color: (u32, u32, u32)) -> fdo::Result<()> {
        self.compose(MAX_CHANNEL, [color.0, color.1, color.2]).await
    }

    /* LED brightness, 0-255 (read-write). */
    #[zbus(property)]
    async fn brightness(&self) -> u32 {
        self.multicolor.read().await.brightness
    }

    #[zbus(property)]
    async fn set_brightness(&self, brightness: u32) -> fdo::Result<()> {
        let intensity = self.multicolor.read().await.intensity;
        self.compose(brightness, intensity).await
    }

    /* Per-channel intensity, 0-255 each (read-write). */
    #[zbus(property)]
    async fn multi_intensity(&self) -> (u32, u32, u32) {
        let [r, g, b] = self.multicolor.read().await.intensity;
        (r, g, b)
    }

    #[zbus(property)]
    async fn set_multi_intensity(&self, intensity: (u32, u32, u32)) -> fdo::Result<()> {
        let brightness = self.multicolor.read().await.brightness;
        self.compose(brightness, [intensity.0, intensity.1, intensity.2])
            .await
    }

    /* What the lights do during system sleep: oem, keep or off (read-write). */
    #[zbus(property)]
    async fn suspend_mode(&self) -> String {
        self.platform.suspend_policy().await.to_string()
    }

    #[zbus(property)]
    async fn set_suspend_mode(&self, mode: String) -> fdo::Result<()> {
        let policy = mode.parse::<SuspendPolicy>().map_err(fdo::Error::InvalidArgs)?;
        self.platform.set_suspend_policy(policy).await;
        Ok(())
    }

    /* Accepted SuspendMode values (constant). */
    #[zbus(property)]
    async fn suspend_modes(&self) -> Vec<String> {
        SuspendPolicy::ALL.iter().map(|p| p.to_string()).collect()
    }
}
