/* Color targets and the shared pending-update cell drained by the color writer. */

use tokio::sync::RwLock;

use crate::error::{PlatformError, Result};

pub const MAX_CHANNEL: u32 = 255;

/* An RGB triple already weighted by brightness, each channel 0..=255. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ColorTarget {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

const CHANNEL_NAMES: [&str; 3] = ["red", "green", "blue"];

fn checked_channel(what: &'static str, value: u32) -> Result<u8> {
    u8::try_from(value).map_err(|_| PlatformError::InvalidInput { what, value })
}

impl ColorTarget {
    pub const OFF: ColorTarget = ColorTarget::new(0, 0, 0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /* Validate caller-supplied channels. Nothing is clamped. */
    pub fn from_channels(channels: [u32; 3]) -> Result<Self> {
        let mut out = [0u8; 3];
        for (i, value) in channels.into_iter().enumerate() {
            out[i] = checked_channel(CHANNEL_NAMES[i], value)?;
        }
        Ok(Self::from_array(out))
    }

    /* Multicolor LED composition: `channel = brightness * intensity / 255`. */
    pub fn from_multi_intensity(brightness: u32, intensity: [u32; 3]) -> Result<Self> {
        checked_channel("brightness", brightness)?;
        let mut out = [0u8; 3];
        for (i, value) in intensity.into_iter().enumerate() {
            checked_channel(CHANNEL_NAMES[i], value)?;
            /* both factors ≤ 255, so the quotient fits */
            out[i] = (brightness * value / MAX_CHANNEL) as u8;
        }
        Ok(Self::from_array(out))
    }

    pub const fn from_array(rgb: [u8; 3]) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2])
    }

    pub const fn to_array(self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }

    pub fn is_off(&self) -> bool {
        *self == Self::OFF
    }
}

#[derive(Debug, Default)]
struct Pending {
    target: ColorTarget,
    count: u64,
}

/* Target color plus the number of accepted updates not yet confirmed as
 * written. Setters only add to `count`; the writer only subtracts what it
 * observed in its snapshot. Every mutation happens under the write lock. */
#[derive(Debug, Default)]
pub struct PendingColorState {
    inner: RwLock<Pending>,
}

impl PendingColorState {
    pub fn new(initial: ColorTarget) -> Self {
        Self {
            inner: RwLock::new(Pending {
                target: initial,
                count: 0,
            }),
        }
    }

    /* Store a new target and mark it pending. O(1), no hardware access. */
    pub async fn submit(&self, target: ColorTarget) {
        let mut pending = self.inner.write().await;
        pending.target = target;
        pending.count += 1;
    }

    /* Mark the current target pending again without changing it. */
    pub async fn bump(&self) {
        self.inner.write().await.count += 1;
    }

    /* Snapshot `(target, count)` if anything is pending. */
    pub async fn snapshot(&self) -> Option<(ColorTarget, u64)> {
        let pending = self.inner.read().await;
        (pending.count > 0).then_some((pending.target, pending.count))
    }

    /* Retire `observed` updates taken from a snapshot. With `retry`, one
     * update stays pending so the current target is written again. */
    pub async fn consume(&self, observed: u64, retry: bool) {
        let mut pending = self.inner.write().await;
        debug_assert!(pending.count >= observed);
        pending.count = pending.count.saturating_sub(observed);
        if retry && pending.count == 0 {
            pending.count = 1;
        }
    }

    pub async fn target(&self) -> ColorTarget {
        self.inner.read().await.target
    }

    pub async fn pending(&self) -> u64 {
        self.inner.read().await.count
    }
}
