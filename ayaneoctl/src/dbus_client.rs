/* ayaneoctl DBus client: thin wrapper over the org.ayaneo.platform1 objects, mapping property
 * reads and writes for the manager, the LED and bypass charging onto typed calls. */
//! Low-level DBus client for `org.ayaneo.platform1`.
//!
//! All communication with the daemon goes through this module.

use anyhow::{Context, Result, anyhow};
use zbus::Connection;
use zbus::zvariant::{OwnedValue, Value};

const BUS_NAME: &str = "org.ayaneo.platform1";
const MANAGER_PATH: &str = "/org/ayaneo/platform1";
const LED_PATH: &str = "/org/ayaneo/platform1/led";
const CHARGE_PATH: &str = "/org/ayaneo/platform1/charge";
const MANAGER_IFACE: &str = "org.ayaneo.platform1.Manager";
const LED_IFACE: &str = "org.ayaneo.platform1.Led";
const CHARGE_IFACE: &str = "org.ayaneo.platform1.Charge";

/// A client that talks to `ayaneo-platformd` over the system DBus.
pub struct PlatformClient {
    conn: Connection,
}

impl PlatformClient {
    /// Connect to the system bus.
    pub async fn connect() -> Result<Self> {
        let conn = Connection::system()
            .await
            .context("Cannot connect to the system DBus")?;
        Ok(Self { conn })
    }

    // -----------------------------------------------------------------------
    // Manager
    // -----------------------------------------------------------------------

    pub async fn get_api_version(&self) -> Result<i32> {
        self.get_i32_property(MANAGER_PATH, MANAGER_IFACE, "APIVersion").await
    }

    pub async fn get_model(&self) -> Result<String> {
        self.get_string_property(MANAGER_PATH, MANAGER_IFACE, "Model").await
    }

    pub async fn get_state(&self) -> Result<String> {
        self.get_string_property(MANAGER_PATH, MANAGER_IFACE, "State").await
    }

    /// `(applied, failed)` color cascades since the daemon started.
    pub async fn get_cascade_counts(&self) -> Result<(u64, u64)> {
        let applied = self
            .get_u64_property(MANAGER_PATH, MANAGER_IFACE, "CascadesApplied")
            .await?;
        let failed = self
            .get_u64_property(MANAGER_PATH, MANAGER_IFACE, "CascadesFailed")
            .await?;
        Ok((applied, failed))
    }

    // -----------------------------------------------------------------------
    // Led
    // -----------------------------------------------------------------------

    pub async fn get_led_color(&self) -> Result<(u32, u32, u32)> {
        self.get_rgb_property(LED_PATH, LED_IFACE, "Color").await
    }

    pub async fn set_led_color(&self, r: u32, g: u32, b: u32) -> Result<()> {
        validate_rgb(r, g, b)?;
        self.set_property(LED_PATH, LED_IFACE, "Color", Value::from((r, g, b)))
            .await
    }

    pub async fn get_led_brightness(&self) -> Result<u32> {
        self.get_u32_property(LED_PATH, LED_IFACE, "Brightness").await
    }

    pub async fn set_led_brightness(&self, brightness: u32) -> Result<()> {
        anyhow::ensure!(brightness <= 255, "Brightness out of range: {} (expected 0..=255)", brightness);
        self.set_property(LED_PATH, LED_IFACE, "Brightness", Value::from(brightness))
            .await
    }

    pub async fn get_led_intensity(&self) -> Result<(u32, u32, u32)> {
        self.get_rgb_property(LED_PATH, LED_IFACE, "MultiIntensity").await
    }

    pub async fn set_led_intensity(&self, r: u32, g: u32, b: u32) -> Result<()> {
        validate_rgb(r, g, b)?;
        self.set_property(LED_PATH, LED_IFACE, "MultiIntensity", Value::from((r, g, b)))
            .await
    }

    pub async fn get_suspend_mode(&self) -> Result<String> {
        self.get_string_property(LED_PATH, LED_IFACE, "SuspendMode").await
    }

    pub async fn get_suspend_modes(&self) -> Result<Vec<String>> {
        let val = self.get_property(LED_PATH, LED_IFACE, "SuspendModes").await?;
        extract_string_array(val).context("Failed to parse SuspendModes property")
    }

    pub async fn set_suspend_mode(&self, mode: &str) -> Result<()> {
        self.set_property(LED_PATH, LED_IFACE, "SuspendMode", Value::from(mode))
            .await
    }

    // -----------------------------------------------------------------------
    // Charge
    // -----------------------------------------------------------------------

    pub async fn get_charge_available(&self) -> Result<bool> {
        self.get_bool_property(CHARGE_PATH, CHARGE_IFACE, "Available").await
    }

    pub async fn get_charge_behaviour(&self) -> Result<String> {
        self.get_string_property(CHARGE_PATH, CHARGE_IFACE, "Behaviour").await
    }

    pub async fn get_applied_charge_behaviour(&self) -> Result<String> {
        self.get_string_property(CHARGE_PATH, CHARGE_IFACE, "AppliedBehaviour").await
    }

    pub async fn set_charge_behaviour(&self, behaviour: &str) -> Result<()> {
        self.set_property(CHARGE_PATH, CHARGE_IFACE, "Behaviour", Value::from(behaviour))
            .await
    }

    // -----------------------------------------------------------------------
    // Generic helpers
    // -----------------------------------------------------------------------

    async fn get_property(&self, path: &str, iface: &str, prop: &str) -> Result<OwnedValue> {
        let reply = self
            .conn
            .call_method(
                Some(BUS_NAME),
                path,
                Some("org.freedesktop.DBus.Properties"),
                "Get",
                &(iface, prop),
            )
            .await
            .with_context(|| format!("Get {}.{} at {} failed", iface, prop, path))?;
        let val: OwnedValue = reply.body().deserialize()?;
        Ok(val)
    }

    async fn set_property(&self, path: &str, iface: &str, prop: &str, value: Value<'_>) -> Result<()> {
        self.conn
            .call_method(
                Some(BUS_NAME),
                path,
                Some("org.freedesktop.DBus.Properties"),
                "Set",
                &(iface, prop, value),
            )
            .await
            .with_context(|| format!("Set {}.{} at {} failed", iface, prop, path))?;
        Ok(())
    }

    async fn get_string_property(&self, path: &str, iface: &str, prop: &str) -> Result<String> {
        let val = self.get_property(path, iface, prop).await?;
        val.downcast_ref::<String>()
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }

    async fn get_u32_property(&self, path: &str, iface: &str, prop: &str) -> Result<u32> {
        let val = self.get_property(path, iface, prop).await?;
        val.downcast_ref::<u32>()
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }

    async fn get_u64_property(&self, path: &str, iface: &str, prop: &str) -> Result<u64> {
        let val = self.get_property(path, iface, prop).await?;
        val.downcast_ref::<u64>()
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }

    async fn get_i32_property(&self, path: &str, iface: &str, prop: &str) -> Result<i32> {
        let val = self.get_property(path, iface, prop).await?;
        val.downcast_ref::<i32>()
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }

    async fn get_bool_property(&self, path: &str, iface: &str, prop: &str) -> Result<bool> {
        let val = self.get_property(path, iface, prop).await?;
        val.downcast_ref::<bool>()
            .with_context(|| format!("Type mismatch for {}.{} at {}", iface, prop, path))
    }

    async fn get_rgb_property(&self, path: &str, iface: &str, prop: &str) -> Result<(u32, u32, u32)> {
        let val = self.get_property(path, iface, prop).await?;
        let inner: Value<'_> = val.into();
        if let Value::Structure(s) = &inner {
            if let [Value::U32(r), Value::U32(g), Value::U32(b)] = s.fields() {
                return Ok((*r, *g, *b));
            }
        }
        Err(anyhow!("Malformed {} property at {}", prop, path))
    }
}

// ---------------------------------------------------------------------------
// Free-standing helpers
// ---------------------------------------------------------------------------

/// Extract a `Vec<String>` from an `OwnedValue` that wraps an array of strings.
fn extract_string_array(val: OwnedValue) -> Result<Vec<String>> {
    let inner: Value<'_> = val.into();
    match inner {
        Value::Array(arr) => {
            let mut out = Vec::with_capacity(arr.len());
            for item in arr.iter() {
                match item {
                    Value::Str(s) => out.push(s.to_string()),
                    _ => return Err(anyhow!("Array contains non-string value")),
                }
            }
            Ok(out)
        }
        _ => Err(anyhow!("Value is not an array of strings")),
    }
}

fn validate_rgb(r: u32, g: u32, b: u32) -> Result<()> {
    anyhow::ensure!(r <= 255, "Red component out of range: {}", r);
    anyhow::ensure!(g <= 255, "Green component out of range: {}", g);
    anyhow::ensure!(b <= 255, "Blue component out of range: {}", b);
    Ok(())
}
