/* ayaneo-platformd: RGB lighting and bypass charging for AYANEO handhelds.
 *
 * Callers set a target color or charge behaviour without waiting; background
 * writers push the newest target through the embedded controller's slow,
 * lock-arbitrated register interface, and the lifecycle controller hands
 * hardware ownership back and forth around suspend, resume and shutdown. */

pub mod bus;
pub mod charge;
pub mod color;
pub mod config;
pub mod dbus;
pub mod dmi;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod profile;
pub mod worker;
pub mod writer;

pub use error::{BusError, PlatformError, Result};
pub use lifecycle::{LifecycleState, Platform, SuspendPolicy};
pub use model::DeviceModel;
