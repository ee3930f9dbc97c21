/*
 * The lifecycle controller.
 *
 * `Platform` owns the shared state and both writers, and sequences the
 * ordered transitions: initialize, suspend, resume, shutdown. Transitions are
 * serialized by one async mutex; setters never take it and never touch the
 * bus, so they stay O(1) while a transition is running.
 *
 *   Uninitialized --initialize--> Active --suspend--> Suspended
 *                                   ^                    |
 *                                   +------resume--------+
 *   any --shutdown--> ShuttingDown (terminal)
 */

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, info, warn};

use crate::bus::RegisterBus;
use crate::charge::{self, ChargeBehavior, ChargeState, ChargeWriter};
use crate::color::{ColorTarget, PendingColorState};
use crate::config::Settings;
use crate::error::{PlatformError, Result};
use crate::model::DeviceModel;
use crate::profile::{DeviceProfile, OpSequence, profile_for};
use crate::worker::{Worker, WriterStats};
use crate::writer::ColorWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Uninitialized,
    Active,
    Suspending,
    Suspended,
    Resuming,
    ShuttingDown,
}

impl LifecycleState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Active => "active",
            Self::Suspending => "suspending",
            Self::Suspended => "suspended",
            Self::Resuming => "resuming",
            Self::ShuttingDown => "shutting-down",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/* What the lights do while the system sleeps. */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SuspendPolicy {
    /* Hand control back to the firmware's own lighting program. */
    #[default]
    Oem,
    /* Leave the last color on. */
    Keep,
    /* Keep control and switch the lights off. */
    Off,
}

impl SuspendPolicy {
    pub const ALL: [SuspendPolicy; 3] = [Self::Oem, Self::Keep, Self::Off];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Oem => "oem",
            Self::Keep => "keep",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for SuspendPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SuspendPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oem" => Ok(Self::Oem),
            "keep" => Ok(Self::Keep),
            "off" => Ok(Self::Off),
            other => Err(format!("unknown suspend mode '{other}' (oem, keep, off)")),
        }
    }
}

/* Who currently drives the lighting controller. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Firmware,
    Driver,
}

/* Everything only a transition may touch. */
struct Control {
    color_writer: Option<Worker>,
    charge_writer: Option<Worker>,
    lighting: Ownership,
}

pub struct Platform {
    profile: &'static DeviceProfile,
    bus: Arc<dyn RegisterBus>,
    settings: Settings,
    color: Arc<PendingColorState>,
    charge: Arc<ChargeState>,
    charge_available: AtomicBool,
    suspend_policy: RwLock<SuspendPolicy>,
    stats: Arc<WriterStats>,
    charge_stats: Arc<WriterStats>,
    state: watch::Sender<LifecycleState>,
    control: Mutex<Control>,
}

impl Platform {
    pub fn new(model: DeviceModel, bus: Arc<dyn RegisterBus>, settings: Settings) -> Self {
        let (state, _) = watch::channel(LifecycleState::Uninitialized);
        Self {
            profile: profile_for(model),
            bus,
            suspend_policy: RwLock::new(settings.suspend_policy),
            settings,
            color: Arc::new(PendingColorState::new(ColorTarget::OFF)),
            charge: Arc::new(ChargeState::default()),
            charge_available: AtomicBool::new(false),
            stats: Arc::default(),
            charge_stats: Arc::default(),
            state,
            control: Mutex::new(Control {
                color_writer: None,
                charge_writer: None,
                lighting: Ownership::Firmware,
            }),
        }
    }

    pub fn model(&self) -> DeviceModel {
        self.profile.model
    }

    pub fn profile(&self) -> &'static DeviceProfile {
        self.profile
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /* Observe state changes. */
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: LifecycleState) {
        let old = self.state.send_replace(state);
        if old != state {
            debug!("Lifecycle {old} -> {state}");
        }
    }

    pub fn stats(&self) -> &WriterStats {
        &self.stats
    }

    pub fn charge_stats(&self) -> &WriterStats {
        &self.charge_stats
    }

    pub async fn lighting_ownership(&self) -> Ownership {
        self.control.lock().await.lighting
    }

    /* Run a sequence, logging instead of failing: transitions must complete
     * even when the hardware misbehaves. */
    async fn run_logged(&self, what: &str, seq: OpSequence) -> bool {
        match seq.run(self.bus.as_ref()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: {what} failed: {e}", self.profile.model);
                false
            }
        }
    }

    fn spawn_color_writer(&self) -> Worker {
        let writer = ColorWriter::new(
            self.profile,
            Arc::clone(&self.bus),
            Arc::clone(&self.color),
            &self.settings,
            Arc::clone(&self.stats),
        );
        Worker::spawn("color writer", move |stop| writer.run(stop))
    }

    fn spawn_charge_writer(&self) -> Option<Worker> {
        if !self.is_charge_bypass_available() {
            return None;
        }
        let profile = self.profile.charge?;
        let writer = ChargeWriter::new(
            profile,
            Arc::clone(&self.bus),
            Arc::clone(&self.charge),
            self.settings.charge_poll_interval,
            Arc::clone(&self.charge_stats),
        );
        Some(Worker::spawn("charge writer", move |stop| writer.run(stop)))
    }

    async fn stop_writers(control: &mut Control) {
        if let Some(mut worker) = control.color_writer.take() {
            worker.stop().await;
        }
        if let Some(mut worker) = control.charge_writer.take() {
            worker.stop().await;
        }
    }

    /* Take control of the lights, probe bypass charging and start the
     * writers. Fails only for models with no known registers. */
    pub async fn initialize(&self) -> Result<()> {
        let mut control = self.control.lock().await;
        if self.state() != LifecycleState::Uninitialized {
            debug!("initialize ignored in state {}", self.state());
            return Ok(());
        }

        let model = self.profile.model;
        if !self.profile.is_mapped() {
            return Err(PlatformError::UnsupportedModel(model.to_string()));
        }

        if self.profile.lighting.is_some() {
            self.run_logged("take control", self.profile.take_control()).await;
            control.lighting = Ownership::Driver;
        }

        if let Some(profile) = &self.profile.charge {
            let available = charge::probe_availability(profile, self.bus.as_ref()).await;
            if available {
                if let Err(e) = charge::sync_applied(profile, self.bus.as_ref(), &self.charge).await {
                    warn!("Could not read bypass charge status: {e}");
                }
            }
            self.charge_available.store(available, Ordering::Release);
        }

        control.color_writer = Some(self.spawn_color_writer());
        control.charge_writer = self.spawn_charge_writer();
        self.set_state(LifecycleState::Active);

        info!(
            "{model}: lighting {}, bypass charging {}",
            self.profile
                .lighting
                .map_or("none", |l| l.family.commands().name()),
            if self.is_charge_bypass_available() { "available" } else { "unavailable" }
        );
        Ok(())
    }

    /* Validate and queue a color. Returns before any hardware write. */
    pub async fn set_color(&self, channels: [u32; 3]) -> Result<()> {
        let target = ColorTarget::from_channels(channels)?;
        self.set_color_target(target).await;
        Ok(())
    }

    pub async fn set_color_target(&self, target: ColorTarget) {
        debug!("Color request {:?}", target);
        self.color.submit(target).await;
    }

    /* The last accepted target, which may not be on the hardware yet. */
    pub async fn color(&self) -> ColorTarget {
        self.color.target().await
    }

    pub async fn pending_color_updates(&self) -> u64 {
        self.color.pending().await
    }

    pub async fn set_suspend_policy(&self, policy: SuspendPolicy) {
        *self.suspend_policy.write().await = policy;
    }

    pub async fn suspend_policy(&self) -> SuspendPolicy {
        *self.suspend_policy.read().await
    }

    pub fn is_charge_bypass_available(&self) -> bool {
        self.charge_available.load(Ordering::Acquire)
    }

    pub async fn set_charge_behavior(&self, behavior: ChargeBehavior) -> Result<()> {
        if !self.is_charge_bypass_available() {
            return Err(PlatformError::CapabilityUnavailable("bypass charging"));
        }
        debug!("Charge request {behavior}");
        self.charge.request(behavior).await;
        Ok(())
    }

    pub async fn charge_behavior(&self) -> ChargeBehavior {
        self.charge.requested().await
    }

    /* None while the hardware state is unknown. */
    pub async fn applied_charge_behavior(&self) -> Option<ChargeBehavior> {
        self.charge.applied().await
    }

    /* Stop the writers and leave the lights as the suspend policy says.
     * Ignored unless active. */
    pub async fn suspend(&self) {
        let mut control = self.control.lock().await;
        if self.state() != LifecycleState::Active {
            debug!("suspend ignored in state {}", self.state());
            return;
        }
        self.set_state(LifecycleState::Suspending);

        if let Some(mut worker) = control.color_writer.take() {
            worker.stop().await;
        }

        let policy = self.suspend_policy().await;
        if self.profile.lighting.is_some() {
            match policy {
                SuspendPolicy::Oem => {
                    self.run_logged("release control", self.profile.release_control())
                        .await;
                    control.lighting = Ownership::Firmware;
                }
                SuspendPolicy::Keep => {}
                SuspendPolicy::Off => {
                    self.run_logged("lights off", self.profile.take_control()).await;
                    control.lighting = Ownership::Driver;
                }
            }
        }
        tokio::time::sleep(self.settings.suspend_settle).await;

        if let Some(mut worker) = control.charge_writer.take() {
            worker.stop().await;
        }

        self.set_state(LifecycleState::Suspended);
        info!("Suspended (lights: {policy})");
    }

    /* Retake control and write the current target again. Ignored unless
     * suspended. */
    pub async fn resume(&self) {
        let mut control = self.control.lock().await;
        if self.state() != LifecycleState::Suspended {
            debug!("resume ignored in state {}", self.state());
            return;
        }
        self.set_state(LifecycleState::Resuming);

        if self.profile.lighting.is_some() {
            self.run_logged("take control", self.profile.take_control()).await;
            control.lighting = Ownership::Driver;
        }

        /* the controller came back dark; the target must be written again */
        self.color.bump().await;
        control.color_writer = Some(self.spawn_color_writer());
        tokio::time::sleep(self.settings.suspend_settle).await;
        control.charge_writer = self.spawn_charge_writer();

        self.set_state(LifecycleState::Active);
        info!("Resumed");
    }

    /* Stop everything and hand the hardware back: lights to the firmware,
     * charging to auto. Terminal; later calls do nothing. */
    pub async fn shutdown(&self) {
        let mut control = self.control.lock().await;
        let previous = self.state();
        if previous == LifecycleState::ShuttingDown {
            return;
        }
        self.set_state(LifecycleState::ShuttingDown);
        if previous == LifecycleState::Uninitialized {
            return;
        }

        Self::stop_writers(&mut control).await;

        if control.lighting == Ownership::Driver {
            self.run_logged("release control", self.profile.release_control()).await;
            control.lighting = Ownership::Firmware;
        }

        if self.is_charge_bypass_available() {
            if let Some(profile) = &self.profile.charge {
                if let Err(e) = charge::restore_auto(profile, self.bus.as_ref(), &self.charge).await {
                    warn!("Could not restore automatic charging: {e}");
                }
            }
        }

        info!("Shut down, hardware returned to firmware");
    }
}
