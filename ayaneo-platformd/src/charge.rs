/* Bypass charging: requested/applied bookkeeping and the polling writer that
 * reconciles the two over the shared bus. */

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::bus::RegisterBus;
use crate::error::BusError;
use crate::profile::ChargeProfile;
use crate::worker::{StopSignal, WriterStats};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChargeBehavior {
    /* Firmware decides; the battery charges normally. */
    #[default]
    Auto,
    /* Run from external power without charging the battery. */
    InhibitCharge,
}

impl ChargeBehavior {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::InhibitCharge => "inhibit",
        }
    }
}

impl fmt::Display for ChargeBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargeBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "inhibit" | "inhibit-charge" => Ok(Self::InhibitCharge),
            other => Err(format!("unknown charge behaviour '{other}'")),
        }
    }
}

#[derive(Debug, Default)]
struct Behaviors {
    requested: ChargeBehavior,
    /* None until the hardware has been read or written. */
    applied: Option<ChargeBehavior>,
}

/* `applied` only moves after the hardware accepted a write or reported its
 * state. While it is unknown the next reconcile always checks the hardware. */
#[derive(Debug, Default)]
pub struct ChargeState {
    inner: RwLock<Behaviors>,
}

impl ChargeState {
    pub async fn request(&self, behavior: ChargeBehavior) {
        self.inner.write().await.requested = behavior;
    }

    pub async fn requested(&self) -> ChargeBehavior {
        self.inner.read().await.requested
    }

    pub async fn applied(&self) -> Option<ChargeBehavior> {
        self.inner.read().await.applied
    }

    pub async fn record_applied(&self, behavior: ChargeBehavior) {
        self.inner.write().await.applied = Some(behavior);
    }

    pub async fn forget_applied(&self) {
        self.inner.write().await.applied = None;
    }

    /* `(requested, applied)` */
    pub async fn snapshot(&self) -> (ChargeBehavior, Option<ChargeBehavior>) {
        let inner = self.inner.read().await;
        (inner.requested, inner.applied)
    }
}

/* True when the firmware is recent enough for bypass charging. A failed
 * version read counts as unavailable. */
pub async fn probe_availability(profile: &ChargeProfile, bus: &dyn RegisterBus) -> bool {
    match profile.read_version(bus).await {
        Ok(version) if version >= profile.min_version => {
            info!("Bypass charging available (firmware {version})");
            true
        }
        Ok(version) => {
            info!(
                "Bypass charging needs firmware {} or later, found {version}",
                profile.min_version
            );
            false
        }
        Err(e) => {
            warn!("Could not read EC firmware version: {e}");
            false
        }
    }
}

/* Seed `applied` from the status register, so a behaviour left behind by an
 * earlier run is not mistaken for `Auto`. An unrecognised status or a failed
 * read leaves it unknown. */
pub async fn sync_applied(
    profile: &ChargeProfile,
    bus: &dyn RegisterBus,
    state: &ChargeState,
) -> Result<Option<ChargeBehavior>, BusError> {
    state.forget_applied().await;
    let status = bus.read(profile.status).await?;
    let found = profile.behavior_from_status(status);
    match found {
        Some(behavior) => {
            debug!("Bypass charge found {behavior} in hardware");
            state.record_applied(behavior).await;
        }
        None => warn!("Unrecognised bypass charge status {status:#04x}"),
    }
    Ok(found)
}

pub struct ChargeWriter {
    profile: ChargeProfile,
    bus: Arc<dyn RegisterBus>,
    state: Arc<ChargeState>,
    interval: Duration,
    stats: Arc<WriterStats>,
}

impl ChargeWriter {
    pub fn new(
        profile: ChargeProfile,
        bus: Arc<dyn RegisterBus>,
        state: Arc<ChargeState>,
        interval: Duration,
        stats: Arc<WriterStats>,
    ) -> Self {
        Self {
            profile,
            bus,
            state,
            interval,
            stats,
        }
    }

    /* One pass: bring the hardware to the requested behaviour if needed.
     * Returns whether the control register was written. */
    pub async fn reconcile(&self) -> Result<bool, BusError> {
        let (requested, applied) = self.state.snapshot().await;
        if applied == Some(requested) {
            return Ok(false);
        }

        let status = self.bus.read(self.profile.status).await?;
        if self.profile.behavior_from_status(status) == Some(requested) {
            debug!("Bypass charge already {requested} in hardware");
            self.state.record_applied(requested).await;
            return Ok(false);
        }

        self.profile.sequence(requested).run(self.bus.as_ref()).await?;
        self.state.record_applied(requested).await;
        info!("Bypass charge set to {requested}");
        Ok(true)
    }

    pub async fn run(self, mut stop: StopSignal) {
        debug!("Charge writer polling every {:?}", self.interval);

        while !stop.should_stop() {
            match self.reconcile().await {
                Ok(true) => self.stats.record_success(),
                Ok(false) => {}
                Err(e) => {
                    warn!("Bypass charge update failed, retrying next poll: {e}");
                    self.stats.record_failure(&e);
                }
            }

            if !stop.sleep(self.interval).await {
                break;
            }
        }
    }
}

/* Put the hardware back to `Auto` unless it is known to be there already. */
pub async fn restore_auto(
    profile: &ChargeProfile,
    bus: &dyn RegisterBus,
    state: &ChargeState,
) -> Result<(), BusError> {
    state.request(ChargeBehavior::Auto).await;
    if state.applied().await == Some(ChargeBehavior::Auto) {
        return Ok(());
    }

    profile.sequence(ChargeBehavior::Auto).run(bus).await?;
    state.record_applied(ChargeBehavior::Auto).await;
    info!("Bypass charge restored to auto");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::emulated::{EmulatedEc, RegisterWrite};
    use crate::bus::{DEFAULT_LOCK_TIMEOUT, HardwareBus, PortIo, RegisterAddress};
    use crate::model::DeviceModel;
    use crate::profile::profile_for;
    use crate::worker::Worker;

    fn setup(model: DeviceModel) -> (Arc<EmulatedEc>, Arc<dyn RegisterBus>, ChargeProfile) {
        let ec = Arc::new(EmulatedEc::new());
        let bus: Arc<dyn RegisterBus> = Arc::new(HardwareBus::new(
            Arc::clone(&ec) as Arc<dyn PortIo>,
            DEFAULT_LOCK_TIMEOUT,
        ));
        let profile = profile_for(model).charge.unwrap();
        (ec, bus, profile)
    }

    fn control_register(profile: &ChargeProfile) -> u8 {
        match profile.control {
            RegisterAddress::Direct(register) => register,
            RegisterAddress::Indexed { index, .. } => index,
        }
    }

    #[test]
    fn test_behavior_strings() {
        assert_eq!("auto".parse::<ChargeBehavior>(), Ok(ChargeBehavior::Auto));
        assert_eq!(" Inhibit ".parse::<ChargeBehavior>(), Ok(ChargeBehavior::InhibitCharge));
        assert!("bypass".parse::<ChargeBehavior>().is_err());
        assert_eq!(ChargeBehavior::InhibitCharge.to_string(), "inhibit");
    }

    #[tokio::test]
    async fn test_probe_compares_firmware_version() {
        let (ec, bus, profile) = setup(DeviceModel::Kun);
        assert!(!probe_availability(&profile, bus.as_ref()).await);

        ec.set_ec(0x00, 1);
        ec.set_ec(0x01, 4);
        assert!(probe_availability(&profile, bus.as_ref()).await);

        ec.fail_next(1);
        assert!(!probe_availability(&profile, bus.as_ref()).await);
    }

    #[tokio::test]
    async fn test_probe_indexed_model_reads_ram() {
        let (ec, bus, profile) = setup(DeviceModel::AirPlus);
        ec.set_ram(0x00, 1);
        ec.set_ram(0x01, 6);
        assert!(!probe_availability(&profile, bus.as_ref()).await);
        ec.set_ram(0x01, 7);
        assert!(probe_availability(&profile, bus.as_ref()).await);
    }

    #[tokio::test]
    async fn test_reconcile_writes_once() {
        let (ec, bus, profile) = setup(DeviceModel::Kun);
        let state = Arc::new(ChargeState::default());
        let writer = ChargeWriter::new(
            profile,
            bus,
            Arc::clone(&state),
            Duration::from_secs(30),
            Arc::default(),
        );

        state.record_applied(ChargeBehavior::Auto).await;
        assert!(!writer.reconcile().await.unwrap());

        state.request(ChargeBehavior::InhibitCharge).await;
        assert!(writer.reconcile().await.unwrap());
        assert_eq!(state.applied().await, Some(ChargeBehavior::InhibitCharge));
        assert_eq!(ec.ec(control_register(&profile)), profile.inhibit_value);

        ec.clear_log();
        assert!(!writer.reconcile().await.unwrap());
        assert!(ec.writes().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_skips_when_hardware_already_matches() {
        let (ec, bus, profile) = setup(DeviceModel::Kun);
        let state = Arc::new(ChargeState::default());
        let writer = ChargeWriter::new(
            profile,
            bus,
            Arc::clone(&state),
            Duration::from_secs(30),
            Arc::default(),
        );

        ec.set_ec(0xd2, profile.inhibit_value);
        state.request(ChargeBehavior::InhibitCharge).await;

        assert!(!writer.reconcile().await.unwrap());
        assert!(ec.writes().is_empty());
        assert_eq!(state.applied().await, Some(ChargeBehavior::InhibitCharge));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_applied_untouched() {
        let (ec, bus, profile) = setup(DeviceModel::Kun);
        let state = Arc::new(ChargeState::default());
        let writer = ChargeWriter::new(
            profile,
            bus,
            Arc::clone(&state),
            Duration::from_secs(30),
            Arc::default(),
        );

        state.record_applied(ChargeBehavior::Auto).await;
        state.request(ChargeBehavior::InhibitCharge).await;
        ec.fail_next(1);
        assert!(writer.reconcile().await.is_err());
        assert_eq!(state.applied().await, Some(ChargeBehavior::Auto));
        assert!(ec.writes().is_empty());

        assert!(writer.reconcile().await.unwrap());
        assert_eq!(state.applied().await, Some(ChargeBehavior::InhibitCharge));
    }

    #[tokio::test]
    async fn test_worker_applies_request_on_first_poll() {
        let (ec, bus, profile) = setup(DeviceModel::Geek1S);
        let state = Arc::new(ChargeState::default());
        let stats = Arc::new(WriterStats::default());
        state.request(ChargeBehavior::InhibitCharge).await;

        let writer = ChargeWriter::new(
            profile,
            bus,
            Arc::clone(&state),
            Duration::from_secs(3600),
            Arc::clone(&stats),
        );
        let mut worker = Worker::spawn("charge writer", move |stop| writer.run(stop));

        tokio::time::timeout(Duration::from_secs(2), async {
            while state.applied().await != Some(ChargeBehavior::InhibitCharge) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("first poll happens without waiting for the interval");

        worker.stop().await;
        assert_eq!(stats.applied(), 1);
        assert!(ec.writes().contains(&RegisterWrite::Ec {
            register: 0xd1,
            value: profile.inhibit_value
        }));
    }

    #[tokio::test]
    async fn test_restore_auto() {
        let (ec, bus, profile) = setup(DeviceModel::Slide);
        let state = ChargeState::default();

        state.record_applied(ChargeBehavior::Auto).await;
        restore_auto(&profile, bus.as_ref(), &state).await.unwrap();
        assert!(ec.writes().is_empty());

        state.request(ChargeBehavior::InhibitCharge).await;
        state.record_applied(ChargeBehavior::InhibitCharge).await;
        restore_auto(&profile, bus.as_ref(), &state).await.unwrap();

        assert_eq!(
            state.snapshot().await,
            (ChargeBehavior::Auto, Some(ChargeBehavior::Auto))
        );
        assert_eq!(ec.ram(0x1e), profile.auto_value);
    }

    #[tokio::test]
    async fn test_restore_auto_writes_when_state_unknown() {
        let (ec, bus, profile) = setup(DeviceModel::Kun);
        let state = ChargeState::default();

        restore_auto(&profile, bus.as_ref(), &state).await.unwrap();
        assert_eq!(ec.ec(0xd1), profile.auto_value);
        assert_eq!(state.applied().await, Some(ChargeBehavior::Auto));
    }

    #[tokio::test]
    async fn test_sync_applied_reads_leftover_behaviour() {
        let (ec, bus, profile) = setup(DeviceModel::Kun);
        let state = Arc::new(ChargeState::default());
        ec.set_ec(0xd1, profile.inhibit_value);
        ec.set_ec(0xd2, profile.inhibit_value);

        let found = sync_applied(&profile, bus.as_ref(), &state).await.unwrap();
        assert_eq!(found, Some(ChargeBehavior::InhibitCharge));
        assert_eq!(
            state.snapshot().await,
            (ChargeBehavior::Auto, Some(ChargeBehavior::InhibitCharge))
        );

        /* requested auto now differs from what the hardware does */
        let writer = ChargeWriter::new(
            profile,
            bus,
            Arc::clone(&state),
            Duration::from_secs(30),
            Arc::default(),
        );
        assert!(writer.reconcile().await.unwrap());
        assert_eq!(ec.ec(0xd1), profile.auto_value);
    }

    #[tokio::test]
    async fn test_sync_applied_unknown_status_forces_write() {
        let (ec, bus, profile) = setup(DeviceModel::Kun);
        let state = Arc::new(ChargeState::default());
        state.record_applied(ChargeBehavior::Auto).await;
        ec.set_ec(0xd2, 0x42);

        assert_eq!(sync_applied(&profile, bus.as_ref(), &state).await.unwrap(), None);
        assert_eq!(state.applied().await, None);

        ec.set_ec(0xd2, 0x00);
        let writer = ChargeWriter::new(
            profile,
            bus,
            Arc::clone(&state),
            Duration::from_secs(30),
            Arc::default(),
        );
        assert!(writer.reconcile().await.unwrap());
        assert!(ec.writes().contains(&RegisterWrite::Ec {
            register: 0xd1,
            value: profile.auto_value
        }));
    }
}
