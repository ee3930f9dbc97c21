/* The color writer: drains `PendingColorState` into hardware cascades.
 *
 * Setters never touch the bus. The writer snapshots `(target, count)`, runs
 * one full cascade for the target, then retires exactly `count` updates, so a
 * burst of submissions collapses into a single cascade of the last color and
 * updates arriving mid-cascade stay pending for the next round. */

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bus::RegisterBus;
use crate::color::PendingColorState;
use crate::config::Settings;
use crate::error::BusError;
use crate::profile::DeviceProfile;
use crate::worker::{StopSignal, WriterStats};

/* Upper bound for the retry delay while the bus keeps failing. */
const MAX_BACKOFF: Duration = Duration::from_secs(2);

pub struct ColorWriter {
    profile: &'static DeviceProfile,
    bus: Arc<dyn RegisterBus>,
    state: Arc<PendingColorState>,
    idle_min_ms: u64,
    idle_max_ms: u64,
    stats: Arc<WriterStats>,
    /* consecutive failed cascades */
    failures: AtomicU32,
}

impl ColorWriter {
    pub fn new(
        profile: &'static DeviceProfile,
        bus: Arc<dyn RegisterBus>,
        state: Arc<PendingColorState>,
        settings: &Settings,
        stats: Arc<WriterStats>,
    ) -> Self {
        let idle_min_ms = settings.idle_min.as_millis() as u64;
        let idle_max_ms = (settings.idle_max.as_millis() as u64).max(idle_min_ms);
        Self {
            profile,
            bus,
            state,
            idle_min_ms,
            idle_max_ms,
            stats,
            failures: AtomicU32::new(0),
        }
    }

    /* Jittered so the writer doesn't lock-step with other EC users. */
    fn idle_delay(&self) -> Duration {
        Duration::from_millis(rand::random_range(self.idle_min_ms..=self.idle_max_ms))
    }

    /* Doubles with every consecutive failure, capped at MAX_BACKOFF. */
    fn retry_delay(&self) -> Duration {
        let shift = self.consecutive_failures().min(16);
        self.idle_delay().saturating_mul(1 << shift).min(MAX_BACKOFF)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /* Apply the pending target once. `None` when nothing was pending. On
     * failure one update stays pending so the target is retried. */
    pub async fn step(&self) -> Option<Result<(), BusError>> {
        let (target, observed) = self.state.snapshot().await?;

        let result = self.profile.apply_color(target).run(self.bus.as_ref()).await;
        match &result {
            Ok(()) => {
                debug!("Applied {:?} covering {} update(s)", target, observed);
                self.stats.record_success();
                let failed = self.failures.swap(0, Ordering::Relaxed);
                if failed > 0 {
                    info!("Color cascade recovered after {failed} failure(s)");
                }
            }
            Err(e) => {
                /* only the first of a run is worth a warning */
                if self.failures.fetch_add(1, Ordering::Relaxed) == 0 {
                    warn!("Color cascade for {:?} failed, retrying: {e}", target);
                } else {
                    debug!("Color cascade for {:?} failed again: {e}", target);
                }
                self.stats.record_failure(e);
            }
        }

        self.state.consume(observed, result.is_err()).await;
        Some(result)
    }

    pub async fn run(self, mut stop: StopSignal) {
        info!("Color writer running for {}", self.profile.model);

        while !stop.should_stop() {
            let delay = match self.step().await {
                Some(Ok(())) => continue,
                None => self.idle_delay(),
                Some(Err(_)) => self.retry_delay(),
            };
            if !stop.sleep(delay).await {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::emulated::{EmulatedEc, RegisterWrite};
    use crate::bus::{DEFAULT_LOCK_TIMEOUT, HardwareBus, PortIo};
    use crate::color::ColorTarget;
    use crate::model::DeviceModel;
    use crate::profile::modern::{BANK_LEFT, BANK_RIGHT};
    use crate::profile::{Zone, profile_for};
    use crate::worker::Worker;

    struct Rig {
        ec: Arc<EmulatedEc>,
        state: Arc<PendingColorState>,
        stats: Arc<WriterStats>,
        profile: &'static DeviceProfile,
    }

    impl Rig {
        fn new(model: DeviceModel) -> (Self, ColorWriter) {
            let ec = Arc::new(EmulatedEc::new());
            let bus: Arc<dyn RegisterBus> = Arc::new(HardwareBus::new(
                Arc::clone(&ec) as Arc<dyn PortIo>,
                DEFAULT_LOCK_TIMEOUT,
            ));
            let state = Arc::new(PendingColorState::default());
            let stats = Arc::new(WriterStats::default());
            let profile = profile_for(model);
            let settings = Settings {
                idle_min: Duration::from_millis(1),
                idle_max: Duration::from_millis(2),
                ..Settings::default()
            };
            let writer = ColorWriter::new(
                profile,
                bus,
                Arc::clone(&state),
                &settings,
                Arc::clone(&stats),
            );
            (
                Self {
                    ec,
                    state,
                    stats,
                    profile,
                },
                writer,
            )
        }

        /* The RGB triple stored at sub-zone position 3 of a modern bank. */
        fn modern_rgb(&self, bank: u8) -> ColorTarget {
            ColorTarget::new(
                self.ec.ram(bank + 3),
                self.ec.ram(bank + 4),
                self.ec.ram(bank + 5),
            )
        }

        fn expected(&self, zone: Zone, target: ColorTarget) -> ColorTarget {
            self.profile.scaled(self.profile.zone(zone).unwrap(), target)
        }

        async fn drained(&self) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while self.state.pending().await > 0 {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            })
            .await
            .expect("writer should drain pending updates");
        }
    }

    #[tokio::test]
    async fn test_idle_step_touches_nothing() {
        let (rig, writer) = Rig::new(DeviceModel::AirPlus);
        assert!(writer.step().await.is_none());
        assert!(rig.ec.writes().is_empty());
    }

    #[tokio::test]
    async fn test_burst_coalesces_into_one_cascade() {
        let (rig, writer) = Rig::new(DeviceModel::AirPlus);
        let last = ColorTarget::new(255, 0, 128);
        for i in 0..10u8 {
            rig.state.submit(ColorTarget::new(i, i, i)).await;
        }
        rig.state.submit(last).await;

        assert!(matches!(writer.step().await, Some(Ok(()))));
        assert!(writer.step().await.is_none());
        assert_eq!(rig.stats.applied(), 1);
        assert_eq!(rig.state.pending().await, 0);

        let left = rig.expected(Zone::LeftRing, last);
        let right = rig.expected(Zone::RightRing, last);
        assert_eq!(rig.modern_rgb(BANK_LEFT), left);
        assert_eq!(rig.modern_rgb(BANK_RIGHT), right);

        /* no intermediate color ever reached the left ring's first triple */
        let red_writes: Vec<u8> = rig
            .ec
            .writes()
            .into_iter()
            .filter_map(|w| match w {
                RegisterWrite::Ram { index, value } if index == BANK_LEFT + 3 => Some(value),
                _ => None,
            })
            .collect();
        assert_eq!(red_writes, vec![left.red]);
    }

    #[tokio::test]
    async fn test_update_during_cascade_stays_pending() {
        let (rig, writer) = Rig::new(DeviceModel::AirPlus);
        rig.state.submit(ColorTarget::new(10, 10, 10)).await;

        let (target, observed) = rig.state.snapshot().await.unwrap();
        rig.state.submit(ColorTarget::new(20, 20, 20)).await;
        rig.state.consume(observed, false).await;
        assert_eq!(target, ColorTarget::new(10, 10, 10));

        assert!(matches!(writer.step().await, Some(Ok(()))));
        assert_eq!(
            rig.modern_rgb(BANK_LEFT),
            rig.expected(Zone::LeftRing, ColorTarget::new(20, 20, 20))
        );
    }

    #[tokio::test]
    async fn test_failed_cascade_is_retried() {
        let (rig, writer) = Rig::new(DeviceModel::Ayaneo2);
        rig.state.submit(ColorTarget::new(200, 100, 50)).await;
        rig.ec.fail_next(1);

        assert!(matches!(writer.step().await, Some(Err(_))));
        assert_eq!(rig.state.pending().await, 1);
        assert_eq!(rig.stats.failed(), 1);
        assert!(rig.stats.last_error().is_some());

        assert!(matches!(writer.step().await, Some(Ok(()))));
        assert_eq!(rig.state.pending().await, 0);
        assert_eq!(rig.stats.applied(), 1);
    }

    #[tokio::test]
    async fn test_backoff_grows_while_failing() {
        let (rig, writer) = Rig::new(DeviceModel::Ayaneo2);
        rig.state.submit(ColorTarget::new(1, 2, 3)).await;
        rig.ec.fail_next(4);

        for _ in 0..4 {
            assert!(matches!(writer.step().await, Some(Err(_))));
        }
        assert_eq!(writer.consecutive_failures(), 4);
        assert_eq!(rig.state.pending().await, 1);
        /* idle is 1-2ms, four doublings put the retry at 16ms or more */
        assert!(writer.retry_delay() >= Duration::from_millis(16));
        assert!(writer.retry_delay() <= MAX_BACKOFF);

        assert!(matches!(writer.step().await, Some(Ok(()))));
        assert_eq!(writer.consecutive_failures(), 0);
        assert_eq!(rig.stats.failed(), 4);
    }

    #[tokio::test]
    async fn test_backoff_is_capped() {
        let (_rig, writer) = Rig::new(DeviceModel::Ayaneo2);
        writer.failures.store(40, Ordering::Relaxed);
        assert_eq!(writer.retry_delay(), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_worker_converges_under_continuous_updates() {
        let (rig, writer) = Rig::new(DeviceModel::AirPlus);
        let mut worker = Worker::spawn("color writer", move |stop| writer.run(stop));

        let state = Arc::clone(&rig.state);
        let feeder = tokio::spawn(async move {
            for i in 0..=200u8 {
                state.submit(ColorTarget::new(i, 255 - i, 0)).await;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });

        /* cascades keep landing while the feeder never lets pending reach 0 */
        tokio::time::timeout(Duration::from_secs(5), async {
            while rig.stats.applied() < 2 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("writer must make progress while updates keep arriving");

        feeder.await.unwrap();
        rig.drained().await;
        worker.stop().await;

        let last = ColorTarget::new(200, 55, 0);
        assert_eq!(rig.modern_rgb(BANK_LEFT), rig.expected(Zone::LeftRing, last));
        assert_eq!(rig.modern_rgb(BANK_RIGHT), rig.expected(Zone::RightRing, last));
    }

    #[tokio::test]
    async fn test_stop_after_drain_writes_nothing_more() {
        let (rig, writer) = Rig::new(DeviceModel::Geek);
        let mut worker = Worker::spawn("color writer", move |stop| writer.run(stop));

        rig.state.submit(ColorTarget::new(1, 2, 3)).await;
        rig.drained().await;
        worker.stop().await;

        rig.ec.clear_log();
        rig.state.submit(ColorTarget::new(4, 5, 6)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rig.ec.writes().is_empty());
    }
}
