use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};
use zbus::zvariant::OwnedFd;
use zbus::{Connection, proxy};

use crate::lifecycle::Platform;

/* The subset of org.freedesktop.login1.Manager used for sleep handling. */
#[proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait LoginManager {
    fn inhibit(&self, what: &str, who: &str, why: &str, mode: &str) -> zbus::Result<OwnedFd>;

    #[zbus(signal)]
    fn prepare_for_sleep(&self, start: bool) -> zbus::Result<()>;
}

/* A held delay lock keeps logind from sleeping until it is dropped. */
async fn take_inhibitor(proxy: &LoginManagerProxy<'_>) -> Option<OwnedFd> {
    match proxy
        .inhibit(
            "sleep",
            "ayaneo-platformd",
            "Hand LED control back before sleep",
            "delay",
        )
        .await
    {
        Ok(fd) => {
            debug!("Sleep delay inhibitor taken");
            Some(fd)
        }
        Err(e) => {
            warn!("Could not take a sleep inhibitor: {e}");
            None
        }
    }
}

/* Drive the platform from a stream of PrepareForSleep values: suspend before
 * sleep, then let sleep proceed by dropping the inhibitor; resume after
 * wake-up and take a new one. Returns when the stream ends. */
pub async fn follow_sleep_events<S, L, F, Fut>(
    mut events: S,
    platform: &Platform,
    mut take_lock: F,
) where
    S: Stream<Item = bool> + Unpin,
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<L>>,
{
    let mut inhibitor = take_lock().await;

    while let Some(start) = events.next().await {
        if start {
            info!("System is going to sleep");
            platform.suspend().await;
            inhibitor = None;
        } else {
            info!("System woke up");
            platform.resume().await;
            if inhibitor.is_none() {
                inhibitor = take_lock().await;
            }
        }
    }

    drop(inhibitor);
}

pub async fn run_sleep_monitor(conn: Connection, platform: Arc<Platform>) -> Result<()> {
    let proxy = LoginManagerProxy::new(&conn)
        .await
        .context("Failed to create logind proxy")?;
    let signals = proxy
        .receive_prepare_for_sleep()
        .await
        .context("Failed to subscribe to PrepareForSleep")?;

    info!("Watching logind for system sleep");
    let events = signals.filter_map(|signal| match signal.args() {
        Ok(args) => Some(*args.start()),
        Err(e) => {
            warn!("Malformed PrepareForSleep signal: {e}");
            None
        }
    });
    follow_sleep_events(Box::pin(events), &platform, || take_inhibitor(&proxy)).await;

    info!("logind signal stream closed");
    Ok(())
}

/* Run a sleep monitor to completion and report how it ended. Without it the
 * lights and charging stay under driver control across system sleep. */
pub async fn supervise<F>(monitor: F) -> bool
where
    F: Future<Output = Result<()>>,
{
    match monitor.await {
        Ok(()) => true,
        Err(e) => {
            error!("Sleep handling disabled: {e:#}");
            false
        }
    }
}
