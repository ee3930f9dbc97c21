/* ayaneo-platformd: identifies the board, takes over the LED controller and
 * serves the lighting and charge controls on the system bus until SIGTERM. */

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ayaneo_platform::bus::port::DevPortIo;
use ayaneo_platform::bus::{HardwareBus, PortIo, RegisterBus};
use ayaneo_platform::config::{self, DEFAULT_CONFIG_PATH, Settings};
use ayaneo_platform::{Platform, dbus, dmi};

#[derive(Parser)]
#[command(name = "ayaneo-platformd", version, about)]
struct Args {
    /// Configuration file.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Board name to assume instead of reading DMI (e.g. "AB05-AMD").
    #[arg(long)]
    board: Option<String>,

    /// Drive an emulated controller instead of hardware, optionally preloaded
    /// from a JSON description.
    #[cfg(feature = "dev-hooks")]
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    emulate: Option<String>,
}

fn open_hardware() -> Result<Arc<dyn PortIo>> {
    Ok(Arc::new(DevPortIo::open()?))
}

#[cfg(feature = "dev-hooks")]
fn open_backend(args: &Args) -> Result<Arc<dyn PortIo>> {
    use ayaneo_platform::bus::emulated::{EmulatedEc, EmulatedEcSpec};

    let Some(spec) = &args.emulate else {
        return open_hardware();
    };

    /* inline JSON, or a path to a JSON file */
    let json = if spec.is_empty() || spec.trim_start().starts_with('{') {
        spec.clone()
    } else {
        std::fs::read_to_string(spec)
            .with_context(|| format!("Failed to read emulator spec {spec}"))?
    };
    let spec = EmulatedEcSpec::parse_json(&json).context("Invalid emulator spec")?;
    tracing::warn!("Using an emulated embedded controller");
    Ok(Arc::new(EmulatedEc::from_spec(&spec)))
}

#[cfg(not(feature = "dev-hooks"))]
fn open_backend(_args: &Args) -> Result<Arc<dyn PortIo>> {
    open_hardware()
}

async fn wait_for_termination() -> Result<()> {
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to register SIGTERM handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to wait for Ctrl+C")?;
            info!("Received SIGINT");
        }
    }
    Ok(())
}

async fn serve(platform: &Arc<Platform>) -> Result<()> {
    let conn = dbus::run_server(Arc::clone(platform))
        .await
        .context("Failed to start the DBus server")?;

    let sleep_monitor = tokio::spawn(dbus::sleep::supervise(
        dbus::sleep::run_sleep_monitor(conn.clone(), Arc::clone(platform)),
    ));

    wait_for_termination().await?;

    sleep_monitor.abort();
    drop(conn);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let settings: Settings = config::load_settings(&args.config);
    let model = dmi::detect_model(args.board.as_deref())?;

    let io = open_backend(&args)?;
    let bus: Arc<dyn RegisterBus> = Arc::new(HardwareBus::new(io, settings.lock_timeout));

    let platform = Arc::new(Platform::new(model, bus, settings));
    platform
        .initialize()
        .await
        .with_context(|| format!("Cannot drive {model}"))?;

    let result = serve(&platform).await;

    /* hand the hardware back even when serving failed */
    platform.shutdown().await;
    result
}
