use std::path::Path;
use std::time::Duration;

use configparser::ini::Ini;
use tracing::{debug, warn};

use crate::bus::DEFAULT_LOCK_TIMEOUT;
use crate::lifecycle::SuspendPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/ayaneo-platform/ayaneo-platform.conf";

/* Runtime tunables. Every field has a default; the config file only
 * overrides what it names. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /* Policy applied at suspend until changed over DBus. */
    pub suspend_policy: SuspendPolicy,
    /* Color writer idle sleep is drawn from `idle_min..=idle_max`. */
    pub idle_min: Duration,
    pub idle_max: Duration,
    /* Pause after suspend/resume transitions. */
    pub suspend_settle: Duration,
    pub charge_poll_interval: Duration,
    pub lock_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            suspend_policy: SuspendPolicy::default(),
            idle_min: Duration::from_millis(10),
            idle_max: Duration::from_millis(20),
            suspend_settle: Duration::from_millis(100),
            charge_poll_interval: Duration::from_secs(30),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/* Load settings from an INI file. A missing or malformed file yields the
 * defaults; malformed values fall back individually. */
pub fn load_settings(path: &Path) -> Settings {
    if !path.exists() {
        debug!("No config at {:?}, using defaults", path);
        return Settings::default();
    }

    let mut ini = Ini::new();
    match ini.load(path) {
        Ok(_) => {
            let settings = parse_settings(&ini);
            debug!("Loaded {:?}: {:?}", path, settings);
            settings
        }
        Err(e) => {
            warn!("Failed to parse {:?}: {}; using defaults", path, e);
            Settings::default()
        }
    }
}

/* Parse settings from INI text. */
pub fn parse_settings_str(text: &str) -> Result<Settings, String> {
    let mut ini = Ini::new();
    ini.read(text.to_string())?;
    Ok(parse_settings(&ini))
}

fn millis(ini: &Ini, section: &str, key: &str, default: Duration) -> Duration {
    number(ini, section, key).map_or(default, Duration::from_millis)
}

fn number(ini: &Ini, section: &str, key: &str) -> Option<u64> {
    let raw = ini.get(section, key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("Ignoring [{section}] {key}={raw}: not a number");
            None
        }
    }
}

/* Section and key names are case-insensitive (configparser lowercases them). */
fn parse_settings(ini: &Ini) -> Settings {
    let defaults = Settings::default();

    let suspend_policy = match ini.get("lighting", "suspendmode") {
        Some(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Ignoring [Lighting] SuspendMode: {e}");
            defaults.suspend_policy
        }),
        None => defaults.suspend_policy,
    };

    let idle_min = millis(ini, "lighting", "idleminms", defaults.idle_min);
    let mut idle_max = millis(ini, "lighting", "idlemaxms", defaults.idle_max);
    if idle_max < idle_min {
        warn!("[Lighting] IdleMaxMs below IdleMinMs, using IdleMinMs for both");
        idle_max = idle_min;
    }

    let charge_poll_interval = number(ini, "charge", "pollintervalsecs")
        .filter(|&secs| secs > 0)
        .map_or(defaults.charge_poll_interval, Duration::from_secs);

    let lock_timeout = millis(ini, "bus", "locktimeoutms", defaults.lock_timeout);

    Settings {
        suspend_policy,
        idle_min,
        idle_max,
        suspend_settle: millis(ini, "lighting", "suspendsettlems", defaults.suspend_settle),
        charge_poll_interval,
        lock_timeout,
    }
}
