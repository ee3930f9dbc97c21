/* The model table. Adding a model is a new entry here plus tests. */

use std::time::Duration;

use crate::bus::RegisterAddress;
use crate::model::DeviceModel;

use super::{
    BASE_CEILING, ChargeProfile, DeviceProfile, FirmwareVersion, GROUP_BUTTON, GROUP_LEFT,
    GROUP_RIGHT, LightingFamily, LightingProfile, SubZone, Zone, ZoneLayout,
};

/* ────────────────────────────── Zone layouts ────────────────────────────── */

const RING: &[SubZone] = &[
    SubZone::rgb(3),
    SubZone::rgb(6),
    SubZone::rgb(9),
    SubZone::rgb(12),
];

/* KUN's LEDs are wired in a different channel order per quadrant. */
const KUN_RING: &[SubZone] = &[
    SubZone::remapped(3, [1, 0, 2]),
    SubZone::remapped(6, [1, 2, 0]),
    SubZone::remapped(9, [2, 0, 1]),
    SubZone::remapped(12, [2, 1, 0]),
];

const KUN_BUTTON: &[SubZone] = &[SubZone::remapped(12, [2, 0, 1])];

const BASE: &[u8] = &[BASE_CEILING];

const fn left(scale: &'static [u8], subzones: &'static [SubZone]) -> ZoneLayout {
    ZoneLayout {
        zone: Zone::LeftRing,
        group: GROUP_LEFT,
        scale,
        subzones,
    }
}

const fn right(scale: &'static [u8], subzones: &'static [SubZone]) -> ZoneLayout {
    ZoneLayout {
        zone: Zone::RightRing,
        group: GROUP_RIGHT,
        scale,
        subzones,
    }
}

/* Uniform brightness on both sides. */
const EVEN: &[ZoneLayout] = &[left(BASE, RING), right(BASE, RING)];

/* AIR / AIR Pro / AIR 1S: the left ring is much brighter. */
const AIR: &[ZoneLayout] = &[left(&[BASE_CEILING, 69], RING), right(BASE, RING)];

/* AIR 1S Limited: the right ring runs slightly hot. */
const AIR_1S_LIMITED: &[ZoneLayout] = &[left(BASE, RING), right(&[BASE_CEILING, 204], RING)];

/* AIR Plus boards drive both rings near their headroom. */
const AIR_PLUS: &[ZoneLayout] = &[
    left(&[BASE_CEILING, 64], RING),
    right(&[BASE_CEILING, 32], RING),
];

const KUN: &[ZoneLayout] = &[
    left(BASE, KUN_RING),
    right(BASE, KUN_RING),
    ZoneLayout {
        zone: Zone::Button,
        group: GROUP_BUTTON,
        scale: BASE,
        subzones: KUN_BUTTON,
    },
];

const fn lighting(family: LightingFamily, zones: &'static [ZoneLayout]) -> Option<LightingProfile> {
    Some(LightingProfile { family, zones })
}

/* ───────────────────────────── Bypass charging ──────────────────────────── */

/* Written to the control register; the status register echoes the state. */
const BYPASS_OPEN: u8 = 0x55;
const BYPASS_CLOSE: u8 = 0xaa;
const BYPASS_SETTLE: Duration = Duration::from_millis(10);

/* Firmware version bytes. */
const VERSION_MAJOR: u8 = 0x00;
const VERSION_MINOR: u8 = 0x01;

/* EC registers on boards whose EC owns charging. */
const EC_BYPASS_CONTROL: u8 = 0xd1;
const EC_BYPASS_STATUS: u8 = 0xd2;

/* EC RAM bytes on boards with the dedicated controller. */
const RAM_BYPASS_CONTROL: u8 = 0x1e;
const RAM_BYPASS_STATUS: u8 = 0x1f;

const fn direct_charge(major: u8, minor: u8) -> Option<ChargeProfile> {
    Some(ChargeProfile {
        control: RegisterAddress::Direct(EC_BYPASS_CONTROL),
        status: RegisterAddress::Direct(EC_BYPASS_STATUS),
        inhibit_value: BYPASS_OPEN,
        auto_value: BYPASS_CLOSE,
        settle: BYPASS_SETTLE,
        version: [
            RegisterAddress::Direct(VERSION_MAJOR),
            RegisterAddress::Direct(VERSION_MINOR),
        ],
        min_version: FirmwareVersion { major, minor },
    })
}

const fn indexed_charge(major: u8, minor: u8) -> Option<ChargeProfile> {
    Some(ChargeProfile {
        control: RegisterAddress::indexed(RAM_BYPASS_CONTROL),
        status: RegisterAddress::indexed(RAM_BYPASS_STATUS),
        inhibit_value: BYPASS_OPEN,
        auto_value: BYPASS_CLOSE,
        settle: BYPASS_SETTLE,
        version: [
            RegisterAddress::indexed(VERSION_MAJOR),
            RegisterAddress::indexed(VERSION_MINOR),
        ],
        min_version: FirmwareVersion { major, minor },
    })
}

/* ──────────────────────────────── Profiles ──────────────────────────────── */

macro_rules! profile {
    ($model:ident, $lighting:expr, $charge:expr) => {
        DeviceProfile {
            model: DeviceModel::$model,
            lighting: $lighting,
            charge: $charge,
        }
    };
}

use LightingFamily::{Legacy, Modern};

static PROFILES: &[DeviceProfile] = &[
    profile!(Air, lighting(Legacy, AIR), None),
    profile!(Air1S, lighting(Legacy, AIR), None),
    profile!(Air1SLimited, lighting(Legacy, AIR_1S_LIMITED), None),
    profile!(AirPlus, lighting(Modern, AIR_PLUS), indexed_charge(1, 7)),
    profile!(AirPlusMendocino, lighting(Legacy, AIR_PLUS), None),
    profile!(AirPro, lighting(Legacy, AIR), None),
    profile!(Ayaneo2, lighting(Legacy, EVEN), None),
    profile!(Ayaneo2S, lighting(Legacy, EVEN), direct_charge(1, 6)),
    profile!(Geek, lighting(Legacy, EVEN), None),
    profile!(Geek1S, lighting(Legacy, EVEN), direct_charge(1, 6)),
    profile!(Kun, lighting(Legacy, KUN), direct_charge(1, 4)),
    profile!(Slide, lighting(Modern, EVEN), indexed_charge(1, 2)),
];

static UNMAPPED: &[DeviceProfile] = &[
    profile!(Ayaneo2021, None, None),
    profile!(Ayaneo2021Pro, None, None),
    profile!(Next, None, None),
    profile!(NextPro, None, None),
    profile!(Flip, None, None),
];

/* Look up the static profile of `model`. Every model has an entry; models
 * without a register map get an entry whose sequences are all empty. */
pub fn profile_for(model: DeviceModel) -> &'static DeviceProfile {
    PROFILES
        .iter()
        .chain(UNMAPPED)
        .find(|p| p.model == model)
        .unwrap_or(&UNMAPPED[0])
}
