/*
 * Per-model hardware profiles.
 *
 * A profile turns intents (take control, show this color, bypass charging)
 * into ordered `OpSequence`s of register writes and settle delays. Nothing
 * here touches hardware; sequences are executed by `OpSequence::run` against
 * any `RegisterBus`.
 *
 * Lighting comes in two families sharing one command vocabulary:
 *   legacy: the EC's own LED registers, one direct write per field
 *   modern: a dedicated LED controller behind the EC RAM window
 */

pub mod legacy;
pub mod modern;
pub mod table;

use std::time::Duration;

use tracing::debug;

use crate::bus::{RegisterAddress, RegisterBus};
use crate::charge::ChargeBehavior;
use crate::color::ColorTarget;
use crate::error::BusError;
use crate::model::DeviceModel;

pub use table::profile_for;

/* Controller group codes. */
pub const GROUP_LEFT: u8 = 0x01;
pub const GROUP_RIGHT: u8 = 0x02;
pub const GROUP_LEFT_RIGHT: u8 = 0x03;
pub const GROUP_BUTTON: u8 = 0x04;

/* Command positions and values shared by both families. */
pub const CMD_ENABLE_ADDR: u8 = 0x02;
pub const CMD_ENABLE_ON: u8 = 0xb1;
pub const CMD_ENABLE_OFF: u8 = 0x31;
pub const CMD_ENABLE_RESET: u8 = 0xc0;

/* Every zone is first scaled to this ceiling. */
pub const BASE_CEILING: u8 = 192;

/* One step of a hardware sequence. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusOp {
    Write { addr: RegisterAddress, value: u8 },
    Settle(Duration),
}

/* An ordered list of bus operations. */
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpSequence {
    ops: Vec<BusOp>,
}

impl OpSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, addr: RegisterAddress, value: u8) -> &mut Self {
        self.ops.push(BusOp::Write { addr, value });
        self
    }

    pub fn settle(&mut self, delay: Duration) -> &mut Self {
        self.ops.push(BusOp::Settle(delay));
        self
    }

    pub fn append(&mut self, other: OpSequence) -> &mut Self {
        self.ops.extend(other.ops);
        self
    }

    pub fn ops(&self) -> &[BusOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /* The writes only, in order. */
    pub fn writes(&self) -> impl Iterator<Item = (RegisterAddress, u8)> + '_ {
        self.ops.iter().filter_map(|op| match *op {
            BusOp::Write { addr, value } => Some((addr, value)),
            BusOp::Settle(_) => None,
        })
    }

    /* Execute in order. Stops at the first failed write. */
    pub async fn run(&self, bus: &dyn RegisterBus) -> Result<(), BusError> {
        for op in &self.ops {
            match *op {
                BusOp::Write { addr, value } => bus.write(addr, value).await?,
                BusOp::Settle(delay) => tokio::time::sleep(delay).await,
            }
        }
        Ok(())
    }
}

/* The per-family command vocabulary. `set` is the only primitive; the
 * default compositions match what both controllers accept. */
pub trait CommandSet: Send + Sync {
    fn name(&self) -> &'static str;

    /* Write `value` at `pos` of `group`, including the settle delay. */
    fn set(&self, seq: &mut OpSequence, group: u8, pos: u8, value: u8);

    /* Take control away from the firmware's own lighting program. */
    fn hold(&self, seq: &mut OpSequence);

    /* Hand control back to the firmware. */
    fn release(&self, seq: &mut OpSequence);

    /* Latch the preceding zone writes. */
    fn terminate(&self, seq: &mut OpSequence) {
        self.set(seq, GROUP_LEFT_RIGHT, 0x00, 0x00);
    }

    fn enable(&self, seq: &mut OpSequence) {
        self.set(seq, GROUP_LEFT, CMD_ENABLE_ADDR, CMD_ENABLE_ON);
        self.set(seq, GROUP_RIGHT, CMD_ENABLE_ADDR, CMD_ENABLE_ON);
        self.terminate(seq);
    }

    fn disable(&self, seq: &mut OpSequence) {
        self.set(seq, GROUP_LEFT, CMD_ENABLE_ADDR, CMD_ENABLE_OFF);
        self.set(seq, GROUP_RIGHT, CMD_ENABLE_ADDR, CMD_ENABLE_OFF);
        self.terminate(seq);
    }

    /* Revert the controller's registers to power-on defaults. */
    fn reset(&self, seq: &mut OpSequence) {
        self.set(seq, GROUP_LEFT, CMD_ENABLE_ADDR, CMD_ENABLE_RESET);
        self.set(seq, GROUP_RIGHT, CMD_ENABLE_ADDR, CMD_ENABLE_RESET);
        self.terminate(seq);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightingFamily {
    Legacy,
    Modern,
}

impl LightingFamily {
    pub fn commands(self) -> &'static dyn CommandSet {
        match self {
            Self::Legacy => &legacy::Legacy,
            Self::Modern => &modern::Modern,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Zone {
    LeftRing,
    RightRing,
    Button,
}

/* One RGB register triple at `pos..pos + 3`. `channels[i]` names the input
 * channel (0 = R, 1 = G, 2 = B) wired to the i-th register. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubZone {
    pub pos: u8,
    pub channels: [usize; 3],
}

impl SubZone {
    pub const fn rgb(pos: u8) -> Self {
        Self {
            pos,
            channels: [0, 1, 2],
        }
    }

    pub const fn remapped(pos: u8, channels: [usize; 3]) -> Self {
        Self { pos, channels }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneLayout {
    pub zone: Zone,
    pub group: u8,
    /* Ceilings applied in order. */
    pub scale: &'static [u8],
    pub subzones: &'static [SubZone],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightingProfile {
    pub family: LightingFamily,
    pub zones: &'static [ZoneLayout],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/* Bypass charge registers of one model. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargeProfile {
    pub control: RegisterAddress,
    pub status: RegisterAddress,
    pub inhibit_value: u8,
    pub auto_value: u8,
    pub settle: Duration,
    /* (major, minor) firmware version registers. */
    pub version: [RegisterAddress; 2],
    pub min_version: FirmwareVersion,
}

impl ChargeProfile {
    pub fn value_for(&self, behavior: ChargeBehavior) -> u8 {
        match behavior {
            ChargeBehavior::Auto => self.auto_value,
            ChargeBehavior::InhibitCharge => self.inhibit_value,
        }
    }

    /* Interpret a status register read. Unknown values mean "unknown". */
    pub fn behavior_from_status(&self, status: u8) -> Option<ChargeBehavior> {
        if status == self.inhibit_value {
            Some(ChargeBehavior::InhibitCharge)
        } else if status == self.auto_value {
            Some(ChargeBehavior::Auto)
        } else {
            None
        }
    }

    pub fn sequence(&self, behavior: ChargeBehavior) -> OpSequence {
        let mut seq = OpSequence::new();
        seq.write(self.control, self.value_for(behavior))
            .settle(self.settle);
        seq
    }

    pub async fn read_version(&self, bus: &dyn RegisterBus) -> Result<FirmwareVersion, BusError> {
        let major = bus.read(self.version[0]).await?;
        let minor = bus.read(self.version[1]).await?;
        Ok(FirmwareVersion { major, minor })
    }
}

/* `floor(value * ceiling / 255)`, except that a lit channel never goes dark. */
pub fn scale_channel(value: u8, ceiling: u8) -> u8 {
    let scaled = u16::from(value) * u16::from(ceiling) / 255;
    if scaled == 0 && value > 0 {
        1
    } else {
        scaled as u8
    }
}

pub fn scale_color(color: ColorTarget, ceiling: u8) -> ColorTarget {
    let [r, g, b] = color.to_array();
    ColorTarget::new(
        scale_channel(r, ceiling),
        scale_channel(g, ceiling),
        scale_channel(b, ceiling),
    )
}

/* Static description of one model. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProfile {
    pub model: DeviceModel,
    pub lighting: Option<LightingProfile>,
    pub charge: Option<ChargeProfile>,
}

impl DeviceProfile {
    pub fn is_mapped(&self) -> bool {
        self.lighting.is_some() || self.charge.is_some()
    }

    /* Run `build` against the model's command set; empty when unmapped. */
    fn build(&self, build: impl FnOnce(&dyn CommandSet, &mut OpSequence)) -> OpSequence {
        let mut seq = OpSequence::new();
        if let Some(lighting) = &self.lighting {
            build(lighting.family.commands(), &mut seq);
        }
        seq
    }

    pub fn hold(&self) -> OpSequence {
        self.build(|cmd, seq| cmd.hold(seq))
    }

    pub fn release(&self) -> OpSequence {
        self.build(|cmd, seq| cmd.release(seq))
    }

    pub fn reset(&self) -> OpSequence {
        self.build(|cmd, seq| cmd.reset(seq))
    }

    pub fn enable(&self) -> OpSequence {
        self.build(|cmd, seq| cmd.enable(seq))
    }

    pub fn disable(&self) -> OpSequence {
        self.build(|cmd, seq| cmd.disable(seq))
    }

    /* Hold, reset, then switch off: the controller is ours and dark. */
    pub fn take_control(&self) -> OpSequence {
        self.build(|cmd, seq| {
            cmd.hold(seq);
            cmd.reset(seq);
            cmd.disable(seq);
        })
    }

    pub fn release_control(&self) -> OpSequence {
        self.build(|cmd, seq| {
            cmd.reset(seq);
            cmd.release(seq);
        })
    }

    /* The color a zone's registers receive for `target`. */
    pub fn scaled(&self, layout: &ZoneLayout, target: ColorTarget) -> ColorTarget {
        layout
            .scale
            .iter()
            .fold(target, |color, &ceiling| scale_color(color, ceiling))
    }

    pub fn zone(&self, zone: Zone) -> Option<&'static ZoneLayout> {
        self.lighting?.zones.iter().find(|z| z.zone == zone)
    }

    /* Write one zone: every sub-zone triple, then the latch. */
    pub fn zone_color(&self, layout: &ZoneLayout, target: ColorTarget) -> OpSequence {
        let rgb = self.scaled(layout, target).to_array();
        self.build(|cmd, seq| {
            for sub in layout.subzones {
                for (offset, &channel) in (0u8..).zip(sub.channels.iter()) {
                    cmd.set(seq, layout.group, sub.pos + offset, rgb[channel]);
                }
            }
            cmd.terminate(seq);
        })
    }

    /* The full cascade for one color: enable, then every zone. */
    pub fn apply_color(&self, target: ColorTarget) -> OpSequence {
        let mut seq = self.enable();
        if let Some(lighting) = &self.lighting {
            for layout in lighting.zones {
                seq.append(self.zone_color(layout, target));
            }
            debug!(
                "{}: {} ops for {:?}",
                self.model,
                seq.ops().len(),
                target
            );
        }
        seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_floor_never_darkens() {
        assert_eq!(scale_channel(1, 64), 1);
        assert_eq!(scale_channel(0, 64), 0);
        assert_eq!(scale_channel(255, 64), 64);
        assert_eq!(scale_channel(128, 64), 32);
        assert_eq!(scale_channel(255, 192), 192);
        assert_eq!(scale_channel(3, 32), 1);
    }

    #[test]
    fn test_scale_color_per_channel() {
        let c = scale_color(ColorTarget::new(1, 0, 255), 64);
        assert_eq!(c, ColorTarget::new(1, 0, 64));
    }

    #[test]
    fn test_chained_ceilings() {
        let profile = profile_for(DeviceModel::AirPlus);
        let left = profile.zone(Zone::LeftRing).unwrap();
        let right = profile.zone(Zone::RightRing).unwrap();

        /* 255 -> 192 -> 48 on the left, 192 -> 24 on the right */
        assert_eq!(
            profile.scaled(left, ColorTarget::new(255, 0, 1)),
            ColorTarget::new(48, 0, 1)
        );
        assert_eq!(
            profile.scaled(right, ColorTarget::new(255, 0, 1)),
            ColorTarget::new(24, 0, 1)
        );
    }

    #[test]
    fn test_unmapped_model_is_noop() {
        let profile = profile_for(DeviceModel::Next);
        assert!(!profile.is_mapped());
        assert!(profile.take_control().is_empty());
        assert!(profile.release_control().is_empty());
        assert!(profile.apply_color(ColorTarget::new(255, 255, 255)).is_empty());
        assert!(profile.zone(Zone::LeftRing).is_none());
    }

    #[test]
    fn test_kun_rotates_channels_per_subzone() {
        let profile = profile_for(DeviceModel::Kun);
        let left = profile.zone(Zone::LeftRing).unwrap();
        /* R=192, G=96 and B=48 after the base ceiling */
        let seq = profile.zone_color(left, ColorTarget::new(255, 128, 64));
        let brightness: Vec<u8> = seq
            .writes()
            .filter(|(addr, _)| *addr == RegisterAddress::Direct(legacy::REG_BRIGHTNESS))
            .map(|(_, v)| v)
            .collect();

        let (r, g, b) = (192, 96, 48);
        assert_eq!(
            brightness,
            vec![g, r, b, g, b, r, b, r, g, b, g, r, 0x00],
        );
    }

    #[test]
    fn test_kun_button_zone() {
        let profile = profile_for(DeviceModel::Kun);
        let button = profile.zone(Zone::Button).unwrap();
        assert_eq!(button.group, GROUP_BUTTON);
        assert_eq!(button.subzones, &[SubZone::remapped(12, [2, 0, 1])]);
    }

    #[test]
    fn test_charge_status_decoding() {
        let charge = profile_for(DeviceModel::AirPlus).charge.unwrap();
        assert_eq!(
            charge.behavior_from_status(charge.inhibit_value),
            Some(ChargeBehavior::InhibitCharge)
        );
        assert_eq!(
            charge.behavior_from_status(charge.auto_value),
            Some(ChargeBehavior::Auto)
        );
        assert_eq!(charge.behavior_from_status(0x42), None);
    }

    #[test]
    fn test_charge_sequence() {
        let charge = profile_for(DeviceModel::Kun).charge.unwrap();
        let seq = charge.sequence(ChargeBehavior::InhibitCharge);
        assert_eq!(
            seq.ops(),
            &[
                BusOp::Write {
                    addr: charge.control,
                    value: charge.inhibit_value
                },
                BusOp::Settle(charge.settle),
            ]
        );
    }

    #[test]
    fn test_firmware_version_order() {
        let v = |major, minor| FirmwareVersion { major, minor };
        assert!(v(1, 7) > v(1, 6));
        assert!(v(2, 0) > v(1, 9));
        assert_eq!(v(1, 7).to_string(), "1.7");
    }
}
