/* Modern lighting: a dedicated LED controller mapped into EC RAM. Each side
 * has its own register bank and commit address; a `set` is one committed
 * indexed write followed by a 1 ms settle. */

use std::time::Duration;

use crate::bus::RegisterAddress;

use super::{
    CMD_ENABLE_ADDR, CMD_ENABLE_ON, CommandSet, GROUP_LEFT, GROUP_RIGHT, OpSequence,
};

/* Register banks and their commit addresses. */
pub const BANK_LEFT: u8 = 0xb0;
pub const BANK_RIGHT: u8 = 0x70;
pub const COMMIT_LEFT: u8 = 0xc6;
pub const COMMIT_RIGHT: u8 = 0x86;

/* Controller ownership register. */
pub const MODE_ADDR: u8 = 0x87;
pub const MODE_HOLD: u8 = 0xa5;
pub const MODE_RELEASE: u8 = 0x00;

pub const CMD_PATTERN_ADDR: u8 = 0x0f;
pub const CMD_PATTERN_OFF: u8 = 0x00;
pub const CMD_FADE_ADDR: u8 = 0x10;
pub const CMD_FADE_OFF: u8 = 0x00;
pub const CMD_WATCHDOG_ADDR: u8 = 0x15;
pub const CMD_WATCHDOG_ON: u8 = 0x07;

/* Per-sector mode registers; SECTOR_RGB selects plain RGB output. */
pub const SECTOR_MODE_ADDRS: [u8; 4] = [0x11, 0x12, 0x13, 0x14];
pub const SECTOR_RGB: u8 = 0x05;

pub const WRITE_DELAY: Duration = Duration::from_millis(1);

pub struct Modern;

/* Groups below GROUP_RIGHT live in the left bank; the rest, including the
 * combined latch group, in the right bank. */
fn bank(group: u8) -> (u8, u8) {
    if group < GROUP_RIGHT {
        (BANK_LEFT, COMMIT_LEFT)
    } else {
        (BANK_RIGHT, COMMIT_RIGHT)
    }
}

impl CommandSet for Modern {
    fn name(&self) -> &'static str {
        "modern"
    }

    fn set(&self, seq: &mut OpSequence, group: u8, pos: u8, value: u8) {
        let (base, commit) = bank(group);
        seq.write(RegisterAddress::committed(base.wrapping_add(pos), commit), value)
            .settle(WRITE_DELAY);
    }

    fn hold(&self, seq: &mut OpSequence) {
        seq.write(RegisterAddress::indexed(MODE_ADDR), MODE_HOLD);
        self.terminate(seq);
    }

    fn release(&self, seq: &mut OpSequence) {
        seq.write(RegisterAddress::indexed(MODE_ADDR), MODE_RELEASE);
    }

    fn enable(&self, seq: &mut OpSequence) {
        for (addr, value) in [
            (CMD_ENABLE_ADDR, CMD_ENABLE_ON),
            (CMD_PATTERN_ADDR, CMD_PATTERN_OFF),
            (CMD_FADE_ADDR, CMD_FADE_OFF),
        ] {
            self.set(seq, GROUP_LEFT, addr, value);
            self.set(seq, GROUP_RIGHT, addr, value);
        }

        for sector in SECTOR_MODE_ADDRS {
            self.set(seq, GROUP_LEFT, sector, SECTOR_RGB);
            self.set(seq, GROUP_RIGHT, sector, SECTOR_RGB);
        }

        self.set(seq, GROUP_LEFT, CMD_WATCHDOG_ADDR, CMD_WATCHDOG_ON);
        self.set(seq, GROUP_RIGHT, CMD_WATCHDOG_ADDR, CMD_WATCHDOG_ON);
        self.terminate(seq);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{BusOp, GROUP_LEFT_RIGHT};

    #[test]
    fn test_banks_by_group() {
        let mut seq = OpSequence::new();
        Modern.set(&mut seq, GROUP_LEFT, 0x03, 0x11);
        Modern.set(&mut seq, GROUP_RIGHT, 0x03, 0x22);
        Modern.set(&mut seq, GROUP_LEFT_RIGHT, 0x00, 0x00);

        assert_eq!(
            seq.ops(),
            &[
                BusOp::Write { addr: RegisterAddress::committed(0xb3, 0xc6), value: 0x11 },
                BusOp::Settle(WRITE_DELAY),
                BusOp::Write { addr: RegisterAddress::committed(0x73, 0x86), value: 0x22 },
                BusOp::Settle(WRITE_DELAY),
                BusOp::Write { addr: RegisterAddress::committed(0x70, 0x86), value: 0x00 },
                BusOp::Settle(WRITE_DELAY),
            ]
        );
    }

    #[test]
    fn test_hold_latches_after_mode_write() {
        let mut seq = OpSequence::new();
        Modern.hold(&mut seq);
        assert_eq!(
            seq.writes().collect::<Vec<_>>(),
            vec![
                (RegisterAddress::indexed(0x87), 0xa5),
                (RegisterAddress::committed(0x70, 0x86), 0x00),
            ]
        );
    }

    #[test]
    fn test_enable_sequence_length() {
        let mut seq = OpSequence::new();
        Modern.enable(&mut seq);
        /* 3 commands + 4 sectors + watchdog, per side, plus the latch */
        assert_eq!(seq.writes().count(), 8 * 2 + 1);
        assert_eq!(
            seq.writes().last(),
            Some((RegisterAddress::committed(0x70, 0x86), 0x00))
        );
    }
}
