/* Legacy lighting: LED registers owned by the EC itself, reached with direct
 * register writes. A single `set` takes four field writes, a mode pulse and
 * a settle delay. */

use std::time::Duration;

use crate::bus::RegisterAddress;

use super::{CommandSet, OpSequence};

/* EC registers. */
pub const REG_PWM_CONTROL: u8 = 0x6d;
pub const REG_POSITION: u8 = 0xb1;
pub const REG_BRIGHTNESS: u8 = 0xb2;
pub const REG_MODE: u8 = 0xbf;

/* REG_MODE values. */
pub const MODE_RELEASE: u8 = 0x00;
pub const MODE_WRITE: u8 = 0x10;
pub const MODE_HOLD: u8 = 0xfe;

pub const WRITE_DELAY: Duration = Duration::from_millis(2);

pub struct Legacy;

fn reg(register: u8) -> RegisterAddress {
    RegisterAddress::Direct(register)
}

impl CommandSet for Legacy {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn set(&self, seq: &mut OpSequence, group: u8, pos: u8, value: u8) {
        seq.write(reg(REG_PWM_CONTROL), group)
            .write(reg(REG_POSITION), pos)
            .write(reg(REG_BRIGHTNESS), value)
            .write(reg(REG_MODE), MODE_WRITE)
            .settle(WRITE_DELAY)
            .write(reg(REG_MODE), MODE_HOLD);
    }

    fn hold(&self, seq: &mut OpSequence) {
        seq.write(reg(REG_MODE), MODE_HOLD);
    }

    fn release(&self, seq: &mut OpSequence) {
        seq.write(reg(REG_MODE), MODE_RELEASE);
    }
}
