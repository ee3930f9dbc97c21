/* Emulated embedded controller: decodes the RAM window protocol, keeps EC
 * registers and RAM in memory, and records every access so tests (and
 * dev-hooks builds of the daemon) can run without hardware. */

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;

use serde::Deserialize;

use super::{
    ADDR_PORT, DATA_PORT, PortIo, RAM_HIGH_BYTE, WINDOW_ACCESS, WINDOW_REG_DATA,
    WINDOW_REG_HIGH, WINDOW_REG_INDEX, WINDOW_SELECT,
};

/* One raw port access. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortAccess {
    Out { port: u16, value: u8 },
    In { port: u16, value: u8 },
}

/* One logical register write as seen by the controller. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWrite {
    Ec { register: u8, value: u8 },
    Ram { index: u8, value: u8 },
}

/* What the next DATA_PORT access means. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Latch {
    Idle,
    Select,
    Access,
}

struct EcState {
    ec: [u8; 256],
    ram: HashMap<u16, u8>,
    latch: Latch,
    selected: u8,
    high: u8,
    low: u8,
    ports: Vec<PortAccess>,
    writes: Vec<RegisterWrite>,
    failures: usize,
}

impl EcState {
    fn take_failure(&mut self) -> io::Result<()> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(io::Error::other("injected controller failure"));
        }
        Ok(())
    }

    fn address(&self) -> u16 {
        (u16::from(self.high) << 8) | u16::from(self.low)
    }
}

pub struct EmulatedEc {
    state: Mutex<EcState>,
}

impl Default for EmulatedEc {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatedEc {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(EcState {
                ec: [0; 256],
                ram: HashMap::new(),
                latch: Latch::Idle,
                selected: 0,
                high: 0,
                low: 0,
                ports: Vec::new(),
                writes: Vec::new(),
                failures: 0,
            }),
        }
    }

    /* Build a controller preloaded from a JSON spec. */
    pub fn from_spec(spec: &EmulatedEcSpec) -> Self {
        let ec = Self::new();
        for &(register, value) in &spec.ec {
            ec.set_ec(register, value);
        }
        for &(index, value) in &spec.ram {
            ec.set_ram(index, value);
        }
        ec
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EcState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_ec(&self, register: u8, value: u8) {
        self.lock().ec[usize::from(register)] = value;
    }

    pub fn ec(&self, register: u8) -> u8 {
        self.lock().ec[usize::from(register)]
    }

    pub fn set_ram(&self, index: u8, value: u8) {
        let address = (u16::from(RAM_HIGH_BYTE) << 8) | u16::from(index);
        self.lock().ram.insert(address, value);
    }

    pub fn ram(&self, index: u8) -> u8 {
        let address = (u16::from(RAM_HIGH_BYTE) << 8) | u16::from(index);
        self.lock().ram.get(&address).copied().unwrap_or(0)
    }

    /* Make the next `count` backend calls fail. */
    pub fn fail_next(&self, count: usize) {
        self.lock().failures = count;
    }

    pub fn port_log(&self) -> Vec<PortAccess> {
        self.lock().ports.clone()
    }

    pub fn writes(&self) -> Vec<RegisterWrite> {
        self.lock().writes.clone()
    }

    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.ports.clear();
        state.writes.clear();
    }
}

impl PortIo for EmulatedEc {
    fn outb(&self, port: u16, value: u8) -> io::Result<()> {
        let mut state = self.lock();
        state.take_failure()?;
        state.ports.push(PortAccess::Out { port, value });

        match port {
            ADDR_PORT => {
                state.latch = match value {
                    WINDOW_SELECT => Latch::Select,
                    WINDOW_ACCESS => Latch::Access,
                    _ => Latch::Idle,
                };
            }
            DATA_PORT => match state.latch {
                Latch::Select => state.selected = value,
                Latch::Access => match state.selected {
                    WINDOW_REG_HIGH => state.high = value,
                    WINDOW_REG_INDEX => state.low = value,
                    WINDOW_REG_DATA => {
                        let address = state.address();
                        state.ram.insert(address, value);
                        let index = state.low;
                        state.writes.push(RegisterWrite::Ram { index, value });
                    }
                    _ => {}
                },
                Latch::Idle => {}
            },
            _ => {}
        }
        Ok(())
    }

    fn inb(&self, port: u16) -> io::Result<u8> {
        let mut state = self.lock();
        state.take_failure()?;

        let value = if port == DATA_PORT
            && state.latch == Latch::Access
            && state.selected == WINDOW_REG_DATA
        {
            let address = state.address();
            state.ram.get(&address).copied().unwrap_or(0)
        } else {
            0xff
        };
        state.ports.push(PortAccess::In { port, value });
        Ok(value)
    }

    fn ec_write(&self, register: u8, value: u8) -> io::Result<()> {
        let mut state = self.lock();
        state.take_failure()?;
        state.ec[usize::from(register)] = value;
        state.writes.push(RegisterWrite::Ec { register, value });
        Ok(())
    }

    fn ec_read(&self, register: u8) -> io::Result<u8> {
        let mut state = self.lock();
        state.take_failure()?;
        Ok(state.ec[usize::from(register)])
    }
}

/* JSON description of the initial controller contents, e.g.
 * `{"ec": [[0, 1], [1, 9]], "ram": [[0, 1], [1, 9]]}`. */
#[derive(Debug, Default, Deserialize)]
pub struct EmulatedEcSpec {
    #[serde(default)]
    pub ec: Vec<(u8, u8)>,
    #[serde(default)]
    pub ram: Vec<(u8, u8)>,
}

impl EmulatedEcSpec {
    /* An empty or blank string yields an all-zero controller. */
    pub fn parse_json(json: &str) -> Result<Self, serde_json::Error> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_preloads_registers() {
        let spec = EmulatedEcSpec::parse_json(r#"{"ec": [[0, 2]], "ram": [[1, 9]]}"#).unwrap();
        let ec = EmulatedEc::from_spec(&spec);
        assert_eq!(ec.ec(0x00), 2);
        assert_eq!(ec.ram(0x01), 9);
    }

    #[test]
    fn blank_spec_is_default() {
        let spec = EmulatedEcSpec::parse_json("  ").unwrap();
        assert!(spec.ec.is_empty());
        assert!(spec.ram.is_empty());
    }

    #[test]
    fn data_port_outside_window_is_ignored() {
        let ec = EmulatedEc::new();
        ec.outb(DATA_PORT, 0x55).unwrap();
        assert!(ec.writes().is_empty());
        assert_eq!(ec.inb(DATA_PORT).unwrap(), 0xff);
    }

    #[test]
    fn injected_failures_are_consumed() {
        let ec = EmulatedEc::new();
        ec.fail_next(2);
        assert!(ec.ec_write(0x10, 1).is_err());
        assert!(ec.ec_read(0x10).is_err());
        assert!(ec.ec_write(0x10, 1).is_ok());
        assert_eq!(ec.ec(0x10), 1);
    }
}
