pub mod port;

#[cfg(any(test, feature = "dev-hooks"))]
pub mod emulated;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::error::BusError;

/* I/O ports of the embedded controller's RAM window. */
pub const ADDR_PORT: u16 = 0x4e;
pub const DATA_PORT: u16 = 0x4f;

/* High byte of every EC RAM address reached through the window. */
pub const RAM_HIGH_BYTE: u8 = 0xd1;

/* Values written to ADDR_PORT: select a window register, then access it. */
pub const WINDOW_SELECT: u8 = 0x2e;
pub const WINDOW_ACCESS: u8 = 0x2f;

/* Window registers. */
pub const WINDOW_REG_INDEX: u8 = 0x10;
pub const WINDOW_REG_HIGH: u8 = 0x11;
pub const WINDOW_REG_DATA: u8 = 0x12;

/* Value written to a commit address to latch the preceding write. */
pub const COMMIT_VALUE: u8 = 0x01;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/* Which wire protocol reaches a register. */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Direct,
    Indexed,
}

/* An 8-bit register address tagged with its transport. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterAddress {
    /* EC register, one transaction per access. */
    Direct(u8),
    /* EC RAM byte behind the port window. When `commit` is set, a write is
     * followed by `COMMIT_VALUE` written to that address. */
    Indexed { index: u8, commit: Option<u8> },
}

impl RegisterAddress {
    pub const fn indexed(index: u8) -> Self {
        Self::Indexed { index, commit: None }
    }

    pub const fn committed(index: u8, commit: u8) -> Self {
        Self::Indexed {
            index,
            commit: Some(commit),
        }
    }

    pub fn transport(&self) -> Transport {
        match self {
            Self::Direct(_) => Transport::Direct,
            Self::Indexed { .. } => Transport::Indexed,
        }
    }
}

/* Raw byte access to the hardware. Implementations perform exactly one
 * access per call and never lock; serialization is done by `HardwareBus`. */
pub trait PortIo: Send + Sync {
    fn outb(&self, port: u16, value: u8) -> io::Result<()>;
    fn inb(&self, port: u16) -> io::Result<u8>;
    fn ec_write(&self, register: u8, value: u8) -> io::Result<()>;
    fn ec_read(&self, register: u8) -> io::Result<u8>;
}

/* The universal register interface. Profiles and writers only talk to this. */
#[async_trait]
pub trait RegisterBus: Send + Sync {
    async fn write(&self, addr: RegisterAddress, value: u8) -> Result<(), BusError>;
    async fn read(&self, addr: RegisterAddress) -> Result<u8, BusError>;
}

/* Lock-arbitrated register access over a `PortIo` backend.
 *
 * Every access, including the whole multi-step window sequence of an indexed
 * access, runs while holding `arbiter`. Acquisition is bounded by
 * `lock_timeout`; a timeout abandons the access with `BusError::Busy`. */
pub struct HardwareBus {
    io: Arc<dyn PortIo>,
    arbiter: Mutex<()>,
    lock_timeout: Duration,
}

impl HardwareBus {
    pub fn new(io: Arc<dyn PortIo>, lock_timeout: Duration) -> Self {
        Self {
            io,
            arbiter: Mutex::new(()),
            lock_timeout,
        }
    }

    async fn acquire(&self) -> Result<MutexGuard<'_, ()>, BusError> {
        tokio::time::timeout(self.lock_timeout, self.arbiter.lock())
            .await
            .map_err(|_| BusError::Busy(self.lock_timeout))
    }

    /* Point the window at `RAM_HIGH_BYTE:index` and leave the data register
     * selected for access. The caller must hold the arbiter. */
    fn open_window(&self, index: u8) -> io::Result<()> {
        let io = &self.io;
        io.outb(ADDR_PORT, WINDOW_SELECT)?;
        io.outb(DATA_PORT, WINDOW_REG_HIGH)?;
        io.outb(ADDR_PORT, WINDOW_ACCESS)?;
        io.outb(DATA_PORT, RAM_HIGH_BYTE)?;
        io.outb(ADDR_PORT, WINDOW_SELECT)?;
        io.outb(DATA_PORT, WINDOW_REG_INDEX)?;
        io.outb(ADDR_PORT, WINDOW_ACCESS)?;
        io.outb(DATA_PORT, index)?;
        io.outb(ADDR_PORT, WINDOW_SELECT)?;
        io.outb(DATA_PORT, WINDOW_REG_DATA)?;
        io.outb(ADDR_PORT, WINDOW_ACCESS)
    }

    fn write_ram(&self, index: u8, value: u8) -> io::Result<()> {
        self.open_window(index)?;
        self.io.outb(DATA_PORT, value)
    }

    fn read_ram(&self, index: u8) -> io::Result<u8> {
        self.open_window(index)?;
        self.io.inb(DATA_PORT)
    }
}

#[async_trait]
impl RegisterBus for HardwareBus {
    async fn write(&self, addr: RegisterAddress, value: u8) -> Result<(), BusError> {
        let _guard = self.acquire().await?;
        match addr {
            RegisterAddress::Direct(register) => {
                self.io.ec_write(register, value)?;
            }
            RegisterAddress::Indexed { index, commit } => {
                self.write_ram(index, value)?;
                if let Some(commit) = commit {
                    self.write_ram(commit, COMMIT_VALUE)?;
                }
            }
        }
        trace!("W {:?} <- {:#04x}", addr, value);
        Ok(())
    }

    async fn read(&self, addr: RegisterAddress) -> Result<u8, BusError> {
        let _guard = self.acquire().await?;
        let value = match addr {
            RegisterAddress::Direct(register) => self.io.ec_read(register)?,
            RegisterAddress::Indexed { index, .. } => self.read_ram(index)?,
        };
        debug!("R {:?} -> {:#04x}", addr, value);
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::emulated::{EmulatedEc, PortAccess, RegisterWrite};
    use super::*;

    fn bus_with(ec: &Arc<EmulatedEc>, timeout: Duration) -> HardwareBus {
        HardwareBus::new(Arc::clone(ec) as Arc<dyn PortIo>, timeout)
    }

    #[tokio::test]
    async fn indexed_write_follows_window_sequence() {
        let ec = Arc::new(EmulatedEc::new());
        let bus = bus_with(&ec, DEFAULT_LOCK_TIMEOUT);

        bus.write(RegisterAddress::indexed(0xb3), 0x42).await.unwrap();

        let expected: Vec<PortAccess> = [
            (ADDR_PORT, 0x2e),
            (DATA_PORT, 0x11),
            (ADDR_PORT, 0x2f),
            (DATA_PORT, 0xd1),
            (ADDR_PORT, 0x2e),
            (DATA_PORT, 0x10),
            (ADDR_PORT, 0x2f),
            (DATA_PORT, 0xb3),
            (ADDR_PORT, 0x2e),
            (DATA_PORT, 0x12),
            (ADDR_PORT, 0x2f),
            (DATA_PORT, 0x42),
        ]
        .into_iter()
        .map(|(port, value)| PortAccess::Out { port, value })
        .collect();
        assert_eq!(ec.port_log(), expected);
        assert_eq!(ec.ram(0xb3), 0x42);
    }

    #[tokio::test]
    async fn committed_write_latches_commit_address() {
        let ec = Arc::new(EmulatedEc::new());
        let bus = bus_with(&ec, DEFAULT_LOCK_TIMEOUT);

        bus.write(RegisterAddress::committed(0x73, 0x86), 0x10)
            .await
            .unwrap();

        assert_eq!(
            ec.writes(),
            vec![
                RegisterWrite::Ram { index: 0x73, value: 0x10 },
                RegisterWrite::Ram { index: 0x86, value: COMMIT_VALUE },
            ]
        );
        assert_eq!(ec.port_log().len(), 24);
    }

    #[tokio::test]
    async fn indexed_read_ends_with_data_port_input() {
        let ec = Arc::new(EmulatedEc::new());
        ec.set_ram(0x01, 0x07);
        let bus = bus_with(&ec, DEFAULT_LOCK_TIMEOUT);

        let value = bus.read(RegisterAddress::indexed(0x01)).await.unwrap();

        assert_eq!(value, 0x07);
        let log = ec.port_log();
        assert_eq!(log.len(), 12);
        assert_eq!(log[10], PortAccess::Out { port: ADDR_PORT, value: 0x2f });
        assert_eq!(log[11], PortAccess::In { port: DATA_PORT, value: 0x07 });
    }

    #[tokio::test]
    async fn direct_access_is_a_single_transaction() {
        let ec = Arc::new(EmulatedEc::new());
        let bus = bus_with(&ec, DEFAULT_LOCK_TIMEOUT);

        bus.write(RegisterAddress::Direct(0xbf), 0xfe).await.unwrap();
        let value = bus.read(RegisterAddress::Direct(0xbf)).await.unwrap();

        assert_eq!(value, 0xfe);
        assert!(ec.port_log().is_empty());
        assert_eq!(
            ec.writes(),
            vec![RegisterWrite::Ec { register: 0xbf, value: 0xfe }]
        );
    }

    #[tokio::test]
    async fn lock_timeout_abandons_access() {
        let ec = Arc::new(EmulatedEc::new());
        let bus = bus_with(&ec, Duration::from_millis(20));

        let held = bus.arbiter.lock().await;
        let err = bus
            .write(RegisterAddress::Direct(0x6d), 0x01)
            .await
            .unwrap_err();
        drop(held);

        assert!(matches!(err, BusError::Busy(_)));
        assert!(ec.writes().is_empty());
    }

    #[tokio::test]
    async fn backend_failure_is_reported_as_io() {
        let ec = Arc::new(EmulatedEc::new());
        ec.fail_next(1);
        let bus = bus_with(&ec, DEFAULT_LOCK_TIMEOUT);

        let err = bus
            .write(RegisterAddress::indexed(0x10), 0x00)
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Io(_)));

        /* the arbiter is released after a failure */
        bus.write(RegisterAddress::indexed(0x10), 0x00).await.unwrap();
    }

    #[test]
    fn transport_tag() {
        assert_eq!(RegisterAddress::Direct(0).transport(), Transport::Direct);
        assert_eq!(
            RegisterAddress::committed(0xb0, 0xc6).transport(),
            Transport::Indexed
        );
    }
}
