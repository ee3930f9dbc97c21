/* Real hardware backend: raw port I/O through `/dev/port` and EC register
 * access through the `ec_sys` debugfs file (load with `write_support=1`). */

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use nix::libc::off_t;
use nix::sys::uio::{pread, pwrite};
use tracing::debug;

use super::PortIo;

pub const DEV_PORT: &str = "/dev/port";
pub const EC_IO: &str = "/sys/kernel/debug/ec/ec0/io";

pub struct DevPortIo {
    port: File,
    ec: File,
    ec_path: PathBuf,
}

impl DevPortIo {
    pub fn open() -> Result<Self> {
        Self::open_paths(Path::new(DEV_PORT), Path::new(EC_IO))
    }

    pub fn open_paths(port_path: &Path, ec_path: &Path) -> Result<Self> {
        let port = open_rw(port_path)
            .with_context(|| format!("Failed to open {}", port_path.display()))?;
        let ec = open_rw(ec_path).with_context(|| {
            format!(
                "Failed to open {} (is ec_sys loaded with write_support=1?)",
                ec_path.display()
            )
        })?;
        debug!(
            "Opened {} and {}",
            port_path.display(),
            ec_path.display()
        );

        Ok(Self {
            port,
            ec,
            ec_path: ec_path.to_path_buf(),
        })
    }
}

fn open_rw(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

fn write_byte(file: &File, offset: off_t, value: u8) -> io::Result<()> {
    match pwrite(file, &[value], offset)? {
        1 => Ok(()),
        _ => Err(io::Error::new(io::ErrorKind::WriteZero, "short write")),
    }
}

fn read_byte(file: &File, offset: off_t) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    match pread(file, &mut buf, offset)? {
        1 => Ok(buf[0]),
        _ => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read")),
    }
}

impl PortIo for DevPortIo {
    fn outb(&self, port: u16, value: u8) -> io::Result<()> {
        write_byte(&self.port, off_t::from(port), value)
    }

    fn inb(&self, port: u16) -> io::Result<u8> {
        read_byte(&self.port, off_t::from(port))
    }

    fn ec_write(&self, register: u8, value: u8) -> io::Result<()> {
        write_byte(&self.ec, off_t::from(register), value).map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {e}", self.ec_path.display()))
        })
    }

    fn ec_read(&self, register: u8) -> io::Result<u8> {
        read_byte(&self.ec, off_t::from(register))
    }
}
