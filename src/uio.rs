//! UIO device access.
//!
//! The data inspector IP core and the AXI DMA core are exposed to userspace
//! as UIO devices. This module finds them by name and maps their register
//! space.

use anyhow::{Context, Result};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use tokio::fs;

/// UIO device.
#[derive(Debug)]
pub struct Uio {
    num: usize,
    name: String,
    file: fs::File,
}

/// UIO device mapping.
///
/// Memory-mapped register space of an UIO device. Dropping this struct unmaps
/// the region.
#[derive(Debug)]
pub struct Mapping {
    base: *mut libc::c_void,
    effective: *mut libc::c_void,
    map_size: usize,
}

impl Uio {
    /// Opens an UIO using its name.
    ///
    /// This function searches in `/sys/class/uio` for the device whose name
    /// matches `name` and opens `/dev/uio<num>`.
    pub async fn from_name(name: &str) -> Result<Uio> {
        let num = Self::find_by_name(name)
            .await?
            .ok_or_else(|| anyhow::anyhow!("UIO device {name} not found"))?;
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(format!("/dev/uio{num}"))
            .await
            .with_context(|| format!("failed to open /dev/uio{num}"))?;
        Ok(Uio {
            num,
            name: name.to_string(),
            file,
        })
    }

    async fn find_by_name(name: &str) -> Result<Option<usize>> {
        let mut entries = fs::read_dir(Path::new("/sys/class/uio")).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(num) = file_name
                .to_str()
                .and_then(|uio| uio.strip_prefix("uio"))
                .and_then(|n| n.parse::<usize>().ok())
            else {
                continue;
            };
            let this_name = fs::read_to_string(entry.path().join("name")).await?;
            if this_name.trim_end() == name {
                return Ok(Some(num));
            }
        }
        Ok(None)
    }

    /// Returns the name of the device.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maps the register space of the device.
    ///
    /// `mapping` is the index listed in `/sys/class/uio/uio*/maps/map<mapping>`.
    /// Devices with a single register space use `0`.
    pub async fn map_mapping(&self, mapping: usize) -> Result<Mapping> {
        let offset = mapping * page_size::get();
        let map_size = self.map_size(mapping).await?;
        let base = unsafe {
            match libc::mmap(
                std::ptr::null_mut::<libc::c_void>(),
                map_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.file.as_raw_fd(),
                offset as libc::off_t,
            ) {
                libc::MAP_FAILED => anyhow::bail!("mmap of UIO {} failed", self.name),
                x => x,
            }
        };
        let effective_offset = isize::try_from(self.map_offset(mapping).await?)?;
        let effective = unsafe { base.offset(effective_offset) };
        Ok(Mapping {
            base,
            effective,
            map_size,
        })
    }

    async fn read_mapping_hex(&self, mapping: usize, fname: &str) -> Result<usize> {
        let path = format!("/sys/class/uio/uio{}/maps/map{mapping}/{fname}", self.num);
        let value = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {path}"))?;
        parse_hex(&value)
    }

    /// Gives the size of a UIO mapping.
    pub async fn map_size(&self, mapping: usize) -> Result<usize> {
        self.read_mapping_hex(mapping, "size").await
    }

    /// Gives the offset of the registers within the first page of a mapping.
    pub async fn map_offset(&self, mapping: usize) -> Result<usize> {
        self.read_mapping_hex(mapping, "offset").await
    }

    /// Gives the physical address of a UIO mapping.
    pub async fn map_addr(&self, mapping: usize) -> Result<usize> {
        self.read_mapping_hex(mapping, "addr").await
    }
}

/// Parses a sysfs hexadecimal value such as `0xa0000000\n`.
pub(crate) fn parse_hex(value: &str) -> Result<usize> {
    Ok(usize::from_str_radix(
        value
            .trim_end()
            .strip_prefix("0x")
            .ok_or_else(|| anyhow::anyhow!("prefix 0x not present"))?,
        16,
    )?)
}

impl Mapping {
    /// Gives the virtual address of the registers.
    pub fn addr(&self) -> *mut libc::c_void {
        self.effective
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base, self.map_size);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sysfs_hex() {
        assert_eq!(parse_hex("0xa0010000\n").unwrap(), 0xa001_0000);
        assert_eq!(parse_hex("0x1000").unwrap(), 0x1000);
        assert!(parse_hex("4096").is_err());
    }
}
