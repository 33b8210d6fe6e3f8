//! Memory-mapped hardware backend.
//!
//! Maps `aperture_size` bytes of the device node at offset `base_addr` and
//! performs volatile 32-bit accesses. For `/dev/mem` the offset is the
//! physical address of the array; for a UIO node the aperture starts at 0.

use std::any::Any;
use std::fs::OpenOptions;

use memmap2::{MmapMut, MmapOptions};

use super::{Backend, BackendKind, BackendOptions};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct LiveBackend {
    mmap: Option<MmapMut>,
    base_addr: u64,
}

impl LiveBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_mapped(&self) -> bool {
        self.mmap.is_some()
    }

    /// Byte offset of `addr` into the mapping, checked for range and alignment.
    fn offset(&self, addr: u64) -> Result<(&MmapMut, usize)> {
        let mmap = self
            .mmap
            .as_ref()
            .ok_or_else(|| Error::Backend("live backend used before init".into()))?;
        let off = addr
            .checked_sub(self.base_addr)
            .filter(|off| off + 4 <= mmap.len() as u64)
            .ok_or_else(|| Error::Backend(format!("address 0x{:016X} outside the mapped aperture", addr)))?;
        if off % 4 != 0 {
            return Err(Error::Backend(format!("unaligned register address 0x{:016X}", addr)));
        }
        Ok((mmap, off as usize))
    }
}

impl Backend for LiveBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Live
    }

    fn init(&mut self, opts: &BackendOptions) -> Result<()> {
        let path = opts
            .device_path
            .as_ref()
            .ok_or_else(|| Error::Backend("live backend needs a device path".into()))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::Backend(format!("failed to open {}: {}", path.display(), e)))?;

        // SAFETY: the mapping is device memory owned by this backend for its
        // lifetime; all accesses go through bounds-checked volatile reads and
        // writes.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(opts.base_addr)
                .len(opts.aperture_size)
                .map_mut(&file)
        }
        .map_err(|e| Error::Backend(format!("failed to map {}: {}", path.display(), e)))?;

        log::info!(
            "mapped {} bytes of {} at 0x{:X}",
            opts.aperture_size,
            path.display(),
            opts.base_addr
        );
        self.mmap = Some(mmap);
        self.base_addr = opts.base_addr;
        Ok(())
    }

    fn read32(&mut self, addr: u64) -> Result<u32> {
        let (mmap, off) = self.offset(addr)?;
        // SAFETY: `offset` checked that off..off+4 lies inside the mapping and
        // is 4-byte aligned.
        let value = unsafe { std::ptr::read_volatile(mmap.as_ptr().add(off) as *const u32) };
        log::trace!("live: R 0x{:016X} -> 0x{:08X}", addr, value);
        Ok(value)
    }

    fn write32(&mut self, addr: u64, value: u32) -> Result<()> {
        let (_, off) = self.offset(addr)?;
        let mmap = self
            .mmap
            .as_mut()
            .ok_or_else(|| Error::Backend("live backend used before init".into()))?;
        log::trace!("live: W 0x{:016X} = 0x{:08X}", addr, value);
        // SAFETY: as in `read32`.
        unsafe { std::ptr::write_volatile(mmap.as_mut_ptr().add(off) as *mut u32, value) };
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceConfig, DeviceGeneration};
    use std::io::Write;

    fn opts_for(file: &tempfile::NamedTempFile, size: usize) -> BackendOptions {
        let mut opts = BackendOptions::for_config(&DeviceConfig::new(DeviceGeneration::Aie2Ipu, 0, 1))
            .with_device_path(file.path());
        opts.base_addr = 0;
        opts.aperture_size = size;
        opts
    }

    #[test]
    fn test_init_requires_device_path() {
        let mut backend = LiveBackend::new();
        let opts = BackendOptions::for_config(&DeviceConfig::new(DeviceGeneration::Aie2Ipu, 0, 1));
        assert!(matches!(backend.init(&opts), Err(Error::Backend(_))));
        assert!(backend.read32(0).is_err());
    }

    #[test]
    fn test_file_backed_aperture() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 4096]).unwrap();
        let mut backend = LiveBackend::new();
        backend.init(&opts_for(&file, 4096)).unwrap();
        assert!(backend.is_mapped());

        backend.write32(0x40, 0xA5A5_0001).unwrap();
        backend.mask_write32(0x40, 0xFF, 0x02).unwrap();
        assert_eq!(backend.read32(0x40).unwrap(), 0xA5A5_0002);

        assert!(backend.read32(4096).is_err());
        assert!(backend.read32(0x42).is_err());
    }
}
