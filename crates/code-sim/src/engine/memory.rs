//! Flat simulated address space made of non-overlapping byte regions.
//!
//! ```text
//! Simulated Address Space:
//!   0x0                    End-of-simulation address (never mapped)
//!   code regions           Mapped by the runtime via `Memory::map`
//!   STACK_BASE             Stack region base (stack grows downward)
//!   STACK_BASE + size      Initial stack pointer
//! ```

use crate::{Error, Result};

#[derive(Debug)]
struct Region {
    base: u64,
    bytes: Vec<u8>,
}

impl Region {
    fn end(&self) -> u64 {
        self.base + self.bytes.len() as u64
    }

    fn contains(&self, address: u64, size: usize) -> bool {
        address >= self.base
            && address
                .checked_add(size as u64)
                .is_some_and(|end| end <= self.end())
    }
}

#[derive(Debug, Default)]
pub struct Memory {
    regions: Vec<Region>,
}

impl Memory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Memory with a single region, used for the stack at construction.
    #[must_use]
    pub fn with_region(base: u64, bytes: Vec<u8>) -> Self {
        Self {
            regions: vec![Region { base, bytes }],
        }
    }

    /// Map `bytes` at `base`. Fails if the range wraps the address space or
    /// overlaps an existing region.
    pub fn map(&mut self, base: u64, bytes: Vec<u8>) -> Result<()> {
        let len = bytes.len();
        let end = base
            .checked_add(len as u64)
            .ok_or(Error::AddressOverflow { base, len })?;
        if self
            .regions
            .iter()
            .any(|region| base < region.end() && region.base < end)
        {
            return Err(Error::RegionOverlap { base, len });
        }
        self.regions.push(Region { base, bytes });
        Ok(())
    }

    /// Map 32-bit instruction words little-endian at `base`.
    pub fn map_words(&mut self, base: u64, words: &[u32]) -> Result<()> {
        let bytes = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        self.map(base, bytes)
    }

    pub fn read_bytes(&self, address: u64, out: &mut [u8]) -> Result<()> {
        let region = self.region(address, out.len())?;
        let start = (address - region.base) as usize;
        out.copy_from_slice(&region.bytes[start..start + out.len()]);
        Ok(())
    }

    pub fn write_bytes(&mut self, address: u64, data: &[u8]) -> Result<()> {
        let region = self.region_mut(address, data.len())?;
        let start = (address - region.base) as usize;
        region.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    pub fn read_u32(&self, address: u64) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_bytes(address, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn write_u32(&mut self, address: u64, value: u32) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    pub fn read_u64(&self, address: u64) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_bytes(address, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_u64(&mut self, address: u64, value: u64) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn region(&self, address: u64, size: usize) -> Result<&Region> {
        self.regions
            .iter()
            .find(|region| region.contains(address, size))
            .ok_or(Error::MemoryFault { address, size })
    }

    fn region_mut(&mut self, address: u64, size: usize) -> Result<&mut Region> {
        self.regions
            .iter_mut()
            .find(|region| region.contains(address, size))
            .ok_or(Error::MemoryFault { address, size })
    }
}
