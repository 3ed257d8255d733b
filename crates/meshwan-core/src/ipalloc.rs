// ── Overlay address allocation ──
//
// Each IP range tracks its allocations twice: a 256-bit bitmap indexed by
// `suffix - 1` (MSB first inside each byte) and a suffix -> owner map.
// Both are updated together or not at all.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::model::IpRange;

const BITMAP_BYTES: usize = 32;

/// Allocation bitmap for last-octet suffixes 1..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bitmap([u8; BITMAP_BYTES]);

impl Default for Bitmap {
    fn default() -> Self {
        Self([0; BITMAP_BYTES])
    }
}

impl Bitmap {
    fn slot(suffix: u8) -> (usize, u8) {
        let i = usize::from(suffix.saturating_sub(1));
        (i / 8, 0x80 >> (i % 8))
    }

    pub fn test(&self, suffix: u8) -> bool {
        let (byte, mask) = Self::slot(suffix);
        self.0.get(byte).is_some_and(|b| b & mask != 0)
    }

    pub fn set(&mut self, suffix: u8) {
        let (byte, mask) = Self::slot(suffix);
        if let Some(b) = self.0.get_mut(byte) {
            *b |= mask;
        }
    }

    pub fn clear(&mut self, suffix: u8) {
        let (byte, mask) = Self::slot(suffix);
        if let Some(b) = self.0.get_mut(byte) {
            *b &= !mask;
        }
    }

    /// Whether every suffix sharing `suffix`'s byte is taken.
    fn byte_full(&self, suffix: u8) -> bool {
        let (byte, _) = Self::slot(suffix);
        self.0.get(byte).is_some_and(|b| *b == 0xFF)
    }

    /// Set suffixes in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=u8::MAX).filter(|s| self.test(*s))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }
}

impl IpRange {
    /// Take the lowest free suffix in `[minIp, maxIp]` for `owner`.
    ///
    /// `overlay` only labels the error.
    pub fn allocate(&mut self, overlay: &str, owner: &str) -> Result<Ipv4Addr> {
        let [a, b, c] = self.spec.base()?;
        let (min, max) = (u16::from(self.spec.min_ip), u16::from(self.spec.max_ip));

        let mut i = min.max(1);
        while i <= max {
            let suffix = u8::try_from(i).map_err(|_| CoreError::Internal("suffix overflow".into()))?;
            // Jump over a fully allocated byte when standing on its first bit.
            if (i - 1) % 8 == 0 && self.status.masks.byte_full(suffix) {
                i += 8;
                continue;
            }
            if !self.status.masks.test(suffix) {
                self.status.masks.set(suffix);
                self.status.data.insert(suffix, owner.to_owned());
                return Ok(Ipv4Addr::new(a, b, c, suffix));
            }
            i += 1;
        }

        Err(CoreError::NoAvailableIp {
            overlay: overlay.to_owned(),
        })
    }

    /// Whether `ip` falls inside this range's base and window.
    pub fn contains(&self, ip: &str) -> bool {
        self.suffix_of(ip).is_ok()
    }

    /// Release a previously allocated address.
    pub fn free(&mut self, ip: &str) -> Result<()> {
        let suffix = self.suffix_of(ip)?;
        if !self.status.masks.test(suffix) {
            return Err(CoreError::NotAllocated { ip: ip.to_owned() });
        }
        self.status.masks.clear(suffix);
        self.status.data.remove(&suffix);
        Ok(())
    }

    /// Release every address in the range.
    pub fn free_all(&mut self) {
        let taken: Vec<u8> = self.status.masks.iter_set().collect();
        for suffix in taken {
            self.status.masks.clear(suffix);
        }
        self.status.data.clear();
    }

    /// Same base subnet and overlapping windows.
    pub fn is_conflict(&self, other: &IpRange) -> bool {
        let same_base = match (self.spec.base(), other.spec.base()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        };
        same_base
            && self.spec.min_ip <= other.spec.max_ip
            && self.spec.max_ip >= other.spec.min_ip
    }

    pub fn in_use(&self) -> bool {
        !self.status.masks.is_empty()
    }

    /// Addresses currently allocated, with their owners.
    pub fn allocations(&self) -> impl Iterator<Item = (Ipv4Addr, &str)> + '_ {
        let [a, b, c] = self.spec.base().unwrap_or_default();
        self.status
            .data
            .iter()
            .map(move |(suffix, owner)| (Ipv4Addr::new(a, b, c, *suffix), owner.as_str()))
    }

    fn suffix_of(&self, ip: &str) -> Result<u8> {
        let out_of_range = || CoreError::OutOfRange { ip: ip.to_owned() };
        let addr: Ipv4Addr = ip
            .parse()
            .map_err(|_| CoreError::validation(format!("invalid IP address '{ip}'")))?;
        let [a, b, c, suffix] = addr.octets();
        if [a, b, c] != self.spec.base()? {
            return Err(out_of_range());
        }
        if suffix < self.spec.min_ip || suffix > self.spec.max_ip {
            return Err(out_of_range());
        }
        Ok(suffix)
    }
}
