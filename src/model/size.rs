//! Byte counters used for memory accounting

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// A number of bytes, printed in binary units (`1.50 KiB`)
///
/// Arithmetic saturates at zero so that accounting drift can never wrap
/// a counter around to a huge value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StorageSize(pub u64);

impl StorageSize {
    pub const ZERO: StorageSize = StorageSize(0);

    pub fn bytes(self) -> u64 {
        self.0
    }
}

impl From<usize> for StorageSize {
    fn from(n: usize) -> Self {
        StorageSize(n as u64)
    }
}

impl From<u64> for StorageSize {
    fn from(n: u64) -> Self {
        StorageSize(n)
    }
}

impl Add for StorageSize {
    type Output = StorageSize;

    fn add(self, rhs: StorageSize) -> StorageSize {
        StorageSize(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for StorageSize {
    fn add_assign(&mut self, rhs: StorageSize) {
        *self = *self + rhs;
    }
}

impl Sub for StorageSize {
    type Output = StorageSize;

    fn sub(self, rhs: StorageSize) -> StorageSize {
        StorageSize(self.0.saturating_sub(rhs.0))
    }
}

impl SubAssign for StorageSize {
    fn sub_assign(&mut self, rhs: StorageSize) {
        *self = *self - rhs;
    }
}

impl fmt::Display for StorageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
        if self.0 < 1024 {
            return write!(f, "{} B", self.0);
        }
        let mut value = self.0 as f64 / 1024.0;
        let mut unit = 0;
        while value >= 1024.0 && unit < UNITS.len() - 1 {
            value /= 1024.0;
            unit += 1;
        }
        write!(f, "{:.2} {}", value, UNITS[unit])
    }
}

impl fmt::Debug for StorageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageSize({})", self.0)
    }
}
