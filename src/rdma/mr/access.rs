//! Memory-region access-flag set.

use std::ops::{Add, AddAssign, BitOr, BitOrAssign, Sub, SubAssign};

use crate::bindings::kfi_access_flags;

/// Memory-region access flags. kfabric's access set is narrower than verbs:
/// no memory-window bind, no on-demand paging, no separate atomic flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct Access(kfi_access_flags);

impl Access {
    pub const EMPTY: Self = Self(kfi_access_flags(0));
    pub const LOCAL_WRITE: Self = Self(kfi_access_flags::KFI_ACCESS_LOCAL_WRITE);
    pub const REMOTE_WRITE: Self = Self(kfi_access_flags::KFI_ACCESS_REMOTE_WRITE);
    pub const REMOTE_READ: Self = Self(kfi_access_flags::KFI_ACCESS_REMOTE_READ);

    pub fn bits(self) -> u64 {
        self.0 .0 as u64
    }
}

impl Default for Access {
    /// Full local write, remote read and remote write: what fast-registration
    /// and all-memory DMA MRs both grant.
    fn default() -> Self {
        Self::LOCAL_WRITE | Self::REMOTE_WRITE | Self::REMOTE_READ
    }
}

impl Add for Access {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl AddAssign for Access {
    fn add_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Sub for Access {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(kfi_access_flags(self.0 .0 & !rhs.0 .0))
    }
}

impl SubAssign for Access {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 .0 &= !rhs.0 .0;
    }
}

impl BitOr for Access {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self + rhs
    }
}

impl BitOrAssign for Access {
    fn bitor_assign(&mut self, rhs: Self) {
        *self += rhs;
    }
}
