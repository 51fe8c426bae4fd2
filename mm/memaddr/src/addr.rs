// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

use core::fmt;

/// An address on a thread stack.
///
/// Stacks grow downwards on every supported target, so "below" an address
/// means numerically smaller.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct StackAddr(usize);

impl StackAddr {
    #[inline]
    pub const fn from_usize(addr: usize) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn as_ptr_of<T>(self) -> *const T {
        self.0 as *const T
    }

    #[inline]
    pub const fn as_mut_ptr_of<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Rounds down to `align`, which must be a power of two.
    #[inline]
    #[must_use = "this returns a new address, without modifying the original"]
    pub const fn align_down(self, align: usize) -> Self {
        Self(crate::floor_align(self.0, align))
    }

    #[inline]
    pub const fn is_aligned(self, align: usize) -> bool {
        crate::aligned_to(self.0, align)
    }

    /// The address `bytes` below this one, or `None` if that wraps past zero.
    #[inline]
    #[must_use = "this returns a new address, without modifying the original"]
    pub const fn checked_sub(self, bytes: usize) -> Option<Self> {
        match self.0.checked_sub(bytes) {
            Some(addr) => Some(Self(addr)),
            None => None,
        }
    }
}

impl From<usize> for StackAddr {
    #[inline]
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl From<StackAddr> for usize {
    #[inline]
    fn from(addr: StackAddr) -> usize {
        addr.0
    }
}

impl fmt::Debug for StackAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SA:{:#x}", self.0)
    }
}

impl fmt::LowerHex for StackAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}
