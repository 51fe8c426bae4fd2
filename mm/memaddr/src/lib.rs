// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Stack address wrapper and alignment arithmetic.
#![cfg_attr(not(test), no_std)]

mod addr;
mod tests;

pub use self::addr::StackAddr;

/// Rounds `addr` down to a multiple of `align`.
///
/// `align` must be a power of two.
#[inline]
pub const fn floor_align(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// Checks whether `addr` is a multiple of `align`.
#[inline]
pub const fn aligned_to(addr: usize, align: usize) -> bool {
    addr & (align - 1) == 0
}
