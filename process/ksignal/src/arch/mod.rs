// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Signal context layouts and return-site wrappers per architecture.

cfg_if::cfg_if! {
    if #[cfg(all(target_os = "linux", target_arch = "x86_64"))] {
        mod x86_64;
        pub use self::x86_64::*;
    } else if #[cfg(all(target_os = "linux", target_arch = "aarch64"))] {
        mod aarch64;
        pub use self::aarch64::*;
    } else {
        compile_error!("ksignal supports only Linux on x86_64 and aarch64");
    }
}

/// Canonical frame address offset, from the worker's stack pointer at the
/// return site, of the wrapper for a 16-byte aligned fault.
pub(crate) const ALIGNED_CFA: usize =
    crate::ReturnSite::AlignedEntry.cfa_offset::<kcpu::HostAbi>();
/// Same for an 8-byte aligned fault.
pub(crate) const PADDED_CFA: usize =
    crate::ReturnSite::PaddedEntry.cfa_offset::<kcpu::HostAbi>();

static_assertions::const_assert_eq!(ALIGNED_CFA, 144);
static_assertions::const_assert_eq!(PADDED_CFA, 152);
