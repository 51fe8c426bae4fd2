// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Per-architecture frame pointer conventions.

mod aarch64;
mod x86_64;

pub use self::{aarch64::AArch64, x86_64::X86_64};

/// Frame pointer conventions of one architecture.
pub trait ArchBacktrace {
    /// Alignment every valid frame pointer has.
    const FP_ALIGNMENT: usize;
    /// Distance, in frame records, between the frame pointer and the record
    /// it designates.
    const FRAME_OFFSET: usize;

    /// Reads the frame pointer register of the caller.
    fn current_fp() -> usize;
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// The architecture being compiled for.
        pub type HostArch = X86_64;
    } else if #[cfg(target_arch = "aarch64")] {
        /// The architecture being compiled for.
        pub type HostArch = AArch64;
    } else {
        compile_error!("backtrace supports only x86_64 and aarch64");
    }
}
