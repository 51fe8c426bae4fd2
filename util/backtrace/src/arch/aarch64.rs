// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! AArch64 (ARM64) architecture support.

use super::ArchBacktrace;

/// AArch64 architecture implementation.
pub struct AArch64;

impl ArchBacktrace for AArch64 {
    // AArch64 requires 16-byte stack alignment
    const FP_ALIGNMENT: usize = 16;
    const FRAME_OFFSET: usize = 0;

    #[inline(always)]
    fn current_fp() -> usize {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "aarch64")] {
                let fp: usize;
                unsafe { core::arch::asm!("mov {}, x29", out(reg) fp, options(nomem, nostack)) };
                fp
            } else {
                0
            }
        }
    }
}
