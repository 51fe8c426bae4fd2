// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! x86_64 architecture support.

use super::ArchBacktrace;

/// x86_64 architecture implementation.
pub struct X86_64;

impl ArchBacktrace for X86_64 {
    // `push rbp` only guarantees word alignment for code that does not
    // follow the ABI's call-site alignment.
    const FP_ALIGNMENT: usize = 8;
    const FRAME_OFFSET: usize = 0;

    #[inline(always)]
    fn current_fp() -> usize {
        cfg_if::cfg_if! {
            if #[cfg(target_arch = "x86_64")] {
                let fp: usize;
                unsafe { core::arch::asm!("mov {}, rbp", out(reg) fp, options(nomem, nostack)) };
                fp
            } else {
                0
            }
        }
    }
}
