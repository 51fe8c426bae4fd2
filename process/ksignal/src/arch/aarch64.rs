// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! AArch64 signal context and return-site wrappers.
use core::{ffi::c_void, mem::size_of};

use super::{ALIGNED_CFA, PADDED_CFA};
use crate::FaultContext;

pub(crate) const DWARF_FP: u16 = 29;
pub(crate) const DWARF_SP: u16 = 31;
pub(crate) const DWARF_PC: u16 = 32;
pub(crate) const DWARF_LR: Option<u16> = Some(30);

// The worker returns to these labels with sp at the synthetic record: x29
// holds the fault frame pointer below the fault pc, and the fault sp is the
// CFA. `brk` stops a worker that returns instead of resuming.
core::arch::global_asm!(
    "
.section .text
.p2align 4
.global ksignal_return_site_wrapper0
.type ksignal_return_site_wrapper0, %function
ksignal_return_site_wrapper0:
    .cfi_startproc
    .cfi_def_cfa 31, {aligned}
    .cfi_offset 29, -{aligned}
    .cfi_offset 30, -{aligned_ra}
    nop
.global ksignal_return_site0
ksignal_return_site0:
    brk #1
    .cfi_endproc
.size ksignal_return_site_wrapper0, . - ksignal_return_site_wrapper0

.p2align 4
.global ksignal_return_site_wrapper8
.type ksignal_return_site_wrapper8, %function
ksignal_return_site_wrapper8:
    .cfi_startproc
    .cfi_def_cfa 31, {padded}
    .cfi_offset 29, -{padded}
    .cfi_offset 30, -{padded_ra}
    nop
.global ksignal_return_site8
ksignal_return_site8:
    brk #1
    .cfi_endproc
.size ksignal_return_site_wrapper8, . - ksignal_return_site_wrapper8
",
    aligned = const ALIGNED_CFA,
    padded = const PADDED_CFA,
    aligned_ra = const ALIGNED_CFA - size_of::<usize>(),
    padded_ra = const PADDED_CFA - size_of::<usize>(),
);

unsafe extern "C" {
    fn ksignal_return_site0();
    fn ksignal_return_site8();
}

pub(crate) fn aligned_return_site() -> usize {
    ksignal_return_site0 as *const () as usize
}

pub(crate) fn padded_return_site() -> usize {
    ksignal_return_site8 as *const () as usize
}

/// Borrowed view of the `ucontext_t` a signal handler receives.
#[derive(Clone, Copy)]
pub struct UContext<'a> {
    mcontext: &'a libc::mcontext_t,
}

impl<'a> UContext<'a> {
    pub fn new(uc: &'a libc::ucontext_t) -> Self {
        Self {
            mcontext: &uc.uc_mcontext,
        }
    }

    /// # Safety
    ///
    /// `context` must be null or point to a `ucontext_t` valid for `'a`.
    pub unsafe fn from_raw(context: *const c_void) -> Option<Self> {
        unsafe { context.cast::<libc::ucontext_t>().as_ref() }.map(Self::new)
    }
}

impl FaultContext for UContext<'_> {
    fn stack_pointer(&self) -> usize {
        self.mcontext.sp as usize
    }

    fn frame_pointer(&self) -> usize {
        self.mcontext.regs[29] as usize
    }

    fn program_counter(&self) -> usize {
        self.mcontext.pc as usize
    }

    fn link_register(&self) -> Option<usize> {
        Some(self.mcontext.regs[30] as usize)
    }

    fn general_register(&self, dwarf: u16) -> Option<usize> {
        match dwarf {
            0..=30 => Some(self.mcontext.regs[dwarf as usize] as usize),
            DWARF_SP => Some(self.stack_pointer()),
            DWARF_PC => Some(self.program_counter()),
            _ => None,
        }
    }
}
