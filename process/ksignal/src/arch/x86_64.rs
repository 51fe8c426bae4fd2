// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! x86_64 signal context and return-site wrappers.
use core::{ffi::c_void, mem::size_of};

use super::{ALIGNED_CFA, PADDED_CFA};
use crate::FaultContext;

pub(crate) const DWARF_FP: u16 = 6;
pub(crate) const DWARF_SP: u16 = 7;
pub(crate) const DWARF_PC: u16 = 16;
pub(crate) const DWARF_LR: Option<u16> = None;

// Both wrappers describe the frame the worker finds on entry: the synthetic
// record sits at the return-site stack pointer, fault rbp first, fault rip
// above it, and the fault rsp is the CFA. The `nop` keeps `return address - 1`
// inside the routine for unwinders that look up the call site.
core::arch::global_asm!(
    "
.section .text
.p2align 4
.global ksignal_return_site_wrapper0
.type ksignal_return_site_wrapper0, @function
ksignal_return_site_wrapper0:
    .cfi_startproc
    .cfi_def_cfa 7, {aligned}
    .cfi_offset 6, -{aligned}
    .cfi_offset 16, -{aligned_ra}
    nop
.global ksignal_return_site0
ksignal_return_site0:
    ud2
    .cfi_endproc
.size ksignal_return_site_wrapper0, . - ksignal_return_site_wrapper0

.p2align 4
.global ksignal_return_site_wrapper8
.type ksignal_return_site_wrapper8, @function
ksignal_return_site_wrapper8:
    .cfi_startproc
    .cfi_def_cfa 7, {padded}
    .cfi_offset 6, -{padded}
    .cfi_offset 16, -{padded_ra}
    nop
.global ksignal_return_site8
ksignal_return_site8:
    ud2
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

    fn greg(&self, reg: libc::c_int) -> usize {
        self.mcontext.gregs[reg as usize] as usize
    }
}

impl FaultContext for UContext<'_> {
    fn stack_pointer(&self) -> usize {
        self.greg(libc::REG_RSP)
    }

    fn frame_pointer(&self) -> usize {
        self.greg(libc::REG_RBP)
    }

    fn program_counter(&self) -> usize {
        self.greg(libc::REG_RIP)
    }

    fn link_register(&self) -> Option<usize> {
        None
    }

    fn general_register(&self, dwarf: u16) -> Option<usize> {
        let reg = match dwarf {
            0 => libc::REG_RAX,
            1 => libc::REG_RDX,
            2 => libc::REG_RCX,
            3 => libc::REG_RBX,
            4 => libc::REG_RSI,
            5 => libc::REG_RDI,
            DWARF_FP => libc::REG_RBP,
            DWARF_SP => libc::REG_RSP,
            8 => libc::REG_R8,
            9 => libc::REG_R9,
            10 => libc::REG_R10,
            11 => libc::REG_R11,
            12 => libc::REG_R12,
            13 => libc::REG_R13,
            14 => libc::REG_R14,
            15 => libc::REG_R15,
            DWARF_PC => libc::REG_RIP,
            _ => return None,
        };
        Some(self.greg(reg))
    }
}
