// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Read-only views of the state the kernel delivers with a signal.
use core::ffi::c_int;

use crate::arch;

/// Machine state of a thread at the moment a signal interrupted it.
pub trait FaultContext {
    fn stack_pointer(&self) -> usize;

    fn frame_pointer(&self) -> usize;

    fn program_counter(&self) -> usize;

    /// The return address register, on ABIs that have one.
    fn link_register(&self) -> Option<usize>;

    /// Reads a register by its DWARF number.
    fn general_register(&self, dwarf: u16) -> Option<usize>;
}

/// An already decoded fault context.
///
/// Used by dispatch layers that copied the registers out of the kernel's
/// record, and by anything that needs a fault context without a signal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RawFaultContext {
    pub sp: usize,
    pub fp: usize,
    pub pc: usize,
    pub lr: Option<usize>,
}

impl RawFaultContext {
    pub const fn new(sp: usize, fp: usize, pc: usize) -> Self {
        Self {
            sp,
            fp,
            pc,
            lr: None,
        }
    }

    /// Copies the registers out of another fault context.
    pub fn snapshot(fault: &impl FaultContext) -> Self {
        Self {
            sp: fault.stack_pointer(),
            fp: fault.frame_pointer(),
            pc: fault.program_counter(),
            lr: fault.link_register(),
        }
    }
}

impl FaultContext for RawFaultContext {
    fn stack_pointer(&self) -> usize {
        self.sp
    }

    fn frame_pointer(&self) -> usize {
        self.fp
    }

    fn program_counter(&self) -> usize {
        self.pc
    }

    fn link_register(&self) -> Option<usize> {
        self.lr
    }

    fn general_register(&self, dwarf: u16) -> Option<usize> {
        match dwarf {
            arch::DWARF_SP => Some(self.sp),
            arch::DWARF_FP => Some(self.fp),
            arch::DWARF_PC => Some(self.pc),
            n if Some(n) == arch::DWARF_LR => self.lr,
            _ => None,
        }
    }
}

/// The `siginfo_t` payload of a delivered signal.
#[derive(Clone, Copy)]
pub struct SignalInfo<'a> {
    raw: &'a libc::siginfo_t,
}

impl<'a> SignalInfo<'a> {
    pub fn new(raw: &'a libc::siginfo_t) -> Self {
        Self { raw }
    }

    /// # Safety
    ///
    /// `info` must be null or point to a `siginfo_t` valid for `'a`.
    pub unsafe fn from_raw(info: *const libc::siginfo_t) -> Option<Self> {
        unsafe { info.as_ref() }.map(Self::new)
    }

    pub fn signo(&self) -> c_int {
        self.raw.si_signo
    }

    pub fn code(&self) -> c_int {
        self.raw.si_code
    }

    /// The faulting memory address, for the signals that report one.
    pub fn fault_address(&self) -> Option<usize> {
        match self.signo() {
            libc::SIGSEGV | libc::SIGBUS | libc::SIGILL | libc::SIGFPE | libc::SIGTRAP => {
                Some(unsafe { self.raw.si_addr() } as usize)
            }
            _ => None,
        }
    }

    pub fn as_raw(&self) -> &'a libc::siginfo_t {
        self.raw
    }
}

impl core::fmt::Debug for SignalInfo<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SignalInfo")
            .field("signo", &self.signo())
            .field("code", &self.code())
            .field("fault_address", &self.fault_address())
            .finish()
    }
}
