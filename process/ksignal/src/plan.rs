// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Where the worker goes: pure stack arithmetic, no memory access.
use core::mem::size_of;

use kcpu::{ARG_REGS, HostAbi, MachineContext, StackAbi};
use memaddr::StackAddr;
use static_assertions::const_assert_eq;
use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::FaultContext;

/// The two-word record left below the red zone: fault frame pointer at the
/// lower address, fault program counter above it.
pub use backtrace::FrameRecord as SyntheticFrame;

const FRAME_SIZE: usize = size_of::<SyntheticFrame>();

const_assert_eq!(FRAME_SIZE, 2 * size_of::<usize>());

/// Errors that make a relocation impossible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum RelocateError {
    #[display("fault stack pointer {sp:#x} is not word aligned")]
    MisalignedStack { sp: usize },
    #[display("no room below fault stack pointer {sp:#x} for a frame record")]
    StackExhausted { sp: usize },
    #[display("signal context pointer is null")]
    NullContext,
}

impl core::error::Error for RelocateError {}

/// Return address handed to the worker.
///
/// A fault stack pointer is either 16-byte aligned or sits one word off.
/// Re-aligning below the red zone absorbs that word as padding, and each
/// case has its own return site whose unwind info knows the padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum ReturnSite {
    AlignedEntry,
    PaddedEntry,
}

impl ReturnSite {
    /// Chooses the site for a fault stack pointer of the host ABI.
    pub const fn for_stack_pointer(sp: usize) -> Self {
        Self::for_abi::<HostAbi>(sp)
    }

    pub const fn for_abi<A: StackAbi>(sp: usize) -> Self {
        if StackAddr::from_usize(sp).is_aligned(A::STACK_ALIGN) {
            Self::AlignedEntry
        } else {
            Self::PaddedEntry
        }
    }

    /// Padding between the red zone and the synthetic frame.
    pub const fn padding<A: StackAbi>(self) -> usize {
        match self {
            Self::AlignedEntry => 0,
            Self::PaddedEntry => A::WORD,
        }
    }

    /// Distance from the worker's entry stack pointer up to the fault stack
    /// pointer.
    pub const fn cfa_offset<A: StackAbi>(self) -> usize {
        A::RED_ZONE + self.padding::<A>() + FRAME_SIZE
    }

    /// Code address of this site in the running binary.
    pub fn address(self) -> usize {
        match self {
            Self::AlignedEntry => crate::arch::aligned_return_site(),
            Self::PaddedEntry => crate::arch::padded_return_site(),
        }
    }

    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// The computed layout of one relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationPlan {
    fault_sp: StackAddr,
    stack_top: StackAddr,
    site: ReturnSite,
    frame: SyntheticFrame,
}

impl RelocationPlan {
    /// Plans a relocation for the host ABI.
    pub fn new(fault: &impl FaultContext) -> Result<Self, RelocateError> {
        Self::for_abi::<HostAbi>(
            fault.stack_pointer(),
            fault.frame_pointer(),
            fault.program_counter(),
        )
    }

    pub fn for_abi<A: StackAbi>(sp: usize, fp: usize, pc: usize) -> Result<Self, RelocateError> {
        let fault_sp = StackAddr::from_usize(sp);
        if !fault_sp.is_aligned(A::WORD) {
            return Err(RelocateError::MisalignedStack { sp });
        }
        let stack_top = fault_sp
            .checked_sub(A::RED_ZONE)
            .map(|top| top.align_down(A::STACK_ALIGN))
            .filter(|top| top.as_usize() > FRAME_SIZE)
            .ok_or(RelocateError::StackExhausted { sp })?;

        Ok(Self {
            fault_sp,
            stack_top,
            site: ReturnSite::for_abi::<A>(sp),
            frame: SyntheticFrame { fp, pc },
        })
    }

    pub fn fault_sp(&self) -> StackAddr {
        self.fault_sp
    }

    /// First aligned address below the red zone.
    pub fn stack_top(&self) -> StackAddr {
        self.stack_top
    }

    /// Where the synthetic frame goes; also the worker's stack and frame
    /// pointer.
    pub fn frame_addr(&self) -> StackAddr {
        // `for_abi` keeps the stack top above one frame record.
        StackAddr::from_usize(self.stack_top.as_usize() - FRAME_SIZE)
    }

    pub fn return_site(&self) -> ReturnSite {
        self.site
    }

    pub fn frame(&self) -> SyntheticFrame {
        self.frame
    }

    /// Stores the synthetic frame on the fault stack.
    ///
    /// # Safety
    ///
    /// The 16 bytes at [`frame_addr`](Self::frame_addr) must be writable and
    /// unused by anyone else.
    pub unsafe fn write_frame(&self) {
        let record = self.frame_addr().as_mut_ptr_of::<SyntheticFrame>();
        unsafe { record.write(self.frame) };
    }

    /// Builds the context that enters `entry` with `args`, returning to
    /// `return_site`.
    #[inline(always)]
    pub fn machine_context(
        &self,
        entry: usize,
        return_site: usize,
        args: [usize; ARG_REGS],
    ) -> MachineContext {
        let frame = self.frame_addr().as_usize();
        let mut ctx = MachineContext::capture();
        ctx.set_sp(frame);
        ctx.set_fp(frame);
        ctx.set_lr(return_site);
        ctx.set_pc(entry);
        ctx.set_args(args);
        ctx
    }
}
