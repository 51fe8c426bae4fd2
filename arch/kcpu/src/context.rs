// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! A minimal machine context and the primitive that activates it.
use core::mem::offset_of;

use static_assertions::const_assert_eq;

/// Number of integer argument registers carried by a [`MachineContext`].
pub const ARG_REGS: usize = 4;

/// The register state needed to start a function call from scratch.
///
/// Only the registers that define *where* execution continues are kept: the
/// stack pointer, the frame pointer, the program counter, the return address
/// and the first four integer arguments. Every other register is left with
/// whatever value it holds when the context is activated.
///
/// The layout is fixed because [`activate`] reads it from assembly.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MachineContext {
    pub(crate) sp: usize,
    pub(crate) fp: usize,
    pub(crate) pc: usize,
    pub(crate) lr: usize,
    pub(crate) args: [usize; ARG_REGS],
}

const_assert_eq!(offset_of!(MachineContext, sp), 0);
const_assert_eq!(offset_of!(MachineContext, fp), 8);
const_assert_eq!(offset_of!(MachineContext, pc), 16);
const_assert_eq!(offset_of!(MachineContext, lr), 24);
const_assert_eq!(offset_of!(MachineContext, args), 32);
const_assert_eq!(core::mem::size_of::<MachineContext>(), 64);

impl MachineContext {
    /// Snapshots the caller's stack pointer, frame pointer and program
    /// counter (and link register where the ABI has one).
    ///
    /// The snapshot only serves as a template: activating it unmodified would
    /// jump back into the middle of the caller.
    #[inline(always)]
    pub fn capture() -> Self {
        crate::arch::capture()
    }

    #[inline]
    pub const fn sp(&self) -> usize {
        self.sp
    }

    #[inline]
    pub fn set_sp(&mut self, sp: usize) {
        self.sp = sp;
    }

    #[inline]
    pub const fn fp(&self) -> usize {
        self.fp
    }

    #[inline]
    pub fn set_fp(&mut self, fp: usize) {
        self.fp = fp;
    }

    #[inline]
    pub const fn pc(&self) -> usize {
        self.pc
    }

    #[inline]
    pub fn set_pc(&mut self, pc: usize) {
        self.pc = pc;
    }

    /// The return address the activated function will return to.
    ///
    /// On ABIs without a link register [`activate`] pushes it onto the new
    /// stack, exactly like a call instruction would.
    #[inline]
    pub const fn lr(&self) -> usize {
        self.lr
    }

    #[inline]
    pub fn set_lr(&mut self, lr: usize) {
        self.lr = lr;
    }

    /// Returns argument register `n`, or `None` if `n >= 4`.
    #[inline]
    pub fn arg(&self, n: usize) -> Option<usize> {
        self.args.get(n).copied()
    }

    #[inline]
    pub const fn args(&self) -> [usize; ARG_REGS] {
        self.args
    }

    #[inline]
    pub fn set_args(&mut self, args: [usize; ARG_REGS]) {
        self.args = args;
    }
}

/// Replaces the current execution state with `ctx`.
///
/// Execution continues at `ctx.pc()` with the stack and frame pointers and
/// the argument registers taken from `ctx`, as if the function at `ctx.pc()`
/// had been called from `ctx.lr()`.
///
/// # Safety
///
/// `ctx.sp()` must point into writable stack memory aligned to
/// [`StackAbi::STACK_ALIGN`](crate::StackAbi::STACK_ALIGN), with room for
/// the callee's frame below it, and `ctx.pc()` must be the entry of a
/// function taking the argument registers as its parameters. Nothing on the
/// current stack is dropped.
#[inline]
pub unsafe fn activate(ctx: &MachineContext) -> ! {
    unsafe { crate::arch::activate_context(ctx) }
}
