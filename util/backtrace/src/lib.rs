// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Frame pointer backtraces.
//!
//! Every frame that keeps a frame pointer stores a two-word record at the
//! address the frame pointer designates: the caller's frame pointer and the
//! return address into the caller. Following these records from the current
//! frame pointer reconstructs the call chain without any unwind tables, which
//! also makes the walk usable inside a signal handler.
#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

mod arch;

use core::{fmt, marker::PhantomData, mem::size_of, ops::Range};

pub use self::arch::{AArch64, ArchBacktrace, HostArch, X86_64};

/// Default bound on the number of frames produced by a [`FrameWalker`].
pub const MAX_DEPTH: usize = 64;

/// A frame record as laid out in memory.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRecord {
    /// Frame pointer of the caller.
    pub fp: usize,
    /// Return address into the caller.
    pub pc: usize,
}

/// One step of the walk: the caller state recovered from a frame record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Frame pointer of the caller.
    pub fp: usize,
    /// Program counter in the caller.
    pub pc: usize,
}

/// Iterator following the frame pointer chain towards the outermost caller.
///
/// The walk stops at a null, misaligned or non-increasing frame pointer, at a
/// record whose return address is zero, when a record falls outside the
/// optional stack bounds, or after [`MAX_DEPTH`] frames.
pub struct FrameWalker<A: ArchBacktrace = HostArch> {
    fp: usize,
    bounds: Option<Range<usize>>,
    remaining: usize,
    _arch: PhantomData<A>,
}

impl<A: ArchBacktrace> FrameWalker<A> {
    /// Starts a walk at the frame record designated by `fp`.
    ///
    /// # Safety
    ///
    /// Every frame pointer reached by the walk must be readable. Pass stack
    /// bounds with [`with_bounds`](Self::with_bounds) when the chain may
    /// contain values that were never frame pointers.
    pub unsafe fn new(fp: usize) -> Self {
        Self {
            fp,
            bounds: None,
            remaining: MAX_DEPTH,
            _arch: PhantomData,
        }
    }

    /// Starts a walk at the caller's frame.
    ///
    /// # Safety
    ///
    /// See [`new`](Self::new). The caller must be compiled with frame
    /// pointers.
    #[inline(always)]
    pub unsafe fn from_current() -> Self {
        unsafe { Self::new(A::current_fp()) }
    }

    /// Only reads frame records that lie entirely within `bounds`.
    pub fn with_bounds(mut self, bounds: Range<usize>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.remaining = depth;
        self
    }

    fn record_addr(&self) -> Option<usize> {
        if self.fp == 0 || !memaddr::aligned_to(self.fp, A::FP_ALIGNMENT) {
            return None;
        }
        let addr = self
            .fp
            .checked_sub(A::FRAME_OFFSET * size_of::<FrameRecord>())?;
        match &self.bounds {
            Some(bounds)
                if addr < bounds.start
                    || addr.checked_add(size_of::<FrameRecord>())? > bounds.end =>
            {
                None
            }
            _ => Some(addr),
        }
    }
}

impl<A: ArchBacktrace> Iterator for FrameWalker<A> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.remaining == 0 {
            return None;
        }
        let Some(addr) = self.record_addr() else {
            trace!("frame walk stopped at fp={:#x}", self.fp);
            return None;
        };
        let record = unsafe { (addr as *const FrameRecord).read() };
        if record.pc == 0 {
            return None;
        }
        self.remaining -= 1;

        // Callers live at higher addresses; anything else ends the chain
        // after reporting this frame.
        self.fp = if record.fp > self.fp { record.fp } else { 0 };
        Some(Frame {
            fp: record.fp,
            pc: record.pc,
        })
    }
}

/// Formats the frame chain starting at a frame pointer, one line per frame.
pub struct Backtrace<A: ArchBacktrace = HostArch> {
    fp: usize,
    bounds: Option<Range<usize>>,
    _arch: PhantomData<A>,
}

impl<A: ArchBacktrace> Backtrace<A> {
    /// # Safety
    ///
    /// Same contract as [`FrameWalker::new`], for every time the value is
    /// formatted.
    pub unsafe fn new(fp: usize) -> Self {
        Self {
            fp,
            bounds: None,
            _arch: PhantomData,
        }
    }

    pub fn with_bounds(mut self, bounds: Range<usize>) -> Self {
        self.bounds = Some(bounds);
        self
    }
}

impl<A: ArchBacktrace> fmt::Display for Backtrace<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut walker = unsafe { FrameWalker::<A>::new(self.fp) };
        if let Some(bounds) = &self.bounds {
            walker = walker.with_bounds(bounds.clone());
        }
        for (i, frame) in walker.enumerate() {
            writeln!(f, "#{i:<2} pc={:#018x} fp={:#018x}", frame.pc, frame.fp)?;
        }
        Ok(())
    }
}
