// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Relocation of a faulting thread onto a worker routine.
//!
//! A signal handler that wants the fault to stay visible to an unwinder
//! cannot simply call its worker: the worker would run on the signal frame,
//! and a stack walk would never reach the faulting instruction. [`relocate`]
//! instead starts the worker on the interrupted stack itself, just below the
//! red zone of the faulting frame, behind a synthetic frame record that
//! links back to the fault's program counter and frame pointer.
//!
//! ```text
//!   fault sp ->  +----------------------+
//!                |      red zone        |  128 bytes, untouched
//!                +----------------------+
//!                | padding (0 or 8)     |
//!   stack top -> +----------------------+
//!                | fault pc             |
//!                | fault fp             |  <- worker sp / fp
//!                +----------------------+
//! ```
//!
//! Nothing here allocates or locks; the relocation is safe to run inside a
//! signal handler.
#![cfg_attr(not(test), no_std)]

mod arch;
mod fault;
mod plan;
mod relocate;

pub use self::{
    arch::UContext,
    fault::{FaultContext, RawFaultContext, SignalInfo},
    plan::{RelocateError, RelocationPlan, ReturnSite, SyntheticFrame},
    relocate::{Relocator, SignalWorker, relocate},
};
