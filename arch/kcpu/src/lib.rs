// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Machine context records and the primitives that move execution between
//! them.
//!
//! Everything in this crate is usable from a signal handler: no function
//! allocates, takes a lock or calls into libc.
#![cfg_attr(not(test), no_std)]

mod abi;
mod context;
mod return_point;

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        mod x86_64;
        use self::x86_64 as arch;
    } else if #[cfg(target_arch = "aarch64")] {
        mod aarch64;
        use self::aarch64 as arch;
    } else {
        compile_error!("kcpu supports only x86_64 and aarch64");
    }
}

pub use self::{
    abi::{AArch64, HostAbi, StackAbi, X86_64},
    context::{ARG_REGS, MachineContext, activate},
    return_point::{Landing, ReturnPoint, resume, with_return_point},
};
