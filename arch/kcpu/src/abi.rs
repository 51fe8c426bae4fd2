// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Stack layout rules of the supported calling conventions.

/// Stack rules a context switch has to honour on one ABI.
pub trait StackAbi {
    /// Size of a machine word, the minimal unit the stack pointer moves by.
    const WORD: usize = core::mem::size_of::<usize>();
    /// Alignment the stack pointer must have at a call boundary.
    const STACK_ALIGN: usize;
    /// Bytes below the stack pointer that interrupted code may still be using.
    const RED_ZONE: usize;
    /// Whether calls pass the return address in a register instead of on the
    /// stack.
    const HAS_LINK_REGISTER: bool;
}

/// System V AMD64.
pub struct X86_64;

impl StackAbi for X86_64 {
    const STACK_ALIGN: usize = 16;
    const RED_ZONE: usize = 128;
    const HAS_LINK_REGISTER: bool = false;
}

/// AAPCS64.
///
/// The procedure call standard does not define a red zone for Linux, but
/// Darwin reserves 128 bytes and leaf code generated for either target may
/// rely on it, so the larger reservation is kept.
pub struct AArch64;

impl StackAbi for AArch64 {
    const STACK_ALIGN: usize = 16;
    const RED_ZONE: usize = 128;
    const HAS_LINK_REGISTER: bool = true;
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// The ABI of the target being compiled for.
        pub type HostAbi = X86_64;
    } else if #[cfg(target_arch = "aarch64")] {
        /// The ABI of the target being compiled for.
        pub type HostAbi = AArch64;
    }
}
