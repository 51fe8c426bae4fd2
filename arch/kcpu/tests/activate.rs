// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Context activation onto a separately allocated stack.

use std::{
    num::NonZeroUsize,
    sync::atomic::{AtomicUsize, Ordering},
};

use kcpu::{HostAbi, Landing, MachineContext, ReturnPoint, StackAbi, activate, with_return_point};

const STACK_WORDS: usize = 8 * 1024;

static SEEN_ARG0: AtomicUsize = AtomicUsize::new(0);
static SEEN_ARG1: AtomicUsize = AtomicUsize::new(0);
static SEEN_ARG3: AtomicUsize = AtomicUsize::new(0);
static SEEN_LOCAL: AtomicUsize = AtomicUsize::new(0);
static ENTRY_SP: AtomicUsize = AtomicUsize::new(0);
static ENTRY_RA: AtomicUsize = AtomicUsize::new(0);

const RETURN_SENTINEL: usize = 0xdead_0000;

// Records the stack pointer and return address exactly as `entry` would see
// them, then continues into `entry` with the argument registers untouched.
#[cfg(target_arch = "x86_64")]
core::arch::global_asm!(
    "
.section .text
.balign 16
.global kcpu_test_record_entry
kcpu_test_record_entry:
    mov qword ptr [rip + {entry_sp}], rsp
    mov rax, [rsp]
    mov qword ptr [rip + {entry_ra}], rax
    jmp {entry}
",
    entry_sp = sym ENTRY_SP,
    entry_ra = sym ENTRY_RA,
    entry = sym entry,
);

#[cfg(target_arch = "aarch64")]
core::arch::global_asm!(
    "
.section .text
.balign 16
.global kcpu_test_record_entry
kcpu_test_record_entry:
    adrp x9, {entry_sp}
    add x9, x9, :lo12:{entry_sp}
    mov x10, sp
    str x10, [x9]
    adrp x9, {entry_ra}
    add x9, x9, :lo12:{entry_ra}
    str x30, [x9]
    b {entry}
",
    entry_sp = sym ENTRY_SP,
    entry_ra = sym ENTRY_RA,
    entry = sym entry,
);

unsafe extern "C" {
    fn kcpu_test_record_entry(a: usize, b: usize, rp: *mut ReturnPoint, d: usize) -> !;
}

unsafe extern "C" fn entry(a: usize, b: usize, rp: *mut ReturnPoint, d: usize) -> ! {
    let local = a ^ b;
    SEEN_ARG0.store(a, Ordering::SeqCst);
    SEEN_ARG1.store(b, Ordering::SeqCst);
    SEEN_ARG3.store(d, Ordering::SeqCst);
    SEEN_LOCAL.store(&local as *const usize as usize, Ordering::SeqCst);
    unsafe { kcpu::resume(rp, 42) }
}

struct TestStack {
    words: Vec<u128>,
}

impl TestStack {
    fn new() -> Self {
        Self {
            words: vec![0; STACK_WORDS],
        }
    }

    fn base(&self) -> usize {
        self.words.as_ptr() as usize
    }

    fn top(&self) -> usize {
        self.base() + self.words.len() * size_of::<u128>()
    }
}

#[test]
fn test_activate_runs_entry_on_new_stack() {
    let stack = TestStack::new();
    let top = stack.top();
    assert_eq!(top % HostAbi::STACK_ALIGN, 0);

    // A terminating frame record ({fp: 0, pc: 0}) at the top of the new stack.
    let frame = top - 2 * HostAbi::WORD;

    let mut ctx = MachineContext::capture();
    ctx.set_sp(frame);
    ctx.set_fp(frame);
    ctx.set_lr(RETURN_SENTINEL);
    ctx.set_pc(kcpu_test_record_entry as usize);

    let landing = with_return_point(|rp| {
        ctx.set_args([0x1111, 0x2222, rp as usize, 0x4444]);
        unsafe { activate(&ctx) }
    });

    assert_eq!(landing, Landing::Resumed(NonZeroUsize::new(42).unwrap()));
    assert_eq!(SEEN_ARG0.load(Ordering::SeqCst), 0x1111);
    assert_eq!(SEEN_ARG1.load(Ordering::SeqCst), 0x2222);
    assert_eq!(SEEN_ARG3.load(Ordering::SeqCst), 0x4444);

    let local = SEEN_LOCAL.load(Ordering::SeqCst);
    assert!(local >= stack.base() && local < frame, "local {local:#x} not on the new stack");

    // The entry sees a regular call: the return address is where the ABI
    // expects it and the stack has call-site alignment.
    let entry_sp = ENTRY_SP.load(Ordering::SeqCst);
    assert_eq!(ENTRY_RA.load(Ordering::SeqCst), RETURN_SENTINEL);
    if HostAbi::HAS_LINK_REGISTER {
        assert_eq!(entry_sp, frame);
        assert_eq!(entry_sp % HostAbi::STACK_ALIGN, 0);
    } else {
        assert_eq!(entry_sp, frame - HostAbi::WORD);
        assert_eq!(entry_sp % HostAbi::STACK_ALIGN, HostAbi::WORD);
    }
}
