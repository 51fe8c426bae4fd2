// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! AArch64 context activation and return points.
use core::{arch::asm, ffi::c_void, mem::offset_of};

use crate::{MachineContext, ReturnPoint};

// The branch into the activated context goes through x16 so that a `bti c`
// landing pad at the target accepts it.
core::arch::global_asm!(
    "
.section .text
.balign 16
.global kcpu_activate_context
.type kcpu_activate_context, %function
kcpu_activate_context:
    ldr x9, [x0, #{sp}]
    ldr x29, [x0, #{fp}]
    ldr x16, [x0, #{pc}]
    ldr x30, [x0, #{lr}]
    ldp x2, x3, [x0, #{arg2}]
    ldr x1, [x0, #{arg1}]
    ldr x0, [x0, #{arg0}]
    mov sp, x9
    br x16
.size kcpu_activate_context, . - kcpu_activate_context

.balign 16
.global kcpu_call_with_return_point
.type kcpu_call_with_return_point, %function
kcpu_call_with_return_point:
    .cfi_startproc
    stp x29, x30, [sp, #-160]!
    .cfi_def_cfa_offset 160
    .cfi_offset x29, -160
    .cfi_offset x30, -152
    mov x29, sp
    stp x19, x20, [sp, #16]
    stp x21, x22, [sp, #32]
    stp x23, x24, [sp, #48]
    stp x25, x26, [sp, #64]
    stp x27, x28, [sp, #80]
    stp d8, d9, [sp, #96]
    stp d10, d11, [sp, #112]
    stp d12, d13, [sp, #128]
    stp d14, d15, [sp, #144]
    mov x9, sp
    str x9, [x0, #{rp_sp}]
    mov x9, x1
    mov x1, x0
    mov x0, x2
    blr x9
    mov x0, #0
.Lkcpu_return_point_restore:
    ldp d14, d15, [sp, #144]
    ldp d12, d13, [sp, #128]
    ldp d10, d11, [sp, #112]
    ldp d8, d9, [sp, #96]
    ldp x27, x28, [sp, #80]
    ldp x25, x26, [sp, #64]
    ldp x23, x24, [sp, #48]
    ldp x21, x22, [sp, #32]
    ldp x19, x20, [sp, #16]
    ldp x29, x30, [sp], #160
    .cfi_def_cfa_offset 0
    .cfi_restore x29
    .cfi_restore x30
    ret
    .cfi_endproc
.size kcpu_call_with_return_point, . - kcpu_call_with_return_point

.balign 16
.global kcpu_resume_return_point
.type kcpu_resume_return_point, %function
kcpu_resume_return_point:
    ldr x9, [x0, #{rp_sp}]
    mov sp, x9
    mov x0, x1
    b .Lkcpu_return_point_restore
.size kcpu_resume_return_point, . - kcpu_resume_return_point
",
    sp = const offset_of!(MachineContext, sp),
    fp = const offset_of!(MachineContext, fp),
    pc = const offset_of!(MachineContext, pc),
    lr = const offset_of!(MachineContext, lr),
    arg0 = const offset_of!(MachineContext, args),
    arg1 = const offset_of!(MachineContext, args) + 8,
    arg2 = const offset_of!(MachineContext, args) + 16,
    rp_sp = const offset_of!(ReturnPoint, sp),
);

unsafe extern "C" {
    fn kcpu_activate_context(ctx: *const MachineContext) -> !;
    fn kcpu_call_with_return_point(
        rp: *mut ReturnPoint,
        f: unsafe extern "C" fn(*mut c_void, *mut ReturnPoint),
        data: *mut c_void,
    ) -> usize;
    fn kcpu_resume_return_point(rp: *const ReturnPoint, value: usize) -> !;
}

#[inline(always)]
pub(crate) fn capture() -> MachineContext {
    let (sp, fp, pc, lr): (usize, usize, usize, usize);
    unsafe {
        asm!(
            "mov {sp}, sp",
            "mov {fp}, x29",
            "mov {lr}, x30",
            "adr {pc}, .",
            sp = out(reg) sp,
            fp = out(reg) fp,
            lr = out(reg) lr,
            pc = out(reg) pc,
            options(nomem, nostack, preserves_flags),
        );
    }
    MachineContext {
        sp,
        fp,
        pc,
        lr,
        ..MachineContext::default()
    }
}

#[inline]
pub(crate) unsafe fn activate_context(ctx: &MachineContext) -> ! {
    unsafe { kcpu_activate_context(ctx) }
}

#[inline]
pub(crate) unsafe fn call_with_return_point(
    rp: *mut ReturnPoint,
    f: unsafe extern "C" fn(*mut c_void, *mut ReturnPoint),
    data: *mut c_void,
) -> usize {
    unsafe { kcpu_call_with_return_point(rp, f, data) }
}

#[inline]
pub(crate) unsafe fn resume_return_point(rp: *const ReturnPoint, value: usize) -> ! {
    unsafe { kcpu_resume_return_point(rp, value) }
}
