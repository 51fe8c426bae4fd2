// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! x86_64 context activation and return points.
use core::{arch::asm, ffi::c_void, mem::offset_of};

use crate::{MachineContext, ReturnPoint};

core::arch::global_asm!(
    "
.section .text
.balign 16
.global kcpu_activate_context
.type kcpu_activate_context, @function
kcpu_activate_context:
    mov rsp, [rdi + {sp}]
    mov rbp, [rdi + {fp}]
    mov rax, [rdi + {pc}]
    push qword ptr [rdi + {lr}]
    mov rsi, [rdi + {arg1}]
    mov rdx, [rdi + {arg2}]
    mov rcx, [rdi + {arg3}]
    mov rdi, [rdi + {arg0}]
    jmp rax
.size kcpu_activate_context, . - kcpu_activate_context

.balign 16
.global kcpu_call_with_return_point
.type kcpu_call_with_return_point, @function
kcpu_call_with_return_point:
    .cfi_startproc
    push rbp
    .cfi_def_cfa_offset 16
    .cfi_offset rbp, -16
    mov rbp, rsp
    .cfi_def_cfa_register rbp
    push rbx
    push r12
    push r13
    push r14
    push r15
    .cfi_offset rbx, -24
    .cfi_offset r12, -32
    .cfi_offset r13, -40
    .cfi_offset r14, -48
    .cfi_offset r15, -56
    sub rsp, 8
    mov [rdi + {rp_sp}], rsp
    mov rax, rsi
    mov rsi, rdi
    mov rdi, rdx
    call rax
    xor eax, eax
.Lkcpu_return_point_restore:
    add rsp, 8
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    pop rbp
    .cfi_def_cfa rsp, 8
    ret
    .cfi_endproc
.size kcpu_call_with_return_point, . - kcpu_call_with_return_point

.balign 16
.global kcpu_resume_return_point
.type kcpu_resume_return_point, @function
kcpu_resume_return_point:
    mov rax, rsi
    mov rsp, [rdi + {rp_sp}]
    jmp .Lkcpu_return_point_restore
.size kcpu_resume_return_point, . - kcpu_resume_return_point
",
    sp = const offset_of!(MachineContext, sp),
    fp = const offset_of!(MachineContext, fp),
    pc = const offset_of!(MachineContext, pc),
    lr = const offset_of!(MachineContext, lr),
    arg0 = const offset_of!(MachineContext, args),
    arg1 = const offset_of!(MachineContext, args) + 8,
    arg2 = const offset_of!(MachineContext, args) + 16,
    arg3 = const offset_of!(MachineContext, args) + 24,
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
    let (sp, fp, pc): (usize, usize, usize);
    unsafe {
        asm!(
            "mov {sp}, rsp",
            "mov {fp}, rbp",
            "lea {pc}, [rip]",
            sp = out(reg) sp,
            fp = out(reg) fp,
            pc = out(reg) pc,
            options(nomem, nostack, preserves_flags),
        );
    }
    MachineContext {
        sp,
        fp,
        pc,
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
