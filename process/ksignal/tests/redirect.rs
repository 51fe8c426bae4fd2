// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Relocates real signals onto the interrupted stack.
//!
//! Workers run in signal context, so they only record what they see in
//! atomics; the assertions happen after the handler returned.
#![cfg(all(
    target_os = "linux",
    any(target_arch = "x86_64", target_arch = "aarch64")
))]

use std::{
    ffi::{c_int, c_void},
    ptr,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
    },
};

use backtrace::{Frame, FrameWalker, HostArch};
use kcpu::{Landing, ReturnPoint};
use ksignal::{FaultContext, RelocationPlan, Relocator, SignalInfo, SyntheticFrame, UContext};

const ALT_STACK_SIZE: usize = 64 * 1024;

// Signal dispositions and the observations below are process wide.
static SERIAL: Mutex<()> = Mutex::new(());

static SIGNO: AtomicUsize = AtomicUsize::new(0);
static INFO_SIGNO: AtomicUsize = AtomicUsize::new(0);
static FAULT_SP: AtomicUsize = AtomicUsize::new(0);
static WORKER_LOCAL: AtomicUsize = AtomicUsize::new(0);
static FRAME_MATCHES: AtomicBool = AtomicBool::new(false);
static WALK_MATCHES: AtomicBool = AtomicBool::new(false);
static LANDED: AtomicUsize = AtomicUsize::new(0);

static OUTER_FRAME: AtomicUsize = AtomicUsize::new(0);
static INNER_FRAME: AtomicUsize = AtomicUsize::new(0);
static INNER_FAULT_SP: AtomicUsize = AtomicUsize::new(0);
static INNER_LANDED: AtomicUsize = AtomicUsize::new(0);
static INNER_ALT_STACK: AtomicUsize = AtomicUsize::new(0);

type Handler = extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void);

struct AltStack {
    mem: Vec<u8>,
}

impl AltStack {
    fn new() -> Self {
        Self {
            mem: vec![0; ALT_STACK_SIZE],
        }
    }

    fn base(&mut self) -> usize {
        self.mem.as_mut_ptr() as usize
    }
}

fn set_alt_stack(base: usize) -> c_int {
    let ss = libc::stack_t {
        ss_sp: base as *mut c_void,
        ss_flags: 0,
        ss_size: ALT_STACK_SIZE,
    };
    unsafe { libc::sigaltstack(&ss, ptr::null_mut()) }
}

fn disable_alt_stack() {
    let ss = libc::stack_t {
        ss_sp: ptr::null_mut(),
        ss_flags: libc::SS_DISABLE,
        ss_size: 0,
    };
    assert_eq!(unsafe { libc::sigaltstack(&ss, ptr::null_mut()) }, 0);
}

fn install_handler(signo: c_int, handler: Handler) {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = handler as usize;
    action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
    unsafe { libc::sigemptyset(&mut action.sa_mask) };
    assert_eq!(unsafe { libc::sigaction(signo, &action, ptr::null_mut()) }, 0);
}

fn restore_default(signo: c_int) {
    let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
    action.sa_sigaction = libc::SIG_DFL;
    assert_eq!(unsafe { libc::sigaction(signo, &action, ptr::null_mut()) }, 0);
}

/// Frame address the relocation picked for the fault described by `context`.
fn observe_frame(context: *mut c_void) -> Option<(usize, usize)> {
    let fault = unsafe { UContext::from_raw(context) }?;
    let plan = RelocationPlan::new(&fault).ok()?;
    Some((fault.stack_pointer(), plan.frame_addr().as_usize()))
}

unsafe extern "C" fn worker(
    signo: c_int,
    info: *mut libc::siginfo_t,
    context: *mut c_void,
    continuation: *mut c_void,
) -> ! {
    let local = 0u64;
    WORKER_LOCAL.store(&raw const local as usize, SeqCst);
    SIGNO.store(signo as usize, SeqCst);
    let info_signo = unsafe { SignalInfo::from_raw(info) }.map_or(0, |info| info.signo());
    INFO_SIGNO.store(info_signo as usize, SeqCst);

    if let Some(fault) = unsafe { UContext::from_raw(context) } {
        FAULT_SP.store(fault.stack_pointer(), SeqCst);
        if let Ok(plan) = RelocationPlan::new(&fault) {
            let expected = SyntheticFrame {
                fp: fault.frame_pointer(),
                pc: fault.program_counter(),
            };
            let record = unsafe { plan.frame_addr().as_ptr_of::<SyntheticFrame>().read() };
            FRAME_MATCHES.store(record == expected, SeqCst);

            let first = unsafe { FrameWalker::<HostArch>::new(plan.frame_addr().as_usize()) }
                .with_max_depth(1)
                .next();
            WALK_MATCHES.store(
                first
                    == Some(Frame {
                        fp: expected.fp,
                        pc: expected.pc,
                    }),
                SeqCst,
            );
        }
    }
    unsafe { kcpu::resume(continuation.cast::<ReturnPoint>(), 7) }
}

extern "C" fn on_signal(signo: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    let relocator = Relocator::new(worker).with_logger(&klogger::LOGGER);
    let landing = kcpu::with_return_point(|rp| unsafe {
        relocator.relocate(signo, info, context, rp.cast())
    });
    if let Landing::Resumed(value) = landing {
        LANDED.store(value.get(), SeqCst);
    }
}

#[test]
fn relocates_onto_interrupted_stack() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let _ = env_logger::builder().is_test(true).try_init();

    let mut alt = AltStack::new();
    assert_eq!(set_alt_stack(alt.base()), 0);
    install_handler(libc::SIGUSR1, on_signal);
    LANDED.store(0, SeqCst);

    assert_eq!(unsafe { libc::raise(libc::SIGUSR1) }, 0);

    restore_default(libc::SIGUSR1);
    disable_alt_stack();

    assert_eq!(LANDED.load(SeqCst), 7);
    assert_eq!(SIGNO.load(SeqCst), libc::SIGUSR1 as usize);
    assert_eq!(INFO_SIGNO.load(SeqCst), libc::SIGUSR1 as usize);
    assert!(FRAME_MATCHES.load(SeqCst));
    assert!(WALK_MATCHES.load(SeqCst));

    let fault_sp = FAULT_SP.load(SeqCst);
    let local = WORKER_LOCAL.load(SeqCst);
    assert_eq!(fault_sp % 8, 0);
    assert!(local < fault_sp - 128);
    assert!(fault_sp - local < ALT_STACK_SIZE);
    log::info!("worker ran {} bytes below the fault", fault_sp - local);
}

unsafe extern "C" fn inner_worker(
    _signo: c_int,
    _info: *mut libc::siginfo_t,
    context: *mut c_void,
    continuation: *mut c_void,
) -> ! {
    if let Some((sp, frame)) = observe_frame(context) {
        INNER_FAULT_SP.store(sp, SeqCst);
        INNER_FRAME.store(frame, SeqCst);
    }
    unsafe { kcpu::resume(continuation.cast::<ReturnPoint>(), 9) }
}

unsafe extern "C" fn outer_worker(
    _signo: c_int,
    _info: *mut libc::siginfo_t,
    context: *mut c_void,
    continuation: *mut c_void,
) -> ! {
    if let Some((_, frame)) = observe_frame(context) {
        OUTER_FRAME.store(frame, SeqCst);
    }
    // The outer handler's frames still live on the first alternate stack.
    if set_alt_stack(INNER_ALT_STACK.load(SeqCst)) == 0 {
        unsafe { libc::raise(libc::SIGUSR2) };
    }
    unsafe { kcpu::resume(continuation.cast::<ReturnPoint>(), 7) }
}

extern "C" fn on_outer_signal(signo: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    let landing = kcpu::with_return_point(|rp| unsafe {
        ksignal::relocate(signo, info, context, rp.cast(), outer_worker)
    });
    if let Landing::Resumed(value) = landing {
        LANDED.store(value.get(), SeqCst);
    }
}

extern "C" fn on_inner_signal(signo: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    let landing = kcpu::with_return_point(|rp| unsafe {
        ksignal::relocate(signo, info, context, rp.cast(), inner_worker)
    });
    if let Landing::Resumed(value) = landing {
        INNER_LANDED.store(value.get(), SeqCst);
    }
}

#[test]
fn nested_relocation_stays_below_active_frame() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());

    let (mut outer_alt, mut inner_alt) = (AltStack::new(), AltStack::new());
    INNER_ALT_STACK.store(inner_alt.base(), SeqCst);
    assert_eq!(set_alt_stack(outer_alt.base()), 0);
    install_handler(libc::SIGUSR1, on_outer_signal);
    install_handler(libc::SIGUSR2, on_inner_signal);
    LANDED.store(0, SeqCst);
    INNER_LANDED.store(0, SeqCst);

    assert_eq!(unsafe { libc::raise(libc::SIGUSR1) }, 0);

    restore_default(libc::SIGUSR2);
    restore_default(libc::SIGUSR1);
    disable_alt_stack();

    assert_eq!(LANDED.load(SeqCst), 7);
    assert_eq!(INNER_LANDED.load(SeqCst), 9);
    let outer = OUTER_FRAME.load(SeqCst);
    let inner = INNER_FRAME.load(SeqCst);
    assert_ne!(outer, 0);
    assert!(INNER_FAULT_SP.load(SeqCst) <= outer);
    assert!(inner < outer);
}

fn skew_stack_pointer(uc: &mut libc::ucontext_t) {
    #[cfg(target_arch = "x86_64")]
    {
        uc.uc_mcontext.gregs[libc::REG_RSP as usize] += 4;
    }
    #[cfg(target_arch = "aarch64")]
    {
        uc.uc_mcontext.sp += 4;
    }
}

extern "C" fn on_signal_misaligned(signo: c_int, info: *mut libc::siginfo_t, context: *mut c_void) {
    if let Some(uc) = unsafe { context.cast::<libc::ucontext_t>().as_mut() } {
        skew_stack_pointer(uc);
    }
    let relocator = Relocator::new(worker).with_logger(&klogger::LOGGER);
    unsafe { relocator.relocate(signo, info, context, ptr::null_mut()) }
}

extern "C" fn on_signal_null_context(signo: c_int, info: *mut libc::siginfo_t, _: *mut c_void) {
    let relocator = Relocator::new(worker).with_logger(&klogger::LOGGER);
    unsafe { relocator.relocate(signo, info, ptr::null_mut(), ptr::null_mut()) }
}

/// Raises `SIGUSR1` in a forked child handled by `handler`, and returns the
/// child's wait status with everything it logged.
fn run_in_child(handler: Handler) -> (c_int, String) {
    let mut alt = AltStack::new();
    let base = alt.base();
    let mut fds = [0 as c_int; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let (rd, wr) = (fds[0], fds[1]);

    let pid = unsafe { libc::fork() };
    assert!(pid >= 0);
    if pid == 0 {
        // Only async-signal-safe calls from here on.
        unsafe { libc::close(rd) };
        klogger::set_log_fd(wr);
        if set_alt_stack(base) == 0 {
            let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
            action.sa_sigaction = handler as usize;
            action.sa_flags = libc::SA_SIGINFO | libc::SA_ONSTACK;
            unsafe {
                libc::sigemptyset(&mut action.sa_mask);
                libc::sigaction(libc::SIGUSR1, &action, ptr::null_mut());
                libc::raise(libc::SIGUSR1);
            }
        }
        unsafe { libc::_exit(0) }
    }

    unsafe { libc::close(wr) };
    let mut status = 0;
    assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);

    let mut logged = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = unsafe { libc::read(rd, buf.as_mut_ptr().cast(), buf.len()) };
        if n <= 0 {
            break;
        }
        logged.extend_from_slice(&buf[..n as usize]);
    }
    unsafe { libc::close(rd) };
    (status, String::from_utf8_lossy(&logged).into_owned())
}

fn assert_aborted(status: c_int) {
    assert!(libc::WIFSIGNALED(status), "child exited with status {status:#x}");
    assert_eq!(libc::WTERMSIG(status), libc::SIGABRT);
}

#[test]
fn misaligned_fault_stack_aborts() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let (status, logged) = run_in_child(on_signal_misaligned);
    assert_aborted(status);
    assert!(logged.contains("is not word aligned"), "{logged:?}");
}

#[test]
fn null_context_aborts() {
    let _serial = SERIAL.lock().unwrap_or_else(|e| e.into_inner());
    let (status, logged) = run_in_child(on_signal_null_context);
    assert_aborted(status);
    assert!(logged.contains("signal context pointer is null"), "{logged:?}");
}
