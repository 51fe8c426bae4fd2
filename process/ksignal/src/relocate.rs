// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Moving the faulting thread onto the worker.
use core::{
    ffi::{c_int, c_void},
    fmt,
};

use kcpu::MachineContext;
use log::{Level, Log, Record};

use crate::{FaultContext, RelocateError, RelocationPlan, UContext};

/// Entry point of the routine a fault is relocated to.
///
/// Receives the signal number, the `siginfo_t`, the `ucontext_t` and the
/// continuation passed to [`relocate`]. The worker must leave through its
/// continuation: the address it would return to traps.
pub type SignalWorker =
    unsafe extern "C" fn(c_int, *mut libc::siginfo_t, *mut c_void, *mut c_void) -> !;

/// Relocates signal handlers onto a [`SignalWorker`].
#[derive(Clone, Copy)]
pub struct Relocator<'a> {
    worker: SignalWorker,
    log: Option<&'a dyn Log>,
}

impl<'a> Relocator<'a> {
    pub const fn new(worker: SignalWorker) -> Self {
        Self { worker, log: None }
    }

    /// Reports through `log`, which must be safe to call from a signal
    /// handler.
    pub const fn with_logger(mut self, log: &'a dyn Log) -> Self {
        self.log = Some(log);
        self
    }

    pub fn worker(&self) -> SignalWorker {
        self.worker
    }

    /// Writes the synthetic frame for `fault` and returns the context that
    /// starts the worker, without activating it.
    ///
    /// Nothing is written when planning fails.
    ///
    /// # Safety
    ///
    /// The stack below `fault`'s stack pointer, past the red zone, must be
    /// writable and must not hold live data.
    pub unsafe fn prepare(
        &self,
        signo: c_int,
        info: *mut libc::siginfo_t,
        fault: &impl FaultContext,
        context: *mut c_void,
        continuation: *mut c_void,
    ) -> Result<MachineContext, RelocateError> {
        let plan = RelocationPlan::new(fault)?;
        unsafe { plan.write_frame() };

        let site = plan.return_site();
        self.report(
            Level::Debug,
            format_args!(
                "signal {signo}: fault sp {:#x} pc {:#x} -> worker sp {:#x} via {}",
                plan.fault_sp(),
                plan.frame().pc,
                plan.frame_addr(),
                site.name(),
            ),
        );
        Ok(plan.machine_context(
            self.worker as usize,
            site.address(),
            [
                signo as usize,
                info as usize,
                context as usize,
                continuation as usize,
            ],
        ))
    }

    /// Starts the worker on the faulting stack. Never returns.
    ///
    /// Aborts the process when the fault context cannot be relocated.
    ///
    /// # Safety
    ///
    /// Must be called from a signal handler with the `siginfo_t` and
    /// `ucontext_t` it received, running on an alternate signal stack
    /// (`SA_ONSTACK`): the worker's frames overwrite whatever lies below the
    /// red zone of the interrupted stack.
    pub unsafe fn relocate(
        &self,
        signo: c_int,
        info: *mut libc::siginfo_t,
        context: *mut c_void,
        continuation: *mut c_void,
    ) -> ! {
        let prepared = match unsafe { UContext::from_raw(context) } {
            Some(fault) => unsafe { self.prepare(signo, info, &fault, context, continuation) },
            None => Err(RelocateError::NullContext),
        };
        match prepared {
            Ok(ctx) => unsafe { kcpu::activate(&ctx) },
            Err(err) => {
                self.report(Level::Error, format_args!("signal {signo}: {err}"));
                unsafe { libc::abort() }
            }
        }
    }

    fn report(&self, level: Level, args: fmt::Arguments) {
        let Some(log) = self.log else {
            return;
        };
        log.log(
            &Record::builder()
                .level(level)
                .target(module_path!())
                .module_path_static(Some(module_path!()))
                .file_static(Some(file!()))
                .line(Some(line!()))
                .args(args)
                .build(),
        );
    }
}

impl fmt::Debug for Relocator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relocator")
            .field("worker", &(self.worker as usize as *const ()))
            .field("logging", &self.log.is_some())
            .finish()
    }
}

/// Relocates the interrupted thread onto `worker`; see
/// [`Relocator::relocate`].
///
/// # Safety
///
/// Same contract as [`Relocator::relocate`].
pub unsafe fn relocate(
    signo: c_int,
    info: *mut libc::siginfo_t,
    context: *mut c_void,
    continuation: *mut c_void,
    worker: SignalWorker,
) -> ! {
    unsafe { Relocator::new(worker).relocate(signo, info, context, continuation) }
}
