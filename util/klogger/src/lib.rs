// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! A logger that may be called from a signal handler.
//!
//! Each record is formatted into a fixed buffer on the stack and emitted with
//! `write(2)`, so logging never allocates and never takes a lock. Records
//! longer than [`LINE_CAPACITY`] are truncated. `errno` is preserved across
//! every call.
#![cfg_attr(not(test), no_std)]

extern crate log;

mod buffer;

use core::{
    ffi::c_int,
    fmt::{self, Write},
    str::FromStr,
    sync::atomic::{AtomicI32, AtomicUsize, Ordering},
};

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
pub use log::{debug, error, info, trace, warn};

pub use self::buffer::{LINE_CAPACITY, LineBuffer};

#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        let _ = $crate::print_fmt(format_args!($($arg)*));
    }}
}

#[macro_export]
macro_rules! kprintln {
    () => { $crate::kprint!("\n") };
    ($($arg:tt)*) => {{
        let _ = $crate::print_fmt(format_args!("{}\n", format_args!($($arg)*)));
    }}
}

macro_rules! color_fmt {
    ($color_code:expr, $($arg:tt)*) => {
        format_args!("\u{1B}[{}m{}\u{1B}[m", $color_code as u8, format_args!($($arg)*))
    };
}

#[repr(u8)]
#[allow(dead_code)]
enum AnsiColor {
    Black         = 30,
    Red           = 31,
    Green         = 32,
    Yellow        = 33,
    Blue          = 34,
    Magenta       = 35,
    Cyan          = 36,
    White         = 37,
    BrightBlack   = 90,
    BrightRed     = 91,
    BrightGreen   = 92,
    BrightYellow  = 93,
    BrightBlue    = 94,
    BrightMagenta = 95,
    BrightCyan    = 96,
    BrightWhite   = 97,
}

static LOG_FD: AtomicI32 = AtomicI32::new(libc::STDERR_FILENO);
// The logger's own filter: it may be injected without being the global logger.
static LOG_LEVEL: AtomicUsize = AtomicUsize::new(LevelFilter::Warn as usize);

/// The logger installed by [`init_klogger`].
pub static LOGGER: KernelLogger = KernelLogger;

/// Writes whole lines to the descriptor chosen with [`set_log_fd`].
pub struct KernelLogger;

impl Log for KernelLogger {
    #[inline]
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let level = record.level();
        let line = record.line().unwrap_or(0);
        let path = record.target();
        let color = match level {
            Level::Error => AnsiColor::Red,
            Level::Warn => AnsiColor::Yellow,
            Level::Info => AnsiColor::Green,
            Level::Debug => AnsiColor::Cyan,
            Level::Trace => AnsiColor::BrightBlack,
        };
        let now = monotonic_now();

        let _ = print_fmt(format_args!(
            "{}\n",
            color_fmt!(
                AnsiColor::White,
                "[{:>3}.{:06} {tid} {path}:{line}] {args}",
                now.as_secs(),
                now.subsec_micros(),
                tid = current_tid(),
                path = path,
                line = line,
                args = color_fmt!(color, "{}", record.args()),
            )
        ));
    }

    fn flush(&self) {}
}

/// Formats `args` into one line and writes it with a single `write(2)` loop.
///
/// Output past [`LINE_CAPACITY`] bytes is replaced by a truncation mark.
pub fn print_fmt(args: fmt::Arguments) -> fmt::Result {
    let _errno = ErrnoGuard::save();
    let mut line = LineBuffer::<LINE_CAPACITY>::new();
    line.write_fmt(args)?;
    write_all(LOG_FD.load(Ordering::Relaxed), line.as_bytes());
    Ok(())
}

/// Installs [`LOGGER`] as the global logger with the `Warn` level.
pub fn init_klogger() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    set_level_filter(LevelFilter::Warn);
    Ok(())
}

/// Sets both the logger's filter and the `log` facade's maximum level.
///
/// Unknown names turn logging off.
pub fn set_log_level(level: &str) {
    let lf = LevelFilter::from_str(level)
        .ok()
        .unwrap_or(LevelFilter::Off);
    set_level_filter(lf);
}

fn set_level_filter(lf: LevelFilter) {
    LOG_LEVEL.store(lf as usize, Ordering::Relaxed);
    log::set_max_level(lf);
}

/// The level filter [`KernelLogger`] applies, independent of whether it is
/// the global logger.
pub fn log_level() -> LevelFilter {
    LevelFilter::iter()
        .nth(LOG_LEVEL.load(Ordering::Relaxed))
        .unwrap_or(LevelFilter::Off)
}

/// Redirects output to `fd`, which must stay open while logging happens.
pub fn set_log_fd(fd: c_int) {
    LOG_FD.store(fd, Ordering::Relaxed);
}

fn write_all(fd: c_int, mut bytes: &[u8]) {
    while !bytes.is_empty() {
        let n = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
        match n {
            n if n > 0 => bytes = &bytes[n as usize..],
            n if n < 0 && errno() == libc::EINTR => continue,
            _ => return,
        }
    }
}

fn monotonic_now() -> core::time::Duration {
    let mut ts: libc::timespec = unsafe { core::mem::zeroed() };
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    core::time::Duration::new(ts.tv_sec as u64, ts.tv_nsec as u32)
}

fn current_tid() -> i64 {
    cfg_if::cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "android"))] {
            unsafe { libc::syscall(libc::SYS_gettid) as i64 }
        } else {
            unsafe { libc::getpid() as i64 }
        }
    }
}

fn errno_location() -> *mut c_int {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            unsafe { libc::__errno_location() }
        } else if #[cfg(target_os = "android")] {
            unsafe { libc::__errno() }
        } else {
            unsafe { libc::__error() }
        }
    }
}

fn errno() -> c_int {
    unsafe { *errno_location() }
}

/// Restores `errno` on drop, so callers interrupted by a signal never see
/// the logger's failures.
struct ErrnoGuard(c_int);

impl ErrnoGuard {
    fn save() -> Self {
        Self(errno())
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        unsafe { *errno_location() = self.0 };
    }
}
