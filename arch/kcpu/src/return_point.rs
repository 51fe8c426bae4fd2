// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Return points: a way back into a call that is still on the stack.
//!
//! [`with_return_point`] runs a closure with a [`ReturnPoint`] describing its
//! own frame. Any code running below it, even on another stack reached
//! through [`activate`](crate::activate), may call [`resume`] to abandon
//! everything in between and make `with_return_point` return.
use core::{ffi::c_void, marker::PhantomData, mem::ManuallyDrop, num::NonZeroUsize};

/// Saved location of an active [`with_return_point`] call.
#[repr(C)]
#[derive(Debug)]
pub struct ReturnPoint {
    pub(crate) sp: usize,
    _not_send: PhantomData<*mut ()>,
}

/// How a [`with_return_point`] call came back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    /// The closure returned normally.
    Returned,
    /// [`resume`] was called with the given value.
    Resumed(NonZeroUsize),
}

unsafe extern "C" fn call_closure<F>(data: *mut c_void, rp: *mut ReturnPoint)
where
    F: FnOnce(*mut ReturnPoint),
{
    let f = unsafe { data.cast::<F>().read() };
    f(rp);
}

/// Runs `f` with a return point that leads back to this call.
///
/// Frames abandoned by [`resume`] are not unwound: destructors owned by `f`
/// or by anything it called do not run.
pub fn with_return_point<F>(f: F) -> Landing
where
    F: FnOnce(*mut ReturnPoint),
{
    let mut f = ManuallyDrop::new(f);
    let mut rp = ReturnPoint {
        sp: 0,
        _not_send: PhantomData,
    };
    let data = (&mut *f as *mut F).cast::<c_void>();
    let raw = unsafe { crate::arch::call_with_return_point(&mut rp, call_closure::<F>, data) };
    match NonZeroUsize::new(raw) {
        None => Landing::Returned,
        Some(value) => Landing::Resumed(value),
    }
}

/// Leaves the current execution and returns `value` from the
/// [`with_return_point`] call that produced `rp`.
///
/// A `value` of zero is delivered as one.
///
/// # Safety
///
/// The `with_return_point` call owning `rp` must still be active on the
/// current thread. Frames between here and there are discarded without
/// running destructors.
pub unsafe fn resume(rp: *const ReturnPoint, value: usize) -> ! {
    unsafe { crate::arch::resume_return_point(rp, value.max(1)) }
}
