// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Unit tests for memaddr

#![cfg(test)]

use crate::{StackAddr, aligned_to, floor_align};

#[test]
fn test_align_helpers() {
    assert_eq!(floor_align(0x1238, 16), 0x1230);
    assert_eq!(floor_align(0x1230, 16), 0x1230);
    assert!(aligned_to(0x1238, 8));
    assert!(!aligned_to(0x1238, 16));
}

#[test]
fn test_stack_addr_alignment() {
    let sp = StackAddr::from_usize(0x7fff_f000_0108);
    assert!(sp.is_aligned(8));
    assert!(!sp.is_aligned(16));
    assert_eq!(sp.align_down(16).as_usize(), 0x7fff_f000_0100);
    assert_eq!(StackAddr::from(0x40usize).align_down(16), StackAddr::from_usize(0x40));
}

#[test]
fn test_stack_addr_checked_sub() {
    let sp = StackAddr::from_usize(0x80);
    assert_eq!(sp.checked_sub(0x80), Some(StackAddr::from_usize(0)));
    assert_eq!(sp.checked_sub(0x81), None);
    assert_eq!(usize::from(sp.checked_sub(0x10).unwrap()), 0x70);
}

#[test]
fn test_stack_addr_format() {
    let sp = StackAddr::from_usize(0xdead0);
    assert_eq!(format!("{sp:?}"), "SA:0xdead0");
    assert_eq!(format!("{sp:#x}"), "0xdead0");
}
