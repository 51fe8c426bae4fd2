// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

use core::fmt;

/// Size of the line buffer used for every record.
pub const LINE_CAPACITY: usize = 512;

const TRUNCATION_MARK: &[u8] = b"\x1b[m...\n";

/// Fixed-capacity formatting target living on the stack.
///
/// Writes never fail: bytes that do not fit are dropped and the tail of the
/// buffer is replaced with a truncation mark when the line is read back.
pub struct LineBuffer<const N: usize> {
    buf: [u8; N],
    len: usize,
    truncated: bool,
}

impl<const N: usize> LineBuffer<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0; N],
            len: 0,
            truncated: false,
        }
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// The formatted bytes, ending with the truncation mark if anything was
    /// dropped.
    pub fn as_bytes(&mut self) -> &[u8] {
        if self.truncated && N >= TRUNCATION_MARK.len() {
            let start = N - TRUNCATION_MARK.len();
            self.buf[start..].copy_from_slice(TRUNCATION_MARK);
            self.len = N;
        }
        &self.buf[..self.len]
    }
}

impl<const N: usize> Default for LineBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Write for LineBuffer<N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let room = N - self.len;
        let take = s.len().min(room);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        if take < s.len() {
            self.truncated = true;
        }
        Ok(())
    }
}
