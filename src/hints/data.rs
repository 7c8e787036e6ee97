use std::{cmp::Ordering, ops::Range};

use super::{
    Hinter,
    int::{fit, mask},
};
use crate::prog::DataArg;

fn read_le(window: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..window.len()].copy_from_slice(window);
    u64::from_le_bytes(buf)
}

fn swap_int(val: u64, width: usize) -> u64 {
    val.swap_bytes() >> (64 - width * 8)
}

/// The window value itself and, for negative little-endian values, the
/// sign-extended form the executor reports.
fn lookup_keys(val: u64, bits: u32, sign_extend: bool) -> impl Iterator<Item = u64> {
    let negative = sign_extend && bits < 64 && val & (1 << (bits - 1)) != 0;
    [Some(val), negative.then(|| val | !mask(bits))]
        .into_iter()
        .flatten()
}

/// One window of a buffer overwritten with `width` bytes of `bytes`.
#[derive(Debug, Clone, Copy)]
struct Patch {
    off: usize,
    width: usize,
    bytes: [u8; 8],
}

impl Patch {
    fn range(&self) -> Range<usize> {
        self.off..self.off + self.width
    }

    fn byte_at(&self, data: &[u8], idx: usize) -> u8 {
        if self.range().contains(&idx) {
            self.bytes[idx - self.off]
        } else {
            data[idx]
        }
    }

    /// Orders patches by the buffers they produce from `data`. Only the bytes
    /// covered by either patch can differ.
    fn cmp_applied(&self, other: &Patch, data: &[u8]) -> Ordering {
        let start = self.off.min(other.off);
        let end = self.range().end.max(other.range().end);
        (start..end)
            .map(|idx| self.byte_at(data, idx).cmp(&other.byte_at(data, idx)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl Hinter<'_> {
    /// Calls `exec` once per distinct mutated buffer with `arg` holding it,
    /// in ascending byte order. The original bytes are restored before
    /// returning. Returns false if `exec` asked to stop.
    pub fn check_data_arg(&self, arg: &mut DataArg, mut exec: impl FnMut(&DataArg) -> bool) -> bool {
        let mut patches = if arg.is_structured() {
            self.structured_patches(&arg.data)
        } else {
            self.blob_patches(&arg.data)
        };
        patches.sort_by(|a, b| a.cmp_applied(b, &arg.data));
        patches.dedup_by(|a, b| a.cmp_applied(b, &arg.data).is_eq());

        for patch in patches {
            let mut saved = [0u8; 8];
            saved[..patch.width].copy_from_slice(&arg.data[patch.range()]);
            arg.data[patch.range()].copy_from_slice(&patch.bytes[..patch.width]);
            let do_more = exec(arg);
            arg.data[patch.range()].copy_from_slice(&saved[..patch.width]);
            if !do_more {
                return false;
            }
        }
        true
    }

    fn blob_patches(&self, data: &[u8]) -> Vec<Patch> {
        let mut res = Vec::new();
        let scan = data.len().min(self.opts.max_data_scan);
        for width in [1, 2, 4, 8] {
            for off in 0..scan {
                if off + width > data.len() {
                    break;
                }
                self.replace_window(data, off, width, false, &mut res);
            }
        }
        res
    }

    // Structured buffers can be huge (disk images), so only element aligned
    // 4/8-byte values are considered. That's enough for magics and checksums.
    // All-zero and all-ones windows are far too common there to be useful.
    fn structured_patches(&self, data: &[u8]) -> Vec<Patch> {
        let mut res = Vec::new();
        let allow_special = *self.opts.structured_special_ints;
        for width in [4, 8] {
            for off in (0..data.len()).step_by(width) {
                if off + width > data.len() {
                    break;
                }
                let val = read_le(&data[off..off + width]);
                if val == 0 || val == mask(width as u32 * 8) {
                    continue;
                }
                self.replace_window(data, off, width, allow_special, &mut res);
            }
        }
        res
    }

    /// Looks up the `width` bytes at `off` in both byte orders and records a
    /// patch for every usable replacement, written back in the byte order it
    /// matched under.
    fn replace_window(
        &self,
        data: &[u8],
        off: usize,
        width: usize,
        allow_special: bool,
        res: &mut Vec<Patch>,
    ) {
        let bits = width as u32 * 8;
        let le = read_le(&data[off..off + width]);
        for big_endian in [false, true] {
            if big_endian && width == 1 {
                continue;
            }
            let cur = if big_endian { swap_int(le, width) } else { le };
            for key in lookup_keys(cur, bits, !big_endian) {
                for new in self.comps.replacements(key) {
                    let Some(lo) = fit(new, bits) else {
                        continue;
                    };
                    if lo == cur {
                        continue;
                    }
                    let stored = if big_endian { swap_int(lo, width) } else { lo };
                    if !allow_special && self.specials.contains(stored) {
                        continue;
                    }
                    res.push(Patch {
                        off,
                        width,
                        bytes: stored.to_le_bytes(),
                    });
                }
            }
        }
    }
}
