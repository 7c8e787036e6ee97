use std::collections::BTreeSet;

use super::{Hinter, special::SpecialInts};
use crate::{comps::CompMap, prog::ConstArg};

pub(crate) fn mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1 << bits) - 1 }
}

/// Sign-extends the low `bits` of `val` to 64 bits.
pub(crate) fn sign_extend(val: u64, bits: u32) -> u64 {
    if bits >= 64 {
        return val;
    }
    if val & (1 << (bits - 1)) == 0 {
        val & mask(bits)
    } else {
        val | !mask(bits)
    }
}

/// Returns the low `bits` of `val` if `val` is their zero- or sign-extended
/// 64-bit form, i.e. if nothing is lost by storing `val` in `bits` bits.
pub(crate) fn fit(val: u64, bits: u32) -> Option<u64> {
    let lo = val & mask(bits);
    (val == lo || val == sign_extend(lo, bits)).then_some(lo)
}

/// Replacement candidates for an integer of `bit_size` bits holding `v`.
///
/// The executor widens every comparison operand to 64 bits (sign-extending
/// signed ones), and the kernel may compare any truncation of the argument,
/// or a sign-extension of it. Each view of `v` is looked up in `comps` and a
/// replacement is spliced back into the bytes the view covers. Replacements
/// the view cannot hold, special ints and `v` itself are skipped.
/// The result is sorted and free of duplicates.
pub(crate) fn shrink_expand(
    v: u64,
    comps: &CompMap,
    bit_size: u32,
    specials: &SpecialInts,
) -> Vec<u64> {
    assert!(
        (1..=64).contains(&bit_size),
        "bad integer width {bit_size}"
    );
    let v = v & mask(bit_size);
    let mut replacers = BTreeSet::new();
    let mut lookup = |key: u64, size: u32| {
        for new in comps.replacements(key) {
            if fit(new, bit_size).is_none() {
                continue;
            }
            let Some(lo) = fit(new, size) else {
                continue;
            };
            if specials.contains(lo) {
                continue;
            }
            let replacer = ((v & !mask(size)) | lo) & mask(bit_size);
            if replacer != v {
                replacers.insert(replacer);
            }
        }
    };
    // truncations: (u8)v, (u16)v, ...
    for width in [8u32, 4, 2, 1] {
        let size = width * 8;
        lookup(v & mask(size), size);
    }
    // sign-extensions of negative truncations
    for width in [4u32, 2, 1] {
        let size = (width * 8).min(bit_size);
        if v & (1 << (size - 1)) == 0 {
            continue;
        }
        lookup(v | !mask(size), size);
    }
    replacers.into_iter().collect()
}

impl Hinter<'_> {
    /// Calls `exec` once per replacement with `arg` holding it, in ascending
    /// order. `arg` is restored before returning. Returns false if `exec`
    /// asked to stop.
    pub fn check_const_arg(
        &self,
        arg: &mut ConstArg,
        mut exec: impl FnMut(&ConstArg) -> bool,
    ) -> bool {
        let original = arg.val;
        let mut do_more = true;
        for replacer in shrink_expand(original, self.comps, arg.bit_size(), &self.specials) {
            arg.val = replacer;
            if !exec(arg) {
                do_more = false;
                break;
            }
        }
        arg.val = original;
        do_more
    }
}
