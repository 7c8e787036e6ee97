//! Comparison hints: candidate programs derived from the operands the kernel
//! compared an argument against.

mod data;
mod int;
mod limiter;
mod opts;
mod special;

pub use limiter::HintsLimiter;
pub use opts::{FlagBool, HintsOpts, parse_int};
pub use special::{SPECIAL_INTS, SpecialInts};

use crate::{
    comps::CompMap,
    prog::{Arg, ArgPath, BufferKind, Call, ConstKind, Dir, Program},
};

/// Generates replacement values for single arguments from one call's
/// comparison map.
pub struct Hinter<'a> {
    comps: &'a CompMap,
    specials: SpecialInts,
    opts: &'a HintsOpts,
}

impl<'a> Hinter<'a> {
    pub fn new(comps: &'a CompMap, opts: &'a HintsOpts) -> Self {
        Self {
            comps,
            specials: SpecialInts::with_extra(&opts.special_int),
            opts,
        }
    }

    /// Calls `exec` with every hinted variant of the leaf argument `arg`.
    /// Pointers and groups produce nothing themselves. `arg` is left as it
    /// was. Returns false if `exec` asked to stop.
    pub fn generate_hints(&self, arg: &mut Arg, exec: &mut dyn FnMut(&Arg) -> bool) -> bool {
        if arg.dir() == Dir::Out {
            return true;
        }
        match arg {
            Arg::Const(a) => {
                if a.kind != ConstKind::Int || a.bit_size() <= self.opts.min_int_bits {
                    return true;
                }
                self.check_const_arg(a, |a| exec(&Arg::Const(a.clone())))
            }
            Arg::Data(a) => {
                if matches!(
                    a.kind,
                    BufferKind::Filename | BufferKind::String { fixed_values: true }
                ) {
                    return true;
                }
                if a.data.len() <= self.opts.min_data_len {
                    return true;
                }
                self.check_data_arg(a, |a| exec(&Arg::Data(a.clone())))
            }
            Arg::Pointer(_) | Arg::Group(_) => true,
        }
    }
}

/// Paths of the scalars and buffers reachable from `call`, in visiting order.
pub(crate) fn leaf_paths(call: &Call) -> Vec<ArgPath> {
    let mut res = Vec::new();
    call.foreach_arg(|arg, path| {
        if matches!(arg, Arg::Const(_) | Arg::Data(_)) {
            res.push(path.to_vec());
        }
        true
    });
    res
}

impl Program {
    /// Runs `exec` on every program that differs from `self` in one argument
    /// of call `call_index`, the argument taking a value it was compared
    /// against during execution. Candidates failing validation are dropped.
    /// Returns false if `exec` asked to stop.
    pub fn mutate_with_hints(
        &self,
        call_index: usize,
        comps: &CompMap,
        opts: &HintsOpts,
        mut exec: impl FnMut(Program) -> bool,
    ) -> bool {
        assert!(
            call_index < self.calls.len(),
            "call index {call_index} out of range ({} calls)",
            self.calls.len()
        );
        let call = &self.calls[call_index];
        let hinter = Hinter::new(comps, opts);
        for path in leaf_paths(call) {
            let Some(mut scratch) = call.arg(&path).cloned() else {
                continue;
            };
            let do_more = hinter.generate_hints(&mut scratch, &mut |candidate| {
                let mut p = self.clone();
                if let Some(slot) = p.calls[call_index].arg_mut(&path) {
                    *slot = candidate.clone();
                }
                if let Err(err) = p.validate() {
                    if opts.verbose {
                        eprintln!("[HINTS] dropping invalid candidate: {err:#}");
                    }
                    return true;
                }
                exec(p)
            });
            if !do_more {
                return false;
            }
        }
        true
    }
}
