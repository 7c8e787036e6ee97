//! Comparison-guided argument mutation for syscall programs.
//!
//! Executed programs report every comparison operand pair seen in the kernel
//! together with the PC of the comparison. [`hints`] turns those pairs into
//! candidate programs that replace one argument (or one window of a buffer)
//! with the value it was compared against.

pub mod comps;
pub mod hints;
pub mod prog;

pub(crate) use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

pub use comps::{CmpRecord, CompMap, ExecTrace};
pub use hints::{HintsLimiter, HintsOpts};
pub use prog::{Arg, Call, Program};

#[cfg(test)]
mod tests;
