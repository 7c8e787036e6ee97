use serde::{Deserialize, Serialize};
use speedy::{Readable, Writable};

use crate::{HashMap, HashSet};

/// A single comparison reported by the executor: `observed` was compared
/// against `replacement` at `pc`.
#[derive(
    Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize, Deserialize, Readable, Writable,
)]
pub struct CmpRecord {
    pub pc: u64,
    pub observed: u64,
    pub replacement: u64,
    pub assignable: bool,
}

/// Comparison records of one program execution, one list per call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Readable, Writable)]
pub struct ExecTrace {
    pub calls: Vec<Vec<CmpRecord>>,
}

impl ExecTrace {
    pub fn comps(&self, call: usize) -> CompMap {
        self.calls
            .get(call)
            .map(|records| CompMap::from_records(records.iter().copied()))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CompEntry {
    pub(crate) pcs: HashSet<u64>,
    pub(crate) assignable: bool,
}

/// observed operand -> replacement operand -> PCs of the comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompMap {
    inner: HashMap<u64, HashMap<u64, CompEntry>>,
}

impl CompMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = CmpRecord>) -> Self {
        let mut res = Self::new();
        for rec in records {
            res.insert(rec.pc, rec.observed, rec.replacement, rec.assignable);
        }
        res
    }

    /// Records that `observed` was compared against `replacement` at `pc`.
    /// Non-assignable pairs are kept (they take part in intersection and
    /// limiting) but are never offered as replacements.
    pub fn insert(&mut self, pc: u64, observed: u64, replacement: u64, assignable: bool) {
        let entry = self
            .inner
            .entry(observed)
            .or_default()
            .entry(replacement)
            .or_default();
        entry.pcs.insert(pc);
        entry.assignable |= assignable;
    }

    /// Records a raw comparison `op1 <cmp> op2`. Unless `op2` is a constant in
    /// the kernel code either operand may stem from the program, so the
    /// reversed pair is recorded as well.
    pub fn add_comparison(&mut self, pc: u64, op1: u64, op2: u64, is_const: bool) {
        self.insert(pc, op1, op2, true);
        if !is_const {
            self.insert(pc, op2, op1, true);
        }
    }

    /// Values `observed` was compared against that may be substituted for it.
    pub fn replacements(&self, observed: u64) -> impl Iterator<Item = u64> + '_ {
        self.inner
            .get(&observed)
            .into_iter()
            .flat_map(|nested| nested.iter())
            .filter(|(_, entry)| entry.assignable)
            .map(|(&replacement, _)| replacement)
    }

    pub fn pcs(&self, observed: u64, replacement: u64) -> Option<&HashSet<u64>> {
        self.inner
            .get(&observed)
            .and_then(|nested| nested.get(&replacement))
            .map(|entry| &entry.pcs)
    }

    pub(crate) fn pairs(&self) -> impl Iterator<Item = (u64, u64, &CompEntry)> {
        self.inner.iter().flat_map(|(&observed, nested)| {
            nested
                .iter()
                .map(move |(&replacement, entry)| (observed, replacement, entry))
        })
    }

    /// Number of (observed, replacement) pairs.
    pub fn len(&self) -> usize {
        self.inner.values().map(|nested| nested.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Number of pairs citing each PC.
    pub fn per_pc_count(&self) -> HashMap<u64, usize> {
        let mut res = HashMap::default();
        for (_, _, entry) in self.pairs() {
            for &pc in &entry.pcs {
                *res.entry(pc).or_default() += 1;
            }
        }
        res
    }

    /// Keeps only pairs seen in both maps, each with the PCs seen in both.
    pub fn inplace_intersect(&mut self, other: &CompMap) {
        self.inner.retain(|observed, nested| {
            let Some(other_nested) = other.inner.get(observed) else {
                return false;
            };
            nested.retain(|replacement, entry| {
                let Some(other_entry) = other_nested.get(replacement) else {
                    return false;
                };
                entry.pcs.retain(|pc| other_entry.pcs.contains(pc));
                entry.assignable &= other_entry.assignable;
                !entry.pcs.is_empty()
            });
            !nested.is_empty()
        });
    }

    /// Drops every `pc` of a pair for which `keep` returns false, then prunes
    /// pairs without PCs and observed values without pairs.
    pub(crate) fn retain_pcs(&mut self, mut keep: impl FnMut(u64, u64, u64) -> bool) {
        self.inner.retain(|&observed, nested| {
            nested.retain(|&replacement, entry| {
                entry.pcs.retain(|&pc| keep(observed, replacement, pc));
                !entry.pcs.is_empty()
            });
            !nested.is_empty()
        });
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a map where `observed` was compared against each of `vals` at PC 1.
    pub(crate) fn comp_map(entries: &[(u64, &[u64])]) -> CompMap {
        let mut res = CompMap::new();
        for &(observed, vals) in entries {
            for &val in vals {
                res.insert(1, observed, val, true);
            }
        }
        res
    }

    fn sorted_replacements(comps: &CompMap, observed: u64) -> Vec<u64> {
        let mut res: Vec<_> = comps.replacements(observed).collect();
        res.sort_unstable();
        res
    }

    #[test]
    fn insert_collapses_duplicate_pcs() {
        let mut comps = CompMap::new();
        comps.insert(7, 0x10, 0x20, true);
        comps.insert(7, 0x10, 0x20, true);
        comps.insert(8, 0x10, 0x20, true);
        assert_eq!(comps.len(), 1);
        assert_eq!(comps.pcs(0x10, 0x20).unwrap().len(), 2);
    }

    #[test]
    fn non_assignable_pairs_are_not_replacements() {
        let mut comps = CompMap::new();
        comps.insert(1, 0x10, 0x20, false);
        comps.insert(1, 0x10, 0x30, true);
        assert_eq!(sorted_replacements(&comps, 0x10), vec![0x30]);
        assert_eq!(comps.len(), 2);

        // a later assignable sighting upgrades the pair
        comps.insert(2, 0x10, 0x20, true);
        assert_eq!(sorted_replacements(&comps, 0x10), vec![0x20, 0x30]);
    }

    #[test]
    fn add_comparison_records_both_directions() {
        let mut comps = CompMap::new();
        comps.add_comparison(1, 0xaaaa, 0xbbbb, false);
        comps.add_comparison(1, 0xcccc, 0xdddd, true);
        assert_eq!(sorted_replacements(&comps, 0xaaaa), vec![0xbbbb]);
        assert_eq!(sorted_replacements(&comps, 0xbbbb), vec![0xaaaa]);
        assert_eq!(sorted_replacements(&comps, 0xcccc), vec![0xdddd]);
        assert_eq!(sorted_replacements(&comps, 0xdddd), Vec::<u64>::new());
    }

    #[test]
    fn inplace_intersect() {
        let mut m1 = comp_map(&[
            (0xdead, &[0x1, 0x2]),
            (0xbeef, &[0x3, 0x4]),
            (0xffff, &[0x5]),
        ]);
        let m2 = comp_map(&[
            (0xdead, &[0x2]),
            (0xbeef, &[0x3, 0x6]),
            (0xeeee, &[0x6]),
        ]);
        m1.inplace_intersect(&m2);
        assert_eq!(m1, comp_map(&[(0xdead, &[0x2]), (0xbeef, &[0x3])]));
    }

    #[test]
    fn inplace_intersect_keeps_common_pcs_only() {
        let mut m1 = CompMap::new();
        m1.insert(1, 0x100, 0x200, true);
        m1.insert(2, 0x100, 0x200, true);
        m1.insert(3, 0x300, 0x400, true);
        let mut m2 = CompMap::new();
        m2.insert(2, 0x100, 0x200, true);
        m2.insert(4, 0x300, 0x400, true);
        m1.inplace_intersect(&m2);
        assert_eq!(m1.len(), 1);
        assert_eq!(
            m1.pcs(0x100, 0x200).unwrap().iter().copied().collect::<Vec<_>>(),
            vec![2]
        );
        assert!(m1.pcs(0x300, 0x400).is_none());
    }

    #[test]
    fn inplace_intersect_demotes_non_assignable() {
        let mut m1 = CompMap::new();
        m1.insert(1, 0x100, 0x200, true);
        let mut m2 = CompMap::new();
        m2.insert(1, 0x100, 0x200, false);
        m1.inplace_intersect(&m2);
        assert_eq!(m1.len(), 1);
        assert_eq!(m1.replacements(0x100).count(), 0);
    }

    #[test]
    fn per_pc_count() {
        let mut comps = CompMap::new();
        comps.insert(1000, 1, 2, true);
        comps.insert(2000, 1, 3, true);
        comps.insert(2000, 4, 5, true);
        comps.insert(1000, 4, 5, true);
        let counts = comps.per_pc_count();
        assert_eq!(counts[&1000], 2);
        assert_eq!(counts[&2000], 2);
    }

    #[test]
    fn exec_trace_comps() {
        let trace = ExecTrace {
            calls: vec![
                vec![],
                vec![CmpRecord {
                    pc: 9,
                    observed: 0x41,
                    replacement: 0x42,
                    assignable: true,
                }],
            ],
        };
        assert!(trace.comps(0).is_empty());
        assert_eq!(trace.comps(1).replacements(0x41).collect::<Vec<_>>(), vec![0x42]);
        assert!(trace.comps(5).is_empty());
    }
}
