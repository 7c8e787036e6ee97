use std::sync::{Mutex, PoisonError};

use crate::{HashMap, HashSet, comps::CompMap};

/// Caps the number of comparison pairs each PC may contribute over the
/// lifetime of the limiter.
///
/// Some comparisons (loops over lookup tables, hash table lookups) produce a
/// fresh operand pair on almost every execution. Without a cap they would
/// flood the hint stage with candidates that never lead anywhere. One
/// instance is meant to be shared by all workers.
#[derive(Debug)]
pub struct HintsLimiter {
    max_attempts: usize,
    used: Mutex<HashMap<u64, usize>>,
}

impl Default for HintsLimiter {
    fn default() -> Self {
        Self::new(10)
    }
}

impl HintsLimiter {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            used: Mutex::default(),
        }
    }

    /// Number of pairs charged to `pc` so far.
    pub fn used(&self, pc: u64) -> usize {
        let used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        used.get(&pc).copied().unwrap_or(0)
    }

    /// Keeps, for every PC, only as many of its pairs (lowest first) as its
    /// remaining budget allows and charges the survivors to it. The PC is
    /// removed from all other pairs; pairs left without PCs are dropped.
    /// Returns the number of (pair, PC) entries removed.
    pub fn limit(&self, comps: &mut CompMap) -> usize {
        let mut by_pc: HashMap<u64, Vec<(u64, u64)>> = HashMap::default();
        for (observed, replacement, entry) in comps.pairs() {
            for &pc in &entry.pcs {
                by_pc.entry(pc).or_default().push((observed, replacement));
            }
        }

        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        let mut rejected: HashSet<(u64, u64, u64)> = HashSet::default();
        for (pc, mut pairs) in by_pc {
            let spent = used.entry(pc).or_default();
            let remaining = self.max_attempts.saturating_sub(*spent);
            if pairs.len() > remaining {
                pairs.sort_unstable();
                for &(observed, replacement) in &pairs[remaining..] {
                    rejected.insert((observed, replacement, pc));
                }
            }
            *spent += pairs.len().min(remaining);
        }
        drop(used);

        if !rejected.is_empty() {
            comps.retain_pcs(|observed, replacement, pc| {
                !rejected.contains(&(observed, replacement, pc))
            });
        }
        rejected.len()
    }
}
