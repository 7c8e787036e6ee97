use crate::HashSet;

/// Values the random mutators already try with high probability, replacing
/// an argument with one of them rarely adds anything.
pub const SPECIAL_INTS: &[u64] = &[
    0,
    1,
    2,
    31,
    32,
    63,
    64,
    127,
    128,
    129,
    255,
    256,
    257,
    511,
    512,
    1023,
    1024,
    1025,
    2047,
    2048,
    4095,
    4096,
    (1 << 15) - 1,
    1 << 15,
    (1 << 15) + 1,
    (1 << 16) - 1,
    1 << 16,
    (1 << 16) + 1,
    (1 << 31) - 1,
    1 << 31,
    (1 << 31) + 1,
    (1 << 32) - 1,
    1 << 32,
    (1 << 32) + 1,
    (1 << 63) - 1,
    1 << 63,
    (1 << 63) + 1,
    u64::MAX,
];

#[derive(Debug, Clone)]
pub struct SpecialInts(HashSet<u64>);

impl Default for SpecialInts {
    fn default() -> Self {
        Self::with_extra(&[])
    }
}

impl SpecialInts {
    pub fn with_extra(extra: &[u64]) -> Self {
        Self(SPECIAL_INTS.iter().chain(extra).copied().collect())
    }

    pub fn contains(&self, val: u64) -> bool {
        self.0.contains(&val)
    }
}
