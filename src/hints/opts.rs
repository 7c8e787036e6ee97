use std::{ops::Deref, str::FromStr};

use clap::Parser;

#[derive(Debug, Parser, Clone)]
pub struct HintsOpts {
    // Window start offsets of unstructured buffers are limited to this prefix.
    #[clap(long, default_value = "100")]
    pub max_data_scan: usize,
    // Integers this narrow (in bits) are left to random mutation.
    #[clap(long, default_value = "8")]
    pub min_int_bits: u32,
    // Buffers this short (in bytes) are left to random mutation.
    #[clap(long, default_value = "3")]
    pub min_data_len: usize,
    // Per-PC candidate budget of the limiter.
    #[clap(long, default_value = "10")]
    pub max_hints_per_pc: usize,
    // Structured buffers are too large to stumble upon special ints by chance.
    #[clap(long, default_value = "true")]
    pub structured_special_ints: FlagBool,
    // Extra values to treat as special ints, e.g. --special-int 0x10,0xfffe
    #[clap(long, value_delimiter = ',', value_parser = parse_int)]
    pub special_int: Vec<u64>,
    #[clap(long)]
    pub verbose: bool,
}

impl Default for HintsOpts {
    fn default() -> Self {
        Self::parse_from(vec!["cmphints"])
    }
}

// https://github.com/clap-rs/clap/issues/1649
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlagBool(bool);
impl FromStr for FlagBool {
    type Err = <bool as FromStr>::Err;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
impl Deref for FlagBool {
    type Target = bool;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl From<bool> for FlagBool {
    fn from(val: bool) -> Self {
        Self(val)
    }
}

/// `clap` argument parser that accepts both `0x1f` and `31`
pub fn parse_int(val: &str) -> Result<u64, std::num::ParseIntError> {
    let val = val.trim().to_lowercase();
    match val.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => val.parse::<u64>(),
    }
}
