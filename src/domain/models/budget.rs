//! Memory budgets and the decay sequence that sweeps them.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const MEGABYTE: u64 = 1024 * 1024;

/// A ceiling on resident memory for one sweep step, or no ceiling at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBudget {
    /// No ceiling is applied. Every sweep starts here.
    Unlimited,
    /// A hard ceiling in bytes, enforced on the whole process group.
    Bytes(u64),
}

impl MemoryBudget {
    /// The value the memory-limiting launcher consumes for `MemoryHigh=`.
    pub fn launcher_value(&self) -> String {
        match self {
            Self::Unlimited => "infinity".to_string(),
            Self::Bytes(n) => n.to_string(),
        }
    }

    /// Human-readable label used in directory and artifact names.
    /// Binary prefixes, no spaces: `1.9GiB`, `476.8MiB`, `nolimit`.
    pub fn label(&self) -> String {
        match self {
            Self::Unlimited => "nolimit".to_string(),
            Self::Bytes(n) => format_binary(*n),
        }
    }

    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Bytes(_))
    }
}

impl fmt::Display for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Format a byte count with binary prefixes, one decimal place, no space.
/// Sub-KiB counts spell the unit out (`500Bytes`), matching the naming of
/// existing artifact trees.
fn format_binary(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        let unit = if bytes == 1 { "Byte" } else { "Bytes" };
        return format!("{bytes}{unit}");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}

/// Generate the ordered budget sequence for one sweep.
///
/// Element 0 is always [`MemoryBudget::Unlimited`]; element 1 is `start`;
/// every later element is the previous one multiplied by `rate` and
/// truncated toward zero. Length is exactly `steps` (`0` gives an empty
/// sequence). Rates outside `(0, 1)` are accepted; supplying a sane rate is
/// the caller's job.
pub fn decay(start: u64, rate: f64, steps: usize) -> Vec<MemoryBudget> {
    let mut seq = Vec::with_capacity(steps);
    if steps == 0 {
        return seq;
    }
    seq.push(MemoryBudget::Unlimited);
    let mut current = start;
    for _ in 1..steps {
        seq.push(MemoryBudget::Bytes(current));
        current = (current as f64 * rate) as u64;
    }
    seq
}
