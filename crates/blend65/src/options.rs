//! Compile options handed in by the front-end.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Optimization level, mirroring the CLI's `-O` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, EnumString, Serialize, Deserialize)]
pub enum OptLevel {
    O0,
    O1,
    O2,
    O3,
}

/// Options that shape analysis and IL generation.
///
/// The analyzer thresholds carry the defaults the hint analyzer and loop
/// analyzer were tuned with; front-ends may override any of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileOptions {
    pub opt_level: OptLevel,
    /// Record source locations on every IL instruction for source-map output.
    pub emit_source_maps: bool,
    /// Master switch for the optimization analyses (loops, alias, hints).
    pub enable_optimizations: bool,
    /// Loops with a known iteration count in `1..=max_unroll` become unroll
    /// candidates.
    pub max_unroll: u32,
    /// Per-nesting-level multiplier applied to accesses inside loop bodies
    /// when scoring zero-page candidates.
    pub loop_access_multiplier: u32,
    /// Minimum weighted access count before a symbol is even considered for
    /// zero page.
    pub min_zero_page_access_count: u32,
    /// Functions at or under this IL instruction estimate are inline
    /// candidates.
    pub max_inline_instructions: usize,
    /// Byte budget the zero-page recommendation list may fill.
    pub zero_page_hint_budget: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            opt_level: OptLevel::O1,
            emit_source_maps: true,
            enable_optimizations: true,
            max_unroll: 8,
            loop_access_multiplier: 10,
            min_zero_page_access_count: 3,
            max_inline_instructions: 20,
            zero_page_hint_budget: 128,
        }
    }
}

impl CompileOptions {
    /// Whether the optimization analyses should run at all.
    #[must_use]
    pub fn optimize(&self) -> bool {
        self.enable_optimizations && self.opt_level > OptLevel::O0
    }
}
