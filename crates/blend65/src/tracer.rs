//! Pass-boundary tracing infrastructure.
//!
//! The compiler is parameterized over a [`PassTracer`]; with [`NoopTracer`]
//! every hook compiles away through monomorphization, so tracing costs
//! nothing unless a caller opts in.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost no-op (production default) |
//! | [`StderrTracer`] | Human-readable pass log to stderr |
//! | [`RecordingTracer`] | Full event recording for tests and post-mortem |

use crate::diagnostics::Diagnostic;

/// Trace event emitted at pass boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A pass started over one module (or globally when `module` is `None`).
    PassStart { pass: String, module: Option<String> },
    /// The matching pass finished.
    PassEnd { pass: String, module: Option<String> },
    /// A diagnostic was recorded.
    Diagnostic { rendered: String },
    /// A named counter reported at the end of a pass.
    Statistic { name: String, value: usize },
}

/// Hook points the compiler calls while running its passes.
///
/// All methods default to no-ops, so implementations only override the hooks
/// they care about and [`NoopTracer`] needs no code at all.
pub trait PassTracer: std::fmt::Debug {
    /// Called when a pass begins. `module` is `None` for whole-program
    /// passes (layout, frames, IL).
    #[inline(always)]
    fn on_pass_start(&mut self, _pass: &str, _module: Option<&str>) {}

    /// Called when a pass completes, successfully or not.
    #[inline(always)]
    fn on_pass_end(&mut self, _pass: &str, _module: Option<&str>) {}

    /// Called for every diagnostic as it is recorded.
    #[inline(always)]
    fn on_diagnostic(&mut self, _diagnostic: &Diagnostic) {}

    /// Called with per-pass counters (symbols declared, blocks built, ...).
    #[inline(always)]
    fn on_statistic(&mut self, _name: &str, _value: usize) {}
}

/// Zero-cost tracer; all hooks compile to nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl PassTracer for NoopTracer {}

/// Prints pass boundaries and diagnostics to stderr.
#[derive(Debug, Default)]
pub struct StderrTracer {
    depth: usize,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PassTracer for StderrTracer {
    fn on_pass_start(&mut self, pass: &str, module: Option<&str>) {
        let indent = "  ".repeat(self.depth);
        match module {
            Some(module) => eprintln!("{indent}[{pass}] {module}"),
            None => eprintln!("{indent}[{pass}]"),
        }
        self.depth += 1;
    }

    fn on_pass_end(&mut self, _pass: &str, _module: Option<&str>) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn on_diagnostic(&mut self, diagnostic: &Diagnostic) {
        let indent = "  ".repeat(self.depth);
        eprintln!("{indent}{diagnostic}");
    }

    fn on_statistic(&mut self, name: &str, value: usize) {
        let indent = "  ".repeat(self.depth);
        eprintln!("{indent}{name} = {value}");
    }
}

/// Records every event for later inspection.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Names of the passes that started, in order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                TraceEvent::PassStart { pass, .. } => Some(pass.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl PassTracer for RecordingTracer {
    fn on_pass_start(&mut self, pass: &str, module: Option<&str>) {
        self.events.push(TraceEvent::PassStart {
            pass: pass.to_owned(),
            module: module.map(str::to_owned),
        });
    }

    fn on_pass_end(&mut self, pass: &str, module: Option<&str>) {
        self.events.push(TraceEvent::PassEnd {
            pass: pass.to_owned(),
            module: module.map(str::to_owned),
        });
    }

    fn on_diagnostic(&mut self, diagnostic: &Diagnostic) {
        self.events.push(TraceEvent::Diagnostic {
            rendered: diagnostic.to_string(),
        });
    }

    fn on_statistic(&mut self, name: &str, value: usize) {
        self.events.push(TraceEvent::Statistic {
            name: name.to_owned(),
            value,
        });
    }
}
