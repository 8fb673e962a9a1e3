//! Record of one [`crate::patch::PatchCatalog::apply_all`] run.
//!
//! The report is an append-only log: every descriptor contributes exactly one
//! [`PatchEvent`], either applied or failed. It can be appended to through a shared
//! reference, and statistics are derived from the events rather than tracked
//! separately.
//!
//! # Example
//!
//! ```rust
//! use ilweave::patch::{PatchEvent, PatchReport};
//!
//! let report = PatchReport::new();
//! report.record(PatchEvent::Applied {
//!     patch: "door-open".into(),
//!     target: "Door::Open()".into(),
//!     before: 4,
//!     after: 15,
//! });
//! report.record(PatchEvent::Failed {
//!     patch: "round-end".into(),
//!     target: "Round::Finish()".into(),
//!     error: "Method not found: Round::Finish()".into(),
//! });
//!
//! assert_eq!(report.applied().count(), 1);
//! assert!(!report.is_clean());
//! assert_eq!(report.summary(), "1 applied, 1 failed");
//! ```

use std::fmt;

/// Outcome of one patch descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchEvent {
    /// The rewritten body was installed.
    Applied {
        /// Patch name
        patch: String,
        /// Target method
        target: String,
        /// Instruction count before the rewrite
        before: usize,
        /// Instruction count after the rewrite
        after: usize,
    },
    /// The patch was discarded; the original body stays installed.
    Failed {
        /// Patch name
        patch: String,
        /// Target method
        target: String,
        /// Rendered error
        error: String,
    },
}

impl PatchEvent {
    /// Patch name.
    #[must_use]
    pub fn patch(&self) -> &str {
        match self {
            PatchEvent::Applied { patch, .. } | PatchEvent::Failed { patch, .. } => patch,
        }
    }

    /// Target method.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            PatchEvent::Applied { target, .. } | PatchEvent::Failed { target, .. } => target,
        }
    }

    /// Returns true if this records a failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, PatchEvent::Failed { .. })
    }
}

impl fmt::Display for PatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchEvent::Applied {
                patch,
                target,
                before,
                after,
            } => write!(f, "[applied] {patch} -> {target} ({before} -> {after} instructions)"),
            PatchEvent::Failed {
                patch,
                target,
                error,
            } => write!(f, "[failed] {patch} -> {target}: {error}"),
        }
    }
}

/// Append-only log of patch outcomes.
#[derive(Debug)]
pub struct PatchReport {
    events: boxcar::Vec<PatchEvent>,
}

impl Default for PatchReport {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for PatchReport {
    fn clone(&self) -> Self {
        let report = Self::new();
        for (_, event) in &self.events {
            report.events.push(event.clone());
        }
        report
    }
}

impl PatchReport {
    /// Creates an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: boxcar::Vec::new(),
        }
    }

    /// Appends an event.
    pub fn record(&self, event: PatchEvent) {
        self.events.push(event);
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.count() == 0
    }

    /// Number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.count()
    }

    /// All events in recording order.
    pub fn iter(&self) -> impl Iterator<Item = &PatchEvent> {
        self.events.iter().map(|(_, e)| e)
    }

    /// Patches that were installed.
    pub fn applied(&self) -> impl Iterator<Item = &PatchEvent> + '_ {
        self.iter().filter(|e| !e.is_failure())
    }

    /// Patches that were discarded.
    pub fn failures(&self) -> impl Iterator<Item = &PatchEvent> + '_ {
        self.iter().filter(|e| e.is_failure())
    }

    /// Returns true if no patch failed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// The event recorded for the named patch, if any.
    #[must_use]
    pub fn find(&self, patch: &str) -> Option<&PatchEvent> {
        self.iter().find(|e| e.patch() == patch)
    }

    /// One-line summary, e.g. `"3 applied, 1 failed"`.
    #[must_use]
    pub fn summary(&self) -> String {
        let failed = self.failures().count();
        format!("{} applied, {} failed", self.len() - failed, failed)
    }
}

impl fmt::Display for PatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.summary())?;
        for event in self.iter() {
            writeln!(f, "  {event}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(patch: &str) -> PatchEvent {
        PatchEvent::Failed {
            patch: patch.into(),
            target: "T::M()".into(),
            error: "boom".into(),
        }
    }

    #[test]
    fn test_empty_report_is_clean() {
        let report = PatchReport::new();
        assert!(report.is_empty());
        assert!(report.is_clean());
        assert_eq!(report.summary(), "0 applied, 0 failed");
    }

    #[test]
    fn test_clone_and_find() {
        let report = PatchReport::new();
        report.record(failed("a"));
        let copy = report.clone();
        report.record(failed("b"));
        assert_eq!(copy.len(), 1);
        assert_eq!(report.failures().count(), 2);
        assert_eq!(report.find("b").map(PatchEvent::target), Some("T::M()"));
        assert!(report.to_string().contains("[failed] a -> T::M(): boom"));
    }
}
