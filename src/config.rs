//! Framework configuration types.
//!
//! Configuration is organized into three structures aggregated by
//! [`FrameworkConfig`]:
//!
//! - [`DispatchConfig`] - Runtime dispatch behavior (reentrancy cut-off, slow-subscriber warnings)
//! - [`PatchConfig`] - Load-time patch application (stack verification, panic isolation)
//! - [`ExecutionLimits`] - Limits of the reference host interpreter
//!
//! # Configuration Presets
//!
//! - [`FrameworkConfig::strict()`] - Reentrancy forbidden, every verification enabled, tight limits
//! - [`FrameworkConfig::permissive()`] - Deep reentrancy, no slow-subscriber warnings, loose limits
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use ilweave::config::{DispatchConfig, FrameworkConfig};
//!
//! let config = FrameworkConfig {
//!     dispatch: DispatchConfig::new()
//!         .with_max_reentrancy(2)
//!         .with_slow_subscriber_threshold(Some(Duration::from_millis(5))),
//!     ..FrameworkConfig::default()
//! };
//! assert_eq!(config.dispatch.max_reentrancy, 2);
//! ```

use std::time::Duration;

/// Top-level configuration container.
#[derive(Clone, Debug, Default)]
pub struct FrameworkConfig {
    /// Runtime dispatch settings.
    pub dispatch: DispatchConfig,
    /// Load-time patch settings.
    pub patch: PatchConfig,
    /// Reference host limits.
    pub limits: ExecutionLimits,
}

impl FrameworkConfig {
    /// Creates a configuration where reentrant dispatch is forbidden and every
    /// load-time check runs.
    ///
    /// # Settings
    ///
    /// - **Reentrancy**: none (a subscriber re-raising the same kind is skipped)
    /// - **Slow subscriber warning**: 10 ms
    /// - **Stack verification**: enabled
    /// - **Instruction limit**: 100 000
    #[must_use]
    pub fn strict() -> Self {
        Self {
            dispatch: DispatchConfig {
                max_reentrancy: 1,
                slow_subscriber_threshold: Some(Duration::from_millis(10)),
            },
            patch: PatchConfig {
                verify_stack: true,
                isolate_panics: true,
            },
            limits: ExecutionLimits {
                max_instructions: 100_000,
                max_call_depth: 32,
                ..Default::default()
            },
        }
    }

    /// Creates a configuration for trusted plugin sets.
    ///
    /// # Settings
    ///
    /// - **Reentrancy**: 16 nested dispatches per kind
    /// - **Slow subscriber warning**: disabled
    /// - **Stack verification**: disabled
    /// - **Instruction limit**: 10 million
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            dispatch: DispatchConfig {
                max_reentrancy: 16,
                slow_subscriber_threshold: None,
            },
            patch: PatchConfig {
                verify_stack: false,
                isolate_panics: true,
            },
            limits: ExecutionLimits {
                max_instructions: 10_000_000,
                max_call_depth: 256,
                max_stack: 4096,
            },
        }
    }
}

/// Runtime dispatch behavior.
///
/// # Default Values
///
/// - `max_reentrancy`: 4
/// - `slow_subscriber_threshold`: 50 ms
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Maximum number of simultaneously active dispatches of one event kind on one
    /// thread. A dispatch that would exceed it is skipped and the event value left
    /// untouched. 1 forbids reentrancy entirely; 0 disables dispatch.
    pub max_reentrancy: usize,
    /// Subscribers running longer than this are reported with a warning. `None`
    /// disables the timing.
    pub slow_subscriber_threshold: Option<Duration>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_reentrancy: 4,
            slow_subscriber_threshold: Some(Duration::from_millis(50)),
        }
    }
}

impl DispatchConfig {
    /// Creates the default dispatch configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reentrancy cut-off.
    #[must_use]
    pub fn with_max_reentrancy(mut self, max: usize) -> Self {
        self.max_reentrancy = max;
        self
    }

    /// Sets the slow-subscriber threshold.
    #[must_use]
    pub fn with_slow_subscriber_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_subscriber_threshold = threshold;
        self
    }
}

/// Load-time patch application behavior.
///
/// # Default Values
///
/// - `verify_stack`: true
/// - `isolate_panics`: true
#[derive(Clone, Debug)]
pub struct PatchConfig {
    /// Run stack-depth verification on every rewritten body before installing it.
    pub verify_stack: bool,
    /// Catch transpiler panics and report them as failures of that patch.
    pub isolate_panics: bool,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            verify_stack: true,
            isolate_panics: true,
        }
    }
}

impl PatchConfig {
    /// Creates the default patch configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables stack verification.
    #[must_use]
    pub fn with_verify_stack(mut self, enabled: bool) -> Self {
        self.verify_stack = enabled;
        self
    }

    /// Enables or disables panic isolation.
    #[must_use]
    pub fn with_isolate_panics(mut self, enabled: bool) -> Self {
        self.isolate_panics = enabled;
        self
    }
}

/// Limits of the reference host interpreter.
///
/// # Default Values
///
/// - `max_instructions`: 1 million per top-level invocation
/// - `max_call_depth`: 64
/// - `max_stack`: 1024 values per frame
#[derive(Clone, Debug)]
pub struct ExecutionLimits {
    /// Instructions executed per top-level invocation (0 for unlimited).
    pub max_instructions: u64,
    /// Nested body invocations.
    pub max_call_depth: usize,
    /// Evaluation stack values per frame.
    pub max_stack: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_instructions: 1_000_000,
            max_call_depth: 64,
            max_stack: 1024,
        }
    }
}

impl ExecutionLimits {
    /// Creates the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum instruction count.
    #[must_use]
    pub fn with_max_instructions(mut self, max: u64) -> Self {
        self.max_instructions = max;
        self
    }

    /// Sets the maximum call depth.
    #[must_use]
    pub fn with_max_call_depth(mut self, max: usize) -> Self {
        self.max_call_depth = max;
        self
    }

    /// Sets the maximum evaluation stack size.
    #[must_use]
    pub fn with_max_stack(mut self, max: usize) -> Self {
        self.max_stack = max;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_differ_from_default() {
        let strict = FrameworkConfig::strict();
        assert_eq!(strict.dispatch.max_reentrancy, 1);
        assert!(strict.patch.verify_stack);

        let permissive = FrameworkConfig::permissive();
        assert!(permissive.dispatch.slow_subscriber_threshold.is_none());
        assert!(!permissive.patch.verify_stack);

        let default = FrameworkConfig::default();
        assert_eq!(default.dispatch.max_reentrancy, 4);
        assert_eq!(default.limits.max_instructions, 1_000_000);
    }

    #[test]
    fn test_builders_chain() {
        let limits = ExecutionLimits::new()
            .with_max_instructions(10)
            .with_max_call_depth(2)
            .with_max_stack(8);
        assert_eq!(limits.max_instructions, 10);
        assert_eq!(limits.max_call_depth, 2);
        assert_eq!(limits.max_stack, 8);

        let patch = PatchConfig::new().with_verify_stack(false).with_isolate_panics(false);
        assert!(!patch.verify_stack && !patch.isolate_panics);
    }
}
