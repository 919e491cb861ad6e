//! Execution configuration for the relayout executor
//!
//! [`RelayoutConfig`] only picks *how* the executor runs; both paths write
//! bit-identical output.

/// Environment variable enabling/disabling the parallel path
pub const PARALLEL_ENV: &str = "TILEFORGE_PARALLEL";

/// Environment variable overriding the parallel size threshold
pub const PARALLEL_MIN_ELEMENTS_ENV: &str = "TILEFORGE_PARALLEL_MIN_ELEMENTS";

/// Destination size below which fan-out costs more than it saves
pub const DEFAULT_MIN_PARALLEL_ELEMENTS: usize = 1 << 16;

/// Configuration for the relayout executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayoutConfig {
    /// Fan out over `(group block, depth)` slabs with rayon
    pub parallel: bool,

    /// Destination element count below which the serial path is used
    pub min_parallel_elements: usize,
}

impl Default for RelayoutConfig {
    fn default() -> Self {
        RelayoutConfig {
            parallel: true,
            min_parallel_elements: DEFAULT_MIN_PARALLEL_ELEMENTS,
        }
    }
}

impl RelayoutConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-threaded execution regardless of size
    pub fn serial() -> Self {
        Self::default().with_parallel(false)
    }

    /// Defaults overridden by `TILEFORGE_PARALLEL` and
    /// `TILEFORGE_PARALLEL_MIN_ELEMENTS`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var(PARALLEL_ENV) {
            match parse_switch(&raw) {
                Some(parallel) => config.parallel = parallel,
                None => tracing::warn!("ignoring {}={:?}: expected on/off", PARALLEL_ENV, raw),
            }
        }

        if let Ok(raw) = std::env::var(PARALLEL_MIN_ELEMENTS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(min) => config.min_parallel_elements = min,
                Err(_) => tracing::warn!(
                    "ignoring {}={:?}: expected an element count",
                    PARALLEL_MIN_ELEMENTS_ENV,
                    raw
                ),
            }
        }

        config
    }

    /// Enable or disable the parallel path
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set the parallel size threshold
    pub fn with_min_parallel_elements(mut self, min_parallel_elements: usize) -> Self {
        self.min_parallel_elements = min_parallel_elements;
        self
    }

    /// Whether a destination of `elements` should take the parallel path
    pub fn use_parallel(&self, elements: usize) -> bool {
        self.parallel && elements >= self.min_parallel_elements
    }
}

fn parse_switch(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}
