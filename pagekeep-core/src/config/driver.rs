//! Driver wait policies

/// Default bound for the erase and pre-program busy waits (milliseconds)
pub const DEFAULT_BUSY_TIMEOUT: u32 = 1000;

/// How to wait for a program operation to commit
///
/// A stuck erase can be abandoned before any data is touched, but once the
/// second half of a word is on the bus there is no safe way to report the
/// outcome without knowing it. [`CommitWait::Unbounded`] hangs instead of
/// returning a false success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommitWait {
    /// Spin until busy clears, forever if needed
    #[default]
    Unbounded,
    /// Give up after this many status polls and report `CommitTimeout`
    Bounded {
        /// Maximum number of status reads
        polls: u32,
    },
}

/// Runtime driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriverConfig {
    /// Bound passed to the wait primitive before a busy flag is re-checked
    pub busy_timeout: u32,
    /// Policy for the post-program completion wait
    pub commit_wait: CommitWait,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            commit_wait: CommitWait::Unbounded,
        }
    }
}

impl DriverConfig {
    /// Configuration for host tests: commit wait gives up instead of hanging
    pub const fn bounded(polls: u32) -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            commit_wait: CommitWait::Bounded { polls },
        }
    }
}
