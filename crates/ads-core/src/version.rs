//! Push versions and response nonces.
//!
//! A [`PushVersion`] identifies a push epoch. Versions come from one
//! process-wide [`VersionAuthority`], so they strictly increase for the life
//! of the process; several resource kinds may share one version. Nonces are
//! drawn from a separate counter and are unique per response.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Version token of a push epoch.
///
/// Rendered on the wire as its decimal value. Versions received from a
/// proxy that do not parse (for example tokens issued by a previous control
/// plane process) are simply not recognised as a `PushVersion`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PushVersion(u64);

impl PushVersion {
    /// The version before any push.
    pub const INITIAL: PushVersion = PushVersion(0);

    /// Wrap a raw counter value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw counter value.
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Parse a wire `version_info`.
    #[must_use]
    pub fn parse(version_info: &str) -> Option<Self> {
        version_info.parse().ok().map(Self)
    }
}

impl fmt::Display for PushVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues push versions and response nonces.
///
/// Shared by every connection; both counters are lock-free.
///
/// # Example
///
/// ```rust
/// use ads_core::VersionAuthority;
///
/// let authority = VersionAuthority::new();
/// let version = authority.next_version();
/// assert_eq!(authority.current_version(), version);
///
/// let a = authority.next_nonce();
/// let b = authority.next_nonce();
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Default)]
pub struct VersionAuthority {
    version: AtomicU64,
    nonce: AtomicU64,
}

impl VersionAuthority {
    /// Create an authority with no versions issued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new push version, strictly greater than every version
    /// issued before.
    pub fn next_version(&self) -> PushVersion {
        PushVersion(self.version.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// The most recently issued version.
    #[must_use]
    pub fn current_version(&self) -> PushVersion {
        PushVersion(self.version.load(Ordering::Acquire))
    }

    /// Allocate a nonce for one response.
    pub fn next_nonce(&self) -> String {
        let n = self.nonce.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{n:x}")
    }
}
