//! Core type definitions
//!
//! Storage policy identifiers, the "policy or sentinel" selector used at the
//! request boundary, backend timeouts and object metadata.

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Object metadata as stored alongside an object on the backend
pub type ObjectMetadata = BTreeMap<String, String>;

/// Storage policy index
///
/// Index `0` is the default policy, used whenever a caller does not name one.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, Display,
    From, Into,
)]
#[display("{_0}")]
pub struct PolicyIndex(u32);

impl PolicyIndex {
    /// The default policy (index 0)
    pub const DEFAULT: Self = Self(0);

    /// Create a policy index
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw index
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether this is the default policy
    #[must_use]
    pub const fn is_default(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Debug for PolicyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PolicyIndex({})", self.0)
    }
}

/// Error returned when a policy index cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid storage policy index: {0:?}")]
pub struct PolicyIndexError(pub String);

impl FromStr for PolicyIndex {
    type Err = PolicyIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| PolicyIndexError(s.to_string()))
    }
}

/// Policy selector as received from a caller
///
/// Older callers do not send a policy at all; those requests are served by
/// the default policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PolicySelector {
    /// No policy supplied
    #[default]
    Unspecified,
    /// An explicit policy index
    Index(PolicyIndex),
}

impl PolicySelector {
    /// Resolve to a concrete index, mapping `Unspecified` to the default policy
    #[must_use]
    pub const fn normalize(self) -> PolicyIndex {
        match self {
            Self::Unspecified => PolicyIndex::DEFAULT,
            Self::Index(index) => index,
        }
    }
}

impl From<PolicyIndex> for PolicySelector {
    fn from(index: PolicyIndex) -> Self {
        Self::Index(index)
    }
}

impl From<Option<PolicyIndex>> for PolicySelector {
    fn from(index: Option<PolicyIndex>) -> Self {
        index.map_or(Self::Unspecified, Self::Index)
    }
}

/// Connection and read timeouts used to build every backend client
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BackendTimeouts {
    /// Bound on establishing a connection to an endpoint
    pub connect: Duration,
    /// Bound on receiving a response once connected
    pub read: Duration,
}

impl BackendTimeouts {
    /// Default connection timeout for sproxyd endpoints
    pub const DEFAULT_CONNECT: Duration = Duration::from_secs(10);
    /// Default read timeout for sproxyd endpoints
    pub const DEFAULT_READ: Duration = Duration::from_secs(3);

    #[must_use]
    pub const fn new(connect: Duration, read: Duration) -> Self {
        Self { connect, read }
    }
}

impl Default for BackendTimeouts {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CONNECT, Self::DEFAULT_READ)
    }
}
