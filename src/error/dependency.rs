use thiserror::Error;

/// External collaborators the engine talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    /// The balance/portfolio indexer.
    Indexer,
    /// An ERC-4337 bundler endpoint.
    Bundler,
    /// A chain JSON-RPC node.
    ChainRpc,
    /// The Substrate gateway.
    Substrate,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Indexer => "indexer",
            Self::Bundler => "bundler",
            Self::ChainRpc => "chain rpc",
            Self::Substrate => "substrate gateway",
        };
        f.write_str(s)
    }
}

/// A collaborator call that failed or timed out.
///
/// Classified as transient; the message always names which dependency failed.
#[derive(Debug, Error)]
#[error("{dependency} unavailable: {reason}")]
pub struct DependencyError {
    /// Which collaborator failed.
    pub dependency: Dependency,
    /// The underlying failure, stringified for transport across the boundary.
    pub reason: String,
}

impl DependencyError {
    /// A timeout talking to `dependency`.
    pub fn timeout(dependency: Dependency) -> Self {
        Self { dependency, reason: "request timed out".into() }
    }

    /// Wraps an arbitrary transport failure.
    pub fn new(dependency: Dependency, reason: impl Into<String>) -> Self {
        Self { dependency, reason: reason.into() }
    }
}
