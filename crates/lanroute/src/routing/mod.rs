// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Route propagation.
//!
//! Discovery messages build a per-adapter table of routes to every node the
//! network has reported. Each route carries a frozen jump path whose sum is
//! its cost; the table is re-advertised with split horizon by the scheduler.

pub mod manager;
pub mod types;

pub use manager::RouteManager;
pub use types::{NodeIdentifier, Route, RouteEvent, RouteIdentifier, RouteStatus};

use std::fmt;
use std::net::Ipv4Addr;

use crate::adapter::AdapterId;

/// Route table errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    /// No adapter owns the local address a message arrived on.
    UnknownAdapter(Ipv4Addr),
    /// Adapter id not present in the current adapter set.
    UnknownAdapterId(AdapterId),
    /// No online route to the node.
    NoRoute(NodeIdentifier),
    /// The node is online only behind a relay, which does not forward data.
    NotDirect(NodeIdentifier),
}

impl fmt::Display for RouteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::UnknownAdapter(address) => {
                write!(f, "no adapter owns local address {}", address)
            }
            RouteError::UnknownAdapterId(id) => write!(f, "unknown adapter {}", id),
            RouteError::NoRoute(node) => write!(f, "no online route to node {}", node),
            RouteError::NotDirect(node) => {
                write!(f, "node {} is reachable only through a relay", node)
            }
        }
    }
}

impl std::error::Error for RouteError {}

pub type RouteResult<T> = std::result::Result<T, RouteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RouteError::NoRoute(NodeIdentifier::new(4, Ipv4Addr::new(10, 0, 0, 4)));
        assert_eq!(err.to_string(), "no online route to node 4@10.0.0.4");
        let err = RouteError::UnknownAdapter(Ipv4Addr::new(10, 0, 0, 1));
        assert!(err.to_string().contains("10.0.0.1"));
        let err = RouteError::NotDirect(NodeIdentifier::new(5, Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(err.to_string(), "node 5@10.0.0.5 is reachable only through a relay");
    }
}
