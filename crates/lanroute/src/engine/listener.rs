// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Application hooks.

use crate::protocol::{DataMessage, DiscoveryMessage};
use crate::routing::Route;
use crate::transport::NetworkInfo;

/// Receives node events on the polling thread.
///
/// Every method defaults to a no-op so implementors only override what they
/// need. Callbacks run inside [`Node::poll`](super::Node::poll) and should
/// not block.
pub trait NodeListener: Send + Sync {
    /// A route identifier was seen for the first time.
    fn on_new_route(&self, _route: &Route) {}

    /// A route's online flag flipped; `was_online` is the previous value.
    fn on_route_liveness_changed(&self, _route: &Route, _was_online: bool) {}

    /// A discovery message was decoded (after route ingestion).
    fn on_discovery_message(&self, _message: &DiscoveryMessage, _info: &NetworkInfo) {}

    /// A data message was decoded.
    fn on_data_message(&self, _message: &DataMessage, _info: &NetworkInfo) {}
}

/// Listener that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl NodeListener for NullListener {}
