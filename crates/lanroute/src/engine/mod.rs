// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node engine: polling, scheduling and application hooks.

pub mod listener;
pub mod node;
pub mod runner;
pub mod scheduler;

pub use listener::{NodeListener, NullListener};
pub use node::{Node, PollStats};
pub use runner::NodeRunner;
pub use scheduler::{split_discovery, DiscoveryScheduler};
