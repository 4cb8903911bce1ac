// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Inbound stream reassembly.
//!
//! ```text
//! transport callback -> DataHandler::handle_receive -> DataStream::receive
//! polling thread     -> DataHandler::process        -> DataStream::drain -> Vec<Packet>
//! ```

pub mod data_stream;
pub mod handler;

pub use data_stream::DataStream;
pub use handler::{DataHandler, StreamKey, StreamMetrics, StreamMetricsSnapshot, StreamPackets};
