// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Core building blocks shared by the protocol layers.

/// Byte buffer and codec error type.
pub mod ser;
