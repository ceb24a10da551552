// SPDX-FileCopyrightText: 2025 Semiotic AI, Inc.
//
// SPDX-License-Identifier: Apache-2.0

//! Observability and tracing utilities.
//!
//! The library emits `tracing` events and spans but never installs a
//! subscriber; that is the application's job.

pub(crate) mod spans;

// Note: All span functions are internal (pub(crate)) and not re-exported
