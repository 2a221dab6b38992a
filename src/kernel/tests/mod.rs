// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Synchronization Test Suite
//!
//! Scenario tests that drive the server through its request handlers.
//! Unit tests live next to the code they cover.
//!
//! # Organization
//!
//! - [`fixture`] - Server, process and wait helpers
//! - [`mutex_tests`] - Ownership, recursion and named-create scenarios
//! - [`abandon_tests`] - Owner termination on both paths
//! - [`wait_tests`] - Multi-object waits, events and semaphores
//! - [`inproc_tests`] - Device-backed path specifics

pub mod fixture;
