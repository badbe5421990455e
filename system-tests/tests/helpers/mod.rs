// system-tests/tests/helpers/mod.rs
// ============================================================================
// Module: System Test Helpers
// Description: Shared helpers for Yggdrasil system-tests.
// Purpose: Provide the platform stub, harness wiring, and artifact utilities.
// Dependencies: system-tests, yggdrasil-harness
// ============================================================================

//! ## Overview
//! Shared helpers for Yggdrasil system-tests.
//! Invariants:
//! - Every stub binds loopback on an ephemeral port.
//! - Artifacts are written even when a test panics.

#![allow(dead_code, reason = "Shared helpers are reused across multiple test suites.")]

pub mod harness;
pub mod platform_stub;
pub mod readiness;
