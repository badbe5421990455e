// system-tests/src/lib.rs
// ============================================================================
// Module: Yggdrasil System Tests Library
// Description: Shared configuration for end-to-end harness scenarios.
// Purpose: Give every system-test binary the same run root, timeout, and seed.
// Dependencies: std
// ============================================================================

//! ## Overview
//! This crate hosts shared configuration used by the system-test binaries in
//! `system-tests/tests`. The binaries start an in-process stub of the whole
//! platform and run the harness suites against it.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
