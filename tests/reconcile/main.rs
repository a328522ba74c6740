// Test entry point for reconciliation tests
// Local directories live in tempdirs, remotes are in-memory versioned buckets

mod common;
mod transfer_tests;
