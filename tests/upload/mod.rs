// Upload pipeline tests, end to end against the in-memory store

mod engine_tests;
mod fingerprint_tests;
mod select_tests;
