//! Whole-pipeline integration tests
