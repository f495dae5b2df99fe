//! Unit tests for the task relay core.

mod domain_tests;
mod row_tests;
mod support;
