//! Integration tests for the QA crawler
//!
//! These tests use wiremock to stand up a control and an experimental host
//! and exercise the crawl and retry cycle end to end.

mod common;
mod executor_tests;
mod retry_tests;
