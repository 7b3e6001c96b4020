//! Realtime sync integration tests.

mod catalog_tests;
mod connection_tests;
mod notification_tests;
mod scenario_tests;
