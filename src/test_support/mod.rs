//! Fakes shared by unit tests.

pub mod fake_host;
pub mod fake_transport;
pub mod socket_guard;
