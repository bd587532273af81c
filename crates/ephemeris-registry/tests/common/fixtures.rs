//! Test fixtures for registry integration tests.

use ephemeris_proto::{Registration, ServiceName};

/// A log instance with no dependencies.
pub fn log_instance(n: u8) -> Registration {
    Registration::new(ServiceName::Log, format!("http://10.0.0.{n}:4000"))
}

/// A payment instance with no dependencies.
pub fn payment_instance(n: u8) -> Registration {
    Registration::new(ServiceName::Payment, format!("http://10.0.2.{n}:6000"))
}

/// A web instance that follows the log role.
pub fn web_instance(n: u8) -> Registration {
    let url = format!("http://10.0.1.{n}:8080");
    Registration::new(ServiceName::Web, url.clone())
        .requires(ServiceName::Log)
        .with_update_url(format!("{url}/services"))
}

/// A web instance whose patches go to an arbitrary address.
pub fn web_instance_at(n: u8, update_url: &str) -> Registration {
    Registration::new(ServiceName::Web, format!("http://10.0.1.{n}:8080"))
        .requires(ServiceName::Log)
        .with_update_url(update_url)
}
