//! The `service.app` reference convention every lifecycle task resolves
//! its `name` argument through, matching the original's repeated
//! `if '.' in name: service_name, app_name = name.split('.')` idiom.

use mcloud_shared::{McloudError, McloudResult};

/// `name` is either a bare application name, or `service.app` naming one
/// service within it. Returns `(service_filter, app_name)`.
pub fn split_optional_service(name: &str) -> (Option<String>, String) {
    match name.split_once('.') {
        Some((service, app)) => (Some(service.to_string()), app.to_string()),
        None => (None, name.to_string()),
    }
}

/// `name` must be `service.app`, as required by tasks (`logs`, `run`,
/// `inspect`) that always operate on exactly one service.
pub fn split_required_service(name: &str) -> McloudResult<(String, String)> {
    name.split_once('.')
        .map(|(service, app)| (service.to_string(), app.to_string()))
        .ok_or_else(|| McloudError::ValueError(format!("expected `service.app`, got `{name}`")))
}

/// True when a service named `qualified` (`"{service}.{app}"`) should be
/// included given an optional service-name filter.
pub fn qualifies(service_filter: Option<&str>, app_name: &str, qualified: &str) -> bool {
    match service_filter {
        None => true,
        Some(filter) => qualified == format!("{filter}.{app_name}"),
    }
}
