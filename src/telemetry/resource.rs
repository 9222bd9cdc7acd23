use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::{SERVICE_NAME, SERVICE_VERSION};

use crate::telemetry::config::ClientConfig;

/// Option naming the reporting service
pub const SERVICE_NAME_OPTION: &str = "serviceName";

/// Option naming the reporting service's version
pub const SERVICE_VERSION_OPTION: &str = "serviceVersion";

/// Get base attributes for any resource
pub fn base_attributes(config: &ClientConfig) -> Vec<KeyValue> {
    let service_name = config
        .option_str(SERVICE_NAME_OPTION)
        .unwrap_or(env!("CARGO_PKG_NAME"))
        .to_string();
    let service_version = config
        .option_str(SERVICE_VERSION_OPTION)
        .unwrap_or(env!("CARGO_PKG_VERSION"))
        .to_string();

    vec![
        KeyValue::new(SERVICE_NAME, service_name),
        KeyValue::new(SERVICE_VERSION, service_version),
    ]
}

/// Build base resource with common attributes
pub fn build_base_resource(config: &ClientConfig) -> Resource {
    Resource::builder()
        .with_attributes(base_attributes(config))
        .build()
}

/// Build resource with base + additional attributes
pub fn build_resource(config: &ClientConfig, additional: Vec<KeyValue>) -> Resource {
    let mut attrs = base_attributes(config);
    attrs.extend(additional);
    Resource::builder().with_attributes(attrs).build()
}
