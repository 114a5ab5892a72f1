pub mod token_counter;
pub mod usage;

use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::Resource;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let level = log_level.to_uppercase();

    if level == "DISABLED" {
        return;
    }

    let tracing_level = match level.as_str() {
        "WARNING" => "WARN",
        "CRITICAL" => "ERROR",
        other => other,
    };

    let filter = EnvFilter::try_new(tracing_level).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Install the global meter provider backed by an OTLP metric exporter.
///
/// The telemetry sink is addressed through the Application Insights style
/// connection string; its `IngestionEndpoint` field becomes the exporter
/// endpoint. Without a connection string the global meter stays a no-op
/// and usage reporting degrades to structured log events only.
///
/// Returns the provider so the caller can keep it alive for the process
/// lifetime. Never fails the process: telemetry is fail-open.
pub fn init_metrics(telemetry: &TelemetryConfig) -> Option<SdkMeterProvider> {
    let Some(connection_string) = telemetry.connection_string.as_deref() else {
        tracing::warn!("no telemetry connection string configured; usage metrics are not exported");
        return None;
    };

    let Some(endpoint) = ingestion_endpoint(connection_string) else {
        tracing::warn!("telemetry connection string has no IngestionEndpoint; metrics disabled");
        return None;
    };

    let exporter = match opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_endpoint(format!("{endpoint}/v1/metrics"))
        .build()
    {
        Ok(exporter) => exporter,
        Err(err) => {
            tracing::warn!("failed to build metric exporter: {err}; metrics disabled");
            return None;
        }
    };

    let reader = PeriodicReader::builder(exporter, opentelemetry_sdk::runtime::Tokio).build();
    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(Resource::new([KeyValue::new(
            "service.name",
            telemetry.service_name.clone(),
        )]))
        .build();
    opentelemetry::global::set_meter_provider(provider.clone());

    tracing::info!("usage metrics exporting to {endpoint}");
    Some(provider)
}

/// Extract the `IngestionEndpoint` field from a `key=value;key=value`
/// connection string, without its trailing slash.
#[must_use]
pub fn ingestion_endpoint(connection_string: &str) -> Option<String> {
    connection_string.split(';').find_map(|field| {
        let (key, value) = field.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("IngestionEndpoint") {
            let value = value.trim().trim_end_matches('/');
            if value.is_empty() {
                return None;
            }
            return Some(value.to_string());
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingestion_endpoint_extracted() {
        let cs = "InstrumentationKey=00000000-0000-0000-0000-000000000000;\
                  IngestionEndpoint=https://westeurope-5.in.applicationinsights.azure.com/;\
                  LiveEndpoint=https://westeurope.livediagnostics.monitor.azure.com/";
        assert_eq!(
            ingestion_endpoint(cs).as_deref(),
            Some("https://westeurope-5.in.applicationinsights.azure.com")
        );
    }

    #[test]
    fn test_ingestion_endpoint_absent() {
        assert_eq!(ingestion_endpoint("InstrumentationKey=abc"), None);
        assert_eq!(ingestion_endpoint(""), None);
        assert_eq!(ingestion_endpoint("IngestionEndpoint="), None);
    }
}
