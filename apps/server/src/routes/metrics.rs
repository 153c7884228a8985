//! Prometheus text exposition of the monitored devices' last known state

use std::fmt::Write;

use actix_web::{HttpResponse, get, web};
use lanwatch::{MonitoredDevice, Protocol};

use crate::{AppError, AppState};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[get("/metrics")]
pub async fn metrics_route(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let devices = state.store.monitored_devices().await.map_err(lanwatch::Error::Store)?;
    Ok(HttpResponse::Ok().content_type(CONTENT_TYPE).body(render(&devices)))
}

/// Render the three device gauges.
///
/// Latency is exported for ICMP devices only and status codes for HTTP
/// devices only, each when a value is known.
pub fn render(devices: &[MonitoredDevice]) -> String {
    let mut out = String::new();

    header(&mut out, "device_online", "Device online status (1 = online, 0 = offline)");
    for device in devices {
        let _ = writeln!(
            out,
            "device_online{{{},type=\"{}\"}} {}",
            labels(device),
            device.protocol,
            u8::from(device.last_alive)
        );
    }

    out.push('\n');
    header(&mut out, "device_latency_ms", "Device ping latency in milliseconds");
    for device in devices.iter().filter(|d| d.protocol == Protocol::Icmp) {
        if let Some(latency) = device.last_latency_ms {
            let _ = writeln!(out, "device_latency_ms{{{}}} {latency}", labels(device));
        }
    }

    out.push('\n');
    header(&mut out, "device_http_status_code", "HTTP status code from last check");
    for device in devices.iter().filter(|d| d.protocol == Protocol::Http) {
        if let Some(code) = device.last_status_code {
            let _ = writeln!(out, "device_http_status_code{{{}}} {code}", labels(device));
        }
    }

    out
}

fn header(out: &mut String, name: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
}

fn labels(device: &MonitoredDevice) -> String {
    format!(
        "name=\"{}\",ip=\"{}\",section=\"{}\"",
        escape(&device.name),
        escape(&device.address),
        escape(&device.section)
    )
}

/// Escape a label value: backslash, double quote and newline
fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, test as actix_test};
    use lanwatch::{CheckResult, DeviceSpec, DeviceStore, EventHub, MemoryStore};
    use std::sync::Arc;

    fn device(spec: &DeviceSpec, section: &str, result: &CheckResult) -> MonitoredDevice {
        let mut device = MonitoredDevice::registered(spec, section);
        device.apply(result);
        device
    }

    #[test]
    fn test_render_gauges() {
        let devices = vec![
            device(
                &DeviceSpec::icmp("10.0.0.1", "router"),
                "network",
                &CheckResult::new("10.0.0.1").alive(Some(4.0), None),
            ),
            device(
                &DeviceSpec::http("10.0.0.2", "nas", 5000),
                "storage",
                &CheckResult::new("10.0.0.2").rejected(503),
            ),
            device(&DeviceSpec::icmp("10.0.0.3", "printer"), "office", &CheckResult::new("10.0.0.3").failure("timeout")),
        ];

        let text = render(&devices);

        assert!(text.contains("device_online{name=\"router\",ip=\"10.0.0.1\",section=\"network\",type=\"icmp\"} 1\n"));
        assert!(text.contains("device_online{name=\"nas\",ip=\"10.0.0.2\",section=\"storage\",type=\"http\"} 0\n"));
        assert!(text.contains("device_latency_ms{name=\"router\",ip=\"10.0.0.1\",section=\"network\"} 4\n"));
        assert!(text.contains("device_http_status_code{name=\"nas\",ip=\"10.0.0.2\",section=\"storage\"} 503\n"));
        // No latency for a silent device, no status code for ICMP
        assert!(!text.contains("device_latency_ms{name=\"printer\""));
        assert_eq!(text.matches("device_http_status_code{").count(), 1);
        assert_eq!(text.matches("# TYPE").count(), 3);
    }

    #[test]
    fn test_label_escaping() {
        assert_eq!(escape(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(escape("a\\b"), "a\\\\b");
        assert_eq!(escape("two\nlines"), "two\\nlines");
    }

    #[actix_web::test]
    async fn test_metrics_route() {
        let store = Arc::new(MemoryStore::new());
        store.upsert_monitored_device(&DeviceSpec::icmp("10.0.0.1", "router"), "network").await.unwrap();

        let state = web::Data::new(AppState::new(store, EventHub::default()));
        let app = actix_test::init_service(App::new().app_data(state).service(metrics_route)).await;
        let resp = actix_test::call_service(&app, actix_test::TestRequest::get().uri("/metrics").to_request()).await;

        assert!(resp.status().is_success());
        let body = actix_test::read_body(resp).await;
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains("device_online{name=\"router\",ip=\"10.0.0.1\",section=\"network\",type=\"icmp\"} 0"));
    }
}
