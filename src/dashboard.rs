//! ==============================================================================
//! dashboard.rs - gateway state and the html dashboard
//! ==============================================================================
//!
//! the gateway loop owns the only DashboardState. radio frames that decode
//! are recorded here; frames that fail to decode never reach it. http
//! handlers only ever see a shared reference to the snapshot.
//!
//! ==============================================================================

use crate::domain::{AlertText, DashboardSnapshot, SensorReading};

/// placeholder shown before any alert arrives
pub const NO_ALERT: &str = "No alert received";
/// placeholder for a missing sensor value
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Default)]
pub struct DashboardState {
    snapshot: DashboardSnapshot,
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sensor(&mut self, reading: SensorReading) {
        self.snapshot.latest_sensor = Some(reading);
    }

    pub fn record_alert(&mut self, alert: AlertText) {
        self.snapshot.latest_alert = Some(alert);
    }

    pub fn snapshot(&self) -> &DashboardSnapshot {
        &self.snapshot
    }
}

/// render the dashboard page for a snapshot
pub fn render_dashboard(snapshot: &DashboardSnapshot) -> String {
    let alert = snapshot
        .latest_alert
        .as_ref()
        .filter(|a| !a.as_str().is_empty())
        .map(|a| html_escape(a.as_str()))
        .unwrap_or_else(|| NO_ALERT.to_string());
    let temperature = snapshot
        .latest_sensor
        .map(|r| r.temperature.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());
    let humidity = snapshot
        .latest_sensor
        .map(|r| r.humidity.to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string());

    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>LoRa Dashboard</title></head>
<body>
<h1>🐾 LoRa Gateway Dashboard</h1>
<h2>🚨 Latest Alert:</h2>
<p>{}</p>
<h2>🌡 Sensor Data:</h2>
<p>Temperature: {} °C<br>Humidity: {} %</p>
</body>
</html>
"#,
        alert, temperature, humidity
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_dashboard_shows_placeholders() {
        let html = render_dashboard(&DashboardState::new().snapshot().clone());
        assert!(html.contains("No alert received"));
        assert!(html.contains("Temperature: N/A °C"));
        assert!(html.contains("Humidity: N/A %"));
    }

    #[test]
    fn test_latest_items_are_rendered() {
        let mut state = DashboardState::new();
        state.record_alert(AlertText::new("first"));
        state.record_alert(AlertText::new("<b>second</b>"));
        state.record_sensor(SensorReading { temperature: 21.5, humidity: 48.0 });

        let html = render_dashboard(state.snapshot());
        assert!(html.contains("&lt;b&gt;second&lt;/b&gt;"));
        assert!(!html.contains("first"));
        assert!(html.contains("Temperature: 21.5 °C"));
        assert!(html.contains("Humidity: 48 %"));
    }

    #[test]
    fn test_empty_alert_text_shows_placeholder() {
        let mut state = DashboardState::new();
        state.record_alert(AlertText::new(""));

        let html = render_dashboard(state.snapshot());
        assert!(html.contains("<p>No alert received</p>"));
    }
}
