use std::fmt;

/// a temperature/humidity pair reported by a radio sensor node
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    /// temperature in celsius
    pub temperature: f64,
    /// relative humidity (0-100%)
    pub humidity: f64,
}

/// free-form alert text, from the radio or from POST /alert
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertText(String);

impl AlertText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlertText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// a successfully decoded radio frame
#[derive(Clone, Debug, PartialEq)]
pub enum RadioPayload {
    Sensor(SensorReading),
    Alert(AlertText),
}

/// what the dashboard shows: the latest good item of each kind
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashboardSnapshot {
    pub latest_alert: Option<AlertText>,
    pub latest_sensor: Option<SensorReading>,
}
