//! Threshold-colored gauges shown at the top of the report

use serde::Serialize;

const GREEN: &str = "#4CAF50";
const YELLOW: &str = "#FFC107";
const RED: &str = "#FF4444";

/// Whether a higher reading is healthier (`Direct`) or worse (`Inverse`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaugeDirection {
    Direct,
    Inverse,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gauge {
    pub title: String,
    pub value: f64,
    pub percentage: f64,
    pub color: &'static str,
}

impl Gauge {
    /// `value` as a share of `max`, colored against the two thresholds.
    ///
    /// For `Direct` gauges the reading is green at or above `yellow_threshold`,
    /// yellow at or above `red_threshold` and red below. `Inverse` gauges are
    /// green at or below `yellow_threshold`, yellow at or below
    /// `red_threshold` and red above.
    pub fn new(
        title: &str,
        value: f64,
        max: f64,
        direction: GaugeDirection,
        yellow_threshold: f64,
        red_threshold: f64,
    ) -> Self {
        let percentage = if max > 0.0 {
            (value / max * 100.0).clamp(0.0, 100.0)
        } else {
            0.0
        };

        let color = match direction {
            GaugeDirection::Direct if percentage >= yellow_threshold => GREEN,
            GaugeDirection::Direct if percentage >= red_threshold => YELLOW,
            GaugeDirection::Direct => RED,
            GaugeDirection::Inverse if percentage <= yellow_threshold => GREEN,
            GaugeDirection::Inverse if percentage <= red_threshold => YELLOW,
            GaugeDirection::Inverse => RED,
        };

        Self {
            title: title.to_string(),
            value,
            percentage,
            color,
        }
    }

    /// Gauge over a value that already is a percentage
    pub fn percent(title: &str, percentage: f64, direction: GaugeDirection, yellow: f64, red: f64) -> Self {
        Self::new(title, percentage, 100.0, direction, yellow, red)
    }
}
