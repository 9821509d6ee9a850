use serde::Serialize;

use crate::{CrowdLevel, Ledger};

/// Hours of the day, `[start, end)`, where offices are usually busiest.
const PEAK_WINDOWS: [(u32, u32); 2] = [(10, 12), (14, 16)];
const FORECAST_HOURS: u32 = 3;

const RUSH_ALERT: &str = "Unusual rush detected. Expect delays.";
const PAUSED_ALERT: &str = "Queue is currently paused.";

/// A wait-time estimate for a department.
///
/// Everything is derived from the ledger and the hour of the day, there is no
/// model behind it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    /// Minutes until the last issued token is reached
    pub estimated_wait_time: u32,
    pub crowd_forecast: Vec<ForecastEntry>,
    pub peak_time: String,
    pub alert: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastEntry {
    pub time: String,
    pub level: CrowdLevel,
}

impl Prediction {
    /// Predicts from the current ledger state, `hour` being the local hour (0-23).
    pub fn from_ledger(ledger: &Ledger, avg_wait_per_token: u32, hour: u32) -> Self {
        let hour = hour % 24;

        let crowd_forecast = (0..FORECAST_HOURS)
            .map(|offset| {
                let hour = (hour + offset) % 24;

                ForecastEntry {
                    time: format_hour(hour),
                    level: forecast_level(hour),
                }
            })
            .collect();

        let alert = if ledger.pending() > CrowdLevel::HIGH_ABOVE {
            Some(RUSH_ALERT.to_string())
        } else if ledger.is_paused {
            Some(PAUSED_ALERT.to_string())
        } else {
            None
        };

        Self {
            estimated_wait_time: ledger.estimated_wait(avg_wait_per_token),
            crowd_forecast,
            peak_time: format_hour(next_peak(hour)),
            alert,
        }
    }
}

fn forecast_level(hour: u32) -> CrowdLevel {
    let in_peak = PEAK_WINDOWS
        .iter()
        .any(|&(start, end)| (start..end).contains(&hour));

    let next_to_peak = PEAK_WINDOWS
        .iter()
        .any(|&(start, end)| hour + 1 == start || hour == end);

    if in_peak {
        CrowdLevel::High
    } else if next_to_peak {
        CrowdLevel::Medium
    } else {
        CrowdLevel::Low
    }
}

/// The current hour if it is inside a peak window, otherwise the next window start.
fn next_peak(hour: u32) -> u32 {
    PEAK_WINDOWS
        .iter()
        .find_map(|&(start, end)| match hour {
            h if (start..end).contains(&h) => Some(h),
            h if h < start => Some(start),
            _ => None,
        })
        .unwrap_or(PEAK_WINDOWS[0].0)
}

fn format_hour(hour: u32) -> String {
    let suffix = if hour < 12 { "AM" } else { "PM" };
    let twelve_hour = match hour % 12 {
        0 => 12,
        h => h,
    };

    format!("{:02}:00 {}", twelve_hour, suffix)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn ledger(current_token: u32, total_tokens: u32) -> Ledger {
        let mut ledger = Ledger::new(Utc::now());
        ledger.current_token = current_token;
        ledger.total_tokens = total_tokens;
        ledger
    }

    #[test]
    fn wait_time_only_depends_on_pending() {
        for (current, total, avg) in [(0, 0, 10), (3, 9, 4), (12, 40, 7), (5, 5, 15)] {
            let prediction = Prediction::from_ledger(&ledger(current, total), avg, 9);

            assert_eq!(prediction.estimated_wait_time, (total - current) * avg);
        }
    }

    #[test]
    fn forecast_covers_three_hours() {
        let prediction = Prediction::from_ledger(&ledger(0, 0), 10, 9);

        let forecast: Vec<_> = prediction
            .crowd_forecast
            .iter()
            .map(|e| (e.time.as_str(), e.level))
            .collect();

        assert_eq!(
            forecast,
            vec![
                ("09:00 AM", CrowdLevel::Medium),
                ("10:00 AM", CrowdLevel::High),
                ("11:00 AM", CrowdLevel::High),
            ]
        );
        assert_eq!(prediction.peak_time, "10:00 AM");
    }

    #[test]
    fn forecast_wraps_around_midnight() {
        let prediction = Prediction::from_ledger(&ledger(0, 0), 10, 23);

        let times: Vec<_> = prediction
            .crowd_forecast
            .iter()
            .map(|e| e.time.as_str())
            .collect();

        assert_eq!(times, vec!["11:00 PM", "12:00 AM", "01:00 AM"]);
        assert!(prediction
            .crowd_forecast
            .iter()
            .all(|e| e.level == CrowdLevel::Low));
        assert_eq!(prediction.peak_time, "10:00 AM");
    }

    #[test]
    fn peak_time_during_afternoon() {
        assert_eq!(Prediction::from_ledger(&ledger(0, 0), 10, 12).peak_time, "02:00 PM");
        assert_eq!(Prediction::from_ledger(&ledger(0, 0), 10, 15).peak_time, "03:00 PM");
    }

    #[test]
    fn alerts() {
        assert_eq!(Prediction::from_ledger(&ledger(0, 20), 10, 8).alert, None);
        assert_eq!(
            Prediction::from_ledger(&ledger(0, 21), 10, 8).alert.as_deref(),
            Some(RUSH_ALERT)
        );

        let mut paused = ledger(0, 2);
        paused.is_paused = true;

        assert_eq!(
            Prediction::from_ledger(&paused, 10, 8).alert.as_deref(),
            Some(PAUSED_ALERT)
        );
    }
}
