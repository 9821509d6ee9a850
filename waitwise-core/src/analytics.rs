use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::{CrowdLevel, Ledger, TokenStamps, TokenStatus};

/// Daily statistics for a department, shown on the admin dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentAnalytics {
    pub tokens_served_today: u32,
    pub tokens_completed_today: u32,
    /// Average minutes between serving and completing a token
    pub avg_processing_time: i64,
    pub current_token: u32,
    pub total_tokens: u32,
    pub is_paused: bool,
    pub crowd_level: CrowdLevel,
}

impl DepartmentAnalytics {
    pub fn compute<'a, I>(ledger: &Ledger, records: I, since: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = &'a TokenStamps>,
    {
        let mut completed = 0;
        let mut serving = 0;
        let mut processing_millis = 0;

        for record in records {
            match record.status {
                TokenStatus::Completed if record.completed_at.is_some_and(|t| t >= since) => {
                    completed += 1;

                    if let (Some(served_at), Some(completed_at)) =
                        (record.served_at, record.completed_at)
                    {
                        processing_millis += (completed_at - served_at).num_milliseconds();
                    }
                }
                TokenStatus::Serving if record.served_at.is_some_and(|t| t >= since) => {
                    serving += 1;
                }
                _ => {}
            }
        }

        let avg_processing_time = if completed > 0 {
            (processing_millis as f64 / completed as f64 / 60_000.).round() as i64
        } else {
            0
        };

        Self {
            tokens_served_today: completed + serving,
            tokens_completed_today: completed,
            avg_processing_time,
            current_token: ledger.current_token,
            total_tokens: ledger.total_tokens,
            is_paused: ledger.is_paused,
            crowd_level: ledger.crowd_level,
        }
    }
}

/// Returns local midnight of the day `now` falls on.
pub fn start_of_local_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.with_timezone(&Local)
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .map(|midnight| midnight.with_timezone(&Utc))
        .unwrap_or(now)
}
