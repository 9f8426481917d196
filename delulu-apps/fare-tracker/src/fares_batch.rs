//!  Delulu Fare Tracker
//!
//!  Copyright (C) 2026  Mamy Ratsimbazafy
//!
//!  This program is free software: you can redistribute it and/or modify
//!  it under the terms of the GNU Affero General Public License as published by
//!  the Free Software Foundation, either version 3 of the License, or
//!  (at your option) any later version.
//!
//!  This program is distributed in the hope that it will be useful,
//!  but WITHOUT ANY WARRANTY; without even the implied warranty of
//!  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//!  GNU Affero General Public License for more details.
//!
//!  You should have received a copy of the GNU Affero General Public License
//!  along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! # Batch Searches
//!
//! Runs many single searches one after the other (one origin against many
//! destinations, or one route over many days) and gathers the culled
//! records into one list. There is no parallelism: latency grows linearly
//! with the number of jobs.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

use crate::error::{FareSearchError, Result};
use crate::fares_query_builder::{FareSearch, Passengers, TripLeg};
use crate::fares_results_parser::{CullOutcome, CulledTrip, FareSummary};
use crate::fares_search::QpxClient;

/// Fifty of the world's busiest airports, searched from Boston.
pub const BUSIEST_FROM_BOSTON: &[&str] = &[
    "ATL", "PEK", "DXB", "LAX", "HND", "ORD", "LHR", "HKG", "PVG", "CDG", "DFW", "AMS", "FRA",
    "IST", "CAN", "SIN", "DEN", "ICN", "BKK", "DEL", "CGK", "SFO", "KUL", "MAD", "CTU", "SEA",
    "BOM", "MIA", "YYZ", "BCN", "LGW", "TPE", "MUC", "SYD", "KMG", "SZX", "FCO", "MEX", "SHA",
    "MNL", "NRT", "DOH", "GRU", "AEP", "SVO", "LED", "JNB", "CAI", "CMN", "ADD",
];

/// Small list for keys with a low daily quota.
pub const SHORT_LIST: &[&str] = &["ATL", "PEK", "DXB", "LAX"];

pub fn preset(name: &str) -> Option<&'static [&'static str]> {
    match name.to_lowercase().as_str() {
        "busiest" | "busiest_from_boston" => Some(BUSIEST_FROM_BOSTON),
        "short" | "short_list" => Some(SHORT_LIST),
        _ => None,
    }
}

/// Read a JSON array of airport codes.
pub async fn load_destinations(path: &Path) -> anyhow::Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read destinations file {}", path.display()))?;
    let codes: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("{} must hold a JSON array of airport codes", path.display()))?;
    anyhow::ensure!(!codes.is_empty(), "{} lists no destinations", path.display());
    Ok(codes)
}

/// One search of a batch, labelled for reporting.
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub label: String,
    pub search: FareSearch,
}

/// One single-leg job per destination.
pub fn jobs_for_destinations<S: AsRef<str>>(
    origin: &str,
    destinations: &[S],
    date: NaiveDate,
    passengers: Passengers,
) -> Result<Vec<BatchJob>> {
    passengers.validate()?;
    destinations
        .iter()
        .map(|destination| {
            let leg = TripLeg::builder(origin, destination.as_ref(), date).build()?;
            Ok(BatchJob {
                label: format!("{}-{}", leg.origin(), leg.destination()),
                search: FareSearch::new(passengers).with_leg(leg),
            })
        })
        .collect()
}

/// One single-leg job per day in `[start, end)`.
pub fn jobs_for_date_range(
    origin: &str,
    destination: &str,
    start: NaiveDate,
    end: NaiveDate,
    passengers: Passengers,
) -> Result<Vec<BatchJob>> {
    if end <= start {
        return Err(FareSearchError::invalid(format!(
            "date range end {} must be after start {}",
            end, start
        )));
    }
    passengers.validate()?;
    start
        .iter_days()
        .take_while(|day| *day < end)
        .map(|day| {
            let leg = TripLeg::builder(origin, destination, day).build()?;
            Ok(BatchJob {
                label: day.format("%Y-%m-%d").to_string(),
                search: FareSearch::new(passengers).with_leg(leg),
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    Culled {
        options: usize,
        cheapest: Option<String>,
    },
    Passthrough {
        raw: Value,
    },
    Failed {
        error: String,
        payload: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobReport {
    pub label: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    /// Culled records of every successful job, in job order.
    pub records: Vec<CulledTrip>,
    pub jobs: Vec<JobReport>,
}

impl BatchReport {
    /// Jobs whose search returned an error.
    pub fn failures(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Failed { .. }))
            .count()
    }

    /// Jobs answered with a payload that could not be culled.
    pub fn passthroughs(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Passthrough { .. }))
            .count()
    }
}

/// Run every job in order. A failing job is recorded and the batch moves on.
pub async fn run_batch(client: &QpxClient, jobs: Vec<BatchJob>, search_date: NaiveDate) -> BatchReport {
    let batch_start = Instant::now();
    let total = jobs.len();
    let mut report = BatchReport::default();

    for (idx, job) in jobs.into_iter().enumerate() {
        tracing::info!("[{}/{}] {}", idx + 1, total, job.label);

        let outcome = match job.search.send(client).await {
            Ok(sent) => match sent.normalize(search_date) {
                CullOutcome::Culled(records) => {
                    let summary = FareSummary::from_records(&records);
                    report.records.extend(records);
                    JobOutcome::Culled {
                        options: summary.options,
                        cheapest: summary.cheapest,
                    }
                }
                CullOutcome::Passthrough(raw) => {
                    tracing::warn!("{}: response could not be culled, keeping it raw", job.label);
                    JobOutcome::Passthrough { raw }
                }
            },
            Err(e) => {
                tracing::warn!("{}: {}", job.label, e);
                JobOutcome::Failed {
                    error: e.to_string(),
                    payload: e.payload().cloned(),
                }
            }
        };

        report.jobs.push(JobReport {
            label: job.label,
            outcome,
        });
    }

    tracing::info!(
        "Batch of {} searches done in {:?}: {} records, {} uncullable, {} failed",
        total,
        batch_start.elapsed(),
        report.records.len(),
        report.passthroughs(),
        report.failures()
    );
    report
}
