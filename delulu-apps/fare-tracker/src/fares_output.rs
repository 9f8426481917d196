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

//! Writing search results to disk.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;

/// `YYYY-MM-DD.json` for the given day.
pub fn default_output_filename(date: NaiveDate) -> String {
    format!("{}.json", date.format("%Y-%m-%d"))
}

pub fn output_path(explicit: Option<&Path>, today: NaiveDate) -> PathBuf {
    match explicit {
        Some(path) => path.to_path_buf(),
        None => PathBuf::from(default_output_filename(today)),
    }
}

/// Pretty-print `data` as JSON into `filename`, or into today's default file.
pub async fn dump_json<T: Serialize>(data: &T, filename: Option<&Path>) -> Result<PathBuf> {
    let path = output_path(filename, chrono::Local::now().date_naive());
    let json = serde_json::to_string_pretty(data).context("Failed to serialize output")?;
    tokio::fs::write(&path, json)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Data saved as {}", path.display());
    Ok(path)
}
