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

//! Errors surfaced by the fare search pipeline.

use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FareSearchError>;

#[derive(Debug, Error)]
pub enum FareSearchError {
    /// Malformed builder or composer input, detected before any network call.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The HTTP exchange could not complete, or the body was not JSON.
    #[error("transport error: {0:#}")]
    Transport(#[source] anyhow::Error),

    /// Well-formed JSON that signals an API-level failure.
    #[error("provider error (HTTP {status}): {message}")]
    Provider {
        status: u16,
        message: String,
        payload: Value,
    },
}

impl FareSearchError {
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Raw provider payload, when the provider answered with one.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::Provider { payload, .. } => Some(payload),
            _ => None,
        }
    }
}
