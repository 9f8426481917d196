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

// Library for delulu-fare-tracker
// QPX fare searches: request building, dispatch, culling and output

mod error;
mod fares_batch;
mod fares_output;
mod fares_query_builder;
mod fares_results_parser;
mod fares_search;

pub use error::{FareSearchError, Result};

// Re-export commonly used items from fares_query_builder
pub use fares_query_builder::{
    Alliance, CabinClass, FareSearch, FareSearchBuilder, MAX_SOLUTIONS, MaxPrice, Passengers,
    SearchRequest, SearchRequestEnvelope, TimeOfDayRange, TripLeg, TripLegBuilder,
    legs_from_triples,
};

// Re-export fares_results_parser
pub use fares_results_parser::{
    CullOutcome, CulledLeg, CulledTrip, FareSummary, FlightNumber, cull, price_amount,
};

// Re-export fares_search
pub use fares_search::{
    DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS, ProviderConfig,
    QpxClient, SentSearch,
};

pub use fares_output::{default_output_filename, dump_json, output_path};

pub use fares_batch::{
    BUSIEST_FROM_BOSTON, BatchJob, BatchReport, JobOutcome, JobReport, SHORT_LIST,
    jobs_for_date_range, jobs_for_destinations, load_destinations, preset, run_batch,
};
