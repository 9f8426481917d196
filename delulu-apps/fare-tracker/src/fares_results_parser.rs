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

//! # Fares Results Parser
//!
//! Side-effect free flattening ("culling") of QPX `trips/search` responses.
//! Extraction is all-or-nothing: either every trip option yields a record,
//! or the raw response is handed back untouched.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Provider schema, restricted to what culling reads.
// Unknown fields are ignored, missing ones fail deserialization.

#[derive(Debug, Deserialize)]
struct TripsSearchResponse {
    trips: Trips,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Trips {
    trip_option: Vec<TripOption>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TripOption {
    sale_total: String,
    slice: Vec<SliceInfo>,
    pricing: Vec<PricingInfo>,
}

#[derive(Debug, Deserialize)]
struct SliceInfo {
    segment: Vec<SegmentInfo>,
}

#[derive(Debug, Deserialize)]
struct SegmentInfo {
    flight: FlightNumber,
    leg: Vec<LegInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegInfo {
    departure_time: String,
    arrival_time: String,
    origin: String,
    destination: String,
    mileage: u32,
    duration: u32,
}

#[derive(Debug, Deserialize)]
struct PricingInfo {
    fare: Vec<FareInfo>,
}

#[derive(Debug, Deserialize)]
struct FareInfo {
    origin: String,
    destination: String,
    carrier: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightNumber {
    pub carrier: String,
    pub number: String,
}

/// One flown segment of a culled trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CulledLeg {
    pub departure_time: String,
    pub arrival_time: String,
    pub flight: FlightNumber,
    pub origin: String,
    pub destination: String,
    pub mileage: u32,
    /// Minutes.
    pub duration: u32,
}

/// Flattened trip option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CulledTrip {
    pub search_date: NaiveDate,
    pub plan: String,
    pub departure_date: String,
    pub price: String,
    pub layovers: usize,
    pub origin: String,
    pub destination: String,
    pub carrier: String,
    pub leg: Vec<CulledLeg>,
}

impl CulledTrip {
    pub fn price_amount(&self) -> Option<f64> {
        price_amount(&self.price)
    }

    pub fn total_duration(&self) -> u32 {
        self.leg.iter().map(|l| l.duration).sum()
    }
}

/// Result of culling a raw response.
///
/// Serializes as either the record list or the raw payload, which is what
/// gets written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CullOutcome {
    Culled(Vec<CulledTrip>),
    Passthrough(Value),
}

impl CullOutcome {
    pub fn is_culled(&self) -> bool {
        matches!(self, CullOutcome::Culled(_))
    }

    pub fn records(&self) -> Option<&[CulledTrip]> {
        match self {
            CullOutcome::Culled(records) => Some(records),
            CullOutcome::Passthrough(_) => None,
        }
    }

    pub fn into_result(self) -> Result<Vec<CulledTrip>, Value> {
        match self {
            CullOutcome::Culled(records) => Ok(records),
            CullOutcome::Passthrough(raw) => Err(raw),
        }
    }
}

/// Flatten every `trips.tripOption` entry of `raw`, stamping `search_date`.
pub fn cull(raw: &Value, search_date: NaiveDate) -> CullOutcome {
    let parsed = match TripsSearchResponse::deserialize(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!("Response does not match the trips schema: {}", e);
            return CullOutcome::Passthrough(raw.clone());
        }
    };

    let records: Option<Vec<CulledTrip>> = parsed
        .trips
        .trip_option
        .iter()
        .enumerate()
        .map(|(idx, option)| {
            let record = cull_trip_option(option, search_date);
            if record.is_none() {
                tracing::debug!("Trip option #{} is missing slices, segments, legs or fares", idx);
            }
            record
        })
        .collect();

    match records {
        Some(records) => {
            tracing::debug!("Culled {} trip options", records.len());
            CullOutcome::Culled(records)
        }
        None => CullOutcome::Passthrough(raw.clone()),
    }
}

fn cull_trip_option(option: &TripOption, search_date: NaiveDate) -> Option<CulledTrip> {
    // Only the first slice is flattened. Multi-slice options (round trips,
    // multi-city) keep their later slices out of the record.
    if option.slice.len() > 1 {
        tracing::warn!(
            "Trip option has {} slices; only the first one is flattened",
            option.slice.len()
        );
    }
    let slice = option.slice.first()?;
    let first_leg = slice.segment.first()?.leg.first()?;
    let fare = option.pricing.first()?.fare.first()?;

    let leg = slice
        .segment
        .iter()
        .map(cull_segment)
        .collect::<Option<Vec<_>>>()?;

    let departure_date = first_leg
        .departure_time
        .split_once('T')
        .map_or(first_leg.departure_time.as_str(), |(day, _)| day)
        .to_string();

    Some(CulledTrip {
        search_date,
        plan: format!("{} - {}", fare.origin, fare.destination),
        departure_date,
        price: option.sale_total.clone(),
        layovers: slice.segment.len() - 1,
        origin: fare.origin.clone(),
        destination: fare.destination.clone(),
        carrier: fare.carrier.clone(),
        leg,
    })
}

fn cull_segment(segment: &SegmentInfo) -> Option<CulledLeg> {
    let leg = segment.leg.first()?;
    Some(CulledLeg {
        departure_time: leg.departure_time.clone(),
        arrival_time: leg.arrival_time.clone(),
        flight: segment.flight.clone(),
        origin: leg.origin.clone(),
        destination: leg.destination.clone(),
        mileage: leg.mileage,
        duration: leg.duration,
    })
}

/// Numeric part of a provider price such as `USD1234.56`.
pub fn price_amount(price: &str) -> Option<f64> {
    let amount = price.trim().get(3..)?;
    amount.parse().ok()
}

/// Aggregate view over a list of culled trips.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FareSummary {
    pub options: usize,
    pub cheapest: Option<String>,
    /// Number of options per layover count.
    pub by_layovers: BTreeMap<usize, usize>,
}

impl FareSummary {
    pub fn from_records(records: &[CulledTrip]) -> Self {
        let mut by_layovers = BTreeMap::new();
        for record in records {
            *by_layovers.entry(record.layovers).or_insert(0) += 1;
        }

        let cheapest = records
            .iter()
            .filter_map(|r| r.price_amount().map(|amount| (amount, &r.price)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, price)| price.clone());

        Self {
            options: records.len(),
            cheapest,
            by_layovers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn search_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2018, 11, 2).unwrap()
    }

    fn segment(flight: &str, origin: &str, destination: &str, dep: &str, arr: &str) -> Value {
        json!({
            "kind": "qpxexpress#segmentInfo",
            "duration": 120,
            "flight": {"carrier": &flight[..2], "number": &flight[2..]},
            "leg": [{
                "kind": "qpxexpress#legInfo",
                "departureTime": dep,
                "arrivalTime": arr,
                "origin": origin,
                "destination": destination,
                "mileage": 1000,
                "duration": 120
            }]
        })
    }

    fn option(price: &str, segments: Vec<Value>) -> Value {
        json!({
            "kind": "qpxexpress#tripOption",
            "saleTotal": price,
            "slice": [{"kind": "qpxexpress#sliceInfo", "segment": segments}],
            "pricing": [{
                "fare": [{"origin": "BOS", "destination": "LHR", "carrier": "BA", "basisCode": "O"}],
                "saleTotal": price
            }]
        })
    }

    fn response(options: Vec<Value>) -> Value {
        json!({"kind": "qpxExpress#tripsSearch", "trips": {"tripOption": options}})
    }

    #[test]
    fn test_single_segment_trip() {
        let raw = response(vec![option(
            "USD612.40",
            vec![segment(
                "BA212",
                "BOS",
                "LHR",
                "2018-12-12T18:15-05:00",
                "2018-12-13T05:40+00:00",
            )],
        )]);

        let records = cull(&raw, search_date()).into_result().unwrap();
        assert_eq!(records.len(), 1);
        let trip = &records[0];
        assert_eq!(trip.plan, "BOS - LHR");
        assert_eq!(trip.departure_date, "2018-12-12");
        assert_eq!(trip.price, "USD612.40");
        assert_eq!(trip.layovers, 0);
        assert_eq!(trip.carrier, "BA");
        assert_eq!(trip.leg[0].flight.number, "212");
        assert_eq!(trip.search_date, search_date());
    }

    #[test]
    fn test_record_keys_are_camel_case() {
        let raw = response(vec![option(
            "USD612.40",
            vec![segment("BA212", "BOS", "LHR", "2018-12-12T18:15-05:00", "2018-12-13T05:40+00:00")],
        )]);
        let value = serde_json::to_value(cull(&raw, search_date())).unwrap();
        let record = &value[0];
        assert_eq!(record["searchDate"], json!("2018-11-02"));
        assert_eq!(record["departureDate"], json!("2018-12-12"));
        assert_eq!(record["leg"][0]["departureTime"], json!("2018-12-12T18:15-05:00"));
        assert_eq!(record["leg"][0]["flight"], json!({"carrier": "BA", "number": "212"}));
    }

    #[test]
    fn test_error_payload_passes_through() {
        let raw = json!({
            "error": {
                "errors": [{"domain": "usageLimits", "reason": "keyInvalid", "message": "Bad Request"}],
                "code": 400,
                "message": "Bad Request"
            }
        });
        assert_eq!(cull(&raw, search_date()), CullOutcome::Passthrough(raw.clone()));
    }

    #[test]
    fn test_partial_option_fails_whole_response() {
        let mut broken = option(
            "USD700.00",
            vec![segment("AA100", "BOS", "JFK", "2018-12-12T08:00-05:00", "2018-12-12T09:10-05:00")],
        );
        broken["pricing"][0]["fare"] = json!([]);
        let good = option(
            "USD612.40",
            vec![segment("BA212", "BOS", "LHR", "2018-12-12T18:15-05:00", "2018-12-13T05:40+00:00")],
        );
        let raw = response(vec![good, broken]);

        let outcome = cull(&raw, search_date());
        assert!(!outcome.is_culled());
        assert_eq!(outcome.into_result().unwrap_err(), raw);
    }

    #[test]
    fn test_empty_trip_option_list_is_culled_empty() {
        let raw = response(vec![]);
        assert_eq!(cull(&raw, search_date()), CullOutcome::Culled(vec![]));
    }

    #[test]
    fn test_only_first_slice_is_flattened() {
        let mut round_trip = option(
            "USD900.00",
            vec![segment("BA212", "BOS", "LHR", "2018-12-12T18:15-05:00", "2018-12-13T05:40+00:00")],
        );
        let back = json!({"segment": [
            segment("BA213", "LHR", "BOS", "2018-12-20T10:00+00:00", "2018-12-20T12:55-05:00"),
            segment("BA999", "BOS", "BOS", "2018-12-20T14:00-05:00", "2018-12-20T15:00-05:00")
        ]});
        round_trip["slice"].as_array_mut().unwrap().push(back);

        let records = cull(&response(vec![round_trip]), search_date())
            .into_result()
            .unwrap();
        assert_eq!(records[0].layovers, 0);
        assert_eq!(records[0].leg.len(), 1);
    }

    #[test]
    fn test_price_amount() {
        assert_eq!(price_amount("USD1234.56"), Some(1234.56));
        assert_eq!(price_amount("EUR80"), Some(80.0));
        assert_eq!(price_amount("USD"), None);
        assert_eq!(price_amount(""), None);
    }

    #[test]
    fn test_summary() {
        let raw = response(vec![
            option(
                "USD700.00",
                vec![
                    segment("AA100", "BOS", "JFK", "2018-12-12T08:00-05:00", "2018-12-12T09:10-05:00"),
                    segment("AA106", "JFK", "LHR", "2018-12-12T18:00-05:00", "2018-12-13T06:10+00:00"),
                ],
            ),
            option(
                "USD612.40",
                vec![segment("BA212", "BOS", "LHR", "2018-12-12T18:15-05:00", "2018-12-13T05:40+00:00")],
            ),
        ]);
        let records = cull(&raw, search_date()).into_result().unwrap();
        let summary = FareSummary::from_records(&records);

        assert_eq!(summary.options, 2);
        assert_eq!(summary.cheapest.as_deref(), Some("USD612.40"));
        assert_eq!(summary.by_layovers.get(&0), Some(&1));
        assert_eq!(summary.by_layovers.get(&1), Some(&1));
        assert_eq!(records[0].total_duration(), 240);
    }
}
