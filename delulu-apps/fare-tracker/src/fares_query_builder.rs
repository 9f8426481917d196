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

//! # Fares Query Builder
//!
//! Side-effect free construction of QPX `trips/search` request bodies.
//! A [`TripLeg`] is one slice of the itinerary; a [`FareSearch`] collects
//! the slices, the passenger counts and the request-wide constraints.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{FareSearchError, Result};

/// Largest `solutions` value the provider accepts.
pub const MAX_SOLUTIONS: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CabinClass {
    Coach,
    PremiumCoach,
    Business,
    First,
}

impl CabinClass {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "coach" | "economy" | "e" => Some(CabinClass::Coach),
            "premium_coach" | "premium" | "pe" => Some(CabinClass::PremiumCoach),
            "business" | "b" => Some(CabinClass::Business),
            "first" | "f" => Some(CabinClass::First),
            _ => None,
        }
    }

    pub fn as_str_name(&self) -> &'static str {
        match self {
            CabinClass::Coach => "COACH",
            CabinClass::PremiumCoach => "PREMIUM_COACH",
            CabinClass::Business => "BUSINESS",
            CabinClass::First => "FIRST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Alliance {
    Oneworld,
    Skyteam,
    Star,
}

impl Alliance {
    pub fn from_str_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "oneworld" => Some(Alliance::Oneworld),
            "skyteam" => Some(Alliance::Skyteam),
            "star" | "star_alliance" => Some(Alliance::Star),
            _ => None,
        }
    }
}

/// Departure window within a day, serialized as `HH:MM` bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TimeOfDayFields")]
pub struct TimeOfDayRange {
    earliest_time: String,
    latest_time: String,
}

impl TimeOfDayRange {
    pub fn new(earliest: NaiveTime, latest: NaiveTime) -> Result<Self> {
        if earliest > latest {
            return Err(FareSearchError::invalid(format!(
                "earliest departure time {} is after latest departure time {}",
                earliest.format("%H:%M"),
                latest.format("%H:%M")
            )));
        }
        Ok(Self {
            earliest_time: earliest.format("%H:%M").to_string(),
            latest_time: latest.format("%H:%M").to_string(),
        })
    }

    pub fn earliest_time(&self) -> &str {
        &self.earliest_time
    }

    pub fn latest_time(&self) -> &str {
        &self.latest_time
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeOfDayFields {
    earliest_time: String,
    latest_time: String,
}

impl TryFrom<TimeOfDayFields> for TimeOfDayRange {
    type Error = FareSearchError;

    fn try_from(fields: TimeOfDayFields) -> Result<Self> {
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| {
                FareSearchError::invalid(format!("departure time must look like HH:MM, got '{}'", s))
            })
        };
        Self::new(parse(&fields.earliest_time)?, parse(&fields.latest_time)?)
    }
}

/// Price ceiling for a whole trip, e.g. `USD200.00`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MaxPrice {
    currency: String,
    cents: u64,
}

impl MaxPrice {
    pub fn new(currency: &str, cents: u64) -> Result<Self> {
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(FareSearchError::invalid(format!(
                "currency must be a 3-letter ISO 4217 code, got '{}'",
                currency
            )));
        }
        Ok(Self {
            currency: currency.to_ascii_uppercase(),
            cents,
        })
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn cents(&self) -> u64 {
        self.cents
    }
}

impl fmt::Display for MaxPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}.{:02}",
            self.currency,
            self.cents / 100,
            self.cents % 100
        )
    }
}

impl FromStr for MaxPrice {
    type Err = FareSearchError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let malformed =
            || FareSearchError::invalid(format!("max price must look like USD200.00, got '{}'", s));

        if s.len() < 4 || !s.is_char_boundary(3) {
            return Err(malformed());
        }
        let (currency, amount) = s.split_at(3);
        let (whole, frac) = amount.split_once('.').unwrap_or((amount, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || !all_digits(whole) || frac.len() > 2 || !all_digits(frac) {
            return Err(malformed());
        }

        let whole: u64 = whole.parse().map_err(|_| malformed())?;
        let frac_cents: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().map_err(|_| malformed())? * 10,
            _ => frac.parse().map_err(|_| malformed())?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|w| w.checked_add(frac_cents))
            .ok_or_else(malformed)?;

        Self::new(currency, cents)
    }
}

impl TryFrom<String> for MaxPrice {
    type Error = FareSearchError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<MaxPrice> for String {
    fn from(p: MaxPrice) -> String {
        p.to_string()
    }
}

fn airport_code(field: &str, code: &str) -> Result<String> {
    let code = code.trim();
    if code.is_empty() {
        return Err(FareSearchError::invalid(format!(
            "{} airport is required",
            field
        )));
    }
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(FareSearchError::invalid(format!(
            "{} airport must be a 3-letter IATA code, got '{}'",
            field, code
        )));
    }
    Ok(code.to_ascii_uppercase())
}

fn carrier_code(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FareSearchError::invalid(format!(
            "carrier must be a 2-character IATA airline code, got '{}'",
            code
        )));
    }
    Ok(code.to_ascii_uppercase())
}

fn country_code(field: &str, code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() != 2 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(FareSearchError::invalid(format!(
            "{} must be a 2-letter country code, got '{}'",
            field, code
        )));
    }
    Ok(code.to_ascii_uppercase())
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// One slice of an itinerary, in the provider's `sliceInput` shape.
///
/// Optional refinements that were not supplied are left out of the JSON
/// entirely; the provider treats an absent field differently from an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "TripLegFields")]
pub struct TripLeg {
    origin: String,
    destination: String,
    date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_stops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_connection_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    preferred_cabin: Option<CabinClass>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    permitted_departure_time: Option<TimeOfDayRange>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    permitted_carrier: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    prohibited_carrier: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    alliance: Option<Alliance>,
}

impl TripLeg {
    pub fn builder(
        origin: impl Into<String>,
        destination: impl Into<String>,
        date: NaiveDate,
    ) -> TripLegBuilder {
        TripLegBuilder {
            origin: origin.into(),
            destination: destination.into(),
            date,
            max_stops: None,
            max_connection_duration: None,
            preferred_cabin: None,
            departure_window: None,
            permitted_carrier: Vec::new(),
            prohibited_carrier: Vec::new(),
            alliance: None,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// The same constraints flown the other way on another day.
    pub fn reversed(&self, date: NaiveDate) -> TripLeg {
        TripLeg {
            origin: self.destination.clone(),
            destination: self.origin.clone(),
            date,
            ..self.clone()
        }
    }
}

/// Parsed legs are held to the same rules as built ones.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TripLegFields {
    origin: String,
    destination: String,
    date: NaiveDate,
    #[serde(default)]
    max_stops: Option<u32>,
    #[serde(default)]
    max_connection_duration: Option<u32>,
    #[serde(default)]
    preferred_cabin: Option<CabinClass>,
    #[serde(default)]
    permitted_departure_time: Option<TimeOfDayRange>,
    #[serde(default)]
    permitted_carrier: Vec<String>,
    #[serde(default)]
    prohibited_carrier: Vec<String>,
    #[serde(default)]
    alliance: Option<Alliance>,
}

impl TryFrom<TripLegFields> for TripLeg {
    type Error = FareSearchError;

    fn try_from(fields: TripLegFields) -> Result<Self> {
        let mut builder = TripLeg::builder(fields.origin, fields.destination, fields.date)
            .permitted_carriers(fields.permitted_carrier)
            .prohibited_carriers(fields.prohibited_carrier);
        builder.max_stops = fields.max_stops;
        builder.max_connection_duration = fields.max_connection_duration;
        builder.preferred_cabin = fields.preferred_cabin;
        builder.alliance = fields.alliance;

        let mut leg = builder.build()?;
        leg.permitted_departure_time = fields.permitted_departure_time;
        Ok(leg)
    }
}

#[derive(Debug, Clone)]
pub struct TripLegBuilder {
    origin: String,
    destination: String,
    date: NaiveDate,
    max_stops: Option<u32>,
    max_connection_duration: Option<u32>,
    preferred_cabin: Option<CabinClass>,
    departure_window: Option<(NaiveTime, NaiveTime)>,
    permitted_carrier: Vec<String>,
    prohibited_carrier: Vec<String>,
    alliance: Option<Alliance>,
}

impl TripLegBuilder {
    pub fn max_stops(mut self, max_stops: u32) -> Self {
        self.max_stops = Some(max_stops);
        self
    }

    /// Longest connection allowed, in minutes.
    pub fn max_connection_duration(mut self, minutes: u32) -> Self {
        self.max_connection_duration = Some(minutes);
        self
    }

    pub fn preferred_cabin(mut self, cabin: CabinClass) -> Self {
        self.preferred_cabin = Some(cabin);
        self
    }

    pub fn departure_window(mut self, earliest: NaiveTime, latest: NaiveTime) -> Self {
        self.departure_window = Some((earliest, latest));
        self
    }

    pub fn permitted_carriers<I, S>(mut self, carriers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.permitted_carrier = carriers.into_iter().map(Into::into).collect();
        self
    }

    pub fn prohibited_carriers<I, S>(mut self, carriers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prohibited_carrier = carriers.into_iter().map(Into::into).collect();
        self
    }

    pub fn alliance(mut self, alliance: Alliance) -> Self {
        self.alliance = Some(alliance);
        self
    }

    pub fn build(self) -> Result<TripLeg> {
        let permitted_departure_time = self
            .departure_window
            .map(|(earliest, latest)| TimeOfDayRange::new(earliest, latest))
            .transpose()?;

        Ok(TripLeg {
            origin: airport_code("origin", &self.origin)?,
            destination: airport_code("destination", &self.destination)?,
            date: self.date,
            max_stops: self.max_stops,
            max_connection_duration: self.max_connection_duration,
            preferred_cabin: self.preferred_cabin,
            permitted_departure_time,
            permitted_carrier: self
                .permitted_carrier
                .iter()
                .map(|c| carrier_code(c))
                .collect::<Result<_>>()?,
            prohibited_carrier: self
                .prohibited_carrier
                .iter()
                .map(|c| carrier_code(c))
                .collect::<Result<_>>()?,
            alliance: self.alliance,
        })
    }
}

/// Build one plain leg per `(origin, destination, date)` triple.
///
/// Legs of a multi-leg journey are expected in ascending date order; this is
/// left to the caller and only reported.
pub fn legs_from_triples<S: AsRef<str>>(triples: &[(S, S, NaiveDate)]) -> Result<Vec<TripLeg>> {
    if triples.windows(2).any(|w| w[1].2 < w[0].2) {
        tracing::warn!("Journey legs are not in ascending date order; the provider may reject them");
    }
    triples
        .iter()
        .map(|(origin, destination, date)| {
            TripLeg::builder(origin.as_ref(), destination.as_ref(), *date).build()
        })
        .collect()
}

/// Passenger counts. At least one adult or senior must travel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passengers {
    pub adult_count: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub child_count: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub infant_in_lap_count: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub infant_in_seat_count: u32,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub senior_count: u32,
}

impl Passengers {
    pub fn adults(count: u32) -> Self {
        Self {
            adult_count: count,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let too_many = || FareSearchError::invalid("passenger counts are too large");
        let supervisors = self
            .adult_count
            .checked_add(self.senior_count)
            .ok_or_else(too_many)?;
        self.checked_total().ok_or_else(too_many)?;
        if supervisors == 0 {
            return Err(FareSearchError::invalid(
                "at least one adult or senior passenger is required",
            ));
        }
        if self.infant_in_lap_count > supervisors {
            return Err(FareSearchError::invalid(format!(
                "cannot have more infants in lap ({}) than adults and seniors ({})",
                self.infant_in_lap_count, supervisors
            )));
        }
        Ok(())
    }

    fn counts(&self) -> [u32; 5] {
        [
            self.adult_count,
            self.child_count,
            self.infant_in_lap_count,
            self.infant_in_seat_count,
            self.senior_count,
        ]
    }

    fn checked_total(&self) -> Option<u32> {
        self.counts()
            .into_iter()
            .try_fold(0u32, |acc, n| acc.checked_add(n))
    }

    /// Number of travellers, saturating at `u32::MAX`.
    pub fn total(&self) -> u32 {
        self.counts()
            .into_iter()
            .fold(0u32, |acc, n| acc.saturating_add(n))
    }
}

/// Body of a `trips/search` call, without the outer `request` wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "SearchRequestFields")]
pub struct SearchRequest {
    pub passengers: Passengers,
    pub slice: Vec<TripLeg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_price: Option<MaxPrice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sale_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticketing_country: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refundable: Option<bool>,
    pub solutions: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequestFields {
    passengers: Passengers,
    slice: Vec<TripLeg>,
    #[serde(default)]
    max_price: Option<MaxPrice>,
    #[serde(default)]
    sale_country: Option<String>,
    #[serde(default)]
    ticketing_country: Option<String>,
    #[serde(default)]
    refundable: Option<bool>,
    #[serde(default = "default_solutions")]
    solutions: u32,
}

fn default_solutions() -> u32 {
    MAX_SOLUTIONS
}

impl TryFrom<SearchRequestFields> for SearchRequest {
    type Error = FareSearchError;

    fn try_from(fields: SearchRequestFields) -> Result<Self> {
        let mut builder = FareSearch::builder(fields.passengers).solutions(fields.solutions);
        builder.max_price = fields.max_price;
        builder.sale_country = fields.sale_country;
        builder.ticketing_country = fields.ticketing_country;
        builder.refundable = fields.refundable;

        let mut search = builder.build()?;
        search.request.slice = fields.slice;
        Ok(search.into_request())
    }
}

/// The JSON document POSTed to the provider: `{"request": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequestEnvelope {
    pub request: SearchRequest,
}

/// A search being composed. Sending it consumes it, so one composed
/// search is dispatched at most once.
#[derive(Debug, Clone)]
pub struct FareSearch {
    request: SearchRequest,
}

impl FareSearch {
    pub fn new(passengers: Passengers) -> Self {
        Self {
            request: SearchRequest {
                passengers,
                slice: Vec::new(),
                max_price: None,
                sale_country: None,
                ticketing_country: None,
                refundable: None,
                solutions: MAX_SOLUTIONS,
            },
        }
    }

    pub fn builder(passengers: Passengers) -> FareSearchBuilder {
        FareSearchBuilder {
            passengers,
            max_price: None,
            sale_country: None,
            ticketing_country: None,
            refundable: None,
            solutions: MAX_SOLUTIONS,
        }
    }

    pub fn add_leg(&mut self, leg: TripLeg) -> &mut Self {
        self.request.slice.push(leg);
        self
    }

    pub fn with_leg(mut self, leg: TripLeg) -> Self {
        self.request.slice.push(leg);
        self
    }

    pub fn legs(&self) -> &[TripLeg] {
        &self.request.slice
    }

    pub fn request(&self) -> &SearchRequest {
        &self.request
    }

    pub(crate) fn into_request(self) -> SearchRequest {
        self.request
    }

    pub fn validate(&self) -> Result<()> {
        if self.request.slice.is_empty() {
            return Err(FareSearchError::invalid(
                "a search needs at least one leg before it can be sent",
            ));
        }
        self.request.passengers.validate()
    }

    pub fn envelope(&self) -> SearchRequestEnvelope {
        SearchRequestEnvelope {
            request: self.request.clone(),
        }
    }

    /// Validated JSON body, ready to POST.
    pub fn to_json(&self) -> Result<String> {
        self.validate()?;
        serde_json::to_string(&self.envelope()).map_err(|e| {
            FareSearchError::invalid(format!("request could not be serialized: {}", e))
        })
    }
}

#[derive(Debug, Clone)]
pub struct FareSearchBuilder {
    passengers: Passengers,
    max_price: Option<MaxPrice>,
    sale_country: Option<String>,
    ticketing_country: Option<String>,
    refundable: Option<bool>,
    solutions: u32,
}

impl FareSearchBuilder {
    pub fn max_price(mut self, max_price: MaxPrice) -> Self {
        self.max_price = Some(max_price);
        self
    }

    pub fn sale_country(mut self, country: impl Into<String>) -> Self {
        self.sale_country = Some(country.into());
        self
    }

    pub fn ticketing_country(mut self, country: impl Into<String>) -> Self {
        self.ticketing_country = Some(country.into());
        self
    }

    pub fn refundable(mut self, refundable: bool) -> Self {
        self.refundable = Some(refundable);
        self
    }

    /// Cap on returned trip options, 1 to [`MAX_SOLUTIONS`].
    pub fn solutions(mut self, solutions: u32) -> Self {
        self.solutions = solutions;
        self
    }

    pub fn build(self) -> Result<FareSearch> {
        self.passengers.validate()?;
        if !(1..=MAX_SOLUTIONS).contains(&self.solutions) {
            return Err(FareSearchError::invalid(format!(
                "solutions must be between 1 and {}, got {}",
                MAX_SOLUTIONS, self.solutions
            )));
        }

        let mut search = FareSearch::new(self.passengers);
        search.request.max_price = self.max_price;
        search.request.sale_country = self
            .sale_country
            .map(|c| country_code("sale country", &c))
            .transpose()?;
        search.request.ticketing_country = self
            .ticketing_country
            .map(|c| country_code("ticketing country", &c))
            .transpose()?;
        search.request.refundable = self.refundable;
        search.request.solutions = self.solutions;
        Ok(search)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_required_fields_only() {
        let leg = TripLeg::builder("bos", "LHR", date(2018, 12, 12))
            .build()
            .unwrap();
        let value = serde_json::to_value(&leg).unwrap();
        assert_eq!(
            value,
            json!({"origin": "BOS", "destination": "LHR", "date": "2018-12-12"})
        );
    }

    #[test]
    fn test_optional_fields_are_emitted_when_supplied() {
        let leg = TripLeg::builder("BOS", "LHR", date(2018, 12, 12))
            .max_stops(1)
            .preferred_cabin(CabinClass::PremiumCoach)
            .departure_window(time(6, 0), time(14, 30))
            .permitted_carriers(["ba", "AA"])
            .alliance(Alliance::Oneworld)
            .build()
            .unwrap();
        let value = serde_json::to_value(&leg).unwrap();
        let obj = value.as_object().unwrap();

        assert_eq!(obj.len(), 8);
        assert_eq!(obj["maxStops"], json!(1));
        assert_eq!(obj["preferredCabin"], json!("PREMIUM_COACH"));
        assert_eq!(
            obj["permittedDepartureTime"],
            json!({"earliestTime": "06:00", "latestTime": "14:30"})
        );
        assert_eq!(obj["permittedCarrier"], json!(["BA", "AA"]));
        assert_eq!(obj["alliance"], json!("ONEWORLD"));
        assert!(!obj.contains_key("prohibitedCarrier"));
        assert!(!obj.contains_key("maxConnectionDuration"));
        assert!(obj.values().all(|v| !v.is_null()));
    }

    #[test]
    fn test_malformed_codes_are_rejected() {
        let d = date(2018, 12, 12);
        for (origin, destination) in [("", "LHR"), ("BOS", ""), ("BOST", "LHR"), ("B0S", "LHR")] {
            let err = TripLeg::builder(origin, destination, d).build().unwrap_err();
            assert!(
                matches!(err, FareSearchError::InvalidArgument(_)),
                "{}->{} should be rejected",
                origin,
                destination
            );
        }

        let err = TripLeg::builder("BOS", "LHR", d)
            .prohibited_carriers(["BAW"])
            .build()
            .unwrap_err();
        assert!(matches!(err, FareSearchError::InvalidArgument(_)));
    }

    #[test]
    fn test_inverted_departure_window_is_rejected() {
        let result = TripLeg::builder("BOS", "LHR", date(2018, 12, 12))
            .departure_window(time(18, 0), time(6, 0))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_reversed_leg_keeps_constraints() {
        let out = TripLeg::builder("BOS", "LHR", date(2018, 12, 12))
            .max_stops(0)
            .build()
            .unwrap();
        let back = out.reversed(date(2018, 12, 20));
        assert_eq!(back.origin(), "LHR");
        assert_eq!(back.destination(), "BOS");
        assert_eq!(back.date(), date(2018, 12, 20));
        assert_eq!(back.max_stops, Some(0));
    }

    #[test]
    fn test_max_price_parsing() {
        let price: MaxPrice = "usd200.5".parse().unwrap();
        assert_eq!(price.currency(), "USD");
        assert_eq!(price.cents(), 20050);
        assert_eq!(price.to_string(), "USD200.50");

        assert_eq!("EUR75".parse::<MaxPrice>().unwrap().to_string(), "EUR75.00");
        for bad in ["", "USD", "US200", "USD12.345", "USD-1.00", "USDabc"] {
            assert!(bad.parse::<MaxPrice>().is_err(), "'{}' should not parse", bad);
        }
    }

    #[test]
    fn test_passenger_validation() {
        assert!(Passengers::adults(1).validate().is_ok());
        assert!(Passengers::adults(0).validate().is_err());

        let seniors_only = Passengers {
            senior_count: 2,
            ..Default::default()
        };
        assert!(seniors_only.validate().is_ok());

        let too_many_lap_infants = Passengers {
            adult_count: 1,
            infant_in_lap_count: 2,
            ..Default::default()
        };
        assert!(too_many_lap_infants.validate().is_err());
    }

    #[test]
    fn test_oversized_passenger_counts_are_rejected() {
        let supervisors_overflow = Passengers {
            adult_count: u32::MAX,
            senior_count: 1,
            ..Default::default()
        };
        assert!(matches!(
            supervisors_overflow.validate(),
            Err(FareSearchError::InvalidArgument(_))
        ));
        assert_eq!(supervisors_overflow.total(), u32::MAX);

        let total_overflow = Passengers {
            adult_count: 1,
            child_count: u32::MAX,
            ..Default::default()
        };
        assert!(total_overflow.validate().is_err());

        let search = FareSearch::new(supervisors_overflow).with_leg(
            TripLeg::builder("BOS", "LHR", date(2018, 12, 12))
                .build()
                .unwrap(),
        );
        assert!(matches!(
            search.to_json(),
            Err(FareSearchError::InvalidArgument(_))
        ));
        assert!(FareSearch::builder(supervisors_overflow).build().is_err());
    }

    #[test]
    fn test_parsed_legs_follow_builder_rules() {
        let leg: TripLeg = serde_json::from_value(json!({
            "origin": "bos",
            "destination": "LHR",
            "date": "2018-12-12",
            "permittedCarrier": ["ba"],
            "permittedDepartureTime": {"earliestTime": "06:00", "latestTime": "11:30"}
        }))
        .unwrap();
        assert_eq!(leg.origin(), "BOS");
        assert_eq!(leg.permitted_carrier, vec!["BA"]);

        for bad in [
            json!({"origin": "", "destination": "LHR", "date": "2018-12-12"}),
            json!({"origin": "BOS", "destination": "LONDON", "date": "2018-12-12"}),
            json!({"origin": "BOS", "destination": "LHR", "date": "2018-12-12",
                   "prohibitedCarrier": ["BAW"]}),
            json!({"origin": "BOS", "destination": "LHR", "date": "2018-12-12",
                   "permittedDepartureTime": {"earliestTime": "18:00", "latestTime": "06:00"}}),
            json!({"origin": "BOS", "destination": "LHR", "date": "2018-12-12",
                   "permittedDepartureTime": {"earliestTime": "6am", "latestTime": "11:30"}}),
        ] {
            assert!(serde_json::from_value::<TripLeg>(bad.clone()).is_err(), "{} parsed", bad);
        }
    }

    #[test]
    fn test_parsed_requests_follow_builder_rules() {
        let leg = json!({"origin": "BOS", "destination": "LHR", "date": "2018-12-12"});
        let parsed: SearchRequestEnvelope = serde_json::from_value(json!({
            "request": {"passengers": {"adultCount": 1}, "slice": [leg], "saleCountry": "us"}
        }))
        .unwrap();
        assert_eq!(parsed.request.solutions, MAX_SOLUTIONS);
        assert_eq!(parsed.request.sale_country.as_deref(), Some("US"));

        for bad in [
            json!({"passengers": {"adultCount": 1}, "slice": [leg], "solutions": 9999}),
            json!({"passengers": {"adultCount": 0}, "slice": [leg]}),
            json!({"passengers": {"adultCount": 1}, "slice": [leg], "ticketingCountry": "USA"}),
            json!({"passengers": {"adultCount": 1},
                   "slice": [{"origin": "", "destination": "LONDON", "date": "2018-12-12"}]}),
        ] {
            let body = json!({"request": bad});
            assert!(
                serde_json::from_value::<SearchRequestEnvelope>(body.clone()).is_err(),
                "{} parsed",
                body
            );
        }
    }

    #[test]
    fn test_passenger_counts_omit_zeroes() {
        let value = serde_json::to_value(Passengers {
            adult_count: 2,
            child_count: 1,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(value, json!({"adultCount": 2, "childCount": 1}));
    }

    #[test]
    fn test_default_request_shape() {
        let search = FareSearch::new(Passengers::adults(1)).with_leg(
            TripLeg::builder("BOS", "LHR", date(2018, 12, 12))
                .build()
                .unwrap(),
        );
        let body: Value = serde_json::from_str(&search.to_json().unwrap()).unwrap();
        assert_eq!(
            body,
            json!({
                "request": {
                    "passengers": {"adultCount": 1},
                    "slice": [{"origin": "BOS", "destination": "LHR", "date": "2018-12-12"}],
                    "solutions": 500
                }
            })
        );
    }

    #[test]
    fn test_empty_search_does_not_serialize() {
        let search = FareSearch::new(Passengers::adults(1));
        assert!(matches!(
            search.to_json(),
            Err(FareSearchError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_builder_bounds_solutions_and_countries() {
        assert!(FareSearch::builder(Passengers::adults(1)).solutions(0).build().is_err());
        assert!(FareSearch::builder(Passengers::adults(1)).solutions(501).build().is_err());
        assert!(FareSearch::builder(Passengers::adults(1)).sale_country("USA").build().is_err());

        let search = FareSearch::builder(Passengers::adults(1))
            .solutions(20)
            .sale_country("us")
            .refundable(false)
            .build()
            .unwrap();
        assert_eq!(search.request().solutions, 20);
        assert_eq!(search.request().sale_country.as_deref(), Some("US"));
        assert_eq!(search.request().refundable, Some(false));
    }

    #[test]
    fn test_legs_from_triples_keeps_order() {
        let legs = legs_from_triples(&[
            ("BOS", "LHR", date(2018, 12, 12)),
            ("LHR", "CDG", date(2018, 12, 15)),
            ("CDG", "BOS", date(2018, 12, 20)),
        ])
        .unwrap();
        let route: Vec<_> = legs.iter().map(|l| (l.origin(), l.destination())).collect();
        assert_eq!(route, vec![("BOS", "LHR"), ("LHR", "CDG"), ("CDG", "BOS")]);

        assert!(legs_from_triples(&[("BOS", "X", date(2018, 12, 12))]).is_err());
    }

    #[test]
    fn test_legs_from_triples_accepts_descending_dates() {
        let legs = legs_from_triples(&[
            ("BOS", "LHR", date(2018, 12, 20)),
            ("LHR", "BOS", date(2018, 12, 12)),
        ])
        .unwrap();
        let dates: Vec<_> = legs.iter().map(TripLeg::date).collect();
        assert_eq!(dates, vec![date(2018, 12, 20), date(2018, 12, 12)]);
        assert_eq!(legs[0].origin(), "BOS");
        assert_eq!(legs[1].origin(), "LHR");
    }
}
