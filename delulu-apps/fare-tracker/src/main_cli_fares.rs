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

//! CLI for QPX fare searches.

use std::cmp::max;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use delulu_fare_tracker::{
    Alliance, BatchReport, CabinClass, CullOutcome, CulledTrip, DEFAULT_BASE_URL,
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS, FareSearch, FareSearchError, FareSummary,
    JobOutcome, MAX_SOLUTIONS, MaxPrice, Passengers, ProviderConfig, QpxClient, TripLeg,
    dump_json, jobs_for_date_range, jobs_for_destinations, legs_from_triples, load_destinations,
    preset, run_batch,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const MAX_INTERACTIVE_LEGS: usize = 10;

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "delulu-fares")]
#[command(author, version, about = "Flight fare searches against the QPX API", long_about = None)]
struct CliArgs {
    /// QPX API key
    #[arg(long, env = "QPX_API_KEY", hide_env_values = true, default_value = "", global = true)]
    api_key: String,

    /// Search endpoint
    #[arg(long, env = "QPX_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,

    /// Request timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    timeout: u64,

    /// Connect timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    connect_timeout: u64,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search one route, optionally with a return leg
    Search(SearchArgs),

    /// Compose a multi-leg journey interactively
    Multi {
        #[command(flatten)]
        passengers: PassengerArgs,

        /// Output file (default: YYYY-MM-DD.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Search one origin against many destinations, one request each
    Batch {
        /// Origin airport code
        #[arg(short, long)]
        from: String,

        /// Departure date (YYYY-MM-DD or YYYY/MM/DD)
        #[arg(short, long)]
        date: String,

        #[command(flatten)]
        destinations: DestinationSource,

        #[command(flatten)]
        passengers: PassengerArgs,

        /// Write the per-search report instead of only the records
        #[arg(long)]
        full_report: bool,

        /// Output file (default: YYYY-MM-DD.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Search one route for every day of a date range
    Calendar {
        /// Origin airport code
        #[arg(short, long)]
        from: String,

        /// Destination airport code
        #[arg(short, long)]
        to: String,

        /// First day searched (YYYY-MM-DD)
        #[arg(long)]
        start: String,

        /// Day after the last day searched (YYYY-MM-DD)
        #[arg(long)]
        end: String,

        #[command(flatten)]
        passengers: PassengerArgs,

        /// Output file (default: YYYY-MM-DD.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Origin airport code (e.g., BOS)
    #[arg(short, long)]
    from: String,

    /// Destination airport code (e.g., LHR)
    #[arg(short, long)]
    to: String,

    /// Departure date (YYYY-MM-DD or YYYY/MM/DD)
    #[arg(short, long)]
    date: String,

    /// Return date; adds a second leg flying back
    #[arg(short = 'R', long)]
    return_date: Option<String>,

    /// Cabin: coach, premium_coach, business, first
    #[arg(short, long)]
    cabin: Option<String>,

    /// Maximum number of stops (0 = nonstop only)
    #[arg(long)]
    max_stops: Option<u32>,

    /// Longest connection, in minutes
    #[arg(long)]
    max_connection: Option<u32>,

    /// Earliest departure time (HH:MM)
    #[arg(long)]
    earliest: Option<String>,

    /// Latest departure time (HH:MM)
    #[arg(long)]
    latest: Option<String>,

    /// Permitted carriers (comma-separated, e.g., "AA,BA")
    #[arg(long)]
    permitted_carriers: Option<String>,

    /// Prohibited carriers (comma-separated)
    #[arg(long)]
    prohibited_carriers: Option<String>,

    /// Alliance: oneworld, skyteam, star
    #[arg(long)]
    alliance: Option<String>,

    /// Maximum total price (e.g., USD200.00)
    #[arg(long)]
    max_price: Option<String>,

    /// Sale country (2-letter code)
    #[arg(long)]
    sale_country: Option<String>,

    /// Ticketing country (2-letter code)
    #[arg(long)]
    ticketing_country: Option<String>,

    /// Only refundable (true) or non-refundable (false) fares
    #[arg(long)]
    refundable: Option<bool>,

    /// Number of trip options requested
    #[arg(long, default_value_t = MAX_SOLUTIONS)]
    solutions: u32,

    #[command(flatten)]
    passengers: PassengerArgs,

    /// Output file (default: YYYY-MM-DD.json)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PassengerArgs {
    /// Number of adults
    #[arg(short, long, default_value_t = 1)]
    adults: u32,

    /// Number of seniors
    #[arg(long, default_value_t = 0)]
    seniors: u32,

    /// Number of children
    #[arg(long, default_value_t = 0)]
    children: u32,

    /// Number of infants on a lap
    #[arg(long, default_value_t = 0)]
    infants_in_lap: u32,

    /// Number of infants in their own seat
    #[arg(long, default_value_t = 0)]
    infants_in_seat: u32,
}

impl PassengerArgs {
    fn to_passengers(&self) -> Passengers {
        Passengers {
            adult_count: self.adults,
            child_count: self.children,
            infant_in_lap_count: self.infants_in_lap,
            infant_in_seat_count: self.infants_in_seat,
            senior_count: self.seniors,
        }
    }
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct DestinationSource {
    /// Destination codes (comma-separated)
    #[arg(long)]
    destinations: Option<String>,

    /// JSON file holding an array of destination codes
    #[arg(long)]
    destinations_file: Option<PathBuf>,

    /// Built-in list: busiest, short
    #[arg(long)]
    preset: Option<String>,
}

/// Configure logging based on verbosity level
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Parse cabin class string to CabinClass enum
fn parse_cabin(s: &str) -> Result<CabinClass> {
    CabinClass::from_str_name(s).with_context(|| {
        format!(
            "Invalid cabin class: {}. Use: coach, premium_coach, business, first",
            s
        )
    })
}

fn parse_alliance(s: &str) -> Result<Alliance> {
    Alliance::from_str_name(s)
        .with_context(|| format!("Invalid alliance: {}. Use: oneworld, skyteam, star", s))
}

/// Parse date string to NaiveDate
fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s.trim(), "%Y/%m/%d"))
        .context(format!(
            "Invalid date format: {}. Use YYYY-MM-DD or YYYY/MM/DD",
            s
        ))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .context(format!("Invalid time: {}. Use HH:MM", s))
}

fn ensure_not_past(date: NaiveDate) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    anyhow::ensure!(date >= today, "Departure date {} cannot be in the past", date);
    Ok(())
}

fn split_codes(s: &str) -> Vec<String> {
    s.split(',')
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Format duration in hours/minutes.
fn fmt_duration(minutes: u32) -> String {
    let hrs = minutes / 60;
    let mins = minutes % 60;
    if mins == 0 {
        format!("{}h", hrs)
    } else if hrs == 0 {
        format!("{}m", mins)
    } else {
        format!("{}h {:02}m", hrs, mins)
    }
}

/// `2018-12-12T18:15-05:00` -> `18:15`
fn short_time(timestamp: &str) -> &str {
    let time = timestamp.split_once('T').map_or(timestamp, |(_, t)| t);
    time.get(..5).unwrap_or(time)
}

fn fmt_times(trip: &CulledTrip) -> String {
    let dep = trip.leg.first().map_or("??:??", |l| short_time(&l.departure_time));
    let arr = trip.leg.last().map_or("??:??", |l| short_time(&l.arrival_time));
    format!("{} → {}", dep, arr)
}

/// "direct", "1 stop: JFK", "2 stops: JFK, DUB"
fn fmt_stops(trip: &CulledTrip) -> String {
    let via: Vec<&str> = trip
        .leg
        .iter()
        .take(trip.leg.len().saturating_sub(1))
        .map(|l| l.destination.as_str())
        .collect();
    match via.len() {
        0 => "direct".to_string(),
        1 => format!("1 stop: {}", via[0]),
        n => format!("{} stops: {}", n, via.join(", ")),
    }
}

/// Get terminal width for responsive tables
fn get_terminal_width() -> usize {
    term_size::dimensions().map(|(w, _)| w).unwrap_or(100)
}

fn dash_bar() -> String {
    "-".repeat(get_terminal_width().min(100))
}

/// Calculate column widths for carrier, times, duration and stops
fn calc_column_widths(trips: &[&CulledTrip]) -> (usize, usize, usize, usize) {
    let mut max_carrier = 7;
    let mut max_times = 15;
    let mut max_duration = 10;
    let mut max_stops = 20;

    for trip in trips {
        max_carrier = max(max_carrier, trip.carrier.len());
        max_times = max(max_times, fmt_times(trip).chars().count());
        max_duration = max(max_duration, fmt_duration(trip.total_duration()).len());
        max_stops = max(max_stops, fmt_stops(trip).len());
    }

    let available_width = get_terminal_width().saturating_sub(25);
    let total_content = max_carrier + max_times + max_duration + max_stops;
    if total_content > available_width && available_width > 50 {
        max_stops = max(max_stops.saturating_sub(total_content - available_width), 10);
    }

    (max_carrier, max_times, max_duration, max_stops)
}

/// Render results to stdout
fn render_results(records: &[CulledTrip]) {
    let Some(first) = records.first() else {
        println!("No trip options returned.");
        return;
    };

    println!(
        "================================================================================================\n  🛫  {} on {}\n================================================================================================\n",
        first.plan, first.departure_date
    );

    let summary = FareSummary::from_records(records);
    println!(
        "💰 Best Price:  {}",
        summary.cheapest.as_deref().unwrap_or("??")
    );
    println!("📊 Total Options: {}", summary.options);

    let mut ranked: Vec<&CulledTrip> = records.iter().collect();
    ranked.sort_by(|a, b| {
        a.price_amount()
            .unwrap_or(f64::MAX)
            .total_cmp(&b.price_amount().unwrap_or(f64::MAX))
    });
    ranked.truncate(5);

    let (cw, tw, dw, sw) = calc_column_widths(&ranked);

    println!("\n🏆 Top {} Results:", ranked.len());
    println!("{}\n", dash_bar());
    println!(
        "  {:>3}  {:<cw$}  {:<tw$}  {:<dw$}  {:<sw$}   PRICE",
        "#", "CARRIER", "DEP → ARR", "DURATION", "STOPS"
    );
    println!("{}\n", dash_bar());

    for (i, trip) in ranked.iter().enumerate() {
        println!(
            "  {:>3}  {:<cw$}  {:<tw$}  {:<dw$}  {:<sw$}   {}",
            i + 1,
            trip.carrier,
            fmt_times(trip),
            fmt_duration(trip.total_duration()),
            fmt_stops(trip),
            trip.price
        );
    }
}

fn render_batch(report: &BatchReport) {
    println!("{}", dash_bar());
    for job in &report.jobs {
        match &job.outcome {
            JobOutcome::Culled { options, cheapest } => println!(
                "  {:<12} {:>10}   ({} options)",
                job.label,
                cheapest.as_deref().unwrap_or("??"),
                options
            ),
            JobOutcome::Passthrough { .. } => {
                println!("  {:<12} {:>10}", job.label, "no results")
            }
            JobOutcome::Failed { error, .. } => {
                println!("  {:<12} {:>10}   {}", job.label, "failed", error)
            }
        }
    }
    println!("{}", dash_bar());
    println!(
        "📊 {} searches, {} records, {} without results, {} failed",
        report.jobs.len(),
        report.records.len(),
        report.passthroughs(),
        report.failures()
    );
}

/// Send one search, show it, and persist whatever came back.
async fn send_and_save(
    client: &QpxClient,
    search: FareSearch,
    output: Option<&Path>,
) -> Result<ExitCode> {
    match search.send(client).await {
        Ok(sent) => match sent.normalize_today() {
            CullOutcome::Culled(records) => {
                render_results(&records);
                let path = dump_json(&records, output).await?;
                println!("\nData saved as {}", path.display());
                Ok(ExitCode::SUCCESS)
            }
            CullOutcome::Passthrough(raw) => {
                tracing::warn!("Response did not have the expected shape; saving it unchanged");
                let path = dump_json(&raw, output).await?;
                println!("Unrecognized response saved as {}", path.display());
                Ok(ExitCode::FAILURE)
            }
        },
        Err(FareSearchError::Provider {
            status,
            message,
            payload,
        }) => {
            let path = dump_json(&payload, output).await?;
            println!(
                "Provider error (HTTP {}): {}\nRaw response saved as {}",
                status,
                message,
                path.display()
            );
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("Search failed"),
    }
}

async fn run_search(client: &QpxClient, args: SearchArgs) -> Result<ExitCode> {
    let depart_date = parse_date(&args.date)?;
    ensure_not_past(depart_date)?;
    let return_date = args.return_date.as_deref().map(parse_date).transpose()?;
    if let Some(rd) = return_date {
        anyhow::ensure!(
            rd >= depart_date,
            "Return date {} is before departure date {}",
            rd,
            depart_date
        );
    }

    let mut builder = TripLeg::builder(args.from.to_uppercase(), args.to.to_uppercase(), depart_date);
    if let Some(cabin) = &args.cabin {
        builder = builder.preferred_cabin(parse_cabin(cabin)?);
    }
    if let Some(stops) = args.max_stops {
        builder = builder.max_stops(stops);
    }
    if let Some(minutes) = args.max_connection {
        builder = builder.max_connection_duration(minutes);
    }
    if args.earliest.is_some() || args.latest.is_some() {
        let earliest = parse_time(args.earliest.as_deref().unwrap_or("00:00"))?;
        let latest = parse_time(args.latest.as_deref().unwrap_or("23:59"))?;
        builder = builder.departure_window(earliest, latest);
    }
    if let Some(carriers) = &args.permitted_carriers {
        builder = builder.permitted_carriers(split_codes(carriers));
    }
    if let Some(carriers) = &args.prohibited_carriers {
        builder = builder.prohibited_carriers(split_codes(carriers));
    }
    if let Some(alliance) = &args.alliance {
        builder = builder.alliance(parse_alliance(alliance)?);
    }
    let outbound = builder.build().context("Failed to build trip leg")?;

    let mut search_builder =
        FareSearch::builder(args.passengers.to_passengers()).solutions(args.solutions);
    if let Some(price) = &args.max_price {
        search_builder = search_builder.max_price(price.parse::<MaxPrice>()?);
    }
    if let Some(country) = args.sale_country {
        search_builder = search_builder.sale_country(country);
    }
    if let Some(country) = args.ticketing_country {
        search_builder = search_builder.ticketing_country(country);
    }
    if let Some(refundable) = args.refundable {
        search_builder = search_builder.refundable(refundable);
    }
    let mut search = search_builder
        .build()
        .context("Failed to build search parameters")?;

    if let Some(rd) = return_date {
        let inbound = outbound.reversed(rd);
        search.add_leg(outbound).add_leg(inbound);
    } else {
        search.add_leg(outbound);
    }

    send_and_save(client, search, args.output.as_deref()).await
}

async fn prompt<R>(lines: &mut tokio::io::Lines<R>, question: &str) -> Result<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut stdout = tokio::io::stdout();
    stdout.write_all(question.as_bytes()).await?;
    stdout.flush().await?;
    let line = lines
        .next_line()
        .await?
        .context("Input ended before the journey was complete")?;
    Ok(line.trim().to_string())
}

async fn run_multi(
    client: &QpxClient,
    passengers: Passengers,
    output: Option<&Path>,
) -> Result<ExitCode> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let leg_count: usize = prompt(
        &mut lines,
        &format!(
            "How many legs do you have in your journey? (Maximum = {}): ",
            MAX_INTERACTIVE_LEGS
        ),
    )
    .await?
    .parse()
    .context("Leg count must be a number")?;
    anyhow::ensure!(
        (1..=MAX_INTERACTIVE_LEGS).contains(&leg_count),
        "Leg count must be between 1 and {}",
        MAX_INTERACTIVE_LEGS
    );

    let mut triples = Vec::with_capacity(leg_count);
    for i in 1..=leg_count {
        let origin = prompt(
            &mut lines,
            &format!("Three letter IATA code of the origin city for leg {}: ", i),
        )
        .await?
        .to_uppercase();
        let destination = prompt(
            &mut lines,
            &format!("Three letter IATA code of the destination city for leg {}: ", i),
        )
        .await?
        .to_uppercase();
        let date = parse_date(
            &prompt(&mut lines, &format!("Date to depart {} (YYYY-MM-DD): ", origin)).await?,
        )?;
        ensure_not_past(date)?;
        triples.push((origin, destination, date));
    }

    let legs = legs_from_triples(&triples).context("Invalid journey")?;
    let mut search = FareSearch::builder(passengers)
        .build()
        .context("Failed to build search parameters")?;
    for leg in legs {
        search.add_leg(leg);
    }

    send_and_save(client, search, output).await
}

async fn resolve_destinations(source: &DestinationSource) -> Result<Vec<String>> {
    if let Some(list) = &source.destinations {
        return Ok(split_codes(list));
    }
    if let Some(path) = &source.destinations_file {
        return load_destinations(path).await;
    }
    let name = source.preset.as_deref().unwrap_or_default();
    let codes = preset(name).with_context(|| format!("Unknown preset: {}. Use: busiest, short", name))?;
    Ok(codes.iter().map(|c| c.to_string()).collect())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = CliArgs::parse();
    setup_logging(args.verbose);

    tracing::info!("Starting delulu-fares CLI");
    tracing::debug!("Command: {:?}", args.command);

    let config = ProviderConfig {
        base_url: args.base_url,
        api_key: args.api_key,
        timeout_secs: args.timeout,
        connect_timeout_secs: args.connect_timeout,
    };
    tracing::debug!("Provider: {:?}", config);
    let client = QpxClient::new(config).context("Failed to create QPX client")?;
    let today = chrono::Local::now().date_naive();

    match args.command {
        Command::Search(search_args) => run_search(&client, search_args).await,
        Command::Multi { passengers, output } => {
            run_multi(&client, passengers.to_passengers(), output.as_deref()).await
        }
        Command::Batch {
            from,
            date,
            destinations,
            passengers,
            full_report,
            output,
        } => {
            let date = parse_date(&date)?;
            ensure_not_past(date)?;
            let destinations = resolve_destinations(&destinations).await?;
            let jobs = jobs_for_destinations(&from, &destinations, date, passengers.to_passengers())
                .context("Invalid batch")?;

            let report = run_batch(&client, jobs, today).await;
            render_batch(&report);
            let path = if full_report {
                dump_json(&report, output.as_deref()).await?
            } else {
                dump_json(&report.records, output.as_deref()).await?
            };
            println!("Data saved as {}", path.display());
            Ok(if report.records.is_empty() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Command::Calendar {
            from,
            to,
            start,
            end,
            passengers,
            output,
        } => {
            let start = parse_date(&start)?;
            let end = parse_date(&end)?;
            ensure_not_past(start)?;
            let jobs = jobs_for_date_range(&from, &to, start, end, passengers.to_passengers())
                .context("Invalid date range")?;

            let report = run_batch(&client, jobs, today).await;
            render_batch(&report);
            let path = dump_json(&report.records, output.as_deref()).await?;
            println!("Data saved as {}", path.display());
            Ok(if report.records.is_empty() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}
