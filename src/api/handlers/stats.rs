use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::accounting::report;
use crate::accounting::rollup::RollupStore;
use crate::models::stats::Scope;
use crate::sensor::IntakeCounters;

/// State shared between the reporting handlers and the sensor loop
pub struct AppState {
    pub rollup: Arc<RwLock<RollupStore>>,
    pub counters: Arc<IntakeCounters>,
    pub started_at: DateTime<Utc>,
    pub interface: String,
    pub interval_secs: u64,
}

/// Query parameters shared by the series and distribution endpoints
#[derive(Deserialize)]
pub struct SeriesQuery {
    /// Counter table to report on; defaults to hosts_v4
    pub scope: Option<String>,

    /// Range start as a unix timestamp; defaults to one hour before end
    pub start: Option<i64>,

    /// Range end as a unix timestamp; defaults to now
    pub end: Option<i64>,
}

/// Response for daemon status
#[derive(Serialize)]
struct StatusResponse {
    interface: String,
    started_at: DateTime<Utc>,
    uptime_secs: i64,
    interval_secs: u64,
    packets: u64,
    bytes: u64,
    ignored: u64,
    malformed: u64,
    intervals: u64,
    stored_points: usize,
    capacity_bound: usize,
}

fn parse_scope(raw: &Option<String>) -> Result<Scope, HttpResponse> {
    match raw {
        None => Ok(Scope::HostsV4),
        Some(name) => Scope::parse(name).ok_or_else(|| {
            HttpResponse::BadRequest().json(serde_json::json!({
                "status": "error",
                "message": format!(
                    "Unknown scope '{}'; expected one of hosts_v4, hosts_v6, pairs_v4, pairs_v6",
                    name
                )
            }))
        }),
    }
}

fn parse_range(query: &SeriesQuery) -> Result<(DateTime<Utc>, DateTime<Utc>), HttpResponse> {
    let bad_timestamp = |ts: i64| {
        HttpResponse::BadRequest().json(serde_json::json!({
            "status": "error",
            "message": format!("Timestamp {} is out of range", ts)
        }))
    };

    let end = match query.end {
        Some(ts) => Utc.timestamp_opt(ts, 0).single().ok_or_else(|| bad_timestamp(ts))?,
        None => Utc::now(),
    };
    let start = match query.start {
        Some(ts) => Utc.timestamp_opt(ts, 0).single().ok_or_else(|| bad_timestamp(ts))?,
        None => end - chrono::Duration::hours(1),
    };

    if start > end {
        return Err(HttpResponse::BadRequest().json(serde_json::json!({
            "status": "error",
            "message": "Range start is after range end"
        })));
    }
    Ok((start, end))
}

/// Get daemon status and intake counters
pub async fn get_status(state: web::Data<AppState>) -> impl Responder {
    let rollup = state.rollup.read().await;

    HttpResponse::Ok().json(StatusResponse {
        interface: state.interface.clone(),
        started_at: state.started_at,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        interval_secs: state.interval_secs,
        packets: state.counters.packets.load(Ordering::Relaxed),
        bytes: state.counters.bytes.load(Ordering::Relaxed),
        ignored: state.counters.ignored.load(Ordering::Relaxed),
        malformed: state.counters.malformed.load(Ordering::Relaxed),
        intervals: state.counters.intervals.load(Ordering::Relaxed),
        stored_points: rollup.stored_points(),
        capacity_bound: rollup.capacity_bound(),
    })
}

/// Get the historical sample series for one scope over a time range
pub async fn get_series(
    state: web::Data<AppState>,
    query: web::Query<SeriesQuery>,
) -> impl Responder {
    let scope = match parse_scope(&query.scope) {
        Ok(scope) => scope,
        Err(response) => return response,
    };
    let (start, end) = match parse_range(&query) {
        Ok(range) => range,
        Err(response) => return response,
    };

    let rollup = state.rollup.read().await;
    let points = rollup.render_series(scope, start, end);

    HttpResponse::Ok().json(serde_json::json!({
        "scope": scope,
        "start": start.timestamp(),
        "end": end.timestamp(),
        "points": points,
    }))
}

/// Get the cumulative distribution of per-sample traffic volume
pub async fn get_cdf(
    state: web::Data<AppState>,
    query: web::Query<SeriesQuery>,
) -> impl Responder {
    let scope = match parse_scope(&query.scope) {
        Ok(scope) => scope,
        Err(response) => return response,
    };

    let rollup = state.rollup.read().await;
    HttpResponse::Ok().json(rollup.cumulative_distribution(scope))
}

/// Get the cumulative distribution rendered as plain text
pub async fn get_cdf_text(
    state: web::Data<AppState>,
    query: web::Query<SeriesQuery>,
) -> impl Responder {
    let scope = match parse_scope(&query.scope) {
        Ok(scope) => scope,
        Err(response) => return response,
    };

    let rollup = state.rollup.read().await;
    let text = report::format_cdf(&rollup.cumulative_distribution(scope));
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(text)
}
