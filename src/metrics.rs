//! Prometheus metrics for the matrix engine.
//!
//! Exposed on the API server's /metrics endpoint for scraping.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_int_counter, CounterVec, Gauge, IntCounter,
};

lazy_static! {
    // Ingestion metrics
    pub static ref SWEEPS: IntCounter = register_int_counter!(
        "matrix_sweeps_total",
        "Total number of explorer sweeps completed"
    )
    .unwrap();

    pub static ref DEPOSITS_INGESTED: IntCounter = register_int_counter!(
        "matrix_deposits_ingested_total",
        "Total number of paired deposits accepted"
    )
    .unwrap();

    // Placement metrics
    pub static ref LOCATIONS_CREATED: IntCounter = register_int_counter!(
        "matrix_locations_created_total",
        "Total number of locations placed"
    )
    .unwrap();

    pub static ref LOCATIONS_STOPPED: IntCounter = register_int_counter!(
        "matrix_locations_stopped_total",
        "Total number of locations that reached their cap"
    )
    .unwrap();

    // Reward metrics
    pub static ref REWARDS_GRANTED: CounterVec = register_counter_vec!(
        "matrix_rewards_granted_total",
        "Total reward value granted (in system units)",
        &["reason"]
    )
    .unwrap();

    // Withdrawal metrics
    pub static ref WITHDRAWALS_PROCESSED: IntCounter = register_int_counter!(
        "matrix_withdrawals_processed_total",
        "Total number of withdrawal tickets processed"
    )
    .unwrap();

    // Error metrics
    pub static ref ERRORS: CounterVec = register_counter_vec!(
        "matrix_errors_total",
        "Total number of engine errors",
        &["engine"]
    )
    .unwrap();

    // Health
    pub static ref UP: Gauge = register_gauge!(
        "matrix_up",
        "Whether the matrix engine is up and running"
    )
    .unwrap();
}

pub fn record_sweep() {
    SWEEPS.inc();
}

pub fn record_deposit_ingested() {
    DEPOSITS_INGESTED.inc();
}

pub fn record_location_created() {
    LOCATIONS_CREATED.inc();
}

pub fn record_location_stopped() {
    LOCATIONS_STOPPED.inc();
}

pub fn record_reward(reason: &str, amount: i64) {
    REWARDS_GRANTED
        .with_label_values(&[reason])
        .inc_by(amount as f64);
}

pub fn record_withdrawal_processed() {
    WITHDRAWALS_PROCESSED.inc();
}

pub fn record_engine_error(engine: &str) {
    ERRORS.with_label_values(&[engine]).inc();
}
