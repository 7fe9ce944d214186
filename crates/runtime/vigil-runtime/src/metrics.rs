use prometheus::{register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge, opts};
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge};
use lazy_static::lazy_static;

lazy_static! {
    pub static ref FORWARD_ROUNDS_TOTAL: IntCounter =
        register_int_counter!(
            opts!("vigil_forward_rounds_total", "Total forward rounds dispatched to sampled workers")
        ).unwrap();

    pub static ref WORKER_RESPONSES_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("vigil_worker_responses_total", "Worker call outcomes, by outcome"),
            &["outcome"] // "valid", "missing"
        ).unwrap();

    pub static ref WORKER_RESPONSE_LATENCY_SECONDS: Histogram =
        register_histogram!(
            "vigil_worker_response_latency_seconds",
            "Latency of worker calls that produced a valid response",
            vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 40.0]
        ).unwrap();

    pub static ref REPUTATION_UPDATES_TOTAL: IntCounter =
        register_int_counter!(
            opts!("vigil_reputation_updates_total", "Number of EMA reputation updates applied")
        ).unwrap();

    pub static ref NON_FINITE_REWARDS_TOTAL: IntCounter =
        register_int_counter!(
            opts!("vigil_non_finite_rewards_total", "Non-finite reward values replaced with zero")
        ).unwrap();

    pub static ref RECONCILIATIONS_TOTAL: IntCounter =
        register_int_counter!(
            opts!("vigil_reconciliations_total", "Registry reconciliations that changed worker identities or size")
        ).unwrap();

    pub static ref REPLACED_WORKERS_TOTAL: IntCounter =
        register_int_counter!(
            opts!("vigil_replaced_workers_total", "Worker slots whose identity was replaced")
        ).unwrap();

    pub static ref WEIGHT_SUBMISSIONS_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("vigil_weight_submissions_total", "Weight submissions to the ledger, by result"),
            &["result"] // "attempt", "success", "failure"
        ).unwrap();

    pub static ref LOOP_RUNS_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("vigil_loop_runs_total", "Scheduled units of work executed, by loop and result"),
            &["loop", "result"]
        ).unwrap();

    pub static ref STATE_SAVES_TOTAL: IntCounterVec =
        register_int_counter_vec!(
            opts!("vigil_state_saves_total", "Validator state persistence attempts, by result"),
            &["result"]
        ).unwrap();

    pub static ref LIVE_WORKERS: IntGauge =
        register_int_gauge!(
            opts!("vigil_live_workers", "Workers that answered the latest liveness probe")
        ).unwrap();
}

pub fn record_forward_round() {
    FORWARD_ROUNDS_TOTAL.inc();
}

/// Record how many sampled workers answered and how many did not.
pub fn record_worker_responses(valid: usize, missing: usize) {
    WORKER_RESPONSES_TOTAL.with_label_values(&["valid"]).inc_by(valid as u64);
    WORKER_RESPONSES_TOTAL.with_label_values(&["missing"]).inc_by(missing as u64);
}

pub fn observe_worker_latency(duration_secs: f64) {
    WORKER_RESPONSE_LATENCY_SECONDS.observe(duration_secs);
}

pub fn record_reputation_update() {
    REPUTATION_UPDATES_TOTAL.inc();
}

pub fn record_non_finite_rewards(count: usize) {
    NON_FINITE_REWARDS_TOTAL.inc_by(count as u64);
}

pub fn record_reconciliation(replaced: usize) {
    RECONCILIATIONS_TOTAL.inc();
    REPLACED_WORKERS_TOTAL.inc_by(replaced as u64);
}

pub fn record_weight_submission(result: &str) {
    WEIGHT_SUBMISSIONS_TOTAL.with_label_values(&[result]).inc();
}

/// Record one unit of work of a scheduler loop ("sync", "health", "volume", "scoring", "auto_update").
pub fn record_loop_run(loop_name: &str, ok: bool) {
    let result = if ok { "success" } else { "failure" };
    LOOP_RUNS_TOTAL.with_label_values(&[loop_name, result]).inc();
}

pub fn record_state_save(ok: bool) {
    let result = if ok { "success" } else { "failure" };
    STATE_SAVES_TOTAL.with_label_values(&[result]).inc();
}

pub fn set_live_workers(count: usize) {
    LIVE_WORKERS.set(count as i64);
}
