use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, OnceLock},
};

static METRICS: OnceLock<Mutex<MetricsState>> = OnceLock::new();

#[derive(Default)]
struct MetricsState {
    rpc_reads: HashMap<&'static str, u64>,
    rpc_read_errors: HashMap<&'static str, u64>,
    // RPC 时延统计（毫秒）
    rpc_latency_sum_ms: u128,
    // 简易直方图分桶（毫秒）：<50, <100, <250, <500, <1000, >=1000
    rpc_hist_buckets: [u64; 6],
    // 按管线字段统计（meta_address / token / ens）
    deduplicated: HashMap<&'static str, u64>,
    stale_dropped: HashMap<&'static str, u64>,
    // 按交易类型统计（approve / transfer / register）
    tx_submitted: HashMap<&'static str, u64>,
    tx_failed: HashMap<&'static str, u64>,
}

fn state() -> MutexGuard<'static, MetricsState> {
    let lock = METRICS.get_or_init(|| Mutex::new(MetricsState::default()));
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(), // 避免因锁污染导致 panic
    }
}

pub fn observe_rpc_read(method: &'static str, latency_ms: u128, ok: bool) {
    let mut s = state();
    *s.rpc_reads.entry(method).or_insert(0) += 1;
    if !ok {
        *s.rpc_read_errors.entry(method).or_insert(0) += 1;
    }
    s.rpc_latency_sum_ms += latency_ms;
    let b = if latency_ms < 50 {
        0
    } else if latency_ms < 100 {
        1
    } else if latency_ms < 250 {
        2
    } else if latency_ms < 500 {
        3
    } else if latency_ms < 1000 {
        4
    } else {
        5
    };
    s.rpc_hist_buckets[b] += 1;
}

pub fn inc_deduplicated(field: &'static str) {
    *state().deduplicated.entry(field).or_insert(0) += 1;
}

pub fn inc_stale_dropped(field: &'static str) {
    *state().stale_dropped.entry(field).or_insert(0) += 1;
}

pub fn inc_tx_submitted(kind: &'static str) {
    *state().tx_submitted.entry(kind).or_insert(0) += 1;
}

pub fn inc_tx_failed(kind: &'static str) {
    *state().tx_failed.entry(kind).or_insert(0) += 1;
}

fn render_labeled(
    out: &mut String,
    name: &str,
    help: &str,
    label: &str,
    values: &HashMap<&'static str, u64>,
) {
    out.push_str(&format!("# HELP {} {}\n", name, help));
    out.push_str(&format!("# TYPE {} counter\n", name));
    let mut entries: Vec<_> = values.iter().collect();
    entries.sort_by_key(|(k, _)| **k);
    for (k, v) in entries {
        out.push_str(&format!("{}{{{}=\"{}\"}} {}\n", name, label, k, v));
    }
}

pub fn render_prometheus() -> String {
    let s = state();
    let mut out = String::new();

    render_labeled(
        &mut out,
        "stealthereum_rpc_reads_total",
        "Contract reads issued",
        "method",
        &s.rpc_reads,
    );
    render_labeled(
        &mut out,
        "stealthereum_rpc_read_errors_total",
        "Contract reads that failed",
        "method",
        &s.rpc_read_errors,
    );

    out.push_str("# HELP stealthereum_rpc_latency_ms_sum Sum of contract read latency\n");
    out.push_str("# TYPE stealthereum_rpc_latency_ms_sum counter\n");
    out.push_str(&format!(
        "stealthereum_rpc_latency_ms_sum {}\n",
        s.rpc_latency_sum_ms
    ));
    out.push_str("# HELP stealthereum_rpc_latency_ms_bucket Contract read latency histogram\n");
    out.push_str("# TYPE stealthereum_rpc_latency_ms_bucket counter\n");
    let bounds = ["50", "100", "250", "500", "1000", "+Inf"];
    let mut cumulative = 0u64;
    for (bound, count) in bounds.iter().zip(s.rpc_hist_buckets.iter()) {
        cumulative += count;
        out.push_str(&format!(
            "stealthereum_rpc_latency_ms_bucket{{le=\"{}\"}} {}\n",
            bound, cumulative
        ));
    }

    render_labeled(
        &mut out,
        "stealthereum_lookups_deduplicated_total",
        "Lookups skipped because the same input was pending or done",
        "field",
        &s.deduplicated,
    );
    render_labeled(
        &mut out,
        "stealthereum_stale_results_dropped_total",
        "Results discarded because a newer input superseded them",
        "field",
        &s.stale_dropped,
    );
    render_labeled(
        &mut out,
        "stealthereum_transactions_submitted_total",
        "Transactions broadcast",
        "kind",
        &s.tx_submitted,
    );
    render_labeled(
        &mut out,
        "stealthereum_transactions_failed_total",
        "Transactions that failed or reverted",
        "kind",
        &s.tx_failed,
    );

    out
}
