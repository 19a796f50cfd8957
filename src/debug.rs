use crate::protocol::{Message, MessagePayload};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};

static DEBUG_MODE: AtomicBool = AtomicBool::new(false);
static TRACE_MODE: AtomicBool = AtomicBool::new(false);

/// Initialize debug mode from environment variables
///
/// - `POSE_DEBUG=1`: Enable JSON pretty-printing of all messages
/// - `POSE_TRACE=1`: Enable human-readable trace logging of operations
pub fn init_debug_mode() {
    let debug = env::var("POSE_DEBUG").is_ok();
    let trace = env::var("POSE_TRACE").is_ok();

    DEBUG_MODE.store(debug, Ordering::Relaxed);
    TRACE_MODE.store(trace, Ordering::Relaxed);

    if debug {
        eprintln!("[POSE-LINK] Debug mode enabled - all messages will be logged as JSON");
    }

    if trace {
        eprintln!("[POSE-LINK] Trace mode enabled - human-readable operation logs");
    }
}

/// Check if debug mode is enabled
pub fn is_debug_enabled() -> bool {
    DEBUG_MODE.load(Ordering::Relaxed)
}

/// Check if trace mode is enabled
pub fn is_trace_enabled() -> bool {
    TRACE_MODE.load(Ordering::Relaxed)
}

/// Log a message in JSON format if debug mode is enabled
pub fn log_message(direction: &str, message: &Message) {
    if !is_debug_enabled() {
        return;
    }

    match serde_json::to_string_pretty(message) {
        Ok(json) => {
            eprintln!("\n[POSE-LINK] {} Message:\n{}\n", direction, json);
        }
        Err(e) => {
            eprintln!("[POSE-LINK] Failed to serialize message to JSON: {}", e);
        }
    }
}

/// Trace a snapshot dropped for arriving out of order
pub fn trace_snapshot_drop(timestamp: f64, tail_timestamp: f64) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!(
        "[POSE-LINK] Dropped out-of-order snapshot: t={:.4} behind tail t={:.4}",
        timestamp, tail_timestamp
    );
}

/// Trace a buffer underrun resolved by holding the last known state
pub fn trace_underrun(entity_id: u32, query_time: f64) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!(
        "[POSE-LINK] Buffer underrun for entity {} at t={:.4}, holding last state",
        entity_id, query_time
    );
}

/// Trace a teleport application
pub fn trace_teleport(entity_id: u32, timestamp: f64) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!(
        "[POSE-LINK] Teleport applied for entity {} at t={:.4}, history cleared",
        entity_id, timestamp
    );
}

/// Trace a send-rate decision
pub fn trace_rate_limit(allowed: bool, now: f64, interval: f64) {
    if !is_trace_enabled() {
        return;
    }

    let status = if allowed { "SEND" } else { "SUPPRESS" };
    eprintln!(
        "[POSE-LINK] Rate limit: {} at t={:.4} (interval {:.4}s)",
        status, now, interval
    );
}

/// Trace the interpolation clock against its target
pub fn trace_drift(interpolation_time: f64, target: f64, drift_scale: f64) {
    if !is_trace_enabled() {
        return;
    }

    eprintln!(
        "[POSE-LINK] Clock t={:.4} target={:.4} scale={:.3}",
        interpolation_time, target, drift_scale
    );
}

/// Create a debug summary of a message
pub fn message_summary(message: &Message) -> String {
    match &message.payload {
        MessagePayload::Snapshot { entity_id, .. } => {
            format!("Snapshot entity {} (seq: {})", entity_id, message.header.sequence)
        }
        MessagePayload::Teleport { entity_id, .. } => {
            format!("Teleport entity {} (seq: {})", entity_id, message.header.sequence)
        }
        MessagePayload::AuthorityGrant { entity_id } => {
            format!("AuthorityGrant entity {} (seq: {})", entity_id, message.header.sequence)
        }
        MessagePayload::AuthorityRevoke { entity_id } => {
            format!("AuthorityRevoke entity {} (seq: {})", entity_id, message.header.sequence)
        }
    }
}
