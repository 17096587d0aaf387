//! ID and seed generation utilities for promptloom
//!
//! Provides task identifiers and the seed sequence used by repeated generation jobs.

use rand::Rng;

/// Upper bound (exclusive) for generation seeds.
pub const SEED_MOD: u32 = 2_100_000_000;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique task ID
///
/// Format: `task-{timestamp_ms}-{random_hex}`
/// Example: `task-1738300800123-a1b2c3d4`
pub fn generate_task_id() -> String {
    let timestamp = now_ms();
    let random: u32 = rand::rng().random();
    format!("task-{}-{:08x}", timestamp, random)
}

/// Draw a fresh seed in `[1, SEED_MOD)`.
pub fn random_base_seed() -> u32 {
    rand::rng().random_range(1..SEED_MOD)
}

/// Advance a seed to the next value in the per-job sequence.
///
/// xorshift on signed 32-bit words, reduced into `[1, SEED_MOD)`.
pub fn step_seed(seed: u32) -> u32 {
    let mut s = seed as i32;
    s ^= s.wrapping_shl(13);
    s ^= s >> 17;
    s ^= s.wrapping_shl(5);
    ((s as u32) % SEED_MOD).max(1)
}
