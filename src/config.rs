//! Dispatch configuration.
//!
//! Radius tiers, attempt counts, deadlines, and ceilings are deployment
//! tunables, not algorithmic constants. Everything here can be overridden
//! through `NAJA_*` environment variables; the defaults match the values the
//! engine was designed around (5/10/20 km, two tries per tier, 2 minute
//! response window, six sessions total).

use std::env;
use std::time::Duration;

/// Default search radius tiers in kilometers, smallest first.
pub const DEFAULT_RADIUS_TIERS_KM: [f64; 3] = [5.0, 10.0, 20.0];

/// Default number of sessions attempted at each radius tier.
pub const DEFAULT_ATTEMPTS_PER_TIER: u32 = 2;

/// Default response window granted to a pinged rescuer.
pub const DEFAULT_RESPONSE_DEADLINE_SECS: u64 = 120;

/// Default ceiling on sessions per incident.
pub const DEFAULT_MAX_SESSIONS: u32 = 6;

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 10;

/// Default ceiling for the aggregate severity score.
pub const DEFAULT_SEVERITY_CEILING: f64 = 100.0;

/// Tunables injected into every dispatch operation.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Search radius tiers in kilometers, strictly increasing.
    pub radius_tiers_km: Vec<f64>,

    /// Sessions attempted at each tier before escalating to the next.
    pub attempts_per_tier: u32,

    /// How long a pinged rescuer has to respond.
    pub response_deadline: Duration,

    /// Hard ceiling on sessions per incident.
    pub max_sessions: u32,

    /// Interval between background expiry sweeps.
    pub sweep_interval: Duration,

    /// Severity scores are clamped to this ceiling.
    pub severity_ceiling: f64,

    /// Optional webhook URL for outbound dispatch events.
    pub webhook_url: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            radius_tiers_km: DEFAULT_RADIUS_TIERS_KM.to_vec(),
            attempts_per_tier: DEFAULT_ATTEMPTS_PER_TIER,
            response_deadline: Duration::from_secs(DEFAULT_RESPONSE_DEADLINE_SECS),
            max_sessions: DEFAULT_MAX_SESSIONS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            severity_ceiling: DEFAULT_SEVERITY_CEILING,
            webhook_url: None,
        }
    }
}

impl DispatchConfig {
    /// Build a config from `NAJA_*` environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// Recognized variables:
    ///
    /// - `NAJA_RADIUS_TIERS_KM` - comma-separated list, e.g. "5,10,20"
    /// - `NAJA_ATTEMPTS_PER_TIER`
    /// - `NAJA_RESPONSE_DEADLINE_SECS`
    /// - `NAJA_MAX_SESSIONS`
    /// - `NAJA_SWEEP_INTERVAL_SECS`
    /// - `NAJA_SEVERITY_CEILING`
    /// - `NAJA_WEBHOOK_URL`
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let radius_tiers_km = env::var("NAJA_RADIUS_TIERS_KM")
            .ok()
            .and_then(|raw| parse_tiers(&raw))
            .unwrap_or(defaults.radius_tiers_km);

        let attempts_per_tier = env::var("NAJA_ATTEMPTS_PER_TIER")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n >= 1)
            .unwrap_or(defaults.attempts_per_tier);

        let response_deadline = env::var("NAJA_RESPONSE_DEADLINE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.response_deadline);

        let max_sessions = env::var("NAJA_MAX_SESSIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&n| n >= 1)
            .unwrap_or(defaults.max_sessions);

        let sweep_interval = env::var("NAJA_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.sweep_interval);

        let severity_ceiling = env::var("NAJA_SEVERITY_CEILING")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&c: &f64| c > 0.0)
            .unwrap_or(defaults.severity_ceiling);

        let webhook_url = env::var("NAJA_WEBHOOK_URL").ok().filter(|u| !u.is_empty());

        Self {
            radius_tiers_km,
            attempts_per_tier,
            response_deadline,
            max_sessions,
            sweep_interval,
            severity_ceiling,
            webhook_url,
        }
    }

    /// Total number of escalation slots before dispatch is exhausted.
    pub fn total_slots(&self) -> u32 {
        self.radius_tiers_km.len() as u32 * self.attempts_per_tier
    }
}

/// Parse a comma-separated tier list. Rejects empty lists and lists that are
/// not strictly increasing.
fn parse_tiers(raw: &str) -> Option<Vec<f64>> {
    let tiers: Vec<f64> = raw
        .split(',')
        .map(|t| t.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    if tiers.is_empty() || tiers.iter().any(|&r| r <= 0.0) {
        return None;
    }
    if tiers.windows(2).any(|w| w[0] >= w[1]) {
        return None;
    }

    Some(tiers)
}
