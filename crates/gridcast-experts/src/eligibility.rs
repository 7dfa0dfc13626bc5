//! Bankroll state and the eligibility gate.
//!
//! Eligibility is an SLO, not a skill judgment: an expert stays in the
//! council pool while it keeps producing schema-valid bundles fast enough.
//! Both inputs are exponential moving averages so one bad game degrades
//! but does not immediately evict.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Minimum schema-validity EMA to remain eligible.
pub const VALIDITY_THRESHOLD: f64 = 0.985;

/// Maximum average bundle latency to remain eligible, in milliseconds.
pub const LATENCY_THRESHOLD_MS: f64 = 6_000.0;

/// EMA smoothing factor for both gate inputs.
pub const GATE_EMA_LAMBDA: f64 = 0.2;

/// Starting bankroll for every expert, in units.
pub const STARTING_UNITS: Decimal = Decimal::from_parts(100, 0, 0, false, 0);

/// Update an exponential moving average with one observation.
pub fn ema(previous: f64, observation: f64, lambda: f64) -> f64 {
    (1.0 - lambda).mul_add(previous, lambda * observation)
}

/// Virtual bankroll for one `(run, expert)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bankroll {
    /// Units currently held.
    pub current_units: Decimal,
    /// Units at run start.
    pub starting_units: Decimal,
    /// High-water mark.
    pub peak_units: Decimal,
}

impl Bankroll {
    /// A fresh bankroll at the starting balance.
    pub const fn fresh() -> Self {
        Self {
            current_units: STARTING_UNITS,
            starting_units: STARTING_UNITS,
            peak_units: STARTING_UNITS,
        }
    }

    /// Apply a settlement delta (positive = win, negative = loss) and
    /// maintain the high-water mark. Balances floor at zero.
    pub fn settle(&mut self, delta: Decimal) {
        self.current_units = self.current_units.saturating_add(delta).max(Decimal::ZERO);
        if self.current_units > self.peak_units {
            self.peak_units = self.current_units;
        }
    }

    /// Fractional drawdown from the peak, in `[0, 1]`.
    pub fn drawdown(&self) -> Decimal {
        if self.peak_units <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        (self.peak_units - self.current_units)
            .checked_div(self.peak_units)
            .unwrap_or(Decimal::ZERO)
    }
}

impl Default for Bankroll {
    fn default() -> Self {
        Self::fresh()
    }
}

/// The rolling SLO state gating an expert's council participation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityGate {
    /// EMA of schema validity (1 per valid bundle, 0 per invalid).
    pub schema_validity_rate: f64,
    /// EMA of bundle generation latency in milliseconds.
    pub avg_latency_ms: f64,
    /// Whether the expert currently passes both thresholds.
    pub eligible: bool,
}

impl EligibilityGate {
    /// A fresh gate: fully valid, zero latency, eligible.
    pub const fn fresh() -> Self {
        Self {
            schema_validity_rate: 1.0,
            avg_latency_ms: 0.0,
            eligible: true,
        }
    }

    /// Fold one bundle observation into the gate and recompute
    /// eligibility.
    pub fn observe(&mut self, schema_valid: bool, latency_ms: u64) {
        let validity = if schema_valid { 1.0 } else { 0.0 };
        self.schema_validity_rate = ema(self.schema_validity_rate, validity, GATE_EMA_LAMBDA);
        self.avg_latency_ms = ema(self.avg_latency_ms, latency_ms as f64, GATE_EMA_LAMBDA);
        self.eligible = self.schema_validity_rate >= VALIDITY_THRESHOLD
            && self.avg_latency_ms <= LATENCY_THRESHOLD_MS;
    }
}

impl Default for EligibilityGate {
    fn default() -> Self {
        Self::fresh()
    }
}
