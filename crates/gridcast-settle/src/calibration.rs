//! Calibration bucket updates.
//!
//! Binary/enum outcomes increment the Beta posterior; numeric outcomes
//! fold their error into the EMA with a settlement-lag-discounted rate:
//!
//! ```text
//! lambda = 0.1 * decay(days_since_prediction, H)
//! mu'    = (1 - lambda) * mu + lambda * error
//! sigma' = sqrt((1 - lambda) * sigma^2 + lambda * (error - mu')^2)
//! ```

use gridcast_experts::DecayEngine;
use gridcast_store::CalibrationBucket;

use crate::grading::Grade;

/// Base EMA rate before settlement-lag discounting.
pub const LAMBDA_BASE: f64 = 0.1;

/// Fold one grade into a bucket.
///
/// `days_since_prediction` is the lag between the bundle's creation and
/// settlement; a long lag shrinks the learning rate through the expert's
/// decay curve.
pub fn apply_grade(
    bucket: &mut CalibrationBucket,
    grade: &Grade,
    engine: &DecayEngine,
    days_since_prediction: f64,
) {
    match (grade.correct, grade.abs_error) {
        (Some(correct), _) => {
            if correct {
                bucket.alpha += 1.0;
            } else {
                bucket.beta += 1.0;
            }
        }
        (None, Some(error)) => {
            let lambda = engine.learning_rate(LAMBDA_BASE, days_since_prediction);
            let mu_new = (1.0 - lambda).mul_add(bucket.ema_mean, lambda * error);
            let variance_new = (1.0 - lambda)
                .mul_add(bucket.ema_stdev.powi(2), lambda * (error - mu_new).powi(2));
            bucket.ema_mean = mu_new;
            bucket.ema_stdev = variance_new.max(0.0).sqrt();
        }
        (None, None) => return,
    }
    bucket.samples = bucket.samples.saturating_add(1);
    bucket.updated_at = chrono::Utc::now();
}
