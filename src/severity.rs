//! Time-decayed symptom severity scoring.
//!
//! Pure computation, no I/O: the same elapsed time and the same selections
//! always produce the same score, so every symptom update can simply
//! re-score from scratch.
//!
//! Each symptom attribute carries a curve of (elapsed-minutes, score)
//! breakpoints. A symptom's contribution at time `t` is the score of the
//! breakpoint at or before `t`; before the first breakpoint the first
//! applies, past the last the last applies. Core attributes contribute their
//! maximum, Modifier attributes their sum, and the total is clamped to the
//! configured ceiling.

use std::collections::HashMap;

use crate::model::{SymptomCategory, SymptomConfig, TimeScorePoint, VenomType};

/// Score of one symptom curve at `elapsed_minutes`.
///
/// Step lookup, not interpolation: the breakpoint at or before the elapsed
/// time wins. Returns 0.0 for an empty curve.
pub fn score_at(points: &[TimeScorePoint], elapsed_minutes: i64) -> f64 {
    let Some(first) = points.first() else {
        return 0.0;
    };

    if elapsed_minutes <= first.minutes {
        return first.score;
    }

    points
        .iter()
        .take_while(|p| p.minutes <= elapsed_minutes)
        .last()
        .map(|p| p.score)
        .unwrap_or(first.score)
}

/// Aggregate severity for a set of selected symptom attributes.
///
/// `selections` must already be validated against the config set; keys with
/// no matching config are ignored here.
pub fn score(
    elapsed_minutes: i64,
    selections: &[String],
    configs: &[SymptomConfig],
    ceiling: f64,
) -> f64 {
    let by_key: HashMap<&str, &SymptomConfig> =
        configs.iter().map(|c| (c.key.as_str(), c)).collect();

    let mut core_max: f64 = 0.0;
    let mut modifier_sum: f64 = 0.0;

    for key in selections {
        let Some(config) = by_key.get(key.as_str()) else {
            continue;
        };

        let value = score_at(&config.time_scores, elapsed_minutes);
        match config.category {
            SymptomCategory::Core => core_max = core_max.max(value),
            SymptomCategory::Modifier => modifier_sum += value,
        }
    }

    (core_max + modifier_sum).min(ceiling)
}

/// The most dangerous venom type suggested by the selected symptoms.
///
/// Highest severity index wins; ties break toward the lower id so the result
/// is stable.
pub fn likely_venom<'a>(
    selections: &[String],
    configs: &[SymptomConfig],
    venoms: &'a [VenomType],
) -> Option<&'a VenomType> {
    let by_key: HashMap<&str, &SymptomConfig> =
        configs.iter().map(|c| (c.key.as_str(), c)).collect();

    let mut candidate: Option<&VenomType> = None;

    for key in selections {
        let Some(venom_id) = by_key.get(key.as_str()).and_then(|c| c.venom_type_id) else {
            continue;
        };
        let Some(venom) = venoms.iter().find(|v| v.id == venom_id) else {
            continue;
        };

        candidate = match candidate {
            None => Some(venom),
            Some(best)
                if venom.severity_index > best.severity_index
                    || (venom.severity_index == best.severity_index && venom.id < best.id) =>
            {
                Some(venom)
            }
            Some(best) => Some(best),
        };
    }

    candidate
}
