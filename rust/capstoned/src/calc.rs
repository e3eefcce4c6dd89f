use crate::error::GradeError;
use crate::ids::{subject_id_str, subject_key};
use crate::rubric::{RubricCatalog, Track};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// One examiner's submission for one subject at one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkRecord {
    pub subject_id: String,
    pub stage: String,
    pub raw_score: f64,
    pub examiner_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Half-up 1-decimal rounding: `floor(10*x + 0.5) / 10`.
///
/// Monotone in `x`, so rounding never lets more credit produce a lower mark.
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct StageTally {
    sum_raw: f64,
    count: usize,
}

impl StageTally {
    fn push(&mut self, raw: f64) {
        self.sum_raw += raw;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum_raw / (self.count as f64))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageBreakdown {
    pub stage_id: String,
    pub max_raw_score: f64,
    pub weight_percent: f64,
    pub record_count: usize,
    pub mean_raw: Option<f64>,
    pub contribution: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    pub subject_id: String,
    pub track: Track,
    pub catalog_version: String,
    /// Graded stages only, each as a percentage of its own maximum.
    pub per_stage_display: BTreeMap<String, f64>,
    pub final_percent: f64,
    /// Every catalog stage in catalog order, graded or not.
    pub stages: Vec<StageBreakdown>,
}

/// Reduces the mark records of one subject into per-stage percentages and a
/// weighted final percentage.
///
/// Several records for the same stage are averaged. A stage with no records
/// contributes 0. A subject with no records yields an empty display map and
/// `final_percent == 0`.
///
/// # Errors
/// `GradeError::Configuration` when one of the subject's records names a
/// stage the catalog does not define.
pub fn aggregate(
    records: &[MarkRecord],
    subject_id: &str,
    catalog: &RubricCatalog,
) -> Result<AggregateResult, GradeError> {
    let track = catalog.track;
    let wanted = subject_key(track, subject_id);
    let mut tallies = vec![StageTally::default(); catalog.stages.len()];

    if !wanted.is_empty() {
        for r in records
            .iter()
            .filter(|r| subject_key(track, &r.subject_id) == wanted)
        {
            let idx = catalog.stage_index(&r.stage)?;
            tallies[idx].push(r.raw_score);
        }
    }

    let mut per_stage_display = BTreeMap::new();
    let mut stages = Vec::with_capacity(catalog.stages.len());
    let mut total = 0.0_f64;

    for (stage, tally) in catalog.stages.iter().zip(&tallies) {
        let mean_raw = tally.mean();
        let contribution = match mean_raw {
            Some(mean) => {
                let fraction = mean / stage.max_raw_score;
                per_stage_display.insert(
                    stage.stage_id.clone(),
                    round_off_1_decimal(fraction * 100.0),
                );
                fraction * stage.weight_percent
            }
            None => 0.0,
        };
        total += contribution;
        stages.push(StageBreakdown {
            stage_id: stage.stage_id.clone(),
            max_raw_score: stage.max_raw_score,
            weight_percent: stage.weight_percent,
            record_count: tally.count,
            mean_raw,
            contribution,
        });
    }

    Ok(AggregateResult {
        subject_id: subject_id_str(track, subject_id),
        track,
        catalog_version: catalog.version.clone(),
        per_stage_display,
        final_percent: round_off_1_decimal(total),
        stages,
    })
}

/// Keeps only the most recent record per `(subject, stage, examiner)`,
/// preserving input order. Ties on timestamp go to the later record.
pub fn latest_per_examiner(records: &[MarkRecord], track: Track) -> Vec<MarkRecord> {
    let mut winners: HashMap<(String, String, String), usize> = HashMap::new();
    for (i, r) in records.iter().enumerate() {
        let key = (
            subject_key(track, &r.subject_id),
            r.stage.trim().to_ascii_lowercase(),
            r.examiner_id.trim().to_ascii_lowercase(),
        );
        match winners.get(&key) {
            Some(&prev) if records[prev].timestamp > r.timestamp => {}
            _ => {
                winners.insert(key, i);
            }
        }
    }

    let mut keep: Vec<usize> = winners.into_values().collect();
    keep.sort_unstable();
    keep.into_iter().map(|i| records[i].clone()).collect()
}

/// Coordinator view: aggregates every subject and ranks by final percent
/// (highest first), then by subject id.
pub fn summarize(
    records: &[MarkRecord],
    subject_ids: &[String],
    catalog: &RubricCatalog,
) -> Result<Vec<AggregateResult>, GradeError> {
    let mut out = subject_ids
        .iter()
        .map(|s| aggregate(records, s, catalog))
        .collect::<Result<Vec<_>, _>>()?;
    out.sort_by(|a, b| match b.final_percent.total_cmp(&a.final_percent) {
        Ordering::Equal => a.subject_id.cmp(&b.subject_id),
        other => other,
    });
    Ok(out)
}
