//! Validation of examiner submissions before they reach the append-only
//! mark tables. Out-of-range or malformed scores are rejected here; the
//! aggregation engine never clamps.

use crate::error::GradeError;
use crate::ids::subject_id_str;
use crate::rubric::RubricCatalog;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

const SUM_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriterionScore {
    pub name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Default)]
pub struct MarkSubmission {
    pub subject_id: String,
    pub stage: String,
    pub raw_score: Option<f64>,
    pub criteria: Option<Vec<CriterionScore>>,
    pub examiner_id: String,
    pub remarks: Option<String>,
    /// Opaque signature payload captured by the examiner's client.
    pub signature: Option<String>,
}

/// A submission that passed every ingestion check, with the stage resolved
/// to its canonical catalog id.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMark {
    pub subject_id: String,
    pub stage: String,
    pub raw_score: f64,
    pub criteria: Vec<CriterionScore>,
    pub examiner_id: String,
    pub remarks: Option<String>,
    pub signature_digest: String,
}

pub fn validate_submission(
    sub: &MarkSubmission,
    catalog: &RubricCatalog,
) -> Result<ValidatedMark, GradeError> {
    let subject_id = subject_id_str(catalog.track, &sub.subject_id);
    if subject_id.is_empty() {
        return Err(GradeError::validation("subjectId", "a student or group is required"));
    }
    let examiner_id = sub.examiner_id.trim().to_string();
    if examiner_id.is_empty() {
        return Err(GradeError::validation("examiner", "examiner is required"));
    }

    let stage = catalog.stage_weight(&sub.stage)?;

    let signature = sub.signature.as_deref().map(str::trim).unwrap_or("");
    if signature.is_empty() {
        return Err(GradeError::validation(
            "signature",
            "digital signature is required before submission",
        ));
    }

    let (raw_score, criteria) = match &sub.criteria {
        Some(given) => {
            let criteria = resolve_criteria(given, stage.criteria.as_slice(), &stage.stage_id)?;
            let total: f64 = criteria.iter().map(|c| c.score).sum();
            if let Some(raw) = sub.raw_score {
                if (raw - total).abs() > SUM_TOLERANCE {
                    return Err(GradeError::validation_with(
                        "rawScore",
                        format!("rawScore {raw} does not match criteria total {total}"),
                        json!(raw),
                    ));
                }
            }
            (total, criteria)
        }
        None => {
            let Some(raw) = sub.raw_score else {
                return Err(GradeError::validation(
                    "rawScore",
                    "rawScore or criteria is required",
                ));
            };
            (raw, Vec::new())
        }
    };

    check_bounds("rawScore", raw_score, stage.max_raw_score)?;

    Ok(ValidatedMark {
        subject_id,
        stage: stage.stage_id.clone(),
        raw_score,
        criteria,
        examiner_id,
        remarks: sub
            .remarks
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        signature_digest: signature_digest(signature),
    })
}

/// Lowercase hex SHA-256 of the signature payload. Only the digest is
/// stored.
pub fn signature_digest(signature: &str) -> String {
    format!("{:x}", Sha256::digest(signature.as_bytes()))
}

fn check_bounds(field: &str, value: f64, max: f64) -> Result<(), GradeError> {
    if !value.is_finite() {
        return Err(GradeError::validation(field, "score must be a finite number"));
    }
    if value < 0.0 || value > max {
        return Err(GradeError::validation_with(
            field,
            format!("score must be within [0, {max}]"),
            json!(value),
        ));
    }
    Ok(())
}

fn resolve_criteria(
    given: &[CriterionScore],
    defined: &[crate::rubric::Criterion],
    stage_id: &str,
) -> Result<Vec<CriterionScore>, GradeError> {
    if defined.is_empty() {
        return Err(GradeError::validation(
            "criteria",
            format!("stage `{stage_id}` is not scored by criteria"),
        ));
    }

    let mut scores: Vec<Option<f64>> = vec![None; defined.len()];
    for c in given {
        let Some(idx) = defined
            .iter()
            .position(|d| d.name.eq_ignore_ascii_case(c.name.trim()))
        else {
            return Err(GradeError::validation_with(
                "criteria",
                format!("unknown criterion for stage `{stage_id}`"),
                json!(c.name),
            ));
        };
        if scores[idx].is_some() {
            return Err(GradeError::validation_with(
                "criteria",
                "criterion given twice",
                json!(c.name),
            ));
        }
        check_bounds(&format!("criteria.{}", defined[idx].name), c.score, defined[idx].max_score)?;
        scores[idx] = Some(c.score);
    }

    defined
        .iter()
        .zip(scores)
        .map(|(d, s)| match s {
            Some(score) => Ok(CriterionScore {
                name: d.name.clone(),
                score,
            }),
            None => Err(GradeError::validation_with(
                "criteria",
                "missing criterion score",
                json!(d.name),
            )),
        })
        .collect()
}
