use crate::error::GradeError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

const RESEARCH_PRESENTATION_CRITERIA: &[&str] = &[
    "Problem Statement",
    "Literature Review",
    "Methodology",
    "Project Planning",
    "Communication",
];

const DESIGN_PRESENTATION_CRITERIA: &[&str] = &[
    "Design Concept",
    "Implementation and Testing",
    "Communication",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Track {
    Research,
    Design,
}

impl Track {
    /// Accepts the short ids plus the stream labels used by the registration
    /// forms ("Research Project", "Design Project").
    pub fn parse(s: &str) -> Option<Self> {
        let t = s.trim().to_ascii_lowercase();
        match t.as_str() {
            "research" | "research project" => Some(Self::Research),
            "design" | "design project" => Some(Self::Design),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Design => "design",
        }
    }

    pub fn all() -> [Track; 2] {
        [Self::Research, Self::Design]
    }
}

impl Display for Track {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Criterion {
    pub name: String,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct StageDefinition {
    pub stage_id: String,
    pub max_raw_score: f64,
    pub weight_percent: f64,
    /// When present, a submission may be given per criterion and the raw
    /// score is their sum.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub criteria: Vec<Criterion>,
}

impl StageDefinition {
    fn new(stage_id: &str, max_raw_score: f64, weight_percent: f64) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            max_raw_score,
            weight_percent,
            criteria: Vec::new(),
        }
    }

    fn with_criteria(mut self, names: &[&str], each_max: f64) -> Self {
        self.criteria = names
            .iter()
            .map(|n| Criterion {
                name: n.to_string(),
                max_score: each_max,
            })
            .collect();
        self
    }
}

/// Static stage table for one project track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RubricCatalog {
    pub track: Track,
    pub version: String,
    pub stages: Vec<StageDefinition>,
}

impl RubricCatalog {
    /// Looks up a stage by id. Labels carrying a weight annotation
    /// (`"Presentation 1 (10%)"`) resolve to the bare stage id.
    pub fn stage_weight(&self, stage_id: &str) -> Result<&StageDefinition, GradeError> {
        let idx = self.stage_index(stage_id)?;
        Ok(&self.stages[idx])
    }

    /// Position of the stage in catalog order.
    pub fn stage_index(&self, stage_id: &str) -> Result<usize, GradeError> {
        let wanted = strip_weight_annotation(stage_id);
        self.stages
            .iter()
            .position(|s| s.stage_id.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| GradeError::Configuration {
                track: self.track.to_string(),
                stage_id: stage_id.trim().to_string(),
            })
    }

    pub fn total_weight(&self) -> f64 {
        self.stages.iter().map(|s| s.weight_percent).sum()
    }

    pub fn validate(&self) -> Result<(), GradeError> {
        let invalid = |message: String| GradeError::InvalidCatalog {
            track: self.track.to_string(),
            message,
        };

        if self.stages.is_empty() {
            return Err(invalid("catalog has no stages".to_string()));
        }

        let mut seen: HashSet<String> = HashSet::new();
        for s in &self.stages {
            let key = s.stage_id.trim().to_ascii_lowercase();
            if key.is_empty() {
                return Err(invalid("stage id cannot be empty".to_string()));
            }
            if !seen.insert(key) {
                return Err(invalid(format!("duplicate stage `{}`", s.stage_id)));
            }
            if !(s.max_raw_score.is_finite() && s.max_raw_score > 0.0) {
                return Err(invalid(format!(
                    "stage `{}` max_raw_score must be > 0",
                    s.stage_id
                )));
            }
            if !(s.weight_percent.is_finite() && s.weight_percent >= 0.0) {
                return Err(invalid(format!(
                    "stage `{}` weight_percent must be >= 0",
                    s.stage_id
                )));
            }
            if !s.criteria.is_empty() {
                let criteria_total: f64 = s.criteria.iter().map(|c| c.max_score).sum();
                if s
                    .criteria
                    .iter()
                    .any(|c| !c.max_score.is_finite() || c.max_score <= 0.0)
                {
                    return Err(invalid(format!(
                        "stage `{}` has a criterion with non-positive max",
                        s.stage_id
                    )));
                }
                let mut names: HashSet<String> = HashSet::new();
                for c in &s.criteria {
                    let name = c.name.trim().to_ascii_lowercase();
                    if name.is_empty() || !names.insert(name) {
                        return Err(invalid(format!(
                            "stage `{}` has an empty or duplicate criterion `{}`",
                            s.stage_id, c.name
                        )));
                    }
                }
                if (criteria_total - s.max_raw_score).abs() > WEIGHT_SUM_TOLERANCE {
                    return Err(invalid(format!(
                        "stage `{}` criteria sum to {} but max_raw_score is {}",
                        s.stage_id, criteria_total, s.max_raw_score
                    )));
                }
            }
        }

        let total = self.total_weight();
        if (total - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(invalid(format!("stage weights sum to {total}, expected 100")));
        }
        Ok(())
    }

    pub fn builtin(track: Track) -> Self {
        let presentation = |id: &str, max: f64, weight: f64, criteria: &[&str]| {
            StageDefinition::new(id, max, weight).with_criteria(criteria, 10.0)
        };
        match track {
            Track::Research => Self {
                track,
                version: "builtin-1".to_string(),
                stages: vec![
                    presentation("Presentation 1", 50.0, 10.0, RESEARCH_PRESENTATION_CRITERIA),
                    presentation("Presentation 2", 50.0, 10.0, RESEARCH_PRESENTATION_CRITERIA),
                    presentation("Presentation 3", 50.0, 20.0, RESEARCH_PRESENTATION_CRITERIA),
                    StageDefinition::new("Final Research Report", 100.0, 60.0),
                ],
            },
            Track::Design => Self {
                track,
                version: "builtin-1".to_string(),
                stages: vec![
                    presentation("Presentation 1", 30.0, 10.0, DESIGN_PRESENTATION_CRITERIA),
                    presentation("Presentation 2", 30.0, 10.0, DESIGN_PRESENTATION_CRITERIA),
                    presentation("Presentation 3", 30.0, 20.0, DESIGN_PRESENTATION_CRITERIA),
                    StageDefinition::new("Final Design Report", 100.0, 60.0),
                ],
            },
        }
    }
}

/// The catalogs active for a workspace, one per track.
#[derive(Debug, Clone, PartialEq)]
pub struct RubricSet {
    research: RubricCatalog,
    design: RubricCatalog,
}

impl Default for RubricSet {
    fn default() -> Self {
        Self {
            research: RubricCatalog::builtin(Track::Research),
            design: RubricCatalog::builtin(Track::Design),
        }
    }
}

impl RubricSet {
    pub fn get(&self, track: Track) -> &RubricCatalog {
        match track {
            Track::Research => &self.research,
            Track::Design => &self.design,
        }
    }

    /// Replaces the catalog for its track after validating it.
    pub fn install(&mut self, catalog: RubricCatalog) -> Result<(), GradeError> {
        catalog.validate()?;
        match catalog.track {
            Track::Research => self.research = catalog,
            Track::Design => self.design = catalog,
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &RubricCatalog> {
        [&self.research, &self.design].into_iter()
    }
}

fn strip_weight_annotation(label: &str) -> &str {
    let t = label.trim();
    let Some(inner) = t.strip_suffix(')') else {
        return t;
    };
    let Some(open) = inner.rfind('(') else {
        return t;
    };
    let annotation = inner[open + 1..].trim();
    let is_weight = annotation
        .strip_suffix('%')
        .map(|n| n.trim().parse::<f64>().is_ok())
        .unwrap_or(false);
    if is_weight {
        inner[..open].trim_end()
    } else {
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_catalog() -> RubricCatalog {
        RubricCatalog {
            track: Track::Research,
            version: "test".into(),
            stages: vec![
                StageDefinition::new("Stage1", 50.0, 10.0),
                StageDefinition::new("Stage2", 20.0, 10.0),
                StageDefinition::new("Stage3", 30.0, 20.0),
                StageDefinition::new("Report", 100.0, 60.0),
            ],
        }
    }

    #[test]
    fn builtin_catalogs_are_valid() {
        for t in Track::all() {
            let c = RubricCatalog::builtin(t);
            c.validate().expect("builtin catalog valid");
            assert!((c.total_weight() - 100.0).abs() < 1e-9);
        }
    }

    #[test]
    fn tracks_share_weights_but_not_maxima() {
        let r = RubricCatalog::builtin(Track::Research);
        let d = RubricCatalog::builtin(Track::Design);
        let r1 = r.stage_weight("Presentation 1").expect("research p1");
        let d1 = d.stage_weight("Presentation 1").expect("design p1");
        assert_eq!(r1.weight_percent, d1.weight_percent);
        assert_eq!(r1.max_raw_score, 50.0);
        assert_eq!(d1.max_raw_score, 30.0);
    }

    #[test]
    fn unknown_stage_is_a_configuration_error() {
        let c = RubricCatalog::builtin(Track::Research);
        let e = c.stage_weight("Presentation 9").expect_err("unknown stage");
        assert_eq!(
            e,
            GradeError::Configuration {
                track: "research".into(),
                stage_id: "Presentation 9".into()
            }
        );
    }

    #[test]
    fn weight_annotated_labels_resolve() {
        let c = RubricCatalog::builtin(Track::Research);
        let s = c
            .stage_weight("Presentation 1 (10%)")
            .expect("annotated label");
        assert_eq!(s.stage_id, "Presentation 1");
        let s = c
            .stage_weight(" final research report (60%) ")
            .expect("case-insensitive label");
        assert_eq!(s.stage_id, "Final Research Report");
        assert!(c.stage_weight("Presentation 1 (draft)").is_err());
    }

    #[test]
    fn validate_rejects_broken_catalogs() {
        let mut c = sample_catalog();
        c.validate().expect("sample valid");

        c.stages[0].weight_percent = 15.0;
        assert!(matches!(
            c.validate(),
            Err(GradeError::InvalidCatalog { .. })
        ));

        let mut c = sample_catalog();
        c.stages[1].stage_id = "stage1".into();
        assert!(c.validate().is_err());

        let mut c = sample_catalog();
        c.stages[2].max_raw_score = 0.0;
        assert!(c.validate().is_err());

        let mut c = sample_catalog();
        c.stages[0] = StageDefinition::new("Stage1", 50.0, 10.0).with_criteria(&["a", "b"], 10.0);
        assert!(c.validate().is_err());

        let empty = RubricCatalog {
            track: Track::Design,
            version: "x".into(),
            stages: vec![],
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn criterion_names_must_be_distinct() {
        let mut c = sample_catalog();
        c.stages[1] = StageDefinition::new("Stage2", 20.0, 10.0).with_criteria(&["Poster", "poster "], 10.0);
        let e = c.validate().expect_err("duplicate criterion");
        assert!(e.to_string().contains("duplicate criterion"));

        c.stages[1] = StageDefinition::new("Stage2", 20.0, 10.0).with_criteria(&["Poster", "Demo"], 10.0);
        c.validate().expect("distinct criteria");
    }

    #[test]
    fn every_builtin_presentation_is_scored_by_criteria() {
        for t in Track::all() {
            let c = RubricCatalog::builtin(t);
            for s in c.stages.iter().filter(|s| s.stage_id.starts_with("Presentation")) {
                let total: f64 = s.criteria.iter().map(|c| c.max_score).sum();
                assert_eq!(total, s.max_raw_score, "{t} {}", s.stage_id);
            }
        }
        let d = RubricCatalog::builtin(Track::Design);
        assert_eq!(d.stage_weight("Presentation 2").expect("p2").criteria.len(), 3);
        assert!(d.stage_weight("Final Design Report").expect("report").criteria.is_empty());
    }

    #[test]
    fn misspelled_catalog_keys_are_rejected() {
        let typo = r#"{
            "track": "design",
            "version": "v",
            "stages": [{"stageId": "Pitch", "maxRawScore": 10, "weightPercent": 100,
                        "critera": [{"name": "a", "maxScore": 10}]}]
        }"#;
        assert!(serde_json::from_str::<RubricCatalog>(typo).is_err());

        let nested = r#"{"name": "a", "max": 10}"#;
        assert!(serde_json::from_str::<Criterion>(nested).is_err());
    }

    #[test]
    fn rubric_set_install_validates() {
        let mut set = RubricSet::default();
        let mut bad = sample_catalog();
        bad.stages.pop();
        assert!(set.install(bad).is_err());
        assert_eq!(set.get(Track::Research).version, "builtin-1");

        set.install(sample_catalog()).expect("install valid catalog");
        assert_eq!(set.get(Track::Research).version, "test");
        assert_eq!(set.iter().count(), 2);
    }

    #[test]
    fn track_parse_accepts_stream_labels() {
        assert_eq!(Track::parse("Research Project"), Some(Track::Research));
        assert_eq!(Track::parse(" design "), Some(Track::Design));
        assert_eq!(Track::parse("thesis"), None);
    }
}
