use crate::rubric::{RubricCatalog, RubricSet};
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = "capstone.json";
pub const DEFAULT_ABSTRACT_WORD_LIMIT: usize = 250;
pub const DEFAULT_MAX_GROUP_MEMBERS: usize = 3;

/// How repeated submissions by one examiner for the same stage are treated
/// when grades are computed. The store always keeps every row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResubmissionPolicy {
    /// Only the examiner's most recent row counts.
    #[default]
    LatestPerExaminer,
    /// Every row is averaged in.
    AppendAll,
}

impl ResubmissionPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LatestPerExaminer => "latest_per_examiner",
            Self::AppendAll => "append_all",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapstoneConfig {
    pub abstract_word_limit: usize,
    pub max_group_members: usize,
    pub resubmission_policy: ResubmissionPolicy,
    pub rubrics: RubricSet,
}

impl Default for CapstoneConfig {
    fn default() -> Self {
        Self {
            abstract_word_limit: DEFAULT_ABSTRACT_WORD_LIMIT,
            max_group_members: DEFAULT_MAX_GROUP_MEMBERS,
            resubmission_policy: ResubmissionPolicy::default(),
            rubrics: RubricSet::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
struct ConfigFile {
    abstract_word_limit: Option<usize>,
    max_group_members: Option<usize>,
    resubmission_policy: Option<ResubmissionPolicy>,
    catalogs: Vec<RubricCatalog>,
}

/// Loads `<workspace>/capstone.json`. A missing file means defaults.
pub fn load_config(workspace: &Path) -> anyhow::Result<CapstoneConfig> {
    let path = workspace.join(CONFIG_FILE_NAME);
    if !path.is_file() {
        return Ok(CapstoneConfig::default());
    }
    let text = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    parse_config(&text).with_context(|| format!("invalid config {}", path.to_string_lossy()))
}

pub fn parse_config(text: &str) -> anyhow::Result<CapstoneConfig> {
    let file: ConfigFile = serde_json::from_str(text).context("failed to parse config json")?;
    let mut cfg = CapstoneConfig::default();

    if let Some(n) = file.abstract_word_limit {
        if n == 0 {
            return Err(anyhow!("abstractWordLimit must be > 0"));
        }
        cfg.abstract_word_limit = n;
    }
    if let Some(n) = file.max_group_members {
        if n == 0 {
            return Err(anyhow!("maxGroupMembers must be > 0"));
        }
        cfg.max_group_members = n;
    }
    if let Some(p) = file.resubmission_policy {
        cfg.resubmission_policy = p;
    }

    let mut seen = Vec::new();
    for catalog in file.catalogs {
        if seen.contains(&catalog.track) {
            return Err(anyhow!("catalog for track `{}` given twice", catalog.track));
        }
        seen.push(catalog.track);
        cfg.rubrics.install(catalog)?;
    }

    Ok(cfg)
}
