use std::fmt::{Display, Formatter};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use ulid::Ulid;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_any(RawIdVisitor).map(Self)
            }
        }
    };
}

/// Accepts ids as JSON numbers or as numeric strings. Map keys arrive as
/// strings, including when serde buffers a tagged enum.
struct RawIdVisitor;

impl Visitor<'_> for RawIdVisitor {
    type Value = i64;

    fn expecting(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("an integer id")
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<i64, E> {
        Ok(value)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<i64, E> {
        i64::try_from(value).map_err(|_| E::custom(format!("id {value} is out of range")))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<i64, E> {
        value
            .parse()
            .map_err(|_| E::custom(format!("invalid id '{value}'")))
    }
}

entity_id!(ProjectId);
entity_id!(CategoryId);
entity_id!(CriterionId);
entity_id!(AlternativeId);
entity_id!(RankingId);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct JobId(pub Ulid);

impl JobId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Sign of a preference statement between two alternatives (or two pairs of
/// alternatives for intensities).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PreferenceSign {
    #[serde(rename = ">")]
    Preference,
    #[serde(rename = ">=")]
    WeakPreference,
    #[serde(rename = "=")]
    Indifference,
}

impl PreferenceSign {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preference => ">",
            Self::WeakPreference => ">=",
            Self::Indifference => "=",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            ">" => Some(Self::Preference),
            ">=" => Some(Self::WeakPreference),
            "=" => Some(Self::Indifference),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum InconsistencyKind {
    #[serde(rename = ">")]
    Preference,
    #[serde(rename = ">=")]
    WeakPreference,
    #[serde(rename = "=")]
    Indifference,
    #[serde(rename = "position")]
    Position,
    #[serde(rename = "intensity")]
    Intensity,
}

impl InconsistencyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preference => ">",
            Self::WeakPreference => ">=",
            Self::Indifference => "=",
            Self::Position => "position",
            Self::Intensity => "intensity",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            ">" => Some(Self::Preference),
            ">=" => Some(Self::WeakPreference),
            "=" => Some(Self::Indifference),
            "position" => Some(Self::Position),
            "intensity" => Some(Self::Intensity),
            _ => None,
        }
    }
}

impl From<PreferenceSign> for InconsistencyKind {
    fn from(sign: PreferenceSign) -> Self {
        match sign {
            PreferenceSign::Preference => Self::Preference,
            PreferenceSign::WeakPreference => Self::WeakPreference,
            PreferenceSign::Indifference => Self::Indifference,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Necessary,
    Possible,
}

impl RelationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Necessary => "necessary",
            Self::Possible => "possible",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "necessary" => Some(Self::Necessary),
            "possible" => Some(Self::Possible),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Inconsistent,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Inconsistent => "inconsistent",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "succeeded" => Some(Self::Succeeded),
            "inconsistent" => Some(Self::Inconsistent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_finished(self) -> bool {
        !matches!(self, Self::Queued | Self::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub pairwise_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub project_id: ProjectId,
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub active: bool,
    pub samples: u32,
    pub has_results: bool,
    pub sampler_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Criterion {
    pub id: CriterionId,
    pub project_id: ProjectId,
    pub name: String,
    pub gain: bool,
    pub linear_segments: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CriterionCategory {
    pub category_id: CategoryId,
    pub criterion_id: CriterionId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Alternative {
    pub id: AlternativeId,
    pub project_id: ProjectId,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Performance {
    pub alternative_id: AlternativeId,
    pub criterion_id: CriterionId,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PairwiseComparison {
    pub id: i64,
    pub category_id: CategoryId,
    pub alternative_1: AlternativeId,
    pub alternative_2: AlternativeId,
    pub kind: PreferenceSign,
}

/// Per-category placement of one alternative: user input (`reference_ranking`,
/// position bounds) plus the fields written back after a computation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ranking {
    pub id: RankingId,
    pub category_id: CategoryId,
    pub alternative_id: AlternativeId,
    /// 0 means the alternative is not placed in the reference ranking.
    pub reference_ranking: u32,
    pub best_position: Option<u32>,
    pub worst_position: Option<u32>,
    pub ranking: u32,
    pub ranking_value: f64,
    pub extreme_pessimistic_worst: u32,
    pub extreme_pessimistic_best: u32,
    pub extreme_optimistic_worst: u32,
    pub extreme_optimistic_best: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreferenceIntensity {
    pub id: i64,
    pub project_id: ProjectId,
    pub alternative_1: AlternativeId,
    pub alternative_2: AlternativeId,
    pub alternative_3: AlternativeId,
    pub alternative_4: AlternativeId,
    pub criterion_id: Option<CriterionId>,
    pub category_id: Option<CategoryId>,
    pub kind: PreferenceSign,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InconsistencyRecord {
    pub category_id: CategoryId,
    pub group: u32,
    pub kind: InconsistencyKind,
    pub data: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FunctionPoint {
    pub category_id: CategoryId,
    pub criterion_id: CriterionId,
    pub abscissa: f64,
    pub ordinate: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AcceptabilityIndex {
    pub category_id: CategoryId,
    pub alternative_id: AlternativeId,
    pub position: u32,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PairwiseWinning {
    pub category_id: CategoryId,
    pub alternative_1: AlternativeId,
    pub alternative_2: AlternativeId,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relation {
    pub category_id: CategoryId,
    pub alternative_1: AlternativeId,
    pub alternative_2: AlternativeId,
    pub kind: RelationKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: JobId,
    pub project_id: ProjectId,
    pub category_id: CategoryId,
    pub group: u32,
    pub status: JobStatus,
    pub detail: Option<String>,
    pub created_at: OffsetDateTime,
    pub finished_at: Option<OffsetDateTime>,
}

/// Everything the pipeline reads for one project, loaded in one pass by the
/// persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectSnapshot {
    pub project: Project,
    pub categories: Vec<Category>,
    pub criteria: Vec<Criterion>,
    pub criterion_categories: Vec<CriterionCategory>,
    pub alternatives: Vec<Alternative>,
    pub performances: Vec<Performance>,
    pub pairwise_comparisons: Vec<PairwiseComparison>,
    pub rankings: Vec<Ranking>,
    pub preference_intensities: Vec<PreferenceIntensity>,
}

impl ProjectSnapshot {
    #[must_use]
    pub fn category(&self, category_id: CategoryId) -> Option<&Category> {
        self.categories.iter().find(|item| item.id == category_id)
    }

    #[must_use]
    pub fn criterion(&self, criterion_id: CriterionId) -> Option<&Criterion> {
        self.criteria.iter().find(|item| item.id == criterion_id)
    }

    #[must_use]
    pub fn alternative(&self, alternative_id: AlternativeId) -> Option<&Alternative> {
        self.alternatives
            .iter()
            .find(|item| item.id == alternative_id)
    }

    pub fn rankings_for(&self, category_id: CategoryId) -> impl Iterator<Item = &Ranking> {
        self.rankings
            .iter()
            .filter(move |item| item.category_id == category_id)
    }

    #[must_use]
    pub fn category_ids(&self) -> Vec<CategoryId> {
        self.categories.iter().map(|item| item.id).collect()
    }

    #[must_use]
    pub fn alternative_name(&self, alternative_id: AlternativeId) -> String {
        self.alternative(alternative_id).map_or_else(
            || format!("alternative #{alternative_id}"),
            |item| item.name.clone(),
        )
    }

    #[must_use]
    pub fn criterion_name(&self, criterion_id: CriterionId) -> String {
        self.criterion(criterion_id).map_or_else(
            || format!("criterion #{criterion_id}"),
            |item| item.name.clone(),
        )
    }
}
