//! Core data models used throughout crisis-harvest.
//!
//! [`Project`] is the unit of collection work and owns the lifecycle state
//! machine. [`FetchedItem`] is what a source adapter hands back;
//! [`StoredItem`] is the persisted row keyed by (project, source, external id).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CollectError;

pub const MAX_KEYWORDS: usize = 50;
pub const MAX_KEYWORD_CHARS: usize = 100;
pub const MAX_RANGE_DAYS: i64 = 365;
const MAX_NAME_CHARS: usize = 200;
const MAX_REGION_CHARS: usize = 100;

/// Lifecycle status of a project.
///
/// ```text
/// Draft ──start──▶ Collecting ──complete──▶ Completed ──analyze──▶ Analyzing
///                    │   ▲                     ▲  │                   │
///               pause│   │resume/start         │  └──archive──▶ Archived
///                    ▼   │                     └───────finish────────┘
///                   Paused
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Draft,
    Collecting,
    Paused,
    Completed,
    Analyzing,
    Archived,
}

impl ProjectStatus {
    /// Returns the string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Collecting => "collecting",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Analyzing => "analyzing",
            ProjectStatus::Archived => "archived",
        }
    }
}

/// Error type for parsing ProjectStatus from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProjectStatusError(String);

impl std::fmt::Display for ParseProjectStatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid project status: {}", self.0)
    }
}

impl std::error::Error for ParseProjectStatusError {}

impl std::str::FromStr for ProjectStatus {
    type Err = ParseProjectStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ProjectStatus::Draft),
            "collecting" => Ok(ProjectStatus::Collecting),
            "paused" => Ok(ProjectStatus::Paused),
            "completed" => Ok(ProjectStatus::Completed),
            "analyzing" => Ok(ProjectStatus::Analyzing),
            "archived" => Ok(ProjectStatus::Archived),
            _ => Err(ParseProjectStatusError(s.to_string())),
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inclusive calendar date range, at most [`MAX_RANGE_DAYS`] wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, CollectError> {
        if start > end {
            return Err(CollectError::Validation(format!(
                "start date {} is after end date {}",
                start, end
            )));
        }
        let span = (end - start).num_days();
        if span > MAX_RANGE_DAYS {
            return Err(CollectError::Validation(format!(
                "date range cannot exceed {} days (got {})",
                MAX_RANGE_DAYS, span
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self, CollectError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| CollectError::Validation(format!("invalid date '{}': {}", s, e)))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

/// Input for [`Project::new`]. Validated and normalized on construction.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub name: String,
    pub target_event: String,
    pub region: String,
    pub date_range: DateRange,
    pub keywords: Vec<String>,
    pub sources: Vec<String>,
}

/// A unit of collection work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub target_event: String,
    pub region: String,
    pub date_range: DateRange,
    /// Lowercased, trimmed, de-duplicated; first-seen order.
    pub keywords: Vec<String>,
    /// Enabled source ids in collection order.
    pub sources: Vec<String>,
    pub status: ProjectStatus,
    pub total_items_collected: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(input: NewProject) -> Result<Self, CollectError> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            name: bounded_text("name", &input.name, MAX_NAME_CHARS)?,
            target_event: bounded_text("target event", &input.target_event, MAX_NAME_CHARS)?,
            region: bounded_text("region", &input.region, MAX_REGION_CHARS)?,
            date_range: input.date_range,
            keywords: normalize_keywords(&input.keywords)?,
            sources: normalize_sources(&input.sources)?,
            status: ProjectStatus::Draft,
            total_items_collected: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Draft or Paused → Collecting.
    pub fn start_collection(&mut self) -> Result<(), CollectError> {
        self.transition(
            &[ProjectStatus::Draft, ProjectStatus::Paused],
            ProjectStatus::Collecting,
            "start collection on",
        )
    }

    /// Collecting → Paused.
    pub fn pause_collection(&mut self) -> Result<(), CollectError> {
        self.transition(
            &[ProjectStatus::Collecting],
            ProjectStatus::Paused,
            "pause",
        )
    }

    /// Paused → Collecting, used when a live run wakes up.
    pub fn resume_collection(&mut self) -> Result<(), CollectError> {
        self.transition(&[ProjectStatus::Paused], ProjectStatus::Collecting, "resume")
    }

    /// Collecting → Completed.
    pub fn complete_collection(&mut self) -> Result<(), CollectError> {
        self.transition(
            &[ProjectStatus::Collecting],
            ProjectStatus::Completed,
            "complete collection on",
        )
    }

    /// Completed → Analyzing.
    pub fn start_analysis(&mut self) -> Result<(), CollectError> {
        self.transition(
            &[ProjectStatus::Completed],
            ProjectStatus::Analyzing,
            "start analysis on",
        )
    }

    /// Analyzing → Completed.
    pub fn complete_analysis(&mut self) -> Result<(), CollectError> {
        self.transition(
            &[ProjectStatus::Analyzing],
            ProjectStatus::Completed,
            "complete analysis on",
        )
    }

    /// Completed → Archived.
    pub fn archive(&mut self) -> Result<(), CollectError> {
        self.transition(&[ProjectStatus::Completed], ProjectStatus::Archived, "archive")
    }

    fn transition(
        &mut self,
        allowed_from: &[ProjectStatus],
        to: ProjectStatus,
        operation: &'static str,
    ) -> Result<(), CollectError> {
        if !allowed_from.contains(&self.status) {
            return Err(CollectError::conflict(self.id, self.status, operation));
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn bounded_text(field: &str, value: &str, max_chars: usize) -> Result<String, CollectError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CollectError::Validation(format!("{} cannot be empty", field)));
    }
    if trimmed.chars().count() > max_chars {
        return Err(CollectError::Validation(format!(
            "{} cannot exceed {} characters",
            field, max_chars
        )));
    }
    Ok(trimmed.to_string())
}

/// Trims and lowercases keywords, dropping duplicates.
pub fn normalize_keywords(raw: &[String]) -> Result<Vec<String>, CollectError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for keyword in raw {
        let normalized = keyword.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(CollectError::Validation("keywords cannot be empty".into()));
        }
        if normalized.chars().count() > MAX_KEYWORD_CHARS {
            return Err(CollectError::Validation(format!(
                "keyword cannot exceed {} characters: {}",
                MAX_KEYWORD_CHARS, normalized
            )));
        }
        if !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    if out.is_empty() {
        return Err(CollectError::Validation(
            "at least one keyword is required".into(),
        ));
    }
    if out.len() > MAX_KEYWORDS {
        return Err(CollectError::Validation(format!(
            "cannot exceed {} keywords",
            MAX_KEYWORDS
        )));
    }
    Ok(out)
}

fn normalize_sources(raw: &[String]) -> Result<Vec<String>, CollectError> {
    let mut out: Vec<String> = Vec::with_capacity(raw.len());
    for source in raw {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(CollectError::Validation("source ids cannot be empty".into()));
        }
        if !out.iter().any(|s| s == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    if out.is_empty() {
        return Err(CollectError::Validation(
            "at least one source is required".into(),
        ));
    }
    Ok(out)
}

/// Per-item engagement counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub shares: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub views: u64,
}

impl Engagement {
    /// Largest count the SQLite columns can hold.
    pub const MAX_COUNT: u64 = i64::MAX as u64;

    /// Likes + shares + comments, saturating.
    pub fn total(&self) -> u64 {
        self.likes
            .saturating_add(self.shares)
            .saturating_add(self.comments)
    }

    /// Every counter capped at [`MAX_COUNT`](Self::MAX_COUNT).
    pub fn clamped(self) -> Self {
        Self {
            likes: self.likes.min(Self::MAX_COUNT),
            shares: self.shares.min(Self::MAX_COUNT),
            comments: self.comments.min(Self::MAX_COUNT),
            views: self.views.min(Self::MAX_COUNT),
        }
    }
}

/// One unit of content as returned by a source adapter.
///
/// Adapters do not know the project; the persister combines the item with
/// the (project, source) pair to form the idempotence key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchedItem {
    /// Source-native id.
    pub external_id: String,
    /// Opaque or anonymized author handle.
    pub author: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub engagement: Engagement,
    #[serde(default)]
    pub url: Option<String>,
    pub collected_at: DateTime<Utc>,
}

impl FetchedItem {
    /// Checks the fields the idempotence key and metadata rows depend on.
    pub fn validate(&self) -> Result<(), String> {
        if self.external_id.trim().is_empty() {
            return Err("item has an empty external id".to_string());
        }
        if self.author.trim().is_empty() {
            return Err(format!("item {} has an empty author", self.external_id));
        }
        Ok(())
    }

    /// First 100 characters of the content.
    pub fn preview(&self) -> String {
        content_preview(&self.content)
    }
}

/// A persisted item row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredItem {
    pub project_id: Uuid,
    pub source: String,
    pub external_id: String,
    pub author: String,
    pub content: String,
    pub published_at: DateTime<Utc>,
    pub engagement: Engagement,
    pub url: Option<String>,
    pub collected_at: DateTime<Utc>,
    /// Raw-content file holding this item, if the content write succeeded.
    pub raw_path: Option<String>,
    pub content_hash: String,
}

impl StoredItem {
    pub fn from_fetched(
        project_id: Uuid,
        source: &str,
        item: &FetchedItem,
        raw_path: Option<String>,
    ) -> Self {
        Self {
            project_id,
            source: source.to_string(),
            external_id: item.external_id.clone(),
            author: item.author.clone(),
            content: item.content.clone(),
            published_at: item.published_at,
            engagement: item.engagement,
            url: item.url.clone(),
            collected_at: item.collected_at,
            raw_path,
            content_hash: content_hash(item),
        }
    }

    /// `project:source:external_id`.
    pub fn composite_id(&self) -> String {
        format!("{}:{}:{}", self.project_id, self.source, self.external_id)
    }
}

/// SHA-256 over the fields that change when a source edits an item.
pub fn content_hash(item: &FetchedItem) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(item.external_id.as_bytes());
    hasher.update(item.author.as_bytes());
    hasher.update(item.content.as_bytes());
    hasher.update(item.published_at.timestamp().to_le_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn content_preview(content: &str) -> String {
    if content.chars().count() <= 100 {
        return content.to_string();
    }
    let head: String = content.chars().take(100).collect();
    format!("{}...", head)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engagement_total_saturates() {
        let e = Engagement {
            likes: u64::MAX,
            shares: 5,
            comments: 1,
            views: 0,
        };
        assert_eq!(e.total(), u64::MAX);
        assert_eq!(e.clamped().likes, Engagement::MAX_COUNT);
        assert_eq!(e.clamped().shares, 5);
    }

    fn input() -> NewProject {
        NewProject {
            name: "  Yagi response ".to_string(),
            target_event: "Typhoon Yagi".to_string(),
            region: "Northern Vietnam".to_string(),
            date_range: DateRange::parse("2024-09-01", "2024-09-05").unwrap(),
            keywords: vec!["Flood".into(), "flood ".into(), "landslide".into()],
            sources: vec!["reddit".into(), "youtube".into(), "reddit".into()],
        }
    }

    #[test]
    fn new_project_is_normalized_draft() {
        let p = Project::new(input()).unwrap();
        assert_eq!(p.status, ProjectStatus::Draft);
        assert_eq!(p.name, "Yagi response");
        assert_eq!(p.keywords, vec!["flood", "landslide"]);
        assert_eq!(p.sources, vec!["reddit", "youtube"]);
        assert_eq!(p.total_items_collected, 0);
    }

    #[test]
    fn rejects_bad_keywords() {
        let mut bad = input();
        bad.keywords = vec![];
        assert!(matches!(Project::new(bad), Err(CollectError::Validation(_))));

        let mut bad = input();
        bad.keywords = vec!["x".repeat(101)];
        assert!(Project::new(bad).is_err());

        let mut bad = input();
        bad.keywords = (0..51).map(|i| format!("kw{}", i)).collect();
        assert!(Project::new(bad).is_err());

        let mut bad = input();
        bad.keywords = vec!["   ".into()];
        assert!(Project::new(bad).is_err());
    }

    #[test]
    fn rejects_missing_sources_and_blank_names() {
        let mut bad = input();
        bad.sources = vec![];
        assert!(Project::new(bad).is_err());

        let mut bad = input();
        bad.region = " ".into();
        assert!(Project::new(bad).is_err());
    }

    #[test]
    fn date_range_bounds() {
        assert!(DateRange::parse("2024-09-05", "2024-09-01").is_err());
        assert!(DateRange::parse("2023-01-01", "2024-01-01").is_ok());
        assert!(DateRange::parse("2023-01-01", "2024-01-02").is_err());
        let r = DateRange::parse("2024-09-01", "2024-09-05").unwrap();
        assert_eq!(r.days(), 5);
        assert!(r.contains(NaiveDate::from_ymd_opt(2024, 9, 5).unwrap()));
        assert!(!r.contains(NaiveDate::from_ymd_opt(2024, 9, 6).unwrap()));
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut p = Project::new(input()).unwrap();
        p.start_collection().unwrap();
        p.pause_collection().unwrap();
        p.resume_collection().unwrap();
        p.pause_collection().unwrap();
        p.start_collection().unwrap();
        p.complete_collection().unwrap();
        p.start_analysis().unwrap();
        p.complete_analysis().unwrap();
        p.archive().unwrap();
        assert_eq!(p.status, ProjectStatus::Archived);
    }

    #[test]
    fn illegal_transitions_conflict_and_leave_status() {
        type Op = fn(&mut Project) -> Result<(), CollectError>;
        let ops: [(&str, Op); 7] = [
            ("start", Project::start_collection),
            ("pause", Project::pause_collection),
            ("resume", Project::resume_collection),
            ("complete", Project::complete_collection),
            ("analyze", Project::start_analysis),
            ("finish", Project::complete_analysis),
            ("archive", Project::archive),
        ];
        let allowed = |from: ProjectStatus, op: &str| -> bool {
            use ProjectStatus::*;
            matches!(
                (from, op),
                (Draft, "start")
                    | (Paused, "start")
                    | (Collecting, "pause")
                    | (Paused, "resume")
                    | (Collecting, "complete")
                    | (Completed, "analyze")
                    | (Analyzing, "finish")
                    | (Completed, "archive")
            )
        };
        let all = [
            ProjectStatus::Draft,
            ProjectStatus::Collecting,
            ProjectStatus::Paused,
            ProjectStatus::Completed,
            ProjectStatus::Analyzing,
            ProjectStatus::Archived,
        ];
        for from in all {
            for &(name, op) in ops.iter() {
                let mut p = Project::new(input()).unwrap();
                p.status = from;
                let result = op(&mut p);
                if allowed(from, name) {
                    assert!(result.is_ok(), "{} from {} should succeed", name, from);
                } else {
                    assert!(
                        matches!(result, Err(CollectError::StateConflict { .. })),
                        "{} from {} should conflict",
                        name,
                        from
                    );
                    assert_eq!(p.status, from);
                }
            }
        }
    }

    #[test]
    fn status_round_trips_through_str() {
        for s in ["draft", "collecting", "paused", "completed", "analyzing", "archived"] {
            let parsed: ProjectStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("failed".parse::<ProjectStatus>().is_err());
    }

    #[test]
    fn item_validation_and_preview() {
        let now = Utc::now();
        let mut item = FetchedItem {
            external_id: "t1".into(),
            author: "anon-1".into(),
            content: "a".repeat(150),
            published_at: now,
            engagement: Engagement::default(),
            url: None,
            collected_at: now,
        };
        assert!(item.validate().is_ok());
        assert_eq!(item.preview().chars().count(), 103);
        item.external_id = " ".into();
        assert!(item.validate().is_err());
    }
}
