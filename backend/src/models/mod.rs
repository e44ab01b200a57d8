//! Domain models for the bulk import pipeline.
//!
//! - [`EntityKind`] - Which backend resource an import targets
//! - [`ColumnSpec`] / [`ColumnKind`] - Declarative column contract
//! - [`RawRow`] - One decoded row, untyped
//! - [`Candidate`] - A fully validated, typed record ready for persistence
//! - [`RowOutcome`] / [`BatchSummary`] / [`BatchResult`] - What an import returns

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Field name -> ordered error messages for that field.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Field used for errors that belong to no particular column.
pub const GENERAL_FIELD: &str = "_general";

/// Identifier assigned by the backend to a created record.
pub type EntityId = i64;

/// Add one message under `field`, keeping earlier messages in order.
pub fn push_error(errors: &mut FieldErrors, field: &str, message: impl Into<String>) {
    errors.entry(field.to_string()).or_default().push(message.into());
}

// =============================================================================
// Entity Kind
// =============================================================================

/// Backend resource type targeted by one import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    District,
    School,
    Student,
    Teacher,
    ContentManager,
}

impl EntityKind {
    /// Every supported kind, in registry order.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::District,
        EntityKind::School,
        EntityKind::Student,
        EntityKind::Teacher,
        EntityKind::ContentManager,
    ];

    /// Machine name used in URLs and template filenames.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::District => "district",
            Self::School => "school",
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::ContentManager => "content_manager",
        }
    }

    /// Human label used in messages ("School not found.").
    pub fn label(&self) -> &'static str {
        match self {
            Self::District => "District",
            Self::School => "School",
            Self::Student => "Student",
            Self::Teacher => "Teacher",
            Self::ContentManager => "Content manager",
        }
    }

    /// REST collection path on the backend.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::District => "districts",
            Self::School => "schools",
            Self::Student => "students",
            Self::Teacher => "teachers",
            Self::ContentManager => "content-managers",
        }
    }

    /// Parse from a slug, accepting plural and hyphenated spellings.
    pub fn from_slug(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "district" | "districts" => Some(Self::District),
            "school" | "schools" => Some(Self::School),
            "student" | "students" => Some(Self::Student),
            "teacher" | "teachers" => Some(Self::Teacher),
            "content_manager" | "content_managers" | "contentmanager" => {
                Some(Self::ContentManager)
            }
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error for an unrecognized entity kind name.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown entity kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for EntityKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slug(s).ok_or_else(|| UnknownKind(s.to_string()))
    }
}

// =============================================================================
// Column Contract
// =============================================================================

/// Value constraint attached to one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Free text.
    Text,
    /// One of a fixed, case-sensitive set of tags.
    Enum(&'static [&'static str]),
    /// Integer id of another entity. Existence is checked at creation.
    Reference(EntityKind),
    /// Calendar date in `YYYY-MM-DD`.
    Date,
    /// Email address.
    Email,
    /// Phone number.
    Phone,
}

impl ColumnKind {
    /// Short type name for templates and the columns endpoint.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Enum(_) => "enum",
            Self::Reference(_) => "integer-reference",
            Self::Date => "date",
            Self::Email => "email",
            Self::Phone => "phone",
        }
    }
}

/// One column of an entity's import contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub required: bool,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub const fn required(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, required: true, kind }
    }

    pub const fn optional(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, required: false, kind }
    }

    /// Human label derived from the column name: `first_name` -> `First name`.
    pub fn label(&self) -> String {
        field_label(self.name)
    }
}

/// Turn a snake_case field name into a sentence-case label.
pub fn field_label(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// =============================================================================
// Raw Row
// =============================================================================

/// One decoded data row, before any type checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based data line number, header excluded.
    pub row_number: usize,
    /// Canonical column name -> trimmed cell value (possibly empty).
    pub fields: BTreeMap<String, String>,
}

impl RawRow {
    pub fn new(row_number: usize) -> Self {
        Self { row_number, fields: BTreeMap::new() }
    }

    /// Builder used mostly by tests.
    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    /// Raw value for a column; absent columns read as empty.
    pub fn get(&self, name: &str) -> &str {
        self.fields.get(name).map(String::as_str).unwrap_or("")
    }
}

// =============================================================================
// Candidates
// =============================================================================

/// Approval state shared by schools, teachers and content managers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Approved,
    Pending,
}

impl ApprovalStatus {
    pub const TAGS: &'static [&'static str] = &["APPROVED", "PENDING"];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "APPROVED" => Some(Self::Approved),
            "PENDING" => Some(Self::Pending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDistrict {
    pub name: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSchool {
    pub name: String,
    pub district: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApprovalStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewStudent {
    pub first_name: String,
    pub last_name: String,
    pub school: EntityId,
    /// Canonical grade tag: `K` or `1`..`12`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guardian_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTeacher {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub school: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hire_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApprovalStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContentManager {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<EntityId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ApprovalStatus>,
}

/// A row that passed every column constraint.
///
/// Serializes as the bare record body expected by the single-create endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Candidate {
    District(NewDistrict),
    School(NewSchool),
    Student(NewStudent),
    Teacher(NewTeacher),
    ContentManager(NewContentManager),
}

impl Candidate {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::District(_) => EntityKind::District,
            Self::School(_) => EntityKind::School,
            Self::Student(_) => EntityKind::Student,
            Self::Teacher(_) => EntityKind::Teacher,
            Self::ContentManager(_) => EntityKind::ContentManager,
        }
    }

    /// Parent reference carried by this record: (field, parent kind, id).
    pub fn parent(&self) -> Option<(&'static str, EntityKind, EntityId)> {
        match self {
            Self::District(_) => None,
            Self::School(s) => Some(("district", EntityKind::District, s.district)),
            Self::Student(s) => Some(("school", EntityKind::School, s.school)),
            Self::Teacher(t) => Some(("school", EntityKind::School, t.school)),
            Self::ContentManager(c) => c
                .district
                .map(|id| ("district", EntityKind::District, id)),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Echoed display values: column name -> raw value.
pub type DisplayFields = BTreeMap<String, String>;

/// Result for exactly one decoded row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Created {
        row_number: usize,
        entity_id: EntityId,
        display: DisplayFields,
    },
    Failed {
        row_number: usize,
        display: DisplayFields,
        errors: FieldErrors,
    },
}

impl RowOutcome {
    pub fn row_number(&self) -> usize {
        match self {
            Self::Created { row_number, .. } | Self::Failed { row_number, .. } => *row_number,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created { .. })
    }

    pub fn errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Failed { errors, .. } => Some(errors),
            Self::Created { .. } => None,
        }
    }
}

/// Aggregate counts. `created_count + failed_count == total_rows` always.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_rows: usize,
    pub created_count: usize,
    pub failed_count: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[RowOutcome]) -> Self {
        let created_count = outcomes.iter().filter(|o| o.is_created()).count();
        Self {
            total_rows: outcomes.len(),
            created_count,
            failed_count: outcomes.len() - created_count,
        }
    }
}

/// Sole return value of an import run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub summary: BatchSummary,
    /// Ordered by ascending `row_number`.
    pub outcomes: Vec<RowOutcome>,
}

impl BatchResult {
    pub fn new(outcomes: Vec<RowOutcome>) -> Self {
        Self { summary: BatchSummary::from_outcomes(&outcomes), outcomes }
    }
}

/// Dry-run result for one row: validated but not persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Valid {
        row_number: usize,
        display: DisplayFields,
        candidate: Candidate,
    },
    Invalid {
        row_number: usize,
        display: DisplayFields,
        errors: FieldErrors,
    },
}

impl CheckOutcome {
    pub fn row_number(&self) -> usize {
        match self {
            Self::Valid { row_number, .. } | Self::Invalid { row_number, .. } => *row_number,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Dry-run counterpart of [`BatchResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub total_rows: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    /// Ordered by ascending `row_number`.
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckResult {
    pub fn new(outcomes: Vec<CheckOutcome>) -> Self {
        let valid_count = outcomes.iter().filter(|o| o.is_valid()).count();
        Self {
            total_rows: outcomes.len(),
            valid_count,
            invalid_count: outcomes.len() - valid_count,
            outcomes,
        }
    }
}
