//! REST API types for the admin console.
//!
//! `results` echoes each row's display columns next to its status so the
//! console can render the outcome table without re-reading the file.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::{
    BatchResult, CheckOutcome, CheckResult, ColumnKind, ColumnSpec, DisplayFields, EntityId,
    FieldErrors, RowOutcome,
};

/// Response sent after a bulk upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub summary: SummaryBody,
    /// One entry per decoded row, ascending by `row`.
    pub results: Vec<RowResult>,
}

/// Aggregate counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryBody {
    pub total_rows: usize,
    pub created: usize,
    pub failed: usize,
}

/// Row status tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Created,
    Error,
    /// Dry run only: the row would be created.
    Valid,
}

/// Result for one row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowResult {
    pub row: usize,
    pub status: RowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EntityId>,
    /// Echoed display columns, flattened into the row object.
    #[serde(flatten)]
    pub fields: DisplayFields,
    /// Present only when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl From<RowOutcome> for RowResult {
    fn from(outcome: RowOutcome) -> Self {
        match outcome {
            RowOutcome::Created { row_number, entity_id, display } => RowResult {
                row: row_number,
                status: RowStatus::Created,
                id: Some(entity_id),
                fields: display,
                errors: None,
            },
            RowOutcome::Failed { row_number, display, errors } => RowResult {
                row: row_number,
                status: RowStatus::Error,
                id: None,
                fields: display,
                errors: Some(errors),
            },
        }
    }
}

impl From<BatchResult> for UploadResponse {
    fn from(result: BatchResult) -> Self {
        UploadResponse {
            summary: SummaryBody {
                total_rows: result.summary.total_rows,
                created: result.summary.created_count,
                failed: result.summary.failed_count,
            },
            results: result.outcomes.into_iter().map(RowResult::from).collect(),
        }
    }
}

/// Dry-run response (CLI `validate`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub summary: CheckSummaryBody,
    pub results: Vec<RowResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSummaryBody {
    pub total_rows: usize,
    pub valid: usize,
    pub invalid: usize,
}

impl From<CheckResult> for CheckResponse {
    fn from(result: CheckResult) -> Self {
        let results = result
            .outcomes
            .into_iter()
            .map(|outcome| match outcome {
                CheckOutcome::Valid { row_number, display, .. } => RowResult {
                    row: row_number,
                    status: RowStatus::Valid,
                    id: None,
                    fields: display,
                    errors: None,
                },
                CheckOutcome::Invalid { row_number, display, errors } => RowResult {
                    row: row_number,
                    status: RowStatus::Error,
                    id: None,
                    fields: display,
                    errors: Some(errors),
                },
            })
            .collect();

        CheckResponse {
            summary: CheckSummaryBody {
                total_rows: result.total_rows,
                valid: result.valid_count,
                invalid: result.invalid_count,
            },
            results,
        }
    }
}

/// Column description served by `/api/{kind}/columns`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub required: bool,
    pub kind: String,
    /// Accepted tags for enum columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    /// Referenced entity for id columns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

impl From<&ColumnSpec> for ColumnInfo {
    fn from(spec: &ColumnSpec) -> Self {
        let (values, references) = match spec.kind {
            ColumnKind::Enum(tags) => (Some(tags.iter().map(|t| t.to_string()).collect()), None),
            ColumnKind::Reference(parent) => (None, Some(parent.slug().to_string())),
            _ => (None, None),
        };
        ColumnInfo {
            name: spec.name.to_string(),
            required: spec.required,
            kind: spec.kind.type_name().to_string(),
            values,
            references,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, GENERAL_FIELD};
    use crate::schema;

    fn display(name: &str) -> DisplayFields {
        DisplayFields::from([("name".to_string(), name.to_string()), ("code".to_string(), "N1".to_string())])
    }

    #[test]
    fn test_upload_response_shape() {
        let result = BatchResult::new(vec![
            RowOutcome::Created { row_number: 1, entity_id: 7, display: display("North") },
            RowOutcome::Failed {
                row_number: 2,
                display: display(""),
                errors: FieldErrors::from([("name".to_string(), vec!["Name is required.".to_string()])]),
            },
        ]);

        let json = serde_json::to_value(UploadResponse::from(result)).unwrap();

        assert_eq!(json["summary"], json!({"total_rows": 2, "created": 1, "failed": 1}));
        assert_eq!(json["results"][0]["row"], 1);
        assert_eq!(json["results"][0]["status"], "created");
        assert_eq!(json["results"][0]["id"], 7);
        assert_eq!(json["results"][0]["name"], "North");
        assert!(json["results"][0].get("errors").is_none());

        assert_eq!(json["results"][1]["status"], "error");
        assert_eq!(json["results"][1]["errors"]["name"][0], "Name is required.");
        assert!(json["results"][1].get("id").is_none());
    }

    #[test]
    fn test_errors_present_only_on_error_rows() {
        let result = BatchResult::new(vec![
            RowOutcome::Created { row_number: 1, entity_id: 1, display: display("a") },
            RowOutcome::Failed {
                row_number: 3,
                display: display("b"),
                errors: FieldErrors::from([(GENERAL_FIELD.to_string(), vec!["boom".to_string()])]),
            },
        ]);
        let response = UploadResponse::from(result);
        for row in &response.results {
            assert_eq!(row.errors.is_some(), row.status == RowStatus::Error);
        }
    }

    #[test]
    fn test_column_info_from_column_spec() {
        let columns: Vec<ColumnInfo> = schema::spec_for(EntityKind::School).iter().map(ColumnInfo::from).collect();

        let district = columns.iter().find(|c| c.name == "district").unwrap();
        assert!(district.required);
        assert_eq!(district.references.as_deref(), Some("district"));

        let status = columns.iter().find(|c| c.name == "status").unwrap();
        assert_eq!(status.values.as_deref(), Some(&["APPROVED".to_string(), "PENDING".to_string()][..]));
    }

    #[test]
    fn test_error_response() {
        let body = error_response("Missing required column(s): name");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "Missing required column(s): name");
    }
}
