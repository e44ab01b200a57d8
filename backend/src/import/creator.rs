//! Entity creator: persist one candidate, reporting failures per field.

use crate::error::StoreError;
use crate::models::{push_error, Candidate, ColumnKind, EntityId, EntityKind, FieldErrors, GENERAL_FIELD};
use crate::schema;
use crate::store::EntityStore;

/// Create `candidate` through `store`.
///
/// Store failures come back in the same field-keyed shape as validation
/// errors, so a failed row looks the same whichever stage rejected it.
pub async fn create(store: &dyn EntityStore, candidate: &Candidate) -> Result<EntityId, FieldErrors> {
    store
        .create(candidate)
        .await
        .map_err(|err| translate(candidate.kind(), err))
}

/// Fold a [`StoreError`] into row errors for `kind`.
pub fn translate(kind: EntityKind, err: StoreError) -> FieldErrors {
    let mut errors = FieldErrors::new();

    match err {
        StoreError::ParentNotFound { field, entity } => {
            push_error(&mut errors, &field, format!("{entity} not found."));
        }
        StoreError::Conflict { field, message } => {
            push_error(&mut errors, &field, message);
        }
        StoreError::Rejected(fields) => {
            for (field, messages) in fields {
                let parent = reference_parent(kind, &field);
                for message in messages {
                    let message = match parent {
                        Some(parent) if mentions_missing(&message) => format!("{} not found.", parent.label()),
                        _ => message,
                    };
                    push_error(&mut errors, &field, message);
                }
            }
        }
        StoreError::Timeout => {
            push_error(&mut errors, GENERAL_FIELD, "The backend did not respond in time.");
        }
        other @ (StoreError::Unauthorized(_) | StoreError::Transport(_) | StoreError::Backend(_)) => {
            push_error(&mut errors, GENERAL_FIELD, other.to_string());
        }
    }

    if errors.is_empty() {
        push_error(&mut errors, GENERAL_FIELD, "The backend rejected this row.");
    }
    errors
}

fn reference_parent(kind: EntityKind, field: &str) -> Option<EntityKind> {
    match schema::column(kind, field)?.kind {
        ColumnKind::Reference(parent) => Some(parent),
        _ => None,
    }
}

fn mentions_missing(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("does not exist") || lower.contains("not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_not_found_on_referencing_field() {
        let errors = translate(
            EntityKind::School,
            StoreError::ParentNotFound { field: "district".into(), entity: "District".into() },
        );
        assert_eq!(errors["district"], vec!["District not found.".to_string()]);
    }

    #[test]
    fn test_conflict_on_conflicting_field() {
        let errors = translate(
            EntityKind::Teacher,
            StoreError::Conflict { field: "email".into(), message: "Teacher with this email already exists.".into() },
        );
        assert_eq!(errors["email"], vec!["Teacher with this email already exists.".to_string()]);
    }

    #[test]
    fn test_rejected_reference_message_normalized() {
        let fields = FieldErrors::from([
            ("school".to_string(), vec!["Invalid pk \"77\" - object does not exist.".to_string()]),
            ("email".to_string(), vec!["Enter a valid email address.".to_string()]),
        ]);
        let errors = translate(EntityKind::Student, StoreError::Rejected(fields));
        assert_eq!(errors["school"], vec!["School not found.".to_string()]);
        assert_eq!(errors["email"], vec!["Enter a valid email address.".to_string()]);
    }

    #[test]
    fn test_backend_failure_goes_to_general_verbatim() {
        let errors = translate(EntityKind::District, StoreError::Backend("database is locked".into()));
        assert_eq!(errors[GENERAL_FIELD], vec!["database is locked".to_string()]);
    }

    #[test]
    fn test_timeout_is_a_row_error() {
        let errors = translate(EntityKind::District, StoreError::Timeout);
        assert!(errors.contains_key(GENERAL_FIELD));
    }

    #[test]
    fn test_empty_rejection_still_fails_row() {
        let errors = translate(EntityKind::District, StoreError::Rejected(FieldErrors::new()));
        assert_eq!(errors.len(), 1);
        assert!(errors.contains_key(GENERAL_FIELD));
    }
}
