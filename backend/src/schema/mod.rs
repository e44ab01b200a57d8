//! Schema registry: the column contract for every entity kind.
//!
//! The same [`ColumnSpec`] tables drive template generation, header checks in
//! the decoder and field checks in the validator, so a downloaded template is
//! always accepted by the upload endpoint.
//!
//! ```rust,ignore
//! use bulkload::{schema, EntityKind};
//!
//! let bytes = schema::template_for(EntityKind::School);
//! assert_eq!(bytes, b"name,district,address,contact_email,phone,status\n");
//! ```

use crate::models::{ApprovalStatus, ColumnKind, ColumnSpec, EntityKind};

/// Accepted grade tags for students.
pub const GRADES: &[&str] = &["K", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11", "12"];

const STATUS: ColumnKind = ColumnKind::Enum(ApprovalStatus::TAGS);

static DISTRICT_COLUMNS: [ColumnSpec; 5] = [
    ColumnSpec::required("name", ColumnKind::Text),
    ColumnSpec::required("code", ColumnKind::Text),
    ColumnSpec::optional("state", ColumnKind::Text),
    ColumnSpec::optional("contact_email", ColumnKind::Email),
    ColumnSpec::optional("contact_phone", ColumnKind::Phone),
];

static SCHOOL_COLUMNS: [ColumnSpec; 6] = [
    ColumnSpec::required("name", ColumnKind::Text),
    ColumnSpec::required("district", ColumnKind::Reference(EntityKind::District)),
    ColumnSpec::optional("address", ColumnKind::Text),
    ColumnSpec::optional("contact_email", ColumnKind::Email),
    ColumnSpec::optional("phone", ColumnKind::Phone),
    ColumnSpec::optional("status", STATUS),
];

static STUDENT_COLUMNS: [ColumnSpec; 7] = [
    ColumnSpec::required("first_name", ColumnKind::Text),
    ColumnSpec::required("last_name", ColumnKind::Text),
    ColumnSpec::required("school", ColumnKind::Reference(EntityKind::School)),
    ColumnSpec::optional("grade", ColumnKind::Enum(GRADES)),
    ColumnSpec::optional("date_of_birth", ColumnKind::Date),
    ColumnSpec::optional("email", ColumnKind::Email),
    ColumnSpec::optional("guardian_phone", ColumnKind::Phone),
];

static TEACHER_COLUMNS: [ColumnSpec; 8] = [
    ColumnSpec::required("first_name", ColumnKind::Text),
    ColumnSpec::required("last_name", ColumnKind::Text),
    ColumnSpec::required("email", ColumnKind::Email),
    ColumnSpec::required("school", ColumnKind::Reference(EntityKind::School)),
    ColumnSpec::optional("phone", ColumnKind::Phone),
    ColumnSpec::optional("subject", ColumnKind::Text),
    ColumnSpec::optional("hire_date", ColumnKind::Date),
    ColumnSpec::optional("status", STATUS),
];

static CONTENT_MANAGER_COLUMNS: [ColumnSpec; 6] = [
    ColumnSpec::required("first_name", ColumnKind::Text),
    ColumnSpec::required("last_name", ColumnKind::Text),
    ColumnSpec::required("email", ColumnKind::Email),
    ColumnSpec::optional("district", ColumnKind::Reference(EntityKind::District)),
    ColumnSpec::optional("phone", ColumnKind::Phone),
    ColumnSpec::optional("status", STATUS),
];

/// Ordered column contract for `kind`.
pub fn spec_for(kind: EntityKind) -> &'static [ColumnSpec] {
    match kind {
        EntityKind::District => &DISTRICT_COLUMNS,
        EntityKind::School => &SCHOOL_COLUMNS,
        EntityKind::Student => &STUDENT_COLUMNS,
        EntityKind::Teacher => &TEACHER_COLUMNS,
        EntityKind::ContentManager => &CONTENT_MANAGER_COLUMNS,
    }
}

/// Look up one column by canonical name.
pub fn column(kind: EntityKind, name: &str) -> Option<&'static ColumnSpec> {
    spec_for(kind).iter().find(|c| c.name == name)
}

/// Names of the required columns, in template order.
pub fn required_columns(kind: EntityKind) -> Vec<&'static str> {
    spec_for(kind).iter().filter(|c| c.required).map(|c| c.name).collect()
}

/// Columns echoed back in every row outcome.
pub fn display_fields(kind: EntityKind) -> &'static [&'static str] {
    match kind {
        EntityKind::District => &["name", "code"],
        EntityKind::School => &["name", "district"],
        EntityKind::Student => &["first_name", "last_name", "school"],
        EntityKind::Teacher => &["first_name", "last_name", "email"],
        EntityKind::ContentManager => &["first_name", "last_name", "email"],
    }
}

/// Column that identifies a record for uniqueness conflicts.
pub fn natural_key(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::District => "code",
        EntityKind::School => "name",
        EntityKind::Student | EntityKind::Teacher | EntityKind::ContentManager => "email",
    }
}

/// The column that references a parent entity, if the kind has one.
pub fn reference_column(kind: EntityKind) -> Option<(&'static str, EntityKind)> {
    spec_for(kind).iter().find_map(|c| match c.kind {
        ColumnKind::Reference(parent) => Some((c.name, parent)),
        _ => None,
    })
}

/// Template file: the header row only, column names in contract order.
pub fn template_for(kind: EntityKind) -> Vec<u8> {
    let header = spec_for(kind)
        .iter()
        .map(|c| c.name)
        .collect::<Vec<_>>()
        .join(",");
    format!("{header}\n").into_bytes()
}

/// Download filename for a kind's template.
pub fn template_filename(kind: EntityKind) -> String {
    format!("{}_bulk_template.csv", kind.slug())
}

/// Human-readable description of a kind's columns (CLI `columns`).
pub fn describe(kind: EntityKind) -> String {
    let mut out = format!("{} columns:\n", kind.label());
    for col in spec_for(kind) {
        let detail = match col.kind {
            ColumnKind::Enum(values) => format!("enum ({})", values.join(", ")),
            ColumnKind::Reference(parent) => format!("integer id of a {}", parent.label()),
            ColumnKind::Date => "date (YYYY-MM-DD)".to_string(),
            other => other.type_name().to_string(),
        };
        let marker = if col.required { "required" } else { "optional" };
        out.push_str(&format!("  {:<16} {:<9} {}\n", col.name, marker, detail));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_header_matches_spec_order() {
        for kind in EntityKind::ALL {
            let template = String::from_utf8(template_for(kind)).unwrap();
            let names: Vec<&str> = spec_for(kind).iter().map(|c| c.name).collect();
            assert_eq!(template.trim_end(), names.join(","));
            assert_eq!(template.lines().count(), 1, "template must have no data rows");
        }
    }

    #[test]
    fn test_template_is_stable() {
        for kind in EntityKind::ALL {
            assert_eq!(template_for(kind), template_for(kind));
        }
    }

    #[test]
    fn test_template_filename() {
        assert_eq!(template_filename(EntityKind::ContentManager), "content_manager_bulk_template.csv");
    }

    #[test]
    fn test_every_kind_has_a_required_column_and_displayable_fields() {
        for kind in EntityKind::ALL {
            assert!(!required_columns(kind).is_empty());
            for field in display_fields(kind) {
                assert!(column(kind, field).is_some(), "{kind}: {field} not in column contract");
            }
            assert!(column(kind, natural_key(kind)).is_some());
        }
    }

    #[test]
    fn test_reference_columns() {
        assert_eq!(reference_column(EntityKind::School), Some(("district", EntityKind::District)));
        assert_eq!(reference_column(EntityKind::Teacher), Some(("school", EntityKind::School)));
        assert_eq!(reference_column(EntityKind::District), None);
    }
}
