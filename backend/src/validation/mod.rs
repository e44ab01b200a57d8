//! Row validation against the column contract.
//!
//! [`validate`] checks every column of one [`RawRow`] and either returns a
//! typed [`Candidate`] or a [`FieldErrors`] map holding *all* problems found
//! in the row. It never touches a store: references are only checked to be
//! integers here, existence is the creator's concern.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulkload::{schema, validation, EntityKind, RawRow};
//!
//! let row = RawRow::new(1).with("name", "Lincoln High").with("district", "abc");
//! let errors = validation::validate(&row, schema::spec_for(EntityKind::School), EntityKind::School)
//!     .unwrap_err();
//! assert_eq!(errors["district"], vec!["District must be an integer id."]);
//! ```

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::models::{
    push_error, field_label, ApprovalStatus, Candidate, ColumnKind, ColumnSpec, EntityId,
    EntityKind, FieldErrors, NewContentManager, NewDistrict, NewSchool, NewStudent, NewTeacher,
    RawRow,
};
use crate::schema;

/// The one accepted date layout.
pub const DATE_FORMAT: &str = "YYYY-MM-DD";

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("Invalid email pattern")
});

static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ().\-]+$").expect("Invalid phone pattern"));

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("Invalid date pattern"));

/// A column value after coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Reference(EntityId),
    Date(NaiveDate),
}

/// Check one raw cell against its column.
///
/// `Ok(None)` means an optional column was left empty.
pub fn check_field(spec: &ColumnSpec, raw: &str) -> Result<Option<FieldValue>, String> {
    if raw.is_empty() {
        return if spec.required {
            Err(format!("{} is required.", spec.label()))
        } else {
            Ok(None)
        };
    }

    let value = match spec.kind {
        ColumnKind::Text => FieldValue::Text(raw.to_string()),
        ColumnKind::Enum(values) => {
            if !values.contains(&raw) {
                return Err(format!(
                    "'{}' is not a valid choice. Accepted values: {}.",
                    raw,
                    values.join(", ")
                ));
            }
            FieldValue::Text(raw.to_string())
        }
        ColumnKind::Reference(_) => match raw.parse::<EntityId>() {
            Ok(id) if id > 0 => FieldValue::Reference(id),
            _ => return Err(format!("{} must be an integer id.", spec.label())),
        },
        ColumnKind::Date => {
            let parsed = DATE_RE
                .is_match(raw)
                .then(|| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
                .flatten();
            match parsed {
                Some(date) => FieldValue::Date(date),
                None => return Err(format!("Enter a valid date in {DATE_FORMAT} format.")),
            }
        }
        ColumnKind::Email => {
            if !EMAIL_RE.is_match(raw) {
                return Err("Enter a valid email address.".to_string());
            }
            FieldValue::Text(raw.to_string())
        }
        ColumnKind::Phone => {
            let digits = raw.chars().filter(char::is_ascii_digit).count();
            if !PHONE_RE.is_match(raw) || !(7..=15).contains(&digits) {
                return Err("Enter a valid phone number.".to_string());
            }
            FieldValue::Text(raw.to_string())
        }
    };

    Ok(Some(value))
}

/// Validate one row for `kind` against `specs`.
pub fn validate(row: &RawRow, specs: &[ColumnSpec], kind: EntityKind) -> Result<Candidate, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut values = BTreeMap::new();

    for spec in specs {
        match check_field(spec, row.get(spec.name)) {
            Ok(Some(value)) => {
                values.insert(spec.name, value);
            }
            Ok(None) => {}
            Err(message) => push_error(&mut errors, spec.name, message),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    build_candidate(kind, values)
}

/// Validate with the registry's contract for `kind`.
pub fn validate_row(row: &RawRow, kind: EntityKind) -> Result<Candidate, FieldErrors> {
    validate(row, schema::spec_for(kind), kind)
}

/// Typed values with accessors that record what a candidate needs but lacks.
struct TypedFields {
    values: BTreeMap<&'static str, FieldValue>,
    errors: FieldErrors,
}

impl TypedFields {
    fn opt_text(&mut self, name: &str) -> Option<String> {
        match self.values.remove(name) {
            Some(FieldValue::Text(s)) => Some(s),
            Some(_) => {
                self.mismatch(name);
                None
            }
            None => None,
        }
    }

    fn text(&mut self, name: &str) -> String {
        self.opt_text(name).unwrap_or_else(|| {
            self.missing(name);
            String::new()
        })
    }

    fn opt_reference(&mut self, name: &str) -> Option<EntityId> {
        match self.values.remove(name) {
            Some(FieldValue::Reference(id)) => Some(id),
            Some(_) => {
                self.mismatch(name);
                None
            }
            None => None,
        }
    }

    fn reference(&mut self, name: &str) -> EntityId {
        self.opt_reference(name).unwrap_or_else(|| {
            self.missing(name);
            0
        })
    }

    fn opt_date(&mut self, name: &str) -> Option<NaiveDate> {
        match self.values.remove(name) {
            Some(FieldValue::Date(d)) => Some(d),
            Some(_) => {
                self.mismatch(name);
                None
            }
            None => None,
        }
    }

    fn opt_status(&mut self, name: &str) -> Option<ApprovalStatus> {
        let tag = self.opt_text(name)?;
        let status = ApprovalStatus::from_tag(&tag);
        if status.is_none() {
            self.mismatch(name);
        }
        status
    }

    fn missing(&mut self, name: &str) {
        if !self.errors.contains_key(name) {
            push_error(&mut self.errors, name, format!("{} is required.", field_label(name)));
        }
    }

    fn mismatch(&mut self, name: &str) {
        push_error(
            &mut self.errors,
            name,
            format!("{} has an unexpected value type.", field_label(name)),
        );
    }
}

fn build_candidate(
    kind: EntityKind,
    values: BTreeMap<&'static str, FieldValue>,
) -> Result<Candidate, FieldErrors> {
    let mut f = TypedFields { values, errors: FieldErrors::new() };

    let candidate = match kind {
        EntityKind::District => Candidate::District(NewDistrict {
            name: f.text("name"),
            code: f.text("code"),
            state: f.opt_text("state"),
            contact_email: f.opt_text("contact_email"),
            contact_phone: f.opt_text("contact_phone"),
        }),
        EntityKind::School => Candidate::School(NewSchool {
            name: f.text("name"),
            district: f.reference("district"),
            address: f.opt_text("address"),
            contact_email: f.opt_text("contact_email"),
            phone: f.opt_text("phone"),
            status: f.opt_status("status"),
        }),
        EntityKind::Student => Candidate::Student(NewStudent {
            first_name: f.text("first_name"),
            last_name: f.text("last_name"),
            school: f.reference("school"),
            grade: f.opt_text("grade"),
            date_of_birth: f.opt_date("date_of_birth"),
            email: f.opt_text("email"),
            guardian_phone: f.opt_text("guardian_phone"),
        }),
        EntityKind::Teacher => Candidate::Teacher(NewTeacher {
            first_name: f.text("first_name"),
            last_name: f.text("last_name"),
            email: f.text("email"),
            school: f.reference("school"),
            phone: f.opt_text("phone"),
            subject: f.opt_text("subject"),
            hire_date: f.opt_date("hire_date"),
            status: f.opt_status("status"),
        }),
        EntityKind::ContentManager => Candidate::ContentManager(NewContentManager {
            first_name: f.text("first_name"),
            last_name: f.text("last_name"),
            email: f.text("email"),
            district: f.opt_reference("district"),
            phone: f.opt_text("phone"),
            status: f.opt_status("status"),
        }),
    };

    if f.errors.is_empty() {
        Ok(candidate)
    } else {
        Err(f.errors)
    }
}
