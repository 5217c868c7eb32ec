// crates/policy-vault-core/src/runtime/normalizer.rs
// ============================================================================
// Module: Policy Vault Normalizer
// Description: Validation and canonicalization of loosely-typed candidates.
// Purpose: Turn extraction output into a CanonicalRecord or a collect-all error.
// Dependencies: crate::core, serde, serde_json, time
// ============================================================================

//! ## Overview
//! The normalizer reads a JSON object whose keys may be snake_case or
//! camelCase and whose values may be missing, wrongly typed, or
//! locale-formatted. Null and blank strings count as absent.
//!
//! Outcomes:
//! - fatal: missing insurer or policy number, wrong JSON types, end date not
//!   after start date. Every fatal problem is collected before returning.
//! - warning: unparseable amounts (coerced to zero), unparseable dates
//!   (coerced to today), and premium/monthly incoherence beyond tolerance.
//!
//! The normalizer never touches storage.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use time::Date;

use crate::core::CanonicalRecord;
use crate::core::CoverageItem;
use crate::core::FieldViolation;
use crate::core::InstallmentItem;
use crate::core::InstallmentStatus;
use crate::core::Money;
use crate::core::PolicyFields;
use crate::core::Provenance;
use crate::core::TaxDocumentType;
use crate::core::ValidationError;
use crate::core::ViolationKind;
use crate::core::format_iso_date;
use crate::core::identifiers::insurer_key;
use crate::core::money::premium_is_coherent;
use crate::core::parse_date;
use crate::runtime::schedule::MAX_INSTALLMENT_COUNT;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default premium coherence tolerance in percent.
pub const DEFAULT_PREMIUM_TOLERANCE_PERCENT: u8 = 15;

/// Earliest accepted vehicle model year.
const MIN_VEHICLE_YEAR: i64 = 1900;
/// Latest accepted vehicle model year.
const MAX_VEHICLE_YEAR: i64 = 2100;

/// Accepted keys per canonical field.
mod keys {
    /// Insurer display name.
    pub const INSURER: &[&str] = &["insurer", "insurer_name", "insurerName"];
    /// Policy number.
    pub const POLICY_NUMBER: &[&str] = &["policy_number", "policyNumber"];
    /// Insured party name.
    pub const INSURED_NAME: &[&str] = &["insured_name", "insuredName"];
    /// Tax document id.
    pub const INSURED_DOCUMENT: &[&str] = &["insured_document", "insuredDocument", "document"];
    /// Tax document type.
    pub const DOCUMENT_TYPE: &[&str] = &["document_type", "documentType"];
    /// Contact phone.
    pub const PHONE: &[&str] = &["phone"];
    /// Contact email.
    pub const EMAIL: &[&str] = &["email"];
    /// Vigency start.
    pub const START_DATE: &[&str] = &["start_date", "startDate"];
    /// Vigency end.
    pub const END_DATE: &[&str] = &["end_date", "endDate"];
    /// Annual premium.
    pub const PREMIUM: &[&str] = &["premium"];
    /// Monthly amount.
    pub const MONTHLY_AMOUNT: &[&str] = &["monthly_amount", "monthlyAmount"];
    /// Deductible.
    pub const DEDUCTIBLE: &[&str] = &["deductible"];
    /// Vehicle model.
    pub const VEHICLE_MODEL: &[&str] = &["vehicle_model", "vehicleModel"];
    /// Vehicle plate.
    pub const VEHICLE_PLATE: &[&str] = &["vehicle_plate", "vehiclePlate"];
    /// Vehicle year.
    pub const VEHICLE_YEAR: &[&str] = &["vehicle_year", "vehicleYear"];
    /// Coverage list.
    pub const COVERAGES: &[&str] = &["coverages"];
    /// Installment list.
    pub const INSTALLMENTS: &[&str] = &["installments"];
    /// Explicit installment count.
    pub const INSTALLMENT_COUNT: &[&str] = &["installment_count", "installmentCount"];
    /// Candidate provenance.
    pub const PROVENANCE: &[&str] = &["provenance"];
    /// Coverage description.
    pub const COVERAGE_DESCRIPTION: &[&str] = &["description", "name"];
    /// Coverage limit.
    pub const COVERAGE_LIMIT: &[&str] = &["limit", "limit_amount", "limitAmount"];
    /// Installment sequence.
    pub const INSTALLMENT_SEQUENCE: &[&str] = &["sequence", "number", "installment_number"];
    /// Installment amount.
    pub const INSTALLMENT_AMOUNT: &[&str] = &["amount"];
    /// Installment due date.
    pub const INSTALLMENT_DUE_DATE: &[&str] = &["due_date", "dueDate"];
    /// Installment status.
    pub const INSTALLMENT_STATUS: &[&str] = &["status"];
}

// ============================================================================
// SECTION: Output Types
// ============================================================================

/// Category of a non-blocking normalization warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    /// Amount could not be parsed and was coerced to zero.
    UnparseableAmount,
    /// Date could not be parsed and was coerced to today.
    UnparseableDate,
    /// Missing vigency date defaulted to today on insert.
    DateDefaulted,
    /// `monthly_amount * 12` deviates from the premium beyond tolerance.
    PremiumIncoherent,
    /// Optional value could not be interpreted and was dropped.
    ValueDropped,
}

/// Non-blocking normalization warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeWarning {
    /// Field path.
    pub field: String,
    /// Warning category.
    pub code: WarningCode,
    /// Human-readable detail.
    pub message: String,
}

impl NormalizeWarning {
    /// Creates a new warning.
    #[must_use]
    pub fn new(field: impl Into<String>, code: WarningCode, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
        }
    }
}

/// Successful normalization output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// Canonical record.
    pub record: CanonicalRecord,
    /// Warnings in discovery order.
    pub warnings: Vec<NormalizeWarning>,
}

// ============================================================================
// SECTION: Normalizer
// ============================================================================

/// Candidate normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    /// Premium coherence tolerance in percent.
    premium_tolerance_percent: u8,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREMIUM_TOLERANCE_PERCENT)
    }
}

impl Normalizer {
    /// Creates a normalizer with the given premium tolerance.
    #[must_use]
    pub const fn new(premium_tolerance_percent: u8) -> Self {
        Self {
            premium_tolerance_percent,
        }
    }

    /// Normalizes a candidate; `today` replaces unparseable dates.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] listing every fatal violation.
    pub fn normalize(&self, candidate: &Value, today: Date) -> Result<Normalized, ValidationError> {
        let Value::Object(map) = candidate else {
            return Err(ValidationError::single(
                "candidate",
                ViolationKind::InvalidValue,
                "candidate must be a JSON object",
            ));
        };
        let mut reader = Reader {
            today,
            violations: Vec::new(),
            warnings: Vec::new(),
        };

        let insurer = reader.required_identifier(map, "insurer", keys::INSURER);
        let policy_number = reader.required_identifier(map, "policy_number", keys::POLICY_NUMBER);
        let insured_document = reader.identifier(map, "insured_document", keys::INSURED_DOCUMENT);
        let document_type = reader
            .parsed::<TaxDocumentType>(map, "document_type", keys::DOCUMENT_TYPE)
            .or_else(|| insured_document.as_deref().map(TaxDocumentType::infer));
        let fields = PolicyFields {
            insured_name: reader.text(map, "insured_name", keys::INSURED_NAME),
            insured_document,
            document_type,
            phone: reader.identifier(map, "phone", keys::PHONE),
            email: reader.text(map, "email", keys::EMAIL),
            premium: reader.money(map, "premium", keys::PREMIUM),
            monthly_amount: reader.money(map, "monthly_amount", keys::MONTHLY_AMOUNT),
            deductible: reader.money(map, "deductible", keys::DEDUCTIBLE),
            vehicle_model: reader.text(map, "vehicle_model", keys::VEHICLE_MODEL),
            vehicle_plate: reader.text(map, "vehicle_plate", keys::VEHICLE_PLATE),
            vehicle_year: reader.vehicle_year(map),
        };
        let start_date = reader.date(map, "start_date", keys::START_DATE);
        let end_date = reader.date(map, "end_date", keys::END_DATE);
        let coverages = reader.coverages(map);
        let installments = reader.installments(map);
        let installment_count = reader.installment_count(map);
        let provenance =
            reader.parsed::<Provenance>(map, "provenance", keys::PROVENANCE).unwrap_or_default();

        if let (Some(start), Some(end)) = (start_date, end_date)
            && let Err(violation) = check_date_order(start, end)
        {
            reader.violations.push(violation);
        }
        if let (Some(premium), Some(monthly)) = (fields.premium, fields.monthly_amount)
            && !premium_is_coherent(premium, monthly, self.premium_tolerance_percent)
        {
            reader.warnings.push(NormalizeWarning::new(
                "monthly_amount",
                WarningCode::PremiumIncoherent,
                format!(
                    "monthly amount {monthly} x 12 deviates from premium {premium} by more than \
                     {}%",
                    self.premium_tolerance_percent
                ),
            ));
        }

        let (Some(insurer), Some(policy_number)) = (insurer, policy_number) else {
            return Err(ValidationError::new(reader.violations));
        };
        if !reader.violations.is_empty() {
            return Err(ValidationError::new(reader.violations));
        }
        Ok(Normalized {
            record: CanonicalRecord {
                insurer_key: insurer_key(&insurer),
                insurer,
                policy_number,
                fields,
                start_date,
                end_date,
                coverages,
                installments,
                installment_count,
                provenance,
            },
            warnings: reader.warnings,
        })
    }
}

/// Checks that `end` is strictly after `start`.
///
/// # Errors
///
/// Returns an [`ViolationKind::InvalidDateOrder`] violation otherwise.
pub fn check_date_order(start: Date, end: Date) -> Result<(), FieldViolation> {
    if end > start {
        return Ok(());
    }
    Err(FieldViolation::new(
        "end_date",
        ViolationKind::InvalidDateOrder,
        format!(
            "end_date {} must be after start_date {}",
            format_iso_date(end),
            format_iso_date(start)
        ),
    ))
}

// ============================================================================
// SECTION: Reader
// ============================================================================

/// Accumulates violations and warnings while reading a candidate.
struct Reader {
    /// Replacement for unparseable dates.
    today: Date,
    /// Fatal violations.
    violations: Vec<FieldViolation>,
    /// Non-blocking warnings.
    warnings: Vec<NormalizeWarning>,
}

impl Reader {
    /// Records an invalid-value violation.
    fn invalid(&mut self, field: &str, message: impl Into<String>) {
        self.violations.push(FieldViolation::new(field, ViolationKind::InvalidValue, message));
    }

    /// Records a dropped optional value.
    fn dropped(&mut self, field: &str, detail: &str) {
        self.warnings.push(NormalizeWarning::new(
            field,
            WarningCode::ValueDropped,
            format!("{detail}; value ignored"),
        ));
    }

    /// Reads a required identifier.
    fn required_identifier(
        &mut self,
        map: &Map<String, Value>,
        field: &str,
        aliases: &[&str],
    ) -> Option<String> {
        let present = lookup(map, aliases).is_some();
        let value = self.identifier(map, field, aliases);
        if value.is_none() && (!present || is_blank(lookup(map, aliases))) {
            self.violations.push(FieldViolation::new(
                field,
                ViolationKind::MissingRequiredField,
                format!("{field} is required"),
            ));
        }
        value
    }

    /// Reads a text field; only strings are accepted.
    fn text(&mut self, map: &Map<String, Value>, field: &str, aliases: &[&str]) -> Option<String> {
        match lookup(map, aliases)? {
            Value::String(raw) => non_blank(raw),
            _ => {
                self.invalid(field, "expected a string");
                None
            }
        }
    }

    /// Reads an identifier-like field; strings and integers are accepted.
    fn identifier(
        &mut self,
        map: &Map<String, Value>,
        field: &str,
        aliases: &[&str],
    ) -> Option<String> {
        match lookup(map, aliases)? {
            Value::String(raw) => non_blank(raw),
            Value::Number(number) if number.is_u64() || number.is_i64() => Some(number.to_string()),
            _ => {
                self.invalid(field, "expected a string or integer");
                None
            }
        }
    }

    /// Reads an enumerated field through its `FromStr` implementation.
    fn parsed<T: FromStr<Err = String>>(
        &mut self,
        map: &Map<String, Value>,
        field: &str,
        aliases: &[&str],
    ) -> Option<T> {
        let raw = self.text(map, field, aliases)?;
        match raw.parse::<T>() {
            Ok(value) => Some(value),
            Err(message) => {
                self.invalid(field, message);
                None
            }
        }
    }

    /// Reads a money field.
    fn money(&mut self, map: &Map<String, Value>, field: &str, aliases: &[&str]) -> Option<Money> {
        let value = lookup(map, aliases)?;
        self.money_value(field, value)
    }

    /// Converts a JSON value to money.
    fn money_value(&mut self, field: &str, value: &Value) -> Option<Money> {
        match value {
            Value::Number(number) => match Money::from_json_number(number) {
                Ok(amount) => Some(amount),
                Err(err) => {
                    self.warnings.push(NormalizeWarning::new(
                        field,
                        WarningCode::UnparseableAmount,
                        format!("{err}; stored as 0.00"),
                    ));
                    Some(Money::ZERO)
                }
            },
            Value::String(raw) => {
                let raw = non_blank(raw)?;
                Money::parse_locale(&raw).or_else(|| {
                    self.warnings.push(NormalizeWarning::new(
                        field,
                        WarningCode::UnparseableAmount,
                        format!("could not parse amount {raw:?}; stored as 0.00"),
                    ));
                    Some(Money::ZERO)
                })
            }
            Value::Null => None,
            _ => {
                self.invalid(field, "expected a number or numeric string");
                None
            }
        }
    }

    /// Reads a date field.
    fn date(&mut self, map: &Map<String, Value>, field: &str, aliases: &[&str]) -> Option<Date> {
        let value = lookup(map, aliases)?;
        self.date_value(field, value)
    }

    /// Converts a JSON value to a date.
    fn date_value(&mut self, field: &str, value: &Value) -> Option<Date> {
        match value {
            Value::String(raw) => {
                let raw = non_blank(raw)?;
                parse_date(&raw).or_else(|| {
                    self.warnings.push(NormalizeWarning::new(
                        field,
                        WarningCode::UnparseableDate,
                        format!(
                            "could not parse date {raw:?}; using {}",
                            format_iso_date(self.today)
                        ),
                    ));
                    Some(self.today)
                })
            }
            Value::Null => None,
            _ => {
                self.invalid(field, "expected a date string");
                None
            }
        }
    }

    /// Reads the vehicle model year.
    ///
    /// The `manufacture/model` form (`2024/2025`) yields the model year.
    fn vehicle_year(&mut self, map: &Map<String, Value>) -> Option<i32> {
        let field = "vehicle_year";
        let year = match lookup(map, keys::VEHICLE_YEAR)? {
            Value::Number(number) => number.as_i64(),
            Value::String(raw) => {
                let raw = non_blank(raw)?;
                let model = raw.rsplit('/').next().unwrap_or(raw.as_str()).trim();
                model.parse::<i64>().ok()
            }
            Value::Null => return None,
            _ => {
                self.invalid(field, "expected a number or numeric string");
                return None;
            }
        };
        let year = year
            .filter(|year| (MIN_VEHICLE_YEAR ..= MAX_VEHICLE_YEAR).contains(year))
            .and_then(|year| i32::try_from(year).ok());
        if year.is_none() {
            self.dropped(
                field,
                &format!("expected a year between {MIN_VEHICLE_YEAR} and {MAX_VEHICLE_YEAR}"),
            );
        }
        year
    }

    /// Reads the explicit installment count.
    fn installment_count(&mut self, map: &Map<String, Value>) -> Option<u32> {
        let field = "installment_count";
        let count = match lookup(map, keys::INSTALLMENT_COUNT)? {
            Value::Number(number) => number.as_u64(),
            Value::String(raw) => {
                let raw = non_blank(raw)?;
                raw.parse::<u64>().ok()
            }
            Value::Null => return None,
            _ => {
                self.invalid(field, "expected a number or numeric string");
                return None;
            }
        };
        let count = count
            .and_then(|count| u32::try_from(count).ok())
            .filter(|count| (1 ..= MAX_INSTALLMENT_COUNT).contains(count));
        if count.is_none() {
            self.dropped(
                field,
                &format!("expected an integer between 1 and {MAX_INSTALLMENT_COUNT}"),
            );
        }
        count
    }

    /// Reads the coverage list.
    fn coverages(&mut self, map: &Map<String, Value>) -> Option<Vec<CoverageItem>> {
        let value = lookup(map, keys::COVERAGES)?;
        let Value::Array(items) = value else {
            self.invalid("coverages", "expected a list");
            return None;
        };
        let mut coverages = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let path = format!("coverages[{idx}]");
            match item {
                Value::String(raw) => match non_blank(raw) {
                    Some(description) => coverages.push(CoverageItem {
                        description,
                        limit: None,
                    }),
                    None => self.invalid(&path, "coverage description is required"),
                },
                Value::Object(entry) => {
                    let description = self.text(
                        entry,
                        &format!("{path}.description"),
                        keys::COVERAGE_DESCRIPTION,
                    );
                    let limit = self.money(entry, &format!("{path}.limit"), keys::COVERAGE_LIMIT);
                    match description {
                        Some(description) => coverages.push(CoverageItem {
                            description,
                            limit,
                        }),
                        None => self.invalid(
                            &format!("{path}.description"),
                            "coverage description is required",
                        ),
                    }
                }
                _ => self.invalid(&path, "expected a coverage object or description string"),
            }
        }
        Some(coverages)
    }

    /// Reads the installment list.
    fn installments(&mut self, map: &Map<String, Value>) -> Option<Vec<InstallmentItem>> {
        let value = lookup(map, keys::INSTALLMENTS)?;
        let Value::Array(items) = value else {
            self.invalid("installments", "expected a list");
            return None;
        };
        if items.len() > usize::try_from(MAX_INSTALLMENT_COUNT).unwrap_or(usize::MAX) {
            self.invalid(
                "installments",
                format!("at most {MAX_INSTALLMENT_COUNT} installments are accepted"),
            );
            return None;
        }
        let mut seen = BTreeSet::new();
        let mut installments = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let path = format!("installments[{idx}]");
            let Value::Object(entry) = item else {
                self.invalid(&path, "expected an installment object");
                continue;
            };
            if let Some(installment) = self.installment(entry, &path, idx) {
                if seen.insert(installment.sequence) {
                    installments.push(installment);
                } else {
                    self.invalid(
                        &format!("{path}.sequence"),
                        format!("duplicate installment sequence {}", installment.sequence),
                    );
                }
            }
        }
        installments.sort_by_key(|item| item.sequence);
        Some(installments)
    }

    /// Reads one installment object.
    fn installment(
        &mut self,
        entry: &Map<String, Value>,
        path: &str,
        idx: usize,
    ) -> Option<InstallmentItem> {
        let sequence_field = format!("{path}.sequence");
        let sequence = match lookup(entry, keys::INSTALLMENT_SEQUENCE) {
            None => u32::try_from(idx + 1).ok(),
            Some(value) => value
                .as_u64()
                .and_then(|raw| u32::try_from(raw).ok())
                .filter(|sequence| *sequence >= 1),
        };
        let amount_field = format!("{path}.amount");
        let amount = match lookup(entry, keys::INSTALLMENT_AMOUNT) {
            Some(value) => self.money_value(&amount_field, value),
            None => None,
        };
        let due_field = format!("{path}.due_date");
        let due_date = match lookup(entry, keys::INSTALLMENT_DUE_DATE) {
            Some(value) => self.date_value(&due_field, value),
            None => None,
        };
        let status = self
            .parsed::<InstallmentStatus>(entry, &format!("{path}.status"), keys::INSTALLMENT_STATUS)
            .unwrap_or_default();

        if sequence.is_none() {
            self.invalid(&sequence_field, "expected a positive integer");
        }
        if amount.is_none() {
            self.invalid(&amount_field, "installment amount is required");
        }
        if due_date.is_none() {
            self.invalid(&due_field, "installment due date is required");
        }
        Some(InstallmentItem {
            sequence: sequence?,
            amount: amount?,
            due_date: due_date?,
            status,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the first non-null value among `aliases`.
fn lookup<'a>(map: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().filter_map(|alias| map.get(*alias)).find(|value| !value.is_null())
}

/// Returns true for a present string value that is blank.
fn is_blank(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::String(raw)) if raw.trim().is_empty())
}

/// Trims a string, treating blank as absent.
fn non_blank(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use serde_json::json;
    use time::Month;

    use super::*;

    fn today() -> Date {
        Date::from_calendar_date(2024, Month::June, 15).unwrap()
    }

    #[test]
    fn blank_insurer_is_reported_once() {
        let err = Normalizer::default()
            .normalize(&json!({"insurer": "  ", "policy_number": "1"}), today())
            .unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, "insurer");
        assert_eq!(err.violations[0].kind, ViolationKind::MissingRequiredField);
    }

    #[test]
    fn wrongly_typed_insurer_is_invalid_not_missing() {
        let err = Normalizer::default()
            .normalize(&json!({"insurer": true, "policy_number": "1"}), today())
            .unwrap_err();
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].kind, ViolationKind::InvalidValue);
    }

    #[test]
    fn numeric_policy_number_is_accepted() {
        let normalized = Normalizer::default()
            .normalize(&json!({"insurer": "Porto", "policyNumber": 12345}), today())
            .unwrap();
        assert_eq!(normalized.record.policy_number, "12345");
    }
}
