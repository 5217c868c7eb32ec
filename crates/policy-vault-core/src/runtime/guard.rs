// crates/policy-vault-core/src/runtime/guard.rs
// ============================================================================
// Module: Policy Vault Confirmed-Field Guard
// Description: Safe write-set resolution against the lock registry.
// Purpose: Never let automated ingestion overwrite confirmed or known values.
// Dependencies: crate::core, time
// ============================================================================

//! ## Overview
//! For every mutable field the guard applies, in order:
//! 1. locked: keep the existing value
//! 2. incoming present: take the incoming value
//! 3. otherwise: keep the existing value
//!
//! Collections follow the same rule with "absent" meaning the candidate did
//! not carry the list at all. A stored installment schedule is never
//! resynthesized; synthesis only fills an empty schedule.

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::Date;

use crate::core::CanonicalRecord;
use crate::core::CoverageItem;
use crate::core::FieldName;
use crate::core::InstallmentItem;
use crate::core::LockRegistry;
use crate::core::PolicyFields;
use crate::core::PolicyRecord;

// ============================================================================
// SECTION: Write Set
// ============================================================================

/// Decision for the installment collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallmentPlan {
    /// Leave the stored schedule untouched.
    Keep,
    /// Replace with the supplied schedule.
    Replace(Vec<InstallmentItem>),
    /// Replace with a schedule synthesized from the final monthly amount.
    Synthesize,
}

/// Final values to write for an existing record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSet {
    /// Final scalar fields.
    pub fields: PolicyFields,
    /// Final vigency start.
    pub start_date: Date,
    /// Final vigency end.
    pub end_date: Date,
    /// Coverage replacement, or `None` to keep the stored list.
    pub coverages: Option<Vec<CoverageItem>>,
    /// Installment decision.
    pub installments: InstallmentPlan,
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the safe write-set for an update.
#[must_use]
pub fn resolve_write_set(
    existing: &PolicyRecord,
    incoming: &CanonicalRecord,
    locks: &LockRegistry,
) -> WriteSet {
    let current = &existing.header.fields;
    let next = &incoming.fields;
    let fields = PolicyFields {
        insured_name: pick(
            locks,
            FieldName::InsuredName,
            &current.insured_name,
            &next.insured_name,
        ),
        insured_document: pick(
            locks,
            FieldName::InsuredDocument,
            &current.insured_document,
            &next.insured_document,
        ),
        document_type: pick(
            locks,
            FieldName::DocumentType,
            &current.document_type,
            &next.document_type,
        ),
        phone: pick(locks, FieldName::Phone, &current.phone, &next.phone),
        email: pick(locks, FieldName::Email, &current.email, &next.email),
        premium: pick(locks, FieldName::Premium, &current.premium, &next.premium),
        monthly_amount: pick(
            locks,
            FieldName::MonthlyAmount,
            &current.monthly_amount,
            &next.monthly_amount,
        ),
        deductible: pick(locks, FieldName::Deductible, &current.deductible, &next.deductible),
        vehicle_model: pick(
            locks,
            FieldName::VehicleModel,
            &current.vehicle_model,
            &next.vehicle_model,
        ),
        vehicle_plate: pick(
            locks,
            FieldName::VehiclePlate,
            &current.vehicle_plate,
            &next.vehicle_plate,
        ),
        vehicle_year: pick(
            locks,
            FieldName::VehicleYear,
            &current.vehicle_year,
            &next.vehicle_year,
        ),
    };
    let start_date = pick_required(
        locks,
        FieldName::StartDate,
        existing.header.start_date,
        incoming.start_date,
    );
    let end_date =
        pick_required(locks, FieldName::EndDate, existing.header.end_date, incoming.end_date);
    let coverages = if locks.is_locked(FieldName::Coverages) {
        None
    } else {
        incoming.coverages.clone()
    };
    let installments = plan_installments(
        Some(existing.installments.as_slice()),
        incoming.installments.as_deref(),
        locks.is_locked(FieldName::Installments),
    );
    WriteSet {
        fields,
        start_date,
        end_date,
        coverages,
        installments,
    }
}

/// Decides the installment plan from the stored and supplied schedules.
///
/// `existing` is `None` for a record that does not exist yet.
#[must_use]
pub fn plan_installments(
    existing: Option<&[InstallmentItem]>,
    incoming: Option<&[InstallmentItem]>,
    locked: bool,
) -> InstallmentPlan {
    if locked {
        return InstallmentPlan::Keep;
    }
    if let Some(items) = incoming {
        return InstallmentPlan::Replace(items.to_vec());
    }
    match existing {
        Some(current) if !current.is_empty() => InstallmentPlan::Keep,
        _ => InstallmentPlan::Synthesize,
    }
}

/// Applies the guard rule to an optional field.
fn pick<T: Clone>(
    locks: &LockRegistry,
    field: FieldName,
    existing: &Option<T>,
    incoming: &Option<T>,
) -> Option<T> {
    if locks.is_locked(field) {
        return existing.clone();
    }
    incoming.as_ref().or(existing.as_ref()).cloned()
}

/// Applies the guard rule to a field the stored record always has.
fn pick_required<T: Copy>(
    locks: &LockRegistry,
    field: FieldName,
    existing: T,
    incoming: Option<T>,
) -> T {
    if locks.is_locked(field) {
        return existing;
    }
    incoming.unwrap_or(existing)
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

    use time::Month;

    use super::*;
    use crate::core::FieldLock;
    use crate::core::InstallmentStatus;
    use crate::core::Money;
    use crate::core::OwnerId;
    use crate::core::PolicyHeader;
    use crate::core::PolicyId;
    use crate::core::PolicyStatus;
    use crate::core::Provenance;
    use crate::core::Timestamp;

    fn date(year: i32, month: Month, day: u8) -> Date {
        Date::from_calendar_date(year, month, day).unwrap()
    }

    fn existing() -> PolicyRecord {
        PolicyRecord {
            policy_id: PolicyId::from_raw(1).unwrap(),
            header: PolicyHeader {
                owner_id: OwnerId::new("acct-1"),
                insurer: "Porto".to_string(),
                insurer_key: "PORTO".to_string(),
                policy_number: "P-1".to_string(),
                fields: PolicyFields {
                    phone: Some("1111".to_string()),
                    premium: Some(Money::from_cents(420_000)),
                    ..PolicyFields::default()
                },
                start_date: date(2024, Month::January, 10),
                end_date: date(2025, Month::January, 10),
                status: PolicyStatus::Vigente,
                artifact_hash: None,
                artifact_path: None,
                version: 1,
                provenance: Provenance::Extraction,
                created_at: Timestamp::from_unix_millis(0),
                updated_at: Timestamp::from_unix_millis(0),
                extracted_at: None,
            },
            coverages: vec![CoverageItem {
                description: "Theft".to_string(),
                limit: None,
            }],
            installments: Vec::new(),
        }
    }

    fn incoming() -> CanonicalRecord {
        CanonicalRecord {
            insurer: "Porto".to_string(),
            insurer_key: "PORTO".to_string(),
            policy_number: "P-1".to_string(),
            fields: PolicyFields {
                premium: Some(Money::from_cents(500_000)),
                email: Some("a@b.c".to_string()),
                ..PolicyFields::default()
            },
            start_date: None,
            end_date: Some(date(2025, Month::February, 1)),
            coverages: None,
            installments: None,
            installment_count: None,
            provenance: Provenance::Extraction,
        }
    }

    fn lock(field: FieldName) -> FieldLock {
        FieldLock {
            field,
            confirmed_at: Timestamp::from_unix_millis(5),
            confirmed_by: None,
        }
    }

    #[test]
    fn locked_field_keeps_existing_value() {
        let locks: LockRegistry = [lock(FieldName::Premium)].into_iter().collect();
        let write = resolve_write_set(&existing(), &incoming(), &locks);
        assert_eq!(write.fields.premium, Some(Money::from_cents(420_000)));
        assert_eq!(write.fields.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn absent_values_never_erase_existing_ones() {
        let write = resolve_write_set(&existing(), &incoming(), &LockRegistry::new());
        assert_eq!(write.fields.phone.as_deref(), Some("1111"));
        assert_eq!(write.start_date, date(2024, Month::January, 10));
        assert_eq!(write.end_date, date(2025, Month::February, 1));
        assert_eq!(write.coverages, None);
    }

    #[test]
    fn locked_collection_is_kept_even_when_supplied() {
        let mut candidate = incoming();
        candidate.coverages = Some(Vec::new());
        let locks: LockRegistry = [lock(FieldName::Coverages)].into_iter().collect();
        let write = resolve_write_set(&existing(), &candidate, &locks);
        assert_eq!(write.coverages, None);
    }

    #[test]
    fn stored_schedule_is_never_resynthesized() {
        let mut record = existing();
        record.installments = vec![InstallmentItem {
            sequence: 1,
            amount: Money::from_cents(35_000),
            due_date: date(2024, Month::January, 10),
            status: InstallmentStatus::Paid,
        }];
        let write = resolve_write_set(&record, &incoming(), &LockRegistry::new());
        assert_eq!(write.installments, InstallmentPlan::Keep);

        record.installments[0].status = InstallmentStatus::Upcoming;
        let write = resolve_write_set(&record, &incoming(), &LockRegistry::new());
        assert_eq!(write.installments, InstallmentPlan::Keep);
        assert_eq!(
            resolve_write_set(&existing(), &incoming(), &LockRegistry::new()).installments,
            InstallmentPlan::Synthesize
        );
    }
}
