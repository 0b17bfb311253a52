//! # Sale Payload Validation
//!
//! Early validation of sale payloads, shared by the register (before a draft
//! is persisted) and the ingestion endpoint (before settlement runs).
//!
//! A malformed item is a per-item failure on the sync path: the sale stays
//! unsynced on the register and never blocks sibling sales in the batch.

use crate::error::ValidationError;
use crate::protocol::SaleEnvelope;
use crate::types::{SaleDraft, SaleLine};

/// Validates a sale envelope before any settlement effect runs.
pub fn validate_envelope(envelope: &SaleEnvelope) -> Result<(), ValidationError> {
    if envelope.local_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "localId".into(),
        });
    }
    validate_payload(
        &envelope.items,
        envelope.total_minor,
        envelope.amount_paid_minor,
    )
}

/// Validates a draft at the register before it is persisted locally.
pub fn validate_draft(draft: &SaleDraft) -> Result<(), ValidationError> {
    validate_payload(&draft.lines, draft.total_minor, draft.amount_paid_minor)
}

fn validate_payload(
    lines: &[SaleLine],
    total_minor: i64,
    amount_paid_minor: Option<i64>,
) -> Result<(), ValidationError> {
    if lines.is_empty() {
        return Err(ValidationError::Empty {
            field: "items".into(),
        });
    }

    for line in lines {
        if line.product_id.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "items.productId".into(),
            });
        }
        if line.quantity <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "items.quantity".into(),
            });
        }
        if line.unit_price_minor < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "items.unitPrice".into(),
            });
        }
        if line.line_total().is_none() {
            return Err(ValidationError::Overflow {
                field: "items.lineTotal".into(),
            });
        }
    }

    if total_minor < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "total".into(),
        });
    }
    if let Some(paid) = amount_paid_minor {
        if paid < 0 {
            return Err(ValidationError::MustNotBeNegative {
                field: "amountPaid".into(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;
    use chrono::Utc;

    fn line(quantity: i64, unit_price: i64) -> SaleLine {
        SaleLine {
            product_id: "p-1".into(),
            name: "Arabica beans 500g".into(),
            code: "AB-500".into(),
            unit_price_minor: unit_price,
            quantity,
        }
    }

    fn envelope(items: Vec<SaleLine>) -> SaleEnvelope {
        SaleEnvelope {
            local_id: "local-1".into(),
            items,
            total_minor: 100_000,
            amount_paid_minor: None,
            payment_method: PaymentMethod::Cash,
            customer_id: None,
            is_return: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_envelope() {
        assert!(validate_envelope(&envelope(vec![line(2, 50_000)])).is_ok());
    }

    #[test]
    fn test_empty_items_rejected() {
        let err = validate_envelope(&envelope(vec![])).unwrap_err();
        assert!(matches!(err, ValidationError::Empty { .. }));
    }

    #[test]
    fn test_non_positive_quantity_rejected() {
        let err = validate_envelope(&envelope(vec![line(0, 50_000)])).unwrap_err();
        assert!(matches!(err, ValidationError::MustBePositive { .. }));
    }

    #[test]
    fn test_blank_local_id_rejected() {
        let mut bad = envelope(vec![line(1, 50_000)]);
        bad.local_id = "  ".into();
        let err = validate_envelope(&bad).unwrap_err();
        assert!(matches!(err, ValidationError::Required { .. }));
    }

    #[test]
    fn test_negative_amount_paid_rejected() {
        let mut bad = envelope(vec![line(1, 50_000)]);
        bad.amount_paid_minor = Some(-1);
        let err = validate_envelope(&bad).unwrap_err();
        assert!(matches!(err, ValidationError::MustNotBeNegative { .. }));
    }

    #[test]
    fn test_line_total_overflow_rejected() {
        let err = validate_envelope(&envelope(vec![line(i64::MAX, 2)])).unwrap_err();
        assert!(matches!(err, ValidationError::Overflow { .. }));
    }
}
