use thiserror::Error;

/// Domain failures surfaced by fee/payment operations. Mapped to stable
/// wire codes at the IPC boundary.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    External(String),
}

impl DomainError {
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Validation(_) => "validation_failed",
            DomainError::NotFound(_) => "not_found",
            DomainError::Conflict(_) => "conflict",
            DomainError::External(_) => "external_service_failed",
        }
    }
}

/// Two retried gateway callbacks for the same logical payment are only
/// caught when they land inside this window. Not a real idempotency key.
pub const DUPLICATE_WINDOW_MINUTES: i64 = 10;

/// Verified gateway amounts may differ from the requested amount by at most
/// this many minor units unless overridden in workspace settings.
pub const DEFAULT_GATEWAY_TOLERANCE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PairStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PairStatus::Unpaid => "unpaid",
            PairStatus::PartiallyPaid => "partially_paid",
            PairStatus::Paid => "paid",
        }
    }
}

/// Derived remaining amount for one (student, fee) pair. Never stored;
/// recomputed from the payment set on every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Balance {
    pub total_paid: i64,
    pub remaining: i64,
    pub is_paid: bool,
}

impl Balance {
    pub fn status(&self) -> PairStatus {
        if self.is_paid {
            PairStatus::Paid
        } else if self.total_paid > 0 {
            PairStatus::PartiallyPaid
        } else {
            PairStatus::Unpaid
        }
    }
}

pub fn balance(fee_amount: i64, total_paid: i64) -> Balance {
    let remaining = fee_amount - total_paid;
    Balance {
        total_paid,
        remaining,
        is_paid: remaining <= 0,
    }
}

/// The single gate on the cap invariant: sum of payments never exceeds the
/// fee amount. Equality is allowed and completes the pair.
pub fn check_new_payment(fee_amount: i64, total_paid: i64, amount: i64) -> Result<(), DomainError> {
    if amount <= 0 {
        return Err(DomainError::Validation(
            "payment amount must be greater than zero".to_string(),
        ));
    }
    let remaining = fee_amount - total_paid;
    if amount > remaining {
        return Err(DomainError::Validation(format!(
            "payment of {} exceeds remaining balance of {}",
            display_amount(amount),
            display_amount(remaining.max(0)),
        )));
    }
    Ok(())
}

pub fn amount_within_tolerance(expected: i64, verified: i64, tolerance: i64) -> bool {
    (expected - verified).abs() <= tolerance
}

/// Minor units to a human string, e.g. 50000 -> "500.00".
pub fn display_amount(minor: i64) -> String {
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_tracks_remaining_and_paid_flag() {
        let b = balance(50_000, 0);
        assert_eq!(b.remaining, 50_000);
        assert!(!b.is_paid);
        assert_eq!(b.status(), PairStatus::Unpaid);

        let b = balance(50_000, 30_000);
        assert_eq!(b.remaining, 20_000);
        assert!(!b.is_paid);
        assert_eq!(b.status(), PairStatus::PartiallyPaid);

        let b = balance(50_000, 50_000);
        assert_eq!(b.remaining, 0);
        assert!(b.is_paid);
        assert_eq!(b.status(), PairStatus::Paid);
    }

    #[test]
    fn zero_and_negative_amounts_rejected() {
        assert!(check_new_payment(50_000, 0, 0).is_err());
        assert!(check_new_payment(50_000, 0, -100).is_err());
    }

    #[test]
    fn cap_is_strict_but_equality_succeeds() {
        assert!(check_new_payment(50_000, 30_000, 20_001).is_err());
        assert!(check_new_payment(50_000, 30_000, 20_000).is_ok());
        assert!(check_new_payment(50_000, 50_000, 1).is_err());
    }

    #[test]
    fn cap_error_carries_codes() {
        let e = check_new_payment(50_000, 30_000, 90_000).unwrap_err();
        assert_eq!(e.code(), "validation_failed");
        let e = DomainError::Conflict("x".to_string());
        assert_eq!(e.code(), "conflict");
    }

    #[test]
    fn tolerance_is_symmetric() {
        assert!(amount_within_tolerance(50_000, 50_099, 100));
        assert!(amount_within_tolerance(50_000, 49_901, 100));
        assert!(!amount_within_tolerance(50_000, 50_101, 100));
        assert!(!amount_within_tolerance(50_000, 49_899, 100));
    }

    #[test]
    fn display_amount_is_two_decimal_minor_units() {
        assert_eq!(display_amount(0), "0.00");
        assert_eq!(display_amount(5), "0.05");
        assert_eq!(display_amount(50_000), "500.00");
        assert_eq!(display_amount(-1_250), "-12.50");
    }
}
