use mongodb::bson::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeeStatus {
    Pending,
    PartiallyPaid,
    Paid,
    Overdue,
    Cancelled,
}

impl FeeStatus {
    pub const ALL: [FeeStatus; 5] = [
        FeeStatus::Pending,
        FeeStatus::PartiallyPaid,
        FeeStatus::Paid,
        FeeStatus::Overdue,
        FeeStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Pending => "pending",
            FeeStatus::PartiallyPaid => "partially_paid",
            FeeStatus::Paid => "paid",
            FeeStatus::Overdue => "overdue",
            FeeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FeeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(FeeStatus::Pending),
            "partially_paid" | "partial" => Ok(FeeStatus::PartiallyPaid),
            "paid" => Ok(FeeStatus::Paid),
            "overdue" => Ok(FeeStatus::Overdue),
            "cancelled" | "canceled" => Ok(FeeStatus::Cancelled),
            _ => Err(format!("Invalid fee status: {}", s)),
        }
    }
}

/// Itemised components of a fee. Informational only; the obligation is
/// `Fee::total_amount`.
///
/// Amounts are stored as decimal strings so no precision is lost.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    #[serde(default)]
    pub tuition_fee: Decimal,
    #[serde(default)]
    pub exam_fee: Decimal,
    #[serde(default)]
    pub transport_fee: Decimal,
    #[serde(default)]
    pub library_fee: Decimal,
    #[serde(default)]
    pub other_fees: Decimal,
}

/// One settlement against a fee. Never edited once appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: String,
    pub amount: Decimal,
    pub payment_date: DateTime,
    pub payment_method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}

impl Payment {
    pub fn new(amount: Decimal, payment_method: Option<String>, recorded_by: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            amount,
            payment_date: DateTime::now(),
            payment_method: payment_method
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "cash".to_string()),
            reference: None,
            notes: None,
            recorded_by,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    #[serde(rename = "_id")]
    pub id: String,
    pub student: String,
    pub class_name: String,
    #[serde(default)]
    pub academic_term: String,
    #[serde(default)]
    pub academic_year: String,
    #[serde(flatten)]
    pub breakdown: FeeBreakdown,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub balance: Decimal,
    pub status: FeeStatus,
    pub due_date: Option<DateTime>,
    pub description: Option<String>,
    #[serde(default)]
    pub payments: Vec<Payment>,
    #[serde(default)]
    pub version: i64,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// `max(0, total - paid)`.
pub fn derive_balance(total_amount: Decimal, paid_amount: Decimal) -> Decimal {
    total_amount
        .checked_sub(paid_amount)
        .unwrap_or(Decimal::ZERO)
        .max(Decimal::ZERO)
}

/// Status as a pure function of the amounts, the due date and `now`.
///
/// `cancelled` is the only status that is set rather than derived, so it
/// is passed through unchanged.
pub fn derive_status(
    current: FeeStatus,
    total_amount: Decimal,
    paid_amount: Decimal,
    due_date: Option<DateTime>,
    now: DateTime,
) -> FeeStatus {
    if current == FeeStatus::Cancelled {
        return FeeStatus::Cancelled;
    }
    if total_amount > Decimal::ZERO && paid_amount >= total_amount {
        return FeeStatus::Paid;
    }
    let outstanding = derive_balance(total_amount, paid_amount) > Decimal::ZERO;
    if outstanding && due_date.is_some_and(|due| due < now) {
        return FeeStatus::Overdue;
    }
    if paid_amount > Decimal::ZERO {
        FeeStatus::PartiallyPaid
    } else {
        FeeStatus::Pending
    }
}

impl Fee {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        student: String,
        class_name: String,
        academic_term: String,
        academic_year: String,
        breakdown: FeeBreakdown,
        total_amount: Decimal,
        paid_amount: Decimal,
        requested_status: FeeStatus,
        due_date: Option<DateTime>,
        description: Option<String>,
    ) -> Self {
        let now = DateTime::now();
        let mut fee = Self {
            id: Uuid::new_v4().to_string(),
            student,
            class_name,
            academic_term,
            academic_year,
            breakdown,
            total_amount,
            paid_amount,
            balance: Decimal::ZERO,
            status: requested_status,
            due_date,
            description,
            payments: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        fee.recompute(now);
        fee
    }

    /// Refresh `balance` and `status` from the current fields.
    pub fn recompute(&mut self, now: DateTime) {
        self.balance = derive_balance(self.total_amount, self.paid_amount);
        self.status = derive_status(
            self.status,
            self.total_amount,
            self.paid_amount,
            self.due_date,
            now,
        );
    }

    /// Append a payment, bump `paid_amount` and recompute derived fields.
    /// Leaves the fee untouched when the new total is not representable.
    pub fn apply_payment(&mut self, payment: Payment, now: DateTime) -> Result<(), AppError> {
        self.paid_amount = self
            .paid_amount
            .checked_add(payment.amount)
            .ok_or_else(|| AppError::bad_request("Payment amount is too large"))?;
        self.payments.push(payment);
        self.touch(now);
        Ok(())
    }

    /// Mark a write: recompute, stamp `updated_at`, advance `version`.
    pub fn touch(&mut self, now: DateTime) {
        self.recompute(now);
        self.updated_at = now;
        self.version += 1;
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == FeeStatus::Cancelled
    }
}
