use chrono::{NaiveDate, Utc};
use mongodb::bson::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_core::error::AppError;
use thiserror::Error;
use validator::Validate;

use crate::dtos::students::StudentResponse;
use crate::models::{FeeBreakdown, FeeStatus, Payment, UNKNOWN_STUDENT};
use crate::services::ledger::{FeeListFilter, FeeUpdate, NewFee, PaymentInput, PopulatedFee};

#[derive(Debug, Error, PartialEq)]
pub enum AmountError {
    #[error("amount is required")]
    Missing,
    #[error("amount must be a number")]
    NotNumeric,
    #[error("amount is out of range")]
    OutOfRange,
}

/// Accept JSON numbers and numeric strings as exact decimals; reject
/// everything else, including NaN, infinities and values too large or too
/// precise for `Decimal`.
pub fn parse_amount(value: Option<&Value>) -> Result<Decimal, AmountError> {
    match value {
        None | Some(Value::Null) => Err(AmountError::Missing),
        Some(Value::Number(n)) => decimal_from_text(&n.to_string()).ok_or(AmountError::OutOfRange),
        Some(Value::String(s)) if !s.trim().is_empty() => {
            let text = s.trim();
            decimal_from_text(text).ok_or_else(|| match text.parse::<f64>() {
                Ok(n) if n.is_finite() => AmountError::OutOfRange,
                _ => AmountError::NotNumeric,
            })
        }
        Some(_) => Err(AmountError::NotNumeric),
    }
}

fn decimal_from_text(text: &str) -> Option<Decimal> {
    Decimal::from_str_exact(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Optional non-negative amount such as a breakdown component.
fn parse_optional_amount(value: Option<&Value>, field: &str) -> Result<Option<Decimal>, AppError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let amount = parse_amount(Some(value))
                .map_err(|e| AppError::bad_request(format!("{}: {}", field, e)))?;
            if amount < Decimal::ZERO {
                return Err(AppError::bad_request(format!("{} cannot be negative", field)));
            }
            Ok(Some(amount))
        }
    }
}

/// `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_date(raw: &str) -> Result<DateTime, AppError> {
    let raw = raw.trim();
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(DateTime::from_chrono(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| DateTime::from_chrono(dt.and_utc()))
        .ok_or_else(|| AppError::bad_request(format!("Invalid date: {}", raw)))
}

fn parse_optional_date(raw: Option<&str>) -> Result<Option<DateTime>, AppError> {
    match raw.map(str::trim) {
        Some(s) if !s.is_empty() => parse_date(s).map(Some),
        _ => Ok(None),
    }
}

fn parse_status(raw: &str) -> Result<FeeStatus, AppError> {
    raw.parse::<FeeStatus>().map_err(AppError::bad_request)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn to_rfc3339(dt: DateTime) -> String {
    dt.to_chrono().to_rfc3339()
}

#[derive(Debug, Deserialize, Default)]
pub struct FeeListParams {
    pub status: Option<String>,
    pub class: Option<String>,
    pub search: Option<String>,
}

impl FeeListParams {
    pub fn into_filter(self) -> Result<FeeListFilter, AppError> {
        let status = match non_blank(self.status) {
            Some(s) if s.eq_ignore_ascii_case("all") => None,
            Some(s) => Some(parse_status(&s)?),
            None => None,
        };
        Ok(FeeListFilter {
            status,
            class_name: non_blank(self.class),
            search: non_blank(self.search),
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateFeeRequest {
    pub student: Option<String>,
    pub class_name: Option<String>,
    pub amount: Option<Value>,
    pub status: Option<String>,
    #[validate(length(max = 50))]
    pub academic_term: Option<String>,
    #[validate(length(max = 50))]
    pub academic_year: Option<String>,
    pub due_date: Option<String>,
    pub paid_amount: Option<Value>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub tuition_fee: Option<Value>,
    pub exam_fee: Option<Value>,
    pub transport_fee: Option<Value>,
    pub library_fee: Option<Value>,
    pub other_fees: Option<Value>,
}

impl CreateFeeRequest {
    pub fn into_new_fee(self) -> Result<NewFee, AppError> {
        let (Some(student), Some(class_name), Some(status)) = (
            non_blank(self.student),
            non_blank(self.class_name),
            non_blank(self.status),
        ) else {
            return Err(AppError::bad_request(
                "Please provide student, className, amount and status",
            ));
        };

        let total_amount = parse_amount(self.amount.as_ref()).map_err(|e| match e {
            AmountError::Missing => {
                AppError::bad_request("Please provide student, className, amount and status")
            }
            other => AppError::bad_request(other.to_string()),
        })?;
        if total_amount < Decimal::ZERO {
            return Err(AppError::bad_request("amount cannot be negative"));
        }
        let component = |value: &Option<Value>, field: &str| {
            parse_optional_amount(value.as_ref(), field).map(Option::unwrap_or_default)
        };

        Ok(NewFee {
            student,
            class_name,
            academic_term: non_blank(self.academic_term).unwrap_or_default(),
            academic_year: non_blank(self.academic_year).unwrap_or_default(),
            breakdown: FeeBreakdown {
                tuition_fee: component(&self.tuition_fee, "tuitionFee")?,
                exam_fee: component(&self.exam_fee, "examFee")?,
                transport_fee: component(&self.transport_fee, "transportFee")?,
                library_fee: component(&self.library_fee, "libraryFee")?,
                other_fees: component(&self.other_fees, "otherFees")?,
            },
            total_amount,
            paid_amount: component(&self.paid_amount, "paidAmount")?,
            status: parse_status(&status)?,
            due_date: parse_optional_date(self.due_date.as_deref())?,
            description: non_blank(self.description),
        })
    }
}

#[derive(Debug, Deserialize, Validate, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFeeRequest {
    #[validate(length(min = 1, max = 100))]
    pub class_name: Option<String>,
    #[validate(length(max = 50))]
    pub academic_term: Option<String>,
    #[validate(length(max = 50))]
    pub academic_year: Option<String>,
    pub amount: Option<Value>,
    pub due_date: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub status: Option<String>,
    pub tuition_fee: Option<Value>,
    pub exam_fee: Option<Value>,
    pub transport_fee: Option<Value>,
    pub library_fee: Option<Value>,
    pub other_fees: Option<Value>,
}

impl UpdateFeeRequest {
    pub fn into_update(self) -> Result<FeeUpdate, AppError> {
        let total_amount = parse_optional_amount(self.amount.as_ref(), "amount")?;

        Ok(FeeUpdate {
            class_name: non_blank(self.class_name),
            academic_term: self.academic_term.map(|t| t.trim().to_string()),
            academic_year: self.academic_year.map(|y| y.trim().to_string()),
            total_amount,
            due_date: parse_optional_date(self.due_date.as_deref())?,
            description: non_blank(self.description),
            status: non_blank(self.status).map(|s| parse_status(&s)).transpose()?,
            tuition_fee: parse_optional_amount(self.tuition_fee.as_ref(), "tuitionFee")?,
            exam_fee: parse_optional_amount(self.exam_fee.as_ref(), "examFee")?,
            transport_fee: parse_optional_amount(self.transport_fee.as_ref(), "transportFee")?,
            library_fee: parse_optional_amount(self.library_fee.as_ref(), "libraryFee")?,
            other_fees: parse_optional_amount(self.other_fees.as_ref(), "otherFees")?,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentRequest {
    pub amount: Option<Value>,
    #[validate(length(max = 50))]
    pub payment_method: Option<String>,
    #[validate(length(max = 100))]
    pub reference: Option<String>,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
    pub payment_date: Option<String>,
}

impl RecordPaymentRequest {
    pub fn into_input(self) -> Result<PaymentInput, AppError> {
        let amount = parse_amount(self.amount.as_ref())
            .map_err(|_| AppError::bad_request("Please provide a valid payment amount"))?;
        if amount <= Decimal::ZERO {
            return Err(AppError::bad_request("Please provide a valid payment amount"));
        }

        Ok(PaymentInput {
            amount,
            payment_method: non_blank(self.payment_method),
            reference: non_blank(self.reference),
            notes: non_blank(self.notes),
            payment_date: parse_optional_date(self.payment_date.as_deref())?,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub payment_date: String,
    pub payment_method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub recorded_by: Option<String>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            amount: p.amount,
            payment_date: to_rfc3339(p.payment_date),
            payment_method: p.payment_method,
            reference: p.reference,
            notes: p.notes,
            recorded_by: p.recorded_by,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeResponse {
    #[serde(rename = "_id")]
    pub id: String,
    /// Populated student, `null` when the reference dangles.
    pub student: Option<StudentResponse>,
    pub student_id: String,
    pub display_name: String,
    pub class_name: String,
    pub academic_term: String,
    pub academic_year: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub tuition_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub exam_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub transport_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub library_fee: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub other_fees: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub paid_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    pub status: FeeStatus,
    pub due_date: Option<String>,
    pub description: Option<String>,
    pub payments: Vec<PaymentResponse>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<PopulatedFee> for FeeResponse {
    fn from(populated: PopulatedFee) -> Self {
        let PopulatedFee { fee, student } = populated;
        let display_name = student
            .as_ref()
            .map(|s| s.display_name())
            .unwrap_or_else(|| UNKNOWN_STUDENT.to_string());

        Self {
            id: fee.id,
            student: student.map(StudentResponse::from),
            student_id: fee.student,
            display_name,
            class_name: fee.class_name,
            academic_term: fee.academic_term,
            academic_year: fee.academic_year,
            tuition_fee: fee.breakdown.tuition_fee,
            exam_fee: fee.breakdown.exam_fee,
            transport_fee: fee.breakdown.transport_fee,
            library_fee: fee.breakdown.library_fee,
            other_fees: fee.breakdown.other_fees,
            total_amount: fee.total_amount,
            paid_amount: fee.paid_amount,
            balance: fee.balance,
            status: fee.status,
            due_date: fee.due_date.map(to_rfc3339),
            description: fee.description,
            payments: fee.payments.into_iter().map(PaymentResponse::from).collect(),
            created_at: to_rfc3339(fee.created_at),
            updated_at: to_rfc3339(fee.updated_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeeSavedResponse {
    pub success: bool,
    pub msg: String,
    pub fee: FeeResponse,
}

#[derive(Debug, Serialize)]
pub struct PaymentRecordedResponse {
    pub success: bool,
    pub message: String,
    pub fee: FeeResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub msg: String,
}
