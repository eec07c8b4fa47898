//! Fee ledger: creation, payment posting and derived-state upkeep.
//!
//! Every write goes through [`FeeLedger::mutate`], a read / modify /
//! compare-and-swap loop keyed on `Fee::version`, so concurrent payment
//! postings against the same fee never overwrite each other.

use metrics::{counter, histogram};
use mongodb::bson::DateTime;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::models::{Fee, FeeBreakdown, FeeStatus, Payment, Student};
use crate::services::store::{FeeQuery, FeeStore, SearchTerm, StudentStore};

/// Attempts before a contended write gives up with 409.
pub const MAX_WRITE_ATTEMPTS: usize = 5;

pub const PAYMENT_CONFLICTS: &str = "fee_payment_conflicts_total";
pub const UPDATE_CONFLICTS: &str = "fee_update_conflicts_total";

/// A fee together with its referenced student, if that student still exists.
#[derive(Debug, Clone)]
pub struct PopulatedFee {
    pub fee: Fee,
    pub student: Option<Student>,
}

#[derive(Debug, Clone, Default)]
pub struct FeeListFilter {
    pub status: Option<FeeStatus>,
    pub class_name: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewFee {
    pub student: String,
    pub class_name: String,
    pub academic_term: String,
    pub academic_year: String,
    pub breakdown: FeeBreakdown,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub status: FeeStatus,
    pub due_date: Option<DateTime>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FeeUpdate {
    pub class_name: Option<String>,
    pub academic_term: Option<String>,
    pub academic_year: Option<String>,
    pub total_amount: Option<Decimal>,
    pub due_date: Option<DateTime>,
    pub description: Option<String>,
    pub status: Option<FeeStatus>,
    pub tuition_fee: Option<Decimal>,
    pub exam_fee: Option<Decimal>,
    pub transport_fee: Option<Decimal>,
    pub library_fee: Option<Decimal>,
    pub other_fees: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct PaymentInput {
    pub amount: Decimal,
    pub payment_method: Option<String>,
    pub reference: Option<String>,
    pub notes: Option<String>,
    pub payment_date: Option<DateTime>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeSummary {
    pub total_fees: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_paid: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_balance: Decimal,
    pub by_status: BTreeMap<String, usize>,
}

#[derive(Clone)]
pub struct FeeLedger {
    fees: Arc<dyn FeeStore>,
    students: Arc<dyn StudentStore>,
}

impl FeeLedger {
    pub fn new(fees: Arc<dyn FeeStore>, students: Arc<dyn StudentStore>) -> Self {
        Self { fees, students }
    }

    pub fn fee_store(&self) -> &Arc<dyn FeeStore> {
        &self.fees
    }

    pub async fn list(&self, filter: &FeeListFilter) -> Result<Vec<PopulatedFee>, AppError> {
        let search = match filter.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => Some(SearchTerm {
                term: term.to_string(),
                student_ids: self.students.search_ids(term).await?,
            }),
            _ => None,
        };

        let query = FeeQuery {
            class_name: filter
                .class_name
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            student: None,
            search,
        };

        let mut fees = self.refreshed(self.fees.list(&query).await?);
        if let Some(status) = filter.status {
            fees.retain(|f| f.status == status);
        }
        self.populate(fees).await
    }

    pub async fn list_for_student(&self, student_id: &str) -> Result<Vec<PopulatedFee>, AppError> {
        let fees = self
            .refreshed(self.fees.list(&FeeQuery::for_student(student_id)).await?);
        self.populate(fees).await
    }

    pub async fn get(&self, id: &str) -> Result<PopulatedFee, AppError> {
        let fee = self.find(id).await?;
        self.populate_one(self.refreshed_one(fee)).await
    }

    pub async fn summary(&self) -> Result<FeeSummary, AppError> {
        let fees = self.refreshed(self.fees.list(&FeeQuery::default()).await?);

        let mut by_status: BTreeMap<String, usize> = FeeStatus::ALL
            .iter()
            .map(|s| (s.to_string(), 0))
            .collect();
        let mut summary = FeeSummary {
            total_fees: fees.len(),
            total_amount: Decimal::ZERO,
            total_paid: Decimal::ZERO,
            total_balance: Decimal::ZERO,
            by_status: BTreeMap::new(),
        };

        for fee in &fees {
            *by_status.entry(fee.status.to_string()).or_default() += 1;
            if fee.is_cancelled() {
                continue;
            }
            summary.total_amount = summary.total_amount.saturating_add(fee.total_amount);
            summary.total_paid = summary.total_paid.saturating_add(fee.paid_amount);
            summary.total_balance = summary.total_balance.saturating_add(fee.balance);
        }
        summary.by_status = by_status;

        Ok(summary)
    }

    pub async fn create(&self, input: NewFee) -> Result<PopulatedFee, AppError> {
        let student = self
            .students
            .get(&input.student)
            .await?
            .ok_or_else(|| AppError::bad_request("Student not found"))?;

        let fee = Fee::new(
            input.student,
            input.class_name,
            input.academic_term,
            input.academic_year,
            input.breakdown,
            input.total_amount,
            input.paid_amount,
            input.status,
            input.due_date,
            input.description,
        );

        self.fees.insert(&fee).await?;
        counter!("fees_created_total").increment(1);
        tracing::info!(
            fee_id = %fee.id,
            student_id = %fee.student,
            total_amount = %fee.total_amount,
            status = %fee.status,
            "Fee record created"
        );

        Ok(PopulatedFee {
            fee,
            student: Some(student),
        })
    }

    pub async fn update(&self, id: &str, update: FeeUpdate) -> Result<PopulatedFee, AppError> {
        let fee = self
            .mutate(id, UPDATE_CONFLICTS, |fee, now| {
                if let Some(class_name) = &update.class_name {
                    fee.class_name = class_name.clone();
                }
                if let Some(term) = &update.academic_term {
                    fee.academic_term = term.clone();
                }
                if let Some(year) = &update.academic_year {
                    fee.academic_year = year.clone();
                }
                if let Some(total) = update.total_amount {
                    fee.total_amount = total;
                }
                if update.due_date.is_some() {
                    fee.due_date = update.due_date;
                }
                if update.description.is_some() {
                    fee.description = update.description.clone();
                }
                let breakdown = &mut fee.breakdown;
                for (slot, value) in [
                    (&mut breakdown.tuition_fee, update.tuition_fee),
                    (&mut breakdown.exam_fee, update.exam_fee),
                    (&mut breakdown.transport_fee, update.transport_fee),
                    (&mut breakdown.library_fee, update.library_fee),
                    (&mut breakdown.other_fees, update.other_fees),
                ] {
                    if let Some(value) = value {
                        *slot = value;
                    }
                }
                match update.status {
                    Some(FeeStatus::Cancelled) => fee.status = FeeStatus::Cancelled,
                    // Any other requested status re-opens a cancelled fee;
                    // the actual value is derived.
                    Some(_) if fee.is_cancelled() => fee.status = FeeStatus::Pending,
                    _ => {}
                }
                fee.touch(now);
                Ok(())
            })
            .await?;

        tracing::info!(fee_id = %fee.id, status = %fee.status, "Fee record updated");
        self.populate_one(fee).await
    }

    pub async fn record_payment(
        &self,
        id: &str,
        input: PaymentInput,
        recorded_by: Option<String>,
    ) -> Result<PopulatedFee, AppError> {
        if input.amount <= Decimal::ZERO {
            return Err(AppError::bad_request(
                "Payment amount must be a positive number",
            ));
        }

        let fee = self
            .mutate(id, PAYMENT_CONFLICTS, |fee, now| {
                if fee.is_cancelled() {
                    return Err(AppError::bad_request(
                        "Cannot record a payment against a cancelled fee",
                    ));
                }
                let mut payment =
                    Payment::new(input.amount, input.payment_method.clone(), recorded_by.clone());
                payment.reference = input.reference.clone();
                payment.notes = input.notes.clone();
                if let Some(date) = input.payment_date {
                    payment.payment_date = date;
                }
                fee.apply_payment(payment, now)
            })
            .await?;

        counter!("fee_payments_total").increment(1);
        histogram!("fee_payment_amount").record(input.amount.to_f64().unwrap_or_default());
        tracing::info!(
            fee_id = %fee.id,
            amount = %input.amount,
            paid_amount = %fee.paid_amount,
            balance = %fee.balance,
            status = %fee.status,
            "Payment recorded"
        );

        self.populate_one(fee).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), AppError> {
        if !self.fees.delete(id).await? {
            return Err(AppError::not_found("Fee record not found"));
        }
        counter!("fees_deleted_total").increment(1);
        tracing::info!(fee_id = %id, "Fee record deleted");
        Ok(())
    }

    async fn find(&self, id: &str) -> Result<Fee, AppError> {
        self.fees
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Fee record not found"))
    }

    /// Read, apply `change`, and write back only if nobody else wrote in
    /// between. `change` must call `Fee::touch` so the version advances.
    /// Each lost race increments the `conflict_metric` counter.
    async fn mutate<F>(
        &self,
        id: &str,
        conflict_metric: &'static str,
        mut change: F,
    ) -> Result<Fee, AppError>
    where
        F: FnMut(&mut Fee, DateTime) -> Result<(), AppError> + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let mut fee = self.find(id).await?;
            let expected_version = fee.version;

            change(&mut fee, DateTime::now())?;

            if self.fees.replace_if_version(&fee, expected_version).await? {
                return Ok(fee);
            }

            counter!(conflict_metric).increment(1);
            tracing::warn!(fee_id = %id, attempt, "Concurrent fee update detected, retrying");
            tokio::task::yield_now().await;
        }

        Err(AppError::Conflict(anyhow::anyhow!(
            "Fee record is being modified concurrently, please retry"
        )))
    }

    fn refreshed_one(&self, mut fee: Fee) -> Fee {
        fee.recompute(DateTime::now());
        fee
    }

    /// Derived fields can go stale while a fee sits untouched (a due date
    /// passes), so they are recomputed on the way out as well.
    fn refreshed(&self, fees: Vec<Fee>) -> Vec<Fee> {
        let now = DateTime::now();
        fees.into_iter()
            .map(|mut fee| {
                fee.recompute(now);
                fee
            })
            .collect()
    }

    async fn populate_one(&self, fee: Fee) -> Result<PopulatedFee, AppError> {
        let student = self.students.get(&fee.student).await?;
        Ok(PopulatedFee { fee, student })
    }

    async fn populate(&self, fees: Vec<Fee>) -> Result<Vec<PopulatedFee>, AppError> {
        let mut ids: Vec<String> = fees.iter().map(|f| f.student.clone()).collect();
        ids.sort();
        ids.dedup();

        let students: HashMap<String, Student> = self
            .students
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();

        Ok(fees
            .into_iter()
            .map(|fee| {
                let student = students.get(&fee.student).cloned();
                PopulatedFee { fee, student }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{InMemoryFeeStore, InMemoryStudentStore};
    use async_trait::async_trait;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dec(raw: &str) -> Decimal {
        raw.parse().unwrap()
    }

    /// Loses the first `conflicts` compare-and-swap attempts.
    struct ContendedFeeStore {
        inner: InMemoryFeeStore,
        conflicts: AtomicUsize,
    }

    #[async_trait]
    impl FeeStore for ContendedFeeStore {
        async fn insert(&self, fee: &Fee) -> Result<(), AppError> {
            self.inner.insert(fee).await
        }

        async fn get(&self, id: &str) -> Result<Option<Fee>, AppError> {
            self.inner.get(id).await
        }

        async fn list(&self, query: &FeeQuery) -> Result<Vec<Fee>, AppError> {
            self.inner.list(query).await
        }

        async fn replace_if_version(
            &self,
            fee: &Fee,
            expected_version: i64,
        ) -> Result<bool, AppError> {
            let lose = self
                .conflicts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if lose {
                return Ok(false);
            }
            self.inner.replace_if_version(fee, expected_version).await
        }

        async fn delete(&self, id: &str) -> Result<bool, AppError> {
            self.inner.delete(id).await
        }
    }

    async fn ledger_with_student() -> (FeeLedger, Student) {
        let students = Arc::new(InMemoryStudentStore::new());
        let student = Student::new(
            "Grace".into(),
            "Hopper".into(),
            Some("ADM-100".into()),
            Some("Grade 6".into()),
            None,
        );
        students.insert(&student).await.unwrap();
        let ledger = FeeLedger::new(Arc::new(InMemoryFeeStore::new()), students);
        (ledger, student)
    }

    fn new_fee(student: &Student, total: &str) -> NewFee {
        NewFee {
            student: student.id.clone(),
            class_name: "Grade 6".into(),
            academic_term: "Term 1".into(),
            academic_year: "2024/2025".into(),
            breakdown: FeeBreakdown::default(),
            total_amount: dec(total),
            paid_amount: Decimal::ZERO,
            status: FeeStatus::Pending,
            due_date: None,
            description: None,
        }
    }

    fn payment(amount: &str) -> PaymentInput {
        PaymentInput {
            amount: dec(amount),
            payment_method: None,
            reference: None,
            notes: None,
            payment_date: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_student() {
        let (ledger, student) = ledger_with_student().await;
        let mut input = new_fee(&student, "100");
        input.student = "missing".into();
        assert!(matches!(
            ledger.create(input).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn payments_settle_the_fee() {
        let (ledger, student) = ledger_with_student().await;
        let created = ledger.create(new_fee(&student, "1000")).await.unwrap();
        let id = created.fee.id.clone();

        let after_first = ledger
            .record_payment(&id, payment("400"), Some("admin".into()))
            .await
            .unwrap();
        assert_eq!(after_first.fee.paid_amount, dec("400"));
        assert_eq!(after_first.fee.balance, dec("600"));
        assert_eq!(after_first.fee.status, FeeStatus::PartiallyPaid);

        let after_second = ledger.record_payment(&id, payment("600"), None).await.unwrap();
        assert_eq!(after_second.fee.paid_amount, dec("1000"));
        assert_eq!(after_second.fee.balance, Decimal::ZERO);
        assert_eq!(after_second.fee.status, FeeStatus::Paid);
        assert_eq!(after_second.fee.payments.len(), 2);
        assert_eq!(
            after_second.fee.payments[0].recorded_by.as_deref(),
            Some("admin")
        );
    }

    #[tokio::test]
    async fn non_positive_payments_leave_the_fee_untouched() {
        let (ledger, student) = ledger_with_student().await;
        let id = ledger.create(new_fee(&student, "1000")).await.unwrap().fee.id;

        for amount in ["0", "-5"] {
            assert!(matches!(
                ledger.record_payment(&id, payment(amount), None).await,
                Err(AppError::BadRequest(_))
            ));
        }

        let fee = ledger.get(&id).await.unwrap().fee;
        assert_eq!(fee.paid_amount, Decimal::ZERO);
        assert!(fee.payments.is_empty());
        assert_eq!(fee.version, 0);
    }

    #[tokio::test]
    async fn cancelled_fees_refuse_payments_until_reopened() {
        let (ledger, student) = ledger_with_student().await;
        let id = ledger.create(new_fee(&student, "300")).await.unwrap().fee.id;

        let cancelled = ledger
            .update(
                &id,
                FeeUpdate {
                    status: Some(FeeStatus::Cancelled),
                    ..FeeUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(cancelled.fee.status, FeeStatus::Cancelled);
        assert!(matches!(
            ledger.record_payment(&id, payment("10"), None).await,
            Err(AppError::BadRequest(_))
        ));

        let reopened = ledger
            .update(
                &id,
                FeeUpdate {
                    status: Some(FeeStatus::Paid),
                    ..FeeUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reopened.fee.status, FeeStatus::Pending);
    }

    #[tokio::test]
    async fn concurrent_payments_are_not_lost() {
        let (ledger, student) = ledger_with_student().await;
        let id = ledger.create(new_fee(&student, "1000")).await.unwrap().fee.id;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let ledger = ledger.clone();
                let id = id.clone();
                tokio::spawn(async move { ledger.record_payment(&id, payment("50"), None).await })
            })
            .collect();

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        // Each lost race means another posting won, so four writers always
        // finish within MAX_WRITE_ATTEMPTS.
        assert_eq!(succeeded, 4);
        let fee = ledger.get(&id).await.unwrap().fee;
        assert_eq!(fee.payments.len(), 4);
        assert_eq!(fee.paid_amount, dec("200"));
        assert_eq!(fee.balance, dec("800"));
        assert_eq!(fee.version, 4);
    }

    #[tokio::test]
    async fn summary_excludes_cancelled_amounts() {
        let (ledger, student) = ledger_with_student().await;
        let a = ledger.create(new_fee(&student, "1000")).await.unwrap().fee.id;
        let b = ledger.create(new_fee(&student, "500")).await.unwrap().fee.id;
        ledger.record_payment(&a, payment("250"), None).await.unwrap();
        ledger
            .update(
                &b,
                FeeUpdate {
                    status: Some(FeeStatus::Cancelled),
                    ..FeeUpdate::default()
                },
            )
            .await
            .unwrap();

        let summary = ledger.summary().await.unwrap();
        assert_eq!(summary.total_fees, 2);
        assert_eq!(summary.total_amount, dec("1000"));
        assert_eq!(summary.total_paid, dec("250"));
        assert_eq!(summary.total_balance, dec("750"));
        assert_eq!(summary.by_status["partially_paid"], 1);
        assert_eq!(summary.by_status["cancelled"], 1);
        assert_eq!(summary.by_status["paid"], 0);
    }

    #[tokio::test]
    async fn search_matches_student_names() {
        let (ledger, student) = ledger_with_student().await;
        ledger.create(new_fee(&student, "100")).await.unwrap();

        let hits = ledger
            .list(&FeeListFilter {
                search: Some("hopper".into()),
                ..FeeListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].student.as_ref().unwrap().id, student.id);

        let misses = ledger
            .list(&FeeListFilter {
                search: Some("lovelace".into()),
                ..FeeListFilter::default()
            })
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn fractional_payments_reach_paid() {
        let (ledger, student) = ledger_with_student().await;
        let id = ledger.create(new_fee(&student, "1.0")).await.unwrap().fee.id;

        for amount in ["0.7", "0.2", "0.1"] {
            ledger.record_payment(&id, payment(amount), None).await.unwrap();
        }

        let fee = ledger.get(&id).await.unwrap().fee;
        assert_eq!(fee.paid_amount, dec("1.0"));
        assert_eq!(fee.balance, Decimal::ZERO);
        assert_eq!(fee.status, FeeStatus::Paid);
    }

    #[tokio::test]
    async fn overflowing_payment_leaves_the_fee_untouched() {
        let (ledger, student) = ledger_with_student().await;
        let id = ledger.create(new_fee(&student, "1000")).await.unwrap().fee.id;
        ledger
            .record_payment(&id, PaymentInput { amount: Decimal::MAX, ..payment("1") }, None)
            .await
            .unwrap();

        assert!(matches!(
            ledger.record_payment(&id, payment("1"), None).await,
            Err(AppError::BadRequest(_))
        ));
        let fee = ledger.get(&id).await.unwrap().fee;
        assert_eq!(fee.paid_amount, Decimal::MAX);
        assert_eq!(fee.payments.len(), 1);
    }

    #[test]
    fn write_conflicts_are_counted_per_operation() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            runtime.block_on(async {
                let students = Arc::new(InMemoryStudentStore::new());
                let student = Student::new("Ada".into(), "Lovelace".into(), None, None, None);
                students.insert(&student).await.unwrap();
                let ledger = FeeLedger::new(
                    Arc::new(ContendedFeeStore {
                        inner: InMemoryFeeStore::new(),
                        conflicts: AtomicUsize::new(1),
                    }),
                    students,
                );

                let id = ledger.create(new_fee(&student, "100")).await.unwrap().fee.id;
                let updated = ledger
                    .update(
                        &id,
                        FeeUpdate {
                            description: Some("Adjusted".into()),
                            ..FeeUpdate::default()
                        },
                    )
                    .await
                    .unwrap();
                assert_eq!(updated.fee.description.as_deref(), Some("Adjusted"));
            });
        });

        let rendered = handle.render();
        assert!(rendered.contains(&format!("{} 1", UPDATE_CONFLICTS)));
        assert!(!rendered.contains(PAYMENT_CONFLICTS));
    }
}
