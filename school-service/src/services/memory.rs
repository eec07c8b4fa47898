//! Process-local stores for tests and database-less local runs.

use async_trait::async_trait;
use service_core::error::AppError;
use tokio::sync::Mutex;

use crate::models::{Fee, Student};
use crate::services::store::{FeeQuery, FeeStore, StudentStore};

#[derive(Default)]
pub struct InMemoryFeeStore {
    fees: Mutex<Vec<Fee>>,
}

impl InMemoryFeeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeeStore for InMemoryFeeStore {
    async fn insert(&self, fee: &Fee) -> Result<(), AppError> {
        let mut fees = self.fees.lock().await;
        if fees.iter().any(|f| f.id == fee.id) {
            return Err(AppError::Conflict(anyhow::anyhow!("Duplicate fee id")));
        }
        fees.push(fee.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Fee>, AppError> {
        Ok(self.fees.lock().await.iter().find(|f| f.id == id).cloned())
    }

    async fn list(&self, query: &FeeQuery) -> Result<Vec<Fee>, AppError> {
        let fees = self.fees.lock().await;
        // Reverse insertion order first so equal timestamps still list newest first.
        let mut matched: Vec<Fee> = fees
            .iter()
            .rev()
            .filter(|f| query.matches(f))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn replace_if_version(
        &self,
        fee: &Fee,
        expected_version: i64,
    ) -> Result<bool, AppError> {
        let mut fees = self.fees.lock().await;
        match fees.iter_mut().find(|f| f.id == fee.id) {
            Some(stored) if stored.version == expected_version => {
                *stored = fee.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let mut fees = self.fees.lock().await;
        let before = fees.len();
        fees.retain(|f| f.id != id);
        Ok(fees.len() != before)
    }
}

#[derive(Default)]
pub struct InMemoryStudentStore {
    students: Mutex<Vec<Student>>,
}

impl InMemoryStudentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StudentStore for InMemoryStudentStore {
    async fn insert(&self, student: &Student) -> Result<(), AppError> {
        let mut students = self.students.lock().await;
        if let Some(adm) = &student.admission_number {
            if students
                .iter()
                .any(|s| s.admission_number.as_deref() == Some(adm.as_str()))
            {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Admission number already in use"
                )));
            }
        }
        students.push(student.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Student>, AppError> {
        Ok(self
            .students
            .lock()
            .await
            .iter()
            .find(|s| s.id == id)
            .cloned())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Student>, AppError> {
        Ok(self
            .students
            .lock()
            .await
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn list(&self, class_name: Option<&str>) -> Result<Vec<Student>, AppError> {
        let students = self.students.lock().await;
        let mut matched: Vec<Student> = students
            .iter()
            .filter(|s| match class_name {
                Some(class_name) => s
                    .class_name
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(class_name.trim())),
                None => true,
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            (a.last_name.as_str(), a.first_name.as_str())
                .cmp(&(b.last_name.as_str(), b.first_name.as_str()))
        });
        Ok(matched)
    }

    async fn search_ids(&self, term: &str) -> Result<Vec<String>, AppError> {
        let needle = term.trim().to_lowercase();
        Ok(self
            .students
            .lock()
            .await
            .iter()
            .filter(|s| {
                s.first_name.to_lowercase().contains(&needle)
                    || s.last_name.to_lowercase().contains(&needle)
                    || s
                        .admission_number
                        .as_deref()
                        .is_some_and(|a| a.to_lowercase().contains(&needle))
            })
            .map(|s| s.id.clone())
            .collect())
    }
}
