//! Repository seams for the fee ledger.
//!
//! Handlers never talk to a driver directly; they go through these traits so
//! the MongoDB backend and the in-memory backend are interchangeable.

use async_trait::async_trait;
use service_core::error::AppError;

use crate::models::{Fee, Student};

/// Free-text search resolved against both fee fields and matching students.
#[derive(Debug, Clone, Default)]
pub struct SearchTerm {
    pub term: String,
    /// Ids of students whose name or admission number matched `term`.
    pub student_ids: Vec<String>,
}

/// Storage-level filter. Status filtering happens after derived fields are
/// refreshed, so it is not part of this query.
#[derive(Debug, Clone, Default)]
pub struct FeeQuery {
    pub class_name: Option<String>,
    pub student: Option<String>,
    pub search: Option<SearchTerm>,
}

impl FeeQuery {
    pub fn for_student(student_id: &str) -> Self {
        Self {
            student: Some(student_id.to_string()),
            ..Self::default()
        }
    }

    /// In-process evaluation, matching what the MongoDB filter expresses.
    pub fn matches(&self, fee: &Fee) -> bool {
        if let Some(class_name) = &self.class_name {
            if !fee.class_name.eq_ignore_ascii_case(class_name.trim()) {
                return false;
            }
        }
        if let Some(student) = &self.student {
            if &fee.student != student {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.term.to_lowercase();
            let hit = [&fee.class_name, &fee.academic_term, &fee.academic_year]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
                || search.student_ids.iter().any(|id| id == &fee.student);
            if !hit {
                return false;
            }
        }
        true
    }
}

#[async_trait]
pub trait FeeStore: Send + Sync {
    async fn insert(&self, fee: &Fee) -> Result<(), AppError>;

    async fn get(&self, id: &str) -> Result<Option<Fee>, AppError>;

    /// Matching fees, newest first.
    async fn list(&self, query: &FeeQuery) -> Result<Vec<Fee>, AppError>;

    /// Replace the stored fee only if its version is still `expected_version`.
    /// Returns `false` when another writer got there first (or the fee is gone).
    async fn replace_if_version(&self, fee: &Fee, expected_version: i64)
        -> Result<bool, AppError>;

    /// Returns `false` when nothing was deleted.
    async fn delete(&self, id: &str) -> Result<bool, AppError>;

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
pub trait StudentStore: Send + Sync {
    async fn insert(&self, student: &Student) -> Result<(), AppError>;

    async fn get(&self, id: &str) -> Result<Option<Student>, AppError>;

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Student>, AppError>;

    async fn list(&self, class_name: Option<&str>) -> Result<Vec<Student>, AppError>;

    /// Ids of students whose first name, last name or admission number
    /// contains `term` (case-insensitive).
    async fn search_ids(&self, term: &str) -> Result<Vec<String>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeeBreakdown, FeeStatus};
    use rust_decimal::Decimal;

    fn fee(student: &str, class_name: &str, term: &str) -> Fee {
        Fee::new(
            student.to_string(),
            class_name.to_string(),
            term.to_string(),
            "2024".to_string(),
            FeeBreakdown::default(),
            Decimal::ONE_HUNDRED,
            Decimal::ZERO,
            FeeStatus::Pending,
            None,
            None,
        )
    }

    #[test]
    fn class_filter_is_case_insensitive_and_exact() {
        let query = FeeQuery {
            class_name: Some("grade 5".to_string()),
            ..FeeQuery::default()
        };
        assert!(query.matches(&fee("s1", "Grade 5", "Term 1")));
        assert!(!query.matches(&fee("s1", "Grade 5B", "Term 1")));
    }

    #[test]
    fn search_hits_fee_fields_or_matched_students() {
        let query = FeeQuery {
            search: Some(SearchTerm {
                term: "term 2".to_string(),
                student_ids: vec!["s9".to_string()],
            }),
            ..FeeQuery::default()
        };
        assert!(query.matches(&fee("s1", "Grade 5", "Term 2")));
        assert!(query.matches(&fee("s9", "Grade 5", "Term 1")));
        assert!(!query.matches(&fee("s1", "Grade 5", "Term 1")));
    }

    #[test]
    fn student_filter_is_exact() {
        let query = FeeQuery::for_student("s1");
        assert!(query.matches(&fee("s1", "Grade 5", "Term 1")));
        assert!(!query.matches(&fee("s10", "Grade 5", "Term 1")));
    }
}
