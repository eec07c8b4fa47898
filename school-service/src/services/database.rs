use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    error::{ErrorKind, WriteFailure},
    options::{FindOptions, IndexOptions},
    Client as MongoClient, Collection, Database, IndexModel,
};
use secrecy::{ExposeSecret, Secret};
use service_core::error::AppError;

use crate::models::{Fee, Student};
use crate::services::store::{FeeQuery, FeeStore, StudentStore};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoDb {
    client: MongoClient,
    db: Database,
}

impl MongoDb {
    pub async fn connect(uri: &Secret<String>, database: &str) -> Result<Self, AppError> {
        tracing::info!(database = %database, "Connecting to MongoDB");
        let mut options = mongodb::options::ClientOptions::parse(uri.expose_secret())
            .await
            .map_err(|e| {
                tracing::error!("Failed to parse MongoDB connection string: {}", e);
                AppError::from(e)
            })?;
        options.app_name = Some("school-service".to_string());

        let client = MongoClient::with_options(options).map_err(|e| {
            tracing::error!("Failed to create MongoDB client: {}", e);
            AppError::from(e)
        })?;
        let db = client.database(database);
        tracing::info!(database = %database, "Successfully connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub async fn initialize_indexes(&self) -> Result<(), AppError> {
        tracing::info!("Creating MongoDB indexes for school-service");

        let fee_indexes = [
            IndexModel::builder()
                .keys(doc! { "student": 1 })
                .options(
                    IndexOptions::builder()
                        .name("fee_student_lookup".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "className": 1 })
                .options(
                    IndexOptions::builder()
                        .name("fee_class_lookup".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "createdAt": -1 })
                .options(
                    IndexOptions::builder()
                        .name("fee_recent_first".to_string())
                        .build(),
                )
                .build(),
        ];

        self.fees()
            .create_indexes(fee_indexes, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create indexes on fees collection: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created indexes on fees.(student), fees.(className), fees.(createdAt)");

        let student_indexes = [
            IndexModel::builder()
                .keys(doc! { "className": 1 })
                .options(
                    IndexOptions::builder()
                        .name("student_class_lookup".to_string())
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "admissionNumber": 1 })
                .options(
                    IndexOptions::builder()
                        .name("student_admission_number_unique".to_string())
                        .unique(true)
                        .sparse(true)
                        .build(),
                )
                .build(),
        ];

        self.students()
            .create_indexes(student_indexes, None)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create indexes on students collection: {}", e);
                AppError::from(e)
            })?;
        tracing::info!("Created indexes on students.(className), students.(admissionNumber)");

        Ok(())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| {
                tracing::error!("MongoDB health check failed: {}", e);
                AppError::from(e)
            })?;
        Ok(())
    }

    pub fn fees(&self) -> Collection<Fee> {
        self.db.collection("fees")
    }

    pub fn students(&self) -> Collection<Student> {
        self.db.collection("students")
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

/// Case-insensitive regex operand with metacharacters escaped.
fn contains_ci(term: &str) -> Document {
    doc! { "$regex": regex::escape(term.trim()), "$options": "i" }
}

fn equals_ci(term: &str) -> Document {
    doc! { "$regex": format!("^{}$", regex::escape(term.trim())), "$options": "i" }
}

fn fee_filter(query: &FeeQuery) -> Document {
    let mut filter = doc! {};
    if let Some(class_name) = &query.class_name {
        filter.insert("className", equals_ci(class_name));
    }
    if let Some(student) = &query.student {
        filter.insert("student", student.as_str());
    }
    if let Some(search) = &query.search {
        let mut any_of = vec![
            doc! { "className": contains_ci(&search.term) },
            doc! { "academicTerm": contains_ci(&search.term) },
            doc! { "academicYear": contains_ci(&search.term) },
        ];
        if !search.student_ids.is_empty() {
            any_of.push(doc! { "student": { "$in": search.student_ids.clone() } });
        }
        filter.insert("$or", any_of);
    }
    filter
}

/// Documents written before versioning have no `version` field; `null`
/// matches both explicit nulls and missing fields.
fn version_guard(expected_version: i64) -> Bson {
    if expected_version == 0 {
        Bson::Document(doc! { "$in": [0_i64, Bson::Null] })
    } else {
        Bson::Int64(expected_version)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

#[derive(Clone)]
pub struct MongoFeeStore {
    db: MongoDb,
}

impl MongoFeeStore {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FeeStore for MongoFeeStore {
    async fn insert(&self, fee: &Fee) -> Result<(), AppError> {
        self.db.fees().insert_one(fee, None).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Fee>, AppError> {
        Ok(self.db.fees().find_one(doc! { "_id": id }, None).await?)
    }

    async fn list(&self, query: &FeeQuery) -> Result<Vec<Fee>, AppError> {
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .build();
        let cursor = self.db.fees().find(fee_filter(query), options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn replace_if_version(
        &self,
        fee: &Fee,
        expected_version: i64,
    ) -> Result<bool, AppError> {
        let filter = doc! {
            "_id": fee.id.as_str(),
            "version": version_guard(expected_version),
        };
        let result = self.db.fees().replace_one(filter, fee, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn delete(&self, id: &str) -> Result<bool, AppError> {
        let result = self.db.fees().delete_one(doc! { "_id": id }, None).await?;
        Ok(result.deleted_count == 1)
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.db.health_check().await
    }
}

#[derive(Clone)]
pub struct MongoStudentStore {
    db: MongoDb,
}

impl MongoStudentStore {
    pub fn new(db: MongoDb) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StudentStore for MongoStudentStore {
    async fn insert(&self, student: &Student) -> Result<(), AppError> {
        self.db
            .students()
            .insert_one(student, None)
            .await
            .map_err(|e| {
                if is_duplicate_key(&e) {
                    AppError::Conflict(anyhow::anyhow!("Admission number already in use"))
                } else {
                    AppError::from(e)
                }
            })?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Student>, AppError> {
        Ok(self.db.students().find_one(doc! { "_id": id }, None).await?)
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Student>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cursor = self
            .db
            .students()
            .find(doc! { "_id": { "$in": ids.to_vec() } }, None)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn list(&self, class_name: Option<&str>) -> Result<Vec<Student>, AppError> {
        let filter = match class_name {
            Some(class_name) => doc! { "className": equals_ci(class_name) },
            None => doc! {},
        };
        let options = FindOptions::builder()
            .sort(doc! { "lastName": 1, "firstName": 1 })
            .build();
        let cursor = self.db.students().find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn search_ids(&self, term: &str) -> Result<Vec<String>, AppError> {
        let filter = doc! {
            "$or": [
                { "firstName": contains_ci(term) },
                { "lastName": contains_ci(term) },
                { "admissionNumber": contains_ci(term) },
            ]
        };
        let options = FindOptions::builder()
            .projection(doc! { "_id": 1 })
            .build();
        let cursor = self
            .db
            .database()
            .collection::<Document>("students")
            .find(filter, options)
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        Ok(docs
            .iter()
            .filter_map(|d| d.get_str("_id").ok().map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::SearchTerm;

    #[test]
    fn search_filter_escapes_regex_metacharacters() {
        let filter = fee_filter(&FeeQuery {
            search: Some(SearchTerm {
                term: "a+b".to_string(),
                student_ids: vec![],
            }),
            ..FeeQuery::default()
        });
        let any_of = filter.get_array("$or").unwrap();
        assert_eq!(any_of.len(), 3);
        let class_clause = any_of[0].as_document().unwrap();
        let regex = class_clause.get_document("className").unwrap();
        assert_eq!(regex.get_str("$regex").unwrap(), r"a\+b");
    }

    #[test]
    fn search_filter_includes_matched_students() {
        let filter = fee_filter(&FeeQuery {
            search: Some(SearchTerm {
                term: "ada".to_string(),
                student_ids: vec!["s1".to_string()],
            }),
            ..FeeQuery::default()
        });
        assert_eq!(filter.get_array("$or").unwrap().len(), 4);
    }

    #[test]
    fn first_write_tolerates_missing_version() {
        assert!(matches!(version_guard(0), Bson::Document(_)));
        assert_eq!(version_guard(3), Bson::Int64(3));
    }
}
