use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Student;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(length(min = 1, max = 50))]
    pub admission_number: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub class_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

impl CreateStudentRequest {
    pub fn into_student(self) -> Student {
        let trimmed = |v: Option<String>| {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        };
        Student::new(
            self.first_name.trim().to_string(),
            self.last_name.trim().to_string(),
            trimmed(self.admission_number),
            trimmed(self.class_name),
            trimmed(self.email),
        )
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct StudentListParams {
    pub class: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentResponse {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub display_name: String,
    pub admission_number: Option<String>,
    pub class_name: Option<String>,
    pub email: Option<String>,
    pub created_at: String,
}

impl From<Student> for StudentResponse {
    fn from(s: Student) -> Self {
        Self {
            display_name: s.display_name(),
            id: s.id,
            first_name: s.first_name,
            last_name: s.last_name,
            admission_number: s.admission_number,
            class_name: s.class_name,
            email: s.email,
            created_at: s.created_at.to_chrono().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StudentSavedResponse {
    pub success: bool,
    pub msg: String,
    pub student: StudentResponse,
}
