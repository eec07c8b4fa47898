use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    #[serde(rename = "_id")]
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admission_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub created_at: DateTime,
}

impl Student {
    pub fn new(
        first_name: String,
        last_name: String,
        admission_number: Option<String>,
        class_name: Option<String>,
        email: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            first_name,
            last_name,
            admission_number,
            class_name,
            email,
            created_at: DateTime::now(),
        }
    }

    /// Human-readable label: full name, else admission number.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
        let full = full.trim();
        if !full.is_empty() {
            return full.to_string();
        }
        match self.admission_number.as_deref().map(str::trim) {
            Some(adm) if !adm.is_empty() => adm.to_string(),
            _ => UNKNOWN_STUDENT.to_string(),
        }
    }
}

pub const UNKNOWN_STUDENT: &str = "Unknown student";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_full_name() {
        let s = Student::new("Ada".into(), "Lovelace".into(), Some("A-1".into()), None, None);
        assert_eq!(s.display_name(), "Ada Lovelace");

        let s = Student::new("Ada".into(), " ".into(), None, None, None);
        assert_eq!(s.display_name(), "Ada");
    }

    #[test]
    fn display_name_falls_back_to_admission_number() {
        let s = Student::new("".into(), "".into(), Some("ADM-7".into()), None, None);
        assert_eq!(s.display_name(), "ADM-7");

        let s = Student::new("".into(), "".into(), None, None, None);
        assert_eq!(s.display_name(), UNKNOWN_STUDENT);
    }
}
