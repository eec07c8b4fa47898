use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{CreateStudentRequest, StudentListParams, StudentResponse, StudentSavedResponse},
    middleware::{AdminUser, AuthUser},
    utils::ValidatedJson,
    AppState,
};

pub async fn list_students(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<StudentListParams>,
) -> Result<Json<Vec<StudentResponse>>, AppError> {
    user.require_staff()?;
    let class_name = params.class.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let students = state.students.list(class_name).await?;
    Ok(Json(students.into_iter().map(StudentResponse::from).collect()))
}

pub async fn get_student(
    State(state): State<AppState>,
    user: AuthUser,
    Path(student_id): Path<String>,
) -> Result<Json<StudentResponse>, AppError> {
    user.require_student_access(&student_id)?;
    let student = state
        .students
        .get(&student_id)
        .await?
        .ok_or_else(|| AppError::not_found("Student not found"))?;
    Ok(Json(StudentResponse::from(student)))
}

pub async fn create_student(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidatedJson(payload): ValidatedJson<CreateStudentRequest>,
) -> Result<(StatusCode, Json<StudentSavedResponse>), AppError> {
    let student = payload.into_student();
    state.students.insert(&student).await?;

    tracing::info!(student_id = %student.id, class_name = ?student.class_name, "Student created");

    Ok((
        StatusCode::CREATED,
        Json(StudentSavedResponse {
            success: true,
            msg: "Student created successfully".to_string(),
            student: StudentResponse::from(student),
        }),
    ))
}
