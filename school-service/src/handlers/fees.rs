//! Fee ledger endpoints under `/api/fees`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::{
        CreateFeeRequest, FeeListParams, FeeResponse, FeeSavedResponse, MessageResponse,
        PaymentRecordedResponse, RecordPaymentRequest, UpdateFeeRequest,
    },
    middleware::{AdminUser, AuthUser},
    services::FeeSummary,
    utils::ValidatedJson,
    AppState,
};

/// List fees, optionally filtered by status, class and a search term.
pub async fn list_fees(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<FeeListParams>,
) -> Result<Json<Vec<FeeResponse>>, AppError> {
    user.require_staff()?;
    let filter = params.into_filter()?;

    tracing::info!(
        user_id = %user.id(),
        status = ?filter.status,
        class_name = ?filter.class_name,
        search = ?filter.search,
        "Listing fees"
    );

    let fees = state.ledger.list(&filter).await?;
    Ok(Json(fees.into_iter().map(FeeResponse::from).collect()))
}

pub async fn get_fee(
    State(state): State<AppState>,
    user: AuthUser,
    Path(fee_id): Path<String>,
) -> Result<Json<FeeResponse>, AppError> {
    user.require_staff()?;
    let fee = state.ledger.get(&fee_id).await?;
    Ok(Json(FeeResponse::from(fee)))
}

pub async fn list_student_fees(
    State(state): State<AppState>,
    user: AuthUser,
    Path(student_id): Path<String>,
) -> Result<Json<Vec<FeeResponse>>, AppError> {
    user.require_student_access(&student_id)?;
    let fees = state.ledger.list_for_student(&student_id).await?;
    Ok(Json(fees.into_iter().map(FeeResponse::from).collect()))
}

pub async fn fee_summary(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<FeeSummary>, AppError> {
    Ok(Json(state.ledger.summary().await?))
}

pub async fn create_fee(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidatedJson(payload): ValidatedJson<CreateFeeRequest>,
) -> Result<(StatusCode, Json<FeeSavedResponse>), AppError> {
    let new_fee = payload.into_new_fee()?;
    let fee = state.ledger.create(new_fee).await?;

    Ok((
        StatusCode::CREATED,
        Json(FeeSavedResponse {
            success: true,
            msg: "Fee record created successfully".to_string(),
            fee: FeeResponse::from(fee),
        }),
    ))
}

pub async fn update_fee(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(fee_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<UpdateFeeRequest>,
) -> Result<Json<FeeSavedResponse>, AppError> {
    let update = payload.into_update()?;
    let fee = state.ledger.update(&fee_id, update).await?;

    Ok(Json(FeeSavedResponse {
        success: true,
        msg: "Fee record updated successfully".to_string(),
        fee: FeeResponse::from(fee),
    }))
}

/// Append a payment to a fee's history.
pub async fn record_payment(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(fee_id): Path<String>,
    ValidatedJson(payload): ValidatedJson<RecordPaymentRequest>,
) -> Result<Json<PaymentRecordedResponse>, AppError> {
    let input = payload.into_input()?;
    let fee = state
        .ledger
        .record_payment(&fee_id, input, Some(admin.id().to_string()))
        .await?;

    Ok(Json(PaymentRecordedResponse {
        success: true,
        message: "Payment recorded successfully".to_string(),
        fee: FeeResponse::from(fee),
    }))
}

pub async fn delete_fee(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(fee_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state.ledger.delete(&fee_id).await?;
    Ok(Json(MessageResponse {
        msg: "Fee record deleted".to_string(),
    }))
}
