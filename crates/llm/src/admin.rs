//! Service and model management endpoints.

use axum::{
    Json,
    extract::{Path, State},
};
use indexmap::IndexMap;

use crate::{
    inventory::{Inventory, ModelHealth, ServiceStatus},
    messages::{
        AddServiceRequest, DefaultModelResponse, RemoveServiceResponse, SetDefaultModelRequest, SetEnabledRequest,
        TestServiceRequest,
    },
    registry::{ServiceReport, TestReport},
    router::ChatRouter,
};

pub(crate) async fn list_models(State(chat): State<ChatRouter>) -> Json<Inventory> {
    Json(chat.registry().inventory().await)
}

pub(crate) async fn refresh_models(State(chat): State<ChatRouter>) -> Json<Inventory> {
    log::debug!("Refreshing model inventory");

    chat.registry().refresh().await;

    Json(chat.registry().inventory().await)
}

pub(crate) async fn model_health(State(chat): State<ChatRouter>, Path(model): Path<String>) -> Json<ModelHealth> {
    Json(chat.registry().model_health(&model).await)
}

pub(crate) async fn set_default_model(
    State(chat): State<ChatRouter>,
    Json(request): Json<SetDefaultModelRequest>,
) -> crate::Result<Json<DefaultModelResponse>> {
    chat.registry().set_default_model(&request.model).await?;

    Ok(Json(DefaultModelResponse {
        default_model: request.model,
    }))
}

pub(crate) async fn list_services(State(chat): State<ChatRouter>) -> Json<IndexMap<String, ServiceStatus>> {
    Json(chat.registry().inventory().await.services)
}

pub(crate) async fn add_service(
    State(chat): State<ChatRouter>,
    Json(request): Json<AddServiceRequest>,
) -> crate::Result<Json<ServiceReport>> {
    log::debug!("Adding {} service '{}'", request.service_type, request.service_id);

    let report = chat
        .registry()
        .add_service(&request.service_id, request.service_type, request.config)
        .await?;

    Ok(Json(report))
}

pub(crate) async fn remove_service(
    State(chat): State<ChatRouter>,
    Path(service_id): Path<String>,
) -> crate::Result<Json<RemoveServiceResponse>> {
    let removed = chat.registry().remove_service(&service_id).await?;

    Ok(Json(RemoveServiceResponse { service_id, removed }))
}

pub(crate) async fn test_service(
    State(chat): State<ChatRouter>,
    Json(request): Json<TestServiceRequest>,
) -> crate::Result<Json<TestReport>> {
    let report = chat
        .registry()
        .test_service(request.service_type, &request.config)
        .await?;

    Ok(Json(report))
}

pub(crate) async fn set_service_enabled(
    State(chat): State<ChatRouter>,
    Path(service_id): Path<String>,
    Json(request): Json<SetEnabledRequest>,
) -> crate::Result<Json<ServiceReport>> {
    let report = chat
        .registry()
        .set_service_enabled(&service_id, request.enabled)
        .await?;

    Ok(Json(report))
}
