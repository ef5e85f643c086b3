// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Scheduling and cancelling notifications.
//!
//! Delivery is done by the notification worker; these handlers only write
//! rows. Both user and enclave sessions are accepted.

use axum::{extract::Path, http::StatusCode, Json};
use chrono::Utc;
use tracing::info;

use crate::{
    auth::UserOrEnclave,
    error::ApiError,
    models::{
        NewNotification, NotificationCreated, ScheduleNotificationRequest, ScheduleSeriesRequest,
        SeriesCreated,
    },
    storage::{StoreError, TxHandle},
};

pub const MAX_TITLE_LEN: usize = 1000;
pub const MAX_BODY_LEN: usize = 10_000;

fn validate(request: ScheduleNotificationRequest, user_id: &str) -> Result<NewNotification, ApiError> {
    if request.send_after < 0 {
        return Err(ApiError::bad_request("send_after must not be negative"));
    }
    if request.title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::bad_request(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    if request.body.chars().count() > MAX_BODY_LEN {
        return Err(ApiError::bad_request(format!(
            "body must be at most {MAX_BODY_LEN} characters"
        )));
    }
    Ok(NewNotification {
        user_id: user_id.to_string(),
        send_after: request.send_after,
        title: request.title,
        body: request.body,
    })
}

fn notification_lookup(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => ApiError::not_found("notification does not exist"),
        other => other.into(),
    }
}

#[utoipa::path(
    post,
    path = "/notifications",
    request_body = ScheduleNotificationRequest,
    tag = "Notifications",
    security(("bearer" = [])),
    responses(
        (status = 200, body = NotificationCreated),
        (status = 400, description = "Invalid notification"),
        (status = 401, description = "Invalid session")
    )
)]
pub async fn schedule_notification(
    auth: UserOrEnclave,
    tx: TxHandle,
    Json(request): Json<ScheduleNotificationRequest>,
) -> Result<Json<NotificationCreated>, ApiError> {
    let new = validate(request, auth.identity.user_id())?;

    let txn = tx.lock().await?;
    let notification = txn
        .notifications()
        .create(&new, None, Utc::now().timestamp())?;

    info!(
        user_id = %notification.user_id,
        notification_id = notification.id,
        send_after = notification.send_after,
        "Notification scheduled"
    );
    Ok(Json(NotificationCreated {
        id: notification.id,
    }))
}

#[utoipa::path(
    post,
    path = "/notifications/series",
    request_body = ScheduleSeriesRequest,
    tag = "Notifications",
    security(("bearer" = [])),
    responses(
        (status = 200, body = SeriesCreated),
        (status = 400, description = "Empty series or invalid notification"),
        (status = 401, description = "Invalid session")
    )
)]
pub async fn schedule_series(
    auth: UserOrEnclave,
    tx: TxHandle,
    Json(request): Json<ScheduleSeriesRequest>,
) -> Result<Json<SeriesCreated>, ApiError> {
    if request.notifications.is_empty() {
        return Err(ApiError::bad_request("series must contain notifications"));
    }
    let items = request
        .notifications
        .into_iter()
        .map(|item| validate(item, auth.identity.user_id()))
        .collect::<Result<Vec<_>, _>>()?;

    let txn = tx.lock().await?;
    let (series_id, created) = txn
        .notifications()
        .create_series(&items, Utc::now().timestamp())?;

    info!(
        user_id = %auth.identity.user_id(),
        series_id = %series_id,
        count = created.len(),
        "Notification series scheduled"
    );
    Ok(Json(SeriesCreated { series_id }))
}

#[utoipa::path(
    delete,
    path = "/notifications/{id}",
    params(("id" = u64, Path, description = "Notification id")),
    tag = "Notifications",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Notification cancelled"),
        (status = 401, description = "Invalid session"),
        (status = 404, description = "No such notification for this user")
    )
)]
pub async fn cancel_notification(
    auth: UserOrEnclave,
    tx: TxHandle,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let txn = tx.lock().await?;
    txn.notifications()
        .delete(id, auth.identity.user_id())
        .map_err(notification_lookup)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/notifications/series/{series_id}",
    params(("series_id" = String, Path, description = "Series id")),
    tag = "Notifications",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Pending members of the series cancelled"),
        (status = 401, description = "Invalid session"),
        (status = 404, description = "No pending notification in this series for this user")
    )
)]
pub async fn cancel_series(
    auth: UserOrEnclave,
    tx: TxHandle,
    Path(series_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let txn = tx.lock().await?;
    let removed = txn
        .notifications()
        .delete_series(&series_id, auth.identity.user_id())?;
    if removed == 0 {
        return Err(ApiError::not_found("series does not exist"));
    }
    Ok(StatusCode::NO_CONTENT)
}
