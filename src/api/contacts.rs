// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    auth::Auth,
    error::ApiError,
    models::{is_valid_email, AddContactRequest, Contact, ContactsResponse},
    state::AppState,
    storage::{StoreError, TxHandle},
};

fn contact_lookup(e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => ApiError::not_found("contact does not exist"),
        other => other.into(),
    }
}

#[utoipa::path(
    get,
    path = "/contacts",
    tag = "Contacts",
    security(("bearer" = [])),
    responses(
        (status = 200, body = ContactsResponse),
        (status = 401, description = "Invalid session")
    )
)]
pub async fn list_contacts(
    State(state): State<AppState>,
    auth: Auth,
) -> Result<Json<ContactsResponse>, ApiError> {
    let snapshot = state.transactions.snapshot()?;
    let users = snapshot.users();
    let contacts = auth
        .identity
        .user
        .contacts
        .iter()
        .map(|id| users.get_by_id(id).map(Contact::from))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(ContactsResponse { contacts }))
}

#[utoipa::path(
    post,
    path = "/contacts",
    request_body = AddContactRequest,
    tag = "Contacts",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Contact added"),
        (status = 401, description = "Invalid session"),
        (status = 404, description = "No user with that email"),
        (status = 409, description = "Already a contact")
    )
)]
pub async fn add_contact(
    auth: Auth,
    tx: TxHandle,
    Json(request): Json<AddContactRequest>,
) -> Result<StatusCode, ApiError> {
    if !is_valid_email(request.email.trim()) {
        return Err(ApiError::bad_request("invalid email"));
    }

    let txn = tx.lock().await?;
    let contact = txn
        .users()
        .get_by_email(&request.email)
        .map_err(contact_lookup)?;
    txn.users()
        .add_contact(auth.identity.user_id(), &contact.id)
        .map_err(|e| match e {
            StoreError::Conflict(_) => ApiError::conflict("contact does already exist"),
            other => other.into(),
        })?;
    Ok(StatusCode::CREATED)
}

#[utoipa::path(
    delete,
    path = "/contacts/{email}",
    params(("email" = String, Path, description = "Email of the contact to remove")),
    tag = "Contacts",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Contact removed"),
        (status = 401, description = "Invalid session"),
        (status = 404, description = "Not a contact")
    )
)]
pub async fn remove_contact(
    auth: Auth,
    tx: TxHandle,
    Path(email): Path<String>,
) -> Result<StatusCode, ApiError> {
    let txn = tx.lock().await?;
    let contact = txn.users().get_by_email(&email).map_err(contact_lookup)?;
    txn.users()
        .remove_contact(auth.identity.user_id(), &contact.id)
        .map_err(contact_lookup)?;
    Ok(StatusCode::OK)
}
