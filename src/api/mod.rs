// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use url::Url;
use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    models::{
        ActivateUserRequest, AddContactRequest, AddWalletRequest, ChallengeRequest,
        ChallengeResponse, Contact, ContactsResponse, CreateUserRequest, EnclaveUrlResponse,
        NotificationCreated, ScheduleNotificationRequest, ScheduleSeriesRequest, SeriesCreated,
        VerifyWalletRequest, Wallet,
    },
    state::AppState,
};

pub mod contacts;
pub mod health;
pub mod notifications;
pub mod transaction;
pub mod users;
pub mod wallets;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.frontend_url);

    // Every route here runs inside at most one database write transaction.
    let transactional = Router::new()
        .route("/users", post(users::create_user))
        .route(
            "/users/{email}/resend-activation-link",
            get(users::resend_activation_link),
        )
        .route("/users/{email}/activate", post(users::activate_user))
        .route("/users/{email}/enclave-url", get(users::get_enclave_url))
        .route("/users/{email}/wallets", post(users::add_wallet))
        .route("/users/{email}", get(users::get_user))
        .route("/wallets/challenge", post(wallets::request_challenge))
        .route("/wallets/verify", post(wallets::verify_wallet))
        .route(
            "/contacts",
            get(contacts::list_contacts).post(contacts::add_contact),
        )
        .route("/contacts/{email}", delete(contacts::remove_contact))
        .route("/notifications", post(notifications::schedule_notification))
        .route("/notifications/series", post(notifications::schedule_series))
        .route(
            "/notifications/{id}",
            delete(notifications::cancel_notification),
        )
        .route(
            "/notifications/series/{series_id}",
            delete(notifications::cancel_series),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            transaction::manage_transaction,
        ));

    // Readiness opens its own transaction and must stay outside the layer.
    let health_routes = Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    Router::new()
        .merge(transactional)
        .merge(health_routes)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(cors)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn cors_layer(frontend_url: &Url) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::HEAD,
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(&frontend_url.origin().ascii_serialization()) {
        Ok(origin) => layer.allow_origin(AllowOrigin::exact(origin)),
        Err(e) => {
            tracing::warn!(error = %e, url = %frontend_url, "Frontend origin is not a valid header; CORS disabled");
            layer
        }
    }
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        users::create_user,
        users::resend_activation_link,
        users::activate_user,
        users::get_user,
        users::get_enclave_url,
        users::add_wallet,
        wallets::request_challenge,
        wallets::verify_wallet,
        contacts::list_contacts,
        contacts::add_contact,
        contacts::remove_contact,
        notifications::schedule_notification,
        notifications::schedule_series,
        notifications::cancel_notification,
        notifications::cancel_series,
        health::liveness,
        health::readiness
    ),
    components(
        schemas(
            Contact,
            Wallet,
            CreateUserRequest,
            ActivateUserRequest,
            EnclaveUrlResponse,
            AddWalletRequest,
            ChallengeRequest,
            ChallengeResponse,
            VerifyWalletRequest,
            AddContactRequest,
            ContactsResponse,
            ScheduleNotificationRequest,
            ScheduleSeriesRequest,
            NotificationCreated,
            SeriesCreated,
            health::ReadyResponse,
            health::ReadinessChecks,
            health::LiveResponse,
            health::StoreStatus
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Users", description = "Sign-up, activation and account lookup"),
        (name = "Wallets", description = "Wallet ownership proofs"),
        (name = "Contacts", description = "Contact list management"),
        (name = "Notifications", description = "Scheduled notifications"),
        (name = "Health", description = "Liveness and readiness checks")
    )
)]
struct ApiDoc;
