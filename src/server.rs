//! usergate HTTP API
//!
//! Login issues an `HttpOnly` session cookie; every other `/users` route
//! resolves the caller from that cookie. Store access and password hashing
//! run on the blocking pool under a timeout.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn};
use zeroize::Zeroizing;

use crate::authenticator::{AuthOutcome, Authenticator, LookupFailure};
use crate::constants::{DEFAULT_SESSION_TTL_SECS, PERMISSION_VIEW_USER_ROLES, ROLE_ADMIN, SESSION_COOKIE};
use crate::credentials::resolve_principal;
use crate::db::Store;
use crate::error::Error;
use crate::hasher::Argon2Hasher;
use crate::model::{NewUser, Permission, Principal, Role, User};

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    auth: Arc<Authenticator<Arc<Store>, Argon2Hasher>>,
    session_ttl: Duration,
    lookup_timeout: Duration,
    cookie_secure: bool,
}

impl AppState {
    pub fn new(store: Arc<Store>, hasher: Argon2Hasher) -> Self {
        Self {
            auth: Arc::new(Authenticator::new(store.clone(), hasher)),
            store,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECS),
            lookup_timeout: Duration::from_secs(5),
            cookie_secure: false,
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Run `f` against the store on the blocking pool, bounded by the lookup timeout
    async fn blocking<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Store) -> Result<T, ApiError> + Send + 'static,
    {
        let store = self.store.clone();
        let task = tokio::task::spawn_blocking(move || f(&store));
        match tokio::time::timeout(self.lookup_timeout, task).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => Err(Error::Unavailable(e.to_string()).into()),
            Err(_) => Err(Error::Unavailable("timed out".into()).into()),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict(String),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            Self::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden".to_string()),
            Self::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
            Self::Conflict(m) => (StatusCode::CONFLICT, m),
            Self::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string()),
        };
        (status, Json(ErrorResponse { error: msg })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::Conflict(_) => Self::Conflict(e.to_string()),
            Error::NotFound(_) => Self::NotFound,
            e => {
                error!(error = %e, "store failure");
                Self::Internal
            }
        }
    }
}

impl From<LookupFailure> for ApiError {
    fn from(e: LookupFailure) -> Self {
        error!(error = %e, "authentication lookup failed");
        Self::Internal
    }
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

/// A login attempt with both fields present
pub struct Credentials {
    username: String,
    password: Zeroizing<String>,
}

impl Credentials {
    /// Rejects empty fields. The username is kept verbatim: lookups are exact.
    pub fn try_from_parts(username: &str, password: &str) -> Result<Self, ApiError> {
        if username.is_empty() {
            return Err(ApiError::BadRequest("username must not be empty".into()));
        }
        if password.is_empty() {
            return Err(ApiError::BadRequest("password must not be empty".into()));
        }
        Ok(Self {
            username: username.to_owned(),
            password: Zeroizing::new(password.to_owned()),
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

#[derive(Deserialize)]
struct CreateUserRequest {
    name: String,
    email: String,
    password: String,
    active: Option<bool>,
    /// Role names
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Serialize)]
struct UserDto {
    id: u64,
    name: String,
    email: String,
    active: bool,
    created: u64,
}

impl From<User> for UserDto {
    fn from(u: User) -> Self {
        Self { id: u.id, name: u.name, email: u.email, active: u.active, created: u.created }
    }
}

#[derive(Debug, Serialize)]
struct PrincipalDto {
    user: UserDto,
    roles: Vec<String>,
    permissions: Vec<String>,
}

impl From<Principal> for PrincipalDto {
    fn from(p: Principal) -> Self {
        Self {
            roles: p.roles.into_iter().map(|r| r.name).collect(),
            permissions: p.permissions.into_iter().map(|p| p.name).collect(),
            user: p.user.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RoleDto {
    id: u64,
    name: String,
    permissions: Vec<String>,
}

impl From<(Role, Vec<Permission>)> for RoleDto {
    fn from((role, permissions): (Role, Vec<Permission>)) -> Self {
        Self {
            id: role.id,
            name: role.name,
            permissions: permissions.into_iter().map(|p| p.name).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

// ============================================================================
// Cookies
// ============================================================================

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for value in headers.get_all(header::COOKIE) {
        let Ok(s) = value.to_str() else { continue };
        for part in s.split(';') {
            if let Some((k, v)) = part.trim().split_once('=') {
                if k == name {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

fn set_session_cookie(token: &str, max_age: Duration, secure: bool) -> Result<HeaderValue, ApiError> {
    let secure = if secure { "; Secure" } else { "" };
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        max_age.as_secs(),
        secure
    ))
    .map_err(|e| {
        error!(error = %e, "session cookie not encodable");
        ApiError::Internal
    })
}

fn clear_session_cookie(secure: bool) -> HeaderValue {
    let value = format!(
        "{}=deleted; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{}",
        SESSION_COOKIE,
        if secure { "; Secure" } else { "" }
    );
    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("deleted"))
}

/// Resolve the caller's principal from the session cookie
async fn current_principal(state: &AppState, headers: &HeaderMap) -> Result<Principal, ApiError> {
    let token = parse_cookie(headers, SESSION_COOKIE).ok_or(ApiError::Unauthorized)?;
    state
        .blocking(move |store| {
            let session = store.validate_session(&token)?.ok_or(ApiError::Unauthorized)?;
            let user = store.get_user(session.user_id)?.ok_or(ApiError::Unauthorized)?;
            if !user.active {
                return Err(ApiError::Unauthorized);
            }
            Ok(resolve_principal(store, user)?)
        })
        .await
}

fn require_role(principal: &Principal, role: &str) -> Result<(), ApiError> {
    if principal.has_role(role) {
        Ok(())
    } else {
        info!(user = principal.user.id, role, "missing role");
        Err(ApiError::Forbidden)
    }
}

fn require_permission(principal: &Principal, permission: &str) -> Result<(), ApiError> {
    if principal.is_permitted(permission) {
        Ok(())
    } else {
        info!(user = principal.user.id, permission, "missing permission");
        Err(ApiError::Forbidden)
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Response, ApiError> {
    let creds = Credentials::try_from_parts(&req.username, &req.password)?;
    let auth = state.auth.clone();
    let ttl = state.session_ttl;

    // A timed-out attempt is abandoned, not cancelled, so it must not write
    let outcome = state
        .blocking(move |_| Ok(auth.authenticate(creds.username(), creds.password())?))
        .await?;

    match outcome {
        AuthOutcome::Authorized(principal) => {
            let user_id = principal.user.id;
            let token = state
                .blocking(move |store| Ok(store.create_session(user_id, Some(ttl.as_secs()))?))
                .await?;
            info!(user = user_id, "login succeeded");
            let cookie = set_session_cookie(&token, ttl, state.cookie_secure)?;
            Ok((
                StatusCode::OK,
                [(header::SET_COOKIE, cookie)],
                Json(PrincipalDto::from(principal)),
            )
                .into_response())
        }
        AuthOutcome::Unauthorized(reason) => {
            info!(%reason, "login rejected");
            Err(ApiError::Unauthorized)
        }
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = parse_cookie(&headers, SESSION_COOKIE) {
        state.blocking(move |store| Ok(store.revoke_session(&token)?)).await?;
    }
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, clear_session_cookie(state.cookie_secure))],
        Json(serde_json::json!({"status": "ok"})),
    )
        .into_response())
}

async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<PrincipalDto>, ApiError> {
    let principal = current_principal(&state, &headers).await?;
    Ok(Json(principal.into()))
}

async fn list_users(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<UserDto>>, ApiError> {
    let principal = current_principal(&state, &headers).await?;
    require_role(&principal, ROLE_ADMIN)?;
    let users = state.blocking(|store| Ok(store.list_users()?)).await?;
    Ok(Json(users.into_iter().map(UserDto::from).collect()))
}

async fn create_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserDto>), ApiError> {
    let principal = current_principal(&state, &headers).await?;
    require_role(&principal, ROLE_ADMIN)?;
    if req.name.is_empty() || req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::BadRequest("name, email and password are required".into()));
    }

    let auth = state.auth.clone();
    let user = state
        .blocking(move |store| {
            let mut role_ids = Vec::with_capacity(req.roles.len());
            for name in &req.roles {
                let role = store
                    .find_role_by_name(name)?
                    .ok_or_else(|| ApiError::BadRequest(format!("unknown role '{}'", name)))?;
                role_ids.push(role.id);
            }
            let new = NewUser::new(req.name, req.email, req.password)
                .active(req.active.unwrap_or(true))
                .with_roles(role_ids);
            Ok(store.register_user(auth.hasher(), &new)?)
        })
        .await?;

    info!(actor = principal.user.id, id = user.id, "user registered");
    Ok((StatusCode::CREATED, Json(user.into())))
}

async fn count_users(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<CountResponse>, ApiError> {
    current_principal(&state, &headers).await?;
    let count = state.blocking(|store| Ok(store.count_users()?)).await?;
    Ok(Json(CountResponse { count }))
}

async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<UserDto>, ApiError> {
    current_principal(&state, &headers).await?;
    let user = state
        .blocking(move |store| store.get_user(id)?.ok_or(ApiError::NotFound))
        .await?;
    Ok(Json(user.into()))
}

async fn user_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Vec<RoleDto>>, ApiError> {
    let principal = current_principal(&state, &headers).await?;
    require_permission(&principal, PERMISSION_VIEW_USER_ROLES)?;
    let roles = state
        .blocking(move |store| {
            if store.get_user(id)?.is_none() {
                return Err(ApiError::NotFound);
            }
            Ok(store.roles_with_permissions(id)?)
        })
        .await?;
    Ok(Json(roles.into_iter().map(RoleDto::from).collect()))
}

// ============================================================================
// Maintenance
// ============================================================================

/// Purge expired sessions every `period`, starting immediately
pub fn spawn_session_sweeper(store: Arc<Store>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let store = store.clone();
            match tokio::task::spawn_blocking(move || store.purge_expired()).await {
                Ok(Ok(0)) => {}
                Ok(Ok(purged)) => info!(purged, "expired sessions removed"),
                Ok(Err(e)) => warn!(error = %e, "session purge failed"),
                Err(e) => warn!(error = %e, "session purge task failed"),
            }
        }
    })
}

// ============================================================================
// Router
// ============================================================================

pub fn router(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request| {
            let request_id = req
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            info_span!("request", method = %req.method(), uri = %req.uri(), request_id)
        }))
        .layer(PropagateRequestIdLayer::x_request_id());

    Router::new()
        .route("/health", get(health))
        .route("/users/auth", post(login))
        .route("/users/logout", post(logout))
        .route("/users/me", get(me))
        .route("/users/count", get(count_users))
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/roles", get(user_roles))
        .layer(middleware)
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
