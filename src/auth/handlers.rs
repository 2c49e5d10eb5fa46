use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{AuthResponse, LoginRequest, PublicUser, RefreshRequest, RegisterRequest, StatusResponse},
        password::{authenticate, hash_password},
        services::{is_valid_username, AuthUser, JwtKeys, PASSWORD_MIN_LEN},
    },
    state::AppState,
    store::UserProfile,
};

type ApiError = (StatusCode, String);

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/status", get(status))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/auth/user", get(get_user))
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn issue_tokens(state: &AppState, id: i64, username: String) -> Result<AuthResponse, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(id, &username).map_err(internal)?;
    let refresh_token = keys.sign_refresh(id, &username).map_err(internal)?;
    Ok(AuthResponse {
        access_token,
        refresh_token,
        user: PublicUser { id, username },
    })
}

#[instrument(skip(state))]
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let has_users = state.store.has_users().await.map_err(internal)?;
    Ok(Json(StatusResponse {
        needs_setup: !has_users,
        backend: state.store.backend(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.username = payload.username.trim().to_string();

    if !is_valid_username(&payload.username) {
        warn!(username = %payload.username, "invalid username");
        return Err((StatusCode::BAD_REQUEST, "Invalid username".into()));
    }

    if payload.password.len() < PASSWORD_MIN_LEN {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    // Registration is only open until the first account exists.
    if state.store.has_users().await.map_err(internal)? {
        warn!(username = %payload.username, "registration attempted after setup");
        return Err((
            StatusCode::FORBIDDEN,
            "User already exists. This is a single-user system.".into(),
        ));
    }

    let hash = hash_password(&payload.password).map_err(internal)?;

    let created = match state.store.create_user(&payload.username, &hash).await {
        Ok(u) => u,
        Err(e) if e.is_conflict() => {
            warn!(username = %payload.username, "username already taken");
            return Err((StatusCode::CONFLICT, "Username already taken".into()));
        }
        Err(e) => return Err(internal(e)),
    };

    state
        .store
        .update_last_login(created.id)
        .await
        .map_err(internal)?;

    info!(user_id = created.id, username = %created.username, "user registered");
    issue_tokens(&state, created.id, created.username).map(Json)
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.username = payload.username.trim().to_string();

    let user = match authenticate(state.store.as_ref(), &payload.username, &payload.password).await {
        Ok(Some(u)) => u,
        Ok(None) => {
            warn!(username = %payload.username, "login rejected");
            return Err((StatusCode::UNAUTHORIZED, "Invalid credentials".into()));
        }
        Err(e) => return Err(internal(e)),
    };

    info!(user_id = user.id, username = %user.username, "user logged in");
    issue_tokens(&state, user.id, user.username).map(Json)
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|e| (StatusCode::UNAUTHORIZED, e.to_string()))?;

    // A retired account must not be able to keep refreshing.
    let profile = state
        .store
        .get_user_by_id(claims.sub)
        .await
        .map_err(internal)?
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "User not found".to_string()))?;

    issue_tokens(&state, profile.id, profile.username).map(Json)
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    match state.store.get_user_by_id(user_id).await {
        Ok(Some(profile)) => Ok(Json(profile)),
        Ok(None) => {
            warn!(user_id, "user not found");
            Err((StatusCode::UNAUTHORIZED, "User not found".into()))
        }
        Err(e) => Err(internal(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn do_register(state: &AppState, username: &str, password: &str) -> Result<Json<AuthResponse>, ApiError> {
        let req = RegisterRequest {
            username: username.into(),
            password: password.into(),
        };
        register(State(state.clone()), Json(req)).await
    }

    async fn do_login(state: &AppState, username: &str, password: &str) -> Result<Json<AuthResponse>, ApiError> {
        let req = LoginRequest {
            username: username.into(),
            password: password.into(),
        };
        login(State(state.clone()), Json(req)).await
    }

    #[tokio::test]
    async fn first_user_registers_then_setup_closes() {
        let dir = TempDir::new().unwrap();
        let state = AppState::fake(dir.path());

        let Json(before) = status(State(state.clone())).await.unwrap();
        assert!(before.needs_setup);

        let Json(resp) = do_register(&state, " alice ", "hunter22").await.unwrap();
        assert_eq!(resp.user.id, 1);
        assert_eq!(resp.user.username, "alice");

        let Json(after) = status(State(state.clone())).await.unwrap();
        assert!(!after.needs_setup);

        let (code, _) = do_register(&state, "mallory", "hunter22").await.unwrap_err();
        assert_eq!(code, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn register_validates_input() {
        let dir = TempDir::new().unwrap();
        let state = AppState::fake(dir.path());

        let (code, _) = do_register(&state, "a b", "hunter22").await.unwrap_err();
        assert_eq!(code, StatusCode::BAD_REQUEST);
        let (code, _) = do_register(&state, "alice", "123").await.unwrap_err();
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(!state.store.has_users().await.unwrap());
    }

    #[tokio::test]
    async fn login_records_last_login_and_rejects_bad_password() {
        let dir = TempDir::new().unwrap();
        let state = AppState::fake(dir.path());
        do_register(&state, "alice", "hunter22").await.unwrap();

        let (code, msg) = do_login(&state, "alice", "wrong-one").await.unwrap_err();
        assert_eq!(code, StatusCode::UNAUTHORIZED);
        assert_eq!(msg, "Invalid credentials");
        let (code, _) = do_login(&state, "nobody", "hunter22").await.unwrap_err();
        assert_eq!(code, StatusCode::UNAUTHORIZED);

        let Json(resp) = do_login(&state, "alice", "hunter22").await.unwrap();
        let Json(profile) = get_user(State(state.clone()), AuthUser(resp.user.id)).await.unwrap();
        assert_eq!(profile.username, "alice");
        assert!(profile.last_login.unwrap() >= profile.created_at);
    }

    #[tokio::test]
    async fn refresh_issues_new_pair_for_known_user() {
        let dir = TempDir::new().unwrap();
        let state = AppState::fake(dir.path());
        let Json(resp) = do_register(&state, "alice", "hunter22").await.unwrap();

        let Json(next) = refresh(
            State(state.clone()),
            Json(RefreshRequest { refresh_token: resp.refresh_token }),
        )
        .await
        .unwrap();
        assert_eq!(next.user.id, resp.user.id);

        let (code, _) = refresh(
            State(state.clone()),
            Json(RefreshRequest { refresh_token: resp.access_token }),
        )
        .await
        .unwrap_err();
        assert_eq!(code, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_user_profile_is_unauthorized() {
        let dir = TempDir::new().unwrap();
        let state = AppState::fake(dir.path());
        let (code, _) = get_user(State(state), AuthUser(99)).await.unwrap_err();
        assert_eq!(code, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn public_user_serialization() {
        let json = serde_json::to_string(&PublicUser { id: 1, username: "alice".into() }).unwrap();
        assert_eq!(json, r#"{"id":1,"username":"alice"}"#);
    }
}
