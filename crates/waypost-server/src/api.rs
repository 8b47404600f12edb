use std::sync::Arc;

use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Path, State},
    http::{header, request::Parts, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;
use waypost_shared::{FriendRequest, FriendRequestId, Notification, PostId, User, UserId};
use waypost_social::{ProfileUpdate, Social, SocialError};
use waypost_store::BlobStore;

use crate::config::ServerConfig;
use crate::error::ServerError;

/// Header carrying the authenticated caller's uid, set by the auth proxy.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub social: Social,
    pub blobs: Option<BlobStore>,
    pub config: Arc<ServerConfig>,
}

/// The caller, taken from [`USER_HEADER`]. Requests without it are rejected
/// with 401 before any handler runs.
pub struct CurrentUser(pub UserId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(SocialError::NotAuthenticated)?;
        let uid = UserId::new(raw).map_err(SocialError::from)?;
        Ok(CurrentUser(uid))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let body_limit = state.config.max_image_size;

    Router::new()
        .route("/health", get(health_check))
        .route("/users", post(create_user))
        .route("/users/me", patch(update_profile))
        .route("/users/me/image", put(set_profile_image))
        .route("/users/:uid", get(get_user))
        .route("/blobs/:id", get(blob_download))
        .route("/friends", get(list_friends))
        .route("/friends/profiles", get(friend_profiles))
        .route("/friends/:uid", delete(remove_friend))
        .route("/friend-requests", post(send_friend_request))
        .route("/friend-requests/incoming", get(incoming_requests))
        .route("/friend-requests/:id/accept", post(accept_friend_request))
        .route("/friend-requests/:id", delete(delete_friend_request))
        .route("/blocks/:uid", post(block_user).delete(unblock_user))
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/posts/:post_id/likes", post(like_post))
        .route("/posts/:post_id/comments", post(comment_post))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Deserialize)]
struct CreateUserRequest {
    name: String,
    username: String,
}

#[derive(Deserialize)]
struct SendRequestBody {
    receiver_id: UserId,
}

#[derive(Serialize)]
struct NotificationsResponse {
    has_unread: bool,
    unread: Vec<Notification>,
    read: Vec<Notification>,
}

#[derive(Deserialize)]
struct LikeBody {
    author_id: UserId,
}

#[derive(Deserialize)]
struct CommentBody {
    author_id: UserId,
    text: String,
}

#[derive(Serialize)]
struct NotifiedResponse {
    notified: bool,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ─── Profiles ───

async fn create_user(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ServerError> {
    let user = state
        .social
        .profiles
        .create_user(&uid, &req.name, &req.username)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Profiles of users in a block relationship with the caller look absent.
async fn get_user(
    State(state): State<AppState>,
    CurrentUser(viewer): CurrentUser,
    Path(uid): Path<UserId>,
) -> Result<Json<User>, ServerError> {
    if state.social.relationships.is_blocked(&viewer, &uid).await? {
        return Err(SocialError::UserNotFound(uid).into());
    }
    Ok(Json(state.social.profiles.require_user(&uid).await?))
}

async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    Json(update): Json<ProfileUpdate>,
) -> Result<Json<User>, ServerError> {
    Ok(Json(state.social.profiles.update_profile(&uid, update).await?))
}

async fn set_profile_image(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    body: Bytes,
) -> Result<Json<User>, ServerError> {
    let user = state.social.profiles.set_profile_image(&uid, &body).await?;
    info!(user = %uid, size = body.len(), "Profile image uploaded via API");
    Ok(Json(user))
}

async fn blob_download(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServerError> {
    let blobs = state
        .blobs
        .as_ref()
        .ok_or_else(|| ServerError::NotFound("blob storage is disabled".into()))?;
    let data = blobs.get(id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

// ─── Friends ───

async fn list_friends(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
) -> Result<Json<Vec<UserId>>, ServerError> {
    let friends = state.social.relationships.friends(&uid).await?;
    Ok(Json(friends.into_iter().collect()))
}

async fn friend_profiles(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
) -> Result<Json<Vec<User>>, ServerError> {
    let relationships = &state.social.relationships;
    let friends: Vec<UserId> = relationships.friends(&uid).await?.into_iter().collect();
    let profiles = state.social.profiles.resolve_profiles(&friends).await?;
    let visible = relationships.visibility(&uid).await?.retain(profiles);
    Ok(Json(visible))
}

async fn remove_friend(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    Path(friend): Path<UserId>,
) -> Result<StatusCode, ServerError> {
    state.social.relationships.remove_friend(&uid, &friend).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Friend requests ───

async fn send_friend_request(
    State(state): State<AppState>,
    CurrentUser(sender): CurrentUser,
    Json(body): Json<SendRequestBody>,
) -> Result<(StatusCode, Json<FriendRequest>), ServerError> {
    state.social.profiles.require_user(&body.receiver_id).await?;
    let request = state
        .social
        .relationships
        .send_friend_request(&sender, &body.receiver_id)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

async fn incoming_requests(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
) -> Result<Json<Vec<FriendRequest>>, ServerError> {
    let relationships = &state.social.relationships;
    let requests = relationships.incoming_requests(&uid).await?;
    Ok(Json(relationships.visibility(&uid).await?.retain(requests)))
}

fn parse_request_id(raw: &str) -> Result<FriendRequestId, ServerError> {
    Ok(FriendRequestId::parse(raw).map_err(SocialError::from)?)
}

async fn accept_friend_request(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<FriendRequest>, ServerError> {
    let id = parse_request_id(&id)?;
    if id.receiver() != &uid {
        return Err(SocialError::Forbidden("only the receiver can accept".into()).into());
    }
    let request = state
        .social
        .relationships
        .accept_friend_request(&id, &uid, id.sender())
        .await?;
    Ok(Json(request))
}

/// Either party may delete: the sender withdraws, the receiver declines.
async fn delete_friend_request(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    let id = parse_request_id(&id)?;
    if id.sender() != &uid && id.receiver() != &uid {
        return Err(SocialError::Forbidden("not a party to this request".into()).into());
    }
    if !state.social.relationships.delete_friend_request(&id).await? {
        return Err(SocialError::RequestNotFound(id).into());
    }
    Ok(StatusCode::NO_CONTENT)
}

// ─── Blocks ───

async fn block_user(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    Path(target): Path<UserId>,
) -> Result<StatusCode, ServerError> {
    state.social.relationships.block_user(&uid, &target).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn unblock_user(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    Path(target): Path<UserId>,
) -> Result<StatusCode, ServerError> {
    state.social.relationships.unblock_user(&uid, &target).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ─── Notifications ───

async fn list_notifications(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
) -> Result<Json<NotificationsResponse>, ServerError> {
    let feed = state.social.feed(uid);
    feed.refresh().await?;
    let view = feed.snapshot();
    Ok(Json(NotificationsResponse {
        has_unread: view.has_unread(),
        unread: view.unread,
        read: view.read,
    }))
}

async fn mark_all_read(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
) -> Result<Json<serde_json::Value>, ServerError> {
    let marked = state.social.notifications.mark_all_read(&uid).await?;
    Ok(Json(serde_json::json!({ "marked": marked })))
}

// ─── Post activity ───

async fn like_post(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    Path(post_id): Path<String>,
    Json(body): Json<LikeBody>,
) -> Result<Json<NotifiedResponse>, ServerError> {
    let sent = state
        .social
        .content
        .notify_like(&uid, &PostId(post_id), &body.author_id)
        .await?;
    Ok(Json(NotifiedResponse {
        notified: sent.is_some(),
    }))
}

async fn comment_post(
    State(state): State<AppState>,
    CurrentUser(uid): CurrentUser,
    Path(post_id): Path<String>,
    Json(body): Json<CommentBody>,
) -> Result<Json<NotifiedResponse>, ServerError> {
    let sent = state
        .social
        .content
        .notify_comment(&uid, &PostId(post_id), &body.author_id, &body.text)
        .await?;
    Ok(Json(NotifiedResponse {
        notified: sent.is_some(),
    }))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use waypost_store::MemoryStore;

    async fn test_app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = ServerConfig::default();
        let blobs = BlobStore::new(
            dir.path().to_path_buf(),
            &config.public_base_url,
            config.max_image_size,
        )
        .await
        .unwrap();
        let social = Social::new(
            Arc::new(MemoryStore::new()),
            Some(blobs.clone()),
            config.notification_page_size,
        );
        let state = AppState {
            social,
            blobs: Some(blobs),
            config: Arc::new(config),
        };
        (build_router(state), dir)
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn signup(app: &Router, uid: &str, name: &str) {
        let (status, _) = call(
            app,
            Method::POST,
            "/users",
            Some(uid),
            Some(json!({ "name": name, "username": uid })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    async fn befriend(app: &Router, a: &str, b: &str) {
        let (status, _) = call(
            app,
            Method::POST,
            "/friend-requests",
            Some(a),
            Some(json!({ "receiver_id": b })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = call(
            app,
            Method::POST,
            &format!("/friend-requests/{a}_{b}/accept"),
            Some(b),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _dir) = test_app().await;
        let (status, body) = call(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (app, _dir) = test_app().await;
        let (status, body) = call(&app, Method::GET, "/friends", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Not authenticated");
    }

    #[tokio::test]
    async fn test_request_accept_flow() {
        let (app, _dir) = test_app().await;
        signup(&app, "alice", "Alice").await;
        signup(&app, "bob", "Bob").await;

        let (status, request) = call(
            &app,
            Method::POST,
            "/friend-requests",
            Some("alice"),
            Some(json!({ "receiver_id": "bob" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(request["id"], "alice_bob");
        assert_eq!(request["status"], "pending");

        let (_, incoming) = call(&app, Method::GET, "/friend-requests/incoming", Some("bob"), None).await;
        assert_eq!(incoming.as_array().unwrap().len(), 1);

        let (_, feed) = call(&app, Method::GET, "/notifications", Some("bob"), None).await;
        assert_eq!(feed["has_unread"], true);
        assert_eq!(feed["unread"][0]["message"], "Alice sent you a friend request.");

        let (status, body) = call(
            &app,
            Method::POST,
            "/friend-requests/alice_bob/accept",
            Some("alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden: only the receiver can accept");

        let (status, accepted) = call(
            &app,
            Method::POST,
            "/friend-requests/alice_bob/accept",
            Some("bob"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(accepted["status"], "accepted");

        let (_, friends) = call(&app, Method::GET, "/friends", Some("alice"), None).await;
        assert_eq!(friends, json!(["bob"]));
        let (_, profiles) = call(&app, Method::GET, "/friends/profiles", Some("bob"), None).await;
        assert_eq!(profiles[0]["name"], "Alice");

        let (_, feed) = call(&app, Method::GET, "/notifications", Some("bob"), None).await;
        assert_eq!(feed["unread"][0]["message"], "You and Alice are now friends.");

        let (_, feed) = call(&app, Method::GET, "/notifications", Some("alice"), None).await;
        assert_eq!(feed["unread"][0]["type"], "requestAccepted");

        let (_, marked) = call(&app, Method::POST, "/notifications/read-all", Some("bob"), None).await;
        assert_eq!(marked["marked"], 1);
        let (_, feed) = call(&app, Method::GET, "/notifications", Some("bob"), None).await;
        assert_eq!(feed["has_unread"], false);
        assert_eq!(feed["read"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_request() {
        let (app, _dir) = test_app().await;
        signup(&app, "alice", "Alice").await;
        signup(&app, "bob", "Bob").await;
        signup(&app, "carol", "Carol").await;
        call(
            &app,
            Method::POST,
            "/friend-requests",
            Some("alice"),
            Some(json!({ "receiver_id": "bob" })),
        )
        .await;

        let (status, body) = call(&app, Method::DELETE, "/friend-requests/alice_bob", Some("carol"), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Forbidden: not a party to this request");

        let (status, _) = call(&app, Method::DELETE, "/friend-requests/alice_bob", Some("bob"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, Method::DELETE, "/friend-requests/alice_bob", Some("bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, feed) = call(&app, Method::GET, "/notifications", Some("bob"), None).await;
        assert_eq!(feed["has_unread"], false);
    }

    #[tokio::test]
    async fn test_block_flow() {
        let (app, _dir) = test_app().await;
        signup(&app, "alice", "Alice").await;
        signup(&app, "bob", "Bob").await;
        befriend(&app, "alice", "bob").await;

        let (status, _) = call(&app, Method::POST, "/blocks/bob", Some("alice"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, friends) = call(&app, Method::GET, "/friends", Some("bob"), None).await;
        assert_eq!(friends, json!([]));

        let (status, _) = call(&app, Method::GET, "/users/alice", Some("bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &app,
            Method::POST,
            "/friend-requests",
            Some("bob"),
            Some(json!({ "receiver_id": "alice" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = call(&app, Method::DELETE, "/blocks/bob", Some("alice"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, user) = call(&app, Method::GET, "/users/alice", Some("bob"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(user["username"], "alice");
    }

    #[tokio::test]
    async fn test_remove_friend_without_lists_conflicts() {
        let (app, _dir) = test_app().await;
        let (status, _) = call(&app, Method::DELETE, "/friends/bob", Some("alice"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_post_activity_notifications() {
        let (app, _dir) = test_app().await;
        signup(&app, "alice", "Alice").await;
        signup(&app, "bob", "Bob").await;

        let (_, own) = call(
            &app,
            Method::POST,
            "/posts/p1/likes",
            Some("bob"),
            Some(json!({ "author_id": "bob" })),
        )
        .await;
        assert_eq!(own["notified"], false);

        let (_, like) = call(
            &app,
            Method::POST,
            "/posts/p1/likes",
            Some("alice"),
            Some(json!({ "author_id": "bob" })),
        )
        .await;
        assert_eq!(like["notified"], true);

        let (_, comment) = call(
            &app,
            Method::POST,
            "/posts/p1/comments",
            Some("alice"),
            Some(json!({ "author_id": "bob", "text": "great spot" })),
        )
        .await;
        assert_eq!(comment["notified"], true);

        let (_, feed) = call(&app, Method::GET, "/notifications", Some("bob"), None).await;
        let messages: Vec<&str> = feed["unread"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["message"].as_str().unwrap())
            .collect();
        assert_eq!(messages.len(), 2);
        assert!(messages.contains(&"Alice liked your post."));
        assert!(messages.contains(&"Alice commented: great spot"));
    }

    #[tokio::test]
    async fn test_profile_image_roundtrip() {
        let (app, _dir) = test_app().await;
        signup(&app, "alice", "Alice").await;

        let request = Request::builder()
            .method(Method::PUT)
            .uri("/users/me/image")
            .header(USER_HEADER, "alice")
            .body(Body::from(vec![0xffu8, 0xd8, 0xff]))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let user: Value = serde_json::from_slice(&bytes).unwrap();
        let url = user["profileImageUrl"].as_str().unwrap();
        let path = url.strip_prefix("http://localhost:8080").unwrap();

        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], &[0xff, 0xd8, 0xff]);
    }
}
