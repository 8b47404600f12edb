use std::sync::Arc;

use futures::future::try_join_all;
use serde::Deserialize;
use tracing::{info, warn};
use waypost_shared::constants::USERS;
use waypost_shared::{User, UserId};
use waypost_store::{encode, BlobStore, DocKey, DocumentStore, FieldOp};

use crate::error::{Result, SocialError};

/// Partial profile edit. `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
}

#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn DocumentStore>,
    blobs: Option<BlobStore>,
}

fn user_key(uid: &UserId) -> DocKey {
    DocKey::new(USERS, uid)
}

fn required(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(SocialError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub(crate) async fn fetch_user(store: &dyn DocumentStore, uid: &UserId) -> Result<Option<User>> {
    let doc = store.get(&user_key(uid)).await.map_err(SocialError::read)?;
    doc.map(|d| d.decode().map_err(SocialError::read)).transpose()
}

/// Name used in notification text. Falls back to the username, then the
/// raw uid when no profile exists.
pub(crate) async fn display_name(store: &dyn DocumentStore, uid: &UserId) -> Result<String> {
    Ok(match fetch_user(store, uid).await? {
        Some(user) if !user.name.is_empty() => user.name,
        Some(user) if !user.username.is_empty() => user.username,
        _ => uid.to_string(),
    })
}

impl ProfileService {
    pub fn new(store: Arc<dyn DocumentStore>, blobs: Option<BlobStore>) -> Self {
        Self { store, blobs }
    }

    /// Create the profile document at signup.
    pub async fn create_user(&self, uid: &UserId, name: &str, username: &str) -> Result<User> {
        let user = User {
            uid: uid.clone(),
            name: required("name", name)?,
            username: required("username", username)?,
            bio: String::new(),
            profile_image_url: None,
        };

        if fetch_user(self.store.as_ref(), uid).await?.is_some() {
            return Err(SocialError::UserExists(uid.clone()));
        }

        let data = encode(&user).map_err(SocialError::write)?;
        self.store
            .set(&user_key(uid), data)
            .await
            .map_err(SocialError::write)?;

        info!(user = %uid, username = %user.username, "User created");
        Ok(user)
    }

    pub async fn get_user(&self, uid: &UserId) -> Result<Option<User>> {
        fetch_user(self.store.as_ref(), uid).await
    }

    pub async fn require_user(&self, uid: &UserId) -> Result<User> {
        self.get_user(uid)
            .await?
            .ok_or_else(|| SocialError::UserNotFound(uid.clone()))
    }

    pub async fn update_profile(&self, uid: &UserId, update: ProfileUpdate) -> Result<User> {
        let mut ops = Vec::new();
        if let Some(name) = &update.name {
            ops.push(FieldOp::set("name", required("name", name)?));
        }
        if let Some(username) = &update.username {
            ops.push(FieldOp::set("username", required("username", username)?));
        }
        if let Some(bio) = update.bio {
            ops.push(FieldOp::set("bio", bio));
        }

        if !ops.is_empty() {
            self.store
                .update(&user_key(uid), ops)
                .await
                .map_err(|e| match e {
                    waypost_store::StoreError::NotFound(_) => SocialError::UserNotFound(uid.clone()),
                    other => SocialError::write(other),
                })?;
            info!(user = %uid, "Profile updated");
        }

        self.require_user(uid).await
    }

    /// Upload a new profile image and point the profile at it. The previous
    /// image is deleted when it lives in the same blob store.
    pub async fn set_profile_image(&self, uid: &UserId, image: &[u8]) -> Result<User> {
        let blobs = self
            .blobs
            .as_ref()
            .ok_or_else(|| SocialError::InvalidInput("image uploads are disabled".into()))?;

        let previous = self.require_user(uid).await?.profile_image_url;
        let blob = blobs.upload(image).await.map_err(SocialError::write)?;

        self.store
            .update(
                &user_key(uid),
                vec![FieldOp::set("profileImageUrl", blob.download_url.clone())],
            )
            .await
            .map_err(SocialError::write)?;

        if let Some(old_id) = previous.as_deref().and_then(|url| blobs.id_from_url(url)) {
            if let Err(e) = blobs.delete(old_id).await {
                warn!(user = %uid, blob = %old_id, error = %e, "Failed to delete previous profile image");
            }
        }

        info!(user = %uid, blob = %blob.id, "Profile image updated");
        self.require_user(uid).await
    }

    /// Resolve uids to profiles concurrently. Order follows `uids`; uids
    /// without a profile are skipped.
    pub async fn resolve_profiles(&self, uids: &[UserId]) -> Result<Vec<User>> {
        let fetches = uids
            .iter()
            .map(|uid| fetch_user(self.store.as_ref(), uid));
        let users = try_join_all(fetches).await?;
        Ok(users.into_iter().flatten().collect())
    }
}
