use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::{KeyValueStore, StoreError};
use crate::types::{LoginData, Media};

/// Store key holding the raw access token.
pub const TOKEN_KEY: &str = "token";
/// Store key holding the logged-in profile as JSON.
pub const USER_KEY: &str = "user";

/// Profile fields kept after login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Login session persisted next to the watch registry.
pub struct Session;

impl Session {
    /// Name of the logged-in user, if any.
    pub fn user_name(store: &dyn KeyValueStore) -> Option<String> {
        Self::user(store).map(|u| u.name).filter(|n| !n.is_empty())
    }

    pub fn user(store: &dyn KeyValueStore) -> Option<SessionUser> {
        let raw = match store.get(USER_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read session user: {e}");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| warn!("Error parsing session user: {e}"))
            .ok()
    }

    pub fn access_token(store: &dyn KeyValueStore) -> Option<String> {
        match store.get(TOKEN_KEY) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Failed to read access token: {e}");
                None
            }
        }
    }

    /// Persist a fresh login.
    pub fn save(store: &dyn KeyValueStore, login: &LoginData) -> Result<SessionUser, StoreError> {
        let user = SessionUser {
            name: login.name.clone(),
            email: login.email.clone(),
            avatar: login.avatar.as_ref().map(|m: &Media| m.url.clone()),
            bio: login.bio.clone(),
        };
        store.set(TOKEN_KEY, &login.access_token)?;
        store.set(USER_KEY, &serde_json::to_string(&user)?)?;
        Ok(user)
    }

    pub fn clear(store: &dyn KeyValueStore) -> Result<(), StoreError> {
        store.remove(TOKEN_KEY)?;
        store.remove(USER_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn login() -> LoginData {
        serde_json::from_value(serde_json::json!({
            "name": "dave",
            "email": "dave@stud.noroff.no",
            "accessToken": "tok-123",
            "avatar": { "url": "https://img.example/dave.png", "alt": "" },
            "bio": null,
        }))
        .unwrap()
    }

    #[test]
    fn empty_store_has_no_session() {
        let store = MemoryStore::new();
        assert_eq!(Session::user_name(&store), None);
        assert_eq!(Session::access_token(&store), None);
    }

    #[test]
    fn save_then_read() {
        let store = MemoryStore::new();
        let user = Session::save(&store, &login()).unwrap();
        assert_eq!(user.avatar.as_deref(), Some("https://img.example/dave.png"));
        assert_eq!(Session::user_name(&store).as_deref(), Some("dave"));
        assert_eq!(Session::access_token(&store).as_deref(), Some("tok-123"));
    }

    #[test]
    fn unparsable_user_is_none() {
        let store = MemoryStore::new();
        store.set(USER_KEY, "{not json").unwrap();
        assert_eq!(Session::user_name(&store), None);
    }

    #[test]
    fn clear_removes_both_keys() {
        let store = MemoryStore::new();
        Session::save(&store, &login()).unwrap();
        Session::clear(&store).unwrap();
        assert!(Session::user(&store).is_none());
        assert!(Session::access_token(&store).is_none());
    }
}
