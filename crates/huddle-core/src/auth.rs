//! Boundary to the identity provider.
//!
//! The conference core only needs the signed-in user's id/email, an
//! optional profile, and a way to sign out. [`SessionContext`] is built
//! once a user is authenticated and dropped when they sign out.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::HuddleError;
use crate::participants::Participant;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    Github,
}

pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<User>;

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<User, HuddleError>>;

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<User, HuddleError>>;

    fn sign_in_with_oauth(&self, provider: OAuthProvider) -> BoxFuture<'_, Result<(), HuddleError>>;

    fn sign_out(&self) -> BoxFuture<'_, Result<(), HuddleError>>;

    /// Session changes: `None` once the user is signed out.
    fn subscribe(&self) -> watch::Receiver<Option<User>>;

    fn load_profile<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Profile>, HuddleError>>;
}

/// Authenticated session, passed to the components that need the user.
pub struct SessionContext {
    provider: Arc<dyn AuthProvider>,
    user: User,
    profile: Option<Profile>,
}

impl SessionContext {
    /// Build the context for the currently signed-in user.
    ///
    /// A failing profile lookup is logged and otherwise ignored.
    pub async fn establish(provider: Arc<dyn AuthProvider>) -> Result<Self, HuddleError> {
        let user = provider
            .current_user()
            .ok_or_else(|| HuddleError::Auth("no signed-in user".into()))?;

        let profile = match provider.load_profile(&user.id).await {
            Ok(profile) => profile,
            Err(e) => {
                let e = match e {
                    HuddleError::ProfileLoad(_) => e,
                    other => HuddleError::ProfileLoad(other.to_string()),
                };
                tracing::warn!(user = %user.id, "continuing without profile: {e}");
                None
            }
        };

        tracing::info!(user = %user.id, has_profile = profile.is_some(), "session established");
        Ok(Self { provider, user, profile })
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    /// Profile name, else the local part of the e-mail address.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.profile.as_ref().and_then(|p| p.name.as_deref()) {
            if !name.trim().is_empty() {
                return name.trim().to_string();
            }
        }
        match self.user.email.split_once('@') {
            Some((local, _)) if !local.is_empty() => local.to_string(),
            _ => self.user.email.clone(),
        }
    }

    pub fn avatar_ref(&self) -> Option<String> {
        self.profile.as_ref().and_then(|p| p.avatar_url.clone())
    }

    pub fn local_participant(&self) -> Participant {
        let mut participant = Participant::new(self.user.id.clone(), self.display_name());
        participant.avatar_ref = self.avatar_ref();
        participant
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.provider.subscribe()
    }

    pub async fn sign_out(&self) -> Result<(), HuddleError> {
        self.provider.sign_out().await
    }
}

struct Account {
    password: String,
    user: User,
}

/// In-memory provider for offline use and tests.
pub struct LocalAuthProvider {
    accounts: Mutex<HashMap<String, Account>>,
    profiles: Mutex<HashMap<String, Profile>>,
    profile_error: Mutex<Option<String>>,
    current: watch::Sender<Option<User>>,
}

impl Default for LocalAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalAuthProvider {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            profiles: Mutex::new(HashMap::new()),
            profile_error: Mutex::new(None),
            current,
        }
    }

    pub fn set_profile(&self, user_id: &str, profile: Profile) {
        self.profiles
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(user_id.to_string(), profile);
    }

    /// Make every subsequent profile lookup fail with this message.
    pub fn fail_profile_lookups(&self, message: impl Into<String>) {
        *self.profile_error.lock().unwrap_or_else(|p| p.into_inner()) = Some(message.into());
    }
}

impl AuthProvider for LocalAuthProvider {
    fn current_user(&self) -> Option<User> {
        self.current.borrow().clone()
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<User, HuddleError>> {
        Box::pin(async move {
            let user = {
                let accounts = self.accounts.lock().unwrap_or_else(|p| p.into_inner());
                match accounts.get(&email.to_lowercase()) {
                    Some(account) if account.password == password => account.user.clone(),
                    _ => return Err(HuddleError::Auth("invalid email or password".into())),
                }
            };
            self.current.send_replace(Some(user.clone()));
            tracing::info!(user = %user.id, "signed in");
            Ok(user)
        })
    }

    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<User, HuddleError>> {
        Box::pin(async move {
            let email = email.trim().to_lowercase();
            if !email.contains('@') {
                return Err(HuddleError::ValidationRejected(format!("invalid email '{email}'")));
            }
            if password.len() < 6 {
                return Err(HuddleError::ValidationRejected(
                    "password must be at least 6 characters".into(),
                ));
            }
            let user = {
                let mut accounts = self.accounts.lock().unwrap_or_else(|p| p.into_inner());
                if accounts.contains_key(&email) {
                    return Err(HuddleError::Auth(format!("{email} is already registered")));
                }
                let user = User { id: Uuid::new_v4().to_string(), email: email.clone() };
                accounts.insert(
                    email,
                    Account { password: password.to_string(), user: user.clone() },
                );
                user
            };
            self.current.send_replace(Some(user.clone()));
            tracing::info!(user = %user.id, "signed up");
            Ok(user)
        })
    }

    fn sign_in_with_oauth(&self, provider: OAuthProvider) -> BoxFuture<'_, Result<(), HuddleError>> {
        Box::pin(async move {
            Err(HuddleError::Unsupported(format!(
                "{provider:?} sign-in needs a browser redirect"
            )))
        })
    }

    fn sign_out(&self) -> BoxFuture<'_, Result<(), HuddleError>> {
        Box::pin(async move {
            if let Some(user) = self.current.send_replace(None) {
                tracing::info!(user = %user.id, "signed out");
            }
            Ok(())
        })
    }

    fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.current.subscribe()
    }

    fn load_profile<'a>(
        &'a self,
        user_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Profile>, HuddleError>> {
        Box::pin(async move {
            if let Some(message) = self
                .profile_error
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .clone()
            {
                return Err(HuddleError::ProfileLoad(message));
            }
            Ok(self
                .profiles
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .get(user_id)
                .cloned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn establish_requires_signed_in_user() {
        let provider = Arc::new(LocalAuthProvider::new());
        let err = SessionContext::establish(provider).await.err().unwrap();
        assert!(matches!(err, HuddleError::Auth(_)));
    }

    #[tokio::test]
    async fn display_name_prefers_profile_then_email() {
        let provider = Arc::new(LocalAuthProvider::new());
        let user = provider.sign_up("Ada@Example.com", "secret1").await.unwrap();

        let ctx = SessionContext::establish(provider.clone()).await.unwrap();
        assert_eq!(ctx.display_name(), "ada");
        assert_eq!(ctx.user().email, "ada@example.com");

        provider.set_profile(
            &user.id,
            Profile { name: Some("Ada Lovelace".into()), avatar_url: Some("ada.png".into()) },
        );
        let ctx = SessionContext::establish(provider).await.unwrap();
        assert_eq!(ctx.display_name(), "Ada Lovelace");
        let local = ctx.local_participant();
        assert_eq!(local.id, user.id);
        assert_eq!(local.avatar_ref.as_deref(), Some("ada.png"));
    }

    #[tokio::test]
    async fn missing_profile_does_not_block_session() {
        let provider = Arc::new(LocalAuthProvider::new());
        provider.sign_up("bob@example.com", "secret1").await.unwrap();
        provider.fail_profile_lookups("profiles table unreachable");

        let ctx = SessionContext::establish(provider).await.unwrap();
        assert!(ctx.profile().is_none());
        assert_eq!(ctx.display_name(), "bob");
    }

    #[tokio::test]
    async fn sign_in_and_out_publish_session_changes() {
        let provider = Arc::new(LocalAuthProvider::new());
        let mut changes = provider.subscribe();
        provider.sign_up("eve@example.com", "secret1").await.unwrap();
        provider.sign_out().await.unwrap();
        assert!(provider.current_user().is_none());

        assert!(provider.sign_in("eve@example.com", "wrong").await.is_err());
        let user = provider.sign_in("eve@example.com", "secret1").await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(changes.borrow().as_ref(), Some(&user));
    }

    #[tokio::test]
    async fn sign_up_validates_input() {
        let provider = LocalAuthProvider::new();
        assert!(provider.sign_up("nope", "secret1").await.is_err());
        assert!(provider.sign_up("a@b.c", "123").await.is_err());
        provider.sign_up("a@b.c", "secret1").await.unwrap();
        assert!(provider.sign_up("A@B.C", "secret1").await.is_err());
        assert!(provider.sign_in_with_oauth(OAuthProvider::Github).await.is_err());
    }
}
