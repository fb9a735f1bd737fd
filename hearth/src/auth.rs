//! Authentication seam.
//!
//! Only the identity the providers hand back matters here; the OAuth exchange itself happens
//! elsewhere. [`ensure_profile`] turns a first sign-in into a `users/{uid}` document.

use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Arc, Mutex, PoisonError},
};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::{
    errors::StoreError,
    id::generate_document_id,
    model::User,
    store::{DocumentStore, DocumentStoreExt},
    validators::{is_valid_email, is_valid_url},
};

const ANONYMOUS_NAME: &str = "Anonymous";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityProvider {
    Google,
    Github,
    Facebook,
}

impl IdentityProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityProvider::Google => "google.com",
            IdentityProvider::Github => "github.com",
            IdentityProvider::Facebook => "facebook.com",
        }
    }
}

impl fmt::Display for IdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityProvider {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "google" | "google.com" => Ok(IdentityProvider::Google),
            "github" | "github.com" => Ok(IdentityProvider::Github),
            "facebook" | "facebook.com" => Ok(IdentityProvider::Facebook),
            other => Err(StoreError::invalid(format!("unknown identity provider '{other}'"))),
        }
    }
}

/// What a provider reports about the account that signed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderProfile {
    /// The account id at the provider.
    pub subject: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

impl ProviderProfile {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

/// The signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub provider: IdentityProvider,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

#[allow(async_fn_in_trait)]
pub trait AuthService {
    async fn sign_in(&self, provider: IdentityProvider, profile: ProviderProfile) -> Result<AuthUser, StoreError>;

    async fn sign_out(&self) -> Result<(), StoreError>;

    fn current_user(&self) -> Option<AuthUser>;

    /// Receiver that observes every identity change, starting with the current one.
    fn watch(&self) -> watch::Receiver<Option<AuthUser>>;
}

/// In-process authentication: each `(provider, subject)` pair maps to one stable uid.
#[derive(Clone)]
pub struct MemoryAuth {
    inner: Arc<AuthState>,
}

struct AuthState {
    accounts: Mutex<HashMap<(IdentityProvider, String), String>>,
    current: watch::Sender<Option<AuthUser>>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            inner: Arc::new(AuthState {
                accounts: Mutex::new(HashMap::new()),
                current,
            }),
        }
    }
}

impl AuthService for MemoryAuth {
    async fn sign_in(&self, provider: IdentityProvider, profile: ProviderProfile) -> Result<AuthUser, StoreError> {
        if profile.subject.trim().is_empty() {
            return Err(StoreError::invalid("provider profile has no subject"));
        }
        let uid = self
            .inner
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((provider, profile.subject.clone()))
            .or_insert_with(generate_document_id)
            .clone();

        let user = AuthUser {
            uid,
            provider,
            display_name: profile.display_name,
            email: profile.email,
            photo_url: profile.photo_url,
        };
        log::debug!("auth: {} signed in with {provider}", user.uid);
        self.inner.current.send_replace(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        if let Some(previous) = self.inner.current.send_replace(None) {
            log::debug!("auth: {} signed out", previous.uid);
        }
        Ok(())
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.inner.current.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<AuthUser>> {
        self.inner.current.subscribe()
    }
}

/// Returns the user's profile document, creating it on first sign-in.
///
/// An existing profile is returned untouched. Provider fields that fail validation are left
/// out of a new profile rather than blocking sign-in.
pub async fn ensure_profile<S>(store: &S, auth_user: &AuthUser) -> Result<User, StoreError>
where
    S: DocumentStore + ?Sized,
{
    if let Some(existing) = store.get_document::<User>(&auth_user.uid).await? {
        return Ok(existing);
    }

    let display_name = auth_user
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(ANONYMOUS_NAME);
    let mut user = User::new(&auth_user.uid, display_name);
    user.email = auth_user.email.clone().filter(|email| is_valid_email(email));
    user.photo_url = auth_user.photo_url.clone().filter(|url| is_valid_url(url));
    user.validate()?;

    match store.create_document(&user).await {
        Ok(_) => {
            log::debug!("auth: created profile for {}", user.uid);
            Ok(user)
        }
        // Another session created it first.
        Err(StoreError::AlreadyExists { .. }) => store.require_document::<User>(&auth_user.uid).await,
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn same_account_keeps_its_uid() {
        let auth = MemoryAuth::new();
        let first = auth
            .sign_in(IdentityProvider::Github, ProviderProfile::new("octo"))
            .await
            .unwrap();
        auth.sign_out().await.unwrap();
        assert!(auth.current_user().is_none());

        let again = auth
            .sign_in(IdentityProvider::Github, ProviderProfile::new("octo"))
            .await
            .unwrap();
        let other = auth
            .sign_in(IdentityProvider::Google, ProviderProfile::new("octo"))
            .await
            .unwrap();
        assert_eq!(first.uid, again.uid);
        assert_ne!(first.uid, other.uid);
    }

    #[tokio::test]
    async fn watch_observes_sign_in_and_out() {
        let auth = MemoryAuth::new();
        let mut rx = auth.watch();
        assert!(rx.borrow_and_update().is_none());

        auth.sign_in(IdentityProvider::Google, ProviderProfile::new("g-1"))
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_some());

        auth.sign_out().await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[tokio::test]
    async fn profile_is_created_once() {
        let store = MemoryStore::new();
        let auth = MemoryAuth::new();
        let user = auth
            .sign_in(
                IdentityProvider::Facebook,
                ProviderProfile::new("fb-1")
                    .display_name("Ann")
                    .email("not-an-email")
                    .photo_url("https://cdn.example.com/ann.png"),
            )
            .await
            .unwrap();

        let created = ensure_profile(&store, &user).await.unwrap();
        assert_eq!(created.display_name, "Ann");
        assert_eq!(created.email, None);

        let mut renamed = user.clone();
        renamed.display_name = Some("Someone else".into());
        let existing = ensure_profile(&store, &renamed).await.unwrap();
        assert_eq!(existing, created);
    }

    #[test]
    fn providers_parse_from_short_and_domain_names() {
        assert_eq!("GitHub".parse::<IdentityProvider>().unwrap(), IdentityProvider::Github);
        assert_eq!("google.com".parse::<IdentityProvider>().unwrap(), IdentityProvider::Google);
        assert!("myspace".parse::<IdentityProvider>().is_err());
    }
}
