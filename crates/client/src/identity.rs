//! Identity seam for the chat client.
//!
//! The real application authenticates against an external identity provider
//! that hands out an opaque, refreshable bearer token. The client only needs
//! the trait below; anything (including tests) can stand in for the provider.
//! When no authenticated user is available the chat still works under an
//! ephemeral guest identity, regenerated each session and never persisted.

use std::sync::Arc;

use async_trait::async_trait;
use blogchat_shared::ChatUser;
use rand::Rng;

use crate::log_warn;
use crate::socket::TokenProvider;

/// The authenticated user as the identity provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// External identity provider: current user plus a refreshable bearer token.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait IdentityProvider {
    /// The currently signed-in user, or `None` when unauthenticated.
    async fn current_user(&self) -> Option<AuthUser>;

    /// A fresh bearer token for the current user. `Ok(None)` when signed out.
    async fn id_token(&self) -> anyhow::Result<Option<String>>;
}

const GUEST_ADJECTIVES: &[&str] = &[
    "brisk", "calm", "deft", "eager", "keen", "merry", "quiet", "swift", "warm", "witty",
];

const GUEST_ANIMALS: &[&str] = &[
    "heron", "lynx", "marmot", "otter", "panda", "raven", "seal", "tapir", "vole", "wren",
];

/// Synthesize an ephemeral guest identity with a random display name.
pub fn guest_user() -> ChatUser {
    let mut rng = rand::thread_rng();
    let adjective = GUEST_ADJECTIVES[rng.gen_range(0..GUEST_ADJECTIVES.len())];
    let animal = GUEST_ANIMALS[rng.gen_range(0..GUEST_ANIMALS.len())];
    let tag: u16 = rng.gen_range(100..1000);
    ChatUser {
        uid: format!("guest-{}", uuid::Uuid::new_v4().simple()),
        username: format!("{}-{}-{}", adjective, animal, tag),
    }
}

/// The chat identity for this session: the authenticated user when there is
/// one (display name, then email, as the visible name), otherwise a guest.
pub async fn resolve_chat_user<P: IdentityProvider>(provider: &P) -> ChatUser {
    match provider.current_user().await {
        Some(user) => {
            let username = user
                .display_name
                .or(user.email)
                .unwrap_or_else(|| user.uid.clone());
            ChatUser::new(user.uid, username)
        }
        None => guest_user(),
    }
}

/// Adapt an identity provider into the token provider the connection wants.
/// A failed token fetch degrades to an unauthenticated connection attempt.
#[cfg(not(target_arch = "wasm32"))]
pub fn token_provider<P>(provider: Arc<P>) -> TokenProvider
where
    P: IdentityProvider + Send + Sync + 'static,
{
    Arc::new(move || {
        let provider = Arc::clone(&provider);
        Box::pin(async move {
            match provider.id_token().await {
                Ok(token) => token,
                Err(err) => {
                    log_warn!("failed to get id token for socket auth: {}", err);
                    None
                }
            }
        })
    })
}

#[cfg(target_arch = "wasm32")]
pub fn token_provider<P>(provider: Arc<P>) -> TokenProvider
where
    P: IdentityProvider + 'static,
{
    Arc::new(move || {
        let provider = Arc::clone(&provider);
        Box::pin(async move {
            match provider.id_token().await {
                Ok(token) => token,
                Err(err) => {
                    log_warn!("failed to get id token for socket auth: {}", err);
                    None
                }
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeProvider {
        user: Option<AuthUser>,
        token: anyhow::Result<Option<String>>,
    }

    #[async_trait]
    impl IdentityProvider for FakeProvider {
        async fn current_user(&self) -> Option<AuthUser> {
            self.user.clone()
        }

        async fn id_token(&self) -> anyhow::Result<Option<String>> {
            match &self.token {
                Ok(token) => Ok(token.clone()),
                Err(err) => Err(anyhow::anyhow!("{}", err)),
            }
        }
    }

    #[tokio::test]
    async fn authenticated_user_prefers_display_name_then_email() {
        let provider = FakeProvider {
            user: Some(AuthUser {
                uid: "u1".into(),
                display_name: None,
                email: Some("ann@example.com".into()),
            }),
            token: Ok(None),
        };
        let user = resolve_chat_user(&provider).await;
        assert_eq!(user, ChatUser::new("u1", "ann@example.com"));
    }

    #[tokio::test]
    async fn signed_out_session_gets_a_guest_identity() {
        let provider = FakeProvider {
            user: None,
            token: Ok(None),
        };
        let user = resolve_chat_user(&provider).await;
        assert!(user.uid.starts_with("guest-"));
        assert!(!user.username.is_empty());
    }

    #[tokio::test]
    async fn token_fetch_failure_degrades_to_unauthenticated() {
        let provider = Arc::new(FakeProvider {
            user: None,
            token: Err(anyhow::anyhow!("identity backend down")),
        });
        let tokens = token_provider(provider);
        assert_eq!(tokens().await, None);
    }

    #[test]
    fn guest_identities_are_distinct_per_session() {
        let a = guest_user();
        let b = guest_user();
        assert_ne!(a.uid, b.uid);
    }
}
