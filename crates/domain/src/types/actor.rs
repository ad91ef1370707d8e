//! Session identity types
//!
//! An [`Actor`] is whoever is currently using the client. Only the
//! authenticator creates authenticated actors and only the actor provider
//! holds them.

use std::fmt;

use crate::errors::{PelagicError, Result};

/// Current session identity.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Actor {
    /// No credentials are known.
    #[default]
    Unauthenticated,
    /// Credentials obtained through a successful token exchange.
    Authenticated(AuthenticatedActor),
}

impl Actor {
    /// Build an authenticated actor, enforcing a non-empty access token.
    pub fn authenticated(id: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        AuthenticatedActor::new(id, access_token).map(Self::Authenticated)
    }

    /// Whether the actor carries credentials.
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// Borrow the credentials, if any.
    pub const fn as_authenticated(&self) -> Option<&AuthenticatedActor> {
        match self {
            Self::Authenticated(actor) => Some(actor),
            Self::Unauthenticated => None,
        }
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("Unauthenticated"),
            Self::Authenticated(actor) => f.debug_tuple("Authenticated").field(actor).finish(),
        }
    }
}

/// Credentials of an authenticated actor.
///
/// The access token is never empty; construction goes through [`Self::new`].
#[derive(Clone, PartialEq, Eq)]
pub struct AuthenticatedActor {
    id: String,
    access_token: String,
}

impl AuthenticatedActor {
    /// Create credentials for the account `id`.
    ///
    /// # Errors
    ///
    /// Returns `PelagicError::InvalidInput` if `access_token` is empty.
    pub fn new(id: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(PelagicError::InvalidInput(
                "authenticated actor requires a non-empty access token".into(),
            ));
        }

        Ok(Self { id: id.into(), access_token })
    }

    /// Account id reported by the server.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw access token. Keep out of logs.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for AuthenticatedActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedActor")
            .field("id", &self.id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// One-time code proving user consent.
///
/// Consumed by the token exchange as soon as it is received.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationGrant(String);

impl AuthorizationGrant {
    /// Wrap the `code` query parameter of an authorization redirect.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// The authorization code as received.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Consume the grant, yielding the code for the token request.
    pub fn into_code(self) -> String {
        self.0
    }
}

impl fmt::Debug for AuthorizationGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationGrant(<redacted>)")
    }
}
