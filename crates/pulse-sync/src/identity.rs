use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use pulse_db::RealtimeStore;
use pulse_types::api::TokenClaims;
use pulse_types::models::User;
use tracing::{debug, warn};

use crate::directory::Directory;
use crate::error::{Result, SyncError};
use crate::session::{Actor, Session};

/// Read the claims of a `header.payload.signature` token.
///
/// The signature is not checked: tokens reach this layer only after the auth
/// provider accepted them.
pub fn decode_claims(token: &str) -> Result<TokenClaims> {
    let token = token.trim();
    if token.is_empty() {
        return Err(SyncError::MalformedToken("token is empty".into()));
    }

    let segments: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = segments.as_slice() else {
        return Err(SyncError::MalformedToken(format!(
            "expected 3 dot-separated segments, found {}",
            segments.len()
        )));
    };

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .map_err(|e| SyncError::MalformedToken(format!("payload is not base64url: {}", e)))?;

    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| SyncError::MalformedToken(format!("payload is not a claims object: {}", e)))?;

    if claims.sub.trim().is_empty() {
        return Err(SyncError::MalformedToken("subject is empty".into()));
    }
    // The subject keys reaction sets and room ids, so it has to be a usable key
    pulse_db::path::check_segment(&claims.sub)
        .map_err(|_| SyncError::MalformedToken(format!("subject {:?} is not a valid key", claims.sub)))?;
    Ok(claims)
}

/// Maps a session token to the user record provisioned for its subject.
#[derive(Clone)]
pub struct IdentityResolver<S> {
    directory: Directory<S>,
}

impl<S: RealtimeStore> IdentityResolver<S> {
    pub fn new(store: S) -> Self {
        Self {
            directory: Directory::new(store),
        }
    }

    /// Read-only. `UserNotFound` means the subject is not provisioned yet.
    pub async fn resolve(&self, token: &str) -> Result<User> {
        let claims = decode_claims(token)?;
        match self.directory.find_by_id(&claims.sub).await? {
            Some(user) => {
                debug!("Resolved subject {} to user key {}", claims.sub, user.key);
                Ok(user)
            }
            None => {
                warn!("Subject {} has no user record yet", claims.sub);
                Err(SyncError::UserNotFound(claims.sub))
            }
        }
    }

    /// Resolve the session's token and move the session to `Validated`.
    pub async fn validate<'s>(&self, session: &'s mut Session) -> Result<&'s Actor> {
        if session.is_revoked() {
            return Err(SyncError::SessionRevoked);
        }
        let user = self.resolve(session.token()).await?;
        session.validate(Actor::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{provision, store, token_for};

    fn token_with_payload(payload: &str) -> String {
        format!("eyJhbGciOiJIUzI1NiJ9.{}.c2ln", URL_SAFE_NO_PAD.encode(payload))
    }

    #[test]
    fn test_decodes_real_jwt() {
        let claims = decode_claims(&token_for("uid-1")).unwrap();
        assert_eq!(claims.sub, "uid-1");
    }

    #[test]
    fn test_accepts_padded_payload() {
        let padded = format!(
            "h.{}.s",
            base64::engine::general_purpose::URL_SAFE.encode(r#"{"sub":"u"}"#)
        );
        assert_eq!(decode_claims(&padded).unwrap().sub, "u");
    }

    #[test]
    fn test_malformed_tokens() {
        let cases = [
            String::new(),
            "   ".to_string(),
            "no-dots".to_string(),
            "a.b".to_string(),
            "a.b.c.d".to_string(),
            "a.!!!not-base64!!!.c".to_string(),
            token_with_payload("this is not json"),
            token_with_payload("42"),
            token_with_payload(r#"{"name":"no subject"}"#),
            token_with_payload(r#"{"sub":""}"#),
            token_with_payload(r#"{"sub":42}"#),
        ];
        for token in cases {
            assert!(
                matches!(decode_claims(&token), Err(SyncError::MalformedToken(_))),
                "token {:?} should be malformed",
                token
            );
        }
    }

    #[test]
    fn test_subject_must_be_a_valid_key() {
        for sub in ["a.b", "a/b", "uid#1", "[x]", "$me"] {
            let token = token_with_payload(&format!(r#"{{"sub":"{}"}}"#, sub));
            assert!(
                matches!(decode_claims(&token), Err(SyncError::MalformedToken(_))),
                "subject {:?} should be rejected",
                sub
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_finds_user_and_key() {
        let store = store();
        provision(&store, "uid-0", "Zoe").await;
        let alice = provision(&store, "uid-1", "alice").await;

        let resolver = IdentityResolver::new(store);
        let user = resolver.resolve(&token_for("uid-1")).await.unwrap();
        assert_eq!(user, alice);
        assert!(!user.key.is_empty());
        assert_ne!(user.key, user.id);
    }

    #[tokio::test]
    async fn test_unprovisioned_subject_is_recoverable() {
        let resolver = IdentityResolver::new(store());
        let err = resolver.resolve(&token_for("uid-9")).await.unwrap_err();
        assert!(matches!(err, SyncError::UserNotFound(sub) if sub == "uid-9"));
    }

    #[tokio::test]
    async fn test_validate_session() {
        let store = store();
        provision(&store, "uid-1", "alice").await;
        let resolver = IdentityResolver::new(store);

        let mut session = Session::issued(token_for("uid-1"));
        let actor = resolver.validate(&mut session).await.unwrap();
        assert_eq!(actor.username, "alice");

        session.revoke();
        assert!(matches!(resolver.validate(&mut session).await, Err(SyncError::SessionRevoked)));
    }
}
