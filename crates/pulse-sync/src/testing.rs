use jsonwebtoken::{EncodingKey, Header, encode};
use pulse_db::SqliteStore;
use pulse_types::api::TokenClaims;
use pulse_types::models::User;

use crate::directory::Directory;
use crate::identity::IdentityResolver;
use crate::session::Session;

pub(crate) fn store() -> SqliteStore {
    SqliteStore::in_memory().unwrap()
}

pub(crate) fn claims(subject: &str) -> TokenClaims {
    TokenClaims {
        sub: subject.to_string(),
        exp: Some(4_102_444_800),
        email: None,
    }
}

/// A provider-signed JWT; the sync layer never checks the signature.
pub(crate) fn token_for(subject: &str) -> String {
    encode(
        &Header::default(),
        &claims(subject),
        &EncodingKey::from_secret(b"provider-secret"),
    )
    .unwrap()
}

pub(crate) async fn provision(store: &SqliteStore, subject: &str, username: &str) -> User {
    Directory::new(store.clone())
        .register(&claims(subject), username, "")
        .await
        .unwrap()
}

pub(crate) async fn session_for(store: &SqliteStore, subject: &str) -> Session {
    let mut session = Session::issued(token_for(subject));
    IdentityResolver::new(store.clone())
        .validate(&mut session)
        .await
        .unwrap();
    session
}
