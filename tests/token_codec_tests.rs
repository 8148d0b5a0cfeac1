mod common;

use chrono::{Duration, TimeZone, Utc};
use common::subject;
use rolegate::{
    error::TokenError,
    salt::{SaltPair, SaltStore, SaltStoreState},
    token::{TokenCodec, TokenKind},
};
use std::sync::Arc;

fn pair(current: &str, previous: &str) -> SaltPair {
    SaltPair {
        current: current.to_string(),
        previous: previous.to_string(),
        rotated_at: Utc::now(),
    }
}

fn codec_with(store: SaltStoreState) -> TokenCodec {
    TokenCodec::new(store, Duration::minutes(30), Duration::minutes(180))
}

#[test]
fn test_access_token_expires_exactly_at_ttl() {
    let store = Arc::new(SaltStore::new(pair("s1", "s0")));
    let codec = codec_with(store);
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    let token = codec.issue(&subject(&["Editor"]), TokenKind::Access, t0).unwrap();

    let just_before = t0 + Duration::minutes(30) - Duration::seconds(1);
    let claims = codec.verify_at(&token, TokenKind::Access, just_before).unwrap();
    assert_eq!(claims.iat, t0.timestamp());
    assert_eq!(claims.exp, (t0 + Duration::minutes(30)).timestamp());

    let at_expiry = t0 + Duration::minutes(30);
    assert_eq!(
        codec.verify_at(&token, TokenKind::Access, at_expiry),
        Err(TokenError::Expired)
    );
}

#[test]
fn test_sub_second_issue_instant_is_truncated() {
    let store = Arc::new(SaltStore::new(pair("s1", "s0")));
    let codec = codec_with(store);
    let t0 = Utc.timestamp_opt(1_700_000_000, 700_000_000).unwrap();

    let token = codec.issue(&subject(&["Editor"]), TokenKind::Access, t0).unwrap();
    let claims = codec.verify_at(&token, TokenKind::Access, t0).unwrap();
    assert_eq!(claims.iat, 1_700_000_000);
    assert_eq!(claims.exp, claims.iat + Duration::minutes(30).num_seconds());

    let window_end = Utc.timestamp_opt(claims.exp, 0).unwrap();
    assert!(
        codec
            .verify_at(&token, TokenKind::Access, window_end - Duration::milliseconds(1))
            .is_ok()
    );
    assert_eq!(
        codec.verify_at(&token, TokenKind::Access, window_end),
        Err(TokenError::Expired)
    );
}

#[test]
fn test_refresh_token_uses_refresh_ttl() {
    let store = Arc::new(SaltStore::new(pair("s1", "s0")));
    let codec = codec_with(store);
    let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

    let token = codec.issue(&subject(&[]), TokenKind::Refresh, t0).unwrap();

    // Still good long after an access token would have lapsed.
    assert!(
        codec
            .verify_at(&token, TokenKind::Refresh, t0 + Duration::minutes(179))
            .is_ok()
    );
    assert_eq!(
        codec.verify_at(&token, TokenKind::Refresh, t0 + Duration::minutes(180)),
        Err(TokenError::Expired)
    );
}

#[test]
fn test_claims_carry_subject() {
    let store = Arc::new(SaltStore::new(pair("s1", "s0")));
    let codec = codec_with(store);
    let subject = subject(&["Editor", "Viewer"]);

    let token = codec.issue(&subject, TokenKind::Access, Utc::now()).unwrap();
    let claims = codec.verify(&token, TokenKind::Access).unwrap();

    assert_eq!(claims.email, subject.email);
    assert_eq!(claims.user_id, subject.user_id);
    assert_eq!(claims.user_uuid, subject.user_uuid);
    assert_eq!(claims.roles, vec!["Editor", "Viewer"]);
    assert_eq!(claims.kind, TokenKind::Access);
}

#[test]
fn test_token_survives_one_rotation_but_not_two() {
    let store = Arc::new(SaltStore::new(pair("s1", "s0")));
    let codec = codec_with(store.clone());
    let now = Utc::now();

    let token = codec.issue(&subject(&["Editor"]), TokenKind::Access, now).unwrap();

    store.install(pair("s2", "s1"));
    assert!(codec.verify_at(&token, TokenKind::Access, now).is_ok());

    store.install(pair("s3", "s2"));
    assert_eq!(
        codec.verify_at(&token, TokenKind::Access, now),
        Err(TokenError::SignatureInvalid)
    );
}

#[test]
fn test_new_tokens_are_signed_with_current_secret() {
    let store = Arc::new(SaltStore::new(pair("s1", "s0")));
    let codec = codec_with(store.clone());
    let now = Utc::now();

    store.install(pair("s2", "s1"));
    let token = codec.issue(&subject(&[]), TokenKind::Access, now).unwrap();

    // A verifier that only knows the old secrets must reject it.
    let stale = codec_with(Arc::new(SaltStore::new(pair("s1", "s0"))));
    assert_eq!(
        stale.verify_at(&token, TokenKind::Access, now),
        Err(TokenError::SignatureInvalid)
    );
    assert!(codec.verify_at(&token, TokenKind::Access, now).is_ok());
}

#[test]
fn test_kind_mismatch_is_rejected() {
    let store = Arc::new(SaltStore::new(pair("s1", "s0")));
    let codec = codec_with(store);
    let now = Utc::now();
    let tokens = codec.issue_pair(&subject(&["Editor"]), now).unwrap();

    assert_eq!(
        codec.verify_at(&tokens.refresh_token, TokenKind::Access, now),
        Err(TokenError::KindMismatch {
            expected: TokenKind::Access,
            found: TokenKind::Refresh,
        })
    );
    assert_eq!(
        codec.verify_at(&tokens.access_token, TokenKind::Refresh, now),
        Err(TokenError::KindMismatch {
            expected: TokenKind::Refresh,
            found: TokenKind::Access,
        })
    );
}

#[test]
fn test_decode_any_accepts_both_kinds() {
    let store = Arc::new(SaltStore::new(pair("s1", "s0")));
    let codec = codec_with(store);
    let now = Utc::now();
    let tokens = codec.issue_pair(&subject(&[]), now).unwrap();

    let access = codec.decode_any_at(&tokens.access_token, now).unwrap();
    let refresh = codec.decode_any_at(&tokens.refresh_token, now).unwrap();
    assert_eq!(access.kind, TokenKind::Access);
    assert_eq!(refresh.kind, TokenKind::Refresh);
    assert!(refresh.exp > access.exp);
}

#[test]
fn test_malformed_and_foreign_tokens() {
    let store = Arc::new(SaltStore::new(pair("s1", "s0")));
    let codec = codec_with(store);
    let now = Utc::now();

    assert_eq!(
        codec.verify_at("not-a-token", TokenKind::Access, now),
        Err(TokenError::Malformed)
    );
    assert_eq!(
        codec.verify_at("", TokenKind::Access, now),
        Err(TokenError::Malformed)
    );

    let foreign = codec_with(Arc::new(SaltStore::new(pair("x1", "x0"))))
        .issue(&subject(&[]), TokenKind::Access, now)
        .unwrap();
    assert_eq!(
        codec.verify_at(&foreign, TokenKind::Access, now),
        Err(TokenError::SignatureInvalid)
    );
}
