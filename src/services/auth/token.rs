use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{error, warn};

use crate::services::auth::error::{AuthError, TokenConfigError, TokenError, TokenErrorKind};
use crate::services::auth::principal::Principal;

// HS512 keys shorter than the hash output are accepted, but weak.
const RECOMMENDED_SECRET_BYTES: usize = 64;

/// Longest accepted token lifetime (`i32::MAX` milliseconds, about 24.8 days).
pub const MAX_LIFETIME_MS: i64 = i32::MAX as i64;

/// RFC 7519 NumericDate: seconds since the epoch, carried with millisecond precision.
///
/// Whole seconds serialize as integers, anything else as a fractional number
/// (`1700000000.25`), so standard tooling can still read `iat`/`exp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct NumericDate(i64);

impl NumericDate {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.timestamp_millis())
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }
}

impl Serialize for NumericDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.rem_euclid(1000) == 0 {
            serializer.serialize_i64(self.0.div_euclid(1000))
        } else {
            serializer.serialize_f64(self.0 as f64 / 1000.0)
        }
    }
}

impl<'de> Deserialize<'de> for NumericDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        if !seconds.is_finite() {
            return Err(serde::de::Error::custom("NumericDate must be finite"));
        }
        Ok(Self((seconds * 1000.0).round() as i64))
    }
}

#[derive(Debug, Serialize)]
struct IssuedClaims<'a> {
    sub: &'a str,
    iat: NumericDate,
    exp: NumericDate,
}

/// Claims as read back from a token. Every field is optional here so that an
/// empty payload is reported as such instead of as a JSON error.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub iat: Option<NumericDate>,
    #[serde(default)]
    pub exp: Option<NumericDate>,
}

/// Result of a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedToken {
    pub username: String,
    pub issued_at: Option<NumericDate>,
    pub expires_at: NumericDate,
}

/// Issues and verifies HS512 bearer tokens with a shared secret.
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetime: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("TokenService")
            .field("validation", &self.validation)
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl TokenService {
    pub fn new(secret: &str, lifetime_ms: i64) -> Result<Self, TokenConfigError> {
        if secret.is_empty() {
            return Err(TokenConfigError::EmptySecret);
        }
        if !(1..=MAX_LIFETIME_MS).contains(&lifetime_ms) {
            return Err(TokenConfigError::LifetimeOutOfRange {
                got: lifetime_ms,
                max: MAX_LIFETIME_MS,
            });
        }
        if secret.len() < RECOMMENDED_SECRET_BYTES {
            warn!(
                secret_len = secret.len(),
                recommended = RECOMMENDED_SECRET_BYTES,
                "token secret is shorter than recommended for HS512"
            );
        }

        let mut validation = Validation::new(Algorithm::HS512);
        // `exp` is checked in `verify_at` at millisecond precision, without leeway.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.required_spec_claims.clear();

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            lifetime: Duration::milliseconds(lifetime_ms),
        })
    }

    /// Issue a token for an authenticated principal.
    pub fn issue(&self, principal: &Principal) -> Result<String, AuthError> {
        self.issue_for_username(&principal.username)
    }

    /// Same as `issue` when only the username is at hand.
    pub fn issue_for_username(&self, username: &str) -> Result<String, AuthError> {
        self.issue_at(username, Utc::now())
    }

    pub fn issue_at(&self, username: &str, now: DateTime<Utc>) -> Result<String, AuthError> {
        // A token without a subject would never verify; refuse to mint it.
        if username.trim().is_empty() {
            return Err(
                TokenError::new(TokenErrorKind::ClaimsEmpty, "subject must not be empty").into(),
            );
        }

        let iat = NumericDate::from_datetime(now);
        let expires = now
            .checked_add_signed(self.lifetime)
            .ok_or(AuthError::ExpiryOutOfRange)?;
        let exp = NumericDate::from_datetime(expires);
        let claims = IssuedClaims {
            sub: username,
            iat,
            exp,
        };

        let mut header = Header::new(Algorithm::HS512);
        header.typ = Some("JWT".to_string());
        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "failed to sign JWT");
            AuthError::Signing(e.to_string())
        })
    }

    /// Verify the token and return its subject.
    pub fn extract_username(&self, token: &str) -> Result<String, TokenError> {
        self.verify(token).map(|verified| verified.username)
    }

    /// Verify the token, logging the failure cause. Never propagates the error.
    pub fn validate(&self, token: &str) -> bool {
        match self.verify(token) {
            Ok(_) => true,
            Err(err) => {
                log_rejection(&err);
                false
            }
        }
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedToken, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify signature, structure and claims as of `now`.
    ///
    /// A token is valid while `now < exp`; at exactly `exp` it has expired.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<VerifiedToken, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::new(
                TokenErrorKind::ClaimsEmpty,
                "token string is empty",
            ));
        }

        let segments = token.split('.').count();
        if segments != 3 {
            return Err(TokenError::new(
                TokenErrorKind::Malformed,
                format!("expected 3 segments, found {segments}"),
            ));
        }
        if token.ends_with('.') {
            return Err(TokenError::new(
                TokenErrorKind::Unsupported,
                "unsigned tokens are not accepted",
            ));
        }

        // Header and payload must be valid base64url; after this, a base64
        // failure inside `decode` can only come from the signature segment.
        for (name, segment) in ["header", "payload"].into_iter().zip(token.split('.')) {
            URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
                TokenError::new(
                    TokenErrorKind::Malformed,
                    format!("{name} is not base64url: {e}"),
                )
            })?;
        }

        let data = jsonwebtoken::decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(classify)?;
        let claims = data.claims;

        let expires_at = claims
            .exp
            .ok_or_else(|| TokenError::new(TokenErrorKind::ClaimsEmpty, "missing 'exp' claim"))?;

        if now.timestamp_millis() >= expires_at.millis() {
            let at = expires_at
                .to_datetime()
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| expires_at.millis().to_string());
            return Err(TokenError::new(
                TokenErrorKind::Expired,
                format!("token expired at {at}"),
            ));
        }

        let username = claims
            .sub
            .filter(|sub| !sub.trim().is_empty())
            .ok_or_else(|| TokenError::new(TokenErrorKind::ClaimsEmpty, "empty 'sub' claim"))?;

        Ok(VerifiedToken {
            username,
            issued_at: claims.iat,
            expires_at,
        })
    }
}

fn classify(e: jsonwebtoken::errors::Error) -> TokenError {
    let kind = match e.kind() {
        // Header and payload were decoded already, so base64 errors are the signature's.
        ErrorKind::InvalidSignature | ErrorKind::Base64(_) => TokenErrorKind::SignatureInvalid,
        ErrorKind::ExpiredSignature => TokenErrorKind::Expired,
        ErrorKind::InvalidAlgorithm
        | ErrorKind::InvalidAlgorithmName
        | ErrorKind::MissingAlgorithm
        | ErrorKind::InvalidKeyFormat => TokenErrorKind::Unsupported,
        ErrorKind::MissingRequiredClaim(_) => TokenErrorKind::ClaimsEmpty,
        // InvalidToken, Json, Utf8 and anything newer
        _ => TokenErrorKind::Malformed,
    };

    TokenError::new(kind, e.to_string())
}

fn log_rejection(err: &TokenError) {
    let kind = err.kind;
    let reason = err.message.as_str();
    match kind {
        TokenErrorKind::SignatureInvalid => {
            error!(%kind, reason, "invalid token signature")
        }
        TokenErrorKind::Malformed => error!(%kind, reason, "malformed token"),
        TokenErrorKind::Expired => error!(%kind, reason, "token is expired"),
        TokenErrorKind::Unsupported => error!(%kind, reason, "token is unsupported"),
        TokenErrorKind::ClaimsEmpty => error!(%kind, reason, "token claims are empty"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "s3cr3t";

    fn service(lifetime_ms: i64) -> TokenService {
        TokenService::new(SECRET, lifetime_ms).unwrap()
    }

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_123).unwrap()
    }

    fn kind_of(svc: &TokenService, token: &str) -> TokenErrorKind {
        svc.verify_at(token, t0()).unwrap_err().kind
    }

    fn signed_with(alg: Algorithm, claims: serde_json::Value) -> String {
        jsonwebtoken::encode(
            &Header::new(alg),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn principal(username: &str) -> Principal {
        Principal {
            id: 1,
            username: username.to_string(),
            password_hash: "h".to_string(),
            authorities: vec!["ROLE_USER".to_string()],
        }
    }

    #[test]
    fn rejects_bad_construction() {
        assert_eq!(
            TokenService::new("", 1000).unwrap_err(),
            TokenConfigError::EmptySecret
        );
        for lifetime_ms in [0, -5, MAX_LIFETIME_MS + 1, i64::MAX] {
            assert!(
                matches!(
                    TokenService::new(SECRET, lifetime_ms),
                    Err(TokenConfigError::LifetimeOutOfRange { got, .. }) if got == lifetime_ms
                ),
                "lifetime {lifetime_ms}"
            );
        }
    }

    #[test]
    fn longest_lifetime_issues_and_verifies() {
        let svc = service(MAX_LIFETIME_MS);
        let token = svc.issue_for_username("alice").unwrap();

        assert_eq!(svc.extract_username(&token).unwrap(), "alice");
    }

    #[test]
    fn expiry_past_the_calendar_is_an_error() {
        let svc = service(MAX_LIFETIME_MS);
        let err = svc.issue_at("alice", DateTime::<Utc>::MAX_UTC).unwrap_err();

        assert!(matches!(err, AuthError::ExpiryOutOfRange));
    }

    #[test]
    fn last_signature_character_flip_is_signature_invalid() {
        let svc = service(60_000);

        for user in ["alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi"] {
            let mut token = svc.issue_at(user, t0()).unwrap();
            let last = token.pop().unwrap();
            token.push(if last == 'A' { 'B' } else { 'A' });

            assert_eq!(kind_of(&svc, &token), TokenErrorKind::SignatureInvalid, "{user}");
        }
    }

    #[test]
    fn bad_header_or_payload_encoding_is_malformed() {
        let svc = service(60_000);
        let token = svc.issue_at("alice", t0()).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let bad_header = format!("{}!.{}.{}", parts[0], parts[1], parts[2]);
        let bad_payload = format!("{}.{}!.{}", parts[0], parts[1], parts[2]);

        assert_eq!(kind_of(&svc, &bad_header), TokenErrorKind::Malformed);
        assert_eq!(kind_of(&svc, &bad_payload), TokenErrorKind::Malformed);
    }

    #[test]
    fn issued_token_is_three_part_hs512() {
        let svc = service(60_000);
        let token = svc.issue(&principal("alice")).unwrap();

        assert_eq!(token.split('.').count(), 3);
        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::HS512);
        assert_eq!(header.typ.as_deref(), Some("JWT"));
    }

    #[test]
    fn round_trip_returns_username() {
        let svc = service(60_000);

        let token = svc.issue(&principal("alice")).unwrap();
        assert_eq!(svc.extract_username(&token).unwrap(), "alice");

        let token = svc.issue_for_username("bob").unwrap();
        assert_eq!(svc.extract_username(&token).unwrap(), "bob");
    }

    #[test]
    fn claims_carry_issue_and_expiry_times() {
        let svc = service(1_500);
        let token = svc.issue_at("alice", t0()).unwrap();

        let verified = svc.verify_at(&token, t0()).unwrap();

        assert_eq!(verified.issued_at, Some(NumericDate::from_datetime(t0())));
        assert_eq!(
            verified.expires_at.millis(),
            t0().timestamp_millis() + 1_500
        );
    }

    #[test]
    fn expiry_boundary() {
        let lifetime = 1_000;
        let svc = service(lifetime);
        let token = svc.issue_at("alice", t0()).unwrap();

        let before = t0() + Duration::milliseconds(lifetime - 1);
        let at = t0() + Duration::milliseconds(lifetime);
        let after = t0() + Duration::milliseconds(lifetime + 1);

        assert!(svc.verify_at(&token, before).is_ok());
        assert_eq!(
            svc.verify_at(&token, at).unwrap_err().kind,
            TokenErrorKind::Expired
        );
        assert_eq!(
            svc.verify_at(&token, after).unwrap_err().kind,
            TokenErrorKind::Expired
        );
    }

    #[test]
    fn validate_then_expire_in_real_time() {
        let svc = service(1_000);
        let token = svc.issue_for_username("alice").unwrap();

        assert!(svc.validate(&token));
        std::thread::sleep(std::time::Duration::from_millis(1_001));
        assert!(!svc.validate(&token));
    }

    #[test]
    fn tampered_signature_is_signature_invalid() {
        let svc = service(60_000);
        let token = svc.issue_at("alice", t0()).unwrap();
        let sig_start = token.rfind('.').unwrap() + 1;

        // Includes the last character, whose low bits are base64 padding.
        for i in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();

            assert_eq!(
                kind_of(&svc, &tampered),
                TokenErrorKind::SignatureInvalid,
                "byte {i}"
            );
            assert!(!svc.validate(&tampered));
        }
    }

    #[test]
    fn wrong_secret_is_signature_invalid() {
        let issuer = TokenService::new("secret-a", 60_000).unwrap();
        let verifier = TokenService::new("secret-b", 60_000).unwrap();
        let token = issuer.issue_at("alice", t0()).unwrap();

        assert_eq!(kind_of(&verifier, &token), TokenErrorKind::SignatureInvalid);
    }

    #[test]
    fn missing_segments_are_malformed() {
        let svc = service(60_000);
        let token = svc.issue_at("alice", t0()).unwrap();
        let without_signature = &token[..token.rfind('.').unwrap()];

        assert_eq!(kind_of(&svc, without_signature), TokenErrorKind::Malformed);
        assert_eq!(kind_of(&svc, "not-a-token"), TokenErrorKind::Malformed);
        assert_eq!(kind_of(&svc, "a.b.c.d"), TokenErrorKind::Malformed);
        assert_eq!(kind_of(&svc, "!!!.@@@.###"), TokenErrorKind::Malformed);
    }

    #[test]
    fn other_algorithms_are_unsupported() {
        let svc = service(60_000);
        let hs256 = signed_with(
            Algorithm::HS256,
            json!({"sub": "alice", "iat": 1_700_000_000, "exp": 1_800_000_000}),
        );

        assert_eq!(kind_of(&svc, &hs256), TokenErrorKind::Unsupported);
    }

    #[test]
    fn unsigned_token_is_unsupported() {
        let svc = service(60_000);
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS512","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"alice","exp":1800000000}"#);
        let unsigned = format!("{header}.{payload}.");

        assert_eq!(kind_of(&svc, &unsigned), TokenErrorKind::Unsupported);
    }

    #[test]
    fn empty_input_and_payload_are_claims_empty() {
        let svc = service(60_000);

        assert_eq!(kind_of(&svc, ""), TokenErrorKind::ClaimsEmpty);
        assert_eq!(kind_of(&svc, "   "), TokenErrorKind::ClaimsEmpty);

        let empty_payload = signed_with(Algorithm::HS512, json!({}));
        assert_eq!(kind_of(&svc, &empty_payload), TokenErrorKind::ClaimsEmpty);

        let blank_sub = signed_with(
            Algorithm::HS512,
            json!({"sub": " ", "exp": 1_800_000_000}),
        );
        assert_eq!(kind_of(&svc, &blank_sub), TokenErrorKind::ClaimsEmpty);
    }

    #[test]
    fn refuses_to_issue_without_subject() {
        let svc = service(60_000);
        let err = svc.issue_for_username("  ").unwrap_err();

        assert!(matches!(
            err,
            AuthError::Token(TokenError {
                kind: TokenErrorKind::ClaimsEmpty,
                ..
            })
        ));
    }

    #[test]
    fn validate_is_false_for_every_failure_class() {
        let svc = service(60_000);
        let expired = svc
            .issue_at("alice", Utc::now() - Duration::minutes(5))
            .unwrap();

        for token in ["", "garbage", expired.as_str()] {
            assert!(!svc.validate(token));
        }
    }

    #[test]
    fn concurrent_validation_agrees() {
        let svc = std::sync::Arc::new(service(60_000));
        let token = svc.issue_for_username("alice").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let svc = svc.clone();
                let token = token.clone();
                std::thread::spawn(move || svc.extract_username(&token).unwrap())
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), "alice");
        }
    }

    #[test]
    fn numeric_date_wire_form() {
        let whole = serde_json::to_string(&NumericDate(1_700_000_000_000)).unwrap();
        assert_eq!(whole, "1700000000");

        let fractional =
            serde_json::to_string(&NumericDate(1_700_000_000_250)).unwrap();
        assert_eq!(fractional, "1700000000.25");

        let parsed: NumericDate = serde_json::from_str("1700000000.123").unwrap();
        assert_eq!(parsed.millis(), 1_700_000_000_123);

        let parsed: NumericDate = serde_json::from_str("1700000000").unwrap();
        assert_eq!(parsed.millis(), 1_700_000_000_000);
    }
}
