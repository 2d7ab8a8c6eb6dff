use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::TokenError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenHeader {
    pub alg: String,
    pub typ: String,
}

impl AccessTokenHeader {
    fn hs256() -> Self {
        Self {
            alg: "HS256".to_string(),
            typ: "JWT".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessTokenClaims {
    pub sub: String,
    #[serde(default)]
    pub authorities: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

fn b64e_json<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value)?;
    Ok(Base64UrlUnpadded::encode_string(&json))
}

fn b64d_json<T: for<'de> Deserialize<'de>>(s: &str) -> Result<T, TokenError> {
    let bytes = Base64UrlUnpadded::decode_vec(s).map_err(|_| TokenError::Base64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn mac(secret: &[u8], signing_input: &str) -> Result<HmacSha256, TokenError> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::Key)?;
    mac.update(signing_input.as_bytes());
    Ok(mac)
}

/// Create an HS256 signed access token.
///
/// # Errors
///
/// Returns an error if the claims cannot be encoded.
pub fn sign_hs256(secret: &[u8], claims: &AccessTokenClaims) -> Result<String, TokenError> {
    let header_b64 = b64e_json(&AccessTokenHeader::hs256())?;
    let claims_b64 = b64e_json(claims)?;
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signature = mac(secret, &signing_input)?.finalize().into_bytes();
    let signature_b64 = Base64UrlUnpadded::encode_string(&signature);

    Ok(format!("{signing_input}.{signature_b64}"))
}

/// Check the structure and signature of a token and return its claims without
/// looking at issuer, audience or expiry.
///
/// # Errors
///
/// Returns an error if the token is malformed or the signature does not match.
pub fn verify_signature(token: &str, secret: &[u8]) -> Result<AccessTokenClaims, TokenError> {
    let mut parts = token.split('.');
    let header_b64 = parts.next().ok_or(TokenError::Format)?;
    let claims_b64 = parts.next().ok_or(TokenError::Format)?;
    let sig_b64 = parts.next().ok_or(TokenError::Format)?;
    if parts.next().is_some() {
        return Err(TokenError::Format);
    }

    let header: AccessTokenHeader = b64d_json(header_b64)?;
    if header.alg != "HS256" {
        return Err(TokenError::UnsupportedAlg(header.alg));
    }

    let signing_input = format!("{header_b64}.{claims_b64}");
    let signature = Base64UrlUnpadded::decode_vec(sig_b64).map_err(|_| TokenError::Base64)?;
    mac(secret, &signing_input)?
        .verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    b64d_json(claims_b64)
}

/// Verify an HS256 access token and return its decoded claims.
///
/// # Errors
///
/// Returns an error if:
/// - the token is malformed or contains invalid base64/json,
/// - the signature is invalid,
/// - the claims fail validation (`iss`, `aud`, `exp`).
pub fn verify_hs256(
    token: &str,
    secret: &[u8],
    expected_issuer: &str,
    expected_audience: &str,
    now_unix_seconds: i64,
) -> Result<AccessTokenClaims, TokenError> {
    let claims = verify_signature(token, secret)?;
    if claims.iss != expected_issuer {
        return Err(TokenError::InvalidIssuer);
    }
    if claims.aud != expected_audience {
        return Err(TokenError::InvalidAudience);
    }
    if claims.exp <= now_unix_seconds {
        return Err(TokenError::Expired);
    }
    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";
    const NOW: i64 = 1_700_000_000;

    fn claims() -> AccessTokenClaims {
        AccessTokenClaims {
            sub: "alice".to_string(),
            authorities: vec!["ROLE_USER".to_string()],
            iss: "warden".to_string(),
            aud: "warden-users".to_string(),
            iat: NOW,
            exp: NOW + 60,
            jti: "jti-1".to_string(),
        }
    }

    #[test]
    fn sign_and_verify() -> Result<(), TokenError> {
        let token = sign_hs256(SECRET, &claims())?;
        assert_eq!(token.split('.').count(), 3);
        let verified = verify_hs256(&token, SECRET, "warden", "warden-users", NOW)?;
        assert_eq!(verified, claims());
        Ok(())
    }

    #[test]
    fn signing_is_deterministic() -> Result<(), TokenError> {
        assert_eq!(sign_hs256(SECRET, &claims())?, sign_hs256(SECRET, &claims())?);
        Ok(())
    }

    #[test]
    fn wrong_secret_is_rejected() -> Result<(), TokenError> {
        let token = sign_hs256(SECRET, &claims())?;
        let result = verify_hs256(
            &token,
            b"another-secret-another-secret-xx",
            "warden",
            "warden-users",
            NOW,
        );
        assert!(matches!(result, Err(TokenError::InvalidSignature)));
        Ok(())
    }

    #[test]
    fn tampered_claims_are_rejected() -> Result<(), TokenError> {
        let token = sign_hs256(SECRET, &claims())?;
        let mut forged = claims();
        forged.authorities.push("ROLE_ADMIN".to_string());
        let forged_b64 = b64e_json(&forged)?;
        let parts: Vec<&str> = token.split('.').collect();
        let tampered = format!("{}.{forged_b64}.{}", parts[0], parts[2]);
        assert!(matches!(
            verify_signature(&tampered, SECRET),
            Err(TokenError::InvalidSignature)
        ));
        Ok(())
    }

    #[test]
    fn claim_checks() -> Result<(), TokenError> {
        let token = sign_hs256(SECRET, &claims())?;
        assert!(matches!(
            verify_hs256(&token, SECRET, "other", "warden-users", NOW),
            Err(TokenError::InvalidIssuer)
        ));
        assert!(matches!(
            verify_hs256(&token, SECRET, "warden", "other", NOW),
            Err(TokenError::InvalidAudience)
        ));
        assert!(matches!(
            verify_hs256(&token, SECRET, "warden", "warden-users", NOW + 60),
            Err(TokenError::Expired)
        ));
        Ok(())
    }

    #[test]
    fn malformed_tokens() {
        assert!(matches!(
            verify_signature("abc", SECRET),
            Err(TokenError::Format)
        ));
        assert!(matches!(
            verify_signature("a.b.c.d", SECRET),
            Err(TokenError::Format)
        ));
        assert!(matches!(
            verify_signature("!!.b.c", SECRET),
            Err(TokenError::Base64)
        ));
    }

    #[test]
    fn other_algorithms_are_rejected() -> Result<(), TokenError> {
        let header = b64e_json(&AccessTokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        })?;
        let body = b64e_json(&claims())?;
        assert!(matches!(
            verify_signature(&format!("{header}.{body}."), SECRET),
            Err(TokenError::UnsupportedAlg(alg)) if alg == "none"
        ));
        Ok(())
    }
}
