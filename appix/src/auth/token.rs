//! Bearer tokens and the identity provider's refresh response.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::AuthError;

/// A bearer credential issued by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    /// The access credential sent to the catalog.
    pub access_token: String,
    /// Token type, normally `Bearer`.
    pub token_type: String,
    /// When the access credential stops being valid.
    pub expires_at: DateTime<Utc>,
    /// Refresh secret to use for the next refresh.
    pub refresh_token: String,
}

impl AuthToken {
    /// Returns the `Authorization` header value.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    /// Remaining validity at `now`.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// Returns true if `token` stays valid for more than `margin` after `now`.
#[must_use]
pub fn is_fresh(token: &AuthToken, now: DateTime<Utc>, margin: Duration) -> bool {
    token.remaining(now) > margin
}

/// Body returned by the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// New access credential.
    pub access_token: String,
    /// Lifetime of the access credential in seconds.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub expires_in: Option<i64>,
    /// Absolute expiry in epoch milliseconds.
    #[serde(default, deserialize_with = "lenient_i64")]
    pub expires_at: Option<i64>,
    /// Rotated refresh secret, if the provider issued one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Token type.
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// Converts the response into a token issued at `now`.
    ///
    /// `expires_in` wins over `expires_at`; one of them must be present.
    /// Without a rotated secret the current one is kept.
    pub fn into_token(
        self,
        now: DateTime<Utc>,
        current_refresh_token: &str,
    ) -> Result<AuthToken, AuthError> {
        if self.access_token.is_empty() {
            return Err(AuthError::Malformed("empty access_token".to_string()));
        }

        let expires_at = match (self.expires_in, self.expires_at) {
            (Some(seconds), _) => Duration::try_seconds(seconds)
                .and_then(|lifetime| now.checked_add_signed(lifetime))
                .ok_or_else(|| AuthError::Malformed(format!("invalid expires_in {seconds}")))?,
            (None, Some(millis)) => Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| AuthError::Malformed(format!("invalid expires_at {millis}")))?,
            (None, None) => {
                return Err(AuthError::Malformed(
                    "response has neither expires_in nor expires_at".to_string(),
                ))
            }
        };

        Ok(AuthToken {
            access_token: self.access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_at,
            refresh_token: self
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| current_refresh_token.to_string()),
        })
    }
}

/// Accepts integers encoded either as JSON numbers or numeric strings.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_expiring_in(now: DateTime<Utc>, seconds: i64) -> AuthToken {
        AuthToken {
            access_token: "abc".to_string(),
            token_type: "Bearer".to_string(),
            expires_at: now + Duration::seconds(seconds),
            refresh_token: "refresh".to_string(),
        }
    }

    #[test]
    fn test_freshness_respects_margin() {
        let now = Utc::now();
        let margin = Duration::seconds(60);

        assert!(is_fresh(&token_expiring_in(now, 3600), now, margin));
        assert!(!is_fresh(&token_expiring_in(now, 60), now, margin));
        assert!(!is_fresh(&token_expiring_in(now, 30), now, margin));
        assert!(!is_fresh(&token_expiring_in(now, -10), now, margin));
    }

    #[test]
    fn test_freshness_is_a_function_of_time() {
        let now = Utc::now();
        let token = token_expiring_in(now, 600);
        let margin = Duration::seconds(60);

        assert!(is_fresh(&token, now, margin));
        assert!(!is_fresh(&token, now + Duration::seconds(550), margin));
    }

    #[test]
    fn test_parse_string_encoded_numbers() {
        let response: TokenResponse = serde_json::from_str(
            r#"{ "access_token": "therightone", "expires_in": "3600", "expires_at": "1489675496997",
                 "id_token": "idtoken", "refresh_token": "refreshtoken", "token_type": "Bearer" }"#,
        )
        .unwrap();

        assert_eq!(response.expires_in, Some(3600));
        assert_eq!(response.expires_at, Some(1_489_675_496_997));
        assert_eq!(response.refresh_token.as_deref(), Some("refreshtoken"));
    }

    #[test]
    fn test_into_token_uses_expires_in() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "a".to_string(),
            expires_in: Some(3600),
            expires_at: None,
            refresh_token: None,
            token_type: None,
        };

        let token = response.into_token(now, "old").unwrap();
        assert_eq!(token.expires_at, now + Duration::seconds(3600));
        assert_eq!(token.refresh_token, "old");
        assert_eq!(token.authorization(), "Bearer a");
    }

    #[test]
    fn test_into_token_rejects_out_of_range_lifetime() {
        let response: TokenResponse = serde_json::from_str(
            r#"{ "access_token": "a", "expires_in": "9223372036854775" }"#,
        )
        .unwrap();

        let result = response.into_token(Utc::now(), "old");
        assert!(matches!(result, Err(AuthError::Malformed(_))));
    }

    #[test]
    fn test_into_token_falls_back_to_expires_at() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "a".to_string(),
            expires_in: None,
            expires_at: Some(1_489_675_496_997),
            refresh_token: Some("rotated".to_string()),
            token_type: Some("Bearer".to_string()),
        };

        let token = response.into_token(now, "old").unwrap();
        assert_eq!(token.expires_at.timestamp_millis(), 1_489_675_496_997);
        assert_eq!(token.refresh_token, "rotated");
    }

    #[test]
    fn test_into_token_requires_expiry() {
        let response = TokenResponse {
            access_token: "a".to_string(),
            expires_in: None,
            expires_at: None,
            refresh_token: None,
            token_type: None,
        };

        assert!(matches!(
            response.into_token(Utc::now(), "old"),
            Err(AuthError::Malformed(_))
        ));
    }

    #[test]
    fn test_non_numeric_expiry_rejected() {
        let result: Result<TokenResponse, _> =
            serde_json::from_str(r#"{ "access_token": "a", "expires_in": "soon" }"#);
        assert!(result.is_err());
    }
}
