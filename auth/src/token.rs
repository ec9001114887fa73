//! Access tokens.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Remaining lifetime, in seconds, below which a token must be replaced
/// before use.
pub const REFRESH_MARGIN_SECS: i64 = 300;

/// A bearer token together with its absolute expiry.
///
/// Tokens are immutable; a refresh produces a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    token: String,
    expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Wrap a token string and its expiry.
    #[must_use]
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// The raw token.
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.token
    }

    /// When the token stops being accepted.
    #[must_use]
    pub const fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    /// Whether fewer than [`REFRESH_MARGIN_SECS`] remain at `now`.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_on - now < Duration::seconds(REFRESH_MARGIN_SECS)
    }

    /// `Bearer <token>`.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabric_livy_testing::test_clock;
    use fabric_livy_core::Clock;
    use proptest::prelude::*;

    #[test]
    fn debug_output_hides_the_token() {
        let token = AccessToken::new("super-secret", test_clock().now());
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn bearer_format() {
        let token = AccessToken::new("abc", test_clock().now());
        assert_eq!(token.bearer(), "Bearer abc");
    }

    #[test]
    fn margin_boundary() {
        let now = test_clock().now();
        assert!(!AccessToken::new("t", now + Duration::minutes(5)).needs_refresh(now));
        assert!(AccessToken::new("t", now + Duration::minutes(5) - Duration::seconds(1)).needs_refresh(now));
    }

    proptest! {
        #[test]
        fn near_expiry_always_needs_refresh(remaining in -3_600_i64..300) {
            let now = test_clock().now();
            let token = AccessToken::new("t", now + Duration::seconds(remaining));
            prop_assert!(token.needs_refresh(now));
        }

        #[test]
        fn comfortable_expiry_is_reused(remaining in 300_i64..86_400) {
            let now = test_clock().now();
            let token = AccessToken::new("t", now + Duration::seconds(remaining));
            prop_assert!(!token.needs_refresh(now));
        }
    }
}
