use serde::{Deserialize, Serialize};

/// The authenticated account as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMedium {
    Email,
    Sms,
    Phone,
    Unknown,
}

/// Where a confirmation code was sent. Destinations are typically masked
/// by the provider (e.g. `j***@e***.com`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryDetails {
    pub destination: Option<String>,
    pub medium: DeliveryMedium,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<AttributeKey>,
}

/// Second-factor mechanism.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MfaKind {
    Sms,
    Totp,
    Email,
}

impl MfaKind {
    /// The token sent back through `confirm_sign_in` when the user picks
    /// this method from a selection step. Providers translate it into
    /// whatever their wire protocol expects.
    pub fn challenge_response(&self) -> &'static str {
        match self {
            MfaKind::Sms => "SMS",
            MfaKind::Totp => "TOTP",
            MfaKind::Email => "EMAIL",
        }
    }
}

impl std::fmt::Display for MfaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaKind::Sms => write!(f, "SMS"),
            MfaKind::Totp => write!(f, "TOTP"),
            MfaKind::Email => write!(f, "Email"),
        }
    }
}

/// A user-attribute key. Well-known keys get their own variants; anything
/// else round-trips through `Other`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum AttributeKey {
    Email,
    PhoneNumber,
    EmailVerified,
    PhoneNumberVerified,
    Other(String),
}

impl AttributeKey {
    pub fn as_str(&self) -> &str {
        match self {
            AttributeKey::Email => "email",
            AttributeKey::PhoneNumber => "phone_number",
            AttributeKey::EmailVerified => "email_verified",
            AttributeKey::PhoneNumberVerified => "phone_number_verified",
            AttributeKey::Other(other) => other,
        }
    }

    /// The companion attribute carrying this key's verification flag, for
    /// the kinds that can be verified with a code.
    pub fn verification_flag(&self) -> Option<AttributeKey> {
        match self {
            AttributeKey::Email => Some(AttributeKey::EmailVerified),
            AttributeKey::PhoneNumber => Some(AttributeKey::PhoneNumberVerified),
            _ => None,
        }
    }

    pub fn is_verifiable(&self) -> bool {
        self.verification_flag().is_some()
    }
}

impl From<String> for AttributeKey {
    fn from(value: String) -> Self {
        match value.as_str() {
            "email" => AttributeKey::Email,
            "phone_number" => AttributeKey::PhoneNumber,
            "email_verified" => AttributeKey::EmailVerified,
            "phone_number_verified" => AttributeKey::PhoneNumberVerified,
            _ => AttributeKey::Other(value),
        }
    }
}

impl From<&str> for AttributeKey {
    fn from(value: &str) -> Self {
        AttributeKey::from(value.to_string())
    }
}

impl From<AttributeKey> for String {
    fn from(key: AttributeKey) -> Self {
        match key {
            AttributeKey::Other(other) => other,
            fixed => fixed.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttribute {
    pub key: AttributeKey,
    pub value: String,
}

impl UserAttribute {
    pub fn new(key: impl Into<AttributeKey>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Payload for enrolling an authenticator app: the provider-issued shared
/// secret plus the account it binds to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotpSetupDetails {
    pub shared_secret: String,
    pub username: String,
}

impl TotpSetupDetails {
    /// Standard `otpauth://` enrollment URI, suitable for QR rendering.
    /// `issuer` must already be URI-safe; no escaping is applied here.
    pub fn setup_uri(&self, issuer: &str) -> String {
        format!(
            "otpauth://totp/{issuer}:{username}?secret={secret}&issuer={issuer}",
            username = self.username,
            secret = self.shared_secret,
        )
    }
}

/// Snapshot of the provider's current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub is_signed_in: bool,
    /// Whether the provider could still produce usable credential material
    /// for this session. A signed-in session that cannot is treated as
    /// expired and force-signed-out during bootstrap.
    pub credentials_usable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignOutResult {
    Complete,
    /// Local state was cleared but some remote cleanup failed.
    Partial,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_key_round_trips_through_strings() {
        for raw in [
            "email",
            "phone_number",
            "email_verified",
            "phone_number_verified",
            "locale",
        ] {
            let key = AttributeKey::from(raw);
            assert_eq!(key.as_str(), raw);
            assert_eq!(String::from(key), raw);
        }
    }

    #[test]
    fn verification_flags_cover_exactly_the_verifiable_kinds() {
        assert_eq!(
            AttributeKey::Email.verification_flag(),
            Some(AttributeKey::EmailVerified)
        );
        assert_eq!(
            AttributeKey::PhoneNumber.verification_flag(),
            Some(AttributeKey::PhoneNumberVerified)
        );
        assert!(!AttributeKey::EmailVerified.is_verifiable());
        assert!(!AttributeKey::Other("locale".to_string()).is_verifiable());
    }

    #[test]
    fn attribute_key_serde_uses_the_string_form() {
        let json = serde_json::to_string(&AttributeKey::PhoneNumber).unwrap();
        assert_eq!(json, "\"phone_number\"");
        let parsed: AttributeKey = serde_json::from_str("\"custom:tier\"").unwrap();
        assert_eq!(parsed, AttributeKey::Other("custom:tier".to_string()));
    }

    #[test]
    fn totp_setup_uri_embeds_account_and_secret() {
        let details = TotpSetupDetails {
            shared_secret: "JBSWY3DPEHPK3PXP".to_string(),
            username: "pat".to_string(),
        };
        assert_eq!(
            details.setup_uri("Example"),
            "otpauth://totp/Example:pat?secret=JBSWY3DPEHPK3PXP&issuer=Example"
        );
    }
}
