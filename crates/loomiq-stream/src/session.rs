//! Authenticated session value passed explicitly to stream and API calls.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeZone as _, Utc};

use crate::errors::AuthError;

/// Account details returned by the login endpoint.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

/// Role granted to a user. The backend sends either a bare name or an object.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", from = "RoleRepr")]
pub struct Role {
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub is_system: bool,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum RoleRepr {
    Name(String),
    #[serde(rename_all = "camelCase")]
    Full {
        #[serde(default, deserialize_with = "string_or_number")]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        is_system: bool,
    },
}

impl From<RoleRepr> for Role {
    fn from(repr: RoleRepr) -> Self {
        match repr {
            RoleRepr::Name(name) => Self {
                name,
                ..Self::default()
            },
            RoleRepr::Full {
                id,
                name,
                description,
                is_system,
            } => Self {
                name: name.or_else(|| id.clone()).unwrap_or_default(),
                id,
                description,
                is_system,
            },
        }
    }
}

/// One permission, usually `resource:action`.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(from = "PermissionRepr")]
pub struct Permission {
    pub id: Option<String>,
    pub resource: Option<String>,
    pub action: Option<String>,
    pub description: Option<String>,
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum PermissionRepr {
    Id(String),
    Full {
        #[serde(default, deserialize_with = "string_or_number")]
        id: Option<String>,
        #[serde(default)]
        resource: Option<String>,
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl From<PermissionRepr> for Permission {
    fn from(repr: PermissionRepr) -> Self {
        match repr {
            PermissionRepr::Id(id) => Self {
                id: Some(id),
                ..Self::default()
            },
            PermissionRepr::Full {
                id,
                resource,
                action,
                description,
            } => Self {
                id,
                resource,
                action,
                description,
            },
        }
    }
}

impl Permission {
    /// Explicit resource, else the part of the id before `:`, else `other`.
    pub fn resource_name(&self) -> &str {
        self.resource
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| {
                self.id
                    .as_deref()
                    .and_then(|id| id.split(':').next())
                    .filter(|r| !r.is_empty())
            })
            .unwrap_or("other")
    }

    /// Explicit action, else the part of the id after `:`.
    pub fn action_name(&self) -> &str {
        self.action
            .as_deref()
            .or_else(|| {
                self.id
                    .as_deref()
                    .map(|id| id.split_once(':').map_or(id, |(_, action)| action))
            })
            .unwrap_or("")
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize as _;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number id, got {other}"
        ))),
    }
}

impl UserProfile {
    /// `First Last`, falling back to the username.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            self.username.clone()
        } else {
            full
        }
    }

    /// Permissions grouped by resource, groups in first-seen order.
    pub fn permissions_by_resource(&self) -> Vec<(&str, Vec<&Permission>)> {
        let mut groups: Vec<(&str, Vec<&Permission>)> = Vec::new();
        for permission in &self.permissions {
            let resource = permission.resource_name();
            match groups.iter_mut().find(|(name, _)| *name == resource) {
                Some((_, members)) => members.push(permission),
                None => groups.push((resource, vec![permission])),
            }
        }
        groups
    }
}

/// Bearer token plus what is known about it.
///
/// Expiry is checked once, when the session is built. Long-lived holders call
/// [`AuthSession::is_expired_at`] and build a fresh session with
/// [`AuthSession::refresh`] rather than mutating this one.
#[derive(Clone, PartialEq)]
pub struct AuthSession {
    token: String,
    user: Option<UserProfile>,
    expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("token", &"<redacted>")
            .field("user", &self.user.as_ref().map(|u| &u.username))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AuthSession {
    pub fn new(token: impl Into<String>, user: Option<UserProfile>) -> Result<Self, AuthError> {
        Self::new_at(token, user, Utc::now())
    }

    /// Builds a session, judging expiry against `now`.
    ///
    /// JWTs must carry a readable payload; an `exp` claim in the past is
    /// rejected. Tokens that are not JWTs are opaque and never expire here.
    pub fn new_at(
        token: impl Into<String>,
        user: Option<UserProfile>,
        now: DateTime<Utc>,
    ) -> Result<Self, AuthError> {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(AuthError::Empty);
        }
        let expires_at = jwt_expiry(&token)?;
        if let Some(expired_at) = expires_at
            && expired_at <= now
        {
            return Err(AuthError::Expired { expired_at });
        }
        Ok(Self {
            token,
            user,
            expires_at,
        })
    }

    /// Replaces the token, keeping the user.
    pub fn refresh(&self, token: impl Into<String>) -> Result<Self, AuthError> {
        Self::new(token, self.user.clone())
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }
}

#[derive(serde::Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<f64>,
}

fn jwt_expiry(token: &str) -> Result<Option<DateTime<Utc>>, AuthError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Ok(None);
    }
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| AuthError::Malformed(format!("payload is not base64url: {e}")))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| AuthError::Malformed(format!("payload is not JSON: {e}")))?;
    let Some(exp) = claims.exp else {
        return Ok(None);
    };
    Utc.timestamp_opt(exp as i64, 0)
        .single()
        .map(Some)
        .ok_or_else(|| AuthError::Malformed(format!("exp out of range: {exp}")))
}
