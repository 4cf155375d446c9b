//! Caller identity extraction and ownership checks.
//!
//! Authentication itself is handled upstream by the API Gateway authorizer;
//! handlers only read the already-validated claims out of the request
//! context. Every mutating domain operation funnels its ownership decision
//! through [`assert_owner`].

use lambda_http::{Request, RequestExt};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The identity a request acts as. Records are keyed by email.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    /// Subject id from the authorizer (opaque)
    pub user_id: Option<String>,
    /// Email address; the ownership key for programs, appointments and
    /// notifications
    pub email: String,
    /// Display name, when the identity provider supplies one
    pub name: Option<String>,
}

impl Identity {
    /// Build an identity from a bare email. Used by tests and internal
    /// cascade paths where no request context exists.
    pub fn from_email(email: impl Into<String>) -> Self {
        Self {
            user_id: None,
            email: email.into(),
            name: None,
        }
    }
}

/// Extract the caller identity from API Gateway authorizer claims.
///
/// Fails with an auth error when there is no request context or the claims
/// carry no email.
pub fn extract_identity(event: &Request) -> Result<Identity> {
    let context = event
        .request_context_ref()
        .ok_or_else(|| Error::Auth("Missing request context".to_string()))?;

    let claims = context
        .authorizer()
        .and_then(|a| a.fields.get("claims"))
        .ok_or_else(|| Error::Auth("Missing authorizer claims".to_string()))?;

    identity_from_claims(claims)
}

/// Build an [`Identity`] from a claims object.
pub fn identity_from_claims(claims: &serde_json::Value) -> Result<Identity> {
    let email = claims
        .get("email")
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| Error::Auth("Missing email claim".to_string()))?;

    let user_id = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(String::from);

    let name = claims
        .get("name")
        .and_then(|v| v.as_str())
        .map(String::from);

    Ok(Identity {
        user_id,
        email: email.to_string(),
        name,
    })
}

/// Assert that `requester` owns the record whose owner email is
/// `owner_email`. Comparison is on the email key only.
pub fn assert_owner(owner_email: &str, requester: &Identity) -> Result<()> {
    if owner_email == requester.email {
        Ok(())
    } else {
        Err(Error::Auth(
            "You can only modify your own records".to_string(),
        ))
    }
}
