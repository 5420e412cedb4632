//! Request-scoped caller context.
//!
//! The edge gateway authenticates callers and forwards who they are as
//! headers. Handlers parse those once into a [`RequestContext`] and pass it
//! explicitly down the call chain.

use thiserror::Error;

use crate::CustomerId;

/// Errors raised while building or interrogating a [`RequestContext`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("Missing caller identity")]
    MissingUser,

    #[error("Invalid caller identity: {0}")]
    InvalidUserId(String),

    #[error("Caller is not permitted to perform this action")]
    Forbidden,
}

/// Role of the calling user as asserted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    Customer,
    Manager,
    Admin,
}

impl UserType {
    /// Parses the gateway's user type header, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Some(UserType::Customer),
            "manager" => Some(UserType::Manager),
            "admin" => Some(UserType::Admin),
            _ => None,
        }
    }
}

/// Identity of the caller for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    user_id: Option<CustomerId>,
    user_type: Option<UserType>,
    service_name: Option<String>,
}

impl RequestContext {
    /// Builds a context from raw header values.
    ///
    /// A present but malformed user id is an error; absent values are allowed
    /// and only rejected when an operation requires them.
    pub fn from_parts(
        user_id: Option<&str>,
        user_type: Option<&str>,
        service_name: Option<&str>,
    ) -> Result<Self, ContextError> {
        let user_id = user_id
            .map(|raw| {
                CustomerId::parse(raw.trim())
                    .map_err(|_| ContextError::InvalidUserId(raw.to_string()))
            })
            .transpose()?;

        Ok(Self {
            user_id,
            user_type: user_type.and_then(UserType::parse),
            service_name: service_name.map(|s| s.trim().to_string()),
        })
    }

    /// Context for a customer acting on their own resources.
    pub fn customer(customer_id: CustomerId) -> Self {
        Self {
            user_id: Some(customer_id),
            user_type: Some(UserType::Customer),
            service_name: None,
        }
    }

    /// Context for a trusted peer service.
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            user_id: None,
            user_type: None,
            service_name: Some(name.into()),
        }
    }

    pub fn user_id(&self) -> Option<CustomerId> {
        self.user_id
    }

    pub fn user_type(&self) -> Option<UserType> {
        self.user_type
    }

    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Returns the calling customer or [`ContextError::MissingUser`].
    pub fn require_customer(&self) -> Result<CustomerId, ContextError> {
        self.user_id.ok_or(ContextError::MissingUser)
    }

    /// Requires the caller to be an administrator.
    pub fn require_admin(&self) -> Result<(), ContextError> {
        match self.user_type {
            Some(UserType::Admin) => Ok(()),
            _ => Err(ContextError::Forbidden),
        }
    }

    /// Requires the caller to be a store manager or an administrator.
    pub fn require_manager_or_admin(&self) -> Result<(), ContextError> {
        match self.user_type {
            Some(UserType::Admin | UserType::Manager) => Ok(()),
            _ => Err(ContextError::Forbidden),
        }
    }

    /// Requires the request to come from the named peer service.
    pub fn require_service(&self, expected: &str) -> Result<(), ContextError> {
        if self.service_name.as_deref() == Some(expected) {
            Ok(())
        } else {
            Err(ContextError::Forbidden)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_parses_all_headers() {
        let id = CustomerId::new();
        let ctx =
            RequestContext::from_parts(Some(&id.to_string()), Some("ADMIN"), Some("payment-service"))
                .unwrap();

        assert_eq!(ctx.user_id(), Some(id));
        assert_eq!(ctx.user_type(), Some(UserType::Admin));
        assert_eq!(ctx.service_name(), Some("payment-service"));
    }

    #[test]
    fn malformed_user_id_is_rejected() {
        let err = RequestContext::from_parts(Some("abc"), None, None).unwrap_err();
        assert_eq!(err, ContextError::InvalidUserId("abc".to_string()));
    }

    #[test]
    fn role_checks() {
        let customer = RequestContext::customer(CustomerId::new());
        assert!(customer.require_admin().is_err());
        assert!(customer.require_manager_or_admin().is_err());

        let manager = RequestContext::from_parts(None, Some("manager"), None).unwrap();
        assert!(manager.require_manager_or_admin().is_ok());
        assert_eq!(manager.require_customer(), Err(ContextError::MissingUser));
    }

    #[test]
    fn service_check_is_exact() {
        let ctx = RequestContext::service("payment-service");
        assert!(ctx.require_service("payment-service").is_ok());
        assert!(ctx.require_service("store-service").is_err());
        assert!(RequestContext::default().require_service("payment-service").is_err());
    }
}
