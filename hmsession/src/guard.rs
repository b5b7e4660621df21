use crate::role::Permission;
use crate::session::SessionState;
use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Route guarding
//--------------------------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteDecision {
    /// Still rehydrating, render nothing yet
    Pending,
    Allow,
    RedirectToLogin,
}

impl SessionState {
    pub fn route_decision(&self) -> RouteDecision {
        if self.is_loading {
            RouteDecision::Pending
        } else if self.is_logged_in && self.user.is_some() {
            RouteDecision::Allow
        } else {
            RouteDecision::RedirectToLogin
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardRejection {
    #[error("login required")]
    LoginRequired,
    #[error("{role_name} does not have {permission:?}")]
    Forbidden {
        role_name: String,
        permission: Permission,
    },
}

//--------------------------------------------------------------------------------------------------
