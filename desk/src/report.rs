use hmsession::{RouteDecision, SessionState};

//--------------------------------------------------------------------------------------------------
// One-line summaries of session transitions
//--------------------------------------------------------------------------------------------------

pub fn describe(state: &SessionState) -> String {
    match (state.route_decision(), &state.user) {
        (RouteDecision::Pending, Some(user)) => format!("Loading profile for {}", user.name),
        (RouteDecision::Pending, None) => "Loading session".to_string(),
        (RouteDecision::Allow, Some(user)) => match &user.hospital_name {
            Some(hospital) => format!("{} ({}) at {}", user.name, user.role_name, hospital),
            None => format!("{} ({})", user.name, user.role_name),
        },
        _ => "Logged out".to_string(),
    }
}

//--------------------------------------------------------------------------------------------------
