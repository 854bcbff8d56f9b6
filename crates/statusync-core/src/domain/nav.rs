//! Navigation focus and the badge views derived from an activity snapshot.
//!
//! Ambient highlight rule: a view advertises activity only while it has
//! activity AND is not the view in focus.

use serde::Serialize;

use super::{ActivitySnapshot, ClientType};

const CLIENT_ROUTE_PREFIX: &str = "/routes/";
const REQUESTS_ROUTE: &str = "/requests";

/// Which view currently has focus, parsed from the route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavFocus {
    /// `/routes/{client}` exactly.
    Client(ClientType),
    /// `/requests` or anything below it.
    Requests,
    Other,
}

impl NavFocus {
    pub fn from_path(path: &str) -> Self {
        if path == REQUESTS_ROUTE
            || path
                .strip_prefix(REQUESTS_ROUTE)
                .is_some_and(|rest| rest.starts_with('/'))
        {
            return NavFocus::Requests;
        }
        match path.strip_prefix(CLIENT_ROUTE_PREFIX) {
            Some(client) if !client.is_empty() && !client.contains('/') => {
                NavFocus::Client(ClientType::new(client))
            }
            _ => NavFocus::Other,
        }
    }

    pub fn is_client(&self, client_type: &ClientType) -> bool {
        matches!(self, NavFocus::Client(focused) if focused == client_type)
    }

    pub fn is_requests(&self) -> bool {
        matches!(self, NavFocus::Requests)
    }
}

/// Ambient cue for one view.
pub fn ambient_highlight(count: u64, focused: bool) -> bool {
    count > 0 && !focused
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientBadge {
    pub client_type: ClientType,
    pub count: u32,
    pub ambient: bool,
}

impl ClientBadge {
    pub fn derive(snapshot: &ActivitySnapshot, client_type: &ClientType, focus: &NavFocus) -> Self {
        let count = snapshot.count(client_type);
        Self {
            client_type: client_type.clone(),
            count,
            ambient: ambient_highlight(u64::from(count), focus.is_client(client_type)),
        }
    }
}

/// Aggregate badge of the requests view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestsBadge {
    pub total: u64,
    pub ambient: bool,
}

impl RequestsBadge {
    pub fn derive(snapshot: &ActivitySnapshot, focus: &NavFocus) -> Self {
        let total = snapshot.total();
        Self {
            total,
            ambient: ambient_highlight(total, focus.is_requests()),
        }
    }
}
