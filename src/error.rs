use thiserror::Error;

/// Failures surfaced by the Zoho session layer.
///
/// `Display` is the operator-facing message. Raw upstream text, when there is
/// any, lives behind [`ZohoError::diagnostic`] so callers can decide whether to
/// show it.
#[derive(Error, Debug)]
pub enum ZohoError {
    #[error("Missing configuration: {}", .missing.join(", "))]
    MissingConfiguration { missing: Vec<&'static str> },

    #[error("Authentication failed: {reason}")]
    Auth { reason: String, hint: String },

    #[error("Access token was rejected by Zoho (HTTP 401)")]
    Unauthorized,

    #[error("Network error while calling {target}: {message}")]
    TransientNetwork { target: String, message: String },

    #[error("Could not reach {target}: {message}")]
    Unreachable { target: String, message: String },

    #[error("Zoho returned an unreadable response (HTTP {status})")]
    MalformedUpstreamResponse { status: u16, preview: String },

    #[error("Zoho returned HTTP {status}: {message}")]
    UpstreamStatus {
        status: u16,
        message: String,
        preview: String,
    },

    #[error("Could not create a tasklist for project {project_id}: {reason}")]
    PrerequisiteCreationFailed { project_id: String, reason: String },

    #[error("Unknown status '{requested}' for project {project_id}")]
    UnknownStatus {
        project_id: String,
        requested: String,
    },

    #[error("{field} is required")]
    Validation { field: &'static str },
}

impl ZohoError {
    /// Remediation hint for errors the operator has to fix by hand.
    pub fn hint(&self) -> Option<&str> {
        match self {
            ZohoError::MissingConfiguration { .. } => Some(
                "Set ZOHO_CLIENT_ID, ZOHO_CLIENT_SECRET, ZOHO_REFRESH_TOKEN and ZOHO_PORTAL_ID, or add them to ~/.zpanel/config.toml",
            ),
            ZohoError::Auth { hint, .. } => Some(hint),
            ZohoError::Unauthorized => Some("The access token expired; request a new one"),
            ZohoError::Unreachable { .. } => {
                Some("Check that accounts.zoho.com and projectsapi.zoho.com are reachable")
            }
            _ => None,
        }
    }

    /// Raw upstream payload for debugging, already bounded by the gateway.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            ZohoError::MalformedUpstreamResponse { preview, .. }
            | ZohoError::UpstreamStatus { preview, .. } => {
                if preview.is_empty() {
                    None
                } else {
                    Some(preview)
                }
            }
            _ => None,
        }
    }

    /// Whether re-invoking the same operation can succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ZohoError::TransientNetwork { .. } | ZohoError::Unreachable { .. }
        )
    }

    /// Message for the operator, with the diagnostic appended in debug mode.
    pub fn report(&self, debug: bool) -> String {
        let mut out = self.to_string();
        if let Some(hint) = self.hint() {
            out.push_str(&format!(" ({hint})"));
        }
        if debug {
            if let Some(diag) = self.diagnostic() {
                out.push_str(&format!("\n  upstream said: {diag}"));
            }
        }
        out
    }
}
