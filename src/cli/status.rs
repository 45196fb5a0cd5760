use super::config::{config_path_or_default, RelayConfig};
use session_relay::session::{CredentialStore, StoreError};
use std::fmt;

/// What the credential file says about the next start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// No file; the next start pairs with a QR code
    Absent,
    /// Credentials carry an identity; the next start resumes
    Paired,
    /// File exists but no identity is bound yet
    Unpaired,
    /// File cannot be parsed; `run` refuses to start
    Corrupt(String),
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Absent => write!(f, "absent"),
            SessionStatus::Paired => write!(f, "paired"),
            SessionStatus::Unpaired => write!(f, "unpaired"),
            SessionStatus::Corrupt(_) => write!(f, "corrupt"),
        }
    }
}

/// Classify the stored session
pub fn inspect(store: &CredentialStore) -> Result<SessionStatus, StoreError> {
    match store.load() {
        Ok(None) => Ok(SessionStatus::Absent),
        Ok(Some(state)) if state.is_identified() => Ok(SessionStatus::Paired),
        Ok(Some(_)) => Ok(SessionStatus::Unpaired),
        Err(e) if e.is_corrupt() => Ok(SessionStatus::Corrupt(e.to_string())),
        Err(e) => Err(e),
    }
}

/// Report the stored session state
///
/// Reads the config if present (never creates it) and inspects the session
/// file it points at.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path_or_default(config_path);
    let config = RelayConfig::load_or_default(&config_path)?;
    let store = CredentialStore::new(config.session_path(&config_path));

    println!("📊 Session Relay Status");
    println!();
    println!("Config: {}", config_path.display());
    println!("Session: {}", store.path().display());

    let status = inspect(&store)?;
    println!("State: {}", status);
    println!();

    match &status {
        SessionStatus::Absent => println!("Next start will pair with a new QR code."),
        SessionStatus::Paired => println!("Next start will resume the stored session."),
        SessionStatus::Unpaired => {
            println!("Stored credentials have no identity; next start will pair.")
        }
        SessionStatus::Corrupt(reason) => {
            println!("❌ {}", reason);
            println!("   Remove the file or run 'session-relay logout' to start over.");
        }
    }

    Ok(())
}
