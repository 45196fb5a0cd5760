use super::config::{config_path_or_default, RelayConfig};
use session_relay::session::CredentialStore;
use std::io::{self, Write};

/// Clear stored credentials locally
///
/// The linked device stays registered on the server side until it is removed
/// from the phone; this only forgets the local session so the next `run`
/// pairs again.
pub async fn execute(
    config_path: Option<String>,
    yes: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path_or_default(config_path);
    let config = RelayConfig::load_or_default(&config_path)?;
    let store = CredentialStore::new(config.session_path(&config_path));

    if !store.path().exists() {
        println!(
            "No stored session at: {}\nNothing to log out.",
            store.path().display()
        );
        return Ok(());
    }

    println!();
    println!("⚠️  This removes the stored session at {}", store.path().display());
    println!("The next start will require scanning a new QR code.");
    println!();

    if !yes && !confirm_action("Type 'LOGOUT' to confirm: ", "LOGOUT")? {
        println!("Aborted.");
        return Ok(());
    }

    store.clear().map_err(|e| {
        format!(
            "Failed to remove session file: {}\nYou may need to manually delete: {}",
            e,
            store.path().display()
        )
    })?;

    println!("✅ Stored session removed.");
    println!("Also remove the linked device from the phone to revoke it server-side.");

    Ok(())
}

/// Parse user confirmation input against expected string
///
/// Handles whitespace trimming and exact string matching.
pub fn parse_confirmation(input: &str, expected: &str) -> bool {
    input.trim() == expected
}

/// Prompt user for confirmation with a specific expected input
fn confirm_action(prompt: &str, expected: &str) -> Result<bool, Box<dyn std::error::Error>> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(parse_confirmation(&input, expected))
}
