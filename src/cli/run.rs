use super::config::{config_path_or_default, RelayConfig};
use super::logging;
use session_relay::driver::DriverClient;
use session_relay::queue;
use session_relay::session::{
    CredentialStore, InboxRelay, PngQrEncoder, QrHandler, SessionBootstrapper, SessionOutcome,
};
use tracing::{info, warn};

/// Run one session lifecycle
///
/// ## Configuration Loading
///
/// Configuration is loaded from `--config` if provided, otherwise from
/// `~/.local/share/session-relay/config.toml`. If the file doesn't exist, a
/// default one is generated.
///
/// ## Exit Behavior
///
/// The command returns once the connection closes. A corrupt credential file
/// or an unreachable queue/driver is an error; a rejected handshake is
/// reported and the command exits cleanly without retrying.
pub async fn execute(config_path: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path_or_default(config_path);

    println!("🚀 Starting session relay...");
    println!("Config: {}", config_path.display());

    // Load or create configuration
    let config = if config_path.exists() {
        RelayConfig::load(&config_path)?
    } else {
        println!();
        println!("📝 No config file found. Creating default configuration...");
        RelayConfig::create_default(&config_path)?;
        println!("   Created: {}", config_path.display());
        RelayConfig::load(&config_path)?
    };

    let log_file = config.log_file(&config_path);
    logging::init(&config.logging, log_file.as_deref())?;

    let session_path = config.session_path(&config_path);
    let qr_path = config.qr_path(&config_path);
    println!("Session: {}", session_path.display());
    println!();

    let publisher = queue::connect(config.queue.transport, &config.queue.settings()).await?;
    let relay = InboxRelay::new(publisher, &config.queue.routing_key)
        .with_ack_policy(config.queue.ack_policy);

    let qr_handler =
        QrHandler::new(PngQrEncoder, &qr_path).with_terminal_output(config.session.print_qr);

    let mut bootstrapper = SessionBootstrapper::new(
        DriverClient::new(config.driver.clone()),
        CredentialStore::new(&session_path),
        qr_handler,
        relay,
    );

    let outcome = bootstrapper.run().await?;
    info!(?outcome, "session finished");
    report(&outcome, &session_path.display().to_string());

    Ok(())
}

/// Print the operator-facing summary for a finished session
fn report(outcome: &SessionOutcome, session_path: &str) {
    match outcome {
        SessionOutcome::Closed { logged_out: true } => {
            println!("🔒 Logged out. Stored credentials were cleared.");
            println!("   Run again to pair with a new QR code.");
        }
        SessionOutcome::Closed { logged_out: false } => {
            println!("✅ Connection closed. Session saved to {}", session_path);
        }
        SessionOutcome::AuthenticationFailed { reason } => {
            warn!(%reason, "authentication failed");
            println!("❌ Authentication failed: {}", reason);
            println!("   Nothing was saved. Run again to retry.");
        }
        SessionOutcome::Disconnected => {
            warn!("driver stopped without a close event");
            println!("⚠️  Driver stopped without closing the connection. Nothing was saved.");
        }
    }
}
