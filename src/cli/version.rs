/// Display version information
pub fn execute() {
    println!("session-relay {}", env!("CARGO_PKG_VERSION"));
    println!("Session lifecycle manager and inbox relay");
}
