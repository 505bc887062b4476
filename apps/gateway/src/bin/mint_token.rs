//! Issue a bearer token for local testing.
//!
//! Usage:
//!   cargo run -p parlay-gateway --bin mint-token -- <user_id> <username> [hours]
//!
//! Signs with JWT_SECRET from the environment (or .env via dotenvy).

use std::path::Path;

fn main() {
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (user_id, username) = match args.as_slice() {
        [user_id, username, ..] => (user_id.as_str(), username.as_str()),
        _ => {
            eprintln!("usage: mint-token <user_id> <username> [hours]");
            std::process::exit(2);
        }
    };
    let hours: i64 = match args.get(2) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            eprintln!("hours must be an integer, got {raw:?}");
            std::process::exit(2);
        }),
        None => 24,
    };

    let secret = std::env::var("JWT_SECRET").expect("JWT_SECRET env var is required");
    match parlay_gateway::auth::tokens::issue(
        &secret,
        user_id,
        username,
        chrono::Duration::hours(hours),
    ) {
        Ok(token) => println!("{token}"),
        Err(e) => {
            eprintln!("failed to issue token: {}", e.message);
            std::process::exit(1);
        }
    }
}
