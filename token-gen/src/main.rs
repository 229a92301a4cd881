use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use osiris_auth::services::auth::TokenService;

/// Mint a bearer token for a username, signed with the service's shared secret.
///
/// Intended for calling a local instance by hand:
///   curl -H "Authorization: Bearer $(token-gen --username alice)" localhost:8080/api/v1/me
#[derive(Parser, Debug)]
#[command(name = "token-gen", version, about)]
struct Args {
    /// Token subject.
    #[arg(long)]
    username: String,

    /// Shared HMAC secret. Must match the server's JWT_SECRET.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    secret: String,

    /// Token lifetime in milliseconds.
    #[arg(long, env = "JWT_EXPIRATION_MS", default_value_t = 86_400_000)]
    lifetime_ms: i64,

    /// Override issued-at (unix milliseconds). Default: now.
    #[arg(long)]
    issued_at_ms: Option<i64>,

    /// Verify the minted token and print its claims as well.
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    // Same .env the server reads, so the secret matches without flags.
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let service =
        TokenService::new(&args.secret, args.lifetime_ms).context("invalid token settings")?;

    let now: DateTime<Utc> = match args.issued_at_ms {
        Some(ms) => DateTime::from_timestamp_millis(ms).context("issued-at out of range")?,
        None => Utc::now(),
    };

    let token = service
        .issue_at(&args.username, now)
        .context("failed to issue token")?;

    println!("{token}");

    if args.verbose {
        match service.verify(&token) {
            Ok(verified) => {
                eprintln!("sub: {}", verified.username);
                if let Some(exp) = verified.expires_at.to_datetime() {
                    eprintln!("exp: {}", exp.to_rfc3339());
                }
            }
            Err(e) => eprintln!("token does not verify now: {e}"),
        }
    }

    Ok(())
}
