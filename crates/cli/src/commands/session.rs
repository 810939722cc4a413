use bridal_core::domain::user::hash_session_token;
use bridal_db::repositories::{SqlUserRepository, UserRepository};
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::commands::{exit, open_pool, prepare, CommandResult, Failure};

/// Creates a session for the account registered under `email` and prints the
/// plain token. Only its hash is stored.
pub fn run(email: &str, ttl_hours: Option<u32>) -> CommandResult {
    let (config, runtime) = match prepare("session") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };
    let ttl_hours = ttl_hours.unwrap_or(config.auth.session_ttl_hours);
    if ttl_hours == 0 {
        return CommandResult::failure(
            "session",
            "invalid_argument",
            "--ttl-hours must be at least 1",
            exit::CONFIG,
        );
    }

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let issued = issue(&SqlUserRepository::new(pool.clone()), email, ttl_hours).await;
        pool.close().await;
        issued
    });

    match result {
        Ok(token) => CommandResult::success(
            "session",
            format!(
                "session for {email} valid for {ttl_hours}h; send it as the `{}` cookie: {token}",
                config.auth.session_cookie
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("session", error_class, message, exit_code)
        }
    }
}

async fn issue(users: &dyn UserRepository, email: &str, ttl_hours: u32) -> Result<String, Failure> {
    let user = users
        .find_by_email(email.trim())
        .await
        .map_err(|error| ("session_write", error.to_string(), exit::SESSION))?
        .ok_or_else(|| ("unknown_user", format!("no account uses `{email}`"), exit::UNKNOWN_USER))?;

    let token = new_token();
    let expires_at = Utc::now() + Duration::hours(i64::from(ttl_hours));
    users
        .create_session(&user.id, &hash_session_token(&token), expires_at)
        .await
        .map_err(|error| ("session_write", error.to_string(), exit::SESSION))?;

    Ok(token)
}

fn new_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}
