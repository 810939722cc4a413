use bridal_db::{migrations, DemoDataset, SeedResult};

use crate::commands::{exit, open_pool, prepare, CommandResult, Failure};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let outcome = load_and_verify(&pool).await;
        pool.close().await;
        outcome
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", render_summary(&seeded)),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("seed", error_class, message, exit_code)
        }
    }
}

async fn load_and_verify(pool: &bridal_db::DbPool) -> Result<SeedResult, Failure> {
    migrations::run_pending(pool)
        .await
        .map_err(|error| ("migration", error.to_string(), exit::MIGRATION))?;

    let seeded = DemoDataset::load(pool)
        .await
        .map_err(|error| ("seed_execution", error.to_string(), exit::SEED))?;

    let verification = DemoDataset::verify(pool)
        .await
        .map_err(|error| ("seed_verification", error.to_string(), exit::SEED_VERIFICATION))?;

    if !verification.all_present {
        let failed = verification
            .checks
            .iter()
            .filter_map(|(check, passed)| (!passed).then_some(check.as_str()))
            .collect::<Vec<_>>();
        return Err(("seed_verification", verification_message(&failed), exit::SEED_VERIFICATION));
    }

    Ok(seeded)
}

fn verification_message(failed: &[&str]) -> String {
    if failed.is_empty() {
        "some demo data failed to load".to_string()
    } else {
        format!("demo data verification failed for: {}", failed.join(", "))
    }
}

fn render_summary(seeded: &SeedResult) -> String {
    let mut lines = vec![format!(
        "demo dataset loaded: {} users, {} resources",
        seeded.users.len(),
        seeded.resources
    )];
    lines.extend(
        seeded.sessions.iter().map(|(email, token)| format!("  - session for {email}: {token}")),
    );
    lines.join("\n")
}
