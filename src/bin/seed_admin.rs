//! Creates the first admin account, or promotes an existing user.
//!
//! Reads `DATABASE_URL`, `DATABASE_NAME`, `ADMIN_EMAIL`, `ADMIN_PASSWORD` and
//! optionally `ADMIN_NAME` from the environment (or `.env`).

use anyhow::{bail, Context};
use mongodb::{bson::doc, Client};

use impacthub_api::database::{connection::ensure_indexes, USERS};
use impacthub_api::models::common::now_bson;
use impacthub_api::models::user::{Role, User};
use impacthub_api::services::password::hash_blocking;

const MIN_PASSWORD_LEN: usize = 8;

fn env(key: &str) -> anyhow::Result<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{} must be set", key))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let database_url = env("DATABASE_URL")?;
    let database_name = env("DATABASE_NAME").unwrap_or_else(|_| "impacthub".to_string());
    let email = env("ADMIN_EMAIL")?.to_lowercase();
    let password = env("ADMIN_PASSWORD")?;
    let name = env("ADMIN_NAME").unwrap_or_else(|_| "Platform Admin".to_string());

    if password.len() < MIN_PASSWORD_LEN {
        bail!("ADMIN_PASSWORD must be at least {} characters", MIN_PASSWORD_LEN);
    }

    let client = Client::with_uri_str(&database_url).await?;
    let db = client.database(&database_name);
    ensure_indexes(&db).await?;
    let users = db.collection::<User>(USERS);

    if let Some(existing) = users.find_one(doc! { "email": &email }).await? {
        if existing.role == Role::Admin {
            tracing::info!(%email, "admin already exists, nothing to do");
            return Ok(());
        }
        users
            .update_one(
                doc! { "email": &email },
                doc! { "$set": {
                    "role": Role::Admin.as_str(),
                    "isActive": true,
                    "updatedAt": now_bson(),
                }},
            )
            .await?;
        tracing::info!(%email, from = %existing.role, "promoted existing user to admin");
        return Ok(());
    }

    let hash = hash_blocking(password).await?;
    let mut admin = User::new(name, email.clone(), hash, Role::Admin);
    admin.is_email_verified = true;
    users.insert_one(admin).await?;
    tracing::info!(%email, "admin account created");
    Ok(())
}
