use mongodb::{
    bson::{doc, Document},
    options::IndexOptions,
    Client, Database, IndexModel,
};

use crate::config::AppConfig;
use crate::database::{AUDIT_LOGS, CAMPAIGNS, DONATIONS, NOTIFICATIONS, USERS};
use crate::errors::Result;

pub async fn connect(config: &AppConfig) -> Result<Database> {
    let client = Client::with_uri_str(&config.database_url).await?;
    let db = client.database(&config.database_name);

    db.run_command(doc! { "ping": 1 }).await?;
    tracing::info!(database = %config.database_name, "connected to MongoDB");

    ensure_indexes(&db).await?;
    Ok(db)
}

fn index(keys: Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn unique_index(keys: Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

/// Creates the indexes every query path relies on. Idempotent.
pub async fn ensure_indexes(db: &Database) -> Result<()> {
    let specs: [(&str, IndexModel); 9] = [
        (USERS, unique_index(doc! { "email": 1 })),
        // One donation per gateway intent; the completion swap keys on it.
        (DONATIONS, unique_index(doc! { "payment.paymentId": 1 })),
        (DONATIONS, index(doc! { "campaign": 1, "createdAt": -1 })),
        (DONATIONS, index(doc! { "donor": 1, "createdAt": -1 })),
        (DONATIONS, index(doc! { "donorEmail": 1, "status": 1 })),
        (CAMPAIGNS, index(doc! { "status": 1, "createdAt": -1 })),
        (CAMPAIGNS, index(doc! { "creator": 1 })),
        (AUDIT_LOGS, index(doc! { "createdAt": -1 })),
        (NOTIFICATIONS, index(doc! { "recipient": 1, "createdAt": -1 })),
    ];

    for (collection, model) in specs {
        db.collection::<Document>(collection)
            .create_index(model)
            .await?;
    }

    tracing::info!("database indexes ensured");
    Ok(())
}
