//! MongoDB connection bootstrap and migration runner.

use anyhow::{anyhow, Context};
use bookstore_kernel::settings::DatabaseSettings;
use bookstore_kernel::Migration;
use mongodb::bson::{doc, Document};
use mongodb::{Client, Database};

/// Connect to MongoDB and verify the server answers a `ping`.
pub async fn connect(settings: &DatabaseSettings) -> anyhow::Result<Database> {
    tracing::info!(target: "bookstore-db", database = %settings.name, "connecting to MongoDB");

    let client = Client::with_uri_str(&settings.uri)
        .await
        .context("failed to parse MongoDB connection string")?;
    let database = client.database(&settings.name);

    database
        .run_command(doc! { "ping": 1 })
        .await
        .context("MongoDB did not answer ping")?;

    tracing::info!(target: "bookstore-db", database = %settings.name, "MongoDB connection ready");
    Ok(database)
}

/// Convert a migration's JSON command into a BSON command document.
pub fn command_document(migration: &Migration) -> anyhow::Result<Document> {
    if !migration.command.is_object() {
        return Err(anyhow!(
            "migration '{}' command must be a JSON object",
            migration.id
        ));
    }
    mongodb::bson::to_document(&migration.command)
        .with_context(|| format!("migration '{}' is not a valid command", migration.id))
}

/// Run every migration command against the database, in order.
pub async fn apply_migrations(
    database: &Database,
    migrations: &[(String, Migration)],
) -> anyhow::Result<()> {
    for (module, migration) in migrations {
        let command = command_document(migration)?;
        tracing::info!(
            target: "bookstore-db",
            module = %module,
            migration = migration.id,
            "applying migration"
        );
        database
            .run_command(command)
            .await
            .with_context(|| format!("migration '{}/{}' failed", module, migration.id))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_index_command() {
        let migration = Migration {
            id: "001_indexes",
            command: json!({
                "createIndexes": "books",
                "indexes": [{ "key": { "slug": 1 }, "name": "slug_unique", "unique": true }]
            }),
        };

        let command = command_document(&migration).unwrap();
        assert_eq!(command.get_str("createIndexes").unwrap(), "books");
        let indexes = command.get_array("indexes").unwrap();
        assert_eq!(indexes.len(), 1);
    }

    #[test]
    fn rejects_non_object_command() {
        let migration = Migration {
            id: "bad",
            command: json!(["createIndexes"]),
        };
        assert!(command_document(&migration).is_err());
    }
}
