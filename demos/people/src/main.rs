use ormq::prelude::*;
use sqlx::Sqlite;
use std::path::Path;

mod models;

use models::{CreatePersonRequest, Person, UpdatePersonRequest, PEOPLE_DDL};

type People = CrudRepository<Person, Sqlite>;

fn person(country: &str, name: &str, surname: &str) -> Record {
    Record::new()
        .set("country", country)
        .set("name", name)
        .set("surname", surname)
}

async fn create_tables(provider: &SessionProvider<Sqlite>) -> Result<(), DataError> {
    sqlx::query(PEOPLE_DDL)
        .execute(provider.pool()?)
        .await
        .map_err(|e| e.into_data_error())?;
    provider.install_audit_table().await
}

/// Create, read, update and delete through the façade.
async fn crud(people: &People) -> Result<(), DataError> {
    people
        .bulk_create(vec![
            person("AZ", "Amrah", "Baghirov"),
            person("EN", "Shukran", "Jabbarov"),
            person("RU", "Amrah", "Suleymanli"),
        ])
        .await?;

    let all = people.select_all(Query::all()).await?;
    tracing::info!(count = all.len(), "All entries");

    let kerims = people.select_all(Predicate::eq("name", "Kerim")).await?;
    tracing::info!(count = kerims.len(), "Entries named Kerim");

    let entry = people.select_one(Predicate::eq("country", "AZ")).await?;
    tracing::info!(id = entry.id, name = %entry.name, "First AZ entry");

    let entry = people
        .select_one(Predicate::eq("country", "AZ").and(Predicate::eq("name", "Amrah")))
        .await?;
    tracing::info!(id = entry.id, surname = %entry.surname, "AZ entry named Amrah");

    let updated = people
        .update(Record::new().set("name", "Ulvi"), Predicate::eq("country", "AZ"))
        .await?;
    tracing::info!(rows = updated, "Renamed AZ entries");

    // Validation runs before any statement.
    if let Err(err) = people
        .update(Record::new().set("country", "Azerbaijan"), Predicate::eq("country", "AZ"))
        .await
    {
        tracing::warn!(error = %err, "Rejected update");
    }

    let deleted = people.soft_delete(Predicate::eq("country", "AZ")).await?;
    tracing::info!(rows = deleted, "Soft-deleted AZ entries");

    let remaining = people.count(Filter::all()).await?;
    let including_deleted = people.count(Filter::all().include_deleted()).await?;
    tracing::info!(remaining, including_deleted, "Entries after soft delete");

    let restored = people.restore(Predicate::eq("country", "AZ")).await?;
    tracing::info!(rows = restored, "Restored AZ entries");
    Ok(())
}

async fn pagination(people: &People) -> Result<(), DataError> {
    let page = people.select_with_pagination(1, 1, Query::all()).await?;
    let (total, pages) = (page.total, page.pages);
    let names = serde_json::to_string(&page.map(|p| p.name)).unwrap_or_default();
    tracing::info!(total, pages, "Page 1: {names}");

    let page = people
        .select_with_pagination(1, 1, Predicate::eq("name", "Amrah"))
        .await?;
    tracing::info!(total = page.total, has_next = page.has_next(), "Paged Amrahs");
    Ok(())
}

/// Several operations committed together, or not at all.
async fn unit_of_work(
    provider: &SessionProvider<Sqlite>,
    people: &People,
) -> Result<(), DataError> {
    let repo = people.clone();
    let result = provider
        .transactional(move |session| {
            async move {
                let moved = repo
                    .update_in(
                        session,
                        Record::new().set("country", "EN"),
                        Predicate::eq("country", "RU"),
                    )
                    .await?;
                if moved > 0 {
                    return Err(DataError::Other("refusing to move entries to EN".into()));
                }
                Ok::<_, DataError>(moved)
            }
            .boxed()
        })
        .await;
    if let Err(err) = result {
        tracing::warn!(error = %err, "Unit of work rolled back");
    }

    let still_ru = people.count(Predicate::eq("country", "RU")).await?;
    tracing::info!(rows = still_ru, "RU entries after rollback");
    Ok(())
}

async fn audit_trail(provider: &SessionProvider<Sqlite>) -> Result<(), DataError> {
    let logs = CrudRepository::<AuditLog, Sqlite>::new(provider.clone());
    for log in logs.select_all(Query::all().order_by("id")).await? {
        tracing::info!(
            table = %log.table_name,
            entity_id = %log.entity_id,
            operation = %log.operation,
            changes = %log.changes.0,
            "Audit record"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,ormq_data_sqlx=debug")),
        )
        .init();

    let config = DataConfig::load_from(Path::new(env!("CARGO_MANIFEST_DIR")), "dev")?;
    let provider = SessionProvider::<Sqlite>::connect(&config).await?;
    create_tables(&provider).await?;

    let people = People::new(provider.clone()).with_validator(
        Schema::<CreatePersonRequest>::new().with_updates::<UpdatePersonRequest>(),
    );

    crud(&people).await?;
    pagination(&people).await?;
    unit_of_work(&provider, &people).await?;
    audit_trail(&provider).await?;

    let purged = people.bulk_delete(vec![Filter::all()]).await?;
    tracing::info!(rows = purged, "Purged all entries");
    Ok(())
}
