use sea_orm::sea_query::{ColumnDef, Index, IndexCreateStatement, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{api_keys, invoices, payments, profiles, services, webhooks};
use crate::errors::StorageError;
use nanopay_domain::storage::StorageResult;

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let profiles_table = Table::create()
        .table(profiles::Entity)
        .col(
            ColumnDef::new(profiles::Column::UserId)
                .string_len(36)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(profiles::Column::Name).string_len(40).not_null())
        .col(ColumnDef::new(profiles::Column::Email).string_len(128).not_null())
        .col(
            ColumnDef::new(profiles::Column::AvatarUrl)
                .string_len(256)
                .not_null(),
        )
        .col(
            ColumnDef::new(profiles::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, profiles_table).await?;

    let services_table = Table::create()
        .table(services::Entity)
        .col(
            ColumnDef::new(services::Column::Id)
                .string_len(36)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(services::Column::UserId).string_len(36).not_null())
        .col(
            ColumnDef::new(services::Column::Name)
                .string_len(40)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(services::Column::DisplayName)
                .string_len(40)
                .not_null(),
        )
        .col(ColumnDef::new(services::Column::AvatarUrl).string_len(256).null())
        .col(ColumnDef::new(services::Column::Description).string_len(512).null())
        .col(ColumnDef::new(services::Column::Website).string_len(256).null())
        .col(ColumnDef::new(services::Column::ContactEmail).string_len(128).null())
        .col(
            ColumnDef::new(services::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, services_table).await?;

    let invoices_table = Table::create()
        .table(invoices::Entity)
        .col(
            ColumnDef::new(invoices::Column::Id)
                .string_len(36)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(invoices::Column::ServiceId)
                .string_len(36)
                .not_null(),
        )
        .col(ColumnDef::new(invoices::Column::Title).string_len(40).not_null())
        .col(ColumnDef::new(invoices::Column::Description).string_len(512).null())
        .col(ColumnDef::new(invoices::Column::Price).string_len(40).not_null())
        .col(
            ColumnDef::new(invoices::Column::RecipientAddress)
                .string_len(65)
                .not_null(),
        )
        .col(ColumnDef::new(invoices::Column::Metadata).text().null())
        .col(ColumnDef::new(invoices::Column::RedirectUrl).string_len(512).null())
        .col(ColumnDef::new(invoices::Column::Currency).string_len(8).not_null())
        .col(ColumnDef::new(invoices::Column::Status).string_len(16).not_null())
        .col(
            ColumnDef::new(invoices::Column::PayAddress)
                .string_len(65)
                .not_null(),
        )
        .col(
            ColumnDef::new(invoices::Column::ReceivedAmount)
                .string_len(40)
                .not_null(),
        )
        .col(
            ColumnDef::new(invoices::Column::RefundedAmount)
                .string_len(40)
                .not_null(),
        )
        .col(
            ColumnDef::new(invoices::Column::ExpiresAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(invoices::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, invoices_table).await?;

    let payments_table = Table::create()
        .table(payments::Entity)
        .col(
            ColumnDef::new(payments::Column::Hash)
                .string_len(64)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(payments::Column::Id).string_len(36).not_null())
        .col(
            ColumnDef::new(payments::Column::InvoiceId)
                .string_len(36)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::FromAddress)
                .string_len(65)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::ToAddress)
                .string_len(65)
                .not_null(),
        )
        .col(ColumnDef::new(payments::Column::Amount).string_len(40).not_null())
        .col(
            ColumnDef::new(payments::Column::Timestamp)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, payments_table).await?;

    let api_keys_table = Table::create()
        .table(api_keys::Entity)
        .col(
            ColumnDef::new(api_keys::Column::Id)
                .string_len(36)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(api_keys::Column::ServiceId)
                .string_len(36)
                .not_null(),
        )
        .col(ColumnDef::new(api_keys::Column::Name).string_len(40).not_null())
        .col(
            ColumnDef::new(api_keys::Column::Description)
                .string_len(512)
                .not_null(),
        )
        .col(
            ColumnDef::new(api_keys::Column::KeyHash)
                .string_len(64)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(api_keys::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, api_keys_table).await?;

    let webhooks_table = Table::create()
        .table(webhooks::Entity)
        .col(
            ColumnDef::new(webhooks::Column::Id)
                .string_len(36)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(webhooks::Column::ServiceId)
                .string_len(36)
                .not_null(),
        )
        .col(ColumnDef::new(webhooks::Column::Name).string_len(40).not_null())
        .col(ColumnDef::new(webhooks::Column::Url).string_len(512).not_null())
        .col(ColumnDef::new(webhooks::Column::Active).boolean().not_null())
        .col(ColumnDef::new(webhooks::Column::EventTypes).text().not_null())
        .col(
            ColumnDef::new(webhooks::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, webhooks_table).await?;

    create_index(
        db,
        backend,
        Index::create()
            .name("idx_invoices_service_id")
            .table(invoices::Entity)
            .col(invoices::Column::ServiceId)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("idx_invoices_status")
            .table(invoices::Entity)
            .col(invoices::Column::Status)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("idx_payments_invoice_id")
            .table(payments::Entity)
            .col(payments::Column::InvoiceId)
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("idx_services_user_id")
            .table(services::Entity)
            .col(services::Column::UserId)
            .to_owned(),
    )
    .await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: IndexCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
