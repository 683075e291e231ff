use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(Transactions::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(Transactions::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key()
                )
                .col(ColumnDef::new(Transactions::UserId).big_integer().not_null())
                .col(ColumnDef::new(Transactions::TxType).string_len(32).not_null())
                .col(ColumnDef::new(Transactions::Amount).string_len(64).not_null())
                .col(ColumnDef::new(Transactions::Currency).string_len(8).not_null())
                .col(ColumnDef::new(Transactions::Status).string_len(16).not_null())
                .col(ColumnDef::new(Transactions::Description).text().not_null())
                .col(ColumnDef::new(Transactions::Metadata).text().not_null())
                .col(ColumnDef::new(Transactions::DedupKey).string().null())
                .col(ColumnDef::new(Transactions::SourceUserId).big_integer().null())
                .col(
                    ColumnDef::new(Transactions::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .to_owned()
        ).await?;

        // Backstop for double-crediting: NULL keys never collide
        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_transactions_user_dedup_key")
                .table(Transactions::Table)
                .col(Transactions::UserId)
                .col(Transactions::DedupKey)
                .unique()
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_transactions_user_created_at")
                .table(Transactions::Table)
                .col(Transactions::UserId)
                .col(Transactions::CreatedAt)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Transactions::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Transactions {
    Table,
    Id,
    UserId,
    TxType,
    Amount,
    Currency,
    Status,
    Description,
    Metadata,
    DedupKey,
    SourceUserId,
    CreatedAt,
}
