use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.create_table(
            Table::create()
                .table(Users::Table)
                .if_not_exists()
                .col(
                    ColumnDef::new(Users::Id)
                        .big_integer()
                        .not_null()
                        .auto_increment()
                        .primary_key()
                )
                .col(ColumnDef::new(Users::TelegramId).big_integer().not_null())
                .col(ColumnDef::new(Users::Username).string().null())
                // Decimal amounts are stored as canonical strings
                .col(ColumnDef::new(Users::BalanceUni).string_len(64).not_null().default("0"))
                .col(ColumnDef::new(Users::BalanceTon).string_len(64).not_null().default("0"))
                .col(ColumnDef::new(Users::UniDepositAmount).string_len(64).null())
                .col(ColumnDef::new(Users::UniFarmingRate).string_len(32).null())
                .col(
                    ColumnDef::new(Users::UniFarmingActive)
                        .boolean()
                        .not_null()
                        .default(false)
                )
                .col(ColumnDef::new(Users::UniFarmingStart).timestamp_with_time_zone().null())
                .col(
                    ColumnDef::new(Users::UniFarmingLastUpdate).timestamp_with_time_zone().null()
                )
                .col(ColumnDef::new(Users::TonBoostPackage).integer().null())
                .col(ColumnDef::new(Users::TonBoostRate).string_len(32).null())
                .col(ColumnDef::new(Users::TonBoostDeposit).string_len(64).null())
                .col(
                    ColumnDef::new(Users::TonBoostActive)
                        .boolean()
                        .not_null()
                        .default(false)
                )
                .col(ColumnDef::new(Users::TonBoostStart).timestamp_with_time_zone().null())
                .col(ColumnDef::new(Users::TonBoostLastUpdate).timestamp_with_time_zone().null())
                // Weak back-reference used for commission lookup only, no FK cascade
                .col(ColumnDef::new(Users::ReferredBy).big_integer().null())
                .col(ColumnDef::new(Users::IsActive).boolean().not_null().default(true))
                .col(
                    ColumnDef::new(Users::CreatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .col(
                    ColumnDef::new(Users::UpdatedAt)
                        .timestamp_with_time_zone()
                        .not_null()
                        .default(Expr::current_timestamp())
                )
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_users_telegram_id")
                .table(Users::Table)
                .col(Users::TelegramId)
                .unique()
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_users_referred_by")
                .table(Users::Table)
                .col(Users::ReferredBy)
                .to_owned()
        ).await?;

        // The accrual scheduler scans by these flags every tick
        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_users_uni_farming_active")
                .table(Users::Table)
                .col(Users::UniFarmingActive)
                .to_owned()
        ).await?;

        manager.create_index(
            Index::create()
                .if_not_exists()
                .name("idx_users_ton_boost_active")
                .table(Users::Table)
                .col(Users::TonBoostActive)
                .to_owned()
        ).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Users::Table).to_owned()).await
    }
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
    TelegramId,
    Username,
    BalanceUni,
    BalanceTon,
    UniDepositAmount,
    UniFarmingRate,
    UniFarmingActive,
    UniFarmingStart,
    UniFarmingLastUpdate,
    TonBoostPackage,
    TonBoostRate,
    TonBoostDeposit,
    TonBoostActive,
    TonBoostStart,
    TonBoostLastUpdate,
    ReferredBy,
    IsActive,
    CreatedAt,
    UpdatedAt,
}
