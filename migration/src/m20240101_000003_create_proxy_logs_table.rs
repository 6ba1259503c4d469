use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProxyLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProxyLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ProxyLogs::UserId).integer())
                    .col(
                        ColumnDef::new(ProxyLogs::RequestId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProxyLogs::RemoteAddr).string_len(64))
                    .col(
                        ColumnDef::new(ProxyLogs::RequestTime)
                            .timestamp()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProxyLogs::RequestMethod)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProxyLogs::RequestUrl).text().not_null())
                    .col(ColumnDef::new(ProxyLogs::RequestHeaders).text().not_null())
                    .col(ColumnDef::new(ProxyLogs::RequestBody).text())
                    .col(ColumnDef::new(ProxyLogs::ResponseStatusCode).integer())
                    .col(ColumnDef::new(ProxyLogs::ResponseHeaders).text())
                    .col(ColumnDef::new(ProxyLogs::ResponseBody).text())
                    .col(
                        ColumnDef::new(ProxyLogs::Outcome)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProxyLogs::ErrorMessage).text())
                    .col(
                        ColumnDef::new(ProxyLogs::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_proxy_logs_user_id")
                            .from(ProxyLogs::Table, ProxyLogs::UserId)
                            .to(Users::Table, Users::Id)
                            .on_update(ForeignKeyAction::Cascade)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_proxy_logs_user_id")
                    .table(ProxyLogs::Table)
                    .col(ProxyLogs::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_proxy_logs_created_at")
                    .table(ProxyLogs::Table)
                    .col(ProxyLogs::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProxyLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProxyLogs {
    Table,
    Id,
    UserId,
    RequestId,
    RemoteAddr,
    RequestTime,
    RequestMethod,
    RequestUrl,
    RequestHeaders,
    RequestBody,
    ResponseStatusCode,
    ResponseHeaders,
    ResponseBody,
    Outcome,
    ErrorMessage,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Users {
    Table,
    Id,
}
