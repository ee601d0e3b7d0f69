use async_trait::async_trait;
use sqlx::PgPool;

use crate::models::user::UserProfile;

use super::user_repository::UserRepository;

pub struct PostgresUserRepository {
    pub pool: PgPool,
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_user_profile(&self, user_id: i64) -> Result<Option<UserProfile>, sqlx::Error> {
        sqlx::query_as::<_, UserProfile>(
            r#"
            SELECT u.id,
                   u.commission_balance,
                   u.transfer_enable,
                   u.u AS upload,
                   u.d AS download,
                   u.expired_at,
                   p.name AS plan_name
            FROM users u
            LEFT JOIN plans p ON p.id = u.plan_id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }
}
