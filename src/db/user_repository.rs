use async_trait::async_trait;

use crate::models::user::UserProfile;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user_profile(&self, user_id: i64) -> Result<Option<UserProfile>, sqlx::Error>;
}
