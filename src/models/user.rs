use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

/// Read-only view of a panel user joined with their plan.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserProfile {
    pub id: i64,
    /// Referral earnings in minor currency units.
    pub commission_balance: i64,
    /// Traffic quota in bytes.
    pub transfer_enable: i64,
    pub upload: i64,
    pub download: i64,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expired_at: Option<OffsetDateTime>,
    pub plan_name: Option<String>,
}

impl UserProfile {
    pub fn remaining_traffic(&self) -> i64 {
        self.transfer_enable - self.upload - self.download
    }

    pub fn has_plan(&self) -> bool {
        self.plan_name.is_some()
    }
}
