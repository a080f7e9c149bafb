use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct Tenant {
    pub id: i64,
    pub user_id: i64,
    pub name: String,
    pub phone: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct RentRecord {
    pub id: i64,
    pub user_id: i64,
    pub tenant_id: i64,
    pub month: String,
    pub amount: f64,
    pub date_collected: String,
    pub notes: Option<String>,
    pub mpesa_code: Option<String>,
}

/// Rent record joined with the owning tenant's name, as listed on the
/// dashboard and exported to CSV.
#[derive(Deserialize, Serialize, Debug, Clone, FromRow)]
pub struct RentRow {
    pub id: i64,
    pub tenant_id: i64,
    pub tenant_name: String,
    pub month: String,
    pub amount: f64,
    pub date_collected: String,
    pub notes: Option<String>,
    pub mpesa_code: Option<String>,
}
