use sqlx::SqlitePool;

use crate::errors::{RegisterError, RentError};
use crate::mpesa::ParsedPayment;
use crate::structs::{RentRecord, RentRow, Tenant, User};
use crate::utils;

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// Creates a user with an argon2 digest of the password; the plaintext is
/// never stored. A taken username surfaces as `DuplicateUsername`.
pub async fn create_user(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<User, RegisterError> {
    let password_hash =
        utils::hash_password(password).map_err(|e| RegisterError::Password(e.to_string()))?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password_hash) VALUES (?, ?) RETURNING *",
    )
    .bind(username)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => RegisterError::DuplicateUsername,
        _ => RegisterError::Database(e),
    })?;

    log::info!("User {} registered (id {})", user.username, user.id);
    Ok(user)
}

/// Checks credentials. `None` covers both an unknown username and a digest
/// mismatch, so the caller cannot tell which one failed.
pub async fn authenticate(
    pool: &SqlitePool,
    username: &str,
    password: &str,
) -> Result<Option<User>, sqlx::Error> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    Ok(user.filter(|u| utils::verify_password(password, &u.password_hash)))
}

/// Data access scoped to one authenticated user at construction. Every
/// query it issues filters on that user's id, so rows owned by anyone else
/// are structurally out of reach.
pub struct UserStore<'a> {
    pool: &'a SqlitePool,
    user_id: i64,
}

impl<'a> UserStore<'a> {
    pub fn scoped(pool: &'a SqlitePool, user_id: i64) -> Self {
        Self { pool, user_id }
    }

    pub async fn tenants(&self) -> Result<Vec<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE user_id = ?")
            .bind(self.user_id)
            .fetch_all(self.pool)
            .await
    }

    pub async fn add_tenant(&self, name: &str, phone: &str) -> Result<Tenant, sqlx::Error> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenants (user_id, name, phone) VALUES (?, ?, ?) RETURNING *",
        )
        .bind(self.user_id)
        .bind(name)
        .bind(phone)
        .fetch_one(self.pool)
        .await?;
        log::info!("Tenant {} created (id {})", tenant.name, tenant.id);
        Ok(tenant)
    }

    /// Silent no-op when the tenant does not belong to this user.
    pub async fn delete_tenant(&self, tenant_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM tenants WHERE id = ? AND user_id = ?")
            .bind(tenant_id)
            .bind(self.user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    pub async fn tenant_by_phone(&self, phone: &str) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE user_id = ? AND phone = ?")
            .bind(self.user_id)
            .bind(phone)
            .fetch_optional(self.pool)
            .await
    }

    /// All rent records with the tenant name joined in, newest collection
    /// date first. The ordering is lexicographic on the stored string; the
    /// store writes zero-padded YYYY-MM-DD, but manually entered dates are
    /// taken as-is and may sort out of calendar order.
    pub async fn rent_records(&self) -> Result<Vec<RentRow>, sqlx::Error> {
        sqlx::query_as::<_, RentRow>(
            r#"
            SELECT r.id, r.tenant_id, t.name AS tenant_name, r.month, r.amount,
                   r.date_collected, r.notes, r.mpesa_code
            FROM rent r
            JOIN tenants t ON r.tenant_id = t.id
            WHERE r.user_id = ?
            ORDER BY r.date_collected DESC
            "#,
        )
        .bind(self.user_id)
        .fetch_all(self.pool)
        .await
    }

    pub async fn rent_record(&self, record_id: i64) -> Result<Option<RentRecord>, sqlx::Error> {
        sqlx::query_as::<_, RentRecord>("SELECT * FROM rent WHERE id = ? AND user_id = ?")
            .bind(record_id)
            .bind(self.user_id)
            .fetch_optional(self.pool)
            .await
    }

    /// Manual rent entry. The tenant must belong to this user; that cannot
    /// be left to the store since SQLite does not check ownership across
    /// tables for us.
    pub async fn add_rent(
        &self,
        tenant_id: i64,
        month: &str,
        amount: f64,
        date_collected: &str,
        notes: Option<&str>,
    ) -> Result<i64, RentError> {
        let owned = sqlx::query("SELECT id FROM tenants WHERE id = ? AND user_id = ?")
            .bind(tenant_id)
            .bind(self.user_id)
            .fetch_optional(self.pool)
            .await?;
        if owned.is_none() {
            return Err(RentError::UnknownTenant);
        }

        let result = sqlx::query(
            "INSERT INTO rent (user_id, tenant_id, month, amount, date_collected, notes)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(self.user_id)
        .bind(tenant_id)
        .bind(month)
        .bind(amount)
        .bind(date_collected)
        .bind(notes)
        .execute(self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Silent no-op when the record does not belong to this user.
    pub async fn update_rent(
        &self,
        record_id: i64,
        month: &str,
        amount: f64,
        date_collected: &str,
        notes: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE rent SET month = ?, amount = ?, date_collected = ?, notes = ?
             WHERE id = ? AND user_id = ?",
        )
        .bind(month)
        .bind(amount)
        .bind(date_collected)
        .bind(notes)
        .bind(record_id)
        .bind(self.user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Silent no-op when the record does not belong to this user.
    pub async fn delete_rent(&self, record_id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM rent WHERE id = ? AND user_id = ?")
            .bind(record_id)
            .bind(self.user_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Reconcile-or-create for a parsed M-PESA payment: attach the record
    /// to the tenant already registered under that phone number, or create
    /// one from the parsed name. Runs in a single transaction so two
    /// submissions for the same new number cannot both insert a tenant.
    ///
    /// The SMS date token lands in `month`; `date_collected` is set to
    /// today. Legacy field semantics, kept on purpose.
    pub async fn record_payment(&self, payment: &ParsedPayment) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM tenants WHERE user_id = ? AND phone = ?")
                .bind(self.user_id)
                .bind(&payment.phone)
                .fetch_optional(&mut *tx)
                .await?;

        // An existing tenant's name is authoritative; the parsed name is
        // only used when the phone number is new.
        let tenant_id = match existing {
            Some((id,)) => id,
            None => {
                let (id,): (i64,) = sqlx::query_as(
                    "INSERT INTO tenants (user_id, name, phone) VALUES (?, ?, ?) RETURNING id",
                )
                .bind(self.user_id)
                .bind(&payment.name)
                .bind(&payment.phone)
                .fetch_one(&mut *tx)
                .await?;
                log::info!("Tenant auto-created from M-PESA message (id {})", id);
                id
            }
        };

        sqlx::query(
            "INSERT INTO rent (user_id, tenant_id, month, amount, date_collected)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(self.user_id)
        .bind(tenant_id)
        .bind(&payment.date_token)
        .bind(payment.amount)
        .bind(today())
        .execute(&mut *tx)
        .await?;

        tx.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::migrate!().run(&pool).await.unwrap();
        pool
    }

    fn payment(name: &str, phone: &str, amount: f64) -> ParsedPayment {
        ParsedPayment {
            amount,
            name: name.to_owned(),
            phone: phone.to_owned(),
            date_token: "05/06/24".to_owned(),
        }
    }

    #[tokio::test]
    async fn register_then_authenticate_round_trips() {
        let pool = test_pool().await;
        let created = create_user(&pool, "landlord", "s3cret-s3cret").await.unwrap();

        let user = authenticate(&pool, "landlord", "s3cret-s3cret")
            .await
            .unwrap()
            .expect("credentials should be accepted");
        assert_eq!(user.id, created.id);
    }

    #[tokio::test]
    async fn bad_password_and_unknown_user_fail_alike() {
        let pool = test_pool().await;
        create_user(&pool, "landlord", "s3cret-s3cret").await.unwrap();

        assert!(authenticate(&pool, "landlord", "wrong").await.unwrap().is_none());
        assert!(authenticate(&pool, "nobody", "wrong").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let pool = test_pool().await;
        create_user(&pool, "landlord", "one-password").await.unwrap();

        let err = create_user(&pool, "landlord", "other-password")
            .await
            .unwrap_err();
        assert!(matches!(err, RegisterError::DuplicateUsername));
    }

    #[tokio::test]
    async fn stored_digest_is_not_the_plaintext() {
        let pool = test_pool().await;
        let user = create_user(&pool, "landlord", "plain-text-pwd").await.unwrap();
        assert_ne!(user.password_hash, "plain-text-pwd");
    }

    #[tokio::test]
    async fn users_cannot_see_each_others_rows() {
        let pool = test_pool().await;
        let alice = create_user(&pool, "alice", "password-one").await.unwrap();
        let bob = create_user(&pool, "bob", "password-two").await.unwrap();

        let alice_store = UserStore::scoped(&pool, alice.id);
        let bob_store = UserStore::scoped(&pool, bob.id);

        let tenant = alice_store.add_tenant("John Doe", "0712345678").await.unwrap();
        alice_store
            .add_rent(tenant.id, "June", 1500.0, "2024-06-05", None)
            .await
            .unwrap();

        assert!(bob_store.tenants().await.unwrap().is_empty());
        assert!(bob_store.rent_records().await.unwrap().is_empty());
        assert!(bob_store
            .tenant_by_phone("0712345678")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn cross_user_mutations_are_no_ops() {
        let pool = test_pool().await;
        let alice = create_user(&pool, "alice", "password-one").await.unwrap();
        let bob = create_user(&pool, "bob", "password-two").await.unwrap();

        let alice_store = UserStore::scoped(&pool, alice.id);
        let bob_store = UserStore::scoped(&pool, bob.id);

        let tenant = alice_store.add_tenant("John Doe", "0712345678").await.unwrap();
        let record_id = alice_store
            .add_rent(tenant.id, "June", 1500.0, "2024-06-05", None)
            .await
            .unwrap();

        bob_store.delete_tenant(tenant.id).await.unwrap();
        bob_store.delete_rent(record_id).await.unwrap();
        bob_store
            .update_rent(record_id, "July", 9.0, "2024-07-01", None)
            .await
            .unwrap();

        assert_eq!(alice_store.tenants().await.unwrap().len(), 1);
        let records = alice_store.rent_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].month, "June");
        assert_eq!(records[0].amount, 1500.0);
    }

    #[tokio::test]
    async fn adding_rent_against_foreign_tenant_is_denied() {
        let pool = test_pool().await;
        let alice = create_user(&pool, "alice", "password-one").await.unwrap();
        let bob = create_user(&pool, "bob", "password-two").await.unwrap();

        let tenant = UserStore::scoped(&pool, alice.id)
            .add_tenant("John Doe", "0712345678")
            .await
            .unwrap();

        let err = UserStore::scoped(&pool, bob.id)
            .add_rent(tenant.id, "June", 1500.0, "2024-06-05", None)
            .await
            .unwrap_err();
        assert!(matches!(err, RentError::UnknownTenant));
    }

    #[tokio::test]
    async fn payment_for_known_phone_attaches_to_existing_tenant() {
        let pool = test_pool().await;
        let user = create_user(&pool, "landlord", "password-one").await.unwrap();
        let store = UserStore::scoped(&pool, user.id);

        let tenant = store.add_tenant("John Doe", "0712345678").await.unwrap();
        store
            .record_payment(&payment("Jon Do", "0712345678", 1500.0))
            .await
            .unwrap();

        // No duplicate tenant, and the registered name stays authoritative.
        let tenants = store.tenants().await.unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].name, "John Doe");

        let records = store.rent_records().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tenant_id, tenant.id);
        assert_eq!(records[0].tenant_name, "John Doe");
    }

    #[tokio::test]
    async fn payment_for_unseen_phone_creates_one_tenant() {
        let pool = test_pool().await;
        let user = create_user(&pool, "landlord", "password-one").await.unwrap();
        let store = UserStore::scoped(&pool, user.id);

        store
            .record_payment(&payment("Mary Wanjiku", "0700111222", 2000.0))
            .await
            .unwrap();

        let tenants = store.tenants().await.unwrap();
        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].name, "Mary Wanjiku");
        assert_eq!(tenants[0].phone, "0700111222");
    }

    #[tokio::test]
    async fn payment_date_token_lands_in_month_field() {
        let pool = test_pool().await;
        let user = create_user(&pool, "landlord", "password-one").await.unwrap();
        let store = UserStore::scoped(&pool, user.id);

        store
            .record_payment(&payment("Mary Wanjiku", "0700111222", 2000.0))
            .await
            .unwrap();

        let records = store.rent_records().await.unwrap();
        assert_eq!(records[0].month, "05/06/24");
        assert_ne!(records[0].date_collected, "05/06/24");
    }

    #[tokio::test]
    async fn rent_records_sort_newest_collection_date_first() {
        let pool = test_pool().await;
        let user = create_user(&pool, "landlord", "password-one").await.unwrap();
        let store = UserStore::scoped(&pool, user.id);
        let tenant = store.add_tenant("John Doe", "0712345678").await.unwrap();

        store
            .add_rent(tenant.id, "May", 1500.0, "2024-05-05", None)
            .await
            .unwrap();
        store
            .add_rent(tenant.id, "July", 1500.0, "2024-07-05", None)
            .await
            .unwrap();
        store
            .add_rent(tenant.id, "June", 1500.0, "2024-06-05", None)
            .await
            .unwrap();

        let dates: Vec<String> = store
            .rent_records()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.date_collected)
            .collect();
        assert_eq!(dates, vec!["2024-07-05", "2024-06-05", "2024-05-05"]);
    }

    #[tokio::test]
    async fn edit_and_delete_apply_to_owned_records() {
        let pool = test_pool().await;
        let user = create_user(&pool, "landlord", "password-one").await.unwrap();
        let store = UserStore::scoped(&pool, user.id);
        let tenant = store.add_tenant("John Doe", "0712345678").await.unwrap();
        let record_id = store
            .add_rent(tenant.id, "June", 1500.0, "2024-06-05", Some("deposit"))
            .await
            .unwrap();

        store
            .update_rent(record_id, "June", 1800.0, "2024-06-06", Some("topped up"))
            .await
            .unwrap();
        let record = store.rent_record(record_id).await.unwrap().unwrap();
        assert_eq!(record.amount, 1800.0);
        assert_eq!(record.notes.as_deref(), Some("topped up"));

        store.delete_rent(record_id).await.unwrap();
        assert!(store.rent_record(record_id).await.unwrap().is_none());
    }
}
