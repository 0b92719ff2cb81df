// src/repositories/account_repository.rs
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use crate::error::{ApiError, ApiResult};
use crate::models::{Account, ConsultantProfile, Role, StaffInfo, UpdateAccountRequest, UpdateStaffInfoRequest};

/// Fields of a new account; the password is already hashed.
pub struct NewAccount<'a> {
    pub full_name: &'a str,
    pub email: &'a str,
    pub phone: Option<&'a str>,
    pub password_hash: &'a str,
    pub role: Role,
}

pub struct AccountRepository;

impl AccountRepository {
    pub async fn create(pool: &SqlitePool, new: NewAccount<'_>) -> ApiResult<Account> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();
        let email = new.email.trim().to_lowercase();

        sqlx::query(
            r#"
            INSERT INTO accounts (id, full_name, email, phone, password_hash, role, is_active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
            "#
        )
            .bind(&id)
            .bind(new.full_name.trim())
            .bind(&email)
            .bind(new.phone)
            .bind(new.password_hash)
            .bind(new.role)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .map_err(|e| match ApiError::from(e) {
                ApiError::Conflict(_) => ApiError::conflict(&format!("Email '{}' is already registered", email)),
                other => other,
            })?;

        Self::get_required(pool, &id).await
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> ApiResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(account)
    }

    pub async fn get_required(pool: &SqlitePool, id: &str) -> ApiResult<Account> {
        Self::find_by_id(pool, id)
            .await?
            .ok_or_else(|| ApiError::not_found("Account"))
    }

    pub async fn find_by_email(pool: &SqlitePool, email: &str) -> ApiResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = ?")
            .bind(email.trim().to_lowercase())
            .fetch_optional(pool)
            .await?;
        Ok(account)
    }

    pub async fn count(pool: &SqlitePool) -> ApiResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }

    pub async fn list(
        pool: &SqlitePool,
        role: Option<Role>,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<Account>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM accounts WHERE (? IS NULL OR role = ?)"
        )
            .bind(role)
            .bind(role)
            .fetch_one(pool)
            .await?;

        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts WHERE (? IS NULL OR role = ?) ORDER BY created_at DESC LIMIT ? OFFSET ?"
        )
            .bind(role)
            .bind(role)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await?;

        Ok((accounts, total))
    }

    pub async fn update(pool: &SqlitePool, id: &str, update: &UpdateAccountRequest) -> ApiResult<Account> {
        let result = sqlx::query(
            r#"
            UPDATE accounts SET
                full_name = COALESCE(?, full_name),
                phone = COALESCE(?, phone),
                role = COALESCE(?, role),
                is_active = COALESCE(?, is_active),
                updated_at = ?
            WHERE id = ?
            "#
        )
            .bind(update.full_name.as_deref().map(str::trim))
            .bind(&update.phone)
            .bind(update.role)
            .bind(update.is_active)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Account"));
        }

        Self::get_required(pool, id).await
    }

    pub async fn update_password(pool: &SqlitePool, id: &str, password_hash: &str) -> ApiResult<()> {
        let result = sqlx::query("UPDATE accounts SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(password_hash)
            .bind(Utc::now())
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::not_found("Account"));
        }
        Ok(())
    }

    // ======== STAFF INFO ========

    pub async fn get_staff_info(pool: &SqlitePool, account_id: &str) -> ApiResult<Option<StaffInfo>> {
        let info = sqlx::query_as::<_, StaffInfo>("SELECT * FROM staff_info WHERE account_id = ?")
            .bind(account_id)
            .fetch_optional(pool)
            .await?;
        Ok(info)
    }

    pub async fn upsert_staff_info(
        pool: &SqlitePool,
        account_id: &str,
        info: &UpdateStaffInfoRequest,
    ) -> ApiResult<StaffInfo> {
        sqlx::query(
            r#"
            INSERT INTO staff_info (account_id, specialization, degree, experience_years, bio)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(account_id) DO UPDATE SET
                specialization = COALESCE(excluded.specialization, specialization),
                degree = COALESCE(excluded.degree, degree),
                experience_years = COALESCE(excluded.experience_years, experience_years),
                bio = COALESCE(excluded.bio, bio)
            "#
        )
            .bind(account_id)
            .bind(&info.specialization)
            .bind(&info.degree)
            .bind(info.experience_years)
            .bind(&info.bio)
            .execute(pool)
            .await?;

        Self::get_staff_info(pool, account_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Staff info"))
    }

    /// Active consultants with whatever profile data they have.
    pub async fn list_consultants(pool: &SqlitePool) -> ApiResult<Vec<ConsultantProfile>> {
        let consultants = sqlx::query_as::<_, ConsultantProfile>(
            r#"
            SELECT a.id, a.full_name, a.email,
                   s.specialization, s.degree, s.experience_years, s.bio
            FROM accounts a
            LEFT JOIN staff_info s ON s.account_id = a.id
            WHERE a.role = ? AND a.is_active = 1
            ORDER BY a.full_name ASC
            "#
        )
            .bind(Role::Consultant)
            .fetch_all(pool)
            .await?;
        Ok(consultants)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::*;

    fn new_account<'a>(email: &'a str, role: Role) -> NewAccount<'a> {
        NewAccount {
            full_name: "Le Van C",
            email,
            phone: Some("0901234567"),
            password_hash: "hash",
            role,
        }
    }

    #[actix_rt::test]
    async fn test_create_normalizes_email_and_rejects_duplicates() {
        let pool = test_pool().await;
        let account = AccountRepository::create(&pool, new_account(" User@Example.com ", Role::Customer)).await.unwrap();
        assert_eq!(account.email, "user@example.com");
        assert!(account.is_active);

        let found = AccountRepository::find_by_email(&pool, "USER@example.com").await.unwrap();
        assert!(found.is_some());

        let err = AccountRepository::create(&pool, new_account("user@example.com", Role::Customer)).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[actix_rt::test]
    async fn test_partial_update_keeps_other_fields() {
        let pool = test_pool().await;
        let account = AccountRepository::create(&pool, new_account("staff@example.com", Role::Customer)).await.unwrap();

        let update = UpdateAccountRequest {
            full_name: None,
            phone: None,
            role: Some(Role::Staff),
            is_active: None,
        };
        let updated = AccountRepository::update(&pool, &account.id, &update).await.unwrap();
        assert_eq!(updated.role, Role::Staff);
        assert_eq!(updated.full_name, "Le Van C");
        assert_eq!(updated.phone.as_deref(), Some("0901234567"));
    }

    #[actix_rt::test]
    async fn test_consultant_listing_includes_profile() {
        let pool = test_pool().await;
        let consultant = AccountRepository::create(&pool, new_account("doc@example.com", Role::Consultant)).await.unwrap();
        AccountRepository::create(&pool, new_account("cust@example.com", Role::Customer)).await.unwrap();

        let info = UpdateStaffInfoRequest {
            specialization: Some("Reproductive health".to_string()),
            degree: Some("MD".to_string()),
            experience_years: Some(8),
            bio: None,
        };
        AccountRepository::upsert_staff_info(&pool, &consultant.id, &info).await.unwrap();

        // A second upsert only touches the fields it carries
        let bio_only = UpdateStaffInfoRequest {
            specialization: None,
            degree: None,
            experience_years: None,
            bio: Some("Ten years in sexual health counselling".to_string()),
        };
        let merged = AccountRepository::upsert_staff_info(&pool, &consultant.id, &bio_only).await.unwrap();
        assert_eq!(merged.degree.as_deref(), Some("MD"));
        assert!(merged.bio.is_some());

        let consultants = AccountRepository::list_consultants(&pool).await.unwrap();
        assert_eq!(consultants.len(), 1);
        assert_eq!(consultants[0].experience_years, Some(8));
    }
}
