// src/models/account.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};

// === ROLE ===

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    sqlx::Type, EnumString, Display, AsRefStr,
)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Role {
    Customer,
    Staff,
    Consultant,
    Manager,
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Role::Customer
    }
}

impl Role {
    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Customer => "Customer",
            Role::Staff => "Staff",
            Role::Consultant => "Consultant",
            Role::Manager => "Manager",
            Role::Admin => "Administrator",
        }
    }

    pub fn is_staff_member(&self) -> bool {
        !matches!(self, Role::Customer)
    }

    // ======== ACCOUNTS ========
    pub fn can_manage_accounts(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn can_view_accounts(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn can_manage_staff_info(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    // ======== CATALOG ========
    pub fn can_manage_services(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn can_manage_slots(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    // ======== BOOKINGS ========
    pub fn can_view_all_bookings(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager | Role::Staff)
    }

    pub fn can_update_test_status(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager | Role::Staff)
    }

    pub fn can_view_payments(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    // ======== CONSULTATIONS ========
    pub fn can_manage_consultations(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    // ======== CONTENT ========
    pub fn can_write_blogs(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager | Role::Consultant)
    }

    pub fn can_moderate_content(&self) -> bool {
        matches!(self, Role::Admin | Role::Manager)
    }

    pub fn all_roles() -> Vec<Self> {
        vec![Role::Customer, Role::Staff, Role::Consultant, Role::Manager, Role::Admin]
    }
}

// === ACCOUNT ===

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AccountInfo {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Account> for AccountInfo {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            full_name: account.full_name,
            email: account.email,
            phone: account.phone,
            role: account.role,
            is_active: account.is_active,
            created_at: account.created_at,
        }
    }
}

/// Profile data of staff-side accounts (consultants, lab staff).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StaffInfo {
    pub account_id: String,
    pub specialization: Option<String>,
    pub degree: Option<String>,
    pub experience_years: Option<i64>,
    pub bio: Option<String>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct ConsultantProfile {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub specialization: Option<String>,
    pub degree: Option<String>,
    pub experience_years: Option<i64>,
    pub bio: Option<String>,
}

// === REQUESTS ===

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100, message = "Full name must be 2-100 characters"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(max = 15, message = "Phone cannot exceed 15 characters"))]
    pub phone: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "New password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[validate(length(min = 2, max = 100, message = "Full name must be 2-100 characters"))]
    pub full_name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(max = 15, message = "Phone cannot exceed 15 characters"))]
    pub phone: Option<String>,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateAccountRequest {
    #[validate(length(min = 2, max = 100, message = "Full name must be 2-100 characters"))]
    pub full_name: Option<String>,
    #[validate(length(max = 15, message = "Phone cannot exceed 15 characters"))]
    pub phone: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateStaffInfoRequest {
    #[validate(length(max = 255, message = "Specialization cannot exceed 255 characters"))]
    pub specialization: Option<String>,
    #[validate(length(max = 255, message = "Degree cannot exceed 255 characters"))]
    pub degree: Option<String>,
    #[validate(range(min = 0, max = 70, message = "Experience must be 0-70 years"))]
    pub experience_years: Option<i64>,
    #[validate(length(max = 2000, message = "Bio cannot exceed 2000 characters"))]
    pub bio: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub account: AccountInfo,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_role_string_round_trip() {
        assert_eq!(Role::from_str("manager").unwrap(), Role::Manager);
        assert_eq!(Role::from_str("ADMIN").unwrap(), Role::Admin);
        assert!(Role::from_str("doctor").is_err());
        assert_eq!(Role::Consultant.to_string(), "consultant");
    }

    #[test]
    fn test_role_permissions() {
        assert!(Role::Admin.can_manage_accounts());
        assert!(!Role::Manager.can_manage_accounts());
        assert!(Role::Staff.can_update_test_status());
        assert!(!Role::Customer.can_update_test_status());
        assert!(Role::Consultant.can_write_blogs());
        assert!(!Role::Staff.can_write_blogs());
        assert!(!Role::Customer.is_staff_member());
    }

    #[test]
    fn test_account_info_hides_password() {
        let now = Utc::now();
        let account = Account {
            id: "a1".to_string(),
            full_name: "Nguyen Van A".to_string(),
            email: "a@example.com".to_string(),
            phone: None,
            password_hash: "secret-hash".to_string(),
            role: Role::Customer,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret-hash"));

        let info: AccountInfo = account.into();
        assert_eq!(info.email, "a@example.com");
    }
}
