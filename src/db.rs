// src/db.rs - Database migrations and setup

use sqlx::SqlitePool;
use anyhow::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Enable foreign keys and WAL mode
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            full_name TEXT NOT NULL CHECK(length(full_name) >= 2 AND length(full_name) <= 100),
            email TEXT NOT NULL UNIQUE CHECK(length(email) >= 5 AND length(email) <= 255),
            phone TEXT CHECK(phone IS NULL OR length(phone) <= 15),
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'customer' CHECK(
                role IN ('customer', 'staff', 'consultant', 'manager', 'admin')
            ),
            is_active INTEGER NOT NULL DEFAULT 1 CHECK(is_active IN (0, 1)),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS staff_info (
            account_id TEXT PRIMARY KEY,
            specialization TEXT CHECK(specialization IS NULL OR length(specialization) <= 255),
            degree TEXT CHECK(degree IS NULL OR length(degree) <= 255),
            experience_years INTEGER CHECK(experience_years IS NULL OR experience_years >= 0),
            bio TEXT CHECK(bio IS NULL OR length(bio) <= 2000),
            FOREIGN KEY (account_id) REFERENCES accounts (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    // Refresh tokens are stored as SHA-256 hashes, never in clear
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            token_hash TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            expires_at DATETIME NOT NULL,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (account_id) REFERENCES accounts (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS token_blacklist (
            jti TEXT PRIMARY KEY,
            account_id TEXT,
            expires_at DATETIME NOT NULL,
            revoked_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS services (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL CHECK(length(name) > 0 AND length(name) <= 255),
            description TEXT CHECK(description IS NULL OR length(description) <= 2000),
            price INTEGER NOT NULL CHECK(price >= 0),
            category TEXT CHECK(category IS NULL OR length(category) <= 100),
            is_deleted INTEGER NOT NULL DEFAULT 0 CHECK(is_deleted IN (0, 1)),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS test_service_slots (
            id TEXT PRIMARY KEY,
            service_id TEXT NOT NULL,
            slot_date DATE NOT NULL,
            shift TEXT NOT NULL CHECK(shift IN ('AM', 'PM')),
            max_quantity INTEGER NOT NULL CHECK(max_quantity >= 1),
            current_quantity INTEGER NOT NULL DEFAULT 0 CHECK(
                current_quantity >= 0 AND current_quantity <= max_quantity
            ),
            created_at DATETIME NOT NULL,
            FOREIGN KEY (service_id) REFERENCES services (id) ON DELETE CASCADE,
            UNIQUE(service_id, slot_date, shift)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS bookings (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK(
                status IN ('pending', 'paid', 'completed')
            ),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (account_id) REFERENCES accounts (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS booking_details (
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL,
            service_id TEXT NOT NULL,
            slot_id TEXT NOT NULL,
            price INTEGER NOT NULL CHECK(price >= 0),
            full_name TEXT NOT NULL CHECK(length(full_name) >= 2 AND length(full_name) <= 100),
            date_of_birth DATE NOT NULL,
            gender TEXT NOT NULL CHECK(gender IN ('male', 'female', 'other')),
            phone TEXT NOT NULL CHECK(length(phone) <= 15),
            slot_date DATE NOT NULL,
            shift TEXT NOT NULL CHECK(shift IN ('AM', 'PM')),
            status TEXT NOT NULL DEFAULT 'pending' CHECK(
                status IN ('pending', 'tested', 'result_ready', 'missed')
            ),
            result TEXT CHECK(result IS NULL OR length(result) <= 5000),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (booking_id) REFERENCES bookings (id) ON DELETE CASCADE,
            FOREIGN KEY (service_id) REFERENCES services (id),
            FOREIGN KEY (slot_id) REFERENCES test_service_slots (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            booking_id TEXT NOT NULL UNIQUE,
            transaction_id TEXT NOT NULL UNIQUE,
            amount INTEGER NOT NULL CHECK(amount >= 0),
            method TEXT NOT NULL,
            bank_code TEXT,
            response_code TEXT NOT NULL,
            paid_at DATETIME NOT NULL,
            FOREIGN KEY (booking_id) REFERENCES bookings (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS consultation_bookings (
            id TEXT PRIMARY KEY,
            customer_id TEXT,
            guest_name TEXT CHECK(guest_name IS NULL OR length(guest_name) <= 100),
            guest_email TEXT CHECK(guest_email IS NULL OR length(guest_email) <= 255),
            guest_phone TEXT CHECK(guest_phone IS NULL OR length(guest_phone) <= 15),
            consultant_id TEXT NOT NULL,
            scheduled_at DATETIME NOT NULL,
            note TEXT CHECK(note IS NULL OR length(note) <= 1000),
            status TEXT NOT NULL DEFAULT 'pending' CHECK(
                status IN ('pending', 'confirmed', 'cancelled')
            ),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (customer_id) REFERENCES accounts (id),
            FOREIGN KEY (consultant_id) REFERENCES accounts (id),
            CHECK(customer_id IS NOT NULL OR guest_name IS NOT NULL)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedbacks (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            service_id TEXT NOT NULL,
            rating INTEGER NOT NULL CHECK(rating >= 1 AND rating <= 5),
            comment TEXT CHECK(comment IS NULL OR length(comment) <= 2000),
            created_at DATETIME NOT NULL,
            FOREIGN KEY (account_id) REFERENCES accounts (id) ON DELETE CASCADE,
            FOREIGN KEY (service_id) REFERENCES services (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blogs (
            id TEXT PRIMARY KEY,
            author_id TEXT NOT NULL,
            title TEXT NOT NULL CHECK(length(title) > 0 AND length(title) <= 255),
            content TEXT NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0 CHECK(is_published IN (0, 1)),
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (author_id) REFERENCES accounts (id)
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notifications (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            title TEXT NOT NULL,
            message TEXT NOT NULL,
            is_read INTEGER NOT NULL DEFAULT 0 CHECK(is_read IN (0, 1)),
            created_at DATETIME NOT NULL,
            FOREIGN KEY (account_id) REFERENCES accounts (id) ON DELETE CASCADE
        )
        "#,
    )
        .execute(pool)
        .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            account_id TEXT,
            action TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT,
            description TEXT,
            ip_address TEXT,
            user_agent TEXT,
            created_at DATETIME NOT NULL
        )
        "#,
    )
        .execute(pool)
        .await?;

    // ==================== CREATE INDEXES ====================

    let indexes = [
        "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_account ON refresh_tokens(account_id)",
        "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_expires ON refresh_tokens(expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_token_blacklist_expires ON token_blacklist(expires_at)",
        "CREATE INDEX IF NOT EXISTS idx_services_deleted ON services(is_deleted)",
        "CREATE INDEX IF NOT EXISTS idx_slots_service_date ON test_service_slots(service_id, slot_date)",
        "CREATE INDEX IF NOT EXISTS idx_bookings_account_status ON bookings(account_id, status)",
        "CREATE INDEX IF NOT EXISTS idx_booking_details_booking ON booking_details(booking_id)",
        "CREATE INDEX IF NOT EXISTS idx_booking_details_slot ON booking_details(slot_id)",
        "CREATE INDEX IF NOT EXISTS idx_booking_details_status ON booking_details(status)",
        "CREATE INDEX IF NOT EXISTS idx_consultations_consultant ON consultation_bookings(consultant_id, scheduled_at)",
        "CREATE INDEX IF NOT EXISTS idx_consultations_customer ON consultation_bookings(customer_id)",
        "CREATE INDEX IF NOT EXISTS idx_feedbacks_service ON feedbacks(service_id)",
        "CREATE INDEX IF NOT EXISTS idx_blogs_published ON blogs(is_published)",
        "CREATE INDEX IF NOT EXISTS idx_notifications_account ON notifications(account_id, is_read)",
        "CREATE INDEX IF NOT EXISTS idx_audit_entity ON audit_logs(entity_type, entity_id)",
    ];

    for statement in indexes {
        if let Err(e) = sqlx::query(statement).execute(pool).await {
            log::warn!("Failed to create index ({}): {}", statement, e);
        }
    }

    log::info!("Database migrations completed");
    Ok(())
}

#[cfg(test)]
pub mod test_support {
    //! In-memory database fixtures shared by repository and service tests.
    use super::run_migrations;
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;
    use uuid::Uuid;

    pub async fn test_pool() -> SqlitePool {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory sqlite");
        run_migrations(&pool).await.expect("migrations");
        pool
    }

    pub async fn insert_account(pool: &SqlitePool, email: &str, role: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO accounts (id, full_name, email, phone, password_hash, role, is_active, created_at, updated_at)
             VALUES (?, ?, ?, NULL, 'x', ?, 1, ?, ?)"
        )
            .bind(&id)
            .bind("Test Person")
            .bind(email)
            .bind(role)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .expect("insert account");
        id
    }

    pub async fn insert_service(pool: &SqlitePool, name: &str, price: i64) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO services (id, name, description, price, category, is_deleted, created_at, updated_at)
             VALUES (?, ?, NULL, ?, 'std', 0, ?, ?)"
        )
            .bind(&id)
            .bind(name)
            .bind(price)
            .bind(now)
            .bind(now)
            .execute(pool)
            .await
            .expect("insert service");
        id
    }
}
