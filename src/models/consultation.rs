// src/models/consultation.rs
use serde::{Deserialize, Serialize};
use validator::Validate;
use chrono::{DateTime, Utc};
use strum::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
    sqlx::Type, EnumString, Display, AsRefStr,
)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConsultationStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl ConsultationStatus {
    pub fn can_transition_to(self, next: ConsultationStatus) -> bool {
        use ConsultationStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled)
        )
    }
}

/// Human consultation appointment; independent of the test-booking flow.
/// Either `customer_id` or the guest contact fields identify the client.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct ConsultationBooking {
    pub id: String,
    pub customer_id: Option<String>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub consultant_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub note: Option<String>,
    pub status: ConsultationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateConsultationRequest {
    #[validate(length(min = 1, message = "Consultant is required"))]
    pub consultant_id: String,
    pub scheduled_at: DateTime<Utc>,
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub guest_name: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub guest_email: Option<String>,
    #[validate(length(min = 9, max = 15, message = "Phone must be 9-15 characters"))]
    pub guest_phone: Option<String>,
    #[validate(length(max = 1000, message = "Note cannot exceed 1000 characters"))]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConsultationStatus::*;

    #[test]
    fn test_consultation_transitions() {
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Pending));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Pending));
    }
}
