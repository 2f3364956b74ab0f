//! Body weight measurements

use serde::{Deserialize, Serialize};

use crate::store::OfflineEntity;

/// One scale reading. `measured_at` doubles as the per-user natural key, so
/// a user can hold at most one weight entry per instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightMeasurement {
    /// When the reading was taken (unix ms)
    pub measured_at: i64,
    pub weight_kg: f64,
    pub note: Option<String>,
}

/// Partial update for an existing measurement. `None` leaves the field as is.
#[derive(Debug, Clone, Default)]
pub struct WeightUpdate {
    pub weight_kg: Option<f64>,
    pub note: Option<String>,
}

pub struct WeightEntity;

impl OfflineEntity for WeightEntity {
    const TABLE: &'static str = "weight_measurements";
    const RETENTION_DAYS: Option<i64> = Some(365);

    type Payload = WeightMeasurement;
    type CreateInput = WeightMeasurement;
    type UpdateInput = WeightUpdate;

    fn payload_from_create(input: Self::CreateInput) -> Self::Payload {
        input
    }

    fn apply_update(payload: &mut Self::Payload, update: Self::UpdateInput) {
        if let Some(weight_kg) = update.weight_kg {
            payload.weight_kg = weight_kg;
        }
        if let Some(note) = update.note {
            payload.note = Some(note);
        }
    }

    fn natural_key(payload: &Self::Payload) -> String {
        payload.measured_at.to_string()
    }
}
