//! Body circumference and composition measurements

use serde::{Deserialize, Serialize};

use crate::store::OfflineEntity;

/// One tape-measure session. Users rarely measure every site at once, so
/// every dimension is an explicit optional field; absent means not measured,
/// not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyMeasurement {
    /// When the session happened (unix ms); the per-user natural key
    pub measured_at: i64,
    pub neck_cm: Option<f64>,
    pub chest_cm: Option<f64>,
    pub waist_cm: Option<f64>,
    pub hips_cm: Option<f64>,
    pub biceps_cm: Option<f64>,
    pub thigh_cm: Option<f64>,
    pub body_fat_pct: Option<f64>,
}

/// Partial update; `Some` replaces a site's value, `None` leaves it alone.
/// Clearing a previously recorded site is not supported.
#[derive(Debug, Clone, Default)]
pub struct BodyMeasurementUpdate {
    pub neck_cm: Option<f64>,
    pub chest_cm: Option<f64>,
    pub waist_cm: Option<f64>,
    pub hips_cm: Option<f64>,
    pub biceps_cm: Option<f64>,
    pub thigh_cm: Option<f64>,
    pub body_fat_pct: Option<f64>,
}

pub struct BodyEntity;

impl OfflineEntity for BodyEntity {
    const TABLE: &'static str = "body_measurements";
    const RETENTION_DAYS: Option<i64> = Some(365);

    type Payload = BodyMeasurement;
    type CreateInput = BodyMeasurement;
    type UpdateInput = BodyMeasurementUpdate;

    fn payload_from_create(input: Self::CreateInput) -> Self::Payload {
        input
    }

    fn apply_update(payload: &mut Self::Payload, update: Self::UpdateInput) {
        macro_rules! merge {
            ($($field:ident),+) => {
                $(if let Some(value) = update.$field {
                    payload.$field = Some(value);
                })+
            };
        }
        merge!(neck_cm, chest_cm, waist_cm, hips_cm, biceps_cm, thigh_cm, body_fat_pct);
    }

    fn natural_key(payload: &Self::Payload) -> String {
        payload.measured_at.to_string()
    }
}
