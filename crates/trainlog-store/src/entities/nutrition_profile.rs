//! Nutrition targets (calorie and macro goals)

use serde::{Deserialize, Serialize};

use crate::store::OfflineEntity;

/// A user's current nutrition goals. Singleton per user, keyed by the fixed
/// natural key `"profile"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NutritionProfile {
    pub calorie_target: i64,
    pub protein_target_g: i64,
    pub carbs_target_g: i64,
    pub fat_target_g: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NutritionProfileUpdate {
    pub calorie_target: Option<i64>,
    pub protein_target_g: Option<i64>,
    pub carbs_target_g: Option<i64>,
    pub fat_target_g: Option<i64>,
}

pub struct NutritionProfileEntity;

impl OfflineEntity for NutritionProfileEntity {
    const TABLE: &'static str = "nutrition_profiles";
    const PRIORITY: i64 = 10;

    type Payload = NutritionProfile;
    type CreateInput = NutritionProfile;
    type UpdateInput = NutritionProfileUpdate;

    fn payload_from_create(input: Self::CreateInput) -> Self::Payload {
        input
    }

    fn apply_update(payload: &mut Self::Payload, update: Self::UpdateInput) {
        if let Some(calorie_target) = update.calorie_target {
            payload.calorie_target = calorie_target;
        }
        if let Some(protein_target_g) = update.protein_target_g {
            payload.protein_target_g = protein_target_g;
        }
        if let Some(carbs_target_g) = update.carbs_target_g {
            payload.carbs_target_g = carbs_target_g;
        }
        if let Some(fat_target_g) = update.fat_target_g {
            payload.fat_target_g = fat_target_g;
        }
    }

    fn natural_key(_payload: &Self::Payload) -> String {
        "profile".to_string()
    }
}
