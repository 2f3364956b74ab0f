//! Concrete Trainlog entities
//!
//! Each entity contributes its typed payload, create/update inputs and
//! natural key to the generic store; everything else (queueing, sync status,
//! merge) comes from [`crate::store::EntityStore`].

mod body;
mod exercise_sets;
mod nutrition_log;
mod nutrition_profile;
mod settings;
mod weight;

pub use body::{BodyEntity, BodyMeasurement, BodyMeasurementUpdate};
pub use exercise_sets::{ExerciseSet, ExerciseSetEntity, ExerciseSetLog, ExerciseSetUpdate};
pub use nutrition_log::{MealEntry, NutritionLog, NutritionLogEntity, NutritionLogUpdate};
pub use nutrition_profile::{NutritionProfile, NutritionProfileEntity, NutritionProfileUpdate};
pub use settings::{AppSettings, AppSettingsUpdate, SettingsEntity, UnitSystem};
pub use weight::{WeightEntity, WeightMeasurement, WeightUpdate};
