//! Logged sets for one exercise within a training program

use serde::{Deserialize, Serialize};

use crate::store::OfflineEntity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSet {
    pub reps: u32,
    pub weight_kg: f64,
}

/// All sets a user has logged for one `(program, exercise)` pair. The pair
/// forms the natural key, so repeated logging appends to the same row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseSetLog {
    pub program_id: String,
    pub exercise_id: String,
    pub sets: Vec<ExerciseSet>,
}

#[derive(Debug, Clone, Default)]
pub struct ExerciseSetUpdate {
    /// Appended to the logged sets
    pub add_set: Option<ExerciseSet>,
    /// Replaces the whole set list when set
    pub replace_sets: Option<Vec<ExerciseSet>>,
}

pub struct ExerciseSetEntity;

impl OfflineEntity for ExerciseSetEntity {
    const TABLE: &'static str = "exercise_set_logs";
    const RETENTION_DAYS: Option<i64> = Some(180);

    type Payload = ExerciseSetLog;
    type CreateInput = ExerciseSetLog;
    type UpdateInput = ExerciseSetUpdate;

    fn payload_from_create(input: Self::CreateInput) -> Self::Payload {
        input
    }

    fn apply_update(payload: &mut Self::Payload, update: Self::UpdateInput) {
        if let Some(sets) = update.replace_sets {
            payload.sets = sets;
        }
        if let Some(set) = update.add_set {
            payload.sets.push(set);
        }
    }

    fn natural_key(payload: &Self::Payload) -> String {
        format!("{}:{}", payload.program_id, payload.exercise_id)
    }
}
