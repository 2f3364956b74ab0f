//! Daily nutrition logs

use serde::{Deserialize, Serialize};

use crate::store::OfflineEntity;

/// One logged meal within a day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MealEntry {
    pub name: String,
    pub calories: i64,
    pub protein_g: i64,
    pub carbs_g: i64,
    pub fat_g: i64,
}

/// One calendar day of food intake. Keyed by the ISO date string, so each
/// user holds at most one log per day; meals accumulate inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionLog {
    /// Calendar day in `YYYY-MM-DD` form; the per-user natural key
    pub date: String,
    pub meals: Vec<MealEntry>,
}

impl NutritionLog {
    /// Whole-day calorie total across meals
    #[must_use]
    pub fn total_calories(&self) -> i64 {
        self.meals.iter().map(|m| m.calories).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct NutritionLogUpdate {
    /// Appended to the day's meal list
    pub add_meal: Option<MealEntry>,
    /// Replaces the whole meal list when set (e.g. after an edit screen)
    pub replace_meals: Option<Vec<MealEntry>>,
}

pub struct NutritionLogEntity;

impl OfflineEntity for NutritionLogEntity {
    const TABLE: &'static str = "nutrition_logs";
    const RETENTION_DAYS: Option<i64> = Some(90);

    type Payload = NutritionLog;
    type CreateInput = NutritionLog;
    type UpdateInput = NutritionLogUpdate;

    fn payload_from_create(input: Self::CreateInput) -> Self::Payload {
        input
    }

    fn apply_update(payload: &mut Self::Payload, update: Self::UpdateInput) {
        if let Some(meals) = update.replace_meals {
            payload.meals = meals;
        }
        if let Some(meal) = update.add_meal {
            payload.meals.push(meal);
        }
    }

    fn natural_key(payload: &Self::Payload) -> String {
        payload.date.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn meal(name: &str, calories: i64) -> MealEntry {
        MealEntry {
            name: name.to_string(),
            calories,
            protein_g: 0,
            carbs_g: 0,
            fat_g: 0,
        }
    }

    #[test]
    fn test_natural_key_is_the_date() {
        let log = NutritionLog {
            date: "2024-03-15".to_string(),
            meals: vec![],
        };
        assert_eq!(NutritionLogEntity::natural_key(&log), "2024-03-15");
    }

    #[test]
    fn test_add_meal_appends() {
        let mut log = NutritionLog {
            date: "2024-03-15".to_string(),
            meals: vec![meal("breakfast", 450)],
        };

        NutritionLogEntity::apply_update(
            &mut log,
            NutritionLogUpdate {
                add_meal: Some(meal("lunch", 700)),
                replace_meals: None,
            },
        );

        assert_eq!(log.meals.len(), 2);
        assert_eq!(log.total_calories(), 1150);
    }

    #[test]
    fn test_replace_meals_wins_before_append() {
        let mut log = NutritionLog {
            date: "2024-03-15".to_string(),
            meals: vec![meal("breakfast", 450), meal("lunch", 700)],
        };

        NutritionLogEntity::apply_update(
            &mut log,
            NutritionLogUpdate {
                add_meal: Some(meal("snack", 200)),
                replace_meals: Some(vec![meal("breakfast", 400)]),
            },
        );

        assert_eq!(log.meals.len(), 2);
        assert_eq!(log.total_calories(), 600);
    }
}
