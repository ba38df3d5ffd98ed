//! Meal catalog.

use common::{MealId, Money};
use serde::{Deserialize, Serialize};
use store::{Meal, MealStore, NewMeal};

use crate::error::{DomainError, Result};

/// Sparse update of a meal. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MealPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub calories: Option<i32>,
    pub protein: Option<i32>,
    pub carbs: Option<i32>,
    pub fat: Option<i32>,
    pub price: Option<Money>,
}

impl MealPatch {
    /// Overwrites the fields present in the patch.
    pub fn apply(self, meal: &mut Meal) {
        if let Some(name) = self.name {
            meal.name = name;
        }
        if let Some(description) = self.description {
            meal.description = description;
        }
        if let Some(image_url) = self.image_url {
            meal.image_url = image_url;
        }
        if let Some(calories) = self.calories {
            meal.calories = calories;
        }
        if let Some(protein) = self.protein {
            meal.protein = protein;
        }
        if let Some(carbs) = self.carbs {
            meal.carbs = carbs;
        }
        if let Some(fat) = self.fat {
            meal.fat = fat;
        }
        if let Some(price) = self.price {
            meal.price = price;
        }
    }
}

fn validate(name: &str, price: Money, nutrition: [i32; 4]) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DomainError::InvalidInput("meal name is required".into()));
    }
    if price.is_negative() {
        return Err(DomainError::InvalidInput(format!(
            "meal price cannot be negative, got {price}"
        )));
    }
    if nutrition.iter().any(|value| *value < 0) {
        return Err(DomainError::InvalidInput(
            "nutrition values cannot be negative".into(),
        ));
    }
    Ok(())
}

/// Service for the meal catalog.
#[derive(Debug, Clone)]
pub struct MealService<S> {
    store: S,
}

impl<S: MealStore> MealService<S> {
    /// Creates a new catalog service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create(&self, meal: NewMeal) -> Result<Meal> {
        validate(
            &meal.name,
            meal.price,
            [meal.calories, meal.protein, meal.carbs, meal.fat],
        )?;

        let meal = self.store.create_meal(meal).await?;
        tracing::info!(meal_id = %meal.id, "meal created");
        Ok(meal)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: MealId) -> Result<Meal> {
        self.store
            .get_meal(id)
            .await?
            .ok_or_else(|| DomainError::not_found("meal", id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Meal>> {
        Ok(self.store.list_meals().await?)
    }

    /// Applies a sparse patch and returns the stored meal.
    #[tracing::instrument(skip(self))]
    pub async fn update(&self, id: MealId, patch: MealPatch) -> Result<Meal> {
        let mut meal = self.get(id).await?;
        patch.apply(&mut meal);
        validate(
            &meal.name,
            meal.price,
            [meal.calories, meal.protein, meal.carbs, meal.fat],
        )?;

        self.store
            .update_meal(meal)
            .await?
            .ok_or_else(|| DomainError::not_found("meal", id))
    }

    /// Deletes a meal that no menu lists.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: MealId) -> Result<()> {
        self.get(id).await?;
        if self.store.meal_on_any_menu(id).await? {
            return Err(DomainError::MealInUse(id));
        }
        if !self.store.delete_meal(id).await? {
            return Err(DomainError::not_found("meal", id));
        }

        tracing::info!(meal_id = %id, "meal deleted");
        Ok(())
    }
}
