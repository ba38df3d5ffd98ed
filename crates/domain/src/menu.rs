//! Weekly menu directory.
//!
//! Menus are created inactive. Activation clears every other active flag in
//! the same store transaction, so at most one menu is active at any time.

use chrono::NaiveDate;
use common::MenuId;
use store::{MealStore, MenuDeletion, MenuEntry, MenuStore, WeeklyMenu};

use crate::error::{DomainError, Result};

/// Calendar-date format accepted for week starts and delivery dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

fn validate_entries(entries: &[MenuEntry]) -> Result<()> {
    if entries.is_empty() {
        return Err(DomainError::InvalidInput(
            "a menu needs at least one meal".into(),
        ));
    }
    for (index, entry) in entries.iter().enumerate() {
        if entry.stock < 1 {
            return Err(DomainError::InvalidInput(format!(
                "stock for meal {} must be at least 1",
                entry.meal_id
            )));
        }
        if entries[..index].iter().any(|e| e.meal_id == entry.meal_id) {
            return Err(DomainError::InvalidInput(format!(
                "meal {} is listed more than once",
                entry.meal_id
            )));
        }
    }
    Ok(())
}

/// Service for weekly menus.
#[derive(Debug, Clone)]
pub struct MenuService<S> {
    store: S,
}

impl<S: MenuStore + MealStore> MenuService<S> {
    /// Creates a new menu service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates an inactive menu with full stock for every entry.
    #[tracing::instrument(skip(self, entries))]
    pub async fn create(&self, week_start: &str, entries: &[MenuEntry]) -> Result<WeeklyMenu> {
        let week_start = self.validate(week_start, entries).await?;

        let menu = self.store.create_menu(week_start, entries).await?;
        tracing::info!(menu_id = %menu.id, meals = entries.len(), "weekly menu created");
        Ok(menu)
    }

    /// Makes `id` the only active menu.
    #[tracing::instrument(skip(self))]
    pub async fn activate(&self, id: MenuId) -> Result<()> {
        if !self.store.activate_menu(id).await? {
            return Err(DomainError::not_found("menu", id));
        }

        tracing::info!(menu_id = %id, "weekly menu activated");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_active(&self) -> Result<Option<WeeklyMenu>> {
        Ok(self.store.get_active_menu().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self, id: MenuId) -> Result<WeeklyMenu> {
        self.store
            .get_menu(id)
            .await?
            .ok_or_else(|| DomainError::not_found("menu", id))
    }

    /// Lists menus newest week first, without their meals.
    #[tracing::instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<WeeklyMenu>> {
        Ok(self.store.list_menus().await?)
    }

    /// Replaces the week and meal set of a menu. Stock restarts at the new
    /// entries' values.
    #[tracing::instrument(skip(self, entries))]
    pub async fn update(
        &self,
        id: MenuId,
        week_start: &str,
        entries: &[MenuEntry],
    ) -> Result<WeeklyMenu> {
        let week_start = self.validate(week_start, entries).await?;

        let menu = self
            .store
            .replace_menu(id, week_start, entries)
            .await?
            .ok_or_else(|| DomainError::not_found("menu", id))?;
        tracing::info!(menu_id = %id, meals = entries.len(), "weekly menu replaced");
        Ok(menu)
    }

    /// Deletes an inactive menu.
    ///
    /// The store decides under its own lock whether the menu is active, so
    /// an activation racing with the delete can't leave zero active menus.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: MenuId) -> Result<()> {
        match self.store.delete_menu(id).await? {
            MenuDeletion::Deleted => {
                tracing::info!(menu_id = %id, "weekly menu deleted");
                Ok(())
            }
            MenuDeletion::NotFound => Err(DomainError::not_found("menu", id)),
            MenuDeletion::Active => Err(DomainError::ActiveMenuDeletion(id)),
        }
    }

    async fn validate(&self, week_start: &str, entries: &[MenuEntry]) -> Result<NaiveDate> {
        let date = parse_date(week_start).ok_or_else(|| {
            DomainError::InvalidInput(format!(
                "invalid week start date '{week_start}', use YYYY-MM-DD"
            ))
        })?;
        validate_entries(entries)?;

        for entry in entries {
            if self.store.get_meal(entry.meal_id).await?.is_none() {
                return Err(DomainError::not_found("meal", entry.meal_id));
            }
        }
        Ok(date)
    }
}
