use anyhow::{Result, anyhow};
use tracing::{info, warn};

use crate::error::RecipeError;
use crate::images::ImageStore;
use crate::models::{
    ImageUpload, Recipe, RecipeForm, normalize_categories, validate_recipe_form,
};

/// Persistence for recipes and their category sets.
///
/// `save` inserts when the recipe has no id yet and returns the stored row
/// (with its id); otherwise it overwrites the existing row.
pub trait RecipeStore {
    fn save(&self, recipe: &Recipe) -> Result<Recipe>;
    fn find_by_id(&self, id: i64) -> Result<Option<Recipe>>;
    fn find_all(&self) -> Result<Vec<Recipe>>;
    fn find_by_favorite_true(&self) -> Result<Vec<Recipe>>;
    fn find_by_category(&self, category: &str) -> Result<Vec<Recipe>>;
    fn exists_by_id(&self, id: i64) -> Result<bool>;
    fn delete_by_id(&self, id: i64) -> Result<bool>;
}

/// Recipe workflows over a store and an image store.
///
/// Image files written during a failed save are removed again, and a
/// replaced or deleted recipe's old image is only removed once the store
/// write has gone through.
pub struct RecipeService<'a, S: ?Sized, I: ?Sized> {
    store: &'a S,
    images: &'a I,
    max_categories: usize,
}

impl<'a, S, I> RecipeService<'a, S, I>
where
    S: RecipeStore + ?Sized,
    I: ImageStore + ?Sized,
{
    pub fn new(store: &'a S, images: &'a I, max_categories: usize) -> Self {
        Self {
            store,
            images,
            max_categories,
        }
    }

    pub fn create(
        &self,
        form: &RecipeForm,
        image: Option<&ImageUpload>,
    ) -> Result<Recipe, RecipeError> {
        validate_recipe_form(form)?;
        let categories =
            normalize_categories(Some(form.categories.as_slice()), self.max_categories)?;

        let mut recipe = Recipe::from_form(form, categories);
        recipe.image_path = self.store_image(image)?;

        match self.store.save(&recipe) {
            Ok(saved) => {
                let Some(id) = saved.id else {
                    return Err(RecipeError::Internal(anyhow!(
                        "store returned recipe '{}' without an id",
                        saved.title
                    )));
                };
                info!(id, title = %saved.title, "created recipe");
                Ok(saved)
            }
            Err(e) => {
                if let Some(path) = &recipe.image_path {
                    self.discard_image(path);
                }
                Err(RecipeError::Storage(e.context("failed to save new recipe")))
            }
        }
    }

    pub fn get(&self, id: i64) -> Result<Recipe, RecipeError> {
        self.store
            .find_by_id(id)?
            .ok_or(RecipeError::NotFound(id))
    }

    pub fn exists(&self, id: i64) -> Result<bool, RecipeError> {
        Ok(self.store.exists_by_id(id)?)
    }

    pub fn list_all(&self) -> Result<Vec<Recipe>, RecipeError> {
        Ok(self.store.find_all()?)
    }

    pub fn list_favorites(&self) -> Result<Vec<Recipe>, RecipeError> {
        Ok(self.store.find_by_favorite_true()?)
    }

    pub fn list_by_category(&self, category: &str) -> Result<Vec<Recipe>, RecipeError> {
        Ok(self.store.find_by_category(category)?)
    }

    /// Overwrite a recipe's fields from `form`.
    ///
    /// A new `image` replaces the current one. Without a new image,
    /// `delete_current_image` clears the stored image.
    pub fn update(
        &self,
        id: i64,
        form: &RecipeForm,
        image: Option<&ImageUpload>,
        delete_current_image: bool,
    ) -> Result<Recipe, RecipeError> {
        let mut recipe = self.get(id)?;
        validate_recipe_form(form)?;
        let categories =
            normalize_categories(Some(form.categories.as_slice()), self.max_categories)?;
        recipe.apply_form(form, categories);

        let old_image = recipe.image_path.clone();
        let new_image = self.store_image(image)?;
        let drop_old = if new_image.is_some() {
            recipe.image_path.clone_from(&new_image);
            true
        } else if delete_current_image {
            recipe.image_path = None;
            true
        } else {
            false
        };

        let saved = match self.store.save(&recipe) {
            Ok(saved) => saved,
            Err(e) => {
                if let Some(path) = &new_image {
                    self.discard_image(path);
                }
                return Err(RecipeError::Storage(
                    e.context(format!("failed to save recipe {id}")),
                ));
            }
        };

        if drop_old {
            if let Some(path) = &old_image {
                self.discard_image(path);
            }
        }

        info!(id, title = %saved.title, "updated recipe");
        Ok(saved)
    }

    /// Remove a recipe and its image file.
    pub fn delete(&self, id: i64) -> Result<(), RecipeError> {
        let recipe = self.get(id)?;
        if !self.store.delete_by_id(id)? {
            return Err(RecipeError::NotFound(id));
        }
        if let Some(path) = &recipe.image_path {
            self.discard_image(path);
        }
        info!(id, "deleted recipe");
        Ok(())
    }

    /// Flip the favorite flag and return its new value.
    pub fn toggle_favorite(&self, id: i64) -> Result<bool, RecipeError> {
        let mut recipe = self.get(id)?;
        recipe.favorite = !recipe.favorite;
        let saved = self.store.save(&recipe)?;
        Ok(saved.favorite)
    }

    fn store_image(&self, image: Option<&ImageUpload>) -> Result<Option<String>, RecipeError> {
        let Some(upload) = image.filter(|u| !u.is_empty()) else {
            return Ok(None);
        };
        self.images
            .write(upload)
            .map_err(|e| RecipeError::Storage(e.context("failed to store image")))
    }

    // Best-effort: a leftover file is logged, never surfaced to the caller.
    fn discard_image(&self, path: &str) {
        if let Err(e) = self.images.delete(path) {
            warn!(path, "failed to remove image: {e:#}");
        }
    }
}
