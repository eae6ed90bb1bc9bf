use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::RecipeError;

pub const MAX_TITLE_LEN: usize = 255;
pub const MAX_INGREDIENTS_LEN: usize = 1000;
pub const MAX_INSTRUCTIONS_LEN: usize = 2000;
pub const MAX_REFERENCE_LEN: usize = 1000;
pub const MAX_CATEGORY_LEN: usize = 100;
pub const DEFAULT_MAX_CATEGORIES: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: Option<i64>,
    pub title: String,
    pub ingredients: String,
    pub instructions: String,
    pub favorite: bool,
    pub reference: Option<String>,
    pub categories: BTreeSet<String>,
    pub image_path: Option<String>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,
}

impl Recipe {
    /// Build an unsaved recipe from an already validated form.
    pub fn from_form(form: &RecipeForm, categories: BTreeSet<String>) -> Self {
        Self {
            id: None,
            title: form.title.trim().to_string(),
            ingredients: form.ingredients.clone(),
            instructions: form.instructions.clone(),
            favorite: form.favorite,
            reference: normalize_reference(form.reference.as_deref()),
            categories,
            image_path: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    pub fn apply_form(&mut self, form: &RecipeForm, categories: BTreeSet<String>) {
        self.title = form.title.trim().to_string();
        self.ingredients.clone_from(&form.ingredients);
        self.instructions.clone_from(&form.instructions);
        self.favorite = form.favorite;
        self.reference = normalize_reference(form.reference.as_deref());
        self.categories = categories;
    }
}

/// Submitted recipe fields, as bound from the create/update form.
///
/// Also returned to the client on validation failure so the form can be
/// re-filled with what was sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeForm {
    pub title: String,
    pub ingredients: String,
    pub instructions: String,
    pub favorite: bool,
    pub reference: Option<String>,
    pub categories: Vec<String>,
}

impl From<&Recipe> for RecipeForm {
    fn from(recipe: &Recipe) -> Self {
        Self {
            title: recipe.title.clone(),
            ingredients: recipe.ingredients.clone(),
            instructions: recipe.instructions.clone(),
            favorite: recipe.favorite,
            reference: recipe.reference.clone(),
            categories: recipe.categories.iter().cloned().collect(),
        }
    }
}

/// An uploaded image file as received from a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_ADMIN")]
    Admin,
    #[serde(rename = "ROLE_USER")]
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ROLE_ADMIN",
            Self::User => "ROLE_USER",
        }
    }

    pub fn parse(tag: &str) -> anyhow::Result<Self> {
        match tag {
            "ROLE_ADMIN" => Ok(Self::Admin),
            "ROLE_USER" => Ok(Self::User),
            other => anyhow::bail!("Unknown role tag '{other}'"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub role: Role,
}

/// Credentials for an account created at startup when it does not exist yet.
#[derive(Debug, Clone)]
pub struct SeedAccount {
    pub username: String,
    pub password: String,
    pub role: Role,
}

fn normalize_reference(reference: Option<&str>) -> Option<String> {
    reference
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(String::from)
}

/// Trim, drop blanks, and deduplicate submitted categories.
///
/// Distinctness is case-sensitive. A submission with more than
/// `max_categories` distinct entries is rejected as a whole; nothing is
/// truncated.
pub fn normalize_categories(
    raw: Option<&[String]>,
    max_categories: usize,
) -> Result<BTreeSet<String>, RecipeError> {
    let mut categories = BTreeSet::new();
    for entry in raw.unwrap_or_default() {
        let trimmed = entry.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.chars().count() > MAX_CATEGORY_LEN {
            return Err(RecipeError::Validation(format!(
                "Category '{trimmed}' is longer than {MAX_CATEGORY_LEN} characters"
            )));
        }
        categories.insert(trimmed.to_string());
    }

    if categories.len() > max_categories {
        return Err(RecipeError::Validation(format!(
            "At most {max_categories} categories are allowed (got {})",
            categories.len()
        )));
    }

    Ok(categories)
}

/// Check required fields and column-width limits of a submitted form.
pub fn validate_recipe_form(form: &RecipeForm) -> Result<(), RecipeError> {
    let title = form.title.trim();
    if title.is_empty() {
        return Err(RecipeError::Validation("Title is required".to_string()));
    }
    check_len("title", title, MAX_TITLE_LEN)?;
    check_len("ingredients", &form.ingredients, MAX_INGREDIENTS_LEN)?;
    check_len("instructions", &form.instructions, MAX_INSTRUCTIONS_LEN)?;
    if let Some(reference) = &form.reference {
        check_len("reference", reference.trim(), MAX_REFERENCE_LEN)?;
    }
    Ok(())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<(), RecipeError> {
    if value.chars().count() > max {
        return Err(RecipeError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn sample_form() -> RecipeForm {
        RecipeForm {
            title: "Pancakes".to_string(),
            ingredients: "flour, milk, eggs".to_string(),
            instructions: "Mix and fry.".to_string(),
            favorite: false,
            reference: None,
            categories: vec![],
        }
    }

    #[test]
    fn test_categories_trim_and_dedup_case_sensitive() {
        let raw = strings(&["Dessert", "dessert ", "", "Dessert"]);
        let categories = normalize_categories(Some(raw.as_slice()), 3).unwrap();
        let expected: BTreeSet<String> = ["Dessert", "dessert"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(categories, expected);
    }

    #[test]
    fn test_categories_absent_is_empty() {
        assert!(normalize_categories(None, 3).unwrap().is_empty());
        assert!(normalize_categories(Some(&[][..]), 3).unwrap().is_empty());
    }

    #[test]
    fn test_categories_whitespace_only_discarded() {
        let raw = strings(&["   ", "\t", " Soup "]);
        let categories = normalize_categories(Some(raw.as_slice()), 3).unwrap();
        assert_eq!(categories.len(), 1);
        assert!(categories.contains("Soup"));
    }

    #[test]
    fn test_categories_over_cap_rejected() {
        let raw = strings(&["a", "b", "c", "d"]);
        let err = normalize_categories(Some(raw.as_slice()), 3).unwrap_err();
        assert!(matches!(err, RecipeError::Validation(_)));
    }

    #[test]
    fn test_categories_duplicates_do_not_count_toward_cap() {
        let raw = strings(&["a", "b", "c", "a ", " b", "c"]);
        let categories = normalize_categories(Some(raw.as_slice()), 3).unwrap();
        assert_eq!(categories.len(), 3);
    }

    #[test]
    fn test_categories_output_bounded_for_many_inputs() {
        for n in 0..10 {
            let raw: Vec<String> = (0..n).map(|i| format!(" cat{} ", i % 4)).collect();
            match normalize_categories(Some(raw.as_slice()), 3) {
                Ok(set) => {
                    assert!(set.len() <= 3);
                    assert!(set.iter().all(|c| !c.trim().is_empty() && c.trim() == c));
                }
                Err(e) => assert!(matches!(e, RecipeError::Validation(_))),
            }
        }
    }

    #[test]
    fn test_category_too_long_rejected() {
        let raw = vec!["x".repeat(MAX_CATEGORY_LEN + 1)];
        assert!(normalize_categories(Some(raw.as_slice()), 3).is_err());
    }

    #[test]
    fn test_validate_form_ok() {
        assert!(validate_recipe_form(&sample_form()).is_ok());
    }

    #[test]
    fn test_validate_form_blank_title() {
        let mut form = sample_form();
        form.title = "   ".to_string();
        let err = validate_recipe_form(&form).unwrap_err();
        assert_eq!(err.to_string(), "Title is required");
    }

    #[test]
    fn test_validate_form_length_limits() {
        let mut form = sample_form();
        form.ingredients = "a".repeat(MAX_INGREDIENTS_LEN);
        form.instructions = "b".repeat(MAX_INSTRUCTIONS_LEN);
        assert!(validate_recipe_form(&form).is_ok());

        form.instructions.push('b');
        assert!(validate_recipe_form(&form).is_err());
    }

    #[test]
    fn test_from_form_trims_title_and_drops_blank_reference() {
        let mut form = sample_form();
        form.title = "  Pancakes  ".to_string();
        form.reference = Some("   ".to_string());
        let recipe = Recipe::from_form(&form, BTreeSet::new());
        assert_eq!(recipe.title, "Pancakes");
        assert_eq!(recipe.reference, None);
        assert_eq!(recipe.id, None);
        assert!(!recipe.favorite);
    }

    #[test]
    fn test_role_tags() {
        assert_eq!(Role::Admin.as_str(), "ROLE_ADMIN");
        assert_eq!(Role::parse("ROLE_USER").unwrap(), Role::User);
        assert!(Role::parse("ROLE_ROOT").is_err());
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"ROLE_USER\"");
    }
}
