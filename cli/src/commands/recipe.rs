use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use recipebox_core::db::Database;
use recipebox_core::error::RecipeError;
use recipebox_core::images::FsImageStore;
use recipebox_core::models::Recipe;
use recipebox_core::service::RecipeService;

use super::helpers::{exit_not_found, join_categories, truncate};

pub(crate) fn cmd_recipe_list(
    db: &Database,
    images: &FsImageStore,
    max_categories: usize,
    favorites: bool,
    category: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Fav")]
        favorite: &'static str,
        #[tabled(rename = "Categories")]
        categories: String,
        #[tabled(rename = "Image")]
        image: &'static str,
    }

    let service = RecipeService::new(db, images, max_categories);
    let recipes = match category {
        Some(category) => service.list_by_category(category)?,
        None if favorites => service.list_favorites()?,
        None => service.list_all()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    if recipes.is_empty() {
        eprintln!("No recipes found");
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id.unwrap_or_default(),
            title: truncate(&r.title, 40),
            favorite: if r.favorite { "*" } else { "" },
            categories: truncate(&join_categories(r), 40),
            image: if r.image_path.is_some() { "yes" } else { "" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_recipe_categories(db: &Database, json: bool) -> Result<()> {
    let categories = db.list_categories()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
    } else if categories.is_empty() {
        eprintln!("No categories in use");
    } else {
        for category in &categories {
            println!("{category}");
        }
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(
    db: &Database,
    images: &FsImageStore,
    max_categories: usize,
    id: i64,
    json: bool,
) -> Result<()> {
    let service = RecipeService::new(db, images, max_categories);
    let recipe = match service.get(id) {
        Ok(recipe) => recipe,
        Err(e @ RecipeError::NotFound(_)) => exit_not_found(&e.to_string(), json),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    print_recipe(&recipe);
    Ok(())
}

fn print_recipe(recipe: &Recipe) {
    let title = &recipe.title;
    let marker = if recipe.favorite { " *" } else { "" };
    println!("=== {title}{marker} ===");
    if !recipe.categories.is_empty() {
        println!("  Categories: {}", join_categories(recipe));
    }
    if let Some(reference) = &recipe.reference {
        println!("  Reference:  {reference}");
    }
    if let Some(image) = &recipe.image_path {
        println!("  Image:      {image}");
    }

    println!("\n  INGREDIENTS:");
    for line in recipe.ingredients.lines() {
        println!("    {line}");
    }

    println!("\n  INSTRUCTIONS:");
    for line in recipe.instructions.lines() {
        println!("    {line}");
    }
}

pub(crate) fn cmd_recipe_favorite(
    db: &Database,
    images: &FsImageStore,
    max_categories: usize,
    id: i64,
    json: bool,
) -> Result<()> {
    let service = RecipeService::new(db, images, max_categories);
    let favorite = match service.toggle_favorite(id) {
        Ok(favorite) => favorite,
        Err(e @ RecipeError::NotFound(_)) => exit_not_found(&e.to_string(), json),
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::json!({ "id": id, "favorite": favorite }));
    } else if favorite {
        println!("Recipe {id} marked as favorite");
    } else {
        println!("Recipe {id} removed from favorites");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(
    db: &Database,
    images: &FsImageStore,
    max_categories: usize,
    id: i64,
    json: bool,
) -> Result<()> {
    let service = RecipeService::new(db, images, max_categories);
    match service.delete(id) {
        Ok(()) => {}
        Err(e @ RecipeError::NotFound(_)) => exit_not_found(&e.to_string(), json),
        Err(e) => return Err(e.into()),
    }

    if json {
        println!("{}", serde_json::json!({ "deleted": id }));
    } else {
        println!("Deleted recipe {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipebox_core::images::ImageStore;
    use recipebox_core::models::{ImageUpload, RecipeForm};

    fn setup() -> (Database, FsImageStore, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let images = FsImageStore::new(tmp.path());
        (Database::open_in_memory().unwrap(), images, tmp)
    }

    fn create(db: &Database, images: &FsImageStore, title: &str, image: bool) -> Recipe {
        let form = RecipeForm {
            title: title.to_string(),
            ingredients: "1 cup rice".to_string(),
            instructions: "Simmer.".to_string(),
            categories: vec!["Dinner".to_string()],
            ..RecipeForm::default()
        };
        let upload = ImageUpload {
            file_name: "rice.png".to_string(),
            bytes: b"rice".to_vec(),
        };
        RecipeService::new(db, images, 5)
            .create(&form, image.then_some(&upload))
            .unwrap()
    }

    #[test]
    fn test_list_variants_succeed() {
        let (db, images, _tmp) = setup();
        create(&db, &images, "Pilaf", false);

        cmd_recipe_list(&db, &images, 5, false, None, true).unwrap();
        cmd_recipe_list(&db, &images, 5, true, None, false).unwrap();
        cmd_recipe_list(&db, &images, 5, false, Some("Dinner"), false).unwrap();
        cmd_recipe_categories(&db, true).unwrap();
    }

    #[test]
    fn test_favorite_toggles() {
        let (db, images, _tmp) = setup();
        let id = create(&db, &images, "Risotto", false).id.unwrap();

        cmd_recipe_favorite(&db, &images, 5, id, true).unwrap();
        assert!(db.get_recipe(id).unwrap().unwrap().favorite);
        cmd_recipe_favorite(&db, &images, 5, id, false).unwrap();
        assert!(!db.get_recipe(id).unwrap().unwrap().favorite);
    }

    #[test]
    fn test_delete_removes_image() {
        let (db, images, _tmp) = setup();
        let recipe = create(&db, &images, "Paella", true);
        let path = recipe.image_path.clone().unwrap();
        assert!(images.exists(&path));

        cmd_recipe_delete(&db, &images, 5, recipe.id.unwrap(), true).unwrap();
        assert!(db.get_recipe(recipe.id.unwrap()).unwrap().is_none());
        assert!(!images.exists(&path));
    }
}
