use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::models::{NewUser, Recipe, Role, User};
use crate::service::RecipeStore;
use crate::users::UserStore;

// Stays below SQLite's bound-parameter limit.
const CATEGORY_BATCH: usize = 500;

const RECIPE_COLUMNS: &str =
    "id, title, ingredients, instructions, favorite, reference, image_path, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    ingredients TEXT NOT NULL DEFAULT '',
                    instructions TEXT NOT NULL DEFAULT '',
                    favorite INTEGER NOT NULL DEFAULT 0,
                    reference TEXT,
                    image_path TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_categories (
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    category TEXT NOT NULL,
                    PRIMARY KEY (recipe_id, category)
                );

                CREATE INDEX IF NOT EXISTS idx_recipe_categories_category ON recipe_categories(category);
                CREATE INDEX IF NOT EXISTS idx_recipes_favorite ON recipes(favorite);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects RECIPE_COLUMNS order; categories are filled in separately.
    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: Some(row.get(0)?),
            title: row.get(1)?,
            ingredients: row.get(2)?,
            instructions: row.get(3)?,
            favorite: row.get(4)?,
            reference: row.get(5)?,
            image_path: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
            categories: BTreeSet::new(),
        })
    }

    fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<(User, String)> {
        let role: String = row.get(3)?;
        Ok((
            User {
                id: row.get(0)?,
                username: row.get(1)?,
                password_hash: row.get(2)?,
                role: Role::User,
                created_at: row.get(4)?,
            },
            role,
        ))
    }

    // --- Recipes ---

    /// Insert the recipe when it has no id yet, otherwise overwrite the stored row.
    pub fn save_recipe(&self, recipe: &Recipe) -> Result<Recipe> {
        let now = Local::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;

        let id = if let Some(id) = recipe.id {
            let rows = tx.execute(
                "UPDATE recipes SET title = ?1, ingredients = ?2, instructions = ?3, favorite = ?4,
                        reference = ?5, image_path = ?6, updated_at = ?7
                 WHERE id = ?8",
                params![
                    recipe.title,
                    recipe.ingredients,
                    recipe.instructions,
                    recipe.favorite,
                    recipe.reference,
                    recipe.image_path,
                    now,
                    id,
                ],
            )?;
            if rows == 0 {
                bail!("Recipe {id} no longer exists");
            }
            tx.execute(
                "DELETE FROM recipe_categories WHERE recipe_id = ?1",
                params![id],
            )?;
            id
        } else {
            tx.execute(
                "INSERT INTO recipes (title, ingredients, instructions, favorite, reference, image_path, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    recipe.title,
                    recipe.ingredients,
                    recipe.instructions,
                    recipe.favorite,
                    recipe.reference,
                    recipe.image_path,
                    now,
                    now,
                ],
            )?;
            tx.last_insert_rowid()
        };

        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO recipe_categories (recipe_id, category) VALUES (?1, ?2)",
            )?;
            for category in &recipe.categories {
                stmt.execute(params![id, category])?;
            }
        }
        tx.commit()?;

        self.get_recipe(id)?
            .with_context(|| format!("Recipe {id} missing after save"))
    }

    pub fn get_recipe(&self, id: i64) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .optional()?;

        let Some(mut recipe) = recipe else {
            return Ok(None);
        };
        recipe.categories = self.get_recipe_categories(id)?;
        Ok(Some(recipe))
    }

    pub fn get_recipe_categories(&self, recipe_id: i64) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT category FROM recipe_categories WHERE recipe_id = ?1")?;
        let categories = stmt
            .query_map(params![recipe_id], |row| row.get(0))?
            .collect::<Result<BTreeSet<String>, _>>()?;
        Ok(categories)
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        self.query_recipes(
            &format!("SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY id"),
            [],
        )
    }

    pub fn list_favorite_recipes(&self) -> Result<Vec<Recipe>> {
        self.query_recipes(
            &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE favorite = 1 ORDER BY id"),
            [],
        )
    }

    /// Recipes tagged with exactly `category` (case-sensitive).
    pub fn list_recipes_by_category(&self, category: &str) -> Result<Vec<Recipe>> {
        self.query_recipes(
            &format!(
                "SELECT {RECIPE_COLUMNS} FROM recipes
                 WHERE id IN (SELECT recipe_id FROM recipe_categories WHERE category = ?1)
                 ORDER BY id"
            ),
            params![category],
        )
    }

    pub fn recipe_exists(&self, id: i64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM recipes WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn delete_recipe(&self, id: i64) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        // CASCADE covers this too, but only when foreign keys are enabled
        tx.execute(
            "DELETE FROM recipe_categories WHERE recipe_id = ?1",
            params![id],
        )?;
        let rows = tx.execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    fn query_recipes<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut recipes = stmt
            .query_map(params, Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        if recipes.is_empty() {
            return Ok(recipes);
        }

        let ids: Vec<i64> = recipes.iter().filter_map(|r| r.id).collect();
        let mut by_recipe = self.categories_for(&ids)?;
        for recipe in &mut recipes {
            if let Some(categories) = recipe.id.and_then(|id| by_recipe.remove(&id)) {
                recipe.categories = categories;
            }
        }
        Ok(recipes)
    }

    /// Category sets of the given recipes, queried in batches.
    fn categories_for(&self, ids: &[i64]) -> Result<HashMap<i64, BTreeSet<String>>> {
        let mut map: HashMap<i64, BTreeSet<String>> = HashMap::new();
        for chunk in ids.chunks(CATEGORY_BATCH) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = self.conn.prepare(&format!(
                "SELECT recipe_id, category FROM recipe_categories WHERE recipe_id IN ({placeholders})"
            ))?;
            let mut rows = stmt.query(params_from_iter(chunk))?;
            while let Some(row) = rows.next()? {
                map.entry(row.get(0)?).or_default().insert(row.get(1)?);
            }
        }
        Ok(map)
    }

    /// Distinct categories in use, sorted.
    pub fn list_categories(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT category FROM recipe_categories ORDER BY category")?;
        let categories = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(categories)
    }

    // --- Users ---

    pub fn insert_user(&self, user: &NewUser) -> Result<User> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO users (username, password_hash, role, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![user.username, user.password_hash, user.role.as_str(), now],
            )
            .with_context(|| format!("Failed to insert user '{}'", user.username))?;
        let id = self.conn.last_insert_rowid();
        Ok(User {
            id,
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            created_at: now,
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, username, password_hash, role, created_at FROM users WHERE username = ?1",
                params![username],
                Self::user_from_row,
            )
            .optional()?;

        match row {
            Some((mut user, role)) => {
                user.role = Role::parse(&role)?;
                Ok(Some(user))
            }
            None => Ok(None),
        }
    }
}

impl RecipeStore for Database {
    fn save(&self, recipe: &Recipe) -> Result<Recipe> {
        self.save_recipe(recipe)
    }

    fn find_by_id(&self, id: i64) -> Result<Option<Recipe>> {
        self.get_recipe(id)
    }

    fn find_all(&self) -> Result<Vec<Recipe>> {
        self.list_recipes()
    }

    fn find_by_favorite_true(&self) -> Result<Vec<Recipe>> {
        self.list_favorite_recipes()
    }

    fn find_by_category(&self, category: &str) -> Result<Vec<Recipe>> {
        self.list_recipes_by_category(category)
    }

    fn exists_by_id(&self, id: i64) -> Result<bool> {
        self.recipe_exists(id)
    }

    fn delete_by_id(&self, id: i64) -> Result<bool> {
        self.delete_recipe(id)
    }
}

impl UserStore for Database {
    fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.get_user_by_username(username)
    }

    fn insert(&self, user: &NewUser) -> Result<User> {
        self.insert_user(user)
    }
}
