use anyhow::Result;

use recipebox_core::db::Database;
use recipebox_core::users::register;

pub(crate) fn cmd_user_add(db: &Database, username: &str, password: &str, json: bool) -> Result<()> {
    let user = register(db, username, password)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        let name = &user.username;
        println!("Created user: {name} ({})", user.role.as_str());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use recipebox_core::models::Role;

    #[test]
    fn test_add_user_creates_regular_account() {
        let db = Database::open_in_memory().unwrap();
        cmd_user_add(&db, "chef", "pw", true).unwrap();

        let user = db.get_user_by_username("chef").unwrap().unwrap();
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_add_duplicate_user_fails() {
        let db = Database::open_in_memory().unwrap();
        cmd_user_add(&db, "chef", "pw", false).unwrap();
        let err = cmd_user_add(&db, "chef", "other", false).unwrap_err();
        assert!(err.to_string().contains("already taken"));
    }
}
