mod helpers;
mod recipe;
mod user;

pub(crate) use recipe::{
    cmd_recipe_categories, cmd_recipe_delete, cmd_recipe_favorite, cmd_recipe_list,
    cmd_recipe_show,
};
pub(crate) use user::cmd_user_add;
