use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecipeError {
    #[error("{0}")]
    Validation(String),

    #[error("Recipe {0} not found")]
    NotFound(i64),

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    #[error("Internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl RecipeError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

impl From<anyhow::Error> for RecipeError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err)
    }
}
