use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use axum::{
    Form, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, Query, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::Config;
use recipebox_core::db::Database;
use recipebox_core::error::RecipeError;
use recipebox_core::images::FsImageStore;
use recipebox_core::models::{ImageUpload, Recipe, RecipeForm};
use recipebox_core::service::RecipeService;
use recipebox_core::users::{register, verify_login};

const BODY_LIMIT: usize = 20 * 1024 * 1024; // 20 MB
const MAX_FORM_PARTS: usize = 100;

#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Database>>,
    images: Arc<FsImageStore>,
    max_categories: usize,
}

impl AppState {
    fn db(&self) -> MutexGuard<'_, Database> {
        self.db
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

// --- Request / Response types ---

#[derive(Serialize)]
struct RecipeListing {
    recipes: Vec<Recipe>,
    favorites_page: bool,
    category_name: Option<String>,
}

#[derive(Deserialize)]
struct DeleteRedirect {
    from: Option<String>,
    category: Option<String>,
}

#[derive(Deserialize)]
struct Credentials {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    username: String,
    role: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    form: Option<serde_json::Value>,
}

/// A recipe form post decoded from `multipart/form-data`.
#[derive(Default)]
struct RecipeSubmission {
    id: Option<i64>,
    form: RecipeForm,
    image: Option<ImageUpload>,
    delete_current_image: bool,
}

impl RecipeSubmission {
    /// The submitted fields for re-editing, without the image bytes.
    fn echo(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(&self.form).unwrap_or(serde_json::Value::Null);
        if let (Some(id), Some(obj)) = (self.id, value.as_object_mut()) {
            obj.insert("id".to_string(), id.into());
        }
        value
    }
}

// --- Error handling ---

enum ApiError {
    Validation {
        message: String,
        form: Option<serde_json::Value>,
    },
    NotFound(String),
    Unauthorized(String),
    Rejected(StatusCode, String),
    Internal(anyhow::Error),
}

impl ApiError {
    fn with_form(self, form: serde_json::Value) -> Self {
        match self {
            Self::Validation { message, .. } => Self::Validation {
                message,
                form: Some(form),
            },
            other => other,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, form) = match self {
            Self::Validation { message, form } => (StatusCode::BAD_REQUEST, message, form),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg, None),
            Self::Rejected(status, msg) => (status, msg, None),
            Self::Internal(err) => {
                error!("internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                form,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<RecipeError> for ApiError {
    fn from(err: RecipeError) -> Self {
        match err {
            RecipeError::Validation(message) => Self::Validation {
                message,
                form: None,
            },
            RecipeError::NotFound(_) => Self::NotFound(err.to_string()),
            RecipeError::Storage(e) | RecipeError::Internal(e) => Self::Internal(e),
        }
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        Self::Rejected(err.status(), err.body_text())
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));
    response
}

// --- Form decoding ---

fn is_checked(value: &str) -> bool {
    let value = value.trim();
    ["true", "on", "1", "yes"]
        .iter()
        .any(|accepted| value.eq_ignore_ascii_case(accepted))
}

async fn read_submission(mut multipart: Multipart) -> Result<RecipeSubmission, ApiError> {
    let mut submission = RecipeSubmission::default();
    let mut parts = 0;

    while let Some(field) = multipart.next_field().await? {
        parts += 1;
        if parts > MAX_FORM_PARTS {
            return Err(ApiError::Validation {
                message: format!("Too many form fields (limit is {MAX_FORM_PARTS})"),
                form: Some(submission.echo()),
            });
        }

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await?;
                submission.image = Some(ImageUpload {
                    file_name,
                    bytes: bytes.to_vec(),
                });
            }
            "title" => submission.form.title = field.text().await?,
            "ingredients" => submission.form.ingredients = field.text().await?,
            "instructions" => submission.form.instructions = field.text().await?,
            "favorite" => submission.form.favorite = is_checked(&field.text().await?),
            "reference" => submission.form.reference = Some(field.text().await?),
            "categories" => submission.form.categories.push(field.text().await?),
            "deleteCurrentImage" => {
                submission.delete_current_image = is_checked(&field.text().await?);
            }
            "id" => {
                let raw = field.text().await?;
                let id = raw.trim().parse::<i64>().map_err(|_| ApiError::Validation {
                    message: format!("Invalid recipe id '{raw}'"),
                    form: Some(submission.echo()),
                })?;
                submission.id = Some(id);
            }
            _ => {}
        }
    }

    Ok(submission)
}

// --- Recipe handlers ---

async fn root() -> Redirect {
    Redirect::to("/home")
}

async fn home(State(state): State<AppState>) -> Result<Json<RecipeListing>, ApiError> {
    let db = state.db();
    let service = RecipeService::new(&*db, &*state.images, state.max_categories);
    Ok(Json(RecipeListing {
        recipes: service.list_all()?,
        favorites_page: false,
        category_name: None,
    }))
}

async fn favorites(State(state): State<AppState>) -> Result<Json<RecipeListing>, ApiError> {
    let db = state.db();
    let service = RecipeService::new(&*db, &*state.images, state.max_categories);
    Ok(Json(RecipeListing {
        recipes: service.list_favorites()?,
        favorites_page: true,
        category_name: None,
    }))
}

async fn by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<RecipeListing>, ApiError> {
    let db = state.db();
    let service = RecipeService::new(&*db, &*state.images, state.max_categories);
    Ok(Json(RecipeListing {
        recipes: service.list_by_category(&category)?,
        favorites_page: false,
        category_name: Some(category),
    }))
}

async fn new_recipe_form() -> Json<RecipeForm> {
    Json(RecipeForm::default())
}

async fn create_recipe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, ApiError> {
    let submission = read_submission(multipart).await?;

    // File writes and the database lock stay off the async workers
    tokio::task::spawn_blocking(move || {
        let db = state.db();
        let service = RecipeService::new(&*db, &*state.images, state.max_categories);
        service
            .create(&submission.form, submission.image.as_ref())
            .map(|_| ())
            .map_err(|e| ApiError::from(e).with_form(submission.echo()))
    })
    .await
    .context("create task failed")??;

    Ok(Redirect::to("/home?loading=true"))
}

async fn edit_recipe_form(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Recipe>, ApiError> {
    let db = state.db();
    let service = RecipeService::new(&*db, &*state.images, state.max_categories);
    Ok(Json(service.get(id)?))
}

async fn update_recipe(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Redirect, ApiError> {
    let submission = read_submission(multipart).await?;
    let Some(id) = submission.id else {
        return Err(ApiError::Validation {
            message: "Recipe id is required".to_string(),
            form: Some(submission.echo()),
        });
    };

    tokio::task::spawn_blocking(move || {
        let db = state.db();
        let service = RecipeService::new(&*db, &*state.images, state.max_categories);
        service
            .update(
                id,
                &submission.form,
                submission.image.as_ref(),
                submission.delete_current_image,
            )
            .map(|_| ())
            .map_err(|e| ApiError::from(e).with_form(submission.echo()))
    })
    .await
    .context("update task failed")??;

    Ok(Redirect::to("/home?loading=true"))
}

fn delete_redirect_target(params: &DeleteRedirect) -> String {
    if params.from.as_deref().is_some_and(is_checked) {
        return "/recipes/favorites".to_string();
    }
    match params.category.as_deref().map(str::trim) {
        Some(category) if !category.is_empty() => {
            format!("/recipes/category/{}", percent_encode_component(category))
        }
        _ => "/home".to_string(),
    }
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<DeleteRedirect>,
) -> Result<Redirect, ApiError> {
    {
        let db = state.db();
        let service = RecipeService::new(&*db, &*state.images, state.max_categories);
        service.delete(id)?;
    }
    Ok(Redirect::to(&delete_redirect_target(&params)))
}

/// AJAX delete: bare status codes, no body.
async fn delete_recipe_ajax(State(state): State<AppState>, Path(id): Path<i64>) -> StatusCode {
    let db = state.db();
    let service = RecipeService::new(&*db, &*state.images, state.max_categories);
    match service.exists(id) {
        Ok(true) => {}
        Ok(false) => return StatusCode::NOT_FOUND,
        Err(e) => {
            error!(id, "failed to look up recipe: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    }
    match service.delete(id) {
        Ok(()) => StatusCode::OK,
        Err(e) if e.is_client_error() => StatusCode::NOT_FOUND,
        Err(e) => {
            error!(id, "failed to delete recipe: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn toggle_favorite(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let db = state.db();
    let service = RecipeService::new(&*db, &*state.images, state.max_categories);
    match service.toggle_favorite(id) {
        Ok(favorite) => Json(favorite).into_response(),
        Err(RecipeError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            error!(id, "failed to toggle favorite: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// --- Account handlers ---

async fn registration_form() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "username": "" }))
}

async fn register_user(
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> Result<Redirect, ApiError> {
    let db = state.db();
    register(&*db, &credentials.username, &credentials.password).map_err(|e| {
        ApiError::from(e).with_form(serde_json::json!({ "username": credentials.username }))
    })?;
    Ok(Redirect::to("/login"))
}

async fn login_form() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "action": "/login",
        "fields": ["username", "password"],
    }))
}

async fn login(
    State(state): State<AppState>,
    Form(credentials): Form<Credentials>,
) -> Result<Json<LoginResponse>, ApiError> {
    let db = state.db();
    let user = verify_login(&*db, &credentials.username, &credentials.password)
        .context("failed to verify credentials")?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;
    Ok(Json(LoginResponse {
        username: user.username,
        role: user.role.as_str(),
    }))
}

/// Minimal percent-encoding for a single URL path segment.
///
/// Everything outside the RFC 3986 unreserved set is encoded, including
/// `/`, so a category like `Soups/Stews` stays one segment.
fn percent_encode_component(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len() * 3);
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push('%');
                encoded.push(char::from(HEX_CHARS[(byte >> 4) as usize]));
                encoded.push(char::from(HEX_CHARS[(byte & 0x0F) as usize]));
            }
        }
    }
    encoded
}

const HEX_CHARS: [u8; 16] = *b"0123456789ABCDEF";

// --- Router builder ---

fn build_router(state: AppState) -> Router {
    let uploads = ServeDir::new(state.images.dir());

    Router::new()
        .route("/", get(root))
        .route("/home", get(home))
        .route("/recipes/new", get(new_recipe_form).post(create_recipe))
        .route("/recipes/edit/{id}", get(edit_recipe_form))
        .route("/recipes/update", post(update_recipe))
        .route(
            "/recipes/{id}/delete",
            post(delete_recipe).delete(delete_recipe_ajax),
        )
        .route("/recipes/{id}/toggleFavorite", post(toggle_favorite))
        .route("/recipes/favorites", get(favorites))
        .route("/recipes/category/{category}", get(by_category))
        .route("/register", get(registration_form).post(register_user))
        .route("/login", get(login_form).post(login))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    db: Database,
    images: FsImageStore,
    config: &Config,
    port: u16,
    bind: &str,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(images.dir()).with_context(|| {
        format!(
            "Failed to create uploads directory: {}",
            images.dir().display()
        )
    })?;

    let state = AppState {
        db: Arc::new(Mutex::new(db)),
        images: Arc::new(images),
        max_categories: config.max_categories,
    };

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!(
        data_dir = %config.data_dir.display(),
        uploads_dir = %config.uploads_dir.display(),
        max_categories = config.max_categories,
        "listening on http://{bind}:{port}"
    );
    axum::serve(listener, app).await?;

    Ok(())
}
