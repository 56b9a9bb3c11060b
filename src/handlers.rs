use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState, accounts, catalog,
    errors::{AppError, AppResult},
    membership,
    models::{
        Author, AuthorName, AuthUser, Book, BookResponse, CreateAuthorRequest, EditBookRequest,
        Genre, LoginRequest, OverdueRental, PayAndSubscribeRequest, PaymentFields, PaymentMethod,
        PaymentRequest, ProfileResponse, RegisterRequest, RentConfirmation, Rental, Role,
        SubscriptionResponse, TokenResponse, UserRecord, UserResponse,
    },
    rental,
    utils::{create_jwt_tokens, verify_password},
    validators::{self, CredentialContext},
};

/// Service banner.
#[must_use]
#[allow(clippy::unused_async)]
pub async fn home() -> &'static str {
    "LibRent API ready"
}

/// Health check endpoint.
#[must_use]
#[allow(clippy::unused_async)]
pub async fn health_check() -> &'static str {
    "OK"
}

/// Register a new user account and its profile.
///
/// # Errors
/// Returns validation errors, `UsernameTaken`, or database errors.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    validators::validate_userid(&payload.userid)?;
    validators::validate_password(&payload.password, CredentialContext::Registration)?;
    if payload.password != payload.confirm_password {
        return Err(AppError::Validation("passwords do not match".into()));
    }

    let account = accounts::NewAccount {
        username: payload.userid,
        email: payload.emailid,
        password: payload.password,
        first_name: payload.firstname,
        last_name: payload.lastname,
        role: Role::Customer,
    };
    let (user, _profile) = accounts::create_account(&state.db, &account).await?;

    Ok((
        StatusCode::CREATED,
        Json(UserResponse {
            id: user.id,
            userid: user.username,
        }),
    ))
}

/// Authenticate a user and return JWT tokens.
///
/// # Errors
/// Returns validation errors, `AuthenticationFailed`, or database errors.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<(StatusCode, Json<TokenResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    validators::validate_userid(&payload.userid)?;
    validators::validate_password(&payload.password, CredentialContext::Login)?;

    let user = accounts::find_by_username(&state.db, &payload.userid)
        .await?
        .ok_or(AppError::AuthenticationFailed)?;

    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::AuthenticationFailed);
    }

    let (access, refresh) = create_jwt_tokens(user.id, user.role, &state.config)?;
    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            access_token: access,
            refresh_token: refresh,
        }),
    ))
}

/// Refresh JWT tokens using a refresh token.
///
/// # Errors
/// Returns unauthorized errors or token decoding errors.
#[allow(clippy::unused_async)]
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<TokenResponse>,
) -> AppResult<Json<TokenResponse>> {
    let claims = crate::utils::decode_jwt(&body.refresh_token, &state.config)?;
    if !claims.refresh {
        return Err(AppError::Unauthorized);
    }
    let (access, refresh) = create_jwt_tokens(claims.sub, claims.role, &state.config)?;
    Ok(Json(TokenResponse {
        access_token: access,
        refresh_token: refresh,
    }))
}

async fn to_book_responses(
    state: &AppState,
    books: Vec<Book>,
) -> AppResult<Vec<BookResponse>> {
    let authors: HashMap<Uuid, String> = catalog::list_authors(&state.db)
        .await?
        .into_iter()
        .map(|a| (a.id, a.name))
        .collect();

    Ok(books
        .into_iter()
        .map(|b| {
            let author = authors.get(&b.author_id).cloned().unwrap_or_default();
            book_response(b, author)
        })
        .collect())
}

fn book_response(b: Book, author: String) -> BookResponse {
    BookResponse {
        id: b.id,
        book_id: b.book_id,
        name: b.name,
        author,
        genre: b.genre,
        rent_price: b.rent_price,
        status: b.status,
        copies: b.copies,
        rental_days: b.rental_days,
        cover_image: b.cover_image,
        pdf: b.pdf,
    }
}

/// Catalog filtered by genre.
///
/// # Errors
/// Returns `NotFound` for an unknown genre or an empty shelf, or database
/// errors.
pub async fn books_by_genre(
    State(state): State<Arc<AppState>>,
    Path(genre): Path<String>,
) -> AppResult<Json<Vec<BookResponse>>> {
    let genre = Genre::from_str(&genre).map_err(|_| AppError::NotFound)?;
    let books = catalog::filter_by_genre(&state.db, genre).await?;
    Ok(Json(to_book_responses(&state, books).await?))
}

/// Details for a single book.
///
/// # Errors
/// Returns `NotFound` or database errors.
pub async fn book_details(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
) -> AppResult<Json<BookResponse>> {
    let book = catalog::find_by_id(&state.db, book_id).await?;
    let author = catalog::author_name(&state.db, book.author_id).await?;
    Ok(Json(book_response(book, author)))
}

#[derive(Debug, Deserialize)]
pub struct AuthorSearchQuery {
    #[serde(default)]
    pub query: String,
}

/// Author-name autocomplete; returns a JSON array of `{"name": ...}`.
///
/// # Errors
/// Returns database errors.
pub async fn search_authors(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AuthorSearchQuery>,
) -> AppResult<Json<Vec<AuthorName>>> {
    let results = catalog::search_authors(&state.db, &params.query).await?;
    Ok(Json(results))
}

async fn pay_and_activate(
    state: &AppState,
    user_id: Uuid,
    plan: &str,
    payment_method: PaymentMethod,
    fields: &PaymentFields,
) -> AppResult<SubscriptionResponse> {
    let amount = membership::plan_amount(plan)
        .ok_or_else(|| AppError::Validation(format!("invalid plan: {plan}")))?;

    // Payment first; the subscription is only activated once the payment row
    // is durably recorded.
    let payment =
        membership::record_payment(&state.db, user_id, payment_method, fields, amount).await?;
    tracing::info!(
        user_id = %user_id,
        amount,
        method = ?payment.method,
        "payment recorded for {plan} plan"
    );

    let today = Utc::now().date_naive();
    let profile = membership::activate_subscription(&state.db, user_id, plan, today).await?;

    Ok(SubscriptionResponse {
        plan: plan.to_string(),
        amount,
        subscription_start_date: profile.subscription_start_date.unwrap_or(today),
        subscription_end_date: profile
            .subscription_end_date
            .unwrap_or_else(|| membership::subscription_window(plan, today).1),
    })
}

/// Pay for and activate the membership plan named in the path.
///
/// # Errors
/// Returns validation or database errors.
pub async fn activate_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_duration): Path<String>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<PaymentRequest>,
) -> AppResult<Json<SubscriptionResponse>> {
    let response = pay_and_activate(
        &state,
        auth.id,
        &plan_duration,
        payload.payment_method,
        &payload.fields,
    )
    .await?;
    Ok(Json(response))
}

/// Pay for and activate the membership plan named in the body.
///
/// # Errors
/// Returns validation or database errors.
pub async fn pay_and_subscribe(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    Json(payload): Json<PayAndSubscribeRequest>,
) -> AppResult<Json<SubscriptionResponse>> {
    let response = pay_and_activate(
        &state,
        auth.id,
        &payload.plan,
        payload.payment_method,
        &payload.fields,
    )
    .await?;
    Ok(Json(response))
}

/// Books available to rent. Requires an active membership.
///
/// # Errors
/// Returns `MembershipRequired` or database errors.
pub async fn rentable_books(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<Json<Vec<BookResponse>>> {
    let active = membership::has_active_membership(
        &state.db,
        auth.id,
        Utc::now(),
        state.config.membership_lookback_days,
    )
    .await?;
    if !active {
        return Err(AppError::MembershipRequired);
    }

    let books = catalog::list_available(&state.db).await?;
    Ok(Json(to_book_responses(&state, books).await?))
}

/// Rent one copy of a book.
///
/// # Errors
/// Returns `MembershipRequired`, `NotFound`, `BookUnavailable`, or database
/// errors.
pub async fn rent_this_book(
    State(state): State<Arc<AppState>>,
    Path(book_id): Path<Uuid>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<(StatusCode, Json<RentConfirmation>)> {
    let user = accounts::find_by_id(&state.db, auth.id).await?;
    let (rental, book_name) = rental::rent_book(
        &state.db,
        &user,
        book_id,
        Utc::now(),
        state.config.membership_lookback_days,
    )
    .await?;

    tracing::info!(user = %user.username, book = %book_name, "book rented");

    let days = (rental.rental_end_date - rental.rental_start_date).num_days();
    Ok((
        StatusCode::CREATED,
        Json(RentConfirmation {
            rental_id: rental.id,
            book_name,
            rental_days: i32::try_from(days).unwrap_or(i32::MAX),
            rental_start_date: rental.rental_start_date,
            rental_end_date: rental.rental_end_date,
        }),
    ))
}

/// The caller's profile: account details, subscription state, rented books.
///
/// # Errors
/// Returns `NotFound` or database errors.
pub async fn view_profile(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> AppResult<Json<ProfileResponse>> {
    let user = accounts::find_by_id(&state.db, auth.id).await?;
    let profile = accounts::find_profile(&state.db, auth.id).await?;
    let rented_books = rental::rentals_for_user(&state.db, auth.id).await?;

    Ok(Json(ProfileResponse {
        userid: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
        email: user.email,
        is_subscribed: profile.is_subscribed,
        subscription_start_date: profile.subscription_start_date,
        subscription_end_date: profile.subscription_end_date,
        rented_books,
    }))
}

/// Full catalog for the admin view.
///
/// # Errors
/// Returns database errors.
pub async fn books_catalog(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<BookResponse>>> {
    let books = catalog::list_all(&state.db).await?;
    Ok(Json(to_book_responses(&state, books).await?))
}

async fn save_upload(
    dir: &str,
    rel_dir: &str,
    file_name: &str,
    data: &[u8],
) -> AppResult<String> {
    let stored_name = format!("{}_{}", Uuid::new_v4(), file_name);
    let path = format!("{dir}/{stored_name}");
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| AppError::Anyhow(e.into()))?;
    file.write_all(data)
        .await
        .map_err(|e| AppError::Anyhow(e.into()))?;
    Ok(format!("{rel_dir}/{stored_name}"))
}

/// Admin: add a book to the catalog (multipart; optional cover image and PDF).
///
/// # Errors
/// Returns validation errors, I/O errors, or database errors.
pub async fn add_to_collections(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<BookResponse>)> {
    let mut book_id = None;
    let mut name = None;
    let mut author_id = None;
    let mut genre = None;
    let mut rent_price = None;
    let mut copies: i32 = 1;
    let mut rental_days: i32 = 7;
    let mut cover_image = None;
    let mut pdf = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?
    {
        let field_name = field.name().unwrap_or("").to_string();
        match field_name.as_str() {
            "book_id" => book_id = Some(text_field(field).await?),
            "name" => name = Some(text_field(field).await?),
            "author_id" => {
                let value = text_field(field).await?;
                let id = Uuid::parse_str(&value)
                    .map_err(|_| AppError::Validation("author_id must be a UUID".into()))?;
                author_id = Some(id);
            }
            "genre" => {
                let value = text_field(field).await?;
                genre = Some(Genre::from_str(&value).map_err(AppError::Validation)?);
            }
            "rent_price" => {
                let value = text_field(field).await?;
                rent_price = Some(value.parse::<i32>().map_err(|_| {
                    AppError::Validation("rent_price must be a number".into())
                })?);
            }
            "copies" => {
                let value = text_field(field).await?;
                copies = value
                    .parse()
                    .map_err(|_| AppError::Validation("copies must be a number".into()))?;
            }
            "rental_days" => {
                let value = text_field(field).await?;
                rental_days = value
                    .parse()
                    .map_err(|_| AppError::Validation("rental_days must be a number".into()))?;
            }
            "cover_image" => {
                if let Some(stored) = file_field(
                    &state,
                    field,
                    &["image/png", "image/jpeg"],
                    &state.config.covers_dir(),
                    "book_covers",
                )
                .await?
                {
                    cover_image = Some(stored);
                }
            }
            "pdf" => {
                if let Some(stored) = file_field(
                    &state,
                    field,
                    &["application/pdf"],
                    &state.config.pdfs_dir(),
                    "book_pdfs",
                )
                .await?
                {
                    pdf = Some(stored);
                }
            }
            _ => {}
        }
    }

    let new_book = catalog::NewBook {
        book_id: book_id.ok_or_else(|| AppError::Validation("book_id is required".into()))?,
        name: name.ok_or_else(|| AppError::Validation("name is required".into()))?,
        author_id: author_id
            .ok_or_else(|| AppError::Validation("author_id is required".into()))?,
        genre: genre.ok_or_else(|| AppError::Validation("genre is required".into()))?,
        rent_price: rent_price
            .ok_or_else(|| AppError::Validation("rent_price is required".into()))?,
        copies,
        rental_days,
        cover_image,
        pdf,
    };

    let book = catalog::create(&state.db, &new_book).await?;
    let author = catalog::author_name(&state.db, book.author_id).await?;
    Ok((StatusCode::CREATED, Json(book_response(book, author))))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))
}

async fn file_field(
    state: &AppState,
    field: axum::extract::multipart::Field<'_>,
    allowed_types: &[&str],
    dir: &str,
    rel_dir: &str,
) -> AppResult<Option<String>> {
    let file_name = field.file_name().unwrap_or("").to_string();
    if file_name.is_empty() {
        return Ok(None);
    }

    let content_type = field
        .content_type()
        .map(std::string::ToString::to_string)
        .unwrap_or_default();
    if !allowed_types.contains(&content_type.as_str()) {
        return Err(AppError::Validation(format!(
            "unsupported file type: {content_type}"
        )));
    }

    let data = field
        .bytes()
        .await
        .map_err(|e| AppError::Validation(e.to_string()))?;
    if data.is_empty() {
        return Ok(None);
    }
    if (data.len() as u64) > state.config.max_upload_bytes {
        return Err(AppError::Validation("file too large".into()));
    }

    let stored = save_upload(dir, rel_dir, &file_name, &data).await?;
    Ok(Some(stored))
}

/// Admin: update one field of a book through the permitted-field patch.
///
/// # Errors
/// Returns validation errors, `NotFound`, or database errors.
pub async fn edit_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditBookRequest>,
) -> AppResult<Json<BookResponse>> {
    let patch = catalog::BookPatch::parse(&payload.field, &payload.value)?;
    let book = catalog::apply_patch(&state.db, id, patch).await?;
    let author = catalog::author_name(&state.db, book.author_id).await?;
    Ok(Json(book_response(book, author)))
}

/// Admin: delete a book.
///
/// # Errors
/// Returns `NotFound` or database errors.
pub async fn delete_book(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    catalog::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Admin: register an author.
///
/// # Errors
/// Returns validation or database errors.
pub async fn create_author(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateAuthorRequest>,
) -> AppResult<(StatusCode, Json<Author>)> {
    payload
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let author = catalog::create_author(&state.db, &payload.name).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// Admin: user records, optionally filtered by subscription status.
/// Anything other than `subscribed`/`unsubscribed` lists everyone.
///
/// # Errors
/// Returns database errors.
pub async fn user_records(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UserListQuery>,
) -> AppResult<Json<Vec<UserRecord>>> {
    let subscribed = match params.status.as_deref() {
        Some("subscribed") => Some(true),
        Some("unsubscribed") => Some(false),
        _ => None,
    };
    let records = accounts::list_profiles(&state.db, subscribed).await?;
    Ok(Json(records))
}

/// Admin: rentals whose end date has passed, with days overdue.
///
/// # Errors
/// Returns database errors.
pub async fn overdue_books(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<Vec<OverdueRental>>> {
    let rentals = rental::all_rentals(&state.db).await?;
    let overdue = rental::compute_overdue(&rentals, Utc::now().date_naive());
    Ok(Json(overdue))
}

/// Admin: every rental on record.
///
/// # Errors
/// Returns database errors.
pub async fn borrowed_books(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<Rental>>> {
    let rentals = rental::all_rentals(&state.db).await?;
    Ok(Json(rentals))
}
