use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Account role. Admins are ordinary accounts with elevated access; they are
/// seeded at startup from configuration, not compared against inline literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum Genre {
    Romance,
    Comic,
    Horror,
    Research,
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Genre::Romance => "Romance",
            Genre::Comic => "Comic",
            Genre::Horror => "Horror",
            Genre::Research => "Research",
        })
    }
}

impl FromStr for Genre {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Romance" => Ok(Genre::Romance),
            "Comic" => Ok(Genre::Comic),
            "Horror" => Ok(Genre::Horror),
            "Research" => Ok(Genre::Research),
            other => Err(format!("unknown genre: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum BookStatus {
    Available,
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum PaymentMethod {
    Upi,
    CreditCard,
    BankTransfer,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub is_subscribed: bool,
    pub subscription_start_date: Option<NaiveDate>,
    pub subscription_end_date: Option<NaiveDate>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Author {
    pub id: Uuid,
    pub name: String,
}

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct Book {
    pub id: Uuid,
    pub book_id: String,
    pub name: String,
    pub author_id: Uuid,
    pub genre: Genre,
    pub rent_price: i32,
    pub status: BookStatus,
    pub copies: i32,
    pub rental_days: i32,
    pub cover_image: Option<String>,
    pub pdf: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct Rental {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub rental_start_date: NaiveDate,
    pub rental_end_date: NaiveDate,
}

#[derive(sqlx::FromRow, Debug, Clone)]
#[allow(dead_code)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub method: PaymentMethod,
    pub upi_id: Option<String>,
    pub card_number: Option<String>,
    pub expiry_date: Option<String>,
    pub cvc: Option<String>,
    pub account_number: Option<String>,
    pub ifsc_code: Option<String>,
    pub amount: i64,
    pub payment_date: DateTime<Utc>,
}

/// Method-specific payment details as submitted by the payment form.
/// Only the fields belonging to the chosen method are kept on the stored row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentFields {
    pub upi_id: Option<String>,
    pub card_number: Option<String>,
    pub expiry_date: Option<String>,
    pub cvc: Option<String>,
    pub account_number: Option<String>,
    pub ifsc_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub exp: usize,
    pub refresh: bool,
}

/// Authenticated caller, inserted into request extensions by the auth middleware.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 50))]
    pub firstname: String,
    #[validate(length(min = 1, max = 50))]
    pub lastname: String,
    #[validate(email)]
    pub emailid: String,
    #[validate(length(min = 1, max = 50))]
    pub userid: String,
    #[validate(length(max = 50))]
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub userid: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 50))]
    pub userid: String,
    #[validate(length(min = 1, max = 50))]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct BookResponse {
    pub id: Uuid,
    pub book_id: String,
    pub name: String,
    pub author: String,
    pub genre: Genre,
    pub rent_price: i32,
    pub status: BookStatus,
    pub copies: i32,
    pub rental_days: i32,
    pub cover_image: Option<String>,
    pub pdf: Option<String>,
}

/// Payment submission for `/activate_plan/{plan_duration}`; the amount comes
/// from the plan price table, never from the client.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub payment_method: PaymentMethod,
    #[serde(flatten)]
    pub fields: PaymentFields,
}

/// Payment submission for `/payment`, carrying the chosen plan in the body.
#[derive(Debug, Deserialize)]
pub struct PayAndSubscribeRequest {
    pub plan: String,
    pub payment_method: PaymentMethod,
    #[serde(flatten)]
    pub fields: PaymentFields,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub plan: String,
    pub amount: i64,
    pub subscription_start_date: NaiveDate,
    pub subscription_end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct RentConfirmation {
    pub rental_id: Uuid,
    pub book_name: String,
    pub rental_days: i32,
    pub rental_start_date: NaiveDate,
    pub rental_end_date: NaiveDate,
}

/// Single-field catalog patch as submitted by the admin edit form.
#[derive(Debug, Deserialize)]
pub struct EditBookRequest {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAuthorRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorName {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub userid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_subscribed: bool,
    pub subscription_start_date: Option<NaiveDate>,
    pub subscription_end_date: Option<NaiveDate>,
    pub rented_books: Vec<Rental>,
}

#[derive(sqlx::FromRow, Debug, Serialize)]
pub struct UserRecord {
    pub userid: String,
    pub email: String,
    pub is_subscribed: bool,
    pub subscription_start_date: Option<NaiveDate>,
    pub subscription_end_date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct OverdueRental {
    #[serde(flatten)]
    pub rental: Rental,
    pub overdue_days: i64,
}
