//! Membership ledger: payments and subscription activation.
//!
//! Membership is judged by payment recency inside a fixed configurable
//! window, not by the purchased plan's length; see DESIGN.md for why that
//! discrepancy is preserved rather than silently fixed.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    models::{Payment, PaymentFields, PaymentMethod, UserProfile},
};

/// Subscription length in days for a plan duration. Unrecognized plans fall
/// back to the shortest plan.
#[must_use]
pub fn plan_days(plan: &str) -> i64 {
    match plan {
        "1-year" => 365,
        "2-year" => 730,
        _ => 180,
    }
}

/// Price table for membership plans. `None` for plans that are not sold.
#[must_use]
pub fn plan_amount(plan: &str) -> Option<i64> {
    match plan {
        "6-month" => Some(750),
        "1-year" => Some(1500),
        "2-year" => Some(3000),
        _ => None,
    }
}

/// True iff the user has a payment within `lookback_days` of `as_of`.
///
/// # Errors
/// Returns database errors.
pub async fn has_active_membership(
    db: &PgPool,
    user_id: Uuid,
    as_of: DateTime<Utc>,
    lookback_days: i64,
) -> AppResult<bool> {
    let cutoff = as_of - Duration::days(lookback_days);
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM payments WHERE user_id = $1 AND payment_date >= $2)",
    )
    .bind(user_id)
    .bind(cutoff)
    .fetch_one(db)
    .await?;
    Ok(exists)
}

fn is_blank(field: Option<&String>) -> bool {
    field.is_none_or(|v| v.trim().is_empty())
}

/// Check that exactly the fields the chosen method needs are filled in.
///
/// # Errors
/// Returns `AppError::Validation` naming the first missing field.
pub fn validate_method_fields(method: PaymentMethod, fields: &PaymentFields) -> AppResult<()> {
    match method {
        PaymentMethod::Upi => {
            if is_blank(fields.upi_id.as_ref()) {
                return Err(AppError::Validation(
                    "UPI ID is required for UPI payment".into(),
                ));
            }
        }
        PaymentMethod::CreditCard => {
            if is_blank(fields.card_number.as_ref()) {
                return Err(AppError::Validation(
                    "card number is required for credit card payment".into(),
                ));
            }
            if is_blank(fields.expiry_date.as_ref()) {
                return Err(AppError::Validation(
                    "expiry date is required for credit card payment".into(),
                ));
            }
            if is_blank(fields.cvc.as_ref()) {
                return Err(AppError::Validation(
                    "CVC is required for credit card payment".into(),
                ));
            }
        }
        PaymentMethod::BankTransfer => {
            if is_blank(fields.account_number.as_ref()) {
                return Err(AppError::Validation(
                    "account number is required for bank transfer".into(),
                ));
            }
            if is_blank(fields.ifsc_code.as_ref()) {
                return Err(AppError::Validation(
                    "IFSC code is required for bank transfer".into(),
                ));
            }
        }
    }
    Ok(())
}

/// Keep only the fields that belong to the chosen method; everything else is
/// stored as NULL.
#[must_use]
pub fn fields_for_method(method: PaymentMethod, fields: &PaymentFields) -> PaymentFields {
    let mut kept = PaymentFields::default();
    match method {
        PaymentMethod::Upi => {
            kept.upi_id = fields.upi_id.clone();
        }
        PaymentMethod::CreditCard => {
            kept.card_number = fields.card_number.clone();
            kept.expiry_date = fields.expiry_date.clone();
            kept.cvc = fields.cvc.clone();
        }
        PaymentMethod::BankTransfer => {
            kept.account_number = fields.account_number.clone();
            kept.ifsc_code = fields.ifsc_code.clone();
        }
    }
    kept
}

/// Validate and persist a payment, stamped with the current time.
///
/// # Errors
/// Returns validation or database errors.
pub async fn record_payment(
    db: &PgPool,
    user_id: Uuid,
    method: PaymentMethod,
    fields: &PaymentFields,
    amount: i64,
) -> AppResult<Payment> {
    validate_method_fields(method, fields)?;
    let kept = fields_for_method(method, fields);

    let payment = sqlx::query_as::<_, Payment>(
        "INSERT INTO payments (id, user_id, method, upi_id, card_number, expiry_date, cvc, account_number, ifsc_code, amount)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING id, user_id, method, upi_id, card_number, expiry_date, cvc, account_number, ifsc_code, amount, payment_date",
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(method)
    .bind(&kept.upi_id)
    .bind(&kept.card_number)
    .bind(&kept.expiry_date)
    .bind(&kept.cvc)
    .bind(&kept.account_number)
    .bind(&kept.ifsc_code)
    .bind(amount)
    .fetch_one(db)
    .await?;

    Ok(payment)
}

/// Compute the subscription window granted by a plan starting `today`.
#[must_use]
pub fn subscription_window(plan: &str, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today, today + Duration::days(plan_days(plan)))
}

/// Mark the user's profile subscribed from `today` for the plan's duration.
///
/// # Errors
/// Returns `NotFound` when the profile is missing, or database errors.
pub async fn activate_subscription(
    db: &PgPool,
    user_id: Uuid,
    plan: &str,
    today: NaiveDate,
) -> AppResult<UserProfile> {
    let (start, end) = subscription_window(plan, today);

    sqlx::query_as::<_, UserProfile>(
        "UPDATE user_profiles
         SET is_subscribed = TRUE, subscription_start_date = $2, subscription_end_date = $3
         WHERE user_id = $1
         RETURNING user_id, is_subscribed, subscription_start_date, subscription_end_date",
    )
    .bind(user_id)
    .bind(start)
    .bind(end)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn plan_days_table() {
        assert_eq!(plan_days("6-month"), 180);
        assert_eq!(plan_days("1-year"), 365);
        assert_eq!(plan_days("2-year"), 730);
        assert_eq!(plan_days("lifetime"), 180);
    }

    #[test]
    fn plan_amount_table() {
        assert_eq!(plan_amount("6-month"), Some(750));
        assert_eq!(plan_amount("1-year"), Some(1500));
        assert_eq!(plan_amount("2-year"), Some(3000));
        assert_eq!(plan_amount("lifetime"), None);
    }

    #[test]
    fn subscription_window_adds_plan_days() {
        let today = date(2026, 1, 1);
        assert_eq!(
            subscription_window("1-year", today),
            (today, date(2027, 1, 1))
        );
        assert_eq!(
            subscription_window("2-year", today),
            (today, date(2028, 1, 1))
        );
        assert_eq!(
            subscription_window("6-month", today),
            (today, date(2026, 6, 30))
        );
        assert_eq!(
            subscription_window("bogus", today),
            (today, date(2026, 6, 30))
        );
    }

    #[test]
    fn upi_requires_upi_id() {
        let empty = PaymentFields {
            upi_id: Some(String::new()),
            ..PaymentFields::default()
        };
        assert!(validate_method_fields(PaymentMethod::Upi, &empty).is_err());

        let ok = PaymentFields {
            upi_id: Some("abc@bank".into()),
            ..PaymentFields::default()
        };
        assert!(validate_method_fields(PaymentMethod::Upi, &ok).is_ok());
    }

    #[test]
    fn credit_card_requires_all_three_fields() {
        let mut fields = PaymentFields {
            card_number: Some("4111111111111111".into()),
            expiry_date: Some("12/2027".into()),
            cvc: Some("123".into()),
            ..PaymentFields::default()
        };
        assert!(validate_method_fields(PaymentMethod::CreditCard, &fields).is_ok());

        fields.cvc = None;
        assert!(validate_method_fields(PaymentMethod::CreditCard, &fields).is_err());
    }

    #[test]
    fn bank_transfer_requires_account_and_ifsc() {
        let fields = PaymentFields {
            account_number: Some("000111222333".into()),
            ifsc_code: None,
            ..PaymentFields::default()
        };
        assert!(validate_method_fields(PaymentMethod::BankTransfer, &fields).is_err());
    }

    #[test]
    fn unrelated_method_fields_are_dropped() {
        let fields = PaymentFields {
            upi_id: Some("abc@bank".into()),
            card_number: Some("4111111111111111".into()),
            ..PaymentFields::default()
        };
        let kept = fields_for_method(PaymentMethod::Upi, &fields);
        assert_eq!(kept.upi_id.as_deref(), Some("abc@bank"));
        assert!(kept.card_number.is_none());
    }
}
