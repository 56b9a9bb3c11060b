//! Rental engine: orchestrates renting a book end to end.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    catalog,
    errors::{AppError, AppResult},
    membership,
    models::{BookStatus, OverdueRental, Rental, User},
};

/// The period a rental covers: start and end date for a book whose loan
/// length is `rental_days`.
#[must_use]
pub fn rental_period(start: NaiveDate, rental_days: i32) -> (NaiveDate, NaiveDate) {
    (start, start + Duration::days(i64::from(rental_days)))
}

/// Rent one copy of a book for `user`.
///
/// 1. the user must have an active membership;
/// 2. the book must exist;
/// 3. the book must look rentable (status/copies pre-check);
/// 4. a copy is claimed atomically (the pre-check is advisory; the claim in
///    [`catalog::apply_rental`] is what decides races);
/// 5. a rental record is written with the requester's name and email and the
///    end date computed from the book's loan length.
///
/// # Errors
/// Returns `MembershipRequired`, `NotFound`, `BookUnavailable`, or database
/// errors.
pub async fn rent_book(
    db: &PgPool,
    user: &User,
    book_id: Uuid,
    now: DateTime<Utc>,
    lookback_days: i64,
) -> AppResult<(Rental, String)> {
    if !membership::has_active_membership(db, user.id, now, lookback_days).await? {
        return Err(AppError::MembershipRequired);
    }

    let book = catalog::find_by_id(db, book_id).await?;
    if book.status != BookStatus::Available || book.copies <= 0 {
        return Err(AppError::BookUnavailable);
    }

    let book = catalog::apply_rental(db, book.id).await?;

    let (start, end) = rental_period(now.date_naive(), book.rental_days);
    let rental = sqlx::query_as::<_, Rental>(
        "INSERT INTO rentals (id, user_id, book_id, first_name, last_name, email, rental_start_date, rental_end_date)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id, user_id, book_id, first_name, last_name, email, rental_start_date, rental_end_date",
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(book.id)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(start)
    .bind(end)
    .fetch_one(db)
    .await?;

    Ok((rental, book.name))
}

/// Rentals belonging to one user, newest first.
///
/// # Errors
/// Returns database errors.
pub async fn rentals_for_user(db: &PgPool, user_id: Uuid) -> AppResult<Vec<Rental>> {
    let rentals = sqlx::query_as::<_, Rental>(
        "SELECT id, user_id, book_id, first_name, last_name, email, rental_start_date, rental_end_date
         FROM rentals WHERE user_id = $1 ORDER BY rental_start_date DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rentals)
}

/// Every rental on record, newest first.
///
/// # Errors
/// Returns database errors.
pub async fn all_rentals(db: &PgPool) -> AppResult<Vec<Rental>> {
    let rentals = sqlx::query_as::<_, Rental>(
        "SELECT id, user_id, book_id, first_name, last_name, email, rental_start_date, rental_end_date
         FROM rentals ORDER BY rental_start_date DESC",
    )
    .fetch_all(db)
    .await?;
    Ok(rentals)
}

/// Rentals whose end date has passed as of `as_of`, each annotated with how
/// many days overdue it is. Pure; no return flow exists, so nothing is
/// mutated.
#[must_use]
pub fn compute_overdue(rentals: &[Rental], as_of: NaiveDate) -> Vec<OverdueRental> {
    rentals
        .iter()
        .filter(|r| r.rental_end_date < as_of)
        .map(|r| OverdueRental {
            rental: r.clone(),
            overdue_days: (as_of - r.rental_end_date).num_days(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rental_ending(end: NaiveDate) -> Rental {
        Rental {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            book_id: Uuid::new_v4(),
            first_name: "Asha".into(),
            last_name: "Rao".into(),
            email: "asha@example.com".into(),
            rental_start_date: end - Duration::days(7),
            rental_end_date: end,
        }
    }

    #[test]
    fn rental_period_uses_book_loan_length() {
        let (start, end) = rental_period(date(2026, 3, 1), 7);
        assert_eq!(start, date(2026, 3, 1));
        assert_eq!(end, date(2026, 3, 8));
    }

    #[test]
    fn overdue_days_counted_from_end_date() {
        let as_of = date(2026, 5, 10);
        let rentals = vec![rental_ending(date(2026, 5, 7))];
        let overdue = compute_overdue(&rentals, as_of);
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].overdue_days, 3);
    }

    #[test]
    fn future_and_same_day_rentals_are_not_overdue() {
        let as_of = date(2026, 5, 10);
        let rentals = vec![
            rental_ending(date(2026, 5, 10)),
            rental_ending(date(2026, 5, 11)),
        ];
        assert!(compute_overdue(&rentals, as_of).is_empty());
    }
}
