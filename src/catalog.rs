//! Catalog store: book and author records, copy-inventory bookkeeping.
//!
//! Invariant maintained by every mutation here: a book is `Unavailable`
//! exactly when it has zero copies, and `copies` never goes negative.

use std::str::FromStr;

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    errors::{AppError, AppResult},
    models::{Author, AuthorName, Book, BookStatus, Genre},
};

pub const RENT_PRICES: [i32; 3] = [100, 200, 300];

/// Books currently rentable.
///
/// # Errors
/// Returns database errors.
pub async fn list_available(db: &PgPool) -> AppResult<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>(
        "SELECT id, book_id, name, author_id, genre, rent_price, status, copies, rental_days, cover_image, pdf, created_at
         FROM books WHERE status = 'Available' ORDER BY name",
    )
    .fetch_all(db)
    .await?;
    Ok(books)
}

/// The full catalog, for the admin view.
///
/// # Errors
/// Returns database errors.
pub async fn list_all(db: &PgPool) -> AppResult<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>(
        "SELECT id, book_id, name, author_id, genre, rent_price, status, copies, rental_days, cover_image, pdf, created_at
         FROM books ORDER BY name",
    )
    .fetch_all(db)
    .await?;
    Ok(books)
}

/// Look up a single book.
///
/// # Errors
/// Returns `NotFound` when no such book exists, or database errors.
pub async fn find_by_id(db: &PgPool, id: Uuid) -> AppResult<Book> {
    sqlx::query_as::<_, Book>(
        "SELECT id, book_id, name, author_id, genre, rent_price, status, copies, rental_days, cover_image, pdf, created_at
         FROM books WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::NotFound)
}

/// Books of one genre. An empty result is reported as `NotFound`, matching
/// the catalog page policy of treating an empty genre shelf as a missing
/// resource.
///
/// # Errors
/// Returns `NotFound` when the genre has no books, or database errors.
pub async fn filter_by_genre(db: &PgPool, genre: Genre) -> AppResult<Vec<Book>> {
    let books = sqlx::query_as::<_, Book>(
        "SELECT id, book_id, name, author_id, genre, rent_price, status, copies, rental_days, cover_image, pdf, created_at
         FROM books WHERE genre = $1 ORDER BY name",
    )
    .bind(genre)
    .fetch_all(db)
    .await?;

    if books.is_empty() {
        return Err(AppError::NotFound);
    }
    Ok(books)
}

/// Claim one copy of a book for a rental.
///
/// The availability guard, the decrement, and the status flip are a single
/// conditional UPDATE, so two renters racing for the last copy cannot both
/// succeed and `copies` cannot go negative.
///
/// # Errors
/// Returns `BookUnavailable` when no rentable copy was claimed, or database
/// errors.
pub async fn apply_rental(db: &PgPool, book_id: Uuid) -> AppResult<Book> {
    sqlx::query_as::<_, Book>(
        "UPDATE books
         SET copies = copies - 1,
             status = CASE WHEN copies - 1 = 0 THEN 'Unavailable' ELSE status END
         WHERE id = $1 AND status = 'Available' AND copies > 0
         RETURNING id, book_id, name, author_id, genre, rent_price, status, copies, rental_days, cover_image, pdf, created_at",
    )
    .bind(book_id)
    .fetch_optional(db)
    .await?
    .ok_or(AppError::BookUnavailable)
}

/// A validated single-field update to a book. Each permitted field has its
/// own parser; anything else is rejected up front. `status` is deliberately
/// not patchable: it is derived from `copies`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookPatch {
    DisplayCode(String),
    Name(String),
    Author(Uuid),
    Genre(Genre),
    RentPrice(i32),
    Copies(i32),
    RentalDays(i32),
}

impl BookPatch {
    /// Parse an admin edit-form submission into a patch.
    ///
    /// # Errors
    /// Returns `AppError::Validation` for unknown fields or malformed values.
    pub fn parse(field: &str, value: &str) -> AppResult<Self> {
        match field {
            "book_id" => {
                if value.is_empty() {
                    return Err(AppError::Validation("book_id must not be empty".into()));
                }
                Ok(BookPatch::DisplayCode(value.to_string()))
            }
            "name" => {
                if value.is_empty() {
                    return Err(AppError::Validation("name must not be empty".into()));
                }
                Ok(BookPatch::Name(value.to_string()))
            }
            "author_id" => {
                let id = Uuid::parse_str(value)
                    .map_err(|_| AppError::Validation("author_id must be a UUID".into()))?;
                Ok(BookPatch::Author(id))
            }
            "genre" => {
                let genre = Genre::from_str(value).map_err(AppError::Validation)?;
                Ok(BookPatch::Genre(genre))
            }
            "rent_price" => {
                let price: i32 = value
                    .parse()
                    .map_err(|_| AppError::Validation("rent_price must be a number".into()))?;
                if !RENT_PRICES.contains(&price) {
                    return Err(AppError::Validation(
                        "rent_price must be one of 100, 200, 300".into(),
                    ));
                }
                Ok(BookPatch::RentPrice(price))
            }
            "copies" => {
                let copies: i32 = value
                    .parse()
                    .map_err(|_| AppError::Validation("copies must be a number".into()))?;
                if copies < 0 {
                    return Err(AppError::Validation("copies must not be negative".into()));
                }
                Ok(BookPatch::Copies(copies))
            }
            "rental_days" => {
                let days: i32 = value
                    .parse()
                    .map_err(|_| AppError::Validation("rental_days must be a number".into()))?;
                if days <= 0 {
                    return Err(AppError::Validation("rental_days must be positive".into()));
                }
                Ok(BookPatch::RentalDays(days))
            }
            other => Err(AppError::Validation(format!(
                "field '{other}' cannot be edited"
            ))),
        }
    }
}

/// Apply a parsed patch. Patching `copies` re-derives `status` in the same
/// statement so the availability invariant holds.
///
/// # Errors
/// Returns `NotFound` when the book does not exist, or database errors.
pub async fn apply_patch(db: &PgPool, id: Uuid, patch: BookPatch) -> AppResult<Book> {
    let sql = match &patch {
        BookPatch::DisplayCode(_) => "UPDATE books SET book_id = $2 WHERE id = $1",
        BookPatch::Name(_) => "UPDATE books SET name = $2 WHERE id = $1",
        BookPatch::Author(_) => "UPDATE books SET author_id = $2 WHERE id = $1",
        BookPatch::Genre(_) => "UPDATE books SET genre = $2 WHERE id = $1",
        BookPatch::RentPrice(_) => "UPDATE books SET rent_price = $2 WHERE id = $1",
        BookPatch::Copies(_) => {
            "UPDATE books
             SET copies = $2,
                 status = CASE WHEN $2 = 0 THEN 'Unavailable' ELSE 'Available' END
             WHERE id = $1"
        }
        BookPatch::RentalDays(_) => "UPDATE books SET rental_days = $2 WHERE id = $1",
    };
    let sql = format!(
        "{sql} RETURNING id, book_id, name, author_id, genre, rent_price, status, copies, rental_days, cover_image, pdf, created_at"
    );

    let query = sqlx::query_as::<_, Book>(&sql).bind(id);
    let query = match patch {
        BookPatch::DisplayCode(v) | BookPatch::Name(v) => query.bind(v),
        BookPatch::Author(v) => query.bind(v),
        BookPatch::Genre(v) => query.bind(v),
        BookPatch::RentPrice(v) | BookPatch::Copies(v) | BookPatch::RentalDays(v) => query.bind(v),
    };

    query.fetch_optional(db).await?.ok_or(AppError::NotFound)
}

#[derive(Debug, Clone)]
pub struct NewBook {
    pub book_id: String,
    pub name: String,
    pub author_id: Uuid,
    pub genre: Genre,
    pub rent_price: i32,
    pub copies: i32,
    pub rental_days: i32,
    pub cover_image: Option<String>,
    pub pdf: Option<String>,
}

impl NewBook {
    /// Status is derived, never stored independently of `copies`.
    #[must_use]
    pub fn status(&self) -> BookStatus {
        if self.copies == 0 {
            BookStatus::Unavailable
        } else {
            BookStatus::Available
        }
    }

    /// # Errors
    /// Returns `AppError::Validation` when a field is out of range.
    pub fn validate(&self) -> AppResult<()> {
        if self.book_id.is_empty() || self.name.is_empty() {
            return Err(AppError::Validation(
                "book_id and name must not be empty".into(),
            ));
        }
        if !RENT_PRICES.contains(&self.rent_price) {
            return Err(AppError::Validation(
                "rent_price must be one of 100, 200, 300".into(),
            ));
        }
        if self.copies < 0 {
            return Err(AppError::Validation("copies must not be negative".into()));
        }
        if self.rental_days <= 0 {
            return Err(AppError::Validation("rental_days must be positive".into()));
        }
        Ok(())
    }
}

/// Add a book to the catalog.
///
/// # Errors
/// Returns validation errors, `NotFound` for a missing author, or database
/// errors.
pub async fn create(db: &PgPool, new: &NewBook) -> AppResult<Book> {
    new.validate()?;

    let author_exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM authors WHERE id = $1)")
            .bind(new.author_id)
            .fetch_one(db)
            .await?;
    if !author_exists {
        return Err(AppError::NotFound);
    }

    let book = sqlx::query_as::<_, Book>(
        "INSERT INTO books (id, book_id, name, author_id, genre, rent_price, status, copies, rental_days, cover_image, pdf)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING id, book_id, name, author_id, genre, rent_price, status, copies, rental_days, cover_image, pdf, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(&new.book_id)
    .bind(&new.name)
    .bind(new.author_id)
    .bind(new.genre)
    .bind(new.rent_price)
    .bind(new.status())
    .bind(new.copies)
    .bind(new.rental_days)
    .bind(&new.cover_image)
    .bind(&new.pdf)
    .fetch_one(db)
    .await?;

    Ok(book)
}

/// Remove a book from the catalog.
///
/// # Errors
/// Returns `NotFound` when the book does not exist, or database errors.
pub async fn delete(db: &PgPool, id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM books WHERE id = $1")
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }
    Ok(())
}

/// Case-insensitive author-name search backing the admin autocomplete.
///
/// # Errors
/// Returns database errors.
pub async fn search_authors(db: &PgPool, query: &str) -> AppResult<Vec<AuthorName>> {
    let names: Vec<String> =
        sqlx::query_scalar("SELECT name FROM authors WHERE name ILIKE $1 ORDER BY name")
            .bind(format!("%{query}%"))
            .fetch_all(db)
            .await?;
    Ok(names.into_iter().map(|name| AuthorName { name }).collect())
}

/// All authors, for resolving display names on catalog listings.
///
/// # Errors
/// Returns database errors.
pub async fn list_authors(db: &PgPool) -> AppResult<Vec<Author>> {
    let authors = sqlx::query_as::<_, Author>("SELECT id, name FROM authors ORDER BY name")
        .fetch_all(db)
        .await?;
    Ok(authors)
}

/// Register an author.
///
/// # Errors
/// Returns database errors.
pub async fn create_author(db: &PgPool, name: &str) -> AppResult<Author> {
    let author = sqlx::query_as::<_, Author>(
        "INSERT INTO authors (id, name) VALUES ($1, $2) RETURNING id, name",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .fetch_one(db)
    .await?;
    Ok(author)
}

/// Resolve an author's display name.
///
/// # Errors
/// Returns `NotFound` when the author does not exist, or database errors.
pub async fn author_name(db: &PgPool, author_id: Uuid) -> AppResult<String> {
    sqlx::query_scalar("SELECT name FROM authors WHERE id = $1")
        .bind(author_id)
        .fetch_optional(db)
        .await?
        .ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_parses_permitted_fields() {
        assert_eq!(
            BookPatch::parse("name", "Dune").unwrap(),
            BookPatch::Name("Dune".into())
        );
        assert_eq!(
            BookPatch::parse("genre", "Horror").unwrap(),
            BookPatch::Genre(Genre::Horror)
        );
        assert_eq!(
            BookPatch::parse("rent_price", "200").unwrap(),
            BookPatch::RentPrice(200)
        );
        assert_eq!(
            BookPatch::parse("copies", "0").unwrap(),
            BookPatch::Copies(0)
        );
    }

    #[test]
    fn patch_rejects_unknown_field() {
        assert!(matches!(
            BookPatch::parse("status", "Available"),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            BookPatch::parse("password_hash", "x"),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn patch_rejects_out_of_range_values() {
        assert!(BookPatch::parse("rent_price", "150").is_err());
        assert!(BookPatch::parse("copies", "-1").is_err());
        assert!(BookPatch::parse("rental_days", "0").is_err());
        assert!(BookPatch::parse("genre", "Poetry").is_err());
    }

    #[test]
    fn new_book_status_follows_copies() {
        let mut book = NewBook {
            book_id: "BK001".into(),
            name: "Dune".into(),
            author_id: Uuid::new_v4(),
            genre: Genre::Research,
            rent_price: 100,
            copies: 3,
            rental_days: 7,
            cover_image: None,
            pdf: None,
        };
        assert_eq!(book.status(), BookStatus::Available);
        book.copies = 0;
        assert_eq!(book.status(), BookStatus::Unavailable);
    }

    #[test]
    fn new_book_rejects_unlisted_rent_price() {
        let book = NewBook {
            book_id: "BK001".into(),
            name: "Dune".into(),
            author_id: Uuid::new_v4(),
            genre: Genre::Research,
            rent_price: 150,
            copies: 1,
            rental_days: 7,
            cover_image: None,
            pdf: None,
        };
        assert!(book.validate().is_err());
    }
}
