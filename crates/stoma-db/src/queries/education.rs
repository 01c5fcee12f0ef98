//! Database query functions for the `education_articles` table.

use sqlx::MySqlPool;

use crate::error::StoreError;
use crate::models::EducationArticle;

/// Fields for a new education article.
#[derive(Debug, Clone, Copy)]
pub struct NewArticle<'a> {
    pub category: &'a str,
    pub title: &'a str,
    pub summary: &'a str,
    pub content: &'a str,
}

/// Insert an article and return its assigned id.
pub async fn insert_article(pool: &MySqlPool, new: &NewArticle<'_>) -> Result<i64, StoreError> {
    if new.title.trim().is_empty() || new.category.trim().is_empty() {
        return Err(StoreError::validation(
            "article title and category must not be empty",
        ));
    }

    let result = sqlx::query(
        "INSERT INTO education_articles (category, title, summary, content) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(new.category)
    .bind(new.title)
    .bind(new.summary)
    .bind(new.content)
    .execute(pool)
    .await?;

    Ok(result.last_insert_id() as i64)
}

/// List articles, optionally restricted to one category, newest first.
pub async fn list_articles(
    pool: &MySqlPool,
    category: Option<&str>,
) -> Result<Vec<EducationArticle>, StoreError> {
    let articles = match category {
        Some(category) => {
            sqlx::query_as::<_, EducationArticle>(
                "SELECT * FROM education_articles \
                 WHERE category = ? \
                 ORDER BY created_at DESC, id DESC",
            )
            .bind(category)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, EducationArticle>(
                "SELECT * FROM education_articles ORDER BY created_at DESC, id DESC",
            )
            .fetch_all(pool)
            .await?
        }
    };

    Ok(articles)
}
