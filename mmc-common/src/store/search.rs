//! Track search
//!
//! Two filters: a free-text substring matched against every tag value and the
//! track url, or a conjunction of exact (predicate, value) pairs. Results are
//! ordered by track id and paginated.

use super::Store;
use crate::db::models::Track;
use crate::pagination::{calculate_pagination, PageRequest, Pagination};
use crate::Result;
use sqlx::sqlite::SqliteArguments;
use sqlx::query::QueryScalar;
use sqlx::Sqlite;

/// Which tracks a search or bulk update applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackFilter {
    /// Substring of any tag value or the url; empty matches everything
    Query(String),
    /// Every pair must appear as a tag
    Predicates(Vec<(String, String)>),
}

/// One page of search results
#[derive(Debug, Clone)]
pub struct TrackPage {
    pub tracks: Vec<Track>,
    pub total: i64,
    pub pagination: Pagination,
}

/// Escape LIKE wildcards so the query matches literally
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

impl TrackFilter {
    /// WHERE clause over `track t`
    fn where_clause(&self) -> String {
        match self {
            TrackFilter::Query(q) if q.is_empty() => "1 = 1".to_string(),
            TrackFilter::Query(_) => r#"(t.url LIKE ? ESCAPE '\'
                OR EXISTS (SELECT 1 FROM tag g WHERE g.trackid = t.id AND g.value LIKE ? ESCAPE '\'))"#
                .to_string(),
            TrackFilter::Predicates(pairs) if pairs.is_empty() => "1 = 1".to_string(),
            TrackFilter::Predicates(pairs) => pairs
                .iter()
                .map(|_| {
                    "EXISTS (SELECT 1 FROM tag g WHERE g.trackid = t.id AND g.predicateid = ? AND g.value = ?)"
                })
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    fn bind<'q, O>(
        &'q self,
        mut query: QueryScalar<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryScalar<'q, Sqlite, O, SqliteArguments<'q>> {
        match self {
            TrackFilter::Query(q) if q.is_empty() => {}
            TrackFilter::Query(q) => {
                let pattern = like_pattern(q);
                query = query.bind(pattern.clone()).bind(pattern);
            }
            TrackFilter::Predicates(pairs) => {
                for (predicate, value) in pairs {
                    query = query.bind(predicate.as_str()).bind(value.as_str());
                }
            }
        }
        query
    }
}

impl Store {
    /// Ids of one page of matches, the total match count and the page metadata
    pub(crate) async fn matching_ids(
        &self,
        filter: &TrackFilter,
        page: PageRequest,
    ) -> Result<(Vec<i64>, i64, Pagination)> {
        let mut conn = self.read_conn().await?;
        let where_clause = filter.where_clause();

        let count_sql = format!("SELECT COUNT(*) FROM track t WHERE {}", where_clause);
        let total: i64 = filter
            .bind(sqlx::query_scalar(&count_sql))
            .fetch_one(&mut *conn)
            .await?;

        let ids: Vec<i64> = match page.limit_offset() {
            Some((limit, offset)) => {
                let sql = format!(
                    "SELECT t.id FROM track t WHERE {} ORDER BY t.id LIMIT ? OFFSET ?",
                    where_clause
                );
                filter
                    .bind(sqlx::query_scalar(&sql))
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(&mut *conn)
                    .await?
            }
            None => {
                let sql = format!("SELECT t.id FROM track t WHERE {} ORDER BY t.id", where_clause);
                filter
                    .bind(sqlx::query_scalar(&sql))
                    .fetch_all(&mut *conn)
                    .await?
            }
        };

        Ok((ids, total, calculate_pagination(total, page)))
    }

    pub async fn search(&self, filter: &TrackFilter, page: PageRequest) -> Result<TrackPage> {
        let (ids, total, pagination) = self.matching_ids(filter, page).await?;
        let tracks = self.load_tracks(&ids).await?;
        Ok(TrackPage {
            tracks,
            total,
            pagination,
        })
    }

    /// Tracks where any tag value or the url contains `query`
    pub async fn search_by_query(&self, query: &str, page: PageRequest) -> Result<TrackPage> {
        self.search(&TrackFilter::Query(query.to_string()), page)
            .await
    }

    /// Tracks carrying every given (predicate, value) tag
    pub async fn search_by_predicates(
        &self,
        pairs: Vec<(String, String)>,
        page: PageRequest,
    ) -> Result<TrackPage> {
        self.search(&TrackFilter::Predicates(pairs), page).await
    }
}
