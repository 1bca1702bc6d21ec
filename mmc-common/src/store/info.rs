//! Consistency probes and metrics for `/_info`
//!
//! The weighting checks compare `MAX(cum_weighting)` against `SUM(weighting)`
//! for the global set and for every collection. Both are O(1)-ish aggregate
//! queries; [`Store::check_index_consistency`] is the exhaustive version.

use super::{approx_eq, Store};
use crate::Result;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::warn;

/// One pass/fail probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Check {
    pub ok: bool,
    #[serde(rename = "techDetail")]
    pub tech_detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<String>,
}

/// One reported number
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metric {
    pub value: serde_json::Value,
    #[serde(rename = "techDetail")]
    pub tech_detail: String,
}

/// Health and metrics report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub checks: BTreeMap<String, Check>,
    pub metrics: BTreeMap<String, Metric>,
}

impl InfoReport {
    /// True when every check passed
    pub fn healthy(&self) -> bool {
        self.checks.values().all(|c| c.ok)
    }
}

fn check(ok: bool, tech_detail: &str, debug: Option<String>) -> Check {
    Check {
        ok,
        tech_detail: tech_detail.to_string(),
        debug,
    }
}

fn metric(value: serde_json::Value, tech_detail: &str) -> Metric {
    Metric {
        value,
        tech_detail: tech_detail.to_string(),
    }
}

impl Store {
    /// Build the `/_info` report
    ///
    /// Database failures surface as failed checks, never as an error.
    pub async fn info(&self, system: Option<&str>) -> InfoReport {
        let mut checks = BTreeMap::new();
        let mut metrics = BTreeMap::new();

        let db_ok = self.probe_db().await;
        checks.insert(
            "db".to_string(),
            check(
                db_ok.is_ok(),
                "Runs a trivial SELECT against the database",
                db_ok.err().map(|e| e.to_string()),
            ),
        );

        match self.global_weighting().await {
            Ok((max, sum, count)) => {
                let ok = approx_eq(max, sum);
                if !ok {
                    warn!("Global weighting drift: max {} sum {}", max, sum);
                }
                checks.insert(
                    "weighting".to_string(),
                    check(
                        ok,
                        "Checks MAX(cum_weighting) equals SUM(weighting) across all tracks",
                        (!ok).then(|| format!("max {} sum {}", max, sum)),
                    ),
                );
                metrics.insert(
                    "track-count".to_string(),
                    metric(json!(count), "Number of tracks in the catalog"),
                );
                metrics.insert(
                    "weighting-drift".to_string(),
                    metric(
                        json!(max - sum),
                        "MAX(cum_weighting) minus SUM(weighting); expected 0",
                    ),
                );
            }
            Err(e) => {
                checks.insert(
                    "weighting".to_string(),
                    check(
                        false,
                        "Checks MAX(cum_weighting) equals SUM(weighting) across all tracks",
                        Some(e.to_string()),
                    ),
                );
            }
        }

        match self.collection_weightings().await {
            Ok(per_collection) => {
                let drifting: Vec<&str> = per_collection
                    .iter()
                    .filter(|(_, max, sum)| !approx_eq(*max, *sum))
                    .map(|(slug, _, _)| slug.as_str())
                    .collect();
                if !drifting.is_empty() {
                    warn!("Collection weighting drift in {:?}", drifting);
                }
                checks.insert(
                    "collections-weighting".to_string(),
                    check(
                        drifting.is_empty(),
                        "Checks each collection's MAX(cum_weighting) equals the SUM of its members' weightings",
                        (!drifting.is_empty()).then(|| drifting.join(", ")),
                    ),
                );
                metrics.insert(
                    "collections-weighting-drift".to_string(),
                    metric(
                        json!(drifting.len()),
                        "Number of collections whose cumulative weighting drifts from the sum",
                    ),
                );
                metrics.insert(
                    "collection-count".to_string(),
                    metric(json!(per_collection.len()), "Number of collections"),
                );
            }
            Err(e) => {
                checks.insert(
                    "collections-weighting".to_string(),
                    check(
                        false,
                        "Checks each collection's MAX(cum_weighting) equals the SUM of its members' weightings",
                        Some(e.to_string()),
                    ),
                );
            }
        }

        InfoReport {
            system: system.map(str::to_string),
            checks,
            metrics,
        }
    }

    async fn probe_db(&self) -> Result<()> {
        let mut conn = self.read_conn().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }

    async fn global_weighting(&self) -> Result<(f64, f64, i64)> {
        let mut conn = self.read_conn().await?;
        let row = sqlx::query_as(
            "SELECT COALESCE(MAX(cum_weighting), 0.0), COALESCE(SUM(weighting), 0.0), COUNT(*) FROM track",
        )
        .fetch_one(&mut *conn)
        .await?;
        Ok(row)
    }

    /// (slug, MAX(cum_weighting), SUM(member weighting)) for every collection
    async fn collection_weightings(&self) -> Result<Vec<(String, f64, f64)>> {
        let mut conn = self.read_conn().await?;
        let rows = sqlx::query_as(
            r#"
            SELECT c.slug,
                   COALESCE(MAX(ct.cum_weighting), 0.0),
                   COALESCE(SUM(t.weighting), 0.0)
            FROM collection c
            LEFT JOIN collection_track ct ON ct.collectionslug = c.slug
            LEFT JOIN track t ON t.id = ct.trackid
            GROUP BY c.slug
            ORDER BY c.slug
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;
        Ok(rows)
    }

    /// Full walk of every weighting index
    ///
    /// Returns one message per violation: zero/non-zero mismatches between
    /// weighting and cum_weighting, repeated cum_weighting values, and gaps
    /// between consecutive prefix sums that differ from the weighting.
    pub async fn check_index_consistency(&self) -> Result<Vec<String>> {
        let mut conn = self.read_conn().await?;
        let mut problems = Vec::new();

        let global: Vec<(i64, f64, f64)> = sqlx::query_as(
            "SELECT id, weighting, cum_weighting FROM track ORDER BY cum_weighting, id",
        )
        .fetch_all(&mut *conn)
        .await?;
        walk_prefix_sums("global", &global, &mut problems);

        let slugs: Vec<String> = sqlx::query_scalar("SELECT slug FROM collection ORDER BY slug")
            .fetch_all(&mut *conn)
            .await?;
        for slug in slugs {
            let members: Vec<(i64, f64, f64)> = sqlx::query_as(
                r#"
                SELECT t.id, t.weighting, ct.cum_weighting
                FROM collection_track ct JOIN track t ON t.id = ct.trackid
                WHERE ct.collectionslug = ?
                ORDER BY ct.cum_weighting, t.id
                "#,
            )
            .bind(&slug)
            .fetch_all(&mut *conn)
            .await?;
            walk_prefix_sums(&format!("collection {}", slug), &members, &mut problems);
        }

        Ok(problems)
    }
}

/// Check one weighted set, given (id, weighting, cum_weighting) sorted by cum_weighting
fn walk_prefix_sums(scope: &str, rows: &[(i64, f64, f64)], problems: &mut Vec<String>) {
    let mut previous = 0.0;
    for (id, weighting, cum) in rows {
        if *weighting < 0.0 || *cum < 0.0 {
            problems.push(format!("{}: track {} has a negative weighting", scope, id));
        }
        if (*weighting == 0.0) != (*cum == 0.0) {
            problems.push(format!(
                "{}: track {} has weighting {} but cum_weighting {}",
                scope, id, weighting, cum
            ));
            continue;
        }
        if *cum == 0.0 {
            continue;
        }
        if !approx_eq(*cum - previous, *weighting) {
            problems.push(format!(
                "{}: track {} cum_weighting {} does not follow {} by {}",
                scope, id, cum, previous, weighting
            ));
        }
        previous = *cum;
    }
}
