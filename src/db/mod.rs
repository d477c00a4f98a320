// Persistence layer (SQLite via sqlx).
//
// `assistant_memory` holds kind-tagged JSON blobs (sessions, routines,
// snaps, skill deltas); `throws` holds one row per logged throw and backs
// the aggregate throw-metrics query.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Tag stored in `assistant_memory.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Session,
    Routine,
    Snap,
    Skill,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Session => "session",
            MemoryKind::Routine => "routine",
            MemoryKind::Snap => "snap",
            MemoryKind::Skill => "skill",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct MemoryRow {
    data: String,
}

impl MemoryRow {
    fn into_value(self) -> Value {
        serde_json::from_str(&self.data).unwrap_or_else(|e| {
            tracing::warn!("Stored memory row is not valid JSON: {e}");
            Value::Object(Default::default())
        })
    }
}

/// One logged throw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThrowRecord {
    pub user_id: Option<String>,
    pub concept_id: Option<String>,
    pub coverage: Option<String>,
    pub formation: Option<String>,
    pub target: Option<String>,
    pub time_frac: Option<f64>,
    pub play_id: Option<i64>,
    pub hold_ms: Option<f64>,
    pub throw_area: Option<String>,
    pub area_horiz: Option<String>,
    pub area_band: Option<String>,
    pub depth_yds: Option<f64>,
    pub window_score: Option<f64>,
    pub nearest_sep_yds: Option<f64>,
    pub grade: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub extra: Option<Value>,
}

/// Filters for the throw-metrics aggregate. `None` matches everything.
#[derive(Debug, Clone, Default)]
pub struct ThrowMetricsFilter {
    pub coverage: Option<String>,
    pub concept_id: Option<String>,
    pub area_horiz: Option<String>,
    pub area_band: Option<String>,
    pub user_id: Option<String>,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ThrowMetricRow {
    pub coverage: Option<String>,
    pub concept_id: Option<String>,
    pub area_horiz: Option<String>,
    pub area_band: Option<String>,
    pub n_throws: i64,
    pub avg_window_score: Option<f64>,
    pub avg_nearest_sep_yds: Option<f64>,
    pub avg_hold_ms: Option<f64>,
    pub completion_rate: Option<f64>,
}

/// Grades that count as a completed throw in `completion_rate`.
pub const COMPLETED_GRADES: [&str; 3] = ["Great", "Good", "OK"];

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // An in-memory database exists per connection; keep a single one so
        // every query sees the same tables.
        let max_connections = if database_url.contains(":memory:") {
            1
        } else {
            5
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assistant_memory (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                kind TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_assistant_memory_user_kind ON assistant_memory (user_id, kind, created_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS throws (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT,
                concept_id TEXT,
                coverage TEXT,
                formation TEXT,
                target TEXT,
                time_frac REAL,
                play_id INTEGER,
                hold_ms REAL,
                throw_area TEXT,
                area_horiz TEXT,
                area_band TEXT,
                depth_yds REAL,
                window_score REAL,
                nearest_sep_yds REAL,
                grade TEXT,
                user_agent TEXT,
                referer TEXT,
                extra TEXT,
                created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Memory blobs ──────────────────────────────────────────────────

    pub async fn insert_memory(
        &self,
        user_id: Option<&str>,
        kind: MemoryKind,
        data: &Value,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO assistant_memory (user_id, kind, data) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(kind.as_str())
            .bind(data.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recent blob of `kind` for the user.
    pub async fn latest_memory(
        &self,
        user_id: &str,
        kind: MemoryKind,
    ) -> Result<Option<Value>, sqlx::Error> {
        let row = sqlx::query_as::<_, MemoryRow>(
            "SELECT data FROM assistant_memory WHERE user_id = ? AND kind = ? ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MemoryRow::into_value))
    }

    /// Newest-first blobs of `kind` for the user.
    pub async fn list_memory(
        &self,
        user_id: Option<&str>,
        kind: MemoryKind,
        limit: i64,
    ) -> Result<Vec<Value>, sqlx::Error> {
        let rows = sqlx::query_as::<_, MemoryRow>(
            "SELECT data FROM assistant_memory WHERE user_id = ? AND kind = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(MemoryRow::into_value).collect())
    }

    /// Most recent routine stored under `name`.
    pub async fn latest_routine(
        &self,
        user_id: Option<&str>,
        name: &str,
    ) -> Result<Option<Value>, sqlx::Error> {
        let row = sqlx::query_as::<_, MemoryRow>(
            r#"
            SELECT data FROM assistant_memory
            WHERE user_id = ? AND kind = 'routine' AND json_extract(data, '$.name') = ?
            ORDER BY created_at DESC, id DESC LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(MemoryRow::into_value))
    }

    /// Delete every routine stored under `name`. Returns the number removed.
    pub async fn delete_routines(
        &self,
        user_id: Option<&str>,
        name: &str,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM assistant_memory WHERE user_id = ? AND kind = 'routine' AND json_extract(data, '$.name') = ?",
        )
        .bind(user_id)
        .bind(name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ── Throws ────────────────────────────────────────────────────────

    pub async fn insert_throw(&self, t: &ThrowRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO throws (
                user_id, concept_id, coverage, formation, target, time_frac, play_id,
                hold_ms, throw_area, area_horiz, area_band, depth_yds, window_score,
                nearest_sep_yds, grade, user_agent, referer, extra
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(t.user_id.as_deref())
        .bind(t.concept_id.as_deref())
        .bind(t.coverage.as_deref())
        .bind(t.formation.as_deref())
        .bind(t.target.as_deref())
        .bind(t.time_frac)
        .bind(t.play_id)
        .bind(t.hold_ms)
        .bind(t.throw_area.as_deref())
        .bind(t.area_horiz.as_deref())
        .bind(t.area_band.as_deref())
        .bind(t.depth_yds)
        .bind(t.window_score)
        .bind(t.nearest_sep_yds)
        .bind(t.grade.as_deref())
        .bind(t.user_agent.as_deref())
        .bind(t.referer.as_deref())
        .bind(t.extra.as_ref().map(|v| v.to_string()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Per (coverage, concept, area) aggregates, busiest groups first.
    pub async fn throw_metrics(
        &self,
        filter: &ThrowMetricsFilter,
    ) -> Result<Vec<ThrowMetricRow>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ThrowMetricRow>(
            r#"
            SELECT
                coverage,
                concept_id,
                area_horiz,
                area_band,
                COUNT(*) AS n_throws,
                AVG(window_score) AS avg_window_score,
                AVG(nearest_sep_yds) AS avg_nearest_sep_yds,
                AVG(hold_ms) AS avg_hold_ms,
                AVG(CASE WHEN grade IN (?, ?, ?) THEN 1.0 ELSE 0.0 END) AS completion_rate
            FROM throws
            WHERE (? IS NULL OR coverage = ?)
              AND (? IS NULL OR concept_id = ?)
              AND (? IS NULL OR area_horiz = ?)
              AND (? IS NULL OR area_band = ?)
              AND (? IS NULL OR user_id = ?)
            GROUP BY coverage, concept_id, area_horiz, area_band
            ORDER BY n_throws DESC, coverage, concept_id, area_horiz, area_band
            LIMIT ?
            "#,
        )
        .bind(COMPLETED_GRADES[0])
        .bind(COMPLETED_GRADES[1])
        .bind(COMPLETED_GRADES[2])
        .bind(filter.coverage.as_deref())
        .bind(filter.coverage.as_deref())
        .bind(filter.concept_id.as_deref())
        .bind(filter.concept_id.as_deref())
        .bind(filter.area_horiz.as_deref())
        .bind(filter.area_horiz.as_deref())
        .bind(filter.area_band.as_deref())
        .bind(filter.area_band.as_deref())
        .bind(filter.user_id.as_deref())
        .bind(filter.user_id.as_deref())
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_latest_session_wins() {
        let db = test_db().await;

        db.insert_memory(Some("u1"), MemoryKind::Session, &json!({"step": 1}))
            .await
            .unwrap();
        db.insert_memory(Some("u1"), MemoryKind::Session, &json!({"step": 2}))
            .await
            .unwrap();
        db.insert_memory(Some("u2"), MemoryKind::Session, &json!({"step": 9}))
            .await
            .unwrap();

        let latest = db.latest_memory("u1", MemoryKind::Session).await.unwrap();
        assert_eq!(latest, Some(json!({"step": 2})));

        let missing = db.latest_memory("nobody", MemoryKind::Session).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_kinds_are_separate() {
        let db = test_db().await;

        db.insert_memory(Some("u1"), MemoryKind::Routine, &json!({"name": "R"}))
            .await
            .unwrap();
        assert!(db
            .latest_memory("u1", MemoryKind::Session)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_list_memory_newest_first_with_limit() {
        let db = test_db().await;

        for i in 0..5 {
            db.insert_memory(Some("u1"), MemoryKind::Routine, &json!({"name": format!("R{i}")}))
                .await
                .unwrap();
        }
        let rows = db
            .list_memory(Some("u1"), MemoryKind::Routine, 3)
            .await
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["name"], "R4");
        assert_eq!(rows[2]["name"], "R2");
    }

    #[tokio::test]
    async fn test_routine_lookup_and_delete_by_name() {
        let db = test_db().await;

        db.insert_memory(
            Some("u1"),
            MemoryKind::Routine,
            &json!({"name": "Red zone", "drill": {"coverage": "C2"}}),
        )
        .await
        .unwrap();
        db.insert_memory(
            Some("u1"),
            MemoryKind::Routine,
            &json!({"name": "Red zone", "drill": {"coverage": "C3"}}),
        )
        .await
        .unwrap();
        db.insert_memory(Some("u1"), MemoryKind::Routine, &json!({"name": "Other", "drill": {}}))
            .await
            .unwrap();

        let latest = db.latest_routine(Some("u1"), "Red zone").await.unwrap().unwrap();
        assert_eq!(latest["drill"]["coverage"], "C3");

        assert!(db.latest_routine(Some("u2"), "Red zone").await.unwrap().is_none());

        assert_eq!(db.delete_routines(Some("u1"), "Red zone").await.unwrap(), 2);
        assert!(db.latest_routine(Some("u1"), "Red zone").await.unwrap().is_none());
        assert!(db.latest_routine(Some("u1"), "Other").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_null_user_matches_nothing() {
        let db = test_db().await;

        db.insert_memory(None, MemoryKind::Routine, &json!({"name": "Anon"}))
            .await
            .unwrap();
        assert!(db.latest_routine(None, "Anon").await.unwrap().is_none());
        assert!(db
            .list_memory(None, MemoryKind::Routine, 30)
            .await
            .unwrap()
            .is_empty());
    }

    fn throw(coverage: &str, area: (&str, &str), window: f64, grade: &str) -> ThrowRecord {
        ThrowRecord {
            user_id: Some("u1".into()),
            concept_id: Some("smash".into()),
            coverage: Some(coverage.into()),
            area_horiz: Some(area.0.into()),
            area_band: Some(area.1.into()),
            window_score: Some(window),
            hold_ms: Some(2000.0),
            grade: Some(grade.into()),
            ..ThrowRecord::default()
        }
    }

    #[tokio::test]
    async fn test_throw_metrics_aggregate() {
        let db = test_db().await;

        db.insert_throw(&throw("C2", ("L", "SHORT"), 0.8, "Great")).await.unwrap();
        db.insert_throw(&throw("C2", ("L", "SHORT"), 0.4, "Late")).await.unwrap();
        db.insert_throw(&throw("C3", ("R", "DEEP"), 0.6, "Good")).await.unwrap();

        let all = db
            .throw_metrics(&ThrowMetricsFilter {
                limit: 20,
                ..ThrowMetricsFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].coverage.as_deref(), Some("C2"));
        assert_eq!(all[0].n_throws, 2);
        assert!((all[0].avg_window_score.unwrap() - 0.6).abs() < 1e-9);
        assert!((all[0].completion_rate.unwrap() - 0.5).abs() < 1e-9);

        let c3 = db
            .throw_metrics(&ThrowMetricsFilter {
                coverage: Some("C3".into()),
                limit: 20,
                ..ThrowMetricsFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(c3.len(), 1);
        assert_eq!(c3[0].area_band.as_deref(), Some("DEEP"));

        let limited = db
            .throw_metrics(&ThrowMetricsFilter {
                limit: 1,
                ..ThrowMetricsFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
    }
}
