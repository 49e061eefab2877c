//! Relational store for policies and their dependent comment/rating rows.

use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use thiserror::Error;
use tracing::{debug, info, warn};
use ypol_core::{NormalizedPolicy, UpsertReport, INQUIRY_COUNT_FIELD, NAME_FIELD, POLICY_FIELDS};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),
    #[error("policy record has no name")]
    MissingName,
    #[error("invalid inquiry count {value:?} for policy {name}")]
    InvalidInquiryCount { name: String, value: String },
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// SQL dialect behind the `Any` pool. Only the surrogate key DDL differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    pub fn from_url(url: &str) -> Result<Self, RepositoryError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            let scheme = url.split(':').next().unwrap_or_default();
            Err(RepositoryError::UnsupportedUrl(format!("{scheme}:...")))
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Self::Postgres => "BIGSERIAL PRIMARY KEY",
            Self::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
        }
    }
}

/// `(id, name)` pair used to re-resolve policies by exact name.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct PolicyRef {
    pub id: i64,
    pub name: String,
}

/// A stored `policies` row read back in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPolicy {
    pub id: i64,
    pub columns: Vec<(&'static str, Option<String>)>,
    pub inquiry_count: Option<i64>,
}

impl StoredPolicy {
    pub fn column(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .and_then(|(_, value)| value.as_deref())
    }

    pub fn name(&self) -> Option<&str> {
        self.column("plcy_nm")
    }
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub policy_id: i64,
    pub author_email: String,
    pub content: String,
    pub parent_id: Option<i64>,
    pub is_review: bool,
}

#[derive(Debug, Clone)]
pub struct PolicyRepository {
    pool: AnyPool,
    dialect: Dialect,
    upsert_sql: String,
}

impl PolicyRepository {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, RepositoryError> {
        sqlx::any::install_default_drivers();
        let dialect = Dialect::from_url(url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(url)
            .await?;
        Ok(Self::from_pool(pool, dialect))
    }

    pub fn from_pool(pool: AnyPool, dialect: Dialect) -> Self {
        Self {
            pool,
            dialect,
            upsert_sql: build_upsert_sql(),
        }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Create the policy, comment and rating tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for statement in schema_statements(self.dialect) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        info!(dialect = ?self.dialect, "schema ready");
        Ok(())
    }

    /// Insert the policy, or overwrite every column of the row with the same name.
    /// Returns the row id.
    pub async fn upsert(&self, policy: &NormalizedPolicy) -> Result<i64, RepositoryError> {
        let name = policy.name().trim();
        if name.is_empty() {
            return Err(RepositoryError::MissingName);
        }

        let mut query = sqlx::query_scalar::<_, i64>(&self.upsert_sql);
        for (field, value) in policy.iter() {
            if field.key == INQUIRY_COUNT_FIELD {
                query = query.bind(parse_count(name, value)?);
            } else if value.is_empty() {
                query = query.bind(None::<String>);
            } else {
                query = query.bind(Some(value.to_string()));
            }
        }

        Ok(query.fetch_one(&self.pool).await?)
    }

    /// Upsert each record independently; a failing record is logged and counted, never fatal.
    pub async fn upsert_all(&self, policies: &[NormalizedPolicy]) -> UpsertReport {
        let mut report = UpsertReport::default();
        for policy in policies {
            report.attempted += 1;
            match self.upsert(policy).await {
                Ok(id) => {
                    report.upserted += 1;
                    debug!(policy = policy.name(), id, "upserted");
                }
                Err(err) => {
                    report.failed += 1;
                    warn!(policy = policy.name(), error = %err, "policy upsert failed");
                }
            }
        }
        report
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<StoredPolicy>, RepositoryError> {
        let columns = POLICY_FIELDS
            .iter()
            .map(|f| f.column)
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("SELECT id, {columns} FROM policies WHERE plcy_nm = $1");
        let Some(row) = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let mut stored = StoredPolicy {
            id: row.try_get("id")?,
            columns: Vec::with_capacity(POLICY_FIELDS.len()),
            inquiry_count: None,
        };
        for field in POLICY_FIELDS {
            if field.key == INQUIRY_COUNT_FIELD {
                stored.inquiry_count = row.try_get(field.column)?;
                stored
                    .columns
                    .push((field.column, stored.inquiry_count.map(|n| n.to_string())));
            } else {
                stored.columns.push((field.column, row.try_get(field.column)?));
            }
        }
        Ok(Some(stored))
    }

    /// Exact-name lookup for a batch of names; unknown names are skipped.
    pub async fn find_by_names(&self, names: &[String]) -> Result<Vec<PolicyRef>, RepositoryError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id, plcy_nm FROM policies WHERE plcy_nm IN ({}) ORDER BY id",
            placeholders(names.len())
        );
        let mut query = sqlx::query(&sql);
        for name in names {
            query = query.bind(name.as_str());
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| {
                Ok(PolicyRef {
                    id: row.try_get("id")?,
                    name: row.try_get("plcy_nm")?,
                })
            })
            .collect()
    }

    pub async fn count_policies(&self) -> Result<i64, RepositoryError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM policies")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn add_comment(&self, comment: &NewComment) -> Result<i64, RepositoryError> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO policy_comments (policy_id, author_email, content, parent_id, is_review)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(comment.policy_id)
        .bind(comment.author_email.as_str())
        .bind(comment.content.as_str())
        .bind(comment.parent_id)
        .bind(i32::from(comment.is_review))
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Set `rater_email`'s score for a policy, replacing any earlier score.
    pub async fn rate(&self, policy_id: i64, rater_email: &str, rating: i32) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO policy_ratings (policy_id, rater_email, rating)
            VALUES ($1, $2, $3)
            ON CONFLICT (policy_id, rater_email)
            DO UPDATE SET rating = excluded.rating, updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(policy_id)
        .bind(rater_email)
        .bind(rating)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn parse_count(name: &str, value: &str) -> Result<Option<i64>, RepositoryError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| RepositoryError::InvalidInquiryCount {
            name: name.to_string(),
            value: value.to_string(),
        })
}

/// `$1, $2, ..., $n`
pub(crate) fn placeholders(n: usize) -> String {
    (1..=n)
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn build_upsert_sql() -> String {
    let columns: Vec<&str> = POLICY_FIELDS.iter().map(|f| f.column).collect();
    let name_column = POLICY_FIELDS
        .iter()
        .find(|f| f.key == NAME_FIELD)
        .map(|f| f.column)
        .unwrap_or("plcy_nm");
    let updates = columns
        .iter()
        .filter(|c| **c != name_column)
        .map(|c| format!("{c} = excluded.{c}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO policies ({}) VALUES ({}) ON CONFLICT ({name_column}) DO UPDATE SET {updates} RETURNING id",
        columns.join(", "),
        placeholders(columns.len()),
    )
}

fn schema_statements(dialect: Dialect) -> Vec<String> {
    let id = dialect.id_column();
    let mut policy_columns = vec![format!("id {id}")];
    for field in POLICY_FIELDS {
        let ddl = match field.key {
            NAME_FIELD => format!("{} TEXT NOT NULL UNIQUE", field.column),
            INQUIRY_COUNT_FIELD => format!("{} BIGINT", field.column),
            _ => format!("{} TEXT", field.column),
        };
        policy_columns.push(ddl);
    }

    vec![
        format!(
            "CREATE TABLE IF NOT EXISTS policies ({})",
            policy_columns.join(", ")
        ),
        "CREATE INDEX IF NOT EXISTS idx_policies_aply_prd_se_cd ON policies (aply_prd_se_cd)"
            .to_string(),
        format!(
            r#"CREATE TABLE IF NOT EXISTS policy_comments (
                id {id},
                policy_id BIGINT NOT NULL REFERENCES policies (id) ON DELETE CASCADE,
                author_email TEXT,
                content TEXT,
                parent_id BIGINT,
                is_review INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )"#
        ),
        "CREATE INDEX IF NOT EXISTS idx_policy_comments_policy_id ON policy_comments (policy_id)"
            .to_string(),
        format!(
            r#"CREATE TABLE IF NOT EXISTS policy_ratings (
                id {id},
                policy_id BIGINT NOT NULL REFERENCES policies (id) ON DELETE CASCADE,
                rater_email TEXT NOT NULL,
                rating INTEGER NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (policy_id, rater_email)
            )"#
        ),
    ]
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ypol_core::{normalize, CodeDictionary, GeoTable, RawPolicyRecord};

    pub(crate) async fn memory_repository() -> PolicyRepository {
        let repo = PolicyRepository::connect("sqlite::memory:", 1)
            .await
            .expect("sqlite pool");
        repo.ensure_schema().await.expect("schema");
        repo
    }

    pub(crate) fn policy(pairs: &[(&str, &str)]) -> NormalizedPolicy {
        let dictionary = CodeDictionary::new(GeoTable::default());
        normalize(&RawPolicyRecord::from_pairs(pairs.iter().copied()), &dictionary)
    }

    #[test]
    fn upsert_sql_updates_every_column_but_the_key() {
        let sql = build_upsert_sql();
        assert!(sql.contains("ON CONFLICT (plcy_nm) DO UPDATE SET"));
        assert!(sql.contains("inq_cnt = excluded.inq_cnt"));
        assert!(!sql.contains("plcy_nm = excluded.plcy_nm"));
        assert!(sql.contains(&format!("${}", POLICY_FIELDS.len())));
    }

    #[test]
    fn dialect_follows_url_scheme() {
        assert_eq!(Dialect::from_url("postgres://u:p@h/db").unwrap(), Dialect::Postgres);
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert!(matches!(
            Dialect::from_url("mysql://u:p@h/db"),
            Err(RepositoryError::UnsupportedUrl(_))
        ));
    }

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let repo = memory_repository().await;
        repo.ensure_schema().await.expect("second run");
        assert_eq!(repo.count_policies().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_twice_keeps_one_row_with_latest_values() {
        let repo = memory_repository().await;
        let first = policy(&[
            ("plcyNm", "청년 전세 대출"),
            ("aplyPrdSeCd", "0057002"),
            ("plcySprtCn", "최대 1억원"),
            ("inqCnt", "10"),
        ]);
        let second = policy(&[
            ("plcyNm", "청년 전세 대출"),
            ("aplyPrdSeCd", "0057001"),
            ("aplyYmd", "20240101 ~ 20241231"),
            ("inqCnt", "11"),
        ]);

        let first_id = repo.upsert(&first).await.expect("first upsert");
        let second_id = repo.upsert(&second).await.expect("second upsert");

        assert_eq!(first_id, second_id);
        assert_eq!(repo.count_policies().await.unwrap(), 1);
        let stored = repo
            .find_by_name("청년 전세 대출")
            .await
            .unwrap()
            .expect("stored row");
        assert_eq!(stored.column("aply_prd_se_cd"), Some("특정기간"));
        assert_eq!(stored.column("aply_ymd"), Some("20240101 ~ 20241231"));
        assert_eq!(stored.column("plcy_sprt_cn"), None);
        assert_eq!(stored.inquiry_count, Some(11));
    }

    #[tokio::test]
    async fn failing_records_do_not_abort_the_batch() {
        let repo = memory_repository().await;
        let batch = vec![
            policy(&[("plcyNm", "정책 A")]),
            policy(&[("plcyNm", "")]),
            policy(&[("plcyNm", "정책 B"), ("inqCnt", "many")]),
            policy(&[("plcyNm", "정책 C"), ("inqCnt", "3")]),
        ];

        let report = repo.upsert_all(&batch).await;

        assert_eq!(
            report,
            UpsertReport {
                attempted: 4,
                upserted: 2,
                failed: 2
            }
        );
        assert_eq!(repo.count_policies().await.unwrap(), 2);
        assert!(repo.find_by_name("정책 B").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_names_matches_exact_names_only() {
        let repo = memory_repository().await;
        let a = repo.upsert(&policy(&[("plcyNm", "청년 마음건강 지원")])).await.unwrap();
        repo.upsert(&policy(&[("plcyNm", "청년 마음건강")])).await.unwrap();

        let found = repo
            .find_by_names(&["청년 마음건강 지원".to_string(), "없는 정책".to_string()])
            .await
            .unwrap();
        assert_eq!(
            found,
            vec![PolicyRef {
                id: a,
                name: "청년 마음건강 지원".to_string()
            }]
        );
        assert!(repo.find_by_names(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ratings_are_unique_per_rater() {
        let repo = memory_repository().await;
        let id = repo.upsert(&policy(&[("plcyNm", "청년 창업 지원")])).await.unwrap();
        repo.rate(id, "a@example.com", 3).await.unwrap();
        repo.rate(id, "a@example.com", 5).await.unwrap();
        repo.rate(id, "b@example.com", 4).await.unwrap();

        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT rater_email, rating FROM policy_ratings ORDER BY rater_email",
        )
        .fetch_all(repo.pool())
        .await
        .unwrap();
        assert_eq!(
            rows,
            vec![("a@example.com".to_string(), 5), ("b@example.com".to_string(), 4)]
        );
    }
}
