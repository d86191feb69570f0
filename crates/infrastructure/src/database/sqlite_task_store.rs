use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scheduler_domain::{
    is_due, NewTaskDescriptor, RunCompletion, RunningFlags, TaskDescriptor, TaskDescriptorStore,
};
use scheduler_errors::{SchedulerError, SchedulerResult};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

const SELECT_COLUMNS: &str = "SELECT id, name, kind, interval_seconds, enabled, stop_on_error, \
     timeout_seconds, parameters, last_enabled_utc, last_start_utc, last_end_utc, last_success_utc \
     FROM schedule_tasks";

/// 基于SQLite的任务存储
///
/// `running` 标记不落库，进程内由 [`RunningFlags`] 维护，重启后全部清零。
pub struct SqliteTaskStore {
    pool: SqlitePool,
    flags: RunningFlags,
}

impl SqliteTaskStore {
    /// 使用已有连接池，调用方需自行保证表结构已创建
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            flags: RunningFlags::new(),
        }
    }

    /// 连接数据库并运行迁移
    ///
    /// 内存数据库（`sqlite::memory:`）强制单连接，否则每个连接会看到各自独立的库。
    pub async fn connect(database_url: &str, max_connections: u32) -> SchedulerResult<Self> {
        debug!("Creating SQLite task store at: {}", database_url);

        let in_memory = database_url.contains(":memory:");
        let mut connect_options =
            SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new().min_connections(1);
        pool_options = if in_memory {
            pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            pool_options.max_connections(max_connections)
        };

        let pool = pool_options.connect_with(connect_options).await?;
        Self::run_migrations(&pool).await?;

        debug!("Successfully created SQLite task store");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 运行数据库迁移
    pub async fn run_migrations(pool: &SqlitePool) -> SchedulerResult<()> {
        debug!("Running SQLite database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schedule_tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                interval_seconds INTEGER NOT NULL CHECK (interval_seconds > 0),
                enabled BOOLEAN NOT NULL DEFAULT 1,
                stop_on_error BOOLEAN NOT NULL DEFAULT 0,
                timeout_seconds INTEGER,
                parameters TEXT NOT NULL DEFAULT '{}',
                last_enabled_utc DATETIME,
                last_start_utc DATETIME,
                last_end_utc DATETIME,
                last_success_utc DATETIME,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_schedule_tasks_enabled ON schedule_tasks(enabled)")
            .execute(pool)
            .await?;

        debug!("Successfully completed SQLite database migrations");
        Ok(())
    }

    fn row_to_task(&self, row: &SqliteRow) -> SchedulerResult<TaskDescriptor> {
        let id: i64 = row.try_get("id")?;
        let parameters: String = row.try_get("parameters")?;
        let parameters = serde_json::from_str(&parameters).map_err(|e| {
            SchedulerError::Serialization(format!("任务 {id} 的参数不是合法JSON: {e}"))
        })?;

        Ok(TaskDescriptor {
            id,
            name: row.try_get("name")?,
            kind: row.try_get("kind")?,
            interval_seconds: row.try_get("interval_seconds")?,
            enabled: row.try_get("enabled")?,
            stop_on_error: row.try_get("stop_on_error")?,
            timeout_seconds: row.try_get("timeout_seconds")?,
            parameters,
            last_enabled_utc: row.try_get("last_enabled_utc")?,
            last_start_utc: row.try_get("last_start_utc")?,
            last_end_utc: row.try_get("last_end_utc")?,
            last_success_utc: row.try_get("last_success_utc")?,
            running: self.flags.is_running(id),
        })
    }

    async fn fetch_required(&self, id: i64) -> SchedulerResult<TaskDescriptor> {
        self.get(id)
            .await?
            .ok_or_else(|| SchedulerError::task_id_not_found(id))
    }
}

#[async_trait]
impl TaskDescriptorStore for SqliteTaskStore {
    async fn list(&self) -> SchedulerResult<Vec<TaskDescriptor>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(|row| self.row_to_task(row)).collect()
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn get(&self, id: i64) -> SchedulerResult<Option<TaskDescriptor>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| self.row_to_task(&row)).transpose()
    }

    #[instrument(skip(self), fields(task_name = %name))]
    async fn get_by_name(&self, name: &str) -> SchedulerResult<Option<TaskDescriptor>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE name = ?1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| self.row_to_task(&row)).transpose()
    }

    #[instrument(skip(self, task), fields(task_name = %task.name, task_kind = %task.kind))]
    async fn insert_if_missing(
        &self,
        task: &NewTaskDescriptor,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TaskDescriptor> {
        task.validate()?;
        let seed = task.clone().into_descriptor(0, now);
        let parameters = serde_json::to_string(&seed.parameters)?;

        let result = sqlx::query(
            r#"
            INSERT INTO schedule_tasks
                (name, kind, interval_seconds, enabled, stop_on_error, timeout_seconds, parameters, last_enabled_utc)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&seed.name)
        .bind(&seed.kind)
        .bind(seed.interval_seconds)
        .bind(seed.enabled)
        .bind(seed.stop_on_error)
        .bind(seed.timeout_seconds)
        .bind(parameters)
        .bind(seed.last_enabled_utc)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!("种子任务已存在，保持不变: {}", seed.name);
        } else {
            debug!("写入种子任务: {}", seed.name);
        }

        self.get_by_name(&seed.name)
            .await?
            .ok_or_else(|| SchedulerError::task_not_found(&seed.name))
    }

    async fn claim(&self, id: i64) -> SchedulerResult<bool> {
        // 确认任务存在后再置位
        self.fetch_required(id).await?;
        Ok(self.flags.try_claim(id))
    }

    async fn claim_due(&self, id: i64, now: DateTime<Utc>) -> SchedulerResult<bool> {
        if !self.flags.try_claim(id) {
            return Ok(false);
        }
        let due = match self.get(id).await {
            Ok(Some(mut task)) => {
                task.running = false;
                is_due(&task, now)
            }
            Ok(None) => false,
            Err(e) => {
                self.flags.release(id);
                return Err(e);
            }
        };
        if !due {
            self.flags.release(id);
        }
        Ok(due)
    }

    async fn release(&self, id: i64) {
        self.flags.release(id);
    }

    async fn is_running(&self, id: i64) -> bool {
        self.flags.is_running(id)
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn record_start(&self, id: i64, started_at: DateTime<Utc>) -> SchedulerResult<()> {
        let result = sqlx::query("UPDATE schedule_tasks SET last_start_utc = ?1 WHERE id = ?2")
            .bind(started_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::task_id_not_found(id));
        }
        Ok(())
    }

    #[instrument(skip(self, completion), fields(task_id = %id, succeeded = completion.succeeded))]
    async fn record_completion(&self, id: i64, completion: RunCompletion) -> SchedulerResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE schedule_tasks
            SET last_end_utc = ?1,
                last_success_utc = CASE WHEN ?2 THEN ?1 ELSE last_success_utc END,
                enabled = CASE WHEN ?3 THEN 0 ELSE enabled END
            WHERE id = ?4
            "#,
        )
        .bind(completion.ended_at)
        .bind(completion.succeeded)
        .bind(completion.disable)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::task_id_not_found(id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(task_id = %id, enabled = enabled))]
    async fn set_enabled(
        &self,
        id: i64,
        enabled: bool,
        now: DateTime<Utc>,
    ) -> SchedulerResult<TaskDescriptor> {
        // SET 右侧读取的是更新前的 enabled
        let result = sqlx::query(
            r#"
            UPDATE schedule_tasks
            SET last_enabled_utc = CASE WHEN ?1 AND enabled = 0 THEN ?2 ELSE last_enabled_utc END,
                enabled = ?1
            WHERE id = ?3
            "#,
        )
        .bind(enabled)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::task_id_not_found(id));
        }
        self.fetch_required(id).await
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn set_interval(
        &self,
        id: i64,
        interval_seconds: i64,
    ) -> SchedulerResult<TaskDescriptor> {
        if interval_seconds <= 0 {
            return Err(SchedulerError::validation_error(format!(
                "执行间隔必须大于0，当前为 {interval_seconds}"
            )));
        }
        let result = sqlx::query("UPDATE schedule_tasks SET interval_seconds = ?1 WHERE id = ?2")
            .bind(interval_seconds)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::task_id_not_found(id));
        }
        self.fetch_required(id).await
    }
}
