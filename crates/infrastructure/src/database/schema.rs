//! SQLite 表结构，全部语句可重复执行

/// 非终态任务在 (联赛, 赛季) 上唯一，由部分唯一索引在存储层兜底
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        league_id INTEGER NOT NULL,
        season_id INTEGER NOT NULL,
        priority INTEGER NOT NULL,
        status TEXT NOT NULL CHECK (status IN ('PENDING', 'PROCESSING', 'COMPLETED', 'FAILED')),
        attempts INTEGER NOT NULL DEFAULT 0,
        reasons TEXT NOT NULL DEFAULT '[]',
        rerun_requested INTEGER NOT NULL DEFAULT 0,
        worker_id TEXT,
        lease_expires_at TEXT,
        available_at TEXT NOT NULL,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        last_error TEXT,
        result TEXT
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_active_key
        ON jobs (league_id, season_id)
        WHERE status IN ('PENDING', 'PROCESSING')
    "#,
    "CREATE INDEX IF NOT EXISTS idx_jobs_dispatch ON jobs (status, priority DESC, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_jobs_completed_at ON jobs (completed_at)",
    r#"
    CREATE TABLE IF NOT EXISTS snapshots (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        league_id INTEGER NOT NULL,
        season_id INTEGER NOT NULL,
        job_id INTEGER,
        standings_version INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        size INTEGER NOT NULL,
        payload TEXT NOT NULL,
        checksum TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_snapshots_key ON snapshots (league_id, season_id, id)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_created_at ON snapshots (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_job ON snapshots (job_id)",
    r#"
    CREATE TABLE IF NOT EXISTS standings (
        league_id INTEGER NOT NULL,
        season_id INTEGER NOT NULL,
        version INTEGER NOT NULL,
        entries TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        job_id INTEGER,
        PRIMARY KEY (league_id, season_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS audit_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TEXT NOT NULL,
        job_id INTEGER,
        league_id INTEGER NOT NULL,
        season_id INTEGER NOT NULL,
        action TEXT NOT NULL CHECK (action IN ('recalculated', 'rolled_back', 'restored', 'job_failed')),
        before_hash TEXT NOT NULL,
        after_hash TEXT NOT NULL,
        actor TEXT NOT NULL CHECK (actor IN ('system', 'manual')),
        details TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_key ON audit_logs (league_id, season_id, id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_job ON audit_logs (job_id)",
    "CREATE INDEX IF NOT EXISTS idx_audit_logs_created_at ON audit_logs (created_at)",
    // 参考数据，由外部内容系统维护
    r#"
    CREATE TABLE IF NOT EXISTS teams (
        id INTEGER NOT NULL,
        league_id INTEGER NOT NULL,
        season_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        PRIMARY KEY (league_id, season_id, id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS matches (
        id INTEGER PRIMARY KEY,
        league_id INTEGER NOT NULL,
        season_id INTEGER NOT NULL,
        home_team_id INTEGER NOT NULL,
        away_team_id INTEGER NOT NULL,
        home_score INTEGER,
        away_score INTEGER
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_matches_key ON matches (league_id, season_id)",
];
