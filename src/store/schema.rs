//! Relational schema: a strict foreign-key graph rooted at `site`.

/// DDL applied on every [`super::Db::open`]. Idempotent (`IF NOT EXISTS`).
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS site (
    id              INTEGER PRIMARY KEY,
    domain          TEXT NOT NULL UNIQUE,
    status          TEXT NOT NULL,
    robots_status   TEXT NOT NULL,
    first_seen_at   INTEGER NOT NULL,
    last_scanned_at INTEGER,
    popularity      INTEGER NOT NULL DEFAULT 0,
    title           TEXT,
    description     TEXT,
    favicon_url     TEXT
);

CREATE TABLE IF NOT EXISTS scan (
    id                     INTEGER PRIMARY KEY,
    site_id                INTEGER NOT NULL REFERENCES site(id) ON DELETE CASCADE,
    method                 TEXT NOT NULL,
    state                  TEXT NOT NULL,
    css_source_count       INTEGER NOT NULL DEFAULT 0,
    aggregate_content_hash TEXT,
    started_at             INTEGER NOT NULL,
    finished_at            INTEGER,
    error_kind             TEXT,
    error_message          TEXT,
    metrics_json           TEXT
);
CREATE INDEX IF NOT EXISTS idx_scan_site ON scan(site_id);
CREATE INDEX IF NOT EXISTS idx_scan_state ON scan(site_id, state);

CREATE TABLE IF NOT EXISTS css_content (
    sha256           TEXT PRIMARY KEY,
    compressed_body  BLOB NOT NULL,
    original_bytes   INTEGER NOT NULL,
    compressed_bytes INTEGER NOT NULL,
    reference_count  INTEGER NOT NULL DEFAULT 0,
    ttl_days         INTEGER NOT NULL,
    first_seen_at    INTEGER NOT NULL,
    last_accessed_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_css_content_sweep
    ON css_content(reference_count, last_accessed_at);

CREATE TABLE IF NOT EXISTS css_source (
    id                  INTEGER PRIMARY KEY,
    scan_id             INTEGER NOT NULL REFERENCES scan(id) ON DELETE CASCADE,
    sha256              TEXT NOT NULL REFERENCES css_content(sha256),
    origin_kind         TEXT NOT NULL,
    origin_value        TEXT,
    cascade_index       INTEGER NOT NULL,
    cross_site_redirect INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_css_source_scan ON css_source(scan_id);
CREATE INDEX IF NOT EXISTS idx_css_source_sha ON css_source(sha256);

CREATE TABLE IF NOT EXISTS token_set (
    id               INTEGER PRIMARY KEY,
    site_id          INTEGER NOT NULL REFERENCES site(id) ON DELETE CASCADE,
    scan_id          INTEGER NOT NULL REFERENCES scan(id) ON DELETE CASCADE,
    version_number   INTEGER NOT NULL,
    tokens_json      TEXT NOT NULL,
    consensus_score  REAL NOT NULL,
    is_public        INTEGER NOT NULL DEFAULT 1,
    created_by       TEXT,
    created_at       INTEGER NOT NULL,
    UNIQUE(site_id, version_number)
);
CREATE INDEX IF NOT EXISTS idx_token_set_site ON token_set(site_id, version_number DESC);

CREATE TABLE IF NOT EXISTS token_version (
    id                   INTEGER PRIMARY KEY,
    token_set_id         INTEGER NOT NULL REFERENCES token_set(id) ON DELETE CASCADE,
    previous_version_id  INTEGER REFERENCES token_version(id),
    added                INTEGER NOT NULL,
    removed              INTEGER NOT NULL,
    modified             INTEGER NOT NULL,
    changelog_json       TEXT NOT NULL,
    created_at           INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS token_change (
    id                INTEGER PRIMARY KEY,
    token_version_id  INTEGER NOT NULL REFERENCES token_version(id) ON DELETE CASCADE,
    token_path        TEXT NOT NULL,
    change_type       TEXT NOT NULL,
    category          TEXT NOT NULL,
    old_value         TEXT,
    new_value         TEXT
);
CREATE INDEX IF NOT EXISTS idx_token_change_version ON token_change(token_version_id);

CREATE TABLE IF NOT EXISTS layout_profile (
    id          INTEGER PRIMARY KEY,
    scan_id     INTEGER NOT NULL UNIQUE REFERENCES scan(id) ON DELETE CASCADE,
    profile_json TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS token_vote (
    id            INTEGER PRIMARY KEY,
    token_set_id  INTEGER NOT NULL REFERENCES token_set(id) ON DELETE CASCADE,
    token_path    TEXT NOT NULL,
    vote_type     TEXT NOT NULL,
    note          TEXT,
    created_at    INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_token_vote_set_path ON token_vote(token_set_id, token_path);

CREATE TABLE IF NOT EXISTS submission (
    id            INTEGER PRIMARY KEY,
    url           TEXT NOT NULL,
    priority      TEXT NOT NULL,
    notify        TEXT,
    quality       TEXT NOT NULL,
    submitted_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS stats_cache (
    id                  INTEGER PRIMARY KEY CHECK (id = 1),
    total_sites         INTEGER NOT NULL DEFAULT 0,
    total_scans         INTEGER NOT NULL DEFAULT 0,
    total_token_sets    INTEGER NOT NULL DEFAULT 0,
    total_tokens        INTEGER NOT NULL DEFAULT 0,
    per_category_json   TEXT NOT NULL DEFAULT '{}',
    average_confidence  REAL NOT NULL DEFAULT 0,
    updated_at          INTEGER NOT NULL DEFAULT 0
);
INSERT OR IGNORE INTO stats_cache (id) VALUES (1);
"#;
