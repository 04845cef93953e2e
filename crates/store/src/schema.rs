pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS series (
  series_key TEXT PRIMARY KEY,
  retention_ms BIGINT NOT NULL,
  labels_json TEXT NOT NULL,
  created_ms BIGINT NOT NULL
);

CREATE TABLE IF NOT EXISTS samples (
  series_key TEXT NOT NULL,
  ts_ms BIGINT NOT NULL,
  value DOUBLE NOT NULL,
  PRIMARY KEY(series_key, ts_ms)
);
"#;
