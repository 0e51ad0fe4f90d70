pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS datasets (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  description TEXT NOT NULL DEFAULT '',
  source_comparison_id INTEGER,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_cases (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  dataset_id INTEGER NOT NULL REFERENCES datasets(id),
  input_text TEXT NOT NULL,
  expected_json TEXT NOT NULL,
  importance INTEGER NOT NULL DEFAULT 1
);

CREATE TABLE IF NOT EXISTS documents (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  source TEXT NOT NULL,
  category TEXT,
  text TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS comparisons (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  mode TEXT NOT NULL,
  kind TEXT NOT NULL,
  provider_a TEXT NOT NULL,
  model_a TEXT NOT NULL,
  provider_b TEXT NOT NULL,
  model_b TEXT NOT NULL,
  target_json TEXT NOT NULL,
  status TEXT NOT NULL,
  progress INTEGER NOT NULL DEFAULT 0,
  total_iterations INTEGER NOT NULL,
  message TEXT NOT NULL DEFAULT '',
  error TEXT,
  summary_json TEXT,
  reviewed_count INTEGER NOT NULL DEFAULT 0,
  total_reviewable INTEGER NOT NULL DEFAULT 0,
  output_dataset_id INTEGER REFERENCES datasets(id),
  created_at TEXT NOT NULL,
  started_at TEXT,
  finished_at TEXT
);

CREATE TABLE IF NOT EXISTS trials (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  comparison_id INTEGER NOT NULL REFERENCES comparisons(id),
  config TEXT NOT NULL,
  trial_ref TEXT NOT NULL,
  extraction_json TEXT,
  confidence REAL,
  stage_outputs_json TEXT,
  precision REAL,
  recall REAL,
  f1 REAL,
  tokens_in INTEGER NOT NULL DEFAULT 0,
  tokens_out INTEGER NOT NULL DEFAULT 0,
  latency_ms INTEGER NOT NULL DEFAULT 0,
  status TEXT NOT NULL,
  error TEXT,
  created_at TEXT NOT NULL,
  UNIQUE (comparison_id, config, trial_ref)
);

CREATE TABLE IF NOT EXISTS calibration_articles (
  comparison_id INTEGER NOT NULL REFERENCES comparisons(id),
  document_id INTEGER NOT NULL REFERENCES documents(id),
  review_status TEXT NOT NULL DEFAULT 'pending',
  chosen_config TEXT,
  golden_json TEXT,
  notes TEXT,
  reviewed_at TEXT,
  PRIMARY KEY (comparison_id, document_id)
);
"#;
