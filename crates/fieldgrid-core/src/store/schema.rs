//! Engine-owned tables. Business tables belong to the host application.

/// DDL for the tables the engine reads and writes itself.
pub const ENGINE_SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS custom_definitions (
    id            INTEGER PRIMARY KEY,
    label         TEXT    NOT NULL,
    data_type     TEXT    NOT NULL,
    module_type   TEXT    NOT NULL,
    display_rank  INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_custom_definitions_module
    ON custom_definitions (module_type, display_rank, id);

CREATE TABLE IF NOT EXISTS custom_values (
    id                    INTEGER PRIMARY KEY,
    customizable_id       INTEGER NOT NULL,
    customizable_type     TEXT    NOT NULL,
    custom_definition_id  INTEGER NOT NULL REFERENCES custom_definitions (id),
    string_value          TEXT,
    text_value            TEXT,
    integer_value         INTEGER,
    decimal_value         TEXT,
    date_value            TEXT,
    datetime_value        TEXT,
    boolean_value         INTEGER,
    UNIQUE (customizable_id, customizable_type, custom_definition_id)
);

CREATE INDEX IF NOT EXISTS idx_custom_values_definition
    ON custom_values (custom_definition_id, customizable_type);

CREATE TABLE IF NOT EXISTS search_runs (
    id               INTEGER PRIMARY KEY,
    owner_id         INTEGER NOT NULL,
    target_kind      TEXT    NOT NULL,
    target_id        INTEGER NOT NULL,
    module_type      TEXT    NOT NULL,
    state            TEXT    NOT NULL,
    source           TEXT    NOT NULL,
    cursor_position  INTEGER NOT NULL DEFAULT 0,
    fingerprint      TEXT,
    last_accessed    TEXT    NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_search_runs_owner
    ON search_runs (owner_id, target_kind, target_id, last_accessed);
";

/// Table holding one row per (entity, definition) custom value.
pub const CUSTOM_VALUES_TABLE: &str = "custom_values";
