//! PostgreSQL implementation of the gazetteer source.

mod connection;
mod gazetteer;

pub use connection::{connect, GazetteerConfig, DEFAULT_MAX_CONNECTIONS};
pub use gazetteer::{
    collapse_changes, names_from_json, subject_lookup_sql, subject_page_sql, PostgresGazetteer,
};
