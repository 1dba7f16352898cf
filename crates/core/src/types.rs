/// Primary keys across the broker schema are PostgreSQL BIGSERIAL values.
pub type DbId = i64;

/// Deadlines and activity stamps are always UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
