/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Sibling ordering key. Always below [`crate::tree::weight::CEILING`].
pub type SortWeight = u64;

/// `parent_id` value of top-level nodes. No node row carries this id.
pub const ROOT_PARENT_ID: DbId = 0;
