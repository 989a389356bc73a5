/// Delay, threshold and watermark values are whole minutes.
pub type Minutes = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
