/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque identity of one open client connection.
pub type ConnId = String;

/// Caller- or domain-assigned identity of a job (usually an item key).
pub type JobKey = String;
