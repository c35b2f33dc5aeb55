/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Decentralized identifier of an agent registered with the payments API.
pub type Did = String;
