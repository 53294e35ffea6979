//! Connection pool settings.

use std::time::Duration;

/// Default maximum pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
/// Default minimum idle connections.
pub const DEFAULT_MIN_CONNECTIONS: u32 = 2;
/// Default time allowed to acquire a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default distance between the database clock and a sync watermark.
pub const DEFAULT_WATERMARK_LAG: Duration = Duration::from_secs(5);

/// Settings for [`PostgresEntityStore::connect`](crate::PostgresEntityStore::connect).
///
/// # Example
///
/// ```
/// use rsvp_postgres::PostgresConfig;
/// use std::time::Duration;
///
/// let config = PostgresConfig::new("postgres://localhost/rsvp")
///     .max_connections(20)
///     .connect_timeout(Duration::from_secs(5));
/// assert_eq!(config.max_connections, 20);
/// assert_eq!(config.min_connections, 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostgresConfig {
    /// Connection string
    pub url: String,
    /// Pool upper bound
    pub max_connections: u32,
    /// Connections kept open while idle
    pub min_connections: u32,
    /// Acquire timeout
    pub connect_timeout: Duration,
    /// How far sync watermarks trail the database clock.
    ///
    /// A write is stamped when its `UPDATE` runs but becomes visible when it
    /// commits; this must exceed the longest such gap or a sync can miss it.
    pub watermark_lag: Duration,
}

impl PostgresConfig {
    /// Settings for `url` with default pool sizing.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            watermark_lag: DEFAULT_WATERMARK_LAG,
        }
    }

    /// Set the pool upper bound.
    #[must_use]
    pub const fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the idle floor.
    #[must_use]
    pub const fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the acquire timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the sync watermark lag.
    #[must_use]
    pub const fn watermark_lag(mut self, lag: Duration) -> Self {
        self.watermark_lag = lag;
        self
    }
}
