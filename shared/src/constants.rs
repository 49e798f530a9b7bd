pub const DEFAULT_TOPIC: &str = "greengrid/oficinas/data";
pub const DEFAULT_BUS_URL: &str = "mqtt://localhost:1883";
pub const DEFAULT_API_PORT: u16 = 4000;
pub const DEFAULT_CAPACITY: u64 = 5_000;
pub const DEFAULT_QUERY_LIMIT: i64 = 100;
pub const DEFAULT_DB_FILE: &str = "greengrid.db";
