pub mod buses;
pub mod health;
pub mod stats;

pub use buses::create_bus_routes;
pub use health::create_health_routes;
pub use stats::create_stats_routes;
