pub mod core;
pub mod detect;
pub mod dom;
pub mod events;
pub mod heal;
pub mod manager;
pub mod monitor;
pub mod prefs;
pub mod probe;

// --- Primary core exports ---
pub use self::core::registry;
pub use self::core::types;
pub use self::core::types::*;
pub use self::core::AppState;
pub use manager::PortalContextManager;
