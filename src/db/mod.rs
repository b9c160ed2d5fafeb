pub mod catalog;
pub mod db_pool;
pub mod executor;
pub mod introspector;
pub mod run_store;
pub mod schema;
pub mod session;
