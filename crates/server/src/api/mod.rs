pub mod actions;
pub mod addon;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod users;

pub use routes::create_router;
