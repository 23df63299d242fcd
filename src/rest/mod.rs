pub mod error;
pub mod logging_middleware;
pub mod middleware;
pub mod page;
pub mod routes;

pub use middleware::MiddlewareKind;
pub use routes::create_router;
