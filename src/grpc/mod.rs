//! gRPC surface (`users.v1.UserService`), served next to the HTTP API.

pub mod auth;
pub mod service;

pub mod pb {
    include!("users.v1.rs");
}

pub use pb::user_service_server::UserServiceServer;
pub use service::UserGrpcService;
