use tonic::{Request, Response, Status};
use tracing::instrument;

use super::{
    auth::authorize,
    pb::{
        self, user_service_server::UserService as UserServiceRpc, CreateUserRequest,
        CreateUserResponse, GetUserRequest, GetUserResponse,
    },
};
use crate::users::{model::User, service::UserService};

pub struct UserGrpcService {
    users: UserService,
}

impl UserGrpcService {
    pub fn new(users: UserService) -> Self {
        Self { users }
    }
}

impl From<User> for pb::User {
    fn from(u: User) -> Self {
        Self {
            id: u.id.to_string(),
            name: u.name,
            email: u.email,
            role: u.role.to_string(),
            status: u.status.to_string(),
            created_at: u.created_at.unix_timestamp(),
            updated_at: u.updated_at.map_or(0, |t| t.unix_timestamp()),
            last_login: u.last_login.map_or(0, |t| t.unix_timestamp()),
        }
    }
}

#[tonic::async_trait]
impl UserServiceRpc for UserGrpcService {
    #[instrument(skip(self, request))]
    async fn create_user(
        &self,
        request: Request<CreateUserRequest>,
    ) -> Result<Response<CreateUserResponse>, Status> {
        let req = request.into_inner();
        let id = self
            .users
            .register(&req.name, &req.email, &req.password)
            .await?;
        Ok(Response::new(CreateUserResponse { id: id.to_string() }))
    }

    #[instrument(skip(self, request))]
    async fn get_user(
        &self,
        request: Request<GetUserRequest>,
    ) -> Result<Response<GetUserResponse>, Status> {
        let caller = authorize(self.users.keys(), request.metadata())?;
        tracing::debug!(caller = %caller, "grpc caller authenticated");
        let user = self.users.get_user(&request.into_inner().id).await?;
        Ok(Response::new(GetUserResponse {
            user: Some(user.into()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::{auth::jwt::JwtKeys, config::JwtConfig, users::memory::InMemoryUserRepository};

    fn grpc() -> UserGrpcService {
        let keys = JwtKeys::from_config(&JwtConfig {
            secret: "grpc-secret".into(),
            issuer: "iss".into(),
            audience: "aud".into(),
            ttl_minutes: 5,
        });
        UserGrpcService::new(UserService::new(
            Arc::new(InMemoryUserRepository::new()),
            keys,
            Duration::from_secs(5),
        ))
    }

    fn create_request() -> Request<CreateUserRequest> {
        Request::new(CreateUserRequest {
            name: "Alice".into(),
            email: "alice@x.com".into(),
            password: "secret1".into(),
        })
    }

    fn get_request(id: &str, auth: Option<&str>) -> Request<GetUserRequest> {
        let mut req = Request::new(GetUserRequest { id: id.into() });
        if let Some(auth) = auth {
            req.metadata_mut()
                .insert("authorization", auth.parse().unwrap());
        }
        req
    }

    #[tokio::test]
    async fn create_user_needs_no_token() {
        let svc = grpc();
        let res = svc.create_user(create_request()).await.unwrap().into_inner();
        assert!(uuid::Uuid::parse_str(&res.id).is_ok());

        let status = svc.create_user(create_request()).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::AlreadyExists);
    }

    #[tokio::test]
    async fn create_user_rejects_invalid_input() {
        let svc = grpc();
        let status = svc
            .create_user(Request::new(CreateUserRequest {
                name: "Alice".into(),
                email: "nope".into(),
                password: "secret1".into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[tokio::test]
    async fn get_user_requires_valid_token() {
        let svc = grpc();
        let id = svc.create_user(create_request()).await.unwrap().into_inner().id;

        let status = svc.get_user(get_request(&id, None)).await.unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);

        let status = svc
            .get_user(get_request(&id, Some("Bearer forged.token.here")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn get_user_with_token_returns_user() {
        let svc = grpc();
        let id = svc.create_user(create_request()).await.unwrap().into_inner().id;
        let token = svc.users.login("alice@x.com", "secret1").await.unwrap();
        let bearer = format!("Bearer {token}");

        let user = svc
            .get_user(get_request(&id, Some(&bearer)))
            .await
            .unwrap()
            .into_inner()
            .user
            .unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.email, "alice@x.com");
        assert_eq!(user.role, "user");
        assert!(user.last_login > 0);

        let status = svc
            .get_user(get_request("not-a-uuid", Some(&bearer)))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);

        let status = svc
            .get_user(get_request(&uuid::Uuid::new_v4().to_string(), Some(&bearer)))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::NotFound);
    }
}
