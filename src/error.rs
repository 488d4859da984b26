use crate::database::StoreError;
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::{debug, error};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("User already exists")]
    DuplicateUser,
    #[error("User does not exist")]
    UserNotFound,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Access Denied")]
    MissingToken,
    #[error("Invalid Token")]
    InvalidToken,
    #[error("Invalid {0} ID")]
    InvalidId(&'static str),
    #[error("Missing or invalid field: {0}")]
    InvalidField(&'static str),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
    #[error("token signing failed: {0}")]
    Token(#[source] jsonwebtoken::errors::Error),
    #[error("token lifetime {0:?} overflows the expiry timestamp")]
    TokenLifetime(std::time::Duration),
    #[error("template error: {0:?}")]
    Template(#[from] tera::Error),
    #[error("{0} is not registered as app data")]
    MissingAppData(&'static str),
}

pub type AppResult<T> = Result<T, AppError>;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::DuplicateUser
            | AppError::UserNotFound
            | AppError::InvalidPassword
            | AppError::InvalidToken
            | AppError::InvalidId(_)
            | AppError::InvalidField(_) => StatusCode::BAD_REQUEST,
            AppError::MissingToken => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Store(_)
            | AppError::Hash(_)
            | AppError::Token(_)
            | AppError::TokenLifetime(_)
            | AppError::Template(_)
            | AppError::MissingAppData(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!("{}", self);
            "Server Error".to_owned()
        } else {
            debug!("rejected request: {}", self);
            self.to_string()
        };
        HttpResponse::build(status)
            .content_type("text/plain; charset=utf-8")
            .body(message)
    }
}
