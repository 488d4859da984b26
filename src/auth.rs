use crate::database::AccountDb;
use crate::error::{AppError, AppResult};
use crate::model::*;
use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use std::time::Duration;

pub const TOKEN_COOKIE: &str = "token";

#[derive(Clone, Copy, Debug)]
pub struct HashCost(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub subject: Id,
    pub is_admin: bool,
}

impl Identity {
    pub fn navbar_class(&self) -> &'static str {
        if self.is_admin {
            "admin-navbar"
        } else {
            "authenticated-navbar"
        }
    }
}

// Blank means missing, as for the inventory forms. Credentials are kept verbatim.
fn required<'a>(value: &'a str, field: &'static str) -> AppResult<&'a str> {
    if value.trim().is_empty() {
        Err(AppError::InvalidField(field))
    } else {
        Ok(value)
    }
}

pub fn signup<D: AccountDb>(db: &D, cost: HashCost, username: &str, password: &str) -> AppResult<Id> {
    let username = required(username, "username")?;
    let password = required(password, "password")?;
    if db.get_account_by_username(Role::User, username)?.is_some() {
        return Err(AppError::DuplicateUser);
    }
    let account = Account {
        username: username.to_owned(),
        password_hash: bcrypt::hash(password, cost.0)?,
    };
    // The username index settles races between concurrent signups.
    let id = db
        .add_account(Role::User, &account)?
        .ok_or(AppError::DuplicateUser)?;
    info!("new user {} ({})", username, id);
    Ok(id)
}

/// Users shadow administrators: a username present in both collections only ever
/// resolves to the user, whether or not the password matches it.
pub fn login<D: AccountDb>(db: &D, username: &str, password: &str) -> AppResult<Identity> {
    let (subject, account, is_admin) = match db.get_account_by_username(Role::User, username)? {
        Some((id, account)) => (id, account, false),
        None => match db.get_account_by_username(Role::Admin, username)? {
            Some((id, account)) => (id, account, true),
            None => return Err(AppError::UserNotFound),
        },
    };
    if !bcrypt::verify(password, &account.password_hash)? {
        return Err(AppError::InvalidPassword);
    }
    Ok(Identity { subject, is_admin })
}

pub fn seed_admin<D: AccountDb>(
    db: &D,
    cost: HashCost,
    username: &str,
    password: &str,
) -> AppResult<bool> {
    if db.get_account_by_username(Role::Admin, username)?.is_some() {
        return Ok(false);
    }
    let account = Account {
        username: required(username, "username")?.to_owned(),
        password_hash: bcrypt::hash(required(password, "password")?, cost.0)?,
    };
    Ok(db.add_account(Role::Admin, &account)?.is_some())
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    #[serde(rename = "_id")]
    subject: Id,
    #[serde(rename = "isAdmin")]
    is_admin: bool,
    iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    exp: Option<i64>,
}

/// HS256 session tokens. Without a ttl no `exp` claim is written and the token
/// never expires.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Option<Duration>,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Option<Duration>) -> TokenIssuer {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        TokenIssuer {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn issue(&self, identity: &Identity) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = match self.ttl {
            Some(ttl) => Some(
                i64::try_from(ttl.as_secs())
                    .ok()
                    .and_then(|secs| now.checked_add(secs))
                    .ok_or(AppError::TokenLifetime(ttl))?,
            ),
            None => None,
        };
        let claims = Claims {
            subject: identity.subject,
            is_admin: identity.is_admin,
            iat: now,
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(AppError::Token)
    }

    pub fn verify(&self, token: &str) -> AppResult<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
            debug!("token rejected: {}", err);
            AppError::InvalidToken
        })?;
        Ok(Identity {
            subject: data.claims.subject,
            is_admin: data.claims.is_admin,
        })
    }
}

/// The `token` cookie wins; the `Authorization` header (optionally `Bearer `) is
/// only consulted without it.
pub fn authorize(
    issuer: &TokenIssuer,
    cookie: Option<&str>,
    authorization: Option<&str>,
) -> AppResult<Identity> {
    let token = cookie
        .filter(|token| !token.is_empty())
        .or_else(|| authorization.map(|value| value.strip_prefix("Bearer ").unwrap_or(value)))
        .filter(|token| !token.is_empty())
        .ok_or(AppError::MissingToken)?;
    issuer.verify(token)
}

impl Identity {
    fn from_http_request(req: &HttpRequest) -> AppResult<Identity> {
        let issuer = req
            .app_data::<web::Data<TokenIssuer>>()
            .ok_or(AppError::MissingAppData("TokenIssuer"))?;
        let cookie = req.cookie(TOKEN_COOKIE);
        let cookie = cookie.as_ref().map(|c| c.value()).filter(|v| !v.is_empty());
        let authorization = match (cookie, req.headers().get(header::AUTHORIZATION)) {
            // A header that is present but unreadable is a bad credential, not a missing one.
            (None, Some(value)) => Some(value.to_str().map_err(|_| AppError::InvalidToken)?),
            (_, value) => value.and_then(|value| value.to_str().ok()),
        };
        authorize(issuer, cookie, authorization)
    }
}

impl FromRequest for Identity {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(Identity::from_http_request(req))
    }
}
