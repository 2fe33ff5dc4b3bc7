//! Request extractors.

use std::marker::PhantomData;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use engine_core::auth::{bearer_token, TokenKind};

use crate::response::ApiError;
use crate::state::AppState;

/// Which secret a route is guarded by.
pub trait TokenScope: Send + Sync + 'static {
    const KIND: TokenKind;
}

pub struct RebuildToken;
pub struct MigrateToken;
pub struct CronToken;
pub struct StatsToken;

impl TokenScope for RebuildToken {
    const KIND: TokenKind = TokenKind::Rebuild;
}

impl TokenScope for MigrateToken {
    const KIND: TokenKind = TokenKind::Migrate;
}

impl TokenScope for CronToken {
    const KIND: TokenKind = TokenKind::Cron;
}

impl TokenScope for StatsToken {
    const KIND: TokenKind = TokenKind::Stats;
}

/// Proof that the request carried the secret for `S`.
///
/// Rejects with 401 (AUTH_001 / AUTH_003) on a missing or wrong token and
/// with 500 when the server has no secret configured for a required scope.
#[derive(Debug)]
pub struct Authorized<S>(PhantomData<S>);

#[async_trait]
impl<S: TokenScope> FromRequestParts<AppState> for Authorized<S> {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let mut presented = presented_token(&parts.headers, S::KIND).map(str::to_string);
        if presented.is_none() && S::KIND == TokenKind::Stats {
            presented = query_token(parts.uri.query());
        }

        state.tokens.verify(S::KIND, presented.as_deref())?;
        Ok(Self(PhantomData))
    }
}

/// Token carried in the header `kind` is read from.
pub fn presented_token(headers: &HeaderMap, kind: TokenKind) -> Option<&str> {
    let value = headers.get(kind.header()).and_then(|h| h.to_str().ok());
    if kind.header() == header::AUTHORIZATION.as_str() {
        bearer_token(value)
    } else {
        value
    }
}

fn query_token(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(name, _)| name == "token")
        .map(|(_, value)| value.into_owned())
}

/// Client IP address.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(&parts.headers)))
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|xff| xff.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}
