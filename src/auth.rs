//! Bearer-token scope gate for the gateway API.
//!
//! Tokens are configured as `token=scope,scope;token=scope`. A request must
//! present `Authorization: Bearer <token>` for a known token that carries the
//! required scope. With no tokens configured every request passes.

use crate::errors::AppError;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use std::{
    collections::{HashMap, HashSet},
    str::FromStr,
    sync::Arc,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenParseError {
    #[error("access token entry `{0}` is not of the form token=scope[,scope]")]
    MalformedEntry(String),
}

/// Token → granted scopes.
#[derive(Clone, Debug, Default)]
pub struct AccessTokens {
    tokens: HashMap<String, HashSet<String>>,
}

impl AccessTokens {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn scopes(&self, token: &str) -> Option<&HashSet<String>> {
        self.tokens.get(token)
    }
}

impl FromStr for AccessTokens {
    type Err = TokenParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = HashMap::new();
        for entry in s.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, scopes) = entry
                .split_once('=')
                .ok_or_else(|| TokenParseError::MalformedEntry(entry.to_string()))?;
            let token = token.trim();
            if token.is_empty() {
                return Err(TokenParseError::MalformedEntry(entry.to_string()));
            }
            let scopes = scopes
                .split(',')
                .map(str::trim)
                .filter(|scope| !scope.is_empty())
                .map(String::from)
                .collect::<HashSet<_>>();
            tokens.insert(token.to_string(), scopes);
        }
        Ok(Self { tokens })
    }
}

#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<AccessTokens>,
    pub required_scope: String,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// 401 for a missing or unknown token, 403 when the token lacks the scope.
pub async fn require_scope(
    State(auth): State<AuthState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if auth.tokens.is_empty() {
        return Ok(next.run(request).await);
    }

    let Some(token) = bearer_token(&headers) else {
        tracing::debug!("No bearer token on request to {}", request.uri().path());
        return Err(AppError::unauthorized("bearer token required"));
    };
    let Some(scopes) = auth.tokens.scopes(token) else {
        tracing::warn!("Unknown access token presented");
        return Err(AppError::unauthorized("invalid access token"));
    };
    if !scopes.contains(&auth.required_scope) {
        tracing::warn!(scope = %auth.required_scope, "Access token lacks required scope");
        return Err(AppError::forbidden(format!(
            "access token lacks scope `{}`",
            auth.required_scope
        )));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tokens_and_scopes() {
        let tokens: AccessTokens = "alice=download,upload; bob=upload;".parse().unwrap();
        assert!(tokens.scopes("alice").unwrap().contains("download"));
        assert!(!tokens.scopes("bob").unwrap().contains("download"));
        assert!(tokens.scopes("carol").is_none());
    }

    #[test]
    fn empty_string_means_no_tokens() {
        assert!("".parse::<AccessTokens>().unwrap().is_empty());
    }

    #[test]
    fn rejects_entries_without_scopes_separator() {
        assert_eq!(
            "alice".parse::<AccessTokens>().unwrap_err(),
            TokenParseError::MalformedEntry("alice".into())
        );
        assert!("=download".parse::<AccessTokens>().is_err());
    }

    #[test]
    fn extracts_bearer_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc"));
        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }
}
