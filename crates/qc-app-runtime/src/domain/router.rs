//! Message and query routing tables.
//!
//! Routes are registered once while the application is assembled and looked
//! up by the module name carried in each message or custom query path.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use super::abci::RequestQuery;
use super::context::Context;
use super::entities::{Msg, MsgResult};
use crate::error::Result;

/// Executes one message against the context's store branch.
pub type Handler = Arc<dyn Fn(&Context, &Msg) -> Result<MsgResult> + Send + Sync>;

/// Answers `custom/<route>/...` queries. Receives the path segments after the
/// route.
pub type Querier = Arc<dyn Fn(&Context, &[String], &RequestQuery) -> Result<Vec<u8>> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("Route {0:?} is not alphanumeric")]
    InvalidRoute(String),

    #[error("Route {0:?} already registered")]
    DuplicateRoute(String),
}

fn check_route(route: &str) -> std::result::Result<(), RouterError> {
    if route.is_empty() || !route.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(RouterError::InvalidRoute(route.to_string()));
    }
    Ok(())
}

/// Message route table.
#[derive(Default, Clone)]
pub struct Router {
    routes: HashMap<String, Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(
        &mut self,
        route: &str,
        handler: Handler,
    ) -> std::result::Result<&mut Self, RouterError> {
        check_route(route)?;
        if self.routes.contains_key(route) {
            return Err(RouterError::DuplicateRoute(route.to_string()));
        }
        self.routes.insert(route.to_string(), handler);
        Ok(self)
    }

    pub fn route(&self, route: &str) -> Option<&Handler> {
        self.routes.get(route)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Custom query route table.
#[derive(Default, Clone)]
pub struct QueryRouter {
    routes: HashMap<String, Querier>,
}

impl QueryRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_route(
        &mut self,
        route: &str,
        querier: Querier,
    ) -> std::result::Result<&mut Self, RouterError> {
        check_route(route)?;
        if self.routes.contains_key(route) {
            return Err(RouterError::DuplicateRoute(route.to_string()));
        }
        self.routes.insert(route.to_string(), querier);
        Ok(self)
    }

    pub fn route(&self, route: &str) -> Option<&Querier> {
        self.routes.get(route)
    }
}
