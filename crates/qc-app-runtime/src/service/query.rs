//! # Query Routing
//!
//! Paths are `/`-separated; the first segment picks the handler:
//!
//! - `app/simulate`, `app/version`
//! - `store/<store path>`, forwarded to the root store (`store/key`,
//!   `store/subspace`)
//! - `p2p/filter/addr/<addr>`, `p2p/filter/id/<id>`
//! - `custom/<route>/...`, forwarded to a registered querier with the
//!   remaining segments
//!
//! Store and custom queries read committed versions only. Simulation runs
//! on a throwaway branch of the check state.

use qc_app_store::{CacheStore, StoreError, StoreQuery};
use std::sync::Arc;
use tracing::debug;

use super::BaseApp;
use crate::domain::{RequestQuery, ResponseQuery, RunTxMode, SimulationResponse};
use crate::error::TxError;

fn split_path(path: &str) -> Vec<String> {
    path.trim_start_matches('/')
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

fn store_query_error(err: StoreError) -> TxError {
    match err {
        StoreError::UnknownQueryPath(path) => {
            TxError::UnknownRequest(format!("unknown store query path {path}"))
        }
        err @ StoreError::VersionNotFound { .. } => TxError::InvalidRequest(err.to_string()),
        other => TxError::Store(other),
    }
}

impl BaseApp {
    pub(super) fn handle_query(&self, req: RequestQuery) -> ResponseQuery {
        let path = split_path(&req.path);
        let Some(kind) = path.first() else {
            return ResponseQuery::from_error(&TxError::UnknownRequest(
                "no query path provided".to_string(),
            ));
        };
        debug!(path = %req.path, height = req.height, "[app] query");

        match kind.as_str() {
            "app" => self.handle_app_query(&path, &req),
            "store" => self.handle_store_query(&path, &req),
            "p2p" => self.handle_p2p_query(&path),
            "custom" => self.handle_custom_query(&path, &req),
            _ => ResponseQuery::from_error(&TxError::UnknownRequest(format!(
                "unknown query path {}",
                req.path
            ))),
        }
    }

    /// Dry-run `tx_bytes` against the check state.
    pub fn simulate(&self, tx_bytes: &[u8]) -> Result<SimulationResponse, TxError> {
        let tx = self.tx_decoder.decode(tx_bytes)?;
        let (gas_info, result) = self.run_tx(RunTxMode::Simulate, tx_bytes, &tx);
        Ok(SimulationResponse {
            gas_info,
            result: result?,
        })
    }

    fn handle_app_query(&self, path: &[String], req: &RequestQuery) -> ResponseQuery {
        let height = self.last_block_height();
        match path.get(1).map(String::as_str) {
            Some("simulate") => {
                let response = match self.simulate(&req.data) {
                    Ok(response) => response,
                    Err(err) => return ResponseQuery::from_error(&err),
                };
                match serde_json::to_vec(&response) {
                    Ok(value) => ResponseQuery::with_value(value, height),
                    Err(e) => ResponseQuery::from_error(&TxError::Internal(format!(
                        "failed to encode simulation response: {e}"
                    ))),
                }
            }
            Some("version") => {
                ResponseQuery::with_value(self.config.app_version.clone().into_bytes(), height)
            }
            _ => ResponseQuery::from_error(&TxError::UnknownRequest(format!(
                "unknown query: {}",
                req.path
            ))),
        }
    }

    fn handle_store_query(&self, path: &[String], req: &RequestQuery) -> ResponseQuery {
        let height = match req.height {
            0 => self.last_block_height(),
            height => height,
        };
        if req.prove && height <= 1 {
            return ResponseQuery::from_error(&TxError::InvalidRequest(
                "cannot query with proof when height <= 1; please provide a valid height"
                    .to_string(),
            ));
        }

        let query = StoreQuery {
            path: format!("/{}", path[1..].join("/")),
            data: req.data.clone(),
            height,
            prove: req.prove,
        };
        match self.cms.query(&query) {
            Ok(res) => ResponseQuery {
                key: res.key,
                value: res.value,
                proof: res.proof,
                height: res.height,
                ..ResponseQuery::with_value(Vec::new(), res.height)
            },
            Err(e) => ResponseQuery {
                height,
                ..ResponseQuery::from_error(&store_query_error(e))
            },
        }
    }

    fn handle_p2p_query(&self, path: &[String]) -> ResponseQuery {
        // "/p2p/filter/{addr,id}/<value>"
        if path.len() >= 4 && path[1] == "filter" {
            let filter = match path[2].as_str() {
                "addr" => Some(&self.addr_peer_filter),
                "id" => Some(&self.id_peer_filter),
                _ => None,
            };
            if let Some(filter) = filter {
                return match filter {
                    Some(filter) => filter(path[3].as_str()),
                    None => ResponseQuery::default(),
                };
            }
        }
        ResponseQuery::from_error(&TxError::UnknownRequest(
            "expected p2p filter query".to_string(),
        ))
    }

    fn handle_custom_query(&self, path: &[String], req: &RequestQuery) -> ResponseQuery {
        let Some(route) = path.get(1) else {
            return ResponseQuery::from_error(&TxError::UnknownRequest(
                "no route for custom query specified".to_string(),
            ));
        };
        let Some(querier) = self.query_router.route(route) else {
            return ResponseQuery::from_error(&TxError::UnknownRequest(format!(
                "no custom querier found for route {route}"
            )));
        };

        let latest = self.last_block_height();
        let height = match req.height {
            0 => latest,
            height => height,
        };
        if height > latest {
            return ResponseQuery::from_error(&TxError::InvalidRequest(format!(
                "cannot query with height in the future; please provide a valid height (latest height: {latest})"
            )));
        }
        if req.prove && height <= 1 {
            return ResponseQuery::from_error(&TxError::InvalidRequest(
                "cannot query with proof when height <= 1; please provide a valid height"
                    .to_string(),
            ));
        }

        let view = match self.cms.view_at(height) {
            Ok(view) => view,
            Err(e) => {
                return ResponseQuery::from_error(&TxError::InvalidRequest(format!(
                    "failed to load state at height {height}; {e} (latest height: {latest})"
                )))
            }
        };
        let header = self.check_context().header().clone();
        let ctx = self
            .new_context(Arc::new(CacheStore::new(view)), header, true)
            .with_block_height(height);

        match querier(&ctx, &path[2..], req) {
            Ok(value) => ResponseQuery::with_value(value, height),
            Err(err) => ResponseQuery {
                height,
                ..ResponseQuery::from_error(&err)
            },
        }
    }
}
