use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use warp::{Filter, Rejection, Reply};

use super::routes::{
    ingest_route, list_messages_route, messages_text_route, reconcile_route, status_route,
};
use crate::controller::Controller;
use crate::error_handling::types::WebError;

/// Web server for the HTTP API and the plain text message listing
pub struct WebServer {
    controller: Arc<Controller>,
}

impl WebServer {
    /// Create a new WebServer instance
    pub fn new(controller: Arc<Controller>) -> Self {
        Self { controller }
    }

    pub fn routes(&self) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
        messages_text_route(self.controller.clone())
            .or(list_messages_route(self.controller.clone()))
            .or(reconcile_route(self.controller.clone()))
            .or(status_route(self.controller.clone()))
            .or(ingest_route(self.controller.clone()))
    }

    /// Serve until the returned future is dropped.
    pub async fn start(&self, bind_address: &str) -> Result<(), WebError> {
        let addr: SocketAddr = bind_address
            .parse()
            .map_err(|_| WebError::BadBindAddress(bind_address.to_string()))?;

        info!("Web interface listening on http://{}", addr);
        warp::serve(self.routes()).run(addr).await;
        Ok(())
    }
}
