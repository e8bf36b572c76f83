//! Shared process state handed to every handler: one struct holding every collaborator a route
//! needs, built once at startup and cloned cheaply per request via `Arc`.

use std::sync::Arc;

use crate::{
    compat::ProfileRegistry,
    config::Config,
    discovery::Discovery,
    identity::UserDirectory,
    ingest::ShareNotifier,
    shares::{IncomingShareRepo, OutgoingShareRepo},
    token::TokenStore,
};

/// This instance's own discovery document, served at `/.well-known/ocm`.
pub fn own_discovery_document(config: &Config) -> Discovery {
    let origin = config.instance.public_origin.trim_end_matches('/');
    let mut token_end_point = None;
    if config.token_exchange.enabled {
        token_end_point = Some(format!("{origin}/{}", config.token_exchange.path));
    }

    Discovery {
        enabled: true,
        api_version: "1.1".to_string(),
        end_point: format!("{origin}/ocm"),
        provider: origin.to_string(),
        token_end_point,
        resource_types: vec![crate::discovery::ResourceType {
            name: "file".to_string(),
            share_types: vec!["user".to_string(), "group".to_string()],
            protocols: [("webdav".to_string(), "/webdav/ocm".to_string())]
                .into_iter()
                .collect(),
        }],
        capabilities: if config.signature.advertise_http_request_signatures {
            vec!["http-sig".to_string()]
        } else {
            vec![]
        },
        criteria: vec![],
        public_keys: vec![],
        invite_accept_dialog: None,
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub own_discovery: Arc<Discovery>,
    pub profiles: Arc<ProfileRegistry>,
    pub incoming_shares: Arc<dyn IncomingShareRepo>,
    pub outgoing_shares: Arc<dyn OutgoingShareRepo>,
    pub user_directory: Arc<dyn UserDirectory>,
    pub token_store: Arc<TokenStore>,
    pub notifier: Arc<dyn ShareNotifier>,
}
