//! Per-request dispatch
//!
//! Requests for the administrative host go to the built-in endpoints; every
//! other request is resolved, forwarded and rewritten.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;

use crate::dns::{AddressUpdater, UpdateRequest};
use crate::error::ProxyError;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::proxy::directory::Directory;
use crate::proxy::resolver::{Resolver, Scheme};
use crate::proxy::rewriter::ResponseRewriter;
use crate::proxy::upstream::Forwarder;

pub struct Gateway {
    admin_host: String,
    directory: Arc<Directory>,
    resolver: Resolver,
    rewriter: ResponseRewriter,
    forwarder: Forwarder,
    updater: AddressUpdater,
}

impl Gateway {
    pub fn new(
        admin_host: impl Into<String>,
        directory: Arc<Directory>,
        forwarder: Forwarder,
        updater: AddressUpdater,
    ) -> Self {
        let admin_host = admin_host.into();
        Self {
            resolver: Resolver::new(Arc::clone(&directory)),
            rewriter: ResponseRewriter::new(admin_host.clone()),
            admin_host,
            directory,
            forwarder,
            updater,
        }
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }

    /// Produces the response for one client request. Never fails: errors
    /// become error responses.
    pub async fn handle(&self, request: &Request, peer: SocketAddr) -> Response {
        let Some(host) = request.host() else {
            return Response::error(StatusCode::BadRequest);
        };

        if self.is_admin_host(host) {
            return self.handle_admin(request).await;
        }

        match self.proxy(request, host, peer).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    ProxyError::NotFound(_) => {
                        tracing::debug!(host = %host, "No route for host")
                    }
                    _ => tracing::warn!(host = %host, path = %request.path, error = %e, "Proxy request failed"),
                }
                Response::error(e.status_code())
            }
        }
    }

    async fn proxy(&self, request: &Request, host: &str, peer: SocketAddr) -> crate::error::Result<Response> {
        let client_scheme = client_scheme(request);
        let route = self.resolver.resolve(host, client_scheme)?;

        tracing::debug!(
            host = %host,
            backend = %route.url,
            method = request.method.as_str(),
            path = %request.path,
            "Forwarding request"
        );

        let mut response = self
            .forwarder
            .forward(request, &route.url, client_scheme, peer)
            .await?;

        if request.method != Method::HEAD {
            self.rewriter.rewrite(&mut response, &route.entry)?;
        }

        tracing::info!(
            host = %host,
            status = response.status.as_u16(),
            method = request.method.as_str(),
            path = %request.path,
            "Request proxied"
        );
        Ok(response)
    }

    async fn handle_admin(&self, request: &Request) -> Response {
        if request.method != Method::GET && request.method != Method::HEAD {
            return Response::error(StatusCode::MethodNotAllowed);
        }

        match request.path_only() {
            "/dns/update" => {
                let update = UpdateRequest::from_query(&request.query_params());
                match self.updater.update_address(&update).await {
                    Ok(count) => Response::json(
                        StatusCode::Ok,
                        &json!({ "message": "Success", "updated": count }),
                    ),
                    Err(ProxyError::BadRequest) => Response::json(
                        StatusCode::BadRequest,
                        &json!({ "message": "Invalid request" }),
                    ),
                    Err(e) => Response::json(e.status_code(), &json!({ "message": "Update failed" })),
                }
            }
            "/health" => Response::json(
                StatusCode::Ok,
                &json!({ "status": "ok", "entries": self.directory.len() }),
            ),
            _ => Response::not_found(),
        }
    }

    /// Compares hosts ignoring case and any `:port` suffix.
    fn is_admin_host(&self, host: &str) -> bool {
        strip_port(host).eq_ignore_ascii_case(strip_port(&self.admin_host))
    }
}

/// Scheme the client used to reach us. TLS is terminated in front of the
/// gateway, which reports it through `X-Forwarded-Proto`.
fn client_scheme(request: &Request) -> Scheme {
    match request.header("X-Forwarded-Proto") {
        Some(proto) if proto.trim().eq_ignore_ascii_case("https") => Scheme::Https,
        _ => Scheme::Http,
    }
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return host.split_once(']').map_or(host, |(h, _)| &host[..h.len() + 1]);
    }
    match host.rsplit_once(':') {
        Some((h, port)) if !h.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) => h,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_port_variants() {
        assert_eq!(strip_port("admin.example.com:8080"), "admin.example.com");
        assert_eq!(strip_port("admin.example.com"), "admin.example.com");
        assert_eq!(strip_port("[::1]:80"), "[::1]");
    }
}
