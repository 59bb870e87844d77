//! Offline-first caching proxy.
//!
//! Every incoming HTTP/1.1 request becomes a [`FetchEvent`] for the active
//! controller. Intercepted requests are answered from the controller's
//! outcome and tagged with `x-klangreise-source`; everything else is
//! forwarded through the network client unchanged.

use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use klangreise_client::fetch::is_hop_by_hop;
use klangreise_client::{Network, resolve, same_origin};
use klangreise_core::{Destination, Request, Response};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::controller::{FetchEvent, FetchOutcome, ResponseSource};
use crate::error::ProxyError;
use crate::registration::Registration;

/// Response header naming where an intercepted response came from.
pub const SOURCE_HEADER: &str = "x-klangreise-source";

/// Request header carrying the declared destination.
const DEST_HEADER: &str = "sec-fetch-dest";

#[derive(Clone)]
pub struct ProxyServer {
    registration: Arc<Registration>,
    network: Arc<dyn Network>,
    origin: Url,
}

impl ProxyServer {
    pub fn new(registration: Arc<Registration>, network: Arc<dyn Network>, origin: Url) -> Self {
        Self { registration, network, origin }
    }

    /// Accept connections until `shutdown` resolves. Each connection is
    /// served on its own task.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()>,
    {
        let addr = listener.local_addr()?;
        tracing::info!(%addr, origin = %self.origin, "proxy listening");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let server = self.clone();
                            tokio::spawn(async move { server.handle_connection(stream, peer).await });
                        }
                        Err(e) => tracing::error!(error = %e, "error accepting connection"),
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn handle_connection(self, stream: TcpStream, peer: SocketAddr) {
        let io = TokioIo::new(stream);
        let service = service_fn(move |req: hyper::Request<Incoming>| {
            let server = self.clone();
            async move { Ok::<_, Infallible>(server.handle(req).await) }
        });

        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
            tracing::debug!(%peer, error = %e, "connection closed with error");
        }
    }

    /// Answer one HTTP request.
    pub async fn handle<B>(&self, req: hyper::Request<B>) -> hyper::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Display,
    {
        let result = match self.to_request(req).await {
            Ok(request) => self.dispatch(request).await,
            Err(e) => Err(e),
        };
        result.unwrap_or_else(|e| {
            tracing::debug!(code = e.code(), error = %e, "request failed");
            e.into()
        })
    }

    async fn dispatch(&self, request: Request) -> Result<hyper::Response<Full<Bytes>>, ProxyError> {
        let Some(controller) = self.registration.controller().await else {
            return self.passthrough(&request).await;
        };

        let mut event = FetchEvent::new(request);
        let outcome = controller.handle_fetch(&mut event).await;

        let response = match outcome {
            FetchOutcome::Passthrough => self.passthrough(event.request()).await,
            FetchOutcome::Respond { response, source } => relay(response, Some(source)),
            FetchOutcome::Unavailable => Err(ProxyError::Unavailable(event.request().url.to_string())),
        };

        if event.pending() > 0 {
            tokio::spawn(event.settled());
        }
        response
    }

    async fn passthrough(&self, request: &Request) -> Result<hyper::Response<Full<Bytes>>, ProxyError> {
        let response = self.network.fetch(request).await?;
        relay(response, None)
    }

    async fn to_request<B>(&self, req: hyper::Request<B>) -> Result<Request, ProxyError>
    where
        B: Body,
        B::Error: Display,
    {
        let (parts, body) = req.into_parts();

        let target = parts.uri.to_string();
        let url = resolve(&self.origin, &target).map_err(|e| ProxyError::BadRequest(format!("{target}: {e}")))?;
        if !same_origin(&url, &self.origin) {
            return Err(ProxyError::CrossOrigin(url.to_string()));
        }

        let destination = parts
            .headers
            .get(DEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(Destination::parse)
            .unwrap_or(Destination::Empty);

        let body = body
            .collect()
            .await
            .map_err(|e| ProxyError::BadRequest(format!("failed to read request body: {e}")))?
            .to_bytes();

        let mut request = Request::new(parts.method.as_str(), url, destination).with_body(body);
        for (name, value) in &parts.headers {
            if let Ok(value) = value.to_str() {
                request = request.with_header(name.as_str(), value);
            }
        }
        Ok(request)
    }
}

/// Convert a fetched or cached response into an HTTP response.
fn relay(response: Response, source: Option<ResponseSource>) -> Result<hyper::Response<Full<Bytes>>, ProxyError> {
    let mut builder = hyper::Response::builder().status(response.status);
    for (name, value) in response
        .headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name) && !name.eq_ignore_ascii_case("content-encoding"))
    {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(source) = source {
        builder = builder.header(SOURCE_HEADER, source.as_str());
    }

    builder
        .body(Full::new(response.body))
        .map_err(|e| ProxyError::BadGateway(format!("{}: {e}", response.url)))
}
