use crate::gate::Gate;
use crate::rate_limit::EndpointClass;
use axum::http::Request;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

/// A layer that runs every request through a [`Gate`] for one endpoint class.
#[derive(Clone, Debug)]
pub struct GateLayer {
    gate: Arc<Gate>,
    endpoint: EndpointClass,
}

impl GateLayer {
    /// Create a new gate layer.
    pub fn new(gate: Arc<Gate>, endpoint: EndpointClass) -> Self {
        Self { gate, endpoint }
    }
}

impl<S> Layer<S> for GateLayer {
    type Service = GateService<S>;

    fn layer(&self, service: S) -> Self::Service {
        GateService { inner: service, gate: self.gate.clone(), endpoint: self.endpoint }
    }
}

/// Middleware service that enforces the gate.
///
/// Admitted requests carry their [`crate::gate::Admission`] in the request extensions;
/// rejected ones are answered directly with the error's HTTP rendering.
#[derive(Clone, Debug)]
pub struct GateService<S> {
    inner: S,
    gate: Arc<Gate>,
    endpoint: EndpointClass,
}

impl<S, B> Service<Request<B>> for GateService<S>
where
    S: Service<Request<B>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
    B: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let gate = self.gate.clone();
        let endpoint = self.endpoint;
        // Keep the service that was driven to readiness; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            match gate.check(req.headers(), endpoint).await {
                Ok(admission) => {
                    req.extensions_mut().insert(admission);
                    inner.call(req).await
                }
                Err(e) => Ok(e.into_response()),
            }
        })
    }
}
