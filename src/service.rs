use crate::body::SqueezeBody;
use crate::error::BoxError;
use crate::future::ResponseFuture;
use crate::pipeline::{RequestInfo, Squeeze};
use http::Request;
use http_body::Body;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::Service;

/// A Tower service that minifies and compresses HTTP response bodies.
#[derive(Debug, Clone)]
pub struct SqueezeService<S> {
    inner: S,
    squeeze: Arc<Squeeze>,
}

impl<S> SqueezeService<S> {
    /// Creates a new squeeze service wrapping the given inner service.
    pub fn new(inner: S, squeeze: Arc<Squeeze>) -> Self {
        Self { inner, squeeze }
    }

    /// Returns a reference to the inner service.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Returns a mutable reference to the inner service.
    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consumes this service, returning the inner service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for SqueezeService<S>
where
    S: Service<Request<ReqBody>, Response = http::Response<ResBody>>,
    S::Error: Into<BoxError>,
    ResBody: Body,
    ResBody::Error: Into<BoxError>,
{
    type Response = http::Response<SqueezeBody<ResBody>>;
    type Error = BoxError;
    type Future = ResponseFuture<S::Future, ResBody>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The response only sees the request through what is captured here
        let request = RequestInfo::from_request(&req);

        let inner = self.inner.call(req);

        ResponseFuture::new(inner, Arc::clone(&self.squeeze), request)
    }
}
