use crate::body::SqueezeBody;
use crate::error::BoxError;
use crate::headers;
use crate::pipeline::{RequestInfo, Squeeze};
use bytes::{Buf, BytesMut};
use http::response::Parts;
use http::{HeaderMap, Response};
use http_body::Body;
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

pin_project! {
    /// Future for squeeze service responses.
    pub struct ResponseFuture<F, B> {
        #[pin]
        state: State<F, B>,
        squeeze: Arc<Squeeze>,
        request: RequestInfo,
    }
}

pin_project! {
    #[project = StateProj]
    enum State<F, B> {
        /// Waiting for the inner service.
        Inner {
            #[pin]
            future: F,
        },
        /// Reading the whole response body into memory.
        Buffering {
            #[pin]
            body: B,
            parts: Option<Parts>,
            buffer: BytesMut,
            trailers: Option<HeaderMap>,
        },
    }
}

impl<F, B> ResponseFuture<F, B> {
    pub(crate) fn new(future: F, squeeze: Arc<Squeeze>, request: RequestInfo) -> Self {
        Self {
            state: State::Inner { future },
            squeeze,
            request,
        }
    }
}

impl<F, B, E> Future for ResponseFuture<F, B>
where
    F: Future<Output = Result<Response<B>, E>>,
    E: Into<BoxError>,
    B: Body,
    B::Data: Buf,
    B::Error: Into<BoxError>,
{
    type Output = Result<Response<SqueezeBody<B>>, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut this = self.project();

        loop {
            match this.state.as_mut().project() {
                StateProj::Inner { future } => {
                    let response = ready!(future.poll(cx)).map_err(Into::<BoxError>::into)?;
                    let (parts, body) = response.into_parts();

                    let len = headers::content_length(&parts.headers)
                        .or_else(|| body.size_hint().exact().map(|len| len as usize));
                    if let Err(reason) = this.squeeze.plan(this.request, &parts, len) {
                        tracing::trace!(path = %this.request.path, ?reason, "passing response through");
                        return Poll::Ready(Ok(Response::from_parts(
                            parts,
                            SqueezeBody::passthrough(body),
                        )));
                    }

                    let capacity = len.unwrap_or(0);
                    this.state.set(State::Buffering {
                        body,
                        parts: Some(parts),
                        buffer: BytesMut::with_capacity(capacity),
                        trailers: None,
                    });
                }
                StateProj::Buffering {
                    mut body,
                    parts,
                    buffer,
                    trailers,
                } => {
                    while let Some(frame) = ready!(body.as_mut().poll_frame(cx)) {
                        let frame = frame.map_err(Into::<BoxError>::into)?;
                        match frame.into_data() {
                            Ok(mut data) => {
                                while data.has_remaining() {
                                    let chunk = data.chunk();
                                    buffer.extend_from_slice(chunk);
                                    let len = chunk.len();
                                    data.advance(len);
                                }
                            }
                            Err(frame) => {
                                if let Ok(frame_trailers) = frame.into_trailers() {
                                    trailers
                                        .get_or_insert_with(HeaderMap::new)
                                        .extend(frame_trailers);
                                }
                            }
                        }
                    }

                    let Some(mut parts) = parts.take() else {
                        panic!("ResponseFuture polled after completion");
                    };
                    let original = std::mem::take(buffer).freeze();

                    let data = match this.squeeze.process(this.request, &mut parts, original.clone())
                    {
                        Ok(data) => data,
                        Err(err) => {
                            tracing::error!(path = %this.request.path, error = %err, "failed to squeeze response, sending it unmodified");
                            original
                        }
                    };

                    return Poll::Ready(Ok(Response::from_parts(
                        parts,
                        SqueezeBody::buffered(data, trailers.take()),
                    )));
                }
            }
        }
    }
}
