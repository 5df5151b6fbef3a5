use bytes::{Buf, Bytes, BytesMut};
use http::HeaderMap;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

pin_project! {
    /// A response body that is either passed through or fully buffered.
    ///
    /// Responses the pipeline decides to process are read into memory first,
    /// so the processed variant holds the final bytes and any trailers of the
    /// original body.
    #[project = SqueezeBodyProj]
    #[allow(missing_docs)]
    pub enum SqueezeBody<B> {
        /// Processed body, emitted as a single data frame.
        Buffered {
            data: Option<Bytes>,
            trailers: Option<HeaderMap>,
        },
        /// Untouched inner body.
        Passthrough {
            #[pin]
            inner: B,
        },
    }
}

impl<B> SqueezeBody<B> {
    /// Creates a body that yields `data` followed by `trailers`.
    pub fn buffered(data: Bytes, trailers: Option<HeaderMap>) -> Self {
        Self::Buffered {
            data: Some(data).filter(|data| !data.is_empty()),
            trailers,
        }
    }

    /// Creates a body that forwards `inner` unchanged.
    pub fn passthrough(inner: B) -> Self {
        Self::Passthrough { inner }
    }
}

impl<B> Body for SqueezeBody<B>
where
    B: Body,
    B::Data: Buf,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    type Data = Bytes;
    type Error = io::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.project() {
            SqueezeBodyProj::Passthrough { inner } => match inner.poll_frame(cx) {
                Poll::Pending => Poll::Pending,
                Poll::Ready(None) => Poll::Ready(None),
                Poll::Ready(Some(Ok(frame))) => {
                    Poll::Ready(Some(Ok(frame.map_data(into_bytes))))
                }
                Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(io::Error::other(e.into())))),
            },
            SqueezeBodyProj::Buffered { data, trailers } => {
                if let Some(data) = data.take() {
                    return Poll::Ready(Some(Ok(Frame::data(data))));
                }
                Poll::Ready(trailers.take().map(|trailers| Ok(Frame::trailers(trailers))))
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        match self {
            SqueezeBody::Passthrough { inner } => inner.is_end_stream(),
            SqueezeBody::Buffered { data, trailers } => data.is_none() && trailers.is_none(),
        }
    }

    fn size_hint(&self) -> SizeHint {
        match self {
            SqueezeBody::Passthrough { inner } => inner.size_hint(),
            SqueezeBody::Buffered { data, .. } => {
                SizeHint::with_exact(data.as_ref().map_or(0, |data| data.len() as u64))
            }
        }
    }
}

fn into_bytes<D: Buf>(mut data: D) -> Bytes {
    let mut bytes = BytesMut::with_capacity(data.remaining());
    while data.has_remaining() {
        let chunk = data.chunk();
        bytes.extend_from_slice(chunk);
        let len = chunk.len();
        data.advance(len);
    }
    bytes.freeze()
}
