use crate::resolver::EvaluationClient;
use crate::AccessManager;
use http::{HeaderValue, Request, Response};
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

pub const DEFAULT_CATEGORY_HEADER: &str = "X-User-Category";
pub const ACCESS_GRANTED_HEADER: &str = "X-Access-Granted";

/// Checks the caller's category against a flag variable before the inner service runs.
pub struct AccessLayer<C: EvaluationClient> {
    manager: Arc<AccessManager<C>>,
    flag_key: Arc<str>,
    variable_key: Arc<str>,
    header_name: String,
}

impl<C: EvaluationClient> Clone for AccessLayer<C> {
    fn clone(&self) -> Self {
        Self {
            manager: self.manager.clone(),
            flag_key: self.flag_key.clone(),
            variable_key: self.variable_key.clone(),
            header_name: self.header_name.clone(),
        }
    }
}

impl<C: EvaluationClient> AccessLayer<C> {
    pub fn new(manager: Arc<AccessManager<C>>, flag_key: &str, variable_key: &str) -> Self {
        Self {
            manager,
            flag_key: Arc::from(flag_key),
            variable_key: Arc::from(variable_key),
            header_name: DEFAULT_CATEGORY_HEADER.to_string(),
        }
    }

    pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
        self.header_name = name.into();
        self
    }
}

impl<S, C: EvaluationClient> Layer<S> for AccessLayer<C> {
    type Service = AccessMiddleware<S, C>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessMiddleware {
            inner,
            layer: self.clone(),
        }
    }
}

pub struct AccessMiddleware<S, C: EvaluationClient> {
    inner: S,
    layer: AccessLayer<C>,
}

impl<S: Clone, C: EvaluationClient> Clone for AccessMiddleware<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            layer: self.layer.clone(),
        }
    }
}

#[pin_project]
pub struct AccessFuture<F> {
    #[pin]
    inner: F,
    granted: Option<bool>,
}

impl<S, C, ReqBody, ResBody> Service<Request<ReqBody>> for AccessMiddleware<S, C>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    C: EvaluationClient + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = AccessFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let category = req
            .headers()
            .get(&self.layer.header_name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let granted = category.as_ref().map(|category| {
            self.layer
                .manager
                .check_access(&self.layer.flag_key, category, &self.layer.variable_key)
        });

        req.extensions_mut().insert(AccessState {
            category,
            granted: granted.unwrap_or(false),
        });

        AccessFuture {
            inner: self.inner.call(req),
            granted,
        }
    }
}

impl<F, ResBody, E> Future for AccessFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = Result<Response<ResBody>, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        match this.inner.poll(cx) {
            Poll::Ready(Ok(mut response)) => {
                if let Some(granted) = this.granted.take() {
                    let value = if granted { "true" } else { "false" };
                    response
                        .headers_mut()
                        .insert(ACCESS_GRANTED_HEADER, HeaderValue::from_static(value));
                }
                Poll::Ready(Ok(response))
            }
            other => other,
        }
    }
}

/// Outcome of the access check, stored in request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessState {
    pub category: Option<String>,
    pub granted: bool,
}

pub trait RequestExt {
    fn access_state(&self) -> Option<&AccessState>;

    fn access_granted(&self) -> bool {
        self.access_state().map(|state| state.granted).unwrap_or(false)
    }
}

impl<T> RequestExt for Request<T> {
    fn access_state(&self) -> Option<&AccessState> {
        self.extensions().get::<AccessState>()
    }
}
