//! Retrying client.
//!
//! Every logical call gets its own copy of the backoff policy, reset before
//! the first attempt, so concurrent calls do not share retry state.
//!
//! A [`RetryingStream`] that hits an error after it was opened re-requests
//! the whole stream from the beginning. Items already returned are
//! delivered again unless the route's stream is idempotent from its start.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{Backoff, Client, ClientStream, RequestTemplate};
use crate::error::{RapidError, Result};

/// Wraps a [`Client`] and retries failed calls according to a [`Backoff`].
pub struct RetryingClient<C, B> {
    inner: Arc<C>,
    policy: B,
}

impl<C: Client + 'static, B: Backoff + Clone + 'static> RetryingClient<C, B> {
    pub fn new(inner: C, mut policy: B) -> Self {
        policy.reset();
        Self {
            inner: Arc::new(inner),
            policy,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    fn fresh_backoff(&self) -> B {
        let mut backoff = self.policy.clone();
        backoff.reset();
        backoff
    }
}

/// Delay before retrying after `err`, or `None` to give up.
fn retry_delay<B: Backoff>(backoff: &mut B, request: &RequestTemplate, err: &RapidError) -> Option<Duration> {
    if !err.is_retryable() {
        return None;
    }
    let delay = backoff.next_backoff()?;
    tracing::warn!(
        request = %request,
        error = %err,
        delay_ms = delay.as_millis() as u64,
        "request failed, retrying"
    );
    Some(delay)
}

async fn open<C: Client + ?Sized, B: Backoff>(
    inner: &C,
    request: &RequestTemplate,
    backoff: &mut B,
) -> Result<Box<dyn ClientStream>> {
    loop {
        match inner.stream(request).await {
            Ok(stream) => return Ok(stream),
            Err(err) => match retry_delay(backoff, request, &err) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return Err(err),
            },
        }
    }
}

#[async_trait]
impl<C, B> Client for RetryingClient<C, B>
where
    C: Client + 'static,
    B: Backoff + Clone + 'static,
{
    async fn call(&self, request: &RequestTemplate) -> Result<Value> {
        let mut backoff = self.fresh_backoff();
        loop {
            match self.inner.call(request).await {
                Ok(value) => return Ok(value),
                Err(err) => match retry_delay(&mut backoff, request, &err) {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => return Err(err),
                },
            }
        }
    }

    async fn stream(&self, request: &RequestTemplate) -> Result<Box<dyn ClientStream>> {
        let mut backoff = self.fresh_backoff();
        let current = open(self.inner.as_ref(), request, &mut backoff).await?;
        Ok(Box::new(RetryingStream {
            inner: self.inner.clone(),
            request: request.clone(),
            backoff,
            current: Some(current),
            done: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}

/// A stream that re-opens itself after a failure.
pub struct RetryingStream<C, B> {
    inner: Arc<C>,
    request: RequestTemplate,
    backoff: B,
    current: Option<Box<dyn ClientStream>>,
    done: bool,
}

#[async_trait]
impl<C, B> ClientStream for RetryingStream<C, B>
where
    C: Client + 'static,
    B: Backoff + 'static,
{
    async fn next(&mut self) -> Result<Option<Value>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let stream = match self.current.as_mut() {
                Some(stream) => stream,
                None => {
                    let opened = match open(self.inner.as_ref(), &self.request, &mut self.backoff).await {
                        Ok(stream) => stream,
                        Err(err) => {
                            self.done = true;
                            return Err(err);
                        }
                    };
                    self.current.insert(opened)
                }
            };

            let err = match stream.next().await {
                Ok(item) => return Ok(item),
                Err(err) => err,
            };
            if let Some(mut failed) = self.current.take() {
                let _ = failed.close().await;
            }
            match retry_delay(&mut self.backoff, &self.request, &err) {
                Some(delay) => {
                    tracing::warn!(request = %self.request, "re-opening stream from the start");
                    tokio::time::sleep(delay).await;
                }
                None => {
                    self.done = true;
                    return Err(err);
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.done = true;
        match self.current.take() {
            Some(mut stream) => stream.close().await,
            None => Ok(()),
        }
    }
}
