//! Ordered, sequential stage execution.
//!
//! A pipeline is a [`StageProvider`] handing out [`Stage`]s one at a time.
//! [`execute`] runs them in order, threading a single carry-over value from
//! each successful stage into the next, and classifies every failure as fatal
//! (abort the rest) or ignorable (record it and move on).

pub mod render;
pub mod status;

use crate::context::{Context, ContextError};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub use render::{Position, RecordingRenderer, RenderEvent, Renderer, TerminalRenderer};
pub use status::{StatusHandle, StatusSnapshot};

#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Fatal(#[from] AppError),

    #[error(transparent)]
    Ignorable(AppError),
}

impl From<ContextError> for StageError {
    fn from(err: ContextError) -> Self {
        StageError::Fatal(err.into())
    }
}

/// Marks `err` as failing only the current stage.
pub fn ignore_error(err: impl Into<AppError>) -> StageError {
    StageError::Ignorable(err.into())
}

#[async_trait]
pub trait StageFn<T: Send + 'static>: Send + Sync {
    async fn run(
        &self,
        ctx: &Context,
        status: &StatusHandle,
        input: T,
    ) -> std::result::Result<T, StageError>;
}

#[async_trait]
impl<T, F, Fut> StageFn<T> for F
where
    T: Send + 'static,
    F: Fn(Context, StatusHandle, T) -> Fut + Send + Sync,
    Fut: Future<Output = std::result::Result<T, StageError>> + Send,
{
    async fn run(
        &self,
        ctx: &Context,
        status: &StatusHandle,
        input: T,
    ) -> std::result::Result<T, StageError> {
        (self)(ctx.clone(), status.clone(), input).await
    }
}

pub struct Stage<T: Send + 'static> {
    pub progress_msg: String,
    pub success_msg: String,
    pub failure_msg: String,
    func: Box<dyn StageFn<T>>,
}

impl<T: Send + 'static> Stage<T> {
    pub fn new(
        progress_msg: impl Into<String>,
        success_msg: impl Into<String>,
        failure_msg: impl Into<String>,
        func: impl StageFn<T> + 'static,
    ) -> Self {
        Self {
            progress_msg: progress_msg.into(),
            success_msg: success_msg.into(),
            failure_msg: failure_msg.into(),
            func: Box::new(func),
        }
    }
}

impl<T: Send + 'static> std::fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("progress_msg", &self.progress_msg)
            .field("success_msg", &self.success_msg)
            .field("failure_msg", &self.failure_msg)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait StageProvider<T: Send + 'static>: Send {
    async fn next(&mut self, ctx: &Context) -> Result<Option<Stage<T>>>;

    /// Number of stages, once known.
    fn total(&self) -> Option<usize> {
        None
    }
}

pub struct FixedProvider<T: Send + 'static> {
    stages: VecDeque<Stage<T>>,
    total: usize,
}

impl<T: Send + 'static> FixedProvider<T> {
    pub fn new(stages: Vec<Stage<T>>) -> Self {
        let total = stages.len();
        Self {
            stages: stages.into(),
            total,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> StageProvider<T> for FixedProvider<T> {
    async fn next(&mut self, _ctx: &Context) -> Result<Option<Stage<T>>> {
        Ok(self.stages.pop_front())
    }

    fn total(&self) -> Option<usize> {
        Some(self.total)
    }
}

pub type BuildFuture<T> = Pin<Box<dyn Future<Output = Result<Vec<Stage<T>>>> + Send>>;

type BuildFn<T> = Box<dyn FnOnce(Context) -> BuildFuture<T> + Send>;

/// Computes its stage list on the first pull, e.g. after a query reveals
/// which items need processing.
pub struct LazyProvider<T: Send + 'static> {
    build: Option<BuildFn<T>>,
    inner: Option<FixedProvider<T>>,
}

impl<T: Send + 'static> LazyProvider<T> {
    pub fn new<F>(build: F) -> Self
    where
        F: FnOnce(Context) -> BuildFuture<T> + Send + 'static,
    {
        Self {
            build: Some(Box::new(build)),
            inner: None,
        }
    }
}

#[async_trait]
impl<T: Send + 'static> StageProvider<T> for LazyProvider<T> {
    async fn next(&mut self, ctx: &Context) -> Result<Option<Stage<T>>> {
        if let Some(build) = self.build.take() {
            let stages = build(ctx.clone()).await?;
            self.inner = Some(FixedProvider::new(stages));
        }
        match self.inner.as_mut() {
            Some(inner) => inner.next(ctx).await,
            None => Ok(None),
        }
    }

    fn total(&self) -> Option<usize> {
        self.inner.as_ref().and_then(|inner| inner.total())
    }
}

/// Runs every stage `provider` yields, strictly one after another.
///
/// Returns the last successful stage's value. A fatal stage error is returned
/// as-is and stops the pipeline. Ignorable errors leave the carry-over value
/// untouched; once all stages ran they are returned together as
/// [`AppError::StagesFailed`].
pub async fn execute<T, P>(
    ctx: &Context,
    initial: T,
    provider: &mut P,
    renderer: &dyn Renderer,
) -> Result<T>
where
    T: Clone + Send + 'static,
    P: StageProvider<T> + ?Sized,
{
    let mut value = initial;
    let mut failures = Vec::new();
    let mut index = 0;

    loop {
        if let Some(err) = ctx.err() {
            tracing::debug!(error = %err, "pipeline interrupted before stage {}", index + 1);
            return Err(err.into());
        }
        let Some(stage) = provider.next(ctx).await? else {
            break;
        };
        index += 1;
        let position = Position {
            index,
            total: provider.total(),
        };

        renderer.pending(position, &stage.progress_msg);
        let (status, rx) = StatusHandle::new(stage.progress_msg.clone());
        renderer.running(position, &stage.progress_msg, rx);

        let outcome = stage.func.run(ctx, &status, value.clone()).await;
        drop(status);

        match outcome {
            Ok(next) => {
                renderer.succeeded(position, &stage.success_msg);
                value = next;
            }
            Err(StageError::Ignorable(err)) => {
                let detail = err.to_string();
                tracing::warn!(%position, error = %detail, "{}", stage.failure_msg);
                renderer.failed(position, &stage.failure_msg, &detail, true);
                failures.push(format!("{}: {}", stage.failure_msg, detail));
            }
            Err(StageError::Fatal(err)) => {
                renderer.failed(position, &stage.failure_msg, &err.to_string(), false);
                return Err(err);
            }
        }
    }

    if !failures.is_empty() {
        return Err(AppError::StagesFailed(failures));
    }
    Ok(value)
}
