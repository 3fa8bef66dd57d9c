//! Ordered fallback chains.
//!
//! A chain is a slice of strategies tried in order against a shared context;
//! the first one that returns `Ok` wins and the rest are skipped. Keeping the
//! policy as data lets the order be tested without a browser.

use async_trait::async_trait;
use std::fmt;
use tracing::{debug, warn};

#[async_trait]
pub trait Strategy<C: ?Sized + Send>: Send + Sync {
    type Output: Send;
    type Error: fmt::Display + Send;

    fn name(&self) -> &str;

    async fn attempt(&self, ctx: &mut C) -> Result<Self::Output, Self::Error>;
}

/// Winning attempt of a chain.
#[derive(Debug)]
pub struct Success<T> {
    pub index: usize,
    pub name: String,
    pub output: T,
}

/// Every strategy failed; failures are kept in attempt order.
#[derive(Debug)]
pub struct ChainExhausted<E> {
    pub failures: Vec<(String, E)>,
}

impl<E> ChainExhausted<E> {
    pub fn attempts(&self) -> usize {
        self.failures.len()
    }
}

impl<E: fmt::Display> fmt::Display for ChainExhausted<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} strategies failed", self.failures.len())?;
        for (name, err) in &self.failures {
            write!(f, "; {name}: {err}")?;
        }
        Ok(())
    }
}

pub async fn run_chain<C, S>(
    strategies: &[S],
    ctx: &mut C,
) -> Result<Success<S::Output>, ChainExhausted<S::Error>>
where
    C: ?Sized + Send,
    S: Strategy<C>,
{
    let mut failures = Vec::new();
    for (index, strategy) in strategies.iter().enumerate() {
        match strategy.attempt(ctx).await {
            Ok(output) => {
                if index > 0 {
                    warn!(
                        strategy = strategy.name(),
                        index, "primary strategy failed, fallback succeeded"
                    );
                }
                return Ok(Success {
                    index,
                    name: strategy.name().to_string(),
                    output,
                });
            }
            Err(e) => {
                debug!(strategy = strategy.name(), error = %e, "strategy failed");
                failures.push((strategy.name().to_string(), e));
            }
        }
    }
    Err(ChainExhausted { failures })
}
