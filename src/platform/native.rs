//! Native (non-wasm) platform pieces

use std::time::Duration;

use async_trait::async_trait;
use futures::executor::LocalSpawner;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use web_time::Instant;

use super::{Clock, Spawner};

/// Real-time clock backed by the async-io reactor
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

#[async_trait(?Send)]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        smol::Timer::after(duration).await;
    }
}

impl Spawner for LocalSpawner {
    fn spawn_local(&self, task: LocalBoxFuture<'static, ()>) {
        if let Err(err) = LocalSpawnExt::spawn_local(self, task) {
            log::warn!("Dropped background task: {err}");
        }
    }
}
