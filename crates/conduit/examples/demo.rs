//! Demo server with a counter shared between two versions.
//!
//! ```text
//! cargo run -p conduit --example demo
//! curl -X POST localhost:8080/v1/demo/sum -d '{"x":1000,"y":500}'
//! curl -X POST localhost:8080/v1beta/demo/count -d '{}'
//! ```
//!
//! Settings come from `conduit.toml` when present, then `.env`, then
//! `CONDUIT_*` variables.

use conduit::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Default)]
struct Counter(AtomicU64);

#[derive(Deserialize)]
struct SumRequest {
    x: i64,
    y: i64,
}

impl Request for SumRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.x.checked_add(self.y).is_none() {
            return Err(ValidationError::new("sum overflows"));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SumResponse {
    sum: i64,
}

impl JsonResponse for SumResponse {}

#[derive(Deserialize)]
struct CountRequest {}

impl Request for CountRequest {}

#[derive(Serialize)]
struct CountResponse {
    calls: u64,
}

impl JsonResponse for CountResponse {}

struct DemoService {
    counter: Arc<Counter>,
}

impl DemoService {
    async fn sum(self: Arc<Self>, _ctx: Context, req: SumRequest) -> anyhow::Result<Option<SumResponse>> {
        self.counter.0.fetch_add(1, Ordering::Relaxed);
        Ok(Some(SumResponse { sum: req.x + req.y }))
    }
}

impl Service for DemoService {
    fn actions(set: &mut ActionSet<Self>) {
        set.action("Sum", Self::sum);
    }
}

struct DemoHandler {
    counter: Arc<Counter>,
}

impl Service for DemoHandler {
    fn anonymous(&self) -> bool {
        true
    }

    fn actions(set: &mut ActionSet<Self>) {
        set.action("Count", |s: Arc<Self>, ctx: Context, _req: CountRequest| async move {
            info!(request_id = ?ctx.request_id(), "counting");
            Ok::<_, anyhow::Error>(Some(CountResponse {
                calls: s.counter.0.load(Ordering::Relaxed),
            }))
        });
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::new()
        .with_development()
        .with_optional_file("conduit.toml")?
        .with_dotenv()?
        .with_env_prefix("CONDUIT")
        .load()?;

    init_logging(&config.to_log_config())?;

    App::new(config.to_server_config())
        .provide(|| Arc::new(Counter::default()))
        .map(
            VersionGroup::new(1)
                .stable(|counter: Arc<Counter>| Arc::new(DemoService { counter }))
                .beta(|counter: Arc<Counter>| Arc::new(DemoHandler { counter })),
        )
        .run()
        .await?;

    Ok(())
}
