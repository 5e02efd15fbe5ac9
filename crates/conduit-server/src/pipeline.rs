//! Per-action request pipeline.
//!
//! A matched `POST` runs these steps in order; the first failure answers
//! the request:
//!
//! | Step | Work                                   | Failure |
//! |------|----------------------------------------|---------|
//! | 1    | identity, then permission (non-anonymous only) | 401 / 403 / 503 |
//! | 2    | decode the JSON body (blank is `{}`)   | 400 |
//! | 3    | `validate()`                           | 400 |
//! | 4    | build the call context                 | - |
//! | 5    | invoke, bounded by the deadline        | 504 |
//! | 6    | classify the error                     | 409 / 500 |
//! | 7    | write the result                       | 404 for `None` |
//!
//! Every answer carries the request ID in `X-Request-ID`.

use crate::server::REQUEST_ID_HEADER;
use bytes::Bytes;
use conduit_core::{Action, ActionError, BindError, Context, Payload, RequestId};
use conduit_middleware::{AuthPolicy, Response, ResponseExt};
use http::{HeaderMap, HeaderValue, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Produces the base context every call starts from.
pub type ContextFn = Arc<dyn Fn() -> Context + Send + Sync>;

/// Runs matched actions.
#[derive(Clone)]
pub struct Pipeline {
    auth: AuthPolicy,
    context_fn: ContextFn,
    request_timeout: Duration,
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(auth: AuthPolicy, context_fn: ContextFn, request_timeout: Duration) -> Self {
        Self {
            auth,
            context_fn,
            request_timeout,
        }
    }

    /// Returns the auth policy.
    #[must_use]
    pub fn auth(&self) -> &AuthPolicy {
        &self.auth
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Runs `action` for one request.
    pub async fn handle(
        &self,
        action: &Action,
        headers: &HeaderMap,
        body: &Bytes,
        request_id: RequestId,
    ) -> Response {
        let mut response = self.run(action, headers, body, request_id).await;
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }

    async fn run(&self, action: &Action, headers: &HeaderMap, body: &Bytes, request_id: RequestId) -> Response {
        if !action.is_anonymous() {
            if let Err(err) = self.auth.check(headers) {
                tracing::warn!(
                    request_id = %request_id,
                    service = action.service(),
                    method = action.method(),
                    error = %err,
                    "request refused"
                );
                return Response::empty(err.status_code());
            }
        }

        let call = match action.prepare(body) {
            Ok(call) => call,
            Err(err) => {
                match &err {
                    BindError::Malformed(_) => {
                        tracing::debug!(request_id = %request_id, error = %err, "malformed body");
                    }
                    BindError::Invalid(_) => {
                        tracing::debug!(request_id = %request_id, error = %err, "validation failed");
                    }
                }
                return Response::empty(StatusCode::BAD_REQUEST);
            }
        };

        let deadline = Instant::now() + self.request_timeout;
        let ctx = (self.context_fn)()
            .with_request_id(request_id)
            .with_deadline(deadline);

        let mut task = tokio::spawn(call.call(ctx));
        let outcome = match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) => {
                tracing::error!(
                    request_id = %request_id,
                    service = action.service(),
                    method = action.method(),
                    error = %join_err,
                    "action panicked"
                );
                return Response::empty(StatusCode::INTERNAL_SERVER_ERROR);
            }
            Err(_) => {
                task.abort();
                tracing::warn!(
                    request_id = %request_id,
                    service = action.service(),
                    method = action.method(),
                    timeout = ?self.request_timeout,
                    "action timed out"
                );
                return Response::empty(StatusCode::GATEWAY_TIMEOUT);
            }
        };

        match outcome {
            Ok(payload) => write_result(payload, request_id),
            Err(err) => error_response(&err, action, request_id),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("auth", &self.auth)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

fn error_response(err: &ActionError, action: &Action, request_id: RequestId) -> Response {
    let status = err.status_code();
    if let Some(known) = err.as_known() {
        return Response::json(status, &serde_json::json!({ "error": known }));
    }
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(
            request_id = %request_id,
            service = action.service(),
            method = action.method(),
            error = ?err,
            "action failed"
        );
    }
    Response::empty(status)
}

fn write_result(payload: Option<Payload>, request_id: RequestId) -> Response {
    match payload {
        None => Response::empty(StatusCode::NOT_FOUND),
        Some(Payload::Json(value)) => Response::json(StatusCode::OK, &serde_json::json!({ "result": value })),
        Some(Payload::Stream(stream)) => {
            let size = stream.size();
            tracing::debug!(request_id = %request_id, size, "streaming result");
            Response::stream(StatusCode::OK, stream.into_reader(), size)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_core::{
        discover, ActionSet, FileStream, JsonResponse, KnownError, Naming, Request, Service, ValidationError,
    };
    use conduit_middleware::{is_streaming, InterceptError};
    use http::header;
    use http_body_util::BodyExt;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    #[derive(Deserialize)]
    struct SumRequest {
        #[serde(default)]
        x: i64,
        #[serde(default)]
        y: i64,
    }

    impl Request for SumRequest {
        fn validate(&self) -> Result<(), ValidationError> {
            if self.x < 0 {
                return Err(ValidationError::field("x", "must not be negative"));
            }
            Ok(())
        }
    }

    #[derive(Serialize)]
    struct SumResponse {
        sum: i64,
    }

    impl JsonResponse for SumResponse {}

    #[derive(Default)]
    struct DemoService {
        calls: AtomicUsize,
    }

    #[derive(Clone)]
    struct Tenant(&'static str);

    impl DemoService {
        async fn sum(self: Arc<Self>, _ctx: Context, req: SumRequest) -> anyhow::Result<Option<SumResponse>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(SumResponse { sum: req.x + req.y }))
        }

        async fn nothing(self: Arc<Self>, _ctx: Context, _req: SumRequest) -> anyhow::Result<Option<SumResponse>> {
            Ok(None)
        }

        async fn conflict(self: Arc<Self>, _ctx: Context, _req: SumRequest) -> Result<Option<SumResponse>, KnownError> {
            Err(KnownError::new("dup", "already exists"))
        }

        async fn wrapped(self: Arc<Self>, _ctx: Context, _req: SumRequest) -> anyhow::Result<Option<SumResponse>> {
            Err(anyhow::Error::new(KnownError::new("dup", "wrapped")).context("while summing"))
        }

        async fn boom(self: Arc<Self>, _ctx: Context, _req: SumRequest) -> anyhow::Result<Option<SumResponse>> {
            Err(anyhow::anyhow!("database unreachable"))
        }

        async fn slow(self: Arc<Self>, _ctx: Context, _req: SumRequest) -> anyhow::Result<Option<SumResponse>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some(SumResponse { sum: 0 }))
        }

        async fn cooperative(self: Arc<Self>, ctx: Context, _req: SumRequest) -> Result<Option<SumResponse>, ActionError> {
            ctx.run(tokio::time::sleep(Duration::from_secs(60))).await?;
            Ok(Some(SumResponse { sum: 0 }))
        }

        async fn panics(self: Arc<Self>, _ctx: Context, _req: SumRequest) -> anyhow::Result<Option<SumResponse>> {
            panic!("bug in action");
        }

        async fn tenant(self: Arc<Self>, ctx: Context, _req: SumRequest) -> anyhow::Result<Option<SumResponse>> {
            let id = ctx.request_id().map(|_| 1).unwrap_or_default();
            let tenant = ctx.value::<Tenant>().map(|t| t.0.len()).unwrap_or_default();
            Ok(Some(SumResponse {
                sum: i64::try_from(tenant).unwrap_or_default() + id,
            }))
        }

        async fn download(self: Arc<Self>, _ctx: Context, _req: SumRequest) -> anyhow::Result<Option<FileStream>> {
            Ok(Some(FileStream::from_reader(&b"hello stream"[..], 12)))
        }
    }

    impl Service for DemoService {
        fn actions(set: &mut ActionSet<Self>) {
            set.action("Sum", Self::sum)
                .action("Nothing", Self::nothing)
                .action("Conflict", Self::conflict)
                .action("Wrapped", Self::wrapped)
                .action("Boom", Self::boom)
                .action("Slow", Self::slow)
                .action("Cooperative", Self::cooperative)
                .action("Panics", Self::panics)
                .action("Tenant", Self::tenant)
                .action("Download", Self::download);
        }
    }

    struct PublicService;

    impl Service for PublicService {
        fn anonymous(&self) -> bool {
            true
        }

        fn actions(set: &mut ActionSet<Self>) {
            set.action("Echo", |_s: Arc<Self>, _ctx: Context, req: SumRequest| async move {
                Ok::<_, anyhow::Error>(Some(SumResponse { sum: req.x }))
            });
        }
    }

    struct PipeService {
        reader: Mutex<Option<DuplexStream>>,
    }

    impl Service for PipeService {
        fn anonymous(&self) -> bool {
            true
        }

        fn actions(set: &mut ActionSet<Self>) {
            set.action("Pipe", |s: Arc<Self>, _ctx: Context, _req: SumRequest| async move {
                let reader = s.reader.lock().unwrap().take();
                Ok::<_, anyhow::Error>(reader.map(|r| FileStream::from_reader(r, 6)))
            });
        }
    }

    fn actions() -> (Arc<DemoService>, Vec<Action>) {
        let service = Arc::new(DemoService::default());
        let actions = discover(Arc::clone(&service), &Naming::default()).unwrap();
        (service, actions)
    }

    fn find<'a>(actions: &'a [Action], method: &str) -> &'a Action {
        actions.iter().find(|a| a.method() == method).unwrap()
    }

    fn pipeline(auth: AuthPolicy) -> Pipeline {
        Pipeline::new(auth, Arc::new(Context::background), Duration::from_secs(30))
    }

    async fn call(pipeline: &Pipeline, action: &Action, body: &'static str) -> Response {
        pipeline
            .handle(action, &HeaderMap::new(), &Bytes::from_static(body.as_bytes()), RequestId::new())
            .await
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_len(response: Response) -> usize {
        response.into_body().collect().await.unwrap().to_bytes().len()
    }

    fn deny(_: &HeaderMap) -> Result<(), InterceptError> {
        Err(InterceptError::new("nope"))
    }

    fn allow(_: &HeaderMap) -> Result<(), InterceptError> {
        Ok(())
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let (_, actions) = actions();
        let response = call(&pipeline(AuthPolicy::new()), find(&actions, "sum"), r#"{"x":1000,"y":500}"#).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
        assert_eq!(body_json(response).await, serde_json::json!({"result": {"sum": 1500}}));
    }

    #[tokio::test]
    async fn test_empty_body_binds_as_empty_object() {
        let (_, actions) = actions();
        let response = call(&pipeline(AuthPolicy::new()), find(&actions, "sum"), "").await;
        assert_eq!(body_json(response).await, serde_json::json!({"result": {"sum": 0}}));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let (service, actions) = actions();
        let response = call(&pipeline(AuthPolicy::new()), find(&actions, "sum"), "{not json").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_invocation() {
        let (service, actions) = actions();
        let response = call(&pipeline(AuthPolicy::new()), find(&actions, "sum"), r#"{"x":-1,"y":2}"#).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_len(response).await, 0);
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_none_is_not_found() {
        let (_, actions) = actions();
        let response = call(&pipeline(AuthPolicy::new()), find(&actions, "nothing"), "{}").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_len(response).await, 0);
    }

    #[tokio::test]
    async fn test_known_error_is_conflict() {
        let (_, actions) = actions();
        let p = pipeline(AuthPolicy::new());

        for method in ["conflict", "wrapped"] {
            let response = call(&p, find(&actions, method), "{}").await;
            assert_eq!(response.status(), StatusCode::CONFLICT);
            let body = body_json(response).await;
            assert_eq!(body["error"]["status"], "dup");
        }

        let response = call(&p, find(&actions, "conflict"), "{}").await;
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": {"status": "dup", "message": "already exists"}})
        );
    }

    #[tokio::test]
    async fn test_internal_error_is_masked() {
        let (_, actions) = actions();
        let response = call(&pipeline(AuthPolicy::new()), find(&actions, "boom"), "{}").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_len(response).await, 0);
    }

    #[tokio::test]
    async fn test_panic_is_internal_error() {
        let (_, actions) = actions();
        let response = call(&pipeline(AuthPolicy::new()), find(&actions, "panics"), "{}").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_gateway_timeout() {
        let (_, actions) = actions();
        let p = Pipeline::new(AuthPolicy::new(), Arc::new(Context::background), Duration::from_millis(100));

        let response = call(&p, find(&actions, "slow"), "{}").await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let response = call(&p, find(&actions, "cooperative"), "{}").await;
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn test_context_function_and_request_id() {
        let (_, actions) = actions();
        let p = Pipeline::new(
            AuthPolicy::new(),
            Arc::new(|| Context::background().with_value(Tenant("acme"))),
            Duration::from_secs(30),
        );

        let response = call(&p, find(&actions, "tenant"), "{}").await;
        assert_eq!(body_json(response).await, serde_json::json!({"result": {"sum": 5}}));
    }

    #[tokio::test]
    async fn test_stream_result() {
        let (_, actions) = actions();
        let response = call(&pipeline(AuthPolicy::new()), find(&actions, "download"), "{}").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "application/octet-stream");
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "12");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello stream");
    }

    #[tokio::test]
    async fn test_stream_result_is_not_buffered() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let service = Arc::new(PipeService {
            reader: Mutex::new(Some(reader)),
        });
        let actions = discover(service, &Naming::default()).unwrap();

        // Nothing has been written yet, so a buffering pipeline would hang here.
        let response = call(&pipeline(AuthPolicy::new()), find(&actions, "pipe"), "{}").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(is_streaming(response.body()));

        writer.write_all(b"abc").await.unwrap();
        writer.write_all(b"def").await.unwrap();
        drop(writer);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"abcdef");
    }

    #[tokio::test]
    async fn test_auth_statuses() {
        let (service, actions) = actions();
        let sum = find(&actions, "sum");

        let response = call(&pipeline(AuthPolicy::new().identity(deny)), sum, "{}").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = call(&pipeline(AuthPolicy::new().identity(allow).permission(deny)), sum, "{}").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = call(&pipeline(AuthPolicy::new().strict(true)), sum, "{}").await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_anonymous_skips_auth() {
        let actions = discover(Arc::new(PublicService), &Naming::default()).unwrap();
        let p = pipeline(AuthPolicy::new().identity(deny).strict(true));

        let response = call(&p, &actions[0], r#"{"x":7}"#).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, serde_json::json!({"result": {"sum": 7}}));
    }
}
