use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use vedic_origins_api::{
    config::AppConfig,
    db,
    errors::ServiceError,
    events::{self, EventSender},
    handlers::{self, health::health_check, AppServices},
    payments::{GatewayOrder, PaymentGateway},
    services::{orders::OrderService, payment_verification::PaymentVerificationService},
    AppState,
};

pub const TEST_KEY_ID: &str = "rzp_test_key";
pub const TEST_KEY_SECRET: &str = "test_gateway_secret_32_chars_long";
pub const TEST_GATEWAY_ORDER_ID: &str = "order_MockGw001";

/// A recorded payment-intent request made against the mock gateway.
#[derive(Debug, Clone)]
pub struct IntentCall {
    pub receipt: String,
    pub amount_minor: i64,
    pub currency: String,
}

/// In-process stand-in for the payment gateway. Records every intent request
/// and answers with a fixed gateway order id.
pub struct MockGateway {
    pub calls: Mutex<Vec<IntentCall>>,
    pub fail: bool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(
        &self,
        receipt: &str,
        amount_minor: i64,
        currency: &str,
        _notes: Value,
    ) -> Result<GatewayOrder, ServiceError> {
        self.calls.lock().unwrap().push(IntentCall {
            receipt: receipt.to_string(),
            amount_minor,
            currency: currency.to_string(),
        });
        if self.fail {
            return Err(ServiceError::Gateway("mock gateway down".into()));
        }
        Ok(GatewayOrder {
            id: TEST_GATEWAY_ORDER_ID.to_string(),
            amount: amount_minor,
            currency: currency.to_string(),
        })
    }

    fn key_id(&self) -> &str {
        TEST_KEY_ID
    }
}

/// Test harness over an in-memory SQLite database and the real router.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<MockGateway>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_gateway(Arc::new(MockGateway::new())).await
    }

    pub async fn with_failing_gateway() -> Self {
        Self::with_gateway(Arc::new(MockGateway::failing())).await
    }

    async fn with_gateway(gateway: Arc<MockGateway>) -> Self {
        let config = AppConfig::new(
            "sqlite::memory:".to_string(),
            TEST_KEY_ID.to_string(),
            TEST_KEY_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );

        let mut db_cfg = db::DbConfig {
            url: config.database_url.clone(),
            ..Default::default()
        };
        // Single connection keeps all statements on the same in-memory db.
        db_cfg.max_connections = 1;
        db_cfg.min_connections = 1;

        let db_pool = Arc::new(
            db::establish_connection_with_config(&db_cfg)
                .await
                .expect("test database"),
        );
        db::run_migrations(&db_pool).await.expect("migrations");

        let (tx, rx) = mpsc::channel(64);
        let event_sender = EventSender::new(tx);
        let event_task = tokio::spawn(events::process_events(rx));

        let services = AppServices {
            orders: Arc::new(OrderService::new(
                db_pool.clone(),
                gateway.clone(),
                event_sender.clone(),
                config.cod_fee_amount(),
            )),
            verification: Arc::new(PaymentVerificationService::new(
                db_pool.clone(),
                TEST_KEY_SECRET.to_string(),
                event_sender.clone(),
            )),
        };

        let state = AppState {
            db: db_pool,
            config,
            event_sender,
            services,
        };

        let router = Router::new()
            .route("/health", get(health_check))
            .nest("/api/v1", handlers::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            _event_task: event_task,
        }
    }

    /// Sends a request through the router without binding a socket.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                builder
                    .body(Body::from(json.to_string()))
                    .expect("request body")
            }
            None => builder.body(Body::empty()).expect("empty request"),
        };
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None).await
    }

    /// Runs a raw SQL statement against the test database.
    pub async fn execute_sql(&self, sql: &str) {
        self.state
            .db
            .execute(Statement::from_string(
                DatabaseBackend::Sqlite,
                sql.to_string(),
            ))
            .await
            .expect("raw sql");
    }

    /// Counts rows in a table, for asserting on persistence side effects.
    pub async fn count_rows(&self, table: &str) -> i64 {
        let row = self
            .state
            .db
            .query_one(Statement::from_string(
                DatabaseBackend::Sqlite,
                format!("SELECT COUNT(*) AS n FROM {}", table),
            ))
            .await
            .expect("count query")
            .expect("count row");
        row.try_get::<i64>("", "n").expect("count value")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "unexpected status for response"
    );
}
