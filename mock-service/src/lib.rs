//! In-memory users/orders CRUD service used as a load target in tests.
use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics::counter;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tower_http::trace::TraceLayer;
#[allow(unused)]
use tracing::{debug, error, info, warn};

/// Fault injection knobs.
#[derive(Clone, Debug)]
pub struct MockConfig {
    /// Fraction of API requests answered with `500` before reaching a handler.
    pub failure_rate: f64,
    /// Added to every API request.
    pub delay: Duration,
    /// `GET /health` answers `503` when false.
    pub healthy: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.,
            delay: Duration::ZERO,
            healthy: true,
        }
    }
}

pub fn router(config: MockConfig) -> Router {
    let config = Arc::new(config);
    let users = collection(Store::users(), config.clone());
    let orders = collection(Store::orders(), config.clone());

    Router::new()
        .route("/health", get(health).with_state(config))
        .nest("/api/users", users)
        .nest("/api/orders", orders)
        .layer(TraceLayer::new_for_http())
}

/// Serve on an ephemeral local port and return the bound address.
pub async fn spawn(config: MockConfig) -> std::io::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(config);

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!("Mock service stopped: {err}");
        }
    });

    debug!("Mock service listening on {addr}");
    Ok(addr)
}

pub async fn run(addr: SocketAddr, config: MockConfig) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Mock service listening on {}", listener.local_addr()?);
    axum::serve(listener, router(config)).await
}

#[derive(Clone)]
struct Collection {
    store: Arc<Store>,
    config: Arc<MockConfig>,
}

fn collection(store: Store, config: Arc<MockConfig>) -> Router {
    let state = Collection {
        store: Arc::new(store),
        config,
    };

    Router::new()
        .route("/", get(list).post(create))
        .route("/:id", get(read).put(update).delete(remove))
        .route_layer(middleware::from_fn_with_state(state.clone(), faults))
        .with_state(state)
}

struct Store {
    noun: &'static str,
    id_prefix: &'static str,
    required: &'static [&'static str],
    records: RwLock<BTreeMap<String, Value>>,
    next_id: AtomicU64,
}

impl Store {
    fn users() -> Self {
        let seeds = [
            json!({"id": "1", "name": "John Doe", "email": "john@example.com"}),
            json!({"id": "2", "name": "Jane Smith", "email": "jane@example.com"}),
        ];
        Self::seeded("User", "", &["name", "email"], seeds)
    }

    fn orders() -> Self {
        let seeds = [
            json!({
                "id": "order-1",
                "customerId": "customer-1",
                "items": [{"productId": "prod-1", "productName": "Laptop", "quantity": 1, "unitPrice": "999.99"}],
                "totalAmount": "999.99",
                "status": "CONFIRMED",
            }),
            json!({
                "id": "order-2",
                "customerId": "customer-2",
                "items": [{"productId": "prod-2", "productName": "Mouse", "quantity": 2, "unitPrice": "25.50"}],
                "totalAmount": "51.00",
                "status": "PROCESSING",
            }),
        ];
        Self::seeded("Order", "order-", &["customerId", "items"], seeds)
    }

    fn seeded(
        noun: &'static str,
        id_prefix: &'static str,
        required: &'static [&'static str],
        seeds: impl IntoIterator<Item = Value>,
    ) -> Self {
        let records: BTreeMap<_, _> = seeds
            .into_iter()
            .filter_map(|record| Some((record["id"].as_str()?.to_string(), record)))
            .collect();
        let next_id = AtomicU64::new(records.len() as u64 + 1);

        Self {
            noun,
            id_prefix,
            required,
            records: RwLock::new(records),
            next_id,
        }
    }

    fn allocate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("{}{n}", self.id_prefix)
    }

    fn valid<'a>(&self, body: &'a Value) -> Option<&'a Map<String, Value>> {
        let fields = body.as_object()?;
        self.required
            .iter()
            .all(|field| fields.get(*field).is_some_and(non_empty))
            .then_some(fields)
    }

    fn not_found(&self) -> Response {
        failure(StatusCode::NOT_FOUND, format!("{} not found", self.noun))
    }

    fn invalid(&self) -> Response {
        failure(
            StatusCode::BAD_REQUEST,
            format!("Invalid {} data", self.noun.to_lowercase()),
        )
    }
}

fn non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

/// Sum of `quantity * unitPrice` over the order's items, two decimals.
fn order_total(items: &Value) -> String {
    let total = items
        .as_array()
        .into_iter()
        .flatten()
        .map(|item| {
            let quantity = item["quantity"].as_f64().unwrap_or(0.);
            let price = match &item["unitPrice"] {
                Value::String(p) => p.parse().unwrap_or(0.),
                other => other.as_f64().unwrap_or(0.),
            };
            quantity * price
        })
        .fold(0., |acc: f64, x| acc + x);
    format!("{total:.2}")
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn failure(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorBody { error })).into_response()
}

async fn faults(State(state): State<Collection>, request: Request, next: Next) -> Response {
    counter!("mock_service.requests", "resource" => state.store.noun).increment(1);

    if !state.config.delay.is_zero() {
        tokio::time::sleep(state.config.delay).await;
    }

    let fail = rand::thread_rng().gen::<f64>() < state.config.failure_rate;
    if fail {
        counter!("mock_service.injected_failures", "resource" => state.store.noun).increment(1);
        debug!("Injecting failure for {} {}", request.method(), request.uri());
        return failure(StatusCode::INTERNAL_SERVER_ERROR, "Injected failure".to_string());
    }

    next.run(request).await
}

async fn health(State(config): State<Arc<MockConfig>>) -> Response {
    if config.healthy {
        Json(json!({"status": "UP"})).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "DOWN"}))).into_response()
    }
}

async fn list(State(state): State<Collection>) -> Json<Vec<Value>> {
    let records = state.store.records.read().unwrap_or_else(PoisonError::into_inner);
    Json(records.values().cloned().collect())
}

async fn read(State(state): State<Collection>, Path(id): Path<String>) -> Response {
    let records = state.store.records.read().unwrap_or_else(PoisonError::into_inner);
    match records.get(&id) {
        Some(record) => Json(record.clone()).into_response(),
        None => state.store.not_found(),
    }
}

async fn create(
    State(state): State<Collection>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let store = &state.store;
    let Ok(Json(body)) = body else {
        return store.invalid();
    };
    let Some(fields) = store.valid(&body) else {
        return store.invalid();
    };

    let id = store.allocate_id();
    let mut record = fields.clone();
    record.insert("id".to_string(), Value::String(id.clone()));
    if let Some(items) = fields.get("items") {
        record.insert("totalAmount".to_string(), Value::String(order_total(items)));
        record.insert("status".to_string(), Value::String("PENDING".to_string()));
    }
    let record = Value::Object(record);

    store
        .records
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(id, record.clone());

    (StatusCode::CREATED, Json(record)).into_response()
}

async fn update(
    State(state): State<Collection>,
    Path(id): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let store = &state.store;
    let Ok(Json(body)) = body else {
        return store.invalid();
    };
    let Some(fields) = store.valid(&body) else {
        return store.invalid();
    };

    let mut records = store.records.write().unwrap_or_else(PoisonError::into_inner);
    let Some(Value::Object(record)) = records.get_mut(&id) else {
        return store.not_found();
    };

    for (field, value) in fields {
        if field != "id" {
            record.insert(field.clone(), value.clone());
        }
    }
    if let Some(items) = fields.get("items") {
        record.insert("totalAmount".to_string(), Value::String(order_total(items)));
    }

    Json(Value::Object(record.clone())).into_response()
}

async fn remove(State(state): State<Collection>, Path(id): Path<String>) -> Response {
    let store = &state.store;
    let removed = store
        .records
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);

    match removed {
        Some(_) => Json(json!({"message": format!("{} deleted successfully", store.noun)}))
            .into_response(),
        None => store.not_found(),
    }
}
