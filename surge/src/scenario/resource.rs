use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use surge_core::Domain;

const PEOPLE: [(&str, &str); 5] = [
    ("John Doe", "john@example.com"),
    ("Jane Smith", "jane@example.com"),
    ("Bob Johnson", "bob@example.com"),
    ("Alice Brown", "alice@example.com"),
    ("Charlie Wilson", "charlie@example.com"),
];

const USER_SEEDS: [&str; 2] = ["1", "2"];
const ORDER_SEEDS: [&str; 2] = ["order-1", "order-2"];

/// Paths, payloads and record shape of one CRUD domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resource {
    domain: Domain,
}

impl Resource {
    pub fn new(domain: Domain) -> Self {
        Self { domain }
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn collection_path(&self) -> String {
        format!("/api/{}", self.domain)
    }

    pub fn item_path(&self, id: &str) -> String {
        format!("/api/{}/{id}", self.domain)
    }

    /// Route label used in check names, e.g. `/api/users/:id`.
    pub fn item_route(&self) -> String {
        self.item_path(":id")
    }

    /// Records the service is seeded with.
    pub fn seed_ids(&self) -> &'static [&'static str] {
        match self.domain {
            Domain::Users => &USER_SEEDS,
            Domain::Orders => &ORDER_SEEDS,
        }
    }

    /// Fields every record returned by the service must carry.
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self.domain {
            Domain::Users => &["id", "name", "email"],
            Domain::Orders => &["id", "customerId", "items"],
        }
    }

    /// Fields a created record must echo back unchanged.
    pub fn identifying_fields(&self) -> &'static [&'static str] {
        match self.domain {
            Domain::Users => &["name", "email"],
            Domain::Orders => &["customerId"],
        }
    }

    pub fn synthesize_id(&self, token: &str) -> String {
        match self.domain {
            Domain::Users => token.to_string(),
            Domain::Orders => format!("order-{token}"),
        }
    }

    pub fn create_payload<R: Rng + ?Sized>(&self, rng: &mut R, token: &str) -> Value {
        match self.domain {
            Domain::Users => {
                let (name, email) = PEOPLE.choose(rng).copied().unwrap_or(PEOPLE[0]);
                json!({
                    "name": format!("{name}_{token}"),
                    "email": format!("{token}_{email}"),
                })
            }
            Domain::Orders => json!({
                "customerId": format!("customer-{}", rng.gen_range(0..1000)),
                "items": [{
                    "productId": format!("prod-{}", rng.gen_range(0..100)),
                    "productName": format!("Product {}", rng.gen_range(0..100)),
                    "quantity": rng.gen_range(1..=5),
                    "unitPrice": format!("{:.2}", rng.gen_range(10.0..110.0)),
                }],
            }),
        }
    }

    pub fn update_payload(&self, token: &str) -> Value {
        match self.domain {
            Domain::Users => json!({
                "name": format!("Updated User {token}"),
                "email": format!("updated_{token}@example.com"),
            }),
            Domain::Orders => json!({
                "customerId": format!("updated-customer-{token}"),
                "items": [{
                    "productId": "updated-prod-1",
                    "productName": "Updated Product",
                    "quantity": 2,
                    "unitPrice": "49.99",
                }],
            }),
        }
    }

    /// A throwaway record, created only to be deleted.
    pub fn disposable_payload(&self, token: &str) -> Value {
        match self.domain {
            Domain::Users => json!({
                "name": format!("Temp User {token}"),
                "email": format!("temp_{token}@example.com"),
            }),
            Domain::Orders => json!({
                "customerId": format!("temp-customer-{token}"),
                "items": [{
                    "productId": "temp-prod",
                    "productName": "Temp Product",
                    "quantity": 1,
                    "unitPrice": "9.99",
                }],
            }),
        }
    }

    pub fn has_required_fields(&self, record: &Value) -> bool {
        self.required_fields()
            .iter()
            .all(|field| is_present(&record[*field]))
    }

    /// Whether `received` is the record created from `sent`: same identifying fields plus an id.
    pub fn echoes(&self, sent: &Value, received: &Value) -> bool {
        Self::id_of(received).is_some()
            && self
                .identifying_fields()
                .iter()
                .all(|field| !received[*field].is_null() && received[*field] == sent[*field])
    }

    /// The record's id as a string. Services may return string or numeric ids.
    pub fn id_of(record: &Value) -> Option<String> {
        match &record["id"] {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// Present and non-empty: not null, not `false`, not `""` and not zero.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn paths_and_ids() {
        let users = Resource::new(Domain::Users);
        let orders = Resource::new(Domain::Orders);

        assert_eq!(users.collection_path(), "/api/users");
        assert_eq!(orders.item_path("order-1"), "/api/orders/order-1");
        assert_eq!(orders.item_route(), "/api/orders/:id");
        assert_eq!(users.synthesize_id("17-3"), "17-3");
        assert_eq!(orders.synthesize_id("17-3"), "order-17-3");
        assert_eq!(orders.seed_ids(), &["order-1", "order-2"]);
    }

    #[test]
    fn user_payloads_carry_the_token() {
        let users = Resource::new(Domain::Users);
        let mut rng = SmallRng::seed_from_u64(1);

        let payload = users.create_payload(&mut rng, "tok");
        let name = payload["name"].as_str().unwrap();
        let email = payload["email"].as_str().unwrap();
        assert!(name.ends_with("_tok"));
        assert!(email.starts_with("tok_") && email.ends_with("@example.com"));
        assert!(PEOPLE.iter().any(|(n, _)| name == format!("{n}_tok")));

        assert_eq!(users.update_payload("t")["name"], "Updated User t");
        assert_eq!(users.disposable_payload("t")["email"], "temp_t@example.com");
    }

    #[test]
    fn order_payload_ranges() {
        let orders = Resource::new(Domain::Orders);
        let mut rng = SmallRng::seed_from_u64(2);

        for _ in 0..200 {
            let payload = orders.create_payload(&mut rng, "tok");
            let customer: u32 = payload["customerId"]
                .as_str()
                .and_then(|c| c.strip_prefix("customer-"))
                .and_then(|n| n.parse().ok())
                .unwrap();
            assert!(customer < 1000);

            let item = &payload["items"][0];
            let quantity = item["quantity"].as_u64().unwrap();
            assert!((1..=5).contains(&quantity));

            let price = item["unitPrice"].as_str().unwrap();
            assert_eq!(price.split('.').nth(1).map(str::len), Some(2));
            let price: f64 = price.parse().unwrap();
            assert!((10.0..=110.0).contains(&price));
        }

        assert_eq!(orders.update_payload("t")["customerId"], "updated-customer-t");
        assert_eq!(orders.disposable_payload("t")["items"][0]["unitPrice"], "9.99");
    }

    #[test]
    fn record_validation() {
        let users = Resource::new(Domain::Users);
        let orders = Resource::new(Domain::Orders);

        assert!(users.has_required_fields(&json!({"id": "1", "name": "a", "email": "b"})));
        assert!(!users.has_required_fields(&json!({"id": "1", "name": "", "email": "b"})));
        assert!(!users.has_required_fields(&json!([])));
        assert!(orders.has_required_fields(&json!({"id": "o", "customerId": "c", "items": []})));

        let sent = json!({"name": "n", "email": "e"});
        assert!(users.echoes(&sent, &json!({"id": 7, "name": "n", "email": "e"})));
        assert!(!users.echoes(&sent, &json!({"id": "", "name": "n", "email": "e"})));
        assert!(!users.echoes(&sent, &json!({"id": "1", "name": "other", "email": "e"})));
        assert_eq!(Resource::id_of(&json!({"id": 42})), Some("42".to_string()));
    }
}
