#![allow(dead_code)]

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "test-token";
pub const ZONE_ID: &str = "023e105f4ecef8ad9ca31a8372d0c353";

pub fn envelope(result: Value) -> Value {
    json!({
        "success": true,
        "errors": [],
        "messages": [],
        "result": result
    })
}

pub fn failure(code: u64, message: &str) -> Value {
    json!({
        "success": false,
        "errors": [{ "code": code, "message": message }],
        "messages": [],
        "result": null
    })
}

pub fn record_json(id: &str, name: &str, content: &str, ttl: u32) -> Value {
    json!({
        "id": id,
        "zone_id": ZONE_ID,
        "zone_name": "example.com",
        "name": name,
        "type": "A",
        "content": content,
        "proxiable": true,
        "proxied": false,
        "ttl": ttl
    })
}

pub async fn mount_zone(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/zones"))
        .and(query_param("name", "example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(json!([
            { "id": ZONE_ID, "name": "example.com", "status": "active" }
        ]))))
        .mount(server)
        .await;
}

pub async fn mount_lookup(server: &MockServer, hostname: &str, records: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path(format!("/zones/{}/dns_records", ZONE_ID)))
        .and(query_param("name", hostname))
        .and(query_param("type", "A"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope(Value::Array(records))))
        .mount(server)
        .await;
}

pub async fn mount_ip(server: &MockServer, route: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}
