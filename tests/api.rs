mod common;

use common::TestServer;
use serde_json::{Value, json};

#[tokio::test]
async fn register_login_and_check() {
    let server = TestServer::start().await;
    let client = &server.client;

    let resp = client
        .post(server.url("/api/register"))
        .json(&json!({
            "username": "alice",
            "password": "hunter22",
            "email": "alice@example.com",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["user"].get("password_hash").is_none());
    assert!(body["token"].as_str().is_some());

    // Duplicate username is a conflict.
    let resp = client
        .post(server.url("/api/register"))
        .json(&json!({ "username": "alice", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    // Login with the right and the wrong password.
    let resp = client
        .post(server.url("/api/login"))
        .json(&json!({ "username": "alice", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["token"].as_str().is_some());
    assert!(body["user"]["lastLogin"].is_null() || body["user"]["last_login"].is_string());

    let resp = client
        .post(server.url("/api/login"))
        .json(&json!({ "username": "alice", "password": "wrong" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Unknown user answers with the same status and message.
    let resp = client
        .post(server.url("/api/login"))
        .json(&json!({ "username": "nobody", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // The legacy validate route behaves exactly like login.
    let resp = client
        .post(server.url("/api/users/validate"))
        .json(&json!({ "username": "alice", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Existence probe, both branches, stable across repeats.
    for _ in 0..2 {
        let body: Value = client
            .get(server.url("/api/users/check/alice"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["exists"], true);
        assert_eq!(body["username"], "alice");
    }

    let body: Value = client
        .get(server.url("/api/users/check/nobody"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["exists"], false);
}

#[tokio::test]
async fn register_rejects_bad_input() {
    let server = TestServer::start().await;

    // Missing password entirely.
    let resp = server
        .client
        .post(server.url("/api/register"))
        .json(&json!({ "username": "alice" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = server
        .client
        .post(server.url("/api/register"))
        .json(&json!({ "username": "ab", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = server
        .client
        .post(server.url("/api/register"))
        .json(&json!({ "username": "alice", "password": "short" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn schedule_writes_require_auth() {
    let server = TestServer::start().await;

    let payload = json!({
        "workStore": ["Store A"],
        "workDate": "2025-03-01",
        "startTime": "09:00",
        "endTime": "17:00",
    });

    let resp = server
        .client
        .post(server.url("/api/schedule"))
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = server
        .client
        .post(server.url("/api/schedule"))
        .header("Authorization", "Bearer not.a.token")
        .json(&payload)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // Listing is open but needs to name a calendar.
    let resp = server
        .client
        .get(server.url("/api/schedule"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = server
        .client
        .get(server.url("/api/schedule?username=alice"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn schedule_crud_round_trip() {
    let server = TestServer::start().await;
    let token = server.register("bob").await;
    let client = &server.client;

    // Duration omitted; the server derives 8.5h from the times and tags
    // the notes with the owner.
    let resp = client
        .post(server.url("/api/schedule"))
        .bearer_auth(&token)
        .json(&json!({
            "workStore": ["Store A"],
            "workDate": "2025-03-01",
            "startTime": "09:00",
            "endTime": "17:30",
            "notes": "opening shift",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: Value = resp.json().await.unwrap();
    let record = &body["record"];
    assert_eq!(record["duration"], 8.5);
    assert_eq!(record["notes"], "opening shift [@user:bob]");
    let id = record["id"].as_str().unwrap().to_string();

    // Read-your-write through the list endpoint.
    let body: Value = client
        .get(server.url("/api/schedule?date=2025-03-01"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["records"].as_array().unwrap().len(), 1);

    // Update both times without a duration; it is re-derived.
    let body: Value = client
        .put(server.url(&format!("/api/schedule/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "startTime": "10:00", "endTime": "18:00" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["record"]["duration"], 8.0);
    assert_eq!(body["record"]["startTime"], "10:00");

    // The list reflects the update immediately despite caching.
    let body: Value = client
        .get(server.url("/api/schedule"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["records"][0]["startTime"], "10:00");

    let resp = client
        .delete(server.url(&format!("/api/schedule/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .delete(server.url(&format!("/api/schedule/{id}")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn schedule_validation_rejects_bad_input() {
    let server = TestServer::start().await;
    let token = server.register("carol").await;

    // Missing fields are listed by name.
    let resp = server
        .client
        .post(server.url("/api/schedule"))
        .bearer_auth(&token)
        .json(&json!({ "workStore": ["Store A"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    let message = body["message"].as_str().unwrap();
    for field in ["workDate", "startTime", "endTime"] {
        assert!(message.contains(field), "message missing {field}: {message}");
    }

    for (date, start, end) in [
        ("2025-3-1", "09:00", "17:00"),
        ("2025-03-01", "9:00", "17:00"),
        ("2025-03-01", "09:00", "25:00"),
        ("2025-03-01", "09:00", "09:00"),
        ("2025-03-01", "17:00", "09:00"),
    ] {
        let resp = server
            .client
            .post(server.url("/api/schedule"))
            .bearer_auth(&token)
            .json(&json!({
                "workStore": ["Store A"],
                "workDate": date,
                "startTime": start,
                "endTime": end,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "accepted {date} {start}-{end}");
    }
}

#[tokio::test]
async fn shop_delete_cascades_into_schedules() {
    let server = TestServer::start().await;
    let token = server.register("dave").await;
    let client = &server.client;

    let mut shop_ids = Vec::new();
    for name in ["Store A", "Store B"] {
        let body: Value = client
            .post(server.url("/api/shops"))
            .bearer_auth(&token)
            .json(&json!({ "name": name }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        shop_ids.push(body["record"]["id"].as_str().unwrap().to_string());
    }

    // One schedule in both shops, one only in Store A.
    for stores in [vec!["Store A", "Store B"], vec!["Store A"]] {
        let resp = client
            .post(server.url("/api/schedule"))
            .bearer_auth(&token)
            .json(&json!({
                "workStore": stores,
                "workDate": "2025-03-01",
                "startTime": "09:00",
                "endTime": "17:00",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    let body: Value = client
        .delete(server.url(&format!("/api/shops/{}", shop_ids[0])))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["affectedSchedules"], 2);

    // The two-shop schedule survives with its membership rewritten; the
    // single-shop schedule is gone with its last shop.
    let body: Value = client
        .get(server.url("/api/schedule"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let records = body["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["workStore"], json!(["Store B"]));

    // Deleting an unknown shop is a 404.
    let resp = client
        .delete(server.url(&format!("/api/shops/{}", shop_ids[0])))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn shop_rename_follows_into_schedules() {
    let server = TestServer::start().await;
    let token = server.register("erin").await;
    let client = &server.client;

    let body: Value = client
        .post(server.url("/api/shops"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Old Name" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let shop_id = body["record"]["id"].as_str().unwrap().to_string();

    client
        .post(server.url("/api/schedule"))
        .bearer_auth(&token)
        .json(&json!({
            "workStore": ["Old Name"],
            "workDate": "2025-03-01",
            "startTime": "09:00",
            "endTime": "17:00",
        }))
        .send()
        .await
        .unwrap();

    let resp = client
        .put(server.url(&format!("/api/shops/{shop_id}")))
        .bearer_auth(&token)
        .json(&json!({ "name": "New Name" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = client
        .get(server.url("/api/schedule"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["records"][0]["workStore"], json!(["New Name"]));
}

#[tokio::test]
async fn shops_require_auth_and_reject_duplicates() {
    let server = TestServer::start().await;

    let resp = server.client.get(server.url("/api/shops")).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let token = server.register("frank").await;
    for expected in [201, 409] {
        let resp = server
            .client
            .post(server.url("/api/shops"))
            .bearer_auth(&token)
            .json(&json!({ "name": "Store A" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), expected);
    }

    let resp = server
        .client
        .post(server.url("/api/shops"))
        .bearer_auth(&token)
        .json(&json!({ "notes": "no name" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn profile_upsert_merges_partial_updates() {
    let server = TestServer::start().await;
    let token = server.register("grace").await;
    let client = &server.client;

    // Nothing stored yet.
    let resp = client
        .get(server.url("/api/profile/grace"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let body: Value = client
        .put(server.url("/api/profile/grace"))
        .bearer_auth(&token)
        .json(&json!({ "realName": "Grace H", "phone": "555-0100" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["record"]["realName"], "Grace H");

    // A second update touching one field keeps the others.
    let body: Value = client
        .put(server.url("/api/profile/grace"))
        .bearer_auth(&token)
        .json(&json!({ "phone": "555-0199" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["record"]["realName"], "Grace H");
    assert_eq!(body["record"]["phone"], "555-0199");

    let body: Value = client
        .get(server.url("/api/profile/grace"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["record"]["username"], "grace");

    // Writes need a token.
    let resp = client
        .put(server.url("/api/profile/grace"))
        .json(&json!({ "phone": "555-0000" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn hotel_settings_default_and_accept_legacy_field() {
    let server = TestServer::start().await;
    let token = server.register("heidi").await;
    let client = &server.client;

    // Never configured: the default name comes back instead of a 404.
    let body: Value = client
        .get(server.url("/api/hotel/heidi"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["record"]["websiteName"], "URO Hotel");

    // Older clients send hotelName.
    let body: Value = client
        .put(server.url("/api/hotel/heidi"))
        .bearer_auth(&token)
        .json(&json!({ "hotelName": "Seaside Inn" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["record"]["websiteName"], "Seaside Inn");

    let body: Value = client
        .get(server.url("/api/hotel/heidi"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["record"]["websiteName"], "Seaside Inn");

    let resp = client
        .put(server.url("/api/hotel/heidi"))
        .bearer_auth(&token)
        .json(&json!({ "websiteName": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn health_reports_per_table_status() {
    let server = TestServer::start().await;

    let resp = server.client.get(server.url("/api/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backend"], "memory");
    assert!(body["timestamp"].as_str().is_some());
    for table in ["users", "schedules", "shops"] {
        assert_eq!(body["tables"][table]["ok"], true, "table {table}");
    }
}

#[tokio::test]
async fn preflight_requests_short_circuit() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/api/shops"))
        .header("Origin", "http://localhost:5173")
        .header("Access-Control-Request-Method", "POST")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert!(
        resp.headers()
            .get("access-control-allow-origin")
            .is_some()
    );
}

#[tokio::test]
async fn cache_endpoints_report_and_clear() {
    let server = TestServer::start().await;
    let token = server.register("ivan").await;
    let client = &server.client;

    // Prime the schedule cache.
    client
        .get(server.url("/api/schedule"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();

    let body: Value = client
        .get(server.url("/api/cache/stats"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["stats"]["schedule"]["entries"].as_u64().is_some());

    // Scoped clears need a username.
    let resp = client
        .post(server.url("/api/cache/clear?type=schedule"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(server.url("/api/cache/clear?type=schedule&username=ivan"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(server.url("/api/cache/clear?type=bogus"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn mutations_by_another_user_refresh_the_owners_cached_list() {
    let server = TestServer::start().await;
    let alice = server.register("alice").await;
    let bob = server.register("bob").await;
    let client = &server.client;

    let body: Value = client
        .post(server.url("/api/schedule"))
        .bearer_auth(&alice)
        .json(&json!({
            "workStore": ["Store A"],
            "workDate": "2025-03-01",
            "startTime": "09:00",
            "endTime": "17:00",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = body["record"]["id"].as_str().unwrap().to_string();

    // Prime alice's cached list.
    let body: Value = client
        .get(server.url("/api/schedule?username=alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["records"][0]["startTime"], "09:00");

    // A different account edits the record; alice's next read must see it
    // rather than the cached copy.
    let resp = client
        .put(server.url(&format!("/api/schedule/{id}")))
        .bearer_auth(&bob)
        .json(&json!({ "startTime": "10:00", "endTime": "17:00" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = client
        .get(server.url("/api/schedule?username=alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["records"][0]["startTime"], "10:00");

    // Same for deletes.
    let resp = client
        .delete(server.url(&format!("/api/schedule/{id}")))
        .bearer_auth(&bob)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = client
        .get(server.url("/api/schedule?username=alice"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["records"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn updates_require_both_times_together() {
    let server = TestServer::start().await;
    let token = server.register("judy").await;
    let client = &server.client;

    let body: Value = client
        .post(server.url("/api/schedule"))
        .bearer_auth(&token)
        .json(&json!({
            "workStore": ["Store A"],
            "workDate": "2025-03-01",
            "startTime": "09:00",
            "endTime": "17:00",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = body["record"]["id"].as_str().unwrap().to_string();

    // A lone startTime could slip past the stored endTime unchecked.
    for patch in [
        json!({ "startTime": "18:00" }),
        json!({ "endTime": "08:00" }),
    ] {
        let resp = client
            .put(server.url(&format!("/api/schedule/{id}")))
            .bearer_auth(&token)
            .json(&patch)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400, "patch {patch} must be rejected");
    }

    // Non-time fields still patch on their own.
    let resp = client
        .put(server.url(&format!("/api/schedule/{id}")))
        .bearer_auth(&token)
        .json(&json!({ "notes": "swapped with judy" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn registration_is_rate_limited_per_address() {
    let server = TestServer::start().await;
    let client = &server.client;

    for n in 0..5 {
        let resp = client
            .post(server.url("/api/register"))
            .json(&json!({
                "username": format!("user{n}"),
                "password": "hunter22",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
    }

    let resp = client
        .post(server.url("/api/register"))
        .json(&json!({ "username": "user5", "password": "hunter22" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn bare_options_and_security_headers() {
    let server = TestServer::start().await;

    // No preflight headers at all; still answered 200.
    let resp = server
        .client
        .request(reqwest::Method::OPTIONS, server.url("/api/schedule"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = server
        .client
        .get(server.url("/api/health"))
        .send()
        .await
        .unwrap();
    let headers = resp.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
}
