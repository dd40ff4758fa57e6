use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::NaiveDate;
use jsonwebtoken::{EncodingKey, Header};
use serde_json::{Value, json};
use tower::ServiceExt;
use ulid::Ulid;

use hoteld::engine::{Engine, EngineConfig};
use hoteld::http::{AppState, router};
use hoteld::identity::{Claims, JwtIdentity};
use hoteld::notify::NotifyHub;

const SECRET: &[u8] = b"test-secret";

// ── Test infrastructure ──────────────────────────────────────

fn start_test_app() -> Router {
    let dir = std::env::temp_dir().join(format!("hoteld_http_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let config = EngineConfig {
        today: NaiveDate::from_ymd_opt(2024, 5, 1),
        ..Default::default()
    };
    let engine = Engine::new(dir.join("hoteld.wal"), Arc::new(NotifyHub::new()), config).unwrap();
    router(AppState {
        engine: Arc::new(engine),
        identity: Arc::new(JwtIdentity::new(SECRET)),
    })
}

fn token(user_id: u64, role: &str) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        role: Some(role.into()),
        exp: 4_102_444_800,
    };
    jsonwebtoken::encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

struct Seeded {
    admin: String,
    hotel: String,
    deluxe: String,
    room: String,
}

/// Hotel H, room type Deluxe (capacity 2) with room 101, through the admin API.
async fn seed(app: &Router) -> Seeded {
    let admin = token(1, "admin");
    let (status, hotel) = send(
        app,
        Method::POST,
        "/admin/hotels",
        Some(&admin),
        Some(json!({ "name": "Hotel H", "city": "Kathmandu", "country": "Nepal", "star_rating": 4 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let hotel = hotel["id"].as_str().unwrap().to_string();

    let (status, rt) = send(
        app,
        Method::POST,
        "/admin/room-types",
        Some(&admin),
        Some(json!({ "hotel_id": hotel, "name": "Deluxe", "capacity": 2, "base_price": 120.5 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(rt["base_price"], json!(120.5));
    let deluxe = rt["id"].as_str().unwrap().to_string();

    let (status, room) = send(
        app,
        Method::POST,
        "/admin/rooms",
        Some(&admin),
        Some(json!({ "room_type_id": deluxe, "room_number": "101" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(room["status"], "available");
    let room = room["id"].as_str().unwrap().to_string();

    Seeded {
        admin,
        hotel,
        deluxe,
        room,
    }
}

fn booking_body(s: &Seeded, check_in: &str, check_out: &str) -> Value {
    json!({
        "hotel_id": s.hotel,
        "room_type_id": s.deluxe,
        "check_in": check_in,
        "check_out": check_out,
        "num_guests": 2,
        "total_amount": 480.0,
    })
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn health_is_public() {
    let app = start_test_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn bookings_need_a_valid_token() {
    let app = start_test_app();
    let (status, body) = send(&app, Method::GET, "/bookings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");
    assert!(body["error"].is_string());

    let (status, _) = send(&app, Method::GET, "/bookings", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&app, Method::GET, "/bookings", Some(&token(7, "user")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn book_conflict_and_cancel_flow() {
    let app = start_test_app();
    let s = seed(&app).await;
    let alice = token(7, "user");
    let bob = token(8, "user");

    let uri = format!(
        "/availability?hotel_id={}&room_type_id={}&check_in=2024-06-01&check_out=2024-06-05&guests=2",
        s.hotel, s.deluxe
    );
    let (status, avail) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(avail["any_available"], true);
    assert_eq!(avail["available_count"], 1);
    assert!(avail.get("available_rooms").is_none());
    assert!(!avail.to_string().contains(&s.room));

    let (status, created) = send(
        &app,
        Method::POST,
        "/bookings",
        Some(&alice),
        Some(booking_body(&s, "2024-06-01", "2024-06-05")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "confirmed");
    let booking_id = created["booking_id"].as_str().unwrap().to_string();

    let (status, err) = send(
        &app,
        Method::POST,
        "/bookings",
        Some(&bob),
        Some(booking_body(&s, "2024-06-03T14:00:00Z", "2024-06-07")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "capacity");

    let (status, _) = send(
        &app,
        Method::POST,
        "/bookings",
        Some(&bob),
        Some(booking_body(&s, "2024-06-05", "2024-06-08")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, detail) = send(&app, Method::GET, &format!("/bookings/{booking_id}"), Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["room_number"], "101");
    assert_eq!(detail["hotel_name"], "Hotel H");
    assert_eq!(detail["nights"], 4);
    assert_eq!(detail["currency"], "USD");
    assert_eq!(detail["total_amount"], json!(480.0));

    let (status, _) = send(&app, Method::GET, &format!("/bookings/{booking_id}"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::PATCH, &format!("/bookings/{booking_id}/cancel"), Some(&bob), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let cancel = format!("/bookings/{booking_id}/cancel");
    let (status, body) = send(&app, Method::PATCH, &cancel, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, body) = send(&app, Method::PATCH, &cancel, Some(&alice), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "already_cancelled");

    let (_, mine) = send(&app, Method::GET, "/bookings", Some(&alice), None).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["history"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn request_errors_use_error_shape() {
    let app = start_test_app();
    let s = seed(&app).await;
    let alice = token(7, "user");

    let (status, body) = send(
        &app,
        Method::POST,
        "/bookings",
        Some(&alice),
        Some(booking_body(&s, "2024-06-05", "2024-06-01")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let mut over = booking_body(&s, "2024-06-01", "2024-06-02");
    over["num_guests"] = json!(3);
    let (status, _) = send(&app, Method::POST, "/bookings", Some(&alice), Some(over)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::POST, "/bookings", Some(&alice), Some(json!({ "hotel_id": 5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, body) = send(&app, Method::GET, &format!("/hotels/{}", Ulid::new()), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = send(&app, Method::GET, "/hotels/not-an-id", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_routes_reject_users() {
    let app = start_test_app();
    let s = seed(&app).await;
    let alice = token(7, "user");

    let (status, body) = send(
        &app,
        Method::POST,
        "/admin/hotels",
        Some(&alice),
        Some(json!({ "name": "Mine", "city": "Pokhara", "country": "Nepal" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let report = format!("/admin/reports/hotel/{}/occupancy?from=2024-06-01&to=2024-06-11", s.hotel);
    let (status, _) = send(&app, Method::GET, &report, Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::GET, "/admin/reports/user/7/bookings", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, Method::GET, &report, Some(&s.admin), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn reports_for_admins() {
    let app = start_test_app();
    let s = seed(&app).await;
    let alice = token(7, "user");
    for (check_in, check_out) in [("2024-06-01", "2024-06-05"), ("2024-06-05", "2024-06-06")] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/bookings",
            Some(&alice),
            Some(booking_body(&s, check_in, check_out)),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let uri = format!("/admin/reports/hotel/{}/occupancy?from=2024-06-01&to=2024-06-11", s.hotel);
    let (_, occ) = send(&app, Method::GET, &uri, Some(&s.admin), None).await;
    assert_eq!(occ["room_nights_booked"], 5);
    assert_eq!(occ["room_nights_total"], 10);
    assert_eq!(occ["occupancy_rate"], json!(0.5));

    let uri = format!("/admin/reports/hotel/{}/user-bookings", s.hotel);
    let (_, top) = send(&app, Method::GET, &uri, Some(&s.admin), None).await;
    assert_eq!(top, json!([{ "user_id": 7, "bookings": 2 }]));

    let (_, user) = send(&app, Method::GET, "/admin/reports/user/7/bookings", Some(&s.admin), None).await;
    assert_eq!(user.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn hotel_detail_with_availability() {
    let app = start_test_app();
    let s = seed(&app).await;

    let (status, list) = send(&app, Method::GET, "/hotels?city=kathmandu", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list[0]["name"], "Hotel H");
    assert_eq!(list[0]["total_rooms"], 1);

    let uri = format!("/hotels/{}?check_in=2024-06-01&check_out=2024-06-03", s.hotel);
    let (status, detail) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["room_types"][0]["rooms"][0]["room_number"], "101");
    assert_eq!(detail["availability"][&s.deluxe]["any_available"], true);

    let patch = format!("/admin/room-types/{}", s.deluxe);
    let (status, _) = send(&app, Method::PATCH, &patch, Some(&s.admin), Some(json!({ "active": false }))).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/hotels/{}/availability?check_in=2024-06-01&check_out=2024-06-03", s.hotel);
    let (status, map) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(map, json!({}));
}

#[tokio::test]
async fn change_booking_dates() {
    let app = start_test_app();
    let s = seed(&app).await;
    let alice = token(7, "user");
    let bob = token(8, "user");

    let first = booking_body(&s, "2024-06-01", "2024-06-04");
    let (_, a) = send(&app, Method::POST, "/bookings", Some(&alice), Some(first)).await;
    let second = booking_body(&s, "2024-06-06", "2024-06-08");
    let (_, b) = send(&app, Method::POST, "/bookings", Some(&bob), Some(second)).await;
    let a_uri = format!("/bookings/{}", a["booking_id"].as_str().unwrap());
    let b_uri = format!("/bookings/{}", b["booking_id"].as_str().unwrap());

    let later = json!({ "check_out": "2024-06-06" });
    let (status, moved) = send(&app, Method::PATCH, &a_uri, Some(&alice), Some(later)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["check_in"], "2024-06-01");
    assert_eq!(moved["check_out"], "2024-06-06");
    assert_eq!(moved["nights"], 5);
    assert_eq!(moved["room_number"], "101");

    let (status, err) = send(&app, Method::PATCH, &b_uri, Some(&bob), Some(json!({ "check_in": "2024-06-05" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "capacity");

    let (status, _) = send(&app, Method::PATCH, &a_uri, Some(&bob), Some(json!({ "num_guests": 1 }))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = send(&app, Method::PATCH, &a_uri, Some(&alice), Some(json!({ "check_in": "june" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (_, unchanged) = send(&app, Method::GET, &b_uri, Some(&bob), None).await;
    assert_eq!(unchanged["check_in"], "2024-06-06");
}

#[tokio::test]
async fn admin_inventory_lists_page() {
    let app = start_test_app();
    let s = seed(&app).await;
    for n in ["102", "103", "104"] {
        let (status, _) = send(
            &app,
            Method::POST,
            "/admin/rooms",
            Some(&s.admin),
            Some(json!({ "room_type_id": s.deluxe, "room_number": n })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let uri = format!("/admin/rooms?hotel_id={}&page=2&limit=3", s.hotel);
    let (status, page) = send(&app, Method::GET, &uri, Some(&s.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["page"], 2);
    assert_eq!(page["limit"], 3);
    assert_eq!(page["total"], 4);
    assert_eq!(page["items"][0]["room_number"], "104");
    assert_eq!(page["items"][0]["hotel_name"], "Hotel H");
    assert_eq!(page["items"][0]["room_type_name"], "Deluxe");

    let uri = format!("/admin/rooms?room_type_id={}&limit=oops", s.deluxe);
    let (_, page) = send(&app, Method::GET, &uri, Some(&s.admin), None).await;
    assert_eq!(page["limit"], 20);
    assert_eq!(page["items"].as_array().unwrap().len(), 4);

    let (status, types) = send(&app, Method::GET, "/admin/room-types", Some(&s.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(types["total"], 1);
    assert_eq!(types["items"][0]["id"], json!(s.deluxe));
    assert_eq!(types["items"][0]["hotel_name"], "Hotel H");

    let uri = format!("/admin/room-types?hotel_id={}", Ulid::new());
    let (status, _) = send(&app, Method::GET, &uri, Some(&s.admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let alice = token(7, "user");
    let (status, _) = send(&app, Method::GET, "/admin/rooms", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::GET, "/admin/room-types", Some(&alice), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn my_booking_count_at_a_hotel() {
    let app = start_test_app();
    let s = seed(&app).await;
    let alice = token(7, "user");
    let uri = format!("/me/reports/hotel/{}/count", s.hotel);

    let (status, _) = send(&app, Method::GET, &uri, None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, first) = send(
        &app,
        Method::POST,
        "/bookings",
        Some(&alice),
        Some(booking_body(&s, "2024-06-01", "2024-06-02")),
    )
    .await;
    let second = booking_body(&s, "2024-06-02", "2024-06-03");
    send(&app, Method::POST, "/bookings", Some(&alice), Some(second)).await;
    let cancel = format!("/bookings/{}/cancel", first["booking_id"].as_str().unwrap());
    send(&app, Method::PATCH, &cancel, Some(&alice), None).await;

    let (status, body) = send(&app, Method::GET, &uri, Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "user_id": 7, "hotel_id": s.hotel, "count": 1 }));

    let (_, body) = send(&app, Method::GET, &uri, Some(&token(8, "user")), None).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn inactive_hotels_are_admin_only() {
    let app = start_test_app();
    let s = seed(&app).await;
    let patch = format!("/admin/hotels/{}", s.hotel);
    let (status, _) = send(&app, Method::PATCH, &patch, Some(&s.admin), Some(json!({ "status": "inactive" }))).await;
    assert_eq!(status, StatusCode::OK);

    let detail = format!("/hotels/{}", s.hotel);
    let (status, body) = send(&app, Method::GET, &detail, None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");
    let (status, _) = send(&app, Method::GET, &detail, Some(&token(7, "user")), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send(&app, Method::GET, &detail, Some(&s.admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["hotel"]["status"], "inactive");

    let (_, public) = send(&app, Method::GET, "/hotels", None, None).await;
    assert_eq!(public, json!([]));
    let (_, all) = send(&app, Method::GET, "/hotels", Some(&s.admin), None).await;
    assert_eq!(all[0]["id"], json!(s.hotel));

    let (status, _) = send(&app, Method::GET, "/hotels", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
