//! Issue a development JWT for exercising the direct API.
//!
//! Usage: `cargo run -p vg-server --example generate_test_jwt -- [user_id]`
//! Signs with `WEB_SERVER_JWT_SECRET` (or the development default).

use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;

fn main() {
    let user_id: i64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(123);

    let secret = std::env::var("WEB_SERVER_JWT_SECRET")
        .unwrap_or_else(|_| "your-secret-key-change-in-production".to_string());

    let claims = json!({
        "sub": user_id,
        "exp": chrono::Utc::now().timestamp() + 24 * 3600,
        "iat": chrono::Utc::now().timestamp(),
    });

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("signing cannot fail with an HS256 secret");

    println!("{token}");
    eprintln!("user_id={user_id}, valid for 24h");
}
