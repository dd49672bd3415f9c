use std::collections::HashMap;
use std::time::Duration;

use axum::Router;
use serde_json::Value;

use crate::config::{self, RuntimeMode};
use crate::server::{start_message, Application};
use crate::state::AppState;

use super::{unreachable_db, write_env_file, ADMIN_PASSWORD, ADMIN_USER};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn test_start_message() {
    assert_eq!(start_message(RuntimeMode::Development, 8989), "Server on http://localhost:8989");
    assert_eq!(start_message(RuntimeMode::Production, 8080), "Server on port 8080...");
}

#[tokio::test]
async fn test_serves_docs_from_env_file() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let mut vars = config::sample_vars();
    vars.insert("PORT".into(), port.to_string());
    write_env_file(&dir.path().join(".env.development"), &vars);

    let env = HashMap::from([("NODE_ENV".to_string(), "development".to_string())]);
    let cfg = config::load_with_env(dir.path(), env).unwrap();
    assert_eq!(cfg.mode, RuntimeMode::Development);
    assert_eq!(cfg.port, port);
    let state = AppState::new(unreachable_db(&cfg), cfg);
    tokio::spawn(Application::new(state).listen(Router::new()));

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/docs-json", port);
    let mut first = None;
    for _ in 0..50 {
        match client.get(&url).send().await {
            Ok(res) => {
                first = Some(res);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(50)).await,
        }
    }
    let res = first.expect("server did not come up");
    assert_eq!(res.status(), 401);

    let res = client.get(&url).basic_auth(ADMIN_USER, Some(ADMIN_PASSWORD)).send().await.unwrap();
    assert_eq!(res.status(), 200);
    let doc: Value = res.json().await.unwrap();
    assert_eq!(doc["servers"][0]["url"], format!("http://localhost:{}", port));
}
