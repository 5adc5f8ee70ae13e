use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use match_engine::{
    config::RulesConfig,
    web::{router, AppState, PRINCIPAL_HEADER},
    MatchService,
};

fn app(require_principal: bool) -> Router {
    router(AppState {
        service: MatchService::in_memory(RulesConfig::default()),
        require_principal,
    })
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    send_with(app, method, uri, body, &[(PRINCIPAL_HEADER, "coach-1")]).await
}

async fn send_with(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    headers: &[(&str, &str)],
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json)?))?,
        None => builder.body(Body::empty())?,
    };

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

async fn app_with_match() -> Result<Router> {
    let app = app(true);
    let (status, _) = send(
        &app,
        Method::POST,
        "/matches",
        Some(json!({ "id": "m1", "homeTeamId": "home", "awayTeamId": "away" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    Ok(app)
}

#[tokio::test]
async fn test_goal_event_round_trip() -> Result<()> {
    let app = app_with_match().await?;

    let (status, event) = send(
        &app,
        Method::POST,
        "/matches/m1/events",
        Some(json!({ "minute": 10, "type": "GOAL", "playerId": "P", "teamId": "home" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(event["type"], "GOAL");
    assert_eq!(event["sequence"], 1);

    let (status, body) = send(&app, Method::GET, "/matches/m1", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scoreHome"], 1);
    assert_eq!(body["scoreAway"], 0);
    assert_eq!(body["events"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn test_missing_minute_is_bad_request_with_error_body() -> Result<()> {
    let app = app_with_match().await?;

    let (status, body) = send(
        &app,
        Method::POST,
        "/matches/m1/events",
        Some(json!({ "type": "GOAL", "playerId": "P", "teamId": "home" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "minute: is required" }));
    Ok(())
}

#[tokio::test]
async fn test_malformed_body_uses_error_shape() -> Result<()> {
    let app = app_with_match().await?;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/matches/m1/lineup",
        Some(json!({ "formationName": "4-4-2", "formationType": "TWELVE_A_SIDE" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().is_some_and(|e| e.starts_with("body:")));
    Ok(())
}

#[tokio::test]
async fn test_missing_principal_is_forbidden() -> Result<()> {
    let app = app_with_match().await?;

    let (status, body) = send_with(&app, Method::GET, "/matches/m1", None, &[]).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "authentication required");

    let open = self::app(false);
    let (status, _) = send_with(&open, Method::GET, "/matches/unknown", None, &[]).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_squad_lineup_and_if_match() -> Result<()> {
    let app = app_with_match().await?;

    let (status, squad) = send(
        &app,
        Method::PUT,
        "/matches/m1/squad",
        Some(json!({ "playerIds": ["A", "B", "C"] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(squad.as_array().map(Vec::len), Some(3));
    assert_eq!(squad[0]["status"], "CALLED");

    let lineup = json!({
        "formationName": "4-3-3",
        "formationType": "ELEVEN_V_ELEVEN",
        "positions": [
            { "playerId": "A", "positionCode": "GK", "x": 50.0, "y": 5.0 },
            { "playerId": "B", "positionCode": "ST" }
        ]
    });

    let (status, body) = send_with(
        &app,
        Method::PUT,
        "/matches/m1/lineup",
        Some(lineup.clone()),
        &[(PRINCIPAL_HEADER, "coach-1"), ("if-match", "\"0\"")],
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, body) = send_with(
        &app,
        Method::PUT,
        "/matches/m1/lineup",
        Some(lineup),
        &[(PRINCIPAL_HEADER, "coach-1"), ("if-match", "1")],
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], 2);
    assert_eq!(body["lineup"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["lineupComplete"], false);
    assert_eq!(body["formationType"], "ELEVEN_V_ELEVEN");

    let statuses: Vec<(String, String)> = body["squad"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|e| {
            (
                e["playerId"].as_str().unwrap_or_default().to_string(),
                e["status"].as_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("A".to_string(), "STARTING".to_string()),
            ("B".to_string(), "STARTING".to_string()),
            ("C".to_string(), "BENCH".to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_kickoff_substitution_and_minutes_report() -> Result<()> {
    let app = app_with_match().await?;
    send(&app, Method::PUT, "/matches/m1/squad", Some(json!({ "playerIds": ["X", "Y"] }))).await?;
    send(
        &app,
        Method::PUT,
        "/matches/m1/lineup",
        Some(json!({
            "formationName": "2-3-1",
            "formationType": "SEVEN_V_SEVEN",
            "positions": [{ "playerId": "Y", "positionCode": "GK" }]
        })),
    )
    .await?;

    let (status, _) = send(&app, Method::POST, "/matches/m1/kickoff", None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::POST,
        "/matches/m1/events",
        Some(json!({
            "minute": 60, "type": "SUB_ON", "playerId": "X",
            "relatedPlayerId": "Y", "teamId": "home"
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);

    let (status, report) = send(&app, Method::GET, "/matches/m1/minutes?at=70", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["at"], 70);
    assert_eq!(
        report["players"],
        json!([
            {
                "playerId": "X", "onField": true, "played": 10,
                "intervals": [{ "matchId": "m1", "playerId": "X", "minuteOn": 60, "minuteOff": null }]
            },
            {
                "playerId": "Y", "onField": false, "played": 60,
                "intervals": [{ "matchId": "m1", "playerId": "Y", "minuteOn": 0, "minuteOff": 60 }]
            }
        ])
    );
    Ok(())
}

#[tokio::test]
async fn test_formation_history_and_recompute() -> Result<()> {
    let app = app_with_match().await?;

    let (status, formation) = send(
        &app,
        Method::POST,
        "/matches/m1/formations",
        Some(json!({ "formationName": "3-2-3", "formationType": "NINE_V_NINE" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(formation["formationName"], "3-2-3");

    send(
        &app,
        Method::POST,
        "/matches/m1/events",
        Some(json!({ "minute": 33, "type": "GOAL", "playerId": "P", "teamId": "away" })),
    )
    .await?;

    let (status, body) = send(&app, Method::POST, "/matches/m1/score/recompute", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scoreAway"], 1);
    assert_eq!(body["formationType"], "NINE_V_NINE");
    Ok(())
}

#[tokio::test]
async fn test_delete_then_get_is_not_found() -> Result<()> {
    let app = app_with_match().await?;

    let (status, body) = send(&app, Method::DELETE, "/matches/m1", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "deleted": true }));

    let (status, body) = send(&app, Method::GET, "/matches/m1", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "error": "match m1 not found" }));

    let (status, _) = send(&app, Method::GET, "/matches/m1/events", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_duplicate_match_is_conflict() -> Result<()> {
    let app = app_with_match().await?;
    let (status, body) = send(
        &app,
        Method::POST,
        "/matches",
        Some(json!({ "id": "m1", "homeTeamId": "home", "awayTeamId": "away" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "match already exists");
    Ok(())
}

#[tokio::test]
async fn test_stats_and_health_need_no_principal() -> Result<()> {
    let app = app_with_match().await?;
    send(
        &app,
        Method::POST,
        "/matches/m1/events",
        Some(json!({ "minute": -3, "type": "GOAL", "playerId": "P", "teamId": "home" })),
    )
    .await?;

    send_with(&app, Method::GET, "/matches/m1", None, &[]).await?;

    let (status, stats) = send_with(&app, Method::GET, "/stats", None, &[]).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["validation_failures"], 1);
    assert_eq!(stats["forbidden_requests"], 1);

    let (status, health) = send_with(&app, Method::GET, "/health", None, &[]).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "ok");
    Ok(())
}
