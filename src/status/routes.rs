//! Status API route handlers.
//!
//! All endpoints return JSON built from the last completed cycle.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::engine::scheduler::StatusHandle;
use crate::types::{CycleOutcome, CycleState, Recommendation};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct StatusState {
    pub status: StatusHandle,
    /// Sink the analysis stage writes to, reported as-is.
    pub db_type: String,
}

impl StatusState {
    pub fn new(status: StatusHandle, db_type: String) -> Self {
        Self { status, db_type }
    }
}

pub type AppState = Arc<StatusState>;

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub message: String,
    pub status: String,
    pub db_type: String,
}

/// One-line description of the last cycle.
fn describe(state: &CycleState) -> String {
    match &state.last_outcome {
        None => "Waiting for the first cycle".into(),
        Some(CycleOutcome::Success { empty: true, .. }) => {
            "No listings matched the last search".into()
        }
        Some(CycleOutcome::Success { deals: 0, listings, .. }) => {
            format!("No deals among {listings} listings in the last cycle")
        }
        Some(CycleOutcome::Success { deals, listings, .. }) => {
            format!("{deals} deal(s) among {listings} listings in the last cycle")
        }
        Some(CycleOutcome::Failure { stage, kind, .. }) => format!(
            "Last cycle failed at {stage} ({kind}); {} consecutive failure(s)",
            state.consecutive_failures
        ),
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/history
pub async fn get_history(State(state): State<AppState>) -> Json<HistoryResponse> {
    let snapshot = state.status.snapshot().await;
    Json(HistoryResponse {
        message: describe(&snapshot),
        status: snapshot.health().to_string(),
        db_type: state.db_type.clone(),
    })
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<CycleState> {
    Json(state.status.snapshot().await)
}

/// GET /api/deals
pub async fn get_deals(State(state): State<AppState>) -> Json<Vec<Recommendation>> {
    Json(state.status.snapshot().await.last_recommendations)
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CycleError, CycleSummary, FetchError};
    use chrono::Utc;

    fn deal() -> Recommendation {
        Recommendation {
            name: "원한".into(),
            price: 1500,
            grade: Some("전설".into()),
            z_score: -1.9,
        }
    }

    fn app_state(state: CycleState) -> AppState {
        Arc::new(StatusState::new(StatusHandle::with_state(state), "none".into()))
    }

    #[test]
    fn test_describe_variants() {
        let mut state = CycleState::new();
        assert_eq!(describe(&state), "Waiting for the first cycle");

        state.record_success(
            &CycleSummary {
                empty: true,
                ..CycleSummary::default()
            },
            Utc::now(),
        );
        assert_eq!(describe(&state), "No listings matched the last search");

        state.record_success(
            &CycleSummary {
                normalized: 12,
                recommendations: vec![deal()],
                ..CycleSummary::default()
            },
            Utc::now(),
        );
        assert_eq!(describe(&state), "1 deal(s) among 12 listings in the last cycle");

        let err = CycleError::Fetch(FetchError::Unauthorized { detail: "401".into() });
        state.record_failure(&err, Utc::now());
        assert_eq!(
            describe(&state),
            "Last cycle failed at fetch (unauthorized); 1 consecutive failure(s)"
        );
    }

    #[tokio::test]
    async fn test_get_history_degraded() {
        let mut state = CycleState::new();
        let err = CycleError::Fetch(FetchError::Network { detail: "timeout".into() });
        state.record_failure(&err, Utc::now());

        let Json(resp) = get_history(State(app_state(state))).await;
        assert_eq!(resp.status, "degraded");
        assert_eq!(resp.db_type, "none");
    }

    #[tokio::test]
    async fn test_get_deals_after_success() {
        let mut state = CycleState::new();
        state.record_success(
            &CycleSummary {
                normalized: 6,
                recommendations: vec![deal()],
                ..CycleSummary::default()
            },
            Utc::now(),
        );

        let Json(deals) = get_deals(State(app_state(state))).await;
        assert_eq!(deals, vec![deal()]);
    }

    #[tokio::test]
    async fn test_get_status_snapshot() {
        let Json(state) = get_status(State(app_state(CycleState::new()))).await;
        assert_eq!(state.cycles_run, 0);
        assert_eq!(state.health(), "starting");
    }

    #[test]
    fn test_history_response_serializes() {
        let resp = HistoryResponse {
            message: "m".into(),
            status: "ok".into(),
            db_type: "none".into(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["db_type"], "none");
    }
}
