//! Decision request lifecycle through the workflow layer: single-shot
//! resolution, cancellation with metadata merge, lazy expiry, and access
//! enforcement.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use trellis_core::decision::{CreateDecision, DecisionFilter, DecisionWorkflow, MAX_OPTIONS};
use trellis_core::error::CoreError;
use trellis_core::events::ChangeBus;
use trellis_core::tree::{CreatePlan, NewNodeSpec, PlanTreeService};
use trellis_db::models::{
    CollaboratorRole, DecisionOption, DecisionStatus, DecisionUrgency, NodeType, Plan,
};
use trellis_db::queries::collaborators;
use trellis_test_utils::{create_test_db, drop_test_db};

async fn bootstrap(pool: &PgPool) -> (DecisionWorkflow, PlanTreeService, Uuid, Plan) {
    let bus = ChangeBus::default();
    let svc = PlanTreeService::new(pool.clone(), bus.clone());
    let workflow = DecisionWorkflow::new(pool.clone(), bus);
    let owner = Uuid::new_v4();
    let (plan, _root) = svc
        .create_plan(owner, CreatePlan::new("decisions"))
        .await
        .expect("plan bootstrap should succeed");
    (workflow, svc, owner, plan)
}

fn two_options(title: &str, plan_id: Uuid) -> CreateDecision {
    let mut params = CreateDecision::new(plan_id, title);
    params.options = vec![
        DecisionOption::new("option one"),
        DecisionOption::new("option two"),
    ];
    params
}

#[tokio::test]
async fn create_defaults_and_validation() {
    let (pool, db_name) = create_test_db().await;
    let (workflow, _svc, owner, plan) = bootstrap(&pool).await;

    let request = workflow
        .create(owner, two_options("pick a database", plan.id))
        .await
        .unwrap();
    assert_eq!(request.status, DecisionStatus::Pending);
    assert_eq!(request.urgency, DecisionUrgency::CanContinue);
    assert_eq!(request.requested_by, owner);
    assert_eq!(request.options.0.len(), 2);

    // An empty title is rejected up front.
    let err = workflow
        .create(owner, CreateDecision::new(plan.id, "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput(_)));

    // So is an option list over the cap.
    let mut oversized = CreateDecision::new(plan.id, "too many");
    oversized.options = (0..=MAX_OPTIONS)
        .map(|i| DecisionOption::new(format!("option {i}")))
        .collect();
    let err = workflow.create(owner, oversized).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidInput(_)));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn create_rejects_node_from_another_plan() {
    let (pool, db_name) = create_test_db().await;
    let (workflow, svc, owner, plan) = bootstrap(&pool).await;

    let (other_plan, other_root) = svc
        .create_plan(owner, CreatePlan::new("elsewhere"))
        .await
        .unwrap();
    let foreign_node = svc
        .create_node(
            owner,
            other_root.id,
            NewNodeSpec::new(NodeType::Task, "foreign"),
        )
        .await
        .unwrap();
    assert_eq!(foreign_node.plan_id, other_plan.id);

    let mut params = two_options("mismatched", plan.id);
    params.node_id = Some(foreign_node.id);
    let err = workflow.create(owner, params).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn resolve_is_single_shot() {
    let (pool, db_name) = create_test_db().await;
    let (workflow, _svc, owner, plan) = bootstrap(&pool).await;

    let request = workflow
        .create(owner, two_options("pick one", plan.id))
        .await
        .unwrap();

    let resolved = workflow
        .resolve(owner, request.id, "option one", Some("cheaper"))
        .await
        .unwrap();
    assert_eq!(resolved.status, DecisionStatus::Decided);
    assert_eq!(resolved.resolved_by, Some(owner));
    assert_eq!(resolved.decision.as_deref(), Some("option one"));
    assert_eq!(resolved.rationale.as_deref(), Some("cheaper"));
    assert!(resolved.resolved_at.is_some());

    // A second resolution fails and leaves the first one intact.
    let err = workflow
        .resolve(owner, request.id, "option two", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));

    let current = workflow.get(Some(owner), request.id).await.unwrap();
    assert_eq!(current.decision.as_deref(), Some("option one"));
    assert_eq!(current.resolved_at, resolved.resolved_at);

    // Cancelling a decided request fails too.
    let err = workflow
        .cancel(owner, request.id, "changed my mind")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn cancel_merges_reason_into_metadata() {
    let (pool, db_name) = create_test_db().await;
    let (workflow, _svc, owner, plan) = bootstrap(&pool).await;

    let mut params = two_options("abort me", plan.id);
    params.metadata = serde_json::json!({"source": "planning-session", "custom": "v"});
    let request = workflow.create(owner, params).await.unwrap();

    let cancelled = workflow
        .cancel(owner, request.id, "superseded by a new plan")
        .await
        .unwrap();
    assert_eq!(cancelled.status, DecisionStatus::Cancelled);
    assert_eq!(
        cancelled.metadata,
        serde_json::json!({
            "source": "planning-session",
            "custom": "v",
            "cancellation_reason": "superseded by a new plan",
        })
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn overdue_requests_read_as_expired() {
    let (pool, db_name) = create_test_db().await;
    let (workflow, _svc, owner, plan) = bootstrap(&pool).await;

    let mut overdue = two_options("too late", plan.id);
    overdue.expires_at = Some(Utc::now() - Duration::minutes(5));
    let overdue = workflow.create(owner, overdue).await.unwrap();

    let mut live = two_options("still open", plan.id);
    live.expires_at = Some(Utc::now() + Duration::hours(1));
    let live = workflow.create(owner, live).await.unwrap();

    // Reads report the effective status without writing it back.
    let fetched = workflow.get(Some(owner), overdue.id).await.unwrap();
    assert_eq!(fetched.status, DecisionStatus::Expired);
    let fetched = workflow.get(Some(owner), live.id).await.unwrap();
    assert_eq!(fetched.status, DecisionStatus::Pending);

    // Expired requests cannot be resolved even though the row still says
    // pending.
    let err = workflow
        .resolve(owner, overdue.id, "option one", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState(_)));

    // The status filter matches the effective status.
    let expired = workflow
        .list(
            Some(owner),
            plan.id,
            DecisionFilter {
                status: Some(DecisionStatus::Expired),
                urgency: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(expired.iter().map(|r| r.id).collect::<Vec<_>>(), vec![overdue.id]);

    let pending = workflow
        .list(
            Some(owner),
            plan.id,
            DecisionFilter {
                status: Some(DecisionStatus::Pending),
                urgency: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(pending.iter().map(|r| r.id).collect::<Vec<_>>(), vec![live.id]);

    // The sweep persists the expiry in storage.
    let swept = workflow.sweep_expired(owner, plan.id).await.unwrap();
    assert_eq!(swept, 1);
    let row = trellis_db::queries::decisions::get_decision_request(&pool, overdue.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.status, DecisionStatus::Expired);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_filters_by_urgency() {
    let (pool, db_name) = create_test_db().await;
    let (workflow, _svc, owner, plan) = bootstrap(&pool).await;

    let mut blocking = two_options("blocking call", plan.id);
    blocking.urgency = Some(DecisionUrgency::Blocking);
    let blocking = workflow.create(owner, blocking).await.unwrap();
    workflow
        .create(owner, two_options("background call", plan.id))
        .await
        .unwrap();

    let results = workflow
        .list(
            Some(owner),
            plan.id,
            DecisionFilter {
                status: None,
                urgency: Some(DecisionUrgency::Blocking),
            },
        )
        .await
        .unwrap();
    assert_eq!(results.iter().map(|r| r.id).collect::<Vec<_>>(), vec![blocking.id]);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn viewers_can_read_but_not_act() {
    let (pool, db_name) = create_test_db().await;
    let (workflow, _svc, owner, plan) = bootstrap(&pool).await;

    let request = workflow
        .create(owner, two_options("sensitive", plan.id))
        .await
        .unwrap();

    let viewer = Uuid::new_v4();
    collaborators::upsert_collaborator(&pool, plan.id, viewer, CollaboratorRole::Viewer)
        .await
        .unwrap();

    workflow.get(Some(viewer), request.id).await.unwrap();
    workflow
        .list(Some(viewer), plan.id, DecisionFilter::default())
        .await
        .unwrap();

    let err = workflow
        .create(viewer, two_options("not yours", plan.id))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = workflow
        .resolve(viewer, request.id, "option one", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    let err = workflow
        .cancel(viewer, request.id, "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Forbidden(_)));

    pool.close().await;
    drop_test_db(&db_name).await;
}
