//! Integration tests for the chat message and plan queries.
//!
//! Each test runs against its own temporary database on the shared
//! PostgreSQL server from `fitgenie-test-utils`.

use serde_json::json;
use uuid::Uuid;

use fitgenie_db::models::{ChatRole, TurnMetadata};
use fitgenie_db::queries::plans::{self, NewPlan};
use fitgenie_db::queries::chat_messages;
use fitgenie_test_utils::{create_test_db, drop_test_db};

#[tokio::test]
async fn insert_message_derives_role_from_metadata() {
    let (pool, db_name) = create_test_db().await;
    let user_id = Uuid::new_v4();

    let user_turn = chat_messages::insert_message(
        &pool,
        user_id,
        "Create a 4-week beginner strength plan",
        &TurnMetadata::User {
            context: Some(json!({ "fitnessLevel": "beginner" })),
        },
    )
    .await
    .expect("insert user turn");
    assert_eq!(user_turn.role, ChatRole::User);
    assert_eq!(user_turn.user_id, user_id);

    let failure_turn = chat_messages::insert_message(
        &pool,
        user_id,
        "sorry",
        &TurnMetadata::AssistantFailure {
            error: "connection reset".into(),
        },
    )
    .await
    .expect("insert assistant turn");
    assert_eq!(failure_turn.role, ChatRole::Assistant);
    assert_eq!(
        failure_turn.metadata,
        TurnMetadata::AssistantFailure {
            error: "connection reset".into()
        }
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn recent_messages_are_oldest_first_and_limited() {
    let (pool, db_name) = create_test_db().await;
    let user_id = Uuid::new_v4();
    let other_user = Uuid::new_v4();

    for i in 0..5 {
        chat_messages::insert_message(
            &pool,
            user_id,
            &format!("message {i}"),
            &TurnMetadata::User { context: None },
        )
        .await
        .unwrap();
    }
    chat_messages::insert_message(
        &pool,
        other_user,
        "not mine",
        &TurnMetadata::User { context: None },
    )
    .await
    .unwrap();

    let recent = chat_messages::list_recent_messages(&pool, user_id, 3)
        .await
        .unwrap();
    let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["message 2", "message 3", "message 4"]);

    assert_eq!(
        chat_messages::count_messages_for_user(&pool, user_id)
            .await
            .unwrap(),
        5
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn plans_are_scoped_to_their_owner() {
    let (pool, db_name) = create_test_db().await;
    let owner = Uuid::new_v4();
    let stranger = Uuid::new_v4();
    let payload = json!({ "plan": { "type": "strength", "durationWeeks": 4 } });

    let plan = plans::insert_plan(
        &pool,
        &NewPlan {
            id: Uuid::new_v4(),
            user_id: owner,
            source: "gemini",
            prompt_snapshot: "Create a 4-week beginner strength plan",
            plan_json: &payload,
        },
    )
    .await
    .expect("insert plan");
    assert_eq!(plan.plan_json, payload);
    assert_eq!(plan.source, "gemini");

    let fetched = plans::get_plan_for_user(&pool, owner, plan.id)
        .await
        .unwrap()
        .expect("owner sees the plan");
    assert_eq!(fetched.prompt_snapshot, "Create a 4-week beginner strength plan");

    assert!(
        plans::get_plan_for_user(&pool, stranger, plan.id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(plans::list_plans_for_user(&pool, stranger).await.unwrap().is_empty());
    assert_eq!(plans::list_plans_for_user(&pool, owner).await.unwrap().len(), 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn migrations_create_both_tables() {
    let (pool, db_name) = create_test_db().await;

    let counts = fitgenie_db::pool::table_counts(&pool).await.unwrap();
    assert_eq!(
        counts,
        vec![("chat_messages".to_string(), 0), ("plans".to_string(), 0)]
    );

    pool.close().await;
    drop_test_db(&db_name).await;
}
