mod common;

use caravel::caravel::agent::AgentName;
use caravel::caravel::config::CoreConfig;
use caravel::caravel::event::{CancelFlag, ChannelSink, DispatchEvent, EventSink};
use caravel::caravel::memstore::InMemoryStore;
use caravel::caravel::planner::{AutoExecuteStatus, GoalPlanner};
use caravel::caravel::store::{GoalStatus, GoalStore, StepStatus};
use common::*;
use std::sync::Arc;

fn planner(client: Arc<ScriptedClient>, store: Arc<InMemoryStore>) -> GoalPlanner {
    GoalPlanner::new(CoreConfig::default(), client, store.clone()).with_trace_store(store)
}

#[tokio::test]
async fn plan_from_llm_is_saved_with_numbered_steps() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.set_plan(
        r#"{
            "title": "Land a backend role at Stripe",
            "steps": [
                {"title": "Find backend openings", "description": "search", "agent_name": "scout"},
                {"title": "Score resume fit", "description": "analyze", "agent_name": "match"},
                {"title": "Write cover letter", "description": "write", "agent_name": "forge"}
            ]
        }"#,
    );

    let store = Arc::new(InMemoryStore::new());
    let planner = planner(client, store.clone());
    let plan = planner
        .create_plan("Help me land a backend role at Stripe", "")
        .await;
    assert_eq!(plan.steps.len(), 3);

    let goal_id = planner.save_plan(3, &plan).await.unwrap();
    let steps = store.get_goal_steps(goal_id).await.unwrap();
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].step_number, 1);
    assert_eq!(steps[2].step_number, 3);
    assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
}

#[tokio::test]
async fn unreachable_planner_llm_falls_back_to_the_default_plan() {
    init_logging();
    let store = Arc::new(InMemoryStore::new());
    let planner = GoalPlanner::new(
        CoreConfig::default(),
        Arc::new(UnreachableClient),
        store.clone(),
    );

    let plan = planner.create_plan("become a data engineer", "").await;
    let agents: Vec<AgentName> = plan.steps.iter().map(|s| s.agent_name).collect();
    assert_eq!(
        agents,
        vec![
            AgentName::Scout,
            AgentName::Match,
            AgentName::Forge,
            AgentName::Coach
        ]
    );
}

#[tokio::test]
async fn execute_next_step_walks_the_plan_in_order() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.push_agent_reply(text_reply("FINAL_ANSWER step one results"));
    client.push_agent_reply(text_reply("FINAL_ANSWER step two results"));

    let store = Arc::new(InMemoryStore::new());
    let goal_id = store.create_goal(3, "Land a role", "").await.unwrap();
    store
        .add_goal_step(goal_id, 1, "Research", "search the market", AgentName::Scout)
        .await
        .unwrap();
    store
        .add_goal_step(goal_id, 2, "Analyze", "compare fit", AgentName::Match)
        .await
        .unwrap();

    let planner = planner(client, store.clone());

    let first = planner
        .execute_next_step(goal_id, 3, "", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.agent_name, AgentName::Scout);
    assert_eq!(first.status, StepStatus::Completed);
    assert!(first.output.contains("step one results"));

    let second = planner
        .execute_next_step(goal_id, 3, "", None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.agent_name, AgentName::Match);

    // No pending steps remain and the goal flipped to completed.
    assert!(planner
        .execute_next_step(goal_id, 3, "", None)
        .await
        .unwrap()
        .is_none());
    let goal = store.get_goal(goal_id, 3).await.unwrap().unwrap();
    assert_eq!(goal.status, GoalStatus::Completed);
}

#[tokio::test]
async fn auto_execute_skips_a_step_when_the_replanner_says_so() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.push_agent_reply(text_reply("FINAL_ANSWER research complete, fit already clear"));
    client.push_agent_reply(text_reply("FINAL_ANSWER interview prep done"));
    client.push_replan_reply(
        r#"{"action": "skip_next", "reason": "fit analysis already covered"}"#,
    );

    let store = Arc::new(InMemoryStore::new());
    let goal_id = store.create_goal(3, "Land a role", "").await.unwrap();
    store
        .add_goal_step(goal_id, 1, "Research", "", AgentName::Scout)
        .await
        .unwrap();
    store
        .add_goal_step(goal_id, 2, "Analyze fit", "", AgentName::Match)
        .await
        .unwrap();
    store
        .add_goal_step(goal_id, 3, "Interview prep", "", AgentName::Coach)
        .await
        .unwrap();

    let planner = planner(client, store.clone());
    let (sink, mut rx) = ChannelSink::new();
    let status = planner
        .auto_execute(
            goal_id,
            3,
            "",
            None,
            CancelFlag::new(),
            Some(Arc::new(sink) as Arc<dyn EventSink>),
        )
        .await;

    assert_eq!(status, AutoExecuteStatus::Completed);

    let steps = store.get_goal_steps(goal_id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Completed);
    assert_eq!(steps[1].status, StepStatus::Skipped);
    assert!(steps[1].output.starts_with("Skipped:"));
    assert_eq!(steps[2].status, StepStatus::Completed);

    let goal = store.get_goal(goal_id, 3).await.unwrap().unwrap();
    assert_eq!(goal.status, GoalStatus::Completed);

    // The replan and completion were surfaced as events.
    let mut saw_replan = false;
    let mut final_status = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            DispatchEvent::GoalReplan { adjustment, .. } => {
                saw_replan = true;
                assert_eq!(adjustment, "skip_next");
            }
            DispatchEvent::GoalCompleted { status } => final_status = Some(status),
            _ => {}
        }
    }
    assert!(saw_replan);
    assert_eq!(final_status.as_deref(), Some("completed"));
}

#[tokio::test]
async fn auto_execute_inserts_a_step_before_the_next_pending_one() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    client.push_agent_reply(text_reply("FINAL_ANSWER found an unusual company"));
    client.push_agent_reply(text_reply("FINAL_ANSWER deep dive done"));
    client.push_agent_reply(text_reply("FINAL_ANSWER materials written"));
    client.push_replan_reply(
        r#"{"action": "add_step", "reason": "need company research first",
            "new_title": "Company deep dive", "new_description": "research the company",
            "agent_name": "scout"}"#,
    );

    let store = Arc::new(InMemoryStore::new());
    let goal_id = store.create_goal(3, "Apply somewhere odd", "").await.unwrap();
    store
        .add_goal_step(goal_id, 1, "Research", "", AgentName::Scout)
        .await
        .unwrap();
    store
        .add_goal_step(goal_id, 2, "Write materials", "", AgentName::Forge)
        .await
        .unwrap();

    let planner = planner(client, store.clone());
    let status = planner
        .auto_execute(goal_id, 3, "", None, CancelFlag::new(), None)
        .await;
    assert_eq!(status, AutoExecuteStatus::Completed);

    let steps = store.get_goal_steps(goal_id).await.unwrap();
    assert_eq!(steps.len(), 3);
    // The inserted step took slot 2 and the forge step shifted to 3.
    assert_eq!(steps[1].title, "Company deep dive");
    assert_eq!(steps[1].step_number, 2);
    assert_eq!(steps[2].title, "Write materials");
    assert_eq!(steps[2].step_number, 3);
    assert!(steps.iter().all(|s| s.status == StepStatus::Completed));
}

#[tokio::test]
async fn auto_execute_stops_between_steps_on_cancel() {
    init_logging();
    let client = Arc::new(ScriptedClient::new());
    let store = Arc::new(InMemoryStore::new());
    let goal_id = store.create_goal(3, "Goal", "").await.unwrap();
    store
        .add_goal_step(goal_id, 1, "Research", "", AgentName::Scout)
        .await
        .unwrap();

    let cancel = CancelFlag::new();
    cancel.cancel();

    let planner = planner(client, store.clone());
    let (sink, mut rx) = ChannelSink::new();
    let status = planner
        .auto_execute(
            goal_id,
            3,
            "",
            None,
            cancel,
            Some(Arc::new(sink) as Arc<dyn EventSink>),
        )
        .await;

    assert_eq!(status, AutoExecuteStatus::Cancelled);
    let steps = store.get_goal_steps(goal_id).await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Pending);

    match rx.try_recv() {
        Ok(DispatchEvent::GoalCompleted { status }) => assert_eq!(status, "cancelled"),
        other => panic!("expected GoalCompleted event, got {:?}", other),
    }
}
