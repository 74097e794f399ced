//! Per-call timeouts and cancellation, driven on paused tokio time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use council::{
    Backend, ConsensusEngine, CouncilConfig, EngineConfig, ExternalFacts, InvalidVote, Pipeline,
    ScriptedBackend, StageDefinition, Team, VoteFallback,
};
use tokio_util::sync::CancellationToken;

/// Answers only after an hour
struct StalledBackend;

#[async_trait]
impl Backend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn generate(&self, _prompt: &str, _context: &str) -> String {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        "too late".to_string()
    }
}

fn short_timeout() -> EngineConfig {
    EngineConfig {
        call_timeout_secs: 5,
        vote_fallback: VoteFallback::Abstain,
        seed: Some(3),
        ..EngineConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_calls_count_as_empty() {
    let fast: Arc<dyn Backend> = Arc::new(ScriptedBackend::new("fast", ["fast answer", "2"]));
    let slow: Arc<dyn Backend> = Arc::new(StalledBackend);
    let team = Team::new(1, "timing", &[fast, slow], 2).unwrap();

    let outcome = ConsensusEngine::new(short_timeout())
        .run(&team, "task", "")
        .await
        .unwrap();

    assert_eq!(outcome.responses, vec!["fast answer".to_string(), String::new()]);

    let round = &outcome.rounds[0];
    assert_eq!(round.votes[1].rejected, Some(InvalidVote::TimedOut));
    assert!(round.votes[1].is_abstention());
    // Agent 1's vote for agent 2 is the only one tallied
    assert_eq!(round.tally, vec![(1, 0), (2, 1)]);
    assert_eq!(outcome.winner, 2);
    assert_eq!(outcome.consensus, "");
}

#[tokio::test(start_paused = true)]
async fn test_timeout_falls_back_to_random_vote() {
    let fast: Arc<dyn Backend> = Arc::new(ScriptedBackend::new("fast", ["a", "2"]));
    let slow: Arc<dyn Backend> = Arc::new(StalledBackend);
    let team = Team::new(1, "timing", &[fast, slow], 2).unwrap();

    let settings = EngineConfig {
        vote_fallback: VoteFallback::Random,
        ..short_timeout()
    };
    let outcome = ConsensusEngine::new(settings)
        .run(&team, "task", "")
        .await
        .unwrap();

    let vote = &outcome.rounds[0].votes[1];
    assert_eq!(vote.rejected, Some(InvalidVote::TimedOut));
    // The only live candidate other than agent 2 is agent 1
    assert_eq!(vote.target(), Some(1));
    assert_eq!(outcome.rounds[0].tallied_votes(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_engine_resolves_every_call_empty() {
    let cancel = CancellationToken::new();
    let slow: Arc<dyn Backend> = Arc::new(StalledBackend);
    let team = Team::new(1, "timing", &[slow], 3).unwrap();

    let engine = ConsensusEngine::new(EngineConfig {
        call_timeout_secs: 600,
        ..short_timeout()
    })
    .with_cancellation(cancel.clone());

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        trigger.cancel();
    });

    let outcome = engine.run(&team, "task", "").await.unwrap();

    assert!(outcome.responses.iter().all(String::is_empty));
    assert_eq!(outcome.rounds.len(), 2);
    assert_eq!(outcome.total_abstentions(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_pipeline_cancellation_skips_remaining_stages() {
    let mut config = CouncilConfig::default();
    config.engine.team_size = 2;
    config.engine.call_timeout_secs = 600;

    let stages = vec![
        StageDefinition::new(1, "structure", |_, _| Ok("task one".to_string())),
        StageDefinition::new(2, "code", |_, _| Ok("task two".to_string())),
    ];
    let backends: Vec<Arc<dyn Backend>> = vec![Arc::new(StalledBackend)];
    let pipeline = Pipeline::new(config, backends, stages).unwrap();

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        cancel.cancel();
    });

    let report = pipeline.run(ExternalFacts::new()).await;

    assert!(report.results.is_empty());
    let failed: Vec<u32> = report.failures.iter().map(|f| f.stage_id).collect();
    assert_eq!(failed, vec![1, 2]);
    assert!(report.failures.iter().all(|f| f.error == "cancelled"));
}
