use std::sync::Arc;
use std::time::Duration;

use jsonsmith::inference::{
    FailureKind, InferenceOutcome, InferenceRequest, ParsedPayload, RetryOrchestrator,
    SamplingPolicy, ScriptedBackend, ScriptedReply,
};
use jsonsmith::prompt::{render_template, Substitutions};
use pretty_assertions::assert_eq;
use serde_json::json;

fn text(s: &str) -> ScriptedReply {
    ScriptedReply::Text(s.to_string())
}

fn payload(value: serde_json::Value) -> ParsedPayload {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

#[tokio::test]
async fn valid_first_reply_makes_exactly_one_call() {
    let backend = Arc::new(ScriptedBackend::always(r#"{"answer": "yes"}"#));
    let orchestrator = RetryOrchestrator::new(backend.clone(), 2);

    let outcome = orchestrator
        .run(&InferenceRequest::new("q", ["answer"], SamplingPolicy::default()))
        .await;

    assert_eq!(
        outcome,
        InferenceOutcome::Success {
            data: payload(json!({"answer": "yes"}))
        }
    );
    assert_eq!(backend.call_count(), 1);
    assert_eq!(orchestrator.metrics().summary().first_attempt_successes, 1);
}

#[tokio::test]
async fn malformed_replies_use_every_attempt() {
    for max_attempts in 1..=4 {
        let backend = Arc::new(ScriptedBackend::always("not json at all"));
        let orchestrator = RetryOrchestrator::new(backend.clone(), 2);

        let outcome = orchestrator
            .run(
                &InferenceRequest::new("q", ["answer"], SamplingPolicy::default())
                    .with_max_attempts(max_attempts),
            )
            .await;

        assert_eq!(backend.call_count(), max_attempts as usize);
        assert_eq!(outcome.failure_kind(), Some(FailureKind::ParseError));
        assert!(outcome.data().is_none());
    }
}

#[tokio::test]
async fn top_p_decays_per_attempt() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        text("{"),
        text("{"),
        text(r#"{"k": 1}"#),
    ]));
    let orchestrator = RetryOrchestrator::new(backend.clone(), 2);
    let sampling = SamplingPolicy {
        top_p: 0.8,
        ..SamplingPolicy::default()
    };

    let outcome = orchestrator
        .run(&InferenceRequest::new("q", ["k"], sampling).with_max_attempts(3))
        .await;
    assert!(outcome.is_success());

    let top_ps: Vec<f64> = backend.calls().iter().map(|c| c.sampling.top_p).collect();
    assert_eq!(top_ps.len(), 3);
    for (observed, expected) in top_ps.iter().zip([0.8, 0.7, 0.6]) {
        assert!((observed - expected).abs() < 1e-9, "{} != {}", observed, expected);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn extra_request_waits_for_a_permit() {
    let backend = Arc::new(
        ScriptedBackend::always(r#"{"a": 1}"#).with_delay(Duration::from_millis(150)),
    );
    let orchestrator = Arc::new(RetryOrchestrator::new(backend.clone(), 2));

    let handles: Vec<_> = (0..3)
        .map(|i| {
            let orchestrator = Arc::clone(&orchestrator);
            tokio::spawn(async move {
                orchestrator
                    .run(&InferenceRequest::new(
                        format!("q{}", i),
                        ["a"],
                        SamplingPolicy::default(),
                    ))
                    .await
            })
        })
        .collect();
    for outcome in futures::future::join_all(handles).await {
        assert!(outcome.unwrap().is_success());
    }

    let mut calls = backend.calls();
    assert_eq!(calls.len(), 3);
    assert!(backend.peak_concurrency() <= 2);

    calls.sort_by_key(|c| c.started_at);
    let earliest_finish = calls[..2]
        .iter()
        .map(|c| c.finished_at)
        .min()
        .unwrap();
    assert!(calls[2].started_at >= earliest_finish);
    assert_eq!(orchestrator.gate().available(), 2);
}

#[tokio::test]
async fn key_set_must_match_exactly() {
    for reply in [r#"{"a": 1}"#, r#"{"a": 1, "b": 2, "c": 3}"#, r#"{"a": 1, "c": 2}"#] {
        let backend = Arc::new(ScriptedBackend::always(reply));
        let orchestrator = RetryOrchestrator::new(backend, 2);

        let outcome = orchestrator
            .run(
                &InferenceRequest::new("q", ["a", "b"], SamplingPolicy::default())
                    .with_max_attempts(1),
            )
            .await;
        assert_eq!(outcome.failure_kind(), Some(FailureKind::SchemaError), "{}", reply);
    }
}

#[tokio::test]
async fn fenced_answer_end_to_end() {
    let mut subs = Substitutions::new();
    subs.insert("<input_text>".to_string(), "2+2?".to_string());
    let prompt = render_template("Q: <input_text>", &subs);
    assert_eq!(prompt, "Q: 2+2?");

    let backend = Arc::new(ScriptedBackend::always("```json\n{\"answer\":\"4\"}\n```"));
    let orchestrator = RetryOrchestrator::new(backend.clone(), 2);

    let outcome = orchestrator
        .run(&InferenceRequest::new(prompt, ["answer"], SamplingPolicy::default()))
        .await;

    assert_eq!(outcome.data(), Some(&payload(json!({"answer": "4"}))));
    assert_eq!(backend.calls()[0].prompt, "Q: 2+2?");
}

#[tokio::test]
async fn failing_backend_exhausts_attempts() {
    let backend = Arc::new(ScriptedBackend::always_failing("connection refused"));
    let orchestrator = RetryOrchestrator::new(backend.clone(), 2);

    let outcome = orchestrator
        .run(&InferenceRequest::new("q", ["a"], SamplingPolicy::default()).with_max_attempts(3))
        .await;

    assert_eq!(backend.call_count(), 3);
    match outcome {
        InferenceOutcome::Failure {
            kind,
            message,
            last_payload,
        } => {
            assert_eq!(kind, FailureKind::BackendError);
            assert!(message.starts_with(InferenceOutcome::EXHAUSTED_PREFIX), "{}", message);
            assert!(message.contains("connection refused"));
            assert!(last_payload.is_none());
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(orchestrator.metrics().summary().exhausted_requests, 1);
}

#[tokio::test]
async fn panicking_backend_releases_its_permit() {
    let backend = Arc::new(ScriptedBackend::new(vec![
        ScriptedReply::Panic("boom".to_string()),
        text(r#"{"a": true}"#),
    ]));
    let orchestrator = RetryOrchestrator::new(backend, 1);

    let outcome = orchestrator
        .run(&InferenceRequest::new("q", ["a"], SamplingPolicy::default()))
        .await;

    assert!(outcome.is_success());
    assert_eq!(orchestrator.gate().available(), 1);
}
