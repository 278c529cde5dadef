//! Integration tests for step sequencing in a pipeline run.

mod common;

use common::{EVENT_TIMEOUT, Finish, device, probe_step};
use devlink_job::{PipelineEvent, PipelineRun, StepPipeline};
use rstest::rstest;
use std::time::Duration;

async fn next(run: &mut PipelineRun) -> PipelineEvent {
    tokio::time::timeout(EVENT_TIMEOUT, run.next_event())
        .await
        .expect("pipeline event in time")
        .expect("pipeline still running")
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
#[tokio::test]
async fn test_each_step_is_entered_once_in_order(#[case] count: usize) {
    const KEYS: [&str; 5] = ["s0", "s1", "s2", "s3", "s4"];
    let mut pipeline = StepPipeline::default();
    let mut probes = Vec::new();
    for key in KEYS.iter().take(count) {
        let (step, probe) = probe_step(*key, Finish::Immediately);
        pipeline = pipeline.with_step(step);
        probes.push(probe);
    }

    let mut run = pipeline.spawn(device("nano"));
    for expected in 0..count {
        match next(&mut run).await {
            PipelineEvent::StepEntered { index, meta } => {
                assert_eq!(index, expected);
                assert_eq!(meta.len(), expected);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    match next(&mut run).await {
        PipelineEvent::Completed { meta } => assert_eq!(meta.len(), count),
        other => panic!("unexpected {other:?}"),
    }

    assert!(probes.iter().all(|probe| probe.calls() == 1));
}

#[tokio::test]
async fn test_next_step_waits_for_the_current_one() {
    let (first, first_probe) = probe_step("first", Finish::OnCompletion);
    let (second, second_probe) = probe_step("second", Finish::Immediately);
    let mut run = StepPipeline::default()
        .with_step(first)
        .with_step(second)
        .spawn(device("nano"));

    assert!(matches!(next(&mut run).await, PipelineEvent::StepEntered { index: 0, .. }));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(first_probe.calls(), 1);
    assert_eq!(second_probe.calls(), 0);

    run.notify(0);
    match next(&mut run).await {
        PipelineEvent::StepEntered { index: 1, meta } => assert!(meta.contains_key("first")),
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(next(&mut run).await, PipelineEvent::Completed { .. }));
    assert_eq!(second_probe.inputs()[0].get_as::<bool>("first"), Some(true));
}

#[tokio::test]
async fn test_stale_completion_does_not_leak_into_later_steps() {
    let (first, _) = probe_step("first", Finish::OnCompletion);
    let (second, second_probe) = probe_step("second", Finish::OnCompletion);
    let mut run = StepPipeline::default()
        .with_step(first)
        .with_step(second)
        .spawn(device("nano"));

    assert!(matches!(next(&mut run).await, PipelineEvent::StepEntered { index: 0, .. }));
    run.notify(0);
    assert!(matches!(next(&mut run).await, PipelineEvent::StepEntered { index: 1, .. }));

    // A late duplicate for step 0 must not finish step 1.
    run.notify(0);
    let early = tokio::time::timeout(Duration::from_millis(50), run.next_event()).await;
    assert!(early.is_err());
    assert!(!second_probe.was_dropped());

    run.notify(1);
    assert!(matches!(next(&mut run).await, PipelineEvent::Completed { .. }));
}

#[tokio::test]
async fn test_failure_keeps_index_and_meta() {
    let (first, _) = probe_step("first", Finish::Immediately);
    let (second, _) = probe_step("second", Finish::FailFirst(1));
    let (third, third_probe) = probe_step("third", Finish::Immediately);
    let mut run = StepPipeline::default()
        .with_step(first)
        .with_step(second)
        .with_step(third)
        .spawn(device("nano"));

    let mut last = None;
    while let Some(event) = tokio::time::timeout(EVENT_TIMEOUT, run.next_event()).await.unwrap() {
        last = Some(event);
    }

    match last {
        Some(PipelineEvent::Failed { error, meta }) => {
            assert_eq!(error.step_index, 1);
            assert!(meta.contains_key("first"));
            assert!(!meta.contains_key("second"));
            assert_eq!(error.to_string(), "Step 1 failed: second failed on call 1");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(third_probe.calls(), 0);
}

#[tokio::test]
async fn test_dropping_the_run_drops_the_step() {
    let (step, probe) = probe_step("hang", Finish::OnCompletion);
    let mut run = StepPipeline::default().with_step(step).spawn(device("nano"));
    assert!(matches!(next(&mut run).await, PipelineEvent::StepEntered { index: 0, .. }));

    drop(run);
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while !probe.was_dropped() {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("step stream dropped");
}
