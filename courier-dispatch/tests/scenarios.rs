//! End-to-end behaviour of the processor against in-memory collaborators.

#![allow(clippy::unwrap_used)]

mod support;

use std::{path::PathBuf, sync::Arc, time::Duration};

use courier_common::model::{Command, Parameter, RenderedEmail};
use courier_dispatch::{
    AckTiming, BatchMode, Cancellation, DispatchError, ErrorKind, MailError, MessageProcessor,
    Outcome, PlaceholderRenderer, PlaceholderSyntax, ProcessorConfig, RecordState, Renderer,
    RetryBackoff, RetryPolicy, processor::BatchReport,
};
use courier_queue::QueueAdapter;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use support::{Harness, command_body, pc001, pc001_record, record};

fn best_effort() -> ProcessorConfig {
    ProcessorConfig {
        batch_mode: BatchMode::BestEffort,
        ..ProcessorConfig::default()
    }
}

fn transport(message: &str) -> MailError {
    MailError::Transport(message.to_string())
}

async fn run_one(harness: &Harness, record: courier_common::model::QueueRecord) -> BatchReport {
    let config = harness.processor.config().clone();
    assert_eq!(config.batch_mode, BatchMode::BestEffort);
    harness
        .processor
        .process_batch(&[record], &Cancellation::never())
        .await
        .unwrap()
}

fn only(report: &BatchReport) -> &courier_dispatch::RecordReport {
    assert_eq!(report.len(), 1);
    &report.records()[0]
}

#[tokio::test]
async fn test_happy_path_sends_once_and_acks() {
    let harness = Harness::new(ProcessorConfig::default());

    let report = harness
        .processor
        .process_batch(&[pc001_record("m1", 0)], &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(
        harness.sender.sent(),
        vec![RenderedEmail {
            sender: "remitente@example.com".to_string(),
            recipients: "destinatario@example.com".to_string(),
            subject: "Asunto de prueba".to_string(),
            body: "Hola, archivo1.txt.".to_string(),
            inline_image: None,
        }]
    );
    assert_eq!(harness.queue.deleted(), vec!["rh-m1".to_string()]);
    assert!(harness.queue.published().is_empty());

    let record = only(&report);
    assert!(matches!(record.outcome, Outcome::Acked));
    assert_eq!(
        record.path,
        vec![
            RecordState::Received,
            RecordState::Parsed,
            RecordState::Validated,
            RecordState::TemplateLoaded,
            RecordState::Rendered,
            RecordState::Sent,
            RecordState::Acked,
        ]
    );
    assert_eq!(report.successes(), 1);
}

#[tokio::test]
async fn test_unknown_template_is_acked_without_send() {
    let harness = Harness::new(ProcessorConfig::default());
    let body = command_body("ZZZZZ", &[("x", "y")], 0);

    let aborted = harness
        .processor
        .process_batch(&[record("m2", body)], &Cancellation::never())
        .await
        .unwrap_err();

    assert_eq!(aborted.message_id(), "m2");
    assert!(matches!(
        aborted.error(),
        Some(DispatchError::TemplateNotFound(id)) if id == "ZZZZZ"
    ));
    assert_eq!(harness.sender.attempts(), 0);
    assert_eq!(harness.queue.deleted(), vec!["rh-m2".to_string()]);

    let record = &aborted.report().records()[0];
    assert!(matches!(
        record.outcome,
        Outcome::FailedPermanent { acked: true, .. }
    ));
    assert_eq!(record.state(), Some(RecordState::FailedPermanent));
}

#[tokio::test]
async fn test_transient_failure_republishes_with_incremented_count() {
    let harness = Harness::new(ProcessorConfig {
        retry: RetryPolicy {
            delay_seconds: 30,
            ..RetryPolicy::default()
        },
        ..ProcessorConfig::default()
    });
    harness.sender.fail_next(transport("connection reset"));

    let report = harness
        .processor
        .process_batch(&[pc001_record("m3", 0)], &Cancellation::never())
        .await
        .unwrap();

    let published = harness.queue.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].delay_seconds, 30);

    let republished = Command::from_json(&published[0].body).unwrap();
    assert_eq!(republished.template_id, "PC001");
    assert_eq!(
        republished.parameters,
        vec![Parameter::new("nombre_archivo", "archivo1.txt")]
    );
    assert_eq!(republished.retry_count, 1);
    assert!(published[0].body.contains("\"retry_count\":1"));

    assert_eq!(harness.queue.deleted(), vec!["rh-m3".to_string()]);

    let record = only(&report);
    assert!(matches!(record.outcome, Outcome::Released { retry_count: 1 }));
    assert_eq!(
        &record.path[4..],
        &[
            RecordState::Rendered,
            RecordState::RetryScheduled,
            RecordState::Released
        ]
    );
}

#[tokio::test]
async fn test_exhausted_retries_are_not_republished() {
    let harness = Harness::new(ProcessorConfig::default());
    harness.sender.fail_next(transport("timeout"));

    let aborted = harness
        .processor
        .process_batch(&[pc001_record("m4", 3)], &Cancellation::never())
        .await
        .unwrap_err();

    assert_eq!(harness.sender.attempts(), 1);
    assert!(harness.queue.published().is_empty());
    assert_eq!(harness.queue.deleted(), vec!["rh-m4".to_string()]);
    assert!(matches!(
        aborted.error(),
        Some(DispatchError::RetriesExhausted {
            retry_count: 3,
            max_retries: 3,
            ..
        })
    ));
    assert!(matches!(
        aborted.report().records()[0].outcome,
        Outcome::FailedPermanent { acked: true, .. }
    ));
}

#[tokio::test]
async fn test_malformed_json_skips_lookup() {
    let harness = Harness::new(best_effort());

    let report = run_one(&harness, record("m5", "{not json")).await;

    assert_eq!(harness.store.lookups(), 0);
    assert_eq!(harness.sender.attempts(), 0);

    let record = only(&report);
    assert_eq!(
        record.path,
        vec![RecordState::Received, RecordState::FailedPermanent]
    );
    match &record.outcome {
        Outcome::FailedPermanent { error, acked } => {
            assert!(matches!(error, DispatchError::Malformed(_)));
            assert_eq!(error.kind(), ErrorKind::Validation);
            assert!(acked);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_parameters_fail_with_reason() {
    let harness = Harness::new(best_effort());

    let report = run_one(
        &harness,
        record("m6", r#"{"id_plantilla":"PC001","parametros":[]}"#),
    )
    .await;

    assert_eq!(harness.sender.attempts(), 0);
    let error = only(&report).outcome.error().unwrap();
    assert_eq!(error.to_string(), "no parameters");
    assert_eq!(harness.queue.deleted().len(), 1);
}

#[tokio::test]
async fn test_braced_templates_may_omit_parameters() {
    let harness = Harness::with_renderer(
        best_effort(),
        PlaceholderRenderer::new(PlaceholderSyntax::Braced),
    );
    let mut static_template = pc001();
    static_template.id = "ST001".to_string();
    static_template.body = "Nothing to substitute".to_string();
    harness.store.insert(static_template);

    let report = run_one(
        &harness,
        record("m7", r#"{"id_plantilla":"ST001","parametros":[]}"#),
    )
    .await;

    assert!(matches!(only(&report).outcome, Outcome::Acked));
    assert_eq!(harness.sender.sent()[0].body, "Nothing to substitute");
}

#[tokio::test]
async fn test_empty_batch_has_no_side_effects() {
    let harness = Harness::new(ProcessorConfig::default());

    let report = harness
        .processor
        .process_batch(&[], &Cancellation::never())
        .await
        .unwrap();

    assert!(report.is_empty());
    assert_eq!(harness.store.lookups(), 0);
    assert_eq!(harness.sender.attempts(), 0);
    assert!(harness.queue.deleted().is_empty());
    assert!(harness.queue.published().is_empty());
}

#[tokio::test]
async fn test_invalid_commands_are_acked() {
    let harness = Harness::new(best_effort());
    let records = [
        record("blank", r#"{"id_plantilla":"  ","parametros":[{"nombre":"x","valor":"y"}]}"#),
        record("missing", r#"{"parametros":[{"nombre":"x","valor":"y"}]}"#),
        record(
            "duplicate",
            command_body("PC001", &[("x", "1"), ("x", "2")], 0),
        ),
    ];

    let report = harness
        .processor
        .process_batch(&records, &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(report.failures(), 3);
    assert_eq!(harness.store.lookups(), 0);
    assert_eq!(harness.queue.deleted().len(), 3);
    for record in report.records() {
        assert_eq!(record.outcome.error().unwrap().kind(), ErrorKind::Validation);
    }
}

#[tokio::test]
async fn test_padded_template_id_is_trimmed_before_lookup() {
    let harness = Harness::new(best_effort());
    harness.sender.fail_next(transport("timeout"));

    let body = command_body("  PC001 ", &[("nombre_archivo", "a.txt")], 0);
    let report = run_one(&harness, record("m1", body)).await;

    assert!(matches!(only(&report).outcome, Outcome::Released { retry_count: 1 }));
    let republished = Command::from_json(&harness.queue.published()[0].body).unwrap();
    assert_eq!(republished.template_id, "PC001");
}

#[tokio::test]
async fn test_store_outage_is_not_acked() {
    let harness = Harness::new(ProcessorConfig::default());
    harness.store.set_unavailable(true);

    let aborted = harness
        .processor
        .process_batch(
            &[pc001_record("m8", 0), pc001_record("m9", 0)],
            &Cancellation::never(),
        )
        .await
        .unwrap_err();

    assert_eq!(aborted.message_id(), "m8");
    assert_eq!(
        aborted.error().unwrap().kind(),
        ErrorKind::Infrastructure
    );
    assert!(harness.queue.deleted().is_empty());
    assert!(harness.queue.published().is_empty());
    assert!(matches!(
        aborted.report().records()[1].outcome,
        Outcome::Skipped
    ));
    assert_eq!(harness.store.lookups(), 1);
}

#[tokio::test]
async fn test_unusable_template_is_validation_failure() {
    let harness = Harness::new(best_effort());
    let mut template = pc001();
    template.subject = "  ".to_string();
    harness.store.insert(template);

    let report = run_one(&harness, pc001_record("m10", 0)).await;

    assert!(matches!(
        only(&report).outcome,
        Outcome::FailedPermanent {
            error: DispatchError::InvalidTemplate { .. },
            acked: true
        }
    ));
    assert_eq!(harness.sender.attempts(), 0);
}

#[tokio::test]
async fn test_attachment_without_image_is_configuration_error() {
    let harness = Harness::new(best_effort());
    harness.store.insert(pc001().with_attachment(true));

    let report = run_one(&harness, pc001_record("m11", 0)).await;

    let record = only(&report);
    assert!(matches!(
        record.outcome,
        Outcome::FailedPermanent { acked: false, .. }
    ));
    assert_eq!(
        record.outcome.error().unwrap().kind(),
        ErrorKind::Configuration
    );
    assert!(harness.queue.deleted().is_empty());
    assert_eq!(harness.sender.attempts(), 0);
}

#[tokio::test]
async fn test_attachment_uses_configured_image() {
    let harness = Harness::new(ProcessorConfig {
        inline_image: Some(PathBuf::from("/srv/courier/logo.png")),
        ..best_effort()
    });
    harness.store.insert(pc001().with_attachment(true));

    run_one(&harness, pc001_record("m12", 0)).await;

    assert_eq!(
        harness.sender.sent()[0].inline_image,
        Some(PathBuf::from("/srv/courier/logo.png"))
    );
}

#[tokio::test]
async fn test_permanent_send_errors_are_not_retried() {
    let harness = Harness::new(best_effort());
    harness
        .sender
        .fail_next(MailError::Validation("bad recipient".to_string()));

    let report = run_one(&harness, pc001_record("m13", 0)).await;

    assert!(harness.queue.published().is_empty());
    assert!(matches!(
        only(&report).outcome,
        Outcome::FailedPermanent { acked: true, .. }
    ));

    harness
        .sender
        .fail_next(MailError::ResourceMissing(PathBuf::from("/missing.png")));
    let report = run_one(&harness, pc001_record("m14", 0)).await;
    assert_eq!(
        only(&report).outcome.error().unwrap().kind(),
        ErrorKind::ResourceMissing
    );
    assert!(harness.queue.published().is_empty());
}

#[tokio::test]
async fn test_delete_failure_after_send_is_unacknowledged() {
    let harness = Harness::new(best_effort());
    harness.queue.fail_delete(true);

    let report = run_one(&harness, pc001_record("m15", 0)).await;

    assert_eq!(harness.sender.sent().len(), 1);
    match &only(&report).outcome {
        Outcome::Unacknowledged { error } => {
            assert!(matches!(error, DispatchError::Queue(_)));
            assert_eq!(error.kind(), ErrorKind::Infrastructure);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(only(&report).state(), Some(RecordState::Sent));
}

#[tokio::test]
async fn test_publish_failure_keeps_record() {
    let harness = Harness::new(best_effort());
    harness.sender.fail_next(transport("421 try later"));
    harness.queue.fail_publish(true);

    let report = run_one(&harness, pc001_record("m16", 0)).await;

    assert!(harness.queue.deleted().is_empty());
    assert!(matches!(
        only(&report).outcome,
        Outcome::Unacknowledged {
            error: DispatchError::Queue(_)
        }
    ));
}

#[tokio::test]
async fn test_before_send_acks_once_after_validation() {
    let harness = Harness::new(ProcessorConfig {
        ack_timing: AckTiming::BeforeSend,
        ..best_effort()
    });

    run_one(&harness, pc001_record("m17", 0)).await;
    assert_eq!(harness.queue.deleted(), vec!["rh-m17".to_string()]);
    assert_eq!(harness.sender.sent().len(), 1);

    harness.sender.fail_next(transport("timeout"));
    let report = run_one(&harness, pc001_record("m18", 0)).await;
    assert!(matches!(
        only(&report).outcome,
        Outcome::Released { retry_count: 1 }
    ));
    assert_eq!(
        harness.queue.deleted(),
        vec!["rh-m17".to_string(), "rh-m18".to_string()]
    );
    assert_eq!(harness.queue.published().len(), 1);
}

#[tokio::test]
async fn test_before_send_delete_failure_prevents_send() {
    let harness = Harness::new(ProcessorConfig {
        ack_timing: AckTiming::BeforeSend,
        ..best_effort()
    });
    harness.queue.fail_delete(true);

    let report = run_one(&harness, pc001_record("m19", 0)).await;

    assert_eq!(harness.sender.attempts(), 0);
    assert_eq!(harness.store.lookups(), 0);
    assert!(matches!(
        only(&report).outcome,
        Outcome::Unacknowledged { .. }
    ));
}

#[tokio::test]
async fn test_before_send_loses_message_on_store_outage() {
    let harness = Harness::new(ProcessorConfig {
        ack_timing: AckTiming::BeforeSend,
        ..best_effort()
    });
    harness.store.set_unavailable(true);

    let report = run_one(&harness, pc001_record("m20", 0)).await;

    assert!(matches!(
        only(&report).outcome,
        Outcome::FailedPermanent { acked: true, .. }
    ));
    assert_eq!(harness.queue.deleted().len(), 1);
}

#[tokio::test]
async fn test_fail_fast_skips_remaining_records() {
    let harness = Harness::new(ProcessorConfig::default());
    let records = [
        pc001_record("ok", 0),
        record("bad", "{not json"),
        pc001_record("later", 0),
    ];

    let aborted = harness
        .processor
        .process_batch(&records, &Cancellation::never())
        .await
        .unwrap_err();

    assert_eq!(aborted.message_id(), "bad");
    assert!(aborted.to_string().contains("bad"));
    assert_eq!(harness.sender.sent().len(), 1);

    let report = aborted.into_report();
    assert_eq!(report.successes(), 1);
    assert_eq!(report.failures(), 1);
    assert_eq!(report.skipped(), 1);
    assert_eq!(report.records()[2].message_id, "later");
}

#[tokio::test]
async fn test_best_effort_reports_every_record() {
    let harness = Harness::new(best_effort());
    let records = [
        record("bad", "{not json"),
        pc001_record("ok", 0),
        record("unknown", command_body("ZZZZZ", &[("x", "y")], 0)),
    ];

    let report = harness
        .processor
        .process_batch(&records, &Cancellation::never())
        .await
        .unwrap();

    assert_eq!(report.len(), 3);
    assert_eq!(report.successes(), 1);
    assert_eq!(report.failures(), 2);
    let ids: Vec<&str> = report
        .records()
        .iter()
        .map(|record| record.message_id.as_str())
        .collect();
    assert_eq!(ids, vec!["bad", "ok", "unknown"]);
}

#[tokio::test]
async fn test_panic_during_send_follows_retry_path() {
    let harness = Harness::new(best_effort());
    harness.sender.panic_next("relay exploded");

    let report = harness
        .processor
        .process_batch(
            &[pc001_record("boom", 0), pc001_record("after", 0)],
            &Cancellation::never(),
        )
        .await
        .unwrap();

    assert!(matches!(
        report.records()[0].outcome,
        Outcome::Released { retry_count: 1 }
    ));
    assert!(matches!(report.records()[1].outcome, Outcome::Acked));
    assert_eq!(harness.queue.published().len(), 1);
    assert_eq!(harness.sender.sent().len(), 1);
}

#[derive(Debug)]
struct PanickingRenderer;

impl Renderer for PanickingRenderer {
    fn render(&self, _body: &str, _params: &[Parameter]) -> String {
        panic!("renderer bug")
    }

    fn requires_parameters(&self, _body: &str) -> bool {
        true
    }
}

#[tokio::test]
async fn test_panic_before_send_fails_permanently() {
    let harness = Harness::new(best_effort());
    let processor = MessageProcessor::new(
        Arc::new(harness.store.clone()),
        Arc::new(harness.sender.clone()),
        Arc::new(harness.queue.clone()),
        Arc::new(PanickingRenderer),
        best_effort(),
    );

    let report = processor
        .process_batch(&[pc001_record("m21", 0)], &Cancellation::never())
        .await
        .unwrap();

    match &only(&report).outcome {
        Outcome::FailedPermanent { error, acked } => {
            assert!(matches!(
                error,
                DispatchError::Panicked {
                    stage: RecordState::TemplateLoaded,
                    message
                } if message == "renderer bug"
            ));
            assert!(!acked);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(harness.sender.attempts(), 0);
    assert!(harness.queue.deleted().is_empty());
}

#[tokio::test]
async fn test_cancelled_batch_does_no_io() {
    let harness = Harness::new(ProcessorConfig::default());
    let (source, cancel) = Cancellation::new();
    source.cancel();

    let aborted = harness
        .processor
        .process_batch(&[pc001_record("m22", 0), pc001_record("m23", 0)], &cancel)
        .await
        .unwrap_err();

    assert!(matches!(
        aborted.error(),
        Some(DispatchError::Cancelled {
            stage: RecordState::Received
        })
    ));
    assert_eq!(aborted.report().skipped(), 1);
    assert_eq!(harness.store.lookups(), 0);
    assert!(harness.queue.deleted().is_empty());

    let best = Harness::new(best_effort());
    let report = best
        .processor
        .process_batch(&[pc001_record("m24", 0), pc001_record("m25", 0)], &cancel)
        .await
        .unwrap();
    assert_eq!(report.skipped(), 2);
    assert_eq!(best.store.lookups(), 0);
}

#[tokio::test]
async fn test_cancelled_send_is_left_for_redelivery() {
    let harness = Harness::new(best_effort());
    harness.sender.hang_next();
    let (source, cancel) = Cancellation::new();

    let records = [pc001_record("m26", 0), pc001_record("m27", 0)];
    let (report, ()) = tokio::join!(
        harness.processor.process_batch(&records, &cancel),
        async {
            harness.sender.wait_for_attempts(1).await;
            source.cancel();
        }
    );
    let report = report.unwrap();

    assert!(matches!(
        report.records()[0].outcome,
        Outcome::Unacknowledged {
            error: DispatchError::Cancelled {
                stage: RecordState::RetryScheduled
            }
        }
    ));
    assert!(matches!(report.records()[1].outcome, Outcome::Skipped));
    assert!(harness.queue.published().is_empty());
    assert!(harness.queue.deleted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_hanging_send() {
    let harness = Harness::new(best_effort());
    harness.sender.hang_next();
    let cancel =
        Cancellation::never().with_deadline(tokio::time::Instant::now() + Duration::from_secs(5));

    let report = harness
        .processor
        .process_batch(&[pc001_record("m28", 0)], &cancel)
        .await
        .unwrap();

    assert_eq!(harness.sender.attempts(), 1);
    assert!(matches!(
        only(&report).outcome,
        Outcome::Unacknowledged {
            error: DispatchError::Cancelled { .. }
        }
    ));
    assert!(harness.queue.deleted().is_empty());
}

#[tokio::test]
async fn test_retry_chain_reaches_max_and_stops() {
    let harness = Harness::new(best_effort());
    harness.sender.fail_always(transport("relay down"));
    harness.queue.enqueue(command_body("PC001", &[("nombre_archivo", "a")], 0));

    let mut counts = Vec::new();
    for _ in 0..5 {
        let records = harness
            .queue
            .receive(10, Duration::from_millis(10))
            .await
            .unwrap();
        if records.is_empty() {
            break;
        }
        for record in &records {
            counts.push(Command::from_json(&record.body).unwrap().retry_count);
        }
        harness
            .processor
            .process_batch(&records, &Cancellation::never())
            .await
            .unwrap();
    }

    assert_eq!(counts, vec![0, 1, 2, 3]);
    assert_eq!(harness.sender.attempts(), 4);
    assert_eq!(harness.queue.in_flight(), 0);
    assert_eq!(harness.queue.pending(), 0);
}

#[tokio::test]
async fn test_exponential_backoff_delay() {
    let harness = Harness::new(ProcessorConfig {
        retry: RetryPolicy {
            max_retries: 5,
            delay_seconds: 10,
            backoff: RetryBackoff::Exponential,
        },
        ..best_effort()
    });
    harness.sender.fail_always(transport("busy"));

    run_one(&harness, pc001_record("m30", 2)).await;

    assert_eq!(harness.queue.published()[0].delay_seconds, 40);
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn republishes_iff_below_max_retries(retry_count in 0u32..8, max_retries in 0u32..8) {
        let (published, report) = block_on(async {
            let harness = Harness::new(ProcessorConfig {
                retry: RetryPolicy { max_retries, ..RetryPolicy::default() },
                ..best_effort()
            });
            harness.sender.fail_next(transport("timeout"));
            let report = run_one(&harness, pc001_record("p1", retry_count)).await;
            (harness.queue.published(), report)
        });

        prop_assert_eq!(published.len() == 1, retry_count < max_retries);
        prop_assert!(published.len() <= 1);
        for entry in &published {
            let command = Command::from_json(&entry.body).unwrap();
            prop_assert_eq!(command.retry_count, retry_count + 1);
        }
        let unacknowledged = matches!(only(&report).outcome, Outcome::Unacknowledged { .. });
        prop_assert!(!unacknowledged);
    }

    #[test]
    fn delete_called_once_on_success_and_never_twice(
        before_send in any::<bool>(),
        fail_send in any::<bool>(),
        fail_delete in any::<bool>(),
        fail_publish in any::<bool>(),
        malformed in any::<bool>(),
        retry_count in 0u32..5,
    ) {
        let (deleted, report) = block_on(async {
            let harness = Harness::new(ProcessorConfig {
                ack_timing: if before_send { AckTiming::BeforeSend } else { AckTiming::AfterSend },
                ..best_effort()
            });
            if fail_send {
                harness.sender.fail_next(transport("timeout"));
            }
            harness.queue.fail_delete(fail_delete);
            harness.queue.fail_publish(fail_publish);

            let record = if malformed {
                record("p2", "{not json")
            } else {
                pc001_record("p2", retry_count)
            };
            let report = run_one(&harness, record).await;
            (harness.queue.delete_calls(), report)
        });

        prop_assert!(deleted <= 1);
        let settled = matches!(
            only(&report).outcome,
            Outcome::Acked | Outcome::Released { .. }
        );
        if settled {
            prop_assert_eq!(deleted, 1);
        }
    }

    #[test]
    fn static_body_sends_exactly_once(value in "[a-z0-9 ]{0,12}") {
        let attempts = block_on(async {
            let harness = Harness::new(best_effort());
            let mut template = pc001();
            template.body = "Static body".to_string();
            harness.store.insert(template);

            run_one(&harness, record("p3", command_body("PC001", &[("unused", value.as_str())], 0))).await;
            harness.sender.attempts()
        });

        prop_assert_eq!(attempts, 1);
    }
}
