//! End-to-end pipeline tests
//!
//! Requests go through `EmailService`, land in the memory store and are
//! drained by `QueueProcessor` against a scripted provider. Time is driven
//! by a `ManualClock`, so no test waits on the wall clock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;

use community_mailer::clock::{Clock, ManualClock};
use community_mailer::config::{EmailConfig, QueueConfig};
use community_mailer::email::{
    EmailError, EmailMessage, EmailService, EmailStatus, SendEmailRequest, TemplatedEmailRequest,
};
use community_mailer::provider::{DeliveryReceipt, EmailProvider, OutboundEmail, ProviderError};
use community_mailer::store::{MemoryMessageStore, MessageStore};
use community_mailer::tasks::{ProcessorConfig, QueueProcessor};
use community_mailer::template::{
    CacheConfig, EmailTemplate, MemoryTemplateStore, Params, RenderCache, TemplateRenderer,
};

/// Provider that pops scripted results and succeeds once the script is empty
#[derive(Default)]
struct ScriptedProvider {
    script: Mutex<VecDeque<Result<(), ProviderError>>>,
    delivered: Mutex<Vec<OutboundEmail>>,
}

impl ScriptedProvider {
    fn push(&self, result: Result<(), ProviderError>) {
        self.script.lock().unwrap().push_back(result);
    }

    fn delivered(&self) -> Vec<OutboundEmail> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, ProviderError> {
        email.validate()?;
        let next = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        next?;
        self.delivered.lock().unwrap().push(email.clone());
        Ok(DeliveryReceipt {
            provider: "scripted",
            message_id: Some(format!("scripted-{}", email.id)),
        })
    }
}

struct Pipeline {
    service: EmailService,
    processor: QueueProcessor,
    store: Arc<MemoryMessageStore>,
    provider: Arc<ScriptedProvider>,
    clock: Arc<ManualClock>,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()
}

fn welcome_template() -> EmailTemplate {
    EmailTemplate {
        name: "welcome".to_string(),
        subject_template: "Hi {{name}}".to_string(),
        html_template: Some("{{#vip}}VIP perk{{/vip}} Welcome".to_string()),
        text_template: Some("Welcome {{name}}".to_string()),
        is_active: true,
        description: Some("Sent after sign-up".to_string()),
        created_at: start(),
        updated_at: start(),
    }
}

fn pipeline() -> Pipeline {
    let store = Arc::new(MemoryMessageStore::new());
    let provider = Arc::new(ScriptedProvider::default());
    let clock = Arc::new(ManualClock::new(start()));

    let templates = Arc::new(MemoryTemplateStore::new());
    templates.create(welcome_template()).unwrap();
    let renderer = Arc::new(TemplateRenderer::new(
        templates,
        Some(RenderCache::new(CacheConfig::default())),
    ));

    let queue = QueueConfig::default();
    let service = EmailService::new(
        store.clone(),
        renderer,
        clock.clone(),
        EmailConfig {
            provider: "scripted".to_string(),
            sender_address: "events@example.org".to_string(),
            sender_name: None,
        },
        queue.max_retry_attempts,
    );
    let processor = QueueProcessor::new(
        store.clone(),
        provider.clone(),
        clock.clone(),
        ProcessorConfig::from(&queue),
    );

    Pipeline {
        service,
        processor,
        store,
        provider,
        clock,
    }
}

fn params(value: serde_json::Value) -> Params {
    value.as_object().cloned().unwrap()
}

fn welcome_request(vip: bool) -> TemplatedEmailRequest {
    TemplatedEmailRequest {
        template_name: "welcome".to_string(),
        params: params(json!({"name": "Sam", "vip": vip})),
        to: vec!["sam@example.com".to_string()],
        ..TemplatedEmailRequest::default()
    }
}

fn transient() -> Result<(), ProviderError> {
    Err(ProviderError::Transient("451 try again later".to_string()))
}

/// Invariants that must hold for every stored message at any point
fn assert_invariants(messages: &[EmailMessage], max_retry_attempts: u32) {
    for m in messages {
        if m.status == EmailStatus::Sent {
            assert!(m.last_error.is_none(), "sent message {} has last_error", m.id);
            assert!(m.next_retry_at.is_none(), "sent message {} has next_retry_at", m.id);
        }
        if m.retry_count >= max_retry_attempts {
            assert!(
                m.next_retry_at.is_none(),
                "exhausted message {} still scheduled",
                m.id
            );
        }
    }
}

#[tokio::test]
async fn test_templated_vip_email_is_delivered() {
    let p = pipeline();
    let message = p.service.send_templated_email(welcome_request(true)).await.unwrap();

    assert_eq!(message.subject, "Hi Sam");
    assert_eq!(message.html_body.as_deref(), Some("VIP perk Welcome"));

    let summary = p.processor.process_batch().await.unwrap();
    assert_eq!(summary.sent, 1);

    let delivered = p.provider.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].subject, "Hi Sam");
    assert_eq!(delivered[0].from_address, "events@example.org");

    let stored = p.service.get_message(message.id).await.unwrap();
    assert_eq!(stored.status, EmailStatus::Sent);
    assert_eq!(stored.template_name.as_deref(), Some("welcome"));
}

#[tokio::test]
async fn test_templated_non_vip_section_is_stripped() {
    let p = pipeline();
    let message = p.service.send_templated_email(welcome_request(false)).await.unwrap();
    assert_eq!(message.html_body.as_deref(), Some(" Welcome"));

    // Same template and params again come out of the cache identically
    let again = p.service.send_templated_email(welcome_request(false)).await.unwrap();
    assert_eq!(again.subject, message.subject);
    assert_eq!(again.html_body, message.html_body);
    assert_eq!(again.text_body, message.text_body);
}

#[tokio::test]
async fn test_missing_template_persists_nothing() {
    let p = pipeline();
    let mut request = welcome_request(true);
    request.template_name = "missing".to_string();

    let err = p.service.send_templated_email(request).await.unwrap_err();
    assert!(matches!(err, EmailError::TemplateNotFound(_)));
    assert!(p.store.is_empty());
}

#[tokio::test]
async fn test_invalid_recipient_persists_nothing() {
    let p = pipeline();
    let err = p
        .service
        .send_email(SendEmailRequest {
            to: vec!["not-an-email".to_string()],
            subject: "Hello".to_string(),
            text_body: Some("Hi".to_string()),
            ..SendEmailRequest::default()
        })
        .await
        .unwrap_err();

    assert!(matches!(err, EmailError::Validation(_)));
    assert!(p.store.is_empty());
}

fn processor_with_ceiling(p: &Pipeline, max_retry_attempts: u32) -> QueueProcessor {
    let queue = QueueConfig {
        max_retry_attempts,
        ..QueueConfig::default()
    };
    QueueProcessor::new(
        p.store.clone(),
        p.provider.clone(),
        p.clock.clone(),
        ProcessorConfig::from(&queue),
    )
}

/// Store a message as if it had already failed `retry_count` times and is due now
async fn seed_failed(p: &Pipeline, retry_count: u32) -> EmailMessage {
    let mut message = p.service.send_templated_email(welcome_request(true)).await.unwrap();
    message.status = EmailStatus::Failed;
    message.retry_count = retry_count;
    message.last_error = Some("earlier failure".to_string());
    message.next_retry_at = Some(p.clock.now());
    p.store.update(&message).await.unwrap();
    message
}

#[tokio::test]
async fn test_third_failure_waits_twenty_minutes() {
    let p = pipeline();
    let processor = processor_with_ceiling(&p, 5);
    let message = seed_failed(&p, 2).await;

    p.provider.push(transient());
    let summary = processor.process_batch().await.unwrap();
    assert_eq!(summary.retry_scheduled, 1);

    let stored = p.store.get(message.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmailStatus::Failed);
    assert_eq!(stored.retry_count, 3);
    assert_eq!(
        stored.next_retry_at,
        Some(p.clock.now() + ChronoDuration::minutes(20))
    );
}

#[tokio::test]
async fn test_last_allowed_failure_is_terminal() {
    let p = pipeline();
    let message = seed_failed(&p, 2).await;

    p.provider.push(transient());
    let summary = p.processor.process_batch().await.unwrap();
    assert_eq!(summary.exhausted, 1);
    assert_eq!(summary.rejected, 0);

    let stored = p.store.get(message.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmailStatus::Failed);
    assert_eq!(stored.retry_count, 3);
    assert_eq!(stored.next_retry_at, None);
    assert!(stored.is_terminal(3));
    assert_invariants(&p.store.snapshot(), 3);

    let stats = p.service.queue_stats().await.unwrap();
    assert_eq!(stats.exhausted, 1);
    assert_eq!(stats.due, 0);
}

#[tokio::test]
async fn test_permanent_rejection_is_not_retried() {
    let p = pipeline();
    let message = p.service.send_templated_email(welcome_request(true)).await.unwrap();
    p.provider
        .push(Err(ProviderError::Permanent("550 mailbox unavailable".to_string())));

    let summary = p.processor.process_batch().await.unwrap();
    assert_eq!(summary.rejected, 1);
    assert_eq!(summary.exhausted, 0);

    p.clock.advance(ChronoDuration::hours(3));
    assert!(p.processor.process_batch().await.unwrap().is_idle());

    let stored = p.store.get(message.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmailStatus::Failed);
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.next_retry_at, None);
}

#[tokio::test]
async fn test_backoff_schedule_through_exhaustion() {
    let p = pipeline();
    let processor = processor_with_ceiling(&p, 5);

    let message = p.service.send_templated_email(welcome_request(true)).await.unwrap();
    for _ in 0..5 {
        p.provider.push(transient());
    }

    let expected_delays = [5, 10, 20, 40];
    for (attempt, minutes) in expected_delays.iter().enumerate() {
        processor.process_batch().await.unwrap();
        let stored = p.store.get(message.id).await.unwrap().unwrap();

        assert_eq!(stored.status, EmailStatus::Failed);
        assert_eq!(stored.retry_count, attempt as u32 + 1);
        assert_eq!(
            stored.next_retry_at,
            Some(p.clock.now() + ChronoDuration::minutes(*minutes))
        );
        assert_invariants(&p.store.snapshot(), 5);

        p.clock.advance(ChronoDuration::minutes(*minutes));
    }

    // Fifth failure: retry_count reaches the ceiling and scheduling stops
    processor.process_batch().await.unwrap();
    let exhausted = p.store.get(message.id).await.unwrap().unwrap();
    assert_eq!(exhausted.retry_count, 5);
    assert_eq!(exhausted.status, EmailStatus::Failed);
    assert_eq!(exhausted.next_retry_at, None);
    assert!(exhausted.last_error.as_deref().unwrap().contains("try again later"));
    assert_invariants(&p.store.snapshot(), 5);

    p.clock.advance(ChronoDuration::days(7));
    assert!(processor.process_batch().await.unwrap().is_idle());
}

#[tokio::test]
async fn test_retry_then_success_clears_error() {
    let p = pipeline();
    let message = p.service.send_templated_email(welcome_request(true)).await.unwrap();
    p.provider.push(transient());

    p.processor.process_batch().await.unwrap();
    p.clock.advance(ChronoDuration::minutes(5));
    p.processor.process_batch().await.unwrap();

    let stored = p.store.get(message.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmailStatus::Sent);
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.last_error, None);
    assert_invariants(&p.store.snapshot(), 3);
}

#[tokio::test]
async fn test_noop_tick_leaves_state_untouched() {
    let p = pipeline();
    p.service.send_templated_email(welcome_request(true)).await.unwrap();
    p.provider.push(transient());
    p.processor.process_batch().await.unwrap();

    let before = p.store.snapshot();
    p.clock.advance(ChronoDuration::minutes(1));
    let summary = p.processor.tick().await.unwrap();

    assert!(summary.is_idle());
    assert_eq!(p.store.snapshot(), before);
}

#[tokio::test]
async fn test_priority_orders_delivery() {
    let p = pipeline();
    let mut low = SendEmailRequest {
        to: vec!["low@example.com".to_string()],
        subject: "Digest".to_string(),
        text_body: Some("..".to_string()),
        priority: Some(9),
        ..SendEmailRequest::default()
    };
    p.service.send_email(low.clone()).await.unwrap();

    low.to = vec!["urgent@example.com".to_string()];
    low.priority = Some(1);
    p.service.send_email(low).await.unwrap();

    p.processor.process_batch().await.unwrap();
    let order: Vec<String> = p
        .provider
        .delivered()
        .iter()
        .map(|e| e.to[0].clone())
        .collect();
    assert_eq!(order, vec!["urgent@example.com", "low@example.com"]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_the_loop() {
    let p = pipeline();
    let processor = Arc::new(p.processor);
    let (tx, rx) = tokio::sync::broadcast::channel(1);

    let handle = {
        let processor = processor.clone();
        tokio::spawn(async move { processor.run(rx).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    tx.send(()).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("processor should stop promptly")
        .unwrap();
}
