use std::time::Duration;

use serde_json::{Value, json};

use conduit_core::{
    DirectChannel, ErrorHandler, FnHandler, MessagePublishingErrorHandler, QueueChannel,
};

use super::*;
use crate::reply_handler::ReplyProducingHandler;

fn upper_case() -> Arc<dyn MessageHandler> {
    Arc::new(ReplyProducingHandler::new(|msg: &Message| {
        Ok(msg
            .data()
            .and_then(Value::as_str)
            .map(|s| json!(s.to_uppercase())))
    }))
}

/// Service answering on a direct request channel, in the caller's task.
fn direct_service() -> (Arc<DirectChannel>, EventDrivenConsumer) {
    let requests = Arc::new(DirectChannel::new("requests"));
    let service = EventDrivenConsumer::new("upper", requests.clone(), upper_case());
    service.start().unwrap();
    (requests, service)
}

/// Handler that copies each request with an extra header and forwards it.
struct Enricher {
    next: Arc<dyn MessageChannel>,
}

#[async_trait]
impl MessageHandler for Enricher {
    async fn handle_message(&self, message: Message) -> MessagingResult<()> {
        let enriched = MessageBuilder::from_message(&message)
            .header("enriched", json!(true))
            .build();
        self.next.send(enriched, None).await?;
        Ok(())
    }
}

/// Service behind an enriching hop: requests -> enricher -> upper-case.
fn enriched_service() -> (Arc<DirectChannel>, Vec<EventDrivenConsumer>) {
    let requests = Arc::new(DirectChannel::new("requests"));
    let enriched = Arc::new(DirectChannel::new("enriched"));
    let hop = EventDrivenConsumer::new(
        "enricher",
        requests.clone(),
        Arc::new(Enricher {
            next: enriched.clone(),
        }),
    );
    let service = EventDrivenConsumer::new("upper", enriched, upper_case());
    hop.start().unwrap();
    service.start().unwrap();
    (requests, vec![hop, service])
}

/// Service polling a queue request channel.
fn polled_service(
    scheduler: &TaskScheduler,
    handler: Arc<dyn MessageHandler>,
) -> (Arc<QueueChannel>, PollingConsumer) {
    let requests = Arc::new(QueueChannel::new("requests"));
    let service = PollingConsumer::new("service", requests.clone(), handler)
        .with_scheduler(scheduler.clone())
        .with_poller(
            PollerMetadata::fixed_delay(Duration::from_millis(5))
                .with_receive_timeout(Some(Duration::from_millis(20))),
        );
    service.start().unwrap();
    (requests, service)
}

#[tokio::test]
async fn test_temporary_reply_channel_round_trip() {
    let (requests, _service) = direct_service();
    let gateway = MessagingGateway::new("gw", requests);

    let reply = gateway
        .send_and_receive(Message::new(json!("hello")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.data(), Some(&json!("HELLO")));
    assert_eq!(gateway.pending_count(), 0);
    assert!(!gateway.is_correlator_running());
}

#[tokio::test]
async fn test_shared_subscribable_reply_channel() {
    let (requests, _service) = direct_service();
    let replies = Arc::new(DirectChannel::new("replies"));
    let gateway =
        MessagingGateway::new("gw", requests).with_reply_channel(ReplyChannel::subscribable(replies.clone()));

    for word in ["a", "b"] {
        let reply = gateway
            .send_and_receive(Message::new(json!(word)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply.data(), Some(&json!(word.to_uppercase())));
    }
    assert!(gateway.is_correlator_running());
    assert_eq!(replies.subscriber_count(), 1);

    gateway.stop();
    assert!(!gateway.is_correlator_running());
    assert_eq!(replies.subscriber_count(), 0);
}

#[tokio::test]
async fn test_reply_through_enriching_hop_on_temporary_channel() {
    let (requests, _services) = enriched_service();
    let gateway = MessagingGateway::new("gw", requests);

    let reply = gateway
        .send_and_receive(Message::new(json!("hi")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.data(), Some(&json!("HI")));
}

#[tokio::test]
async fn test_reply_through_enriching_hop_on_shared_channel() {
    let (requests, _services) = enriched_service();
    let replies = Arc::new(DirectChannel::new("replies"));
    let gateway = MessagingGateway::new("gw", requests)
        .with_reply_channel(ReplyChannel::subscribable(replies))
        .with_settings(GatewaySettings {
            reply_timeout: Some(Duration::from_secs(1)),
            ..GatewaySettings::default()
        });

    let reply = gateway
        .send_and_receive(Message::new(json!("hi")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.data(), Some(&json!("HI")));
    assert_eq!(gateway.pending_count(), 0);
    gateway.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_calls_register_one_correlator() {
    let (requests, _service) = direct_service();
    let replies = Arc::new(DirectChannel::new("replies"));
    let gateway = Arc::new(
        MessagingGateway::new("gw", requests)
            .with_reply_channel(ReplyChannel::subscribable(replies.clone()))
            .with_settings(GatewaySettings {
                reply_timeout: Some(Duration::from_secs(2)),
                ..GatewaySettings::default()
            }),
    );
    let barrier = Arc::new(tokio::sync::Barrier::new(8));

    let calls: Vec<_> = (0..8)
        .map(|n| {
            let gateway = gateway.clone();
            let barrier = barrier.clone();
            tokio::spawn(async move {
                barrier.wait().await;
                gateway
                    .send_and_receive(Message::new(json!(format!("call-{n}"))))
                    .await
            })
        })
        .collect();

    for (n, call) in calls.into_iter().enumerate() {
        let reply = call.await.unwrap().unwrap().unwrap();
        assert_eq!(reply.data(), Some(&json!(format!("CALL-{n}"))));
    }
    assert_eq!(replies.subscriber_count(), 1);
    assert!(gateway.is_correlator_running());
    gateway.stop();
}

#[tokio::test]
async fn test_temporary_channel_accepts_one_reply() {
    let (waiter, mut reply) = oneshot::channel();
    let channel = TemporaryReplyChannel {
        name: "gw.reply.1".to_string(),
        gateway: "gw".to_string(),
        waiter: Mutex::new(Some(waiter)),
    };

    // No correlation header needed: the channel belongs to one call.
    assert!(channel.send(Message::new(json!("first")), None).await.unwrap());
    assert!(!channel.send(Message::new(json!("second")), None).await.unwrap());
    assert_eq!(reply.try_recv().unwrap().data(), Some(&json!("first")));
}

#[tokio::test]
async fn test_shared_pollable_reply_channel() {
    let scheduler = TaskScheduler::new("gateway");
    scheduler.start().unwrap();
    let (requests, service) = polled_service(&scheduler, upper_case());
    let replies = Arc::new(QueueChannel::new("replies"));
    let gateway = MessagingGateway::new("gw", requests)
        .with_reply_channel(ReplyChannel::pollable(replies))
        .with_scheduler(scheduler.clone())
        .with_settings(GatewaySettings {
            reply_timeout: Some(Duration::from_secs(2)),
            ..GatewaySettings::default()
        });

    let reply = gateway
        .send_and_receive(Message::new(json!("polled")))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.data(), Some(&json!("POLLED")));

    gateway.stop();
    service.stop();
    scheduler.stop();
}

#[tokio::test]
async fn test_pollable_reply_channel_needs_scheduler() {
    let (requests, _service) = direct_service();
    let gateway = MessagingGateway::new("gw", requests)
        .with_reply_channel(ReplyChannel::pollable(Arc::new(QueueChannel::new("replies"))));

    let err = gateway
        .send_and_receive(Message::new(json!("x")))
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::Configuration(_)));
}

#[tokio::test]
async fn test_reply_timeout_returns_none() {
    let requests = Arc::new(QueueChannel::new("nobody-listens"));
    let gateway = MessagingGateway::new("gw", requests.clone()).with_settings(GatewaySettings {
        reply_timeout: Some(Duration::from_millis(30)),
        ..GatewaySettings::default()
    });

    let reply = gateway.send_and_receive(Message::new(json!(1))).await.unwrap();
    assert!(reply.is_none());
    assert_eq!(gateway.pending_count(), 0);
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn test_rejected_request_returns_none() {
    let requests = Arc::new(QueueChannel::with_capacity("full", 0));
    let gateway = MessagingGateway::new("gw", requests).with_settings(GatewaySettings {
        request_timeout: Some(Duration::ZERO),
        ..GatewaySettings::default()
    });

    assert!(gateway
        .send_and_receive(Message::new(json!(1)))
        .await
        .unwrap()
        .is_none());
    assert_eq!(gateway.pending_count(), 0);
}

#[tokio::test]
async fn test_one_way_send() {
    let requests = Arc::new(QueueChannel::new("requests"));
    let gateway = MessagingGateway::new("gw", requests.clone());
    gateway.send(Message::new(json!("fire"))).await.unwrap();
    assert_eq!(requests.len(), 1);

    let full = Arc::new(QueueChannel::with_capacity("full", 0));
    let gateway = MessagingGateway::new("gw", full).with_settings(GatewaySettings {
        request_timeout: Some(Duration::ZERO),
        ..GatewaySettings::default()
    });
    let err = gateway.send(Message::new(json!("lost"))).await.unwrap_err();
    assert!(matches!(err, MessagingError::Delivery { .. }));
}

#[tokio::test]
async fn test_handler_error_on_direct_channel_propagates() {
    let requests = Arc::new(DirectChannel::new("requests"));
    requests.subscribe(Arc::new(FnHandler::new(|msg| {
        Err(MessagingError::handling("refused", msg))
    })));
    let gateway = MessagingGateway::new("gw", requests);

    let err = gateway
        .send_and_receive(Message::new(json!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::Handling { .. }));
}

#[tokio::test]
async fn test_error_reply_is_raised_or_returned() {
    let error_handler: Arc<dyn ErrorHandler> = Arc::new(MessagePublishingErrorHandler::header_only());
    let scheduler = TaskScheduler::builder("errors").error_handler(error_handler).build();
    scheduler.start().unwrap();

    let failing: Arc<dyn MessageHandler> =
        Arc::new(FnHandler::new(|_msg| Err(MessagingError::Internal("kaboom".into()))));
    let (requests, service) = polled_service(&scheduler, failing);
    let timeout = Some(Duration::from_secs(2));

    let raising = MessagingGateway::new("raising", requests.clone()).with_settings(GatewaySettings {
        reply_timeout: timeout,
        ..GatewaySettings::default()
    });
    let err = raising
        .send_and_receive(Message::new(json!(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, MessagingError::Remote(_)));

    let returning = MessagingGateway::new("returning", requests).with_settings(GatewaySettings {
        reply_timeout: timeout,
        throw_errors: false,
        ..GatewaySettings::default()
    });
    let reply = returning
        .send_and_receive(Message::new(json!(2)))
        .await
        .unwrap()
        .unwrap();
    assert!(reply.is_error());

    service.stop();
    scheduler.stop();
}

#[test]
fn test_unmatched_reply_is_dropped() {
    let pending = PendingReplies::new();
    let (waiter, _reply) = oneshot::channel();
    pending.insert("known".to_string(), waiter);

    let stray = MessageBuilder::with_payload(json!(1)).correlation_id("unknown").build();
    assert!(!correlate("gw", &pending, stray));
    assert!(!correlate("gw", &pending, Message::new(json!(2))));
    assert_eq!(pending.len(), 1);

    let matched = MessageBuilder::with_payload(json!(3)).correlation_id("known").build();
    assert!(correlate("gw", &pending, matched));
    assert!(pending.is_empty());
}

#[test]
fn test_settings_from_config() {
    let config = GatewayConfig {
        request_timeout_ms: 500,
        reply_timeout_ms: -1,
        throw_errors: false,
    };
    let settings = GatewaySettings::from_config(&config);
    assert_eq!(settings.request_timeout, Some(Duration::from_millis(500)));
    assert_eq!(settings.reply_timeout, None);
    assert!(!settings.throw_errors);

    assert_eq!(
        GatewaySettings::from_config(&GatewayConfig::default()),
        GatewaySettings::default()
    );
}
