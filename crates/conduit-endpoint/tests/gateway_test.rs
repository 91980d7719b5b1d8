//! End-to-end tests for request/reply through a gateway.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use conduit_core::{
    DirectChannel, ErrorHandler, FnHandler, Message, MessageHandler, MessagePublishingErrorHandler,
    MessagingError, QueueChannel,
};
use conduit_endpoint::{
    Endpoint, GatewaySettings, MessagingGateway, PollerMetadata, PollingConsumer, ReplyChannel,
    ReplyProducingHandler,
};
use conduit_scheduling::{PooledExecutor, TaskScheduler};

/// Several consumers share the request queue and a worker pool, so replies
/// come back out of order.
fn echo_services(
    scheduler: &TaskScheduler,
    requests: Arc<QueueChannel>,
    handler: Arc<dyn MessageHandler>,
) -> Vec<PollingConsumer> {
    let workers = Arc::new(PooledExecutor::new("echo-workers", Some(8)));
    (0..4)
        .map(|i| {
            let consumer = PollingConsumer::new(format!("echo-{i}"), requests.clone(), handler.clone())
                .with_scheduler(scheduler.clone())
                .with_poller(
                    PollerMetadata::fixed_delay(Duration::from_millis(2))
                        .with_max_messages_per_poll(1)
                        .with_receive_timeout(Some(Duration::from_millis(20)))
                        .with_task_executor(workers.clone()),
                );
            consumer.start().unwrap();
            consumer
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_get_their_own_replies() {
    let scheduler = TaskScheduler::new("correlation");
    scheduler.start().unwrap();

    let requests = Arc::new(QueueChannel::new("requests"));
    let replies = Arc::new(DirectChannel::new("replies"));
    let handler: Arc<dyn MessageHandler> = Arc::new(ReplyProducingHandler::new(|msg: &Message| {
        Ok(msg.data().and_then(Value::as_u64).map(|n| json!({ "echo": n })))
    }));
    let services = echo_services(&scheduler, requests.clone(), handler);

    let gateway = Arc::new(
        MessagingGateway::new("client", requests)
            .with_reply_channel(ReplyChannel::subscribable(replies))
            .with_settings(GatewaySettings {
                reply_timeout: Some(Duration::from_secs(5)),
                ..GatewaySettings::default()
            }),
    );

    let calls: Vec<_> = (0..20u64)
        .map(|n| {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                let reply = gateway.send_and_receive(Message::new(json!(n))).await;
                (n, reply)
            })
        })
        .collect();

    for call in calls {
        let (n, reply) = call.await.unwrap();
        let reply = reply.unwrap().unwrap();
        assert_eq!(reply.data(), Some(&json!({ "echo": n })));
    }
    assert_eq!(gateway.pending_count(), 0);

    gateway.stop();
    services.iter().for_each(|service| service.stop());
    scheduler.stop();
}

#[tokio::test]
async fn test_remote_failure_reaches_caller() {
    let error_handler: Arc<dyn ErrorHandler> = Arc::new(MessagePublishingErrorHandler::header_only());
    let scheduler = TaskScheduler::builder("remote").error_handler(error_handler).build();
    scheduler.start().unwrap();

    let requests = Arc::new(QueueChannel::new("requests"));
    let failing: Arc<dyn MessageHandler> = Arc::new(FnHandler::new(|_msg| {
        Err(MessagingError::Internal("service unavailable".into()))
    }));
    let services = echo_services(&scheduler, requests.clone(), failing);

    let gateway = MessagingGateway::new("client", requests).with_settings(GatewaySettings {
        reply_timeout: Some(Duration::from_secs(2)),
        ..GatewaySettings::default()
    });

    match gateway.send_and_receive(Message::new(json!(1))).await {
        Err(MessagingError::Remote(cause)) => {
            assert!(cause.to_string().contains("service unavailable"));
        }
        other => panic!("expected remote failure, got {other:?}"),
    }

    services.iter().for_each(|service| service.stop());
    scheduler.stop();
}
