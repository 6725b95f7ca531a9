//! Consumer lifecycle: subscriptions, message fan-out, shutdown drain.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use matchflow_bus::events::{CompletionEvent, MatchRequest};
use matchflow_bus::{
    topics, BusError, EventPublisher, EventSubscriber, Message, Transport, Worker, ZmqPublisher,
    ZmqSubscriber,
};
use matchflow_core::{AssetTypes, Phase};
use matchflow_orchestrator::{Engine, EventConsumer, MemoryPhaseStore, SchemaRegistry};
use tokio::sync::{mpsc, Mutex};

#[derive(Default)]
struct RecordingPublisher {
    messages: Mutex<Vec<Message>>,
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, message: Message) -> Result<(), BusError> {
        self.messages.lock().await.push(message);
        Ok(())
    }
}

/// Subscriber fed from an in-process channel.
struct ChannelSubscriber {
    topics: Mutex<Vec<String>>,
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl ChannelSubscriber {
    fn new() -> (Self, mpsc::UnboundedSender<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Self {
            topics: Mutex::new(Vec::new()),
            rx: Mutex::new(rx),
        };
        (subscriber, tx)
    }
}

#[async_trait]
impl EventSubscriber for ChannelSubscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), BusError> {
        self.topics.lock().await.push(topic_prefix.to_string());
        Ok(())
    }

    async fn recv(&self) -> Result<Message, BusError> {
        match self.rx.lock().await.recv().await {
            Some(message) => Ok(message),
            None => std::future::pending().await,
        }
    }
}

fn completion(event_type: &str, event_id: &str, job_id: &str) -> Message {
    Message::new(event_type, &CompletionEvent::new(event_id, job_id)).unwrap()
}

async fn wait_for_phase(store: &MemoryPhaseStore, job_id: &str, phase: Phase) {
    tokio::time::timeout(Duration::from_secs(3), async {
        while store.phase_of(job_id) != Some(phase) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{job_id} never reached {phase}"));
}

#[tokio::test]
async fn subscribes_to_every_registered_event_type() {
    let store = Arc::new(MemoryPhaseStore::new());
    let bus = Arc::new(RecordingPublisher::default());
    let engine = Arc::new(Engine::new(SchemaRegistry::builtin(), store, bus, 100));
    let (subscriber, _tx) = ChannelSubscriber::new();
    let subscriber = Arc::new(subscriber);

    let consumer = EventConsumer::new("test-orchestrator", engine, subscriber.clone(), 4);
    consumer.start().await.unwrap();

    let mut subscribed = subscriber.topics.lock().await.clone();
    subscribed.sort();
    let mut expected: Vec<String> = topics::COMPLETION_EVENTS.iter().map(|t| t.to_string()).collect();
    expected.sort();
    assert_eq!(subscribed, expected);
    assert_eq!(consumer.name(), "test-orchestrator");

    consumer.stop().await.unwrap();
}

#[tokio::test]
async fn handles_many_jobs_and_drains_on_stop() {
    let store = Arc::new(MemoryPhaseStore::new());
    let bus = Arc::new(RecordingPublisher::default());
    let engine = Arc::new(Engine::new(SchemaRegistry::builtin(), store.clone(), bus.clone(), 100));
    let (subscriber, tx) = ChannelSubscriber::new();

    let consumer = EventConsumer::new("test-orchestrator", engine, Arc::new(subscriber), 2);
    consumer.start().await.unwrap();

    for n in 0..10 {
        let job_id = format!("J{n}");
        store.insert_job(&job_id, "fashion", Phase::FeatureExtraction, AssetTypes::default());
        tx.send(completion(topics::IMAGE_KEYPOINTS_COMPLETED, &format!("e{n}"), &job_id))
            .unwrap();
        // Redelivery of the same emission.
        tx.send(completion(topics::IMAGE_KEYPOINTS_COMPLETED, &format!("e{n}"), &job_id))
            .unwrap();
    }

    for n in 0..10 {
        wait_for_phase(&store, &format!("J{n}"), Phase::Matching).await;
    }
    consumer.stop().await.unwrap();
    assert_eq!(consumer.in_flight(), 0);

    let requests = bus
        .messages
        .lock()
        .await
        .iter()
        .filter(|m| m.topic == topics::MATCH_REQUEST)
        .count();
    assert_eq!(requests, 10);
}

#[tokio::test]
async fn stop_without_traffic_returns_promptly() {
    let store = Arc::new(MemoryPhaseStore::new());
    let bus = Arc::new(RecordingPublisher::default());
    let engine = Arc::new(Engine::new(SchemaRegistry::builtin(), store, bus, 100));
    let (subscriber, _tx) = ChannelSubscriber::new();

    let consumer = EventConsumer::new("idle", engine, Arc::new(subscriber), 8);
    consumer.start().await.unwrap();

    tokio::time::timeout(Duration::from_secs(1), consumer.stop())
        .await
        .expect("stop should not hang")
        .unwrap();
}

#[tokio::test]
async fn zmq_round_trip_produces_match_request() {
    let inbound = Transport::tcp("127.0.0.1", 15900);
    let outbound = Transport::tcp("127.0.0.1", 15901);

    let worker_pub = ZmqPublisher::bind(&inbound).await.unwrap();
    let side_effects = Arc::new(ZmqPublisher::bind(&outbound).await.unwrap());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let listener = ZmqSubscriber::connect(&outbound).await.unwrap();
    listener.subscribe(topics::MATCH_REQUEST).await.unwrap();

    let store = Arc::new(MemoryPhaseStore::new());
    store.insert_job("J1", "fashion", Phase::FeatureExtraction, AssetTypes::new(true, false));
    let engine = Arc::new(Engine::new(
        SchemaRegistry::builtin(),
        store.clone(),
        side_effects,
        100,
    ));
    let subscriber = Arc::new(ZmqSubscriber::connect(&inbound).await.unwrap());
    let consumer = EventConsumer::new("zmq-orchestrator", engine, subscriber, 4);
    consumer.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    worker_pub
        .publish(completion(topics::IMAGE_EMBEDDINGS_COMPLETED, "e1", "J1"))
        .await
        .unwrap();
    worker_pub
        .publish(completion(topics::IMAGE_KEYPOINTS_COMPLETED, "e2", "J1"))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(3), listener.recv())
        .await
        .expect("timed out waiting for match request")
        .unwrap();
    assert_eq!(received.topic, topics::MATCH_REQUEST);
    assert_eq!(
        received.decode::<MatchRequest>().unwrap(),
        MatchRequest::for_job("J1", "fashion")
    );
    assert_eq!(store.phase_of("J1"), Some(Phase::Matching));

    consumer.stop().await.unwrap();
}
