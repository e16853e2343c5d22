//! End-to-end: events on the queue through the dispatcher to an in-memory chat transport.

use async_trait::async_trait;
use lib::channels::{spawn_outbound, ChannelError, Outbound};
use lib::dispatcher::{DispatchOutcome, Dispatcher};
use lib::events::{
    event_queue, ChannelInfo, Commit, CommitAuthor, ConnectionInfo, GroupInfo, HumanMessage,
    InboundEvent, PushEvent,
};
use lib::executor::Executor;
use lib::reminders::ReminderScheduler;
use lib::security::{SecurityError, SecurityReport, SecurityStatus};
use lib::status::StatusAggregator;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MemoryChat {
    channels: Vec<ChannelInfo>,
    groups: Vec<GroupInfo>,
    sent: Mutex<Vec<(String, String)>>,
}

impl MemoryChat {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Outbound for MemoryChat {
    async fn send(&self, channel_id: &str, text: &str) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelInfo>, ChannelError> {
        Ok(self.channels.clone())
    }

    async fn list_groups(&self) -> Result<Vec<GroupInfo>, ChannelError> {
        Ok(self.groups.clone())
    }
}

struct Offline;

#[async_trait]
impl SecurityStatus for Offline {
    async fn fetch(&self) -> Result<SecurityReport, SecurityError> {
        Err(SecurityError::Decode(
            serde_json::from_str::<SecurityReport>("null").unwrap_err(),
        ))
    }
}

fn chat() -> Arc<MemoryChat> {
    Arc::new(MemoryChat {
        channels: vec![
            ChannelInfo {
                id: "A".into(),
                is_member: true,
            },
            ChannelInfo {
                id: "B".into(),
                is_member: false,
            },
        ],
        groups: vec![GroupInfo { id: "G".into() }],
        ..Default::default()
    })
}

fn dispatcher(chat: Arc<MemoryChat>) -> Dispatcher {
    let (outbound, _actor) = spawn_outbound(chat);
    let executor = Executor::new(
        Arc::new(Offline),
        ReminderScheduler::new(outbound.clone()),
        StdRng::seed_from_u64(3),
    );
    Dispatcher::new(outbound, executor, Arc::new(StatusAggregator::new()))
}

fn connected() -> InboundEvent {
    InboundEvent::ConnectionEstablished(ConnectionInfo {
        self_id: "U0BOT".into(),
        channels: vec![],
        groups: vec![],
    })
}

fn dm(text: &str) -> InboundEvent {
    InboundEvent::HumanMessage(HumanMessage {
        sender_id: "U7".into(),
        channel_id: "D1".into(),
        text: text.into(),
        subtype: None,
    })
}

#[tokio::test]
async fn push_reaches_member_channel_and_group_only() {
    let chat = chat();
    let mut dispatcher = dispatcher(chat.clone());
    let (tx, rx) = event_queue();
    tx.send(InboundEvent::RepositoryPush(PushEvent {
        git_ref: "refs/heads/main".into(),
        compare: "https://example/compare".into(),
        commits: vec![
            Commit {
                message: "older".into(),
                url: String::new(),
                author: CommitAuthor {
                    name: "Ann".into(),
                    username: "ann".into(),
                },
            },
            Commit {
                message: "newer".into(),
                url: String::new(),
                author: CommitAuthor {
                    name: "Bob".into(),
                    username: "bob".into(),
                },
            },
        ],
    }))
    .unwrap();
    drop(tx);

    assert_eq!(dispatcher.run(rx).await, DispatchOutcome::QueueClosed);
    drop(dispatcher);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = chat.sent();
    let targets: Vec<&str> = sent.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(targets, vec!["A", "G"]);
    assert!(sent[0].1.contains("```older\nnewer```"));
    assert!(sent[0].1.starts_with("push on GitHub by `bob`"));
}

#[tokio::test(start_paused = true)]
async fn reminder_is_acknowledged_then_delivered() {
    let chat = chat();
    let mut dispatcher = dispatcher(chat.clone());
    let (tx, rx) = event_queue();
    tx.send(connected()).unwrap();
    tx.send(dm("Remind me to water the plants in 10")).unwrap();
    drop(tx);
    assert_eq!(dispatcher.run(rx).await, DispatchOutcome::QueueClosed);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(
        chat.sent(),
        vec![(
            "D1".to_string(),
            "ok, I'll remind you in 10 minutes :robot_face:".to_string()
        )]
    );

    tokio::time::sleep(Duration::from_secs(10 * 60)).await;
    let sent = chat.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(
        sent[1],
        (
            "D1".to_string(),
            "@U7 remember to water the plants :robot_face:".to_string()
        )
    );
    assert!(dispatcher.executor().reminders().pending().is_empty());
}

#[tokio::test]
async fn malformed_reminders_get_format_help_and_schedule_nothing() {
    let chat = chat();
    let mut dispatcher = dispatcher(chat.clone());
    let (tx, rx) = event_queue();
    tx.send(connected()).unwrap();
    tx.send(dm("remind me to in 10")).unwrap();
    tx.send(dm("remind me to clean in soon")).unwrap();
    drop(tx);
    dispatcher.run(rx).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = chat.sent();
    assert_eq!(sent.len(), 2);
    for (_, text) in &sent {
        assert!(text.starts_with("unable to decode reminder :white_frowning_face:"));
    }
    assert!(dispatcher.executor().reminders().pending().is_empty());
}

#[tokio::test]
async fn fatal_error_stops_before_later_events() {
    let chat = chat();
    let mut dispatcher = dispatcher(chat.clone());
    let (tx, rx) = event_queue();
    tx.send(connected()).unwrap();
    tx.send(InboundEvent::ConnectionError {
        fatal: true,
        message: "invalid_auth".into(),
    })
    .unwrap();
    tx.send(dm("hi")).unwrap();

    let outcome = dispatcher.run(rx).await;
    assert_eq!(outcome, DispatchOutcome::Fatal("invalid_auth".into()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(chat.sent().is_empty());
}
